//! Sensor exchanges
//!
//! Single request/response exchanges with one node's sensors. Unlike move
//! dispatch, silence is not an error here: a poll that times out returns
//! `None` and the caller decides whether to try again.

use core::future::Future;

use embassy_time::{with_timeout, Duration};

use aliquot_protocol::fixed_point::{fixed_to_sensor, sensor_to_fixed, ScaleError};
use aliquot_protocol::{
    NodeId, Request, Response, SensorId, SensorOutputBinding, SensorThresholdMode, SensorType,
};

use crate::config::{ConfigError, SensorConfig};
use crate::traits::{CanBus, Messenger, TransportError};

/// A sensor reading or confirmed threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorValue {
    pub node: NodeId,
    pub sensor: SensorType,
    pub sensor_id: SensorId,
    /// Q16 wire value
    pub raw: i32,
}

impl SensorValue {
    /// Reading in the sensor's unit
    pub fn value(&self) -> f64 {
        fixed_to_sensor(self.raw)
    }
}

/// Sensor exchange errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    Transport(TransportError),
    /// Threshold cannot be represented in Q16
    Encoding(ScaleError),
    ListenerUnavailable,
}

impl From<TransportError> for SensorError {
    fn from(e: TransportError) -> Self {
        SensorError::Transport(e)
    }
}

impl core::fmt::Display for SensorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SensorError::Transport(e) => write!(f, "transport error: {}", e),
            SensorError::Encoding(e) => write!(f, "threshold not encodable: {:?}", e),
            SensorError::ListenerUnavailable => write!(f, "no listener slot available"),
        }
    }
}

fn id_matches(requested: SensorId, reported: SensorId) -> bool {
    requested == SensorId::Both || requested == reported
}

/// Sensor requests on one bus
pub struct SensorScheduler<'a, B: CanBus> {
    messenger: Messenger<'a, B>,
    config: SensorConfig,
}

impl<'a, B: CanBus> SensorScheduler<'a, B> {
    pub fn new(bus: &'a B, config: SensorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            messenger: Messenger::new(bus),
            config,
        })
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// Take a fresh baseline, then read
    pub async fn poll(
        &self,
        node: NodeId,
        sensor: SensorType,
        sensor_id: SensorId,
        timeout: Duration,
    ) -> Result<Option<SensorValue>, SensorError> {
        let requests = [
            Request::BaselineSensor {
                sensor,
                sensor_id,
                sample_rate: self.config.baseline_samples,
            },
            Request::ReadSensor {
                sensor,
                sensor_id,
                offset_reading: self.config.offset_reading,
            },
        ];
        self.read_exchange(node, sensor, sensor_id, &requests, timeout)
            .await
    }

    /// Read once, without a new baseline
    pub async fn read(
        &self,
        node: NodeId,
        sensor: SensorType,
        sensor_id: SensorId,
        offset_reading: bool,
        timeout: Duration,
    ) -> Result<Option<SensorValue>, SensorError> {
        let request = Request::ReadSensor {
            sensor,
            sensor_id,
            offset_reading,
        };
        self.read_exchange(node, sensor, sensor_id, &[request], timeout)
            .await
    }

    /// Write a raw sensor register; nodes do not answer
    pub async fn write(
        &self,
        node: NodeId,
        sensor: SensorType,
        sensor_id: SensorId,
        data: u32,
    ) -> Result<(), SensorError> {
        let _claim = self.messenger.hub().claim().await;
        self.messenger
            .send(
                node,
                &Request::WriteSensor {
                    sensor,
                    sensor_id,
                    data,
                },
            )
            .await?;
        Ok(())
    }

    /// Set a trigger threshold and return the one the node confirmed
    pub async fn set_threshold(
        &self,
        node: NodeId,
        sensor: SensorType,
        sensor_id: SensorId,
        threshold: f64,
        mode: SensorThresholdMode,
        timeout: Duration,
    ) -> Result<Option<SensorValue>, SensorError> {
        let threshold = sensor_to_fixed(threshold).map_err(SensorError::Encoding)?;
        let request = Request::SetSensorThreshold {
            sensor,
            sensor_id,
            threshold,
            mode,
        };
        let response = self
            .exchange(node, &[request], timeout, |response| {
                matches!(
                    *response,
                    Response::SensorThresholdResponse { sensor: s, sensor_id: id, .. }
                        if s == sensor && id_matches(sensor_id, id)
                )
            })
            .await?;
        Ok(match response {
            Some(Response::SensorThresholdResponse {
                sensor,
                sensor_id,
                threshold,
                ..
            }) => Some(SensorValue {
                node,
                sensor,
                sensor_id,
                raw: threshold,
            }),
            _ => None,
        })
    }

    /// Route a sensor's output while `work` runs
    ///
    /// The binding is reset to `None` once `work` finishes, whatever it
    /// returned. The bus namespace is not held, so `work` may run a move
    /// dispatch on the same bus.
    pub async fn bind_output<F: Future>(
        &self,
        node: NodeId,
        sensor: SensorType,
        sensor_id: SensorId,
        binding: SensorOutputBinding,
        work: F,
    ) -> Result<F::Output, SensorError> {
        self.send_binding(node, sensor, sensor_id, binding).await?;
        let mut guard = BindingGuard {
            node,
            sensor,
            armed: true,
        };

        let output = work.await;

        let reset = self
            .send_binding(node, sensor, sensor_id, SensorOutputBinding::None)
            .await;
        guard.armed = false;
        reset?;
        Ok(output)
    }

    async fn send_binding(
        &self,
        node: NodeId,
        sensor: SensorType,
        sensor_id: SensorId,
        binding: SensorOutputBinding,
    ) -> Result<(), SensorError> {
        debug!("bind {:?} {:?} -> {:?}", node, sensor, binding);
        self.messenger
            .send(
                node,
                &Request::BindSensorOutput {
                    sensor,
                    sensor_id,
                    binding,
                },
            )
            .await?;
        Ok(())
    }

    async fn read_exchange(
        &self,
        node: NodeId,
        sensor: SensorType,
        sensor_id: SensorId,
        requests: &[Request],
        timeout: Duration,
    ) -> Result<Option<SensorValue>, SensorError> {
        let response = self
            .exchange(node, requests, timeout, |response| {
                matches!(
                    *response,
                    Response::ReadSensorResponse { sensor: s, sensor_id: id, .. }
                        if s == sensor && id_matches(sensor_id, id)
                )
            })
            .await?;
        Ok(match response {
            Some(Response::ReadSensorResponse {
                sensor,
                sensor_id,
                value,
            }) => Some(SensorValue {
                node,
                sensor,
                sensor_id,
                raw: value,
            }),
            _ => None,
        })
    }

    /// Send `requests` to `node` and wait for the first accepted reply
    async fn exchange(
        &self,
        node: NodeId,
        requests: &[Request],
        timeout: Duration,
        accept: impl Fn(&Response) -> bool,
    ) -> Result<Option<Response>, SensorError> {
        let _claim = self.messenger.hub().claim().await;
        let mut listener = self
            .messenger
            .listen()
            .map_err(|_| SensorError::ListenerUnavailable)?;
        for request in requests {
            self.messenger.send(node, request).await?;
        }

        let reply = async {
            loop {
                let incoming = listener.next().await;
                if incoming.sender == node && accept(&incoming.response) {
                    return incoming.response;
                }
            }
        };
        match with_timeout(timeout, reply).await {
            Ok(response) => Ok(Some(response)),
            Err(_) => {
                debug!("no sensor reply from {:?}", node);
                Ok(None)
            }
        }
    }
}

/// Flags a binding that was never reset because its future was dropped
struct BindingGuard {
    node: NodeId,
    sensor: SensorType,
    armed: bool,
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!("{:?} {:?} output left bound", self.node, self.sensor);
        }
    }
}
