//! Whole-dispatch abort
//!
//! Emergency stop and user cancel share one sticky signal. Once fired it
//! stays fired until [`AbortSignal::reset`], so a dispatch that starts after
//! the fire is refused as well.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Sticky abort flag with an async wait
pub struct AbortSignal {
    fired: AtomicBool,
    wake: Signal<CriticalSectionRawMutex, ()>,
}

impl AbortSignal {
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            wake: Signal::new(),
        }
    }

    /// Abort whatever is running and anything started later
    pub fn fire(&self) {
        self.fired.store(true, Ordering::SeqCst);
        self.wake.signal(());
    }

    /// Returns true if the signal has fired
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Re-arm after the cause has been dealt with
    pub fn reset(&self) {
        self.fired.store(false, Ordering::SeqCst);
        self.wake.reset();
    }

    /// Resolve once the signal has fired
    pub async fn wait(&self) {
        while !self.is_fired() {
            self.wake.wait().await;
        }
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}
