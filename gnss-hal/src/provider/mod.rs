//! Providers run the builders at a configurable cadence and deliver the
//! fused records to registered sinks.
//!
//! A sink is registered per interface version; versions without a sink are
//! silently skipped. A failed build cycle produces no output and the
//! provider waits for the next interval.

mod location;
mod measurement;
mod sv_info;

pub use location::{LocationProvider, LocationSinkV1, LocationSinkV2};
pub use measurement::{MeasurementProvider, MeasurementSinkV1, MeasurementSinkV2};
pub use sv_info::{GnssInfoProvider, SvInfoSinkV1, SvInfoSinkV2};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub(crate) const DEFAULT_UPDATE_INTERVAL_US: u64 = 1_000_000;

/// Shared run state of one provider thread: enable flag, cadence and an
/// interruptible sleep.
pub(crate) struct ProviderState {
    pub(crate) enabled: AtomicBool,
    pub(crate) exit: AtomicBool,
    update_interval_us: AtomicU64,
    pace: Mutex<()>,
    wake: Condvar,
}

impl ProviderState {
    pub(crate) fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            exit: AtomicBool::new(false),
            update_interval_us: AtomicU64::new(DEFAULT_UPDATE_INTERVAL_US),
            pace: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    pub(crate) fn set_update_interval(&self, interval_us: u64) {
        self.update_interval_us.store(interval_us, Ordering::Release);
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn should_exit(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    /// Sleep one update interval; wakes early on stop.
    pub(crate) fn pace(&self) {
        let interval = Duration::from_micros(self.update_interval_us.load(Ordering::Acquire));
        let guard = self.pace.lock().unwrap();
        let _ = self
            .wake
            .wait_timeout_while(guard, interval, |_| !self.should_exit())
            .unwrap();
    }

    /// Request exit and wake the pacing sleep.
    pub(crate) fn request_exit(&self) {
        self.exit.store(true, Ordering::Release);
        self.wake.notify_all();
    }

    pub(crate) fn reset_exit(&self) {
        self.exit.store(false, Ordering::Release);
    }
}
