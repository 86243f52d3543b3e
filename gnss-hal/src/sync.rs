//! Measurement/location start-up synchronisation.
//!
//! Certification of the higher layers expects a number of measurement
//! reports before the first location callback; the measurement provider
//! counts events down here and the location provider gates on [`ready`].
//!
//! [`ready`]: MeasurementSync::ready

use std::sync::atomic::{AtomicI8, Ordering};
use std::sync::Arc;

const DEFAULT_EVENTS_TO_WAIT: i8 = 2;

pub struct MeasurementSync {
    events_to_wait: AtomicI8,
}

impl Default for MeasurementSync {
    fn default() -> Self {
        Self {
            events_to_wait: AtomicI8::new(DEFAULT_EVENTS_TO_WAIT),
        }
    }
}

impl MeasurementSync {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_events_to_wait(&self, events: i8) {
        self.events_to_wait.store(events, Ordering::Release);
    }

    /// One measurement report went out.
    pub fn notify_event_occurred(&self) {
        let _ = self
            .events_to_wait
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |events| {
                (events > 0).then(|| events - 1)
            });
    }

    /// Whether location delivery may start.
    pub fn ready(&self) -> bool {
        self.events_to_wait.load(Ordering::Acquire) <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_to_ready() {
        let sync = MeasurementSync::new();
        assert!(!sync.ready());
        sync.notify_event_occurred();
        assert!(!sync.ready());
        sync.notify_event_occurred();
        assert!(sync.ready());
        // Further events do not underflow.
        sync.notify_event_occurred();
        assert!(sync.ready());
    }

    #[test]
    fn threshold_is_adjustable() {
        let sync = MeasurementSync::new();
        sync.set_events_to_wait(0);
        assert!(sync.ready());
        sync.set_events_to_wait(1);
        assert!(!sync.ready());
        sync.notify_event_occurred();
        assert!(sync.ready());
    }
}
