//! Location provider: one thread, one location build per interval,
//! delivered to every registered callback version once measurement
//! synchronisation is ready.

use super::ProviderState;
use crate::builder::LocationBuilder;
use crate::queue::MessageQueue;
use crate::sync::MeasurementSync;
use crate::types::{GnssLocation, LocationData};
use log::debug;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// v1.0/v1.1 sinks receive the core location layout.
pub type LocationSinkV1 = Box<dyn Fn(&GnssLocation) + Send + Sync>;
/// v2.0/v2.1 sinks receive the full record.
pub type LocationSinkV2 = Box<dyn Fn(&LocationData) + Send + Sync>;

#[derive(Default)]
struct Sinks {
    v1_0: Option<LocationSinkV1>,
    v1_1: Option<LocationSinkV1>,
    v2_0: Option<LocationSinkV2>,
    v2_1: Option<LocationSinkV2>,
}

pub struct LocationProvider {
    builder: Arc<LocationBuilder>,
    sinks: Arc<Mutex<Sinks>>,
    state: Arc<ProviderState>,
    sync: Arc<MeasurementSync>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LocationProvider {
    pub fn new(queue: Arc<MessageQueue>, sync: Arc<MeasurementSync>) -> Self {
        Self {
            builder: Arc::new(LocationBuilder::new(queue)),
            sinks: Arc::new(Mutex::new(Sinks::default())),
            state: Arc::new(ProviderState::new()),
            sync,
            worker: Mutex::new(None),
        }
    }

    pub fn set_callback_1_0(&self, callback: LocationSinkV1) {
        self.sinks.lock().unwrap().v1_0 = Some(callback);
    }

    pub fn set_callback_1_1(&self, callback: LocationSinkV1) {
        self.sinks.lock().unwrap().v1_1 = Some(callback);
    }

    pub fn set_callback_2_0(&self, callback: LocationSinkV2) {
        self.sinks.lock().unwrap().v2_0 = Some(callback);
    }

    pub fn set_callback_2_1(&self, callback: LocationSinkV2) {
        self.sinks.lock().unwrap().v2_1 = Some(callback);
    }

    pub fn set_update_interval(&self, interval_us: u64) {
        self.state.set_update_interval(interval_us);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.set_enabled(enabled);
    }

    pub fn start_providing(&self) {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return;
        }
        self.state.reset_exit();
        let builder = Arc::clone(&self.builder);
        let sinks = Arc::clone(&self.sinks);
        let state = Arc::clone(&self.state);
        let sync = Arc::clone(&self.sync);
        *worker = Some(
            thread::Builder::new()
                .name("location-provider".into())
                .spawn(move || provide(&builder, &sinks, &state, &sync))
                .expect("spawning the location provider thread"),
        );
    }

    pub fn stop_providing(&self) {
        self.state.request_exit();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LocationProvider {
    fn drop(&mut self) {
        self.stop_providing();
    }
}

fn provide(
    builder: &LocationBuilder,
    sinks: &Mutex<Sinks>,
    state: &ProviderState,
    sync: &MeasurementSync,
) {
    while !state.should_exit() {
        let mut data = LocationData::default();
        let outcome = builder.build(&mut data);

        if state.is_enabled() && sync.ready() {
            match outcome {
                Ok(()) => {
                    let sinks = sinks.lock().unwrap();
                    if let Some(sink) = &sinks.v1_0 {
                        sink(&data.location);
                    }
                    if let Some(sink) = &sinks.v1_1 {
                        sink(&data.location);
                    }
                    if let Some(sink) = &sinks.v2_0 {
                        sink(&data);
                    }
                    if let Some(sink) = &sinks.v2_1 {
                        sink(&data);
                    }
                }
                Err(e) => debug!("no valid location this cycle: {e}"),
            }
        }

        state.pace();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmea::{with_checksum, NmeaVersion, RmcSentence};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const RMC: &str = "GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,,";

    #[test]
    fn delivers_to_every_registered_version_after_sync() {
        let queue = MessageQueue::new();
        let sync = MeasurementSync::new();
        sync.set_events_to_wait(0);

        let provider = LocationProvider::new(Arc::clone(&queue), Arc::clone(&sync));
        let calls_v1 = Arc::new(AtomicUsize::new(0));
        let calls_v2 = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls_v1);
            provider.set_callback_1_1(Box::new(move |location| {
                assert!((location.latitude_degrees - 48.1173).abs() < 1e-4);
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }
        {
            let calls = Arc::clone(&calls_v2);
            provider.set_callback_2_1(Box::new(move |data| {
                assert!(data.elapsed_realtime.timestamp_ns > 0);
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }
        provider.set_update_interval(20_000);
        provider.set_enabled(true);
        provider.start_providing();

        let locations = queue.of::<RmcSentence>();
        for _ in 0..40 {
            locations.push(RmcSentence::parse(&with_checksum(RMC), NmeaVersion::V23));
            if calls_v1.load(Ordering::SeqCst) > 0 && calls_v2.load(Ordering::SeqCst) > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(25));
        }
        provider.stop_providing();

        assert!(calls_v1.load(Ordering::SeqCst) > 0);
        assert!(calls_v2.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn waits_for_measurement_sync() {
        let queue = MessageQueue::new();
        let sync = MeasurementSync::new(); // two events pending
        let provider = LocationProvider::new(Arc::clone(&queue), Arc::clone(&sync));
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            provider.set_callback_1_0(Box::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }
        provider.set_update_interval(10_000);
        provider.set_enabled(true);
        provider.start_providing();

        let locations = queue.of::<RmcSentence>();
        for _ in 0..5 {
            locations.push(RmcSentence::parse(&with_checksum(RMC), NmeaVersion::V23));
            thread::sleep(Duration::from_millis(20));
        }
        provider.stop_providing();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
