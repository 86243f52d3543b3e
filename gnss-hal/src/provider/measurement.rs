//! Measurement provider. Every delivered report counts down the start-up
//! synchronisation gate of the location provider.

use super::ProviderState;
use crate::builder::MeasurementBuilder;
use crate::queue::MessageQueue;
use crate::sync::MeasurementSync;
use crate::types::{GnssData, GnssDataV1};
use log::debug;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// v1.0/v1.1 sinks receive the counted layout without the elapsed-realtime
/// block.
pub type MeasurementSinkV1 = Box<dyn Fn(&GnssDataV1) + Send + Sync>;
/// v2.0/v2.1 sinks receive the full record.
pub type MeasurementSinkV2 = Box<dyn Fn(&GnssData) + Send + Sync>;

#[derive(Default)]
struct Sinks {
    v1_0: Option<MeasurementSinkV1>,
    v1_1: Option<MeasurementSinkV1>,
    v2_0: Option<MeasurementSinkV2>,
    v2_1: Option<MeasurementSinkV2>,
}

pub struct MeasurementProvider {
    builder: Arc<MeasurementBuilder>,
    sinks: Arc<Mutex<Sinks>>,
    state: Arc<ProviderState>,
    sync: Arc<MeasurementSync>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MeasurementProvider {
    pub fn new(queue: Arc<MessageQueue>, sync: Arc<MeasurementSync>) -> Self {
        Self {
            builder: Arc::new(MeasurementBuilder::new(queue)),
            sinks: Arc::new(Mutex::new(Sinks::default())),
            state: Arc::new(ProviderState::new()),
            sync,
            worker: Mutex::new(None),
        }
    }

    pub fn set_callback_1_0(&self, callback: MeasurementSinkV1) {
        self.sinks.lock().unwrap().v1_0 = Some(callback);
    }

    pub fn set_callback_1_1(&self, callback: MeasurementSinkV1) {
        self.sinks.lock().unwrap().v1_1 = Some(callback);
    }

    pub fn set_callback_2_0(&self, callback: MeasurementSinkV2) {
        self.sinks.lock().unwrap().v2_0 = Some(callback);
    }

    pub fn set_callback_2_1(&self, callback: MeasurementSinkV2) {
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
                .name("measurement-provider".into())
                .spawn(move || provide(&builder, &sinks, &state, &sync))
                .expect("spawning the measurement provider thread"),
        );
    }

    pub fn stop_providing(&self) {
        self.state.request_exit();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MeasurementProvider {
    fn drop(&mut self) {
        self.stop_providing();
    }
}

fn provide(
    builder: &MeasurementBuilder,
    sinks: &Mutex<Sinks>,
    state: &ProviderState,
    sync: &MeasurementSync,
) {
    while !state.should_exit() {
        let mut data = GnssData::default();
        let outcome = builder.build(&mut data);

        if state.is_enabled() {
            match outcome {
                Ok(()) => {
                    {
                        let sinks = sinks.lock().unwrap();
                        if sinks.v1_0.is_some() || sinks.v1_1.is_some() {
                            let v1 = GnssDataV1::from_data(&data);
                            if let Some(sink) = &sinks.v1_0 {
                                sink(&v1);
                            }
                            if let Some(sink) = &sinks.v1_1 {
                                sink(&v1);
                            }
                        }
                        if let Some(sink) = &sinks.v2_0 {
                            sink(&data);
                        }
                        if let Some(sink) = &sinks.v2_1 {
                            sink(&data);
                        }
                    }
                    sync.notify_event_occurred();
                }
                Err(e) => debug!("no measurement this cycle: {e}"),
            }
        }

        state.pace();
    }
}
