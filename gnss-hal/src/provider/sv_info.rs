//! Satellite-info provider.

use super::ProviderState;
use crate::builder::GnssInfoBuilder;
use crate::queue::MessageQueue;
use crate::types::{GnssSvStatus, SvInfoList};
use log::debug;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// v1.0/v1.1 sinks receive the counted, capped status layout.
pub type SvInfoSinkV1 = Box<dyn Fn(&GnssSvStatus) + Send + Sync>;
/// v2.0/v2.1 sinks receive the full list.
pub type SvInfoSinkV2 = Box<dyn Fn(&[crate::types::GnssSvInfo]) + Send + Sync>;

#[derive(Default)]
struct Sinks {
    v1_0: Option<SvInfoSinkV1>,
    v1_1: Option<SvInfoSinkV1>,
    v2_0: Option<SvInfoSinkV2>,
    v2_1: Option<SvInfoSinkV2>,
}

pub struct GnssInfoProvider {
    builder: Arc<GnssInfoBuilder>,
    sinks: Arc<Mutex<Sinks>>,
    state: Arc<ProviderState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GnssInfoProvider {
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        Self {
            builder: Arc::new(GnssInfoBuilder::new(queue)),
            sinks: Arc::new(Mutex::new(Sinks::default())),
            state: Arc::new(ProviderState::new()),
            worker: Mutex::new(None),
        }
    }

    pub fn set_callback_1_0(&self, callback: SvInfoSinkV1) {
        self.sinks.lock().unwrap().v1_0 = Some(callback);
    }

    pub fn set_callback_1_1(&self, callback: SvInfoSinkV1) {
        self.sinks.lock().unwrap().v1_1 = Some(callback);
    }

    pub fn set_callback_2_0(&self, callback: SvInfoSinkV2) {
        self.sinks.lock().unwrap().v2_0 = Some(callback);
    }

    pub fn set_callback_2_1(&self, callback: SvInfoSinkV2) {
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
        *worker = Some(
            thread::Builder::new()
                .name("svinfo-provider".into())
                .spawn(move || provide(&builder, &sinks, &state))
                .expect("spawning the sv-info provider thread"),
        );
    }

    pub fn stop_providing(&self) {
        self.state.request_exit();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GnssInfoProvider {
    fn drop(&mut self) {
        self.stop_providing();
    }
}

fn provide(builder: &GnssInfoBuilder, sinks: &Mutex<Sinks>, state: &ProviderState) {
    while !state.should_exit() {
        let mut list = SvInfoList::new();
        let outcome = builder.build(&mut list);

        if state.is_enabled() {
            match outcome {
                Ok(()) => {
                    let sinks = sinks.lock().unwrap();
                    if sinks.v1_0.is_some() || sinks.v1_1.is_some() {
                        let status = GnssSvStatus::from_list(&list);
                        if let Some(sink) = &sinks.v1_0 {
                            sink(&status);
                        }
                        if let Some(sink) = &sinks.v1_1 {
                            sink(&status);
                        }
                    }
                    if let Some(sink) = &sinks.v2_0 {
                        sink(&list);
                    }
                    if let Some(sink) = &sinks.v2_1 {
                        sink(&list);
                    }
                }
                Err(e) => debug!("no sv-info this cycle: {e}"),
            }
        }

        state.pace();
    }
}
