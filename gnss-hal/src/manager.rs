//! General manager: wires the transport, reader, dispatchers, providers and
//! configurator together and owns their lifetimes.

use crate::config::HalConfig;
use crate::configurator::{Configurator, SwVersion};
use crate::error::{ConfigError, TransportError};
use crate::fake::{FakeLocationProvider, FakeReader};
use crate::nmea::NmeaMsgHandler;
use crate::provider::{GnssInfoProvider, LocationProvider, MeasurementProvider};
use crate::queue::MessageQueue;
use crate::reader::TtyReader;
use crate::sync::MeasurementSync;
use crate::transport::{FakeTransport, Transport, TtyTransport};
use crate::types::anchor_elapsed_realtime;
use crate::ubx::UbxMsgHandler;
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Everything a live receiver session needs.
struct ReceiverSession {
    reader: Arc<TtyReader>,
    nmea_handler: Arc<NmeaMsgHandler>,
    ubx_handler: Arc<UbxMsgHandler>,
    location_provider: Arc<LocationProvider>,
    sv_info_provider: Arc<GnssInfoProvider>,
    measurement_provider: Arc<MeasurementProvider>,
    config_result: Arc<Mutex<Option<Result<SwVersion, ConfigError>>>>,
    config_worker: Mutex<Option<JoinHandle<()>>>,
}

/// Everything a fake (file-replay) session needs.
struct FakeSession {
    reader: FakeReader,
    provider: Arc<FakeLocationProvider>,
}

enum Session {
    Receiver(ReceiverSession),
    Fake(FakeSession),
}

pub struct GeneralManager {
    config: HalConfig,
    queue: Arc<MessageQueue>,
    sync: Arc<MeasurementSync>,
    transport: Arc<dyn Transport>,
    session: Session,
    transport_dead: Arc<AtomicBool>,
    running: bool,
}

impl GeneralManager {
    /// Build the whole pipeline for the configured receiver. Nothing is
    /// started yet; call [`run`](Self::run).
    pub fn new(config: HalConfig) -> Result<Self, TransportError> {
        anchor_elapsed_realtime();
        let queue = MessageQueue::new();
        let sync = MeasurementSync::new();
        let transport_dead = Arc::new(AtomicBool::new(false));

        let (transport, session): (Arc<dyn Transport>, Session) = if config.is_fake() {
            let transport = Arc::new(FakeTransport::new(&config.fake_route));
            let reader = FakeReader::new(Arc::clone(&queue), transport.as_ref())
                .map_err(|_| TransportError::NotReady)?;
            let provider = Arc::new(FakeLocationProvider::new(Arc::clone(&queue)));
            (transport, Session::Fake(FakeSession { reader, provider }))
        } else {
            let mut tty = TtyTransport::new(config.device_path.clone(), config.tty_baud_rate);
            if let Some(line) = &config.reset_line {
                tty = tty.with_reset_line(line.clone());
            }
            let transport: Arc<dyn Transport> = Arc::new(tty);
            let reader = Arc::new(TtyReader::new(Arc::clone(&transport), Arc::clone(&queue)));
            {
                let dead = Arc::clone(&transport_dead);
                reader
                    .set_death_callback(Box::new(move || {
                        error!("receiver transport died, stopping ingestion");
                        dead.store(true, Ordering::Release);
                    }))
                    .map_err(|_| TransportError::NotReady)?;
            }
            let session = ReceiverSession {
                reader,
                nmea_handler: Arc::new(NmeaMsgHandler::new(Arc::clone(&queue))),
                ubx_handler: Arc::new(UbxMsgHandler::new(Arc::clone(&queue))),
                location_provider: Arc::new(LocationProvider::new(
                    Arc::clone(&queue),
                    Arc::clone(&sync),
                )),
                sv_info_provider: Arc::new(GnssInfoProvider::new(Arc::clone(&queue))),
                measurement_provider: Arc::new(MeasurementProvider::new(
                    Arc::clone(&queue),
                    Arc::clone(&sync),
                )),
                config_result: Arc::new(Mutex::new(None)),
                config_worker: Mutex::new(None),
            };
            (transport, Session::Receiver(session))
        };

        Ok(Self {
            config,
            queue,
            sync,
            transport,
            session,
            transport_dead,
            running: false,
        })
    }

    /// Start ingestion, processing and provision. For a live receiver the
    /// configurator runs on its own thread and raises the NMEA protocol
    /// version once the receiver answered MON-VER.
    pub fn run(&mut self) -> Result<(), TransportError> {
        if self.running {
            return Ok(());
        }
        match &self.session {
            Session::Fake(session) => {
                info!("starting fake location session from {}", self.config.fake_route.display());
                session.reader.start();
                session.provider.start_providing();
            }
            Session::Receiver(session) => {
                info!("starting receiver session on {}", self.config.device_path);
                session.nmea_handler.start_processing();
                session.ubx_handler.start_processing();
                session.reader.start()?;

                let transport = Arc::clone(&self.transport);
                let queue = Arc::clone(&self.queue);
                let config = self.config.clone();
                let nmea_handler = Arc::clone(&session.nmea_handler);
                let config_result = Arc::clone(&session.config_result);
                let worker = thread::Builder::new()
                    .name("configurator".into())
                    .spawn(move || {
                        let mut configurator = Configurator::new(transport, queue, &config);
                        let outcome = configurator.configure();
                        match outcome {
                            Ok(family) => {
                                nmea_handler.update_protocol_version(family.nmea_version());
                            }
                            Err(e) => error!("receiver configuration failed: {e}"),
                        }
                        *config_result.lock().unwrap() = Some(outcome);
                    })
                    .expect("spawning the configurator thread");
                *session.config_worker.lock().unwrap() = Some(worker);

                session.location_provider.start_providing();
                session.sv_info_provider.start_providing();
                session.measurement_provider.start_providing();
            }
        }
        self.running = true;
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        match &self.session {
            Session::Fake(session) => {
                session.provider.stop_providing();
                session.reader.stop();
            }
            Session::Receiver(session) => {
                if let Some(worker) = session.config_worker.lock().unwrap().take() {
                    let _ = worker.join();
                }
                session.location_provider.stop_providing();
                session.sv_info_provider.stop_providing();
                session.measurement_provider.stop_providing();
                session.reader.stop();
                session.nmea_handler.stop_processing();
                session.ubx_handler.stop_processing();
                let _ = self.transport.close();
            }
        }
        self.running = false;
    }

    /// Enable or gate delivery on every provider.
    pub fn set_enabled(&self, enabled: bool) {
        match &self.session {
            Session::Fake(session) => session.provider.set_enabled(enabled),
            Session::Receiver(session) => {
                session.location_provider.set_enabled(enabled);
                session.sv_info_provider.set_enabled(enabled);
                session.measurement_provider.set_enabled(enabled);
            }
        }
    }

    pub fn set_update_interval(&self, interval_us: u64) {
        if let Session::Receiver(session) = &self.session {
            session.location_provider.set_update_interval(interval_us);
            session.sv_info_provider.set_update_interval(interval_us);
            session.measurement_provider.set_update_interval(interval_us);
        }
    }

    /// Outcome of the configurator thread, once it finished.
    pub fn config_result(&self) -> Option<Result<SwVersion, ConfigError>> {
        match &self.session {
            Session::Receiver(session) => *session.config_result.lock().unwrap(),
            Session::Fake(_) => None,
        }
    }

    /// False once the reader exhausted its transport retries.
    pub fn is_transport_alive(&self) -> bool {
        !self.transport_dead.load(Ordering::Acquire)
    }

    pub fn measurement_sync(&self) -> &Arc<MeasurementSync> {
        &self.sync
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    pub fn location_provider(&self) -> Option<&LocationProvider> {
        match &self.session {
            Session::Receiver(session) => Some(&session.location_provider),
            Session::Fake(_) => None,
        }
    }

    pub fn sv_info_provider(&self) -> Option<&GnssInfoProvider> {
        match &self.session {
            Session::Receiver(session) => Some(&session.sv_info_provider),
            Session::Fake(_) => None,
        }
    }

    pub fn measurement_provider(&self) -> Option<&MeasurementProvider> {
        match &self.session {
            Session::Receiver(session) => Some(&session.measurement_provider),
            Session::Fake(_) => None,
        }
    }

    pub fn fake_location_provider(&self) -> Option<&FakeLocationProvider> {
        match &self.session {
            Session::Fake(session) => Some(&session.provider),
            Session::Receiver(_) => None,
        }
    }
}

impl Drop for GeneralManager {
    fn drop(&mut self) {
        self.stop();
    }
}
