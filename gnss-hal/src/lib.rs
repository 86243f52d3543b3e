//! # gnss-hal
//!
//! Hardware abstraction core for u-blox GNSS receivers: a framed serial
//! reader demultiplexing NMEA 0183 sentences and UBX binary frames, typed
//! per-parcel queues, protocol dispatchers and parsers, and the builders and
//! providers that fuse parser outputs into location, satellite-info and
//! measurement reports for registered sinks.
//!
//! The [`GeneralManager`] wires the whole pipeline from a [`HalConfig`]:
//!
//! ```no_run
//! use gnss_hal::{GeneralManager, HalConfig};
//!
//! let mut manager = GeneralManager::new(HalConfig::from_env()).unwrap();
//! manager.run().unwrap();
//! manager.set_enabled(true);
//! ```

pub use crate::config::{HalConfig, SecondMajor, FAKE_DEVICE_PATH};
pub use crate::configurator::{ConfigState, Configurator, SwVersion};
pub use crate::error::{BuildError, ConfigError, ParseError, TransportError};
pub use crate::manager::GeneralManager;
pub use crate::queue::{MessageQueue, TypedQueue};
pub use crate::reader::{NmeaFrame, TtyReader, UbxFrame};
pub use crate::sync::MeasurementSync;
pub use crate::transport::{Endian, FakeTransport, Transport, TransportState, TtyTransport};
pub use crate::types::{
    ClockFlags, Constellation, ElapsedRealtime, ElapsedRealtimeFlags, GnssClock, GnssData,
    GnssDataV1, GnssLocation, GnssMeasurement, GnssSvInfo, GnssSvStatus, LocationData,
    LocationFlags, MeasurementState, MultipathIndicator, SvFlags, SvInfoList,
};

pub mod builder;
pub mod config;
pub mod configurator;
pub mod constants;
pub mod error;
pub mod fake;
pub mod manager;
pub mod nmea;
pub mod provider;
pub mod queue;
pub mod reader;
pub mod sync;
pub mod transport;
pub mod types;
pub mod ubx;
