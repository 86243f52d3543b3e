//! Records emitted to registered sinks and the flag registers they carry.
//!
//! The sink surface is versioned: v1.0/v1.1 callbacks receive the reduced
//! layouts ([`GnssLocation`], [`GnssSvStatus`], [`GnssDataV1`]), v2.0/v2.1
//! callbacks the full ones. The provider formats the same record into each
//! registered version.

use bitflags::bitflags;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Instant;

bitflags! {
    /// Which optional fields of a [`GnssLocation`] are populated.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct LocationFlags: u16 {
        const HAS_LAT_LONG = 0x0001;
        const HAS_ALTITUDE = 0x0002;
        const HAS_SPEED = 0x0004;
        const HAS_BEARING = 0x0008;
        const HAS_HORIZONTAL_ACCURACY = 0x0010;
        const HAS_VERTICAL_ACCURACY = 0x0020;
        const HAS_SPEED_ACCURACY = 0x0040;
        const HAS_BEARING_ACCURACY = 0x0080;
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct ElapsedRealtimeFlags: u16 {
        const HAS_TIMESTAMP_NS = 0x0001;
        const HAS_TIME_UNCERTAINTY_NS = 0x0002;
    }
}

bitflags! {
    /// Validity bits of the [`GnssClock`] block.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct ClockFlags: u16 {
        const HAS_LEAP_SECOND = 0x0001;
        const HAS_TIME_UNCERTAINTY = 0x0002;
        const HAS_FULL_BIAS = 0x0004;
        const HAS_BIAS = 0x0008;
        const HAS_BIAS_UNCERTAINTY = 0x0010;
        const HAS_DRIFT = 0x0020;
        const HAS_DRIFT_UNCERTAINTY = 0x0040;
    }
}

bitflags! {
    /// Per-satellite flag bits of an sv-info entry.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct SvFlags: u8 {
        const HAS_EPHEMERIS_DATA = 0x01;
        const HAS_ALMANAC_DATA = 0x02;
        const USED_IN_FIX = 0x04;
        const HAS_CARRIER_FREQUENCY = 0x08;
    }
}

bitflags! {
    /// Synchronisation state of one pseudorange measurement.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct MeasurementState: u32 {
        const STATE_CODE_LOCK = 1 << 0;
        const STATE_BIT_SYNC = 1 << 1;
        const STATE_SUBFRAME_SYNC = 1 << 2;
        const STATE_TOW_DECODED = 1 << 3;
        const STATE_MSEC_AMBIGUOUS = 1 << 4;
        const STATE_SYMBOL_SYNC = 1 << 5;
        const STATE_GLO_STRING_SYNC = 1 << 6;
        const STATE_GLO_TOD_DECODED = 1 << 7;
        const STATE_BDS_D2_BIT_SYNC = 1 << 8;
        const STATE_BDS_D2_SUBFRAME_SYNC = 1 << 9;
        const STATE_GAL_E1BC_CODE_LOCK = 1 << 10;
        const STATE_GAL_E1C_2ND_CODE_LOCK = 1 << 11;
        const STATE_GAL_E1B_PAGE_SYNC = 1 << 12;
        const STATE_SBAS_SYNC = 1 << 13;
        const STATE_TOW_KNOWN = 1 << 14;
        const STATE_GLO_TOD_KNOWN = 1 << 15;
    }
}

// Sinks see flag registers as their raw bit values.
macro_rules! serialize_as_bits {
    ($($flags:ty),+ $(,)?) => {
        $(impl Serialize for $flags {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.bits().serialize(serializer)
            }
        })+
    };
}

serialize_as_bits!(
    LocationFlags,
    ElapsedRealtimeFlags,
    ClockFlags,
    SvFlags,
    MeasurementState,
);

/// Constellation of a tracked satellite as reported to sinks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Constellation {
    #[default]
    Unknown,
    Gps,
    Sbas,
    Glonass,
    Qzss,
    Beidou,
    Galileo,
}

/// Monotonic timestamp attached to every emitted record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct ElapsedRealtime {
    pub flags: ElapsedRealtimeFlags,
    pub timestamp_ns: u64,
    pub time_uncertainty_ns: u64,
}

impl ElapsedRealtime {
    /// Stamp "now" with zero uncertainty.
    pub fn now() -> Self {
        Self {
            flags: ElapsedRealtimeFlags::HAS_TIMESTAMP_NS
                | ElapsedRealtimeFlags::HAS_TIME_UNCERTAINTY_NS,
            timestamp_ns: elapsed_realtime_nanos(),
            time_uncertainty_ns: 0,
        }
    }
}

static CLOCK_ANCHOR: OnceLock<Instant> = OnceLock::new();

/// Monotonic nanoseconds since the clock anchor (first use within this
/// process); the portable stand-in for a boot-time clock.
pub fn elapsed_realtime_nanos() -> u64 {
    CLOCK_ANCHOR.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Pin the monotonic anchor; called once at manager start-up so reports never
/// begin at zero mid-stream.
pub(crate) fn anchor_elapsed_realtime() {
    let _ = elapsed_realtime_nanos();
}

/// Core location fields, the v1.0 sink layout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct GnssLocation {
    pub flags: LocationFlags,
    pub latitude_degrees: f64,
    pub longitude_degrees: f64,
    pub altitude_meters: f64,
    pub speed_mps: f32,
    pub bearing_degrees: f32,
    pub horizontal_accuracy_meters: f32,
    pub vertical_accuracy_meters: f32,
    pub speed_accuracy_mps: f32,
    pub bearing_accuracy_degrees: f32,
    /// Milliseconds since the Unix epoch, reconstructed from the sentence
    /// date and time plus the host's current UTC offset.
    pub timestamp_ms: i64,
}

/// Full location record, the v2.0/v2.1 sink layout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct LocationData {
    pub location: GnssLocation,
    pub elapsed_realtime: ElapsedRealtime,
}

/// One satellite of an sv-info report.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct GnssSvInfo {
    pub svid: i16,
    pub constellation: Constellation,
    pub cn0_dbhz: f32,
    pub elevation_degrees: f32,
    pub azimuth_degrees: f32,
    pub carrier_frequency_hz: f32,
    pub flags: SvFlags,
}

pub type SvInfoList = Vec<GnssSvInfo>;

/// v1.0/v1.1 sv-status layout: a counted list capped at the platform maximum.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct GnssSvStatus {
    pub num_svs: usize,
    pub sv_list: SvInfoList,
}

impl GnssSvStatus {
    pub fn from_list(list: &[GnssSvInfo]) -> Self {
        let capped = &list[..list.len().min(crate::constants::SVS_COUNT_MAX)];
        Self {
            num_svs: capped.len(),
            sv_list: capped.to_vec(),
        }
    }
}

/// Receiver clock block of a measurement report.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct GnssClock {
    pub flags: ClockFlags,
    pub leap_second: i16,
    pub time_ns: i64,
    pub time_uncertainty_ns: f64,
    pub full_bias_ns: i64,
    pub bias_ns: f64,
    pub bias_uncertainty_ns: f64,
    pub drift_nsps: f64,
    pub drift_uncertainty_nsps: f64,
    pub hw_clock_discontinuity_count: u32,
}

/// Indicates whether the receiver flagged a measurement as degraded by
/// multipath propagation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MultipathIndicator {
    #[default]
    Unknown,
    Present,
    NotPresent,
}

/// One per-satellite pseudorange measurement.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct GnssMeasurement {
    pub svid: i16,
    pub constellation: Constellation,
    pub state: MeasurementState,
    pub received_sv_time_ns: i64,
    pub received_sv_time_uncertainty_ns: i64,
    pub cn0_dbhz: f64,
    pub pseudorange_rate_mps: f64,
    pub pseudorange_rate_uncertainty_mps: f64,
    pub carrier_frequency_hz: f32,
    pub multipath_indicator: MultipathIndicator,
    pub code_type: &'static str,
}

/// Full measurement record, the v2.0/v2.1 sink layout.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct GnssData {
    pub clock: GnssClock,
    pub measurements: Vec<GnssMeasurement>,
    pub elapsed_realtime: ElapsedRealtime,
}

/// v1.0/v1.1 measurement layout: no elapsed-realtime block and a counted,
/// capped measurement list.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct GnssDataV1 {
    pub clock: GnssClock,
    pub measurement_count: usize,
    pub measurements: Vec<GnssMeasurement>,
}

impl GnssDataV1 {
    pub fn from_data(data: &GnssData) -> Self {
        let capped =
            &data.measurements[..data.measurements.len().min(crate::constants::SVS_COUNT_MAX)];
        Self {
            clock: data.clock,
            measurement_count: capped.len(),
            measurements: capped.to_vec(),
        }
    }
}
