//! NAV-CLOCK: receiver clock bias and drift.

use super::{read_i32, read_u32};
use crate::error::ParseError;
use crate::types::{ClockFlags, GnssData};
use log::trace;

const BLOCK_SIZE: usize = 20;

const OFFSET_ITOW: usize = 0;
const OFFSET_CLOCK_BIAS: usize = 4;
const OFFSET_CLOCK_DRIFT: usize = 8;
const OFFSET_TIME_ACCURACY: usize = 12;
const OFFSET_FREQ_ACCURACY: usize = 16;

/// The drift uncertainty is reported in ps/s on the wire.
const PS_TO_NS: f64 = 1000.0;

const CONTRIBUTED_FLAGS: ClockFlags = ClockFlags::HAS_BIAS
    .union(ClockFlags::HAS_BIAS_UNCERTAINTY)
    .union(ClockFlags::HAS_DRIFT)
    .union(ClockFlags::HAS_DRIFT_UNCERTAINTY);

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NavClockParcel {
    valid: bool,
    itow: u32,
    clock_bias_ns: i32,
    clock_drift_nsps: i32,
    time_accuracy_ns: u32,
    freq_accuracy_psps: u32,
}

impl NavClockParcel {
    pub fn parse(payload: &[u8]) -> Self {
        if payload.len() != BLOCK_SIZE {
            trace!("nav-clock payload of {} bytes rejected", payload.len());
            return Self::default();
        }
        Self {
            valid: true,
            itow: read_u32(payload, OFFSET_ITOW),
            clock_bias_ns: read_i32(payload, OFFSET_CLOCK_BIAS),
            clock_drift_nsps: read_i32(payload, OFFSET_CLOCK_DRIFT),
            time_accuracy_ns: read_u32(payload, OFFSET_TIME_ACCURACY),
            freq_accuracy_psps: read_u32(payload, OFFSET_FREQ_ACCURACY),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn itow(&self) -> u32 {
        self.itow
    }

    pub fn into_gnss_data(&self, out: &mut GnssData) -> Result<(), ParseError> {
        if !self.valid {
            return Err(ParseError::InvalidData);
        }
        out.clock.bias_ns = f64::from(self.clock_bias_ns);
        out.clock.drift_nsps = f64::from(self.clock_drift_nsps);
        out.clock.bias_uncertainty_ns = f64::from(self.time_accuracy_ns);
        out.clock.drift_uncertainty_nsps = f64::from(self.freq_accuracy_psps) / PS_TO_NS;
        out.clock.hw_clock_discontinuity_count = 0;
        out.clock.flags.insert(CONTRIBUTED_FLAGS);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(itow: u32, bias: i32, drift: i32, t_acc: u32, f_acc: u32) -> Vec<u8> {
        let mut p = Vec::with_capacity(BLOCK_SIZE);
        p.extend_from_slice(&itow.to_le_bytes());
        p.extend_from_slice(&bias.to_le_bytes());
        p.extend_from_slice(&drift.to_le_bytes());
        p.extend_from_slice(&t_acc.to_le_bytes());
        p.extend_from_slice(&f_acc.to_le_bytes());
        p
    }

    #[test]
    fn fills_the_clock_block() {
        let parcel = NavClockParcel::parse(&payload(433200, -12345, 77, 25, 3500));
        assert!(parcel.is_valid());
        assert_eq!(parcel.itow(), 433200);

        let mut data = GnssData::default();
        parcel.into_gnss_data(&mut data).unwrap();
        assert_eq!(data.clock.bias_ns, -12345.0);
        assert_eq!(data.clock.drift_nsps, 77.0);
        assert_eq!(data.clock.bias_uncertainty_ns, 25.0);
        assert!((data.clock.drift_uncertainty_nsps - 3.5).abs() < 1e-9);
        assert!(data.clock.flags.contains(ClockFlags::HAS_BIAS));
        assert!(data.clock.flags.contains(ClockFlags::HAS_DRIFT_UNCERTAINTY));
    }

    #[test]
    fn keeps_existing_clock_flags() {
        let parcel = NavClockParcel::parse(&payload(0, 0, 0, 0, 0));
        let mut data = GnssData::default();
        data.clock.flags = ClockFlags::HAS_LEAP_SECOND;
        parcel.into_gnss_data(&mut data).unwrap();
        assert!(data.clock.flags.contains(ClockFlags::HAS_LEAP_SECOND));
        assert!(data.clock.flags.contains(ClockFlags::HAS_BIAS));
    }

    #[test]
    fn wrong_size_is_invalid() {
        let parcel = NavClockParcel::parse(&[0u8; 19]);
        assert!(!parcel.is_valid());
        let mut data = GnssData::default();
        assert_eq!(
            parcel.into_gnss_data(&mut data),
            Err(ParseError::InvalidData)
        );
    }
}
