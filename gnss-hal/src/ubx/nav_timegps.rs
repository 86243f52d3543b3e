//! NAV-TIMEGPS: GPS time solution. Seeds the clock block of a measurement
//! record with the absolute time and its bias against GPS time.

use super::{read_i16, read_i32, read_u32};
use crate::constants::MS_TO_NS;
use crate::error::ParseError;
use crate::types::{ClockFlags, GnssData};
use log::trace;

const BLOCK_SIZE: usize = 16;

const OFFSET_ITOW: usize = 0;
const OFFSET_FTOW: usize = 4;
const OFFSET_WEEK: usize = 8;
const OFFSET_LEAP_S: usize = 10;
const OFFSET_VALID: usize = 11;
const OFFSET_T_ACC: usize = 12;

const VALID_TOW_MASK: u8 = 0x01;
const VALID_WEEK_MASK: u8 = 0x02;
const VALID_LEAP_MASK: u8 = 0x04;

const SECONDS_IN_WEEK: i64 = 7 * 24 * 60 * 60;
const FULL_WEEK_MS: i64 = SECONDS_IN_WEEK * 1000;
const NS_IN_SECOND: i64 = 1_000_000_000;
/// Difference between the hardware clock epoch and the GPS epoch, in hours.
const GPS_TIME_BASE_DIFFERENCE_HOURS: i64 = 87768;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NavTimeGpsParcel {
    valid: bool,
    itow_ms: u32,
    ftow_ns: i32,
    week: i16,
    leap_seconds: i8,
    valid_mask: u8,
    time_accuracy_ns: u32,
    clock_flags: ClockFlags,
    time_nano: i64,
}

impl NavTimeGpsParcel {
    pub fn parse(payload: &[u8]) -> Self {
        let mut parsed = Self::default();
        if payload.len() != BLOCK_SIZE {
            trace!("nav-timegps payload of {} bytes rejected", payload.len());
            return parsed;
        }
        parsed.itow_ms = read_u32(payload, OFFSET_ITOW);
        parsed.ftow_ns = read_i32(payload, OFFSET_FTOW);
        parsed.week = read_i16(payload, OFFSET_WEEK);
        parsed.leap_seconds = payload[OFFSET_LEAP_S] as i8;
        parsed.valid_mask = payload[OFFSET_VALID];
        parsed.time_accuracy_ns = read_u32(payload, OFFSET_T_ACC);

        if parsed.check_flags().is_ok() {
            parsed.set_time_nano();
            parsed.valid = true;
        }
        parsed
    }

    fn check_flags(&mut self) -> Result<(), ParseError> {
        if self.valid_mask & VALID_LEAP_MASK == VALID_LEAP_MASK {
            self.clock_flags.insert(ClockFlags::HAS_LEAP_SECOND);
        }
        let tow_valid = self.valid_mask & VALID_TOW_MASK == VALID_TOW_MASK;
        let week_valid = self.valid_mask & VALID_WEEK_MASK == VALID_WEEK_MASK;
        if tow_valid && week_valid {
            self.clock_flags
                .insert(ClockFlags::HAS_TIME_UNCERTAINTY | ClockFlags::HAS_FULL_BIAS);
            Ok(())
        } else {
            Err(ParseError::InvalidData)
        }
    }

    fn set_time_nano(&mut self) {
        let gps_time_ns = i64::from(self.week) * FULL_WEEK_MS * MS_TO_NS;
        let tow_ns = i64::from(self.itow_ms) * MS_TO_NS + i64::from(self.ftow_ns);
        self.time_nano = gps_time_ns + tow_ns;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Nanoseconds of GPS time reconstructed from week, iTOW and fTOW.
    pub fn time_nano(&self) -> i64 {
        self.time_nano
    }

    fn gps_time_seconds(&self) -> i64 {
        i64::from(self.week) * SECONDS_IN_WEEK + i64::from(self.itow_ms) / 1000
    }

    fn gps_to_system_seconds(&self) -> i64 {
        GPS_TIME_BASE_DIFFERENCE_HOURS * 3600 + self.gps_time_seconds()
    }

    pub fn into_gnss_data(&self, out: &mut GnssData) -> Result<(), ParseError> {
        if !self.valid {
            return Err(ParseError::InvalidData);
        }
        let ftow = i64::from(self.ftow_ns);
        out.clock.time_ns = self.gps_to_system_seconds() * NS_IN_SECOND + ftow;
        // The receiver local time is a mapping of the local reference onto a
        // GNSS time base, so the full bias is the distance to GPS time.
        out.clock.full_bias_ns =
            out.clock.time_ns - self.gps_time_seconds() * NS_IN_SECOND + ftow;
        out.clock.bias_ns = ftow as f64;
        out.clock.bias_uncertainty_ns = f64::from(self.time_accuracy_ns);
        out.clock.time_uncertainty_ns = f64::from(self.time_accuracy_ns);
        out.clock.leap_second = i16::from(self.leap_seconds);
        out.clock.flags.insert(self.clock_flags);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn timegps_payload(
    itow_ms: u32,
    ftow_ns: i32,
    week: i16,
    leap: i8,
    valid: u8,
    t_acc: u32,
) -> Vec<u8> {
    let mut p = Vec::with_capacity(BLOCK_SIZE);
    p.extend_from_slice(&itow_ms.to_le_bytes());
    p.extend_from_slice(&ftow_ns.to_le_bytes());
    p.extend_from_slice(&week.to_le_bytes());
    p.push(leap as u8);
    p.push(valid);
    p.extend_from_slice(&t_acc.to_le_bytes());
    p
}
