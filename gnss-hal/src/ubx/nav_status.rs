//! NAV-STATUS: navigation status. Only the millisecond-since-startup
//! counter is consumed; it rebases the clock time of the measurement record
//! onto the receiver's local time base.

use super::read_u32;
use crate::constants::MS_TO_NS;
use crate::error::ParseError;
use crate::types::GnssData;
use log::trace;

const BLOCK_SIZE: usize = 16;

const OFFSET_ITOW: usize = 0;
const OFFSET_MSSS: usize = 12;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NavStatusParcel {
    valid: bool,
    itow: u32,
    msss: u32,
    time_nano: i64,
}

impl NavStatusParcel {
    pub fn parse(payload: &[u8]) -> Self {
        if payload.len() != BLOCK_SIZE {
            trace!("nav-status payload of {} bytes rejected", payload.len());
            return Self::default();
        }
        let msss = read_u32(payload, OFFSET_MSSS);
        Self {
            valid: true,
            itow: read_u32(payload, OFFSET_ITOW),
            msss,
            time_nano: i64::from(msss) * MS_TO_NS,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn itow(&self) -> u32 {
        self.itow
    }

    /// Shift the full bias so the emitted time equals the msss-derived
    /// value: the reported clock stays consistent after the rebase.
    pub fn into_gnss_data(&self, out: &mut GnssData) -> Result<(), ParseError> {
        if !self.valid {
            return Err(ParseError::InvalidData);
        }
        out.clock.full_bias_ns -= out.clock.time_ns - self.time_nano;
        out.clock.time_ns = self.time_nano;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(itow: u32, msss: u32) -> Vec<u8> {
        let mut p = vec![0u8; BLOCK_SIZE];
        p[OFFSET_ITOW..OFFSET_ITOW + 4].copy_from_slice(&itow.to_le_bytes());
        p[OFFSET_MSSS..OFFSET_MSSS + 4].copy_from_slice(&msss.to_le_bytes());
        p
    }

    #[test]
    fn rebases_time_and_preserves_the_derived_instant() {
        let parcel = NavStatusParcel::parse(&payload(433200, 5000));
        assert!(parcel.is_valid());

        let mut data = GnssData::default();
        data.clock.time_ns = 1_000_000_000_000;
        data.clock.full_bias_ns = 250;
        parcel.into_gnss_data(&mut data).unwrap();

        assert_eq!(data.clock.time_ns, 5_000_000_000);
        // time_ns - full_bias_ns is unchanged by the rebase.
        assert_eq!(
            data.clock.time_ns - data.clock.full_bias_ns,
            1_000_000_000_000 - 250
        );
    }

    #[test]
    fn wrong_size_is_invalid() {
        assert!(!NavStatusParcel::parse(&[0u8; 15]).is_valid());
    }
}
