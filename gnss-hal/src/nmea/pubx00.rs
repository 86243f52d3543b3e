//! PUBX,00: u-blox proprietary position extension, the authoritative source
//! of horizontal and vertical accuracy.

use super::{split_fields, LocationExtraInfo, NmeaVersion};
use crate::error::ParseError;
use crate::types::LocationFlags;
use log::trace;

const FIELD_MSG_ID: usize = 1;
const FIELD_HORIZONTAL_ACC: usize = 9;
const FIELD_VERTICAL_ACC: usize = 10;

const FIELDS_AMOUNT: [usize; NmeaVersion::AMOUNT] = [21, 21, 21];
const POSITION_MSG_ID: &str = "00";

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Pubx00Sentence {
    valid: bool,
    horizontal_acc: f32,
    vertical_acc: f32,
    flags: LocationFlags,
}

impl Pubx00Sentence {
    pub fn parse(sentence: &str, version: NmeaVersion) -> Self {
        let mut parsed = Self::default();
        match parsed.parse_fields(sentence, version) {
            Ok(()) => parsed.valid = true,
            Err(e) => trace!("pubx00 rejected ({e}): {}", sentence.trim_end()),
        }
        parsed
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Merge into the latest extra-info slot, overriding any GGA-derived
    /// horizontal estimate.
    pub fn apply(&self, extra: &mut LocationExtraInfo) {
        if !self.valid {
            return;
        }
        if self.flags.contains(LocationFlags::HAS_HORIZONTAL_ACCURACY) {
            extra.horizontal_acc = self.horizontal_acc;
        }
        if self.flags.contains(LocationFlags::HAS_VERTICAL_ACCURACY) {
            extra.vertical_acc = self.vertical_acc;
        }
        extra.flags.insert(self.flags);
    }

    fn parse_fields(&mut self, sentence: &str, version: NmeaVersion) -> Result<(), ParseError> {
        if sentence.is_empty() {
            return Err(ParseError::IncompletePacket);
        }
        let fields = split_fields(sentence);
        if fields.len() != FIELDS_AMOUNT[version.index()] {
            return Err(ParseError::IncompletePacket);
        }
        if fields[FIELD_MSG_ID] != POSITION_MSG_ID {
            return Err(ParseError::InvalidData);
        }

        if !fields[FIELD_HORIZONTAL_ACC].is_empty() {
            self.horizontal_acc = fields[FIELD_HORIZONTAL_ACC]
                .parse()
                .map_err(|_| ParseError::InvalidData)?;
            self.flags.insert(LocationFlags::HAS_HORIZONTAL_ACCURACY);
        }
        if !fields[FIELD_VERTICAL_ACC].is_empty() {
            self.vertical_acc = fields[FIELD_VERTICAL_ACC]
                .parse()
                .map_err(|_| ParseError::InvalidData)?;
            self.flags.insert(LocationFlags::HAS_VERTICAL_ACCURACY);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmea::with_checksum;

    const SEED: &str = "PUBX,00,081350.00,4717.113210,N,00833.915187,E,546.589,G3,2.1,3.5,0.007,77.52,0.007,,0.92,1.19,0.77,9,0,0";

    #[test]
    fn accuracies_override_gga_estimate() {
        let pubx = Pubx00Sentence::parse(&with_checksum(SEED), NmeaVersion::V23);
        assert!(pubx.is_valid());

        let mut extra = LocationExtraInfo {
            flags: LocationFlags::HAS_HORIZONTAL_ACCURACY | LocationFlags::HAS_ALTITUDE,
            altitude: 545.4,
            horizontal_acc: 2.25,
            ..Default::default()
        };
        pubx.apply(&mut extra);
        assert!((extra.horizontal_acc - 2.1).abs() < 1e-6);
        assert!((extra.vertical_acc - 3.5).abs() < 1e-6);
        assert!(extra.flags.contains(LocationFlags::HAS_VERTICAL_ACCURACY));
        // The GGA altitude survives.
        assert!(extra.flags.contains(LocationFlags::HAS_ALTITUDE));
        assert_eq!(extra.altitude, 545.4);
    }

    #[test]
    fn other_pubx_message_ids_are_rejected() {
        let pubx = Pubx00Sentence::parse(
            &with_checksum("PUBX,41,1,0007,0003,19200,0,,,,,,,,,,,,,,"),
            NmeaVersion::V23,
        );
        assert!(!pubx.is_valid());
    }

    #[test]
    fn empty_accuracy_fields_leave_flags_clear() {
        let pubx = Pubx00Sentence::parse(
            &with_checksum(
                "PUBX,00,081350.00,4717.113210,N,00833.915187,E,546.589,G3,,,0.007,77.52,0.007,,0.92,1.19,0.77,9,0,0",
            ),
            NmeaVersion::V23,
        );
        assert!(pubx.is_valid());
        let mut extra = LocationExtraInfo::default();
        pubx.apply(&mut extra);
        assert!(extra.flags.is_empty());
    }
}
