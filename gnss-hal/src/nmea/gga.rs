//! GGA: fix data. Contributes altitude and an HDOP-derived horizontal
//! accuracy to the extra-info overlay.

use super::{split_fields, LocationExtraInfo, NmeaVersion};
use crate::error::ParseError;
use crate::types::LocationFlags;
use log::trace;

const FIELD_HDOP: usize = 8;
const FIELD_ALTITUDE: usize = 9;

const FIELDS_AMOUNT: [usize; NmeaVersion::AMOUNT] = [15, 15, 15];

/// The NMEA protocol does not report accuracy, so the stated accuracy of the
/// device is multiplied by the horizontal dilution of precision. PUBX,00
/// overrides this estimate with the real figure when the receiver supports
/// it.
const HDOP_TO_ACCURACY_M: f32 = 2.5;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct GgaSentence {
    valid: bool,
    altitude: f64,
    hdop: f64,
    flags: LocationFlags,
}

impl GgaSentence {
    pub fn parse(sentence: &str, version: NmeaVersion) -> Self {
        let mut parsed = Self::default();
        match parsed.parse_fields(sentence, version) {
            Ok(()) => parsed.valid = true,
            Err(e) => trace!("gga rejected ({e}): {}", sentence.trim_end()),
        }
        parsed
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Merge into the latest extra-info slot: replace the altitude and the
    /// horizontal-accuracy estimate, leave vertical accuracy to PUBX,00.
    pub fn apply(&self, extra: &mut LocationExtraInfo) {
        if !self.valid {
            return;
        }
        extra.flags.remove(LocationFlags::HAS_ALTITUDE | LocationFlags::HAS_HORIZONTAL_ACCURACY);
        extra.flags.insert(self.flags);
        extra.altitude = self.altitude;
        extra.horizontal_acc = self.hdop as f32 * HDOP_TO_ACCURACY_M;
    }

    fn parse_fields(&mut self, sentence: &str, version: NmeaVersion) -> Result<(), ParseError> {
        if sentence.is_empty() {
            return Err(ParseError::BadInputParameter);
        }
        let fields = split_fields(sentence);
        if fields.len() != FIELDS_AMOUNT[version.index()] {
            return Err(ParseError::IncompletePacket);
        }
        if fields[FIELD_ALTITUDE].is_empty() {
            return Err(ParseError::InvalidData);
        }
        self.altitude = fields[FIELD_ALTITUDE]
            .parse()
            .map_err(|_| ParseError::InvalidData)?;
        self.flags.insert(LocationFlags::HAS_ALTITUDE);

        if fields[FIELD_HDOP].is_empty() {
            return Err(ParseError::InvalidData);
        }
        self.hdop = fields[FIELD_HDOP]
            .parse()
            .map_err(|_| ParseError::InvalidData)?;
        self.flags.insert(LocationFlags::HAS_HORIZONTAL_ACCURACY);
        Ok(())
    }
}
