//! GSA: active satellites. Yields the list of svids used in the current
//! position fix, in raw (wire) svid space.

use super::{split_fields, talker_to_gnss_id, NmeaConstellationId, NmeaVersion};
use crate::error::ParseError;
use log::trace;

const FIELD_TALKER: usize = 0;
/// Start of the repeated svid block (12 positions).
const FIELD_SV_BEGIN: usize = 3;
const FIELD_SV_END: usize = 15;
/// NMEA-defined GNSS system id, available in 4.10 and later.
const FIELD_SYSTEM_ID: usize = 18;

const FIELDS_AMOUNT: [usize; NmeaVersion::AMOUNT] = [18, 19, 19];

#[derive(Debug, Default, Clone, PartialEq)]
pub struct GsaSentence {
    valid: bool,
    gnss_id: usize,
    sv_list: Vec<i64>,
}

impl GsaSentence {
    pub fn parse(sentence: &str, version: NmeaVersion) -> Self {
        let mut parsed = Self::default();
        match parsed.parse_fields(sentence, version) {
            Ok(()) => parsed.valid = true,
            Err(e) => trace!("gsa rejected ({e}): {}", sentence.trim_end()),
        }
        parsed
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Constellation index in [`NmeaConstellationId`] space; out-of-range
    /// values mean the system id was unknown and the parcel is unusable for
    /// the fix join.
    pub fn gnss_id(&self) -> usize {
        self.gnss_id
    }

    pub fn sv_list(&self) -> &[i64] {
        &self.sv_list
    }

    pub fn into_fix_list(self) -> (usize, Vec<i64>) {
        (self.gnss_id, self.sv_list)
    }

    fn parse_fields(&mut self, sentence: &str, version: NmeaVersion) -> Result<(), ParseError> {
        if sentence.is_empty() {
            return Err(ParseError::IncompletePacket);
        }
        let fields = split_fields(sentence);
        if fields.len() != FIELDS_AMOUNT[version.index()] {
            trace!("wrong gsa field count {}", fields.len());
            return Err(ParseError::IncompletePacket);
        }

        self.gnss_id = if version >= NmeaVersion::V41 {
            fields[FIELD_SYSTEM_ID]
                .parse::<usize>()
                .ok()
                .and_then(|id| id.checked_sub(1))
                .unwrap_or(NmeaConstellationId::COUNT)
        } else {
            talker_to_gnss_id(fields[FIELD_TALKER])
        };

        // If fewer than 12 satellites are used for navigation, the
        // remaining positions are left empty.
        for field in &fields[FIELD_SV_BEGIN..FIELD_SV_END] {
            if field.is_empty() {
                break;
            }
            self.sv_list
                .push(field.parse().map_err(|_| ParseError::InvalidData)?);
        }
        Ok(())
    }
}
