//! GSV: satellites in view. One sentence is one block of a multi-message
//! group; the sv-info builder reassembles the group.

use super::{split_fields, NmeaConstellationId, NmeaVersion};
use crate::error::ParseError;
use crate::types::{Constellation, GnssSvInfo, SvFlags};
use log::{trace, warn};

const FIELD_TALKER: usize = 0;
const FIELD_MSG_AMOUNT: usize = 1;
const FIELD_MSG_NUM: usize = 2;
const FIELD_NUM_SV_IN_VIEW: usize = 3;

const REPEATED_BLOCK_START: usize = 4;
const REPEATED_BLOCK_FIELDS: usize = 4;
const BLOCK_SVID: usize = 0;
const BLOCK_ELEVATION: usize = 1;
const BLOCK_AZIMUTH: usize = 2;
const BLOCK_CN0: usize = 3;

const MIN_FIELDS: [usize; NmeaVersion::AMOUNT] = [7, 8, 8];

const L1_BAND_FREQUENCY_MHZ: f32 = 1575.42;
const B1_BAND_FREQUENCY_MHZ: f32 = 1561.098;
const L1_GLONASS_BAND_FREQUENCY_MHZ: f32 = 1602.562;
const MHZ_TO_HZ: f32 = 1_000_000.0;

const GPS_SVID_RANGE: (i32, i32) = (1, 32);
const SBAS_SVID_RANGE: (i32, i32) = (33, 64);
const SBAS2_SVID_RANGE: (i32, i32) = (152, 158);
const QZSS_SVID_RANGE: (i32, i32) = (193, 197);
const GALILEO_SVID_RANGE: (i32, i32) = (1, 36);
const GLONASS_SVID_RANGE: (i32, i32) = (65, 88);

const GLONASS_SVID_SHIFT: i32 = 64;
const SBAS_SVID_SHIFT: i32 = 87;
const SBAS2_SVID_SHIFT: i32 = 31;
/// Fallback for GLONASS satellites reporting a frequency channel number
/// instead of a slot.
const GLONASS_FCN_SVID: i32 = 93;

#[derive(Debug, Clone, PartialEq)]
pub struct GsvSentence {
    valid: bool,
    gnss_id: NmeaConstellationId,
    msg_amount: u8,
    msg_num: u8,
    num_sv_in_view: u32,
    carrier_frequency_hz: f32,
    sv_flags: SvFlags,
    satellites: Vec<GnssSvInfo>,
}

impl Default for GsvSentence {
    fn default() -> Self {
        Self {
            valid: false,
            gnss_id: NmeaConstellationId::Any,
            msg_amount: 0,
            msg_num: 0,
            num_sv_in_view: 0,
            carrier_frequency_hz: 0.0,
            sv_flags: SvFlags::empty(),
            satellites: Vec::new(),
        }
    }
}

impl GsvSentence {
    pub fn parse(sentence: &str, version: NmeaVersion) -> Self {
        let mut parsed = Self::default();
        match parsed.parse_fields(sentence, version) {
            Ok(()) => parsed.valid = true,
            Err(e) => trace!("gsv rejected ({e}): {}", sentence.trim_end()),
        }
        parsed
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn gnss_id(&self) -> NmeaConstellationId {
        self.gnss_id
    }

    pub fn msg_amount(&self) -> u8 {
        self.msg_amount
    }

    pub fn msg_num(&self) -> u8 {
        self.msg_num
    }

    pub fn num_sv_in_view(&self) -> u32 {
        self.num_sv_in_view
    }

    pub fn satellites(&self) -> &[GnssSvInfo] {
        &self.satellites
    }

    fn parse_fields(&mut self, sentence: &str, version: NmeaVersion) -> Result<(), ParseError> {
        if sentence.is_empty() {
            return Err(ParseError::IncompletePacket);
        }
        let fields = split_fields(sentence);
        if fields.len() < MIN_FIELDS[version.index()] {
            return Err(ParseError::IncompletePacket);
        }
        self.parse_single_block(&fields)?;
        self.parse_repeated_blocks(&fields)
    }

    fn parse_single_block(&mut self, fields: &[&str]) -> Result<(), ParseError> {
        self.sv_flags = SvFlags::HAS_ALMANAC_DATA | SvFlags::HAS_CARRIER_FREQUENCY;
        let (gnss_id, frequency_mhz) = match fields[FIELD_TALKER].get(..3) {
            Some("$GP") => (NmeaConstellationId::GpsSbasQzss, L1_BAND_FREQUENCY_MHZ),
            Some("$GL") => (NmeaConstellationId::Glonass, L1_GLONASS_BAND_FREQUENCY_MHZ),
            Some("$GA") => (NmeaConstellationId::Galileo, L1_BAND_FREQUENCY_MHZ),
            Some("$GB") => (NmeaConstellationId::Beidou, B1_BAND_FREQUENCY_MHZ),
            Some("$GN") => {
                // Mixed-talker report: the carrier frequency is undefined.
                self.sv_flags.remove(SvFlags::HAS_CARRIER_FREQUENCY);
                (NmeaConstellationId::Any, 0.0)
            }
            _ => return Err(ParseError::BadInputParameter),
        };
        self.gnss_id = gnss_id;
        self.carrier_frequency_hz = frequency_mhz * MHZ_TO_HZ;
        self.msg_amount = parse_int(fields[FIELD_MSG_AMOUNT]) as u8;
        self.msg_num = parse_int(fields[FIELD_MSG_NUM]) as u8;
        self.num_sv_in_view = parse_int(fields[FIELD_NUM_SV_IN_VIEW]) as u32;
        Ok(())
    }

    fn parse_repeated_blocks(&mut self, fields: &[&str]) -> Result<(), ParseError> {
        let mut result = Err(ParseError::InvalidData);
        let mut block = &fields[REPEATED_BLOCK_START.min(fields.len())..];
        while block.len() >= REPEATED_BLOCK_FIELDS {
            self.parse_repeated_block(&block[..REPEATED_BLOCK_FIELDS]);
            result = Ok(());
            block = &block[REPEATED_BLOCK_FIELDS..];
        }
        // A v4.1 signal-id tail of fewer than four fields is ignored.
        result
    }

    fn parse_repeated_block(&mut self, block: &[&str]) {
        let raw_svid = parse_int(block[BLOCK_SVID]);
        let (constellation, svid) = self.normalize_svid(raw_svid);
        self.satellites.push(GnssSvInfo {
            svid: svid as i16,
            constellation,
            cn0_dbhz: parse_int(block[BLOCK_CN0]) as f32,
            elevation_degrees: parse_int(block[BLOCK_ELEVATION]) as f32,
            azimuth_degrees: parse_int(block[BLOCK_AZIMUTH]) as f32,
            carrier_frequency_hz: self.carrier_frequency_hz,
            flags: self.sv_flags,
        });
    }

    /// The wire svid space overlaps between constellations sharing a
    /// talker; resolve the constellation and rebase the svid.
    fn normalize_svid(&self, svid: i32) -> (Constellation, i32) {
        match self.gnss_id {
            NmeaConstellationId::GpsSbasQzss => match svid {
                _ if in_range(svid, GPS_SVID_RANGE) => (Constellation::Gps, svid),
                _ if in_range(svid, SBAS_SVID_RANGE) => {
                    (Constellation::Sbas, svid + SBAS_SVID_SHIFT)
                }
                _ if in_range(svid, SBAS2_SVID_RANGE) => {
                    (Constellation::Sbas, svid + SBAS2_SVID_SHIFT)
                }
                _ if in_range(svid, QZSS_SVID_RANGE) => (Constellation::Qzss, svid),
                _ => {
                    warn!("unexpected svid {svid} for a GPS-talker report");
                    (Constellation::Unknown, svid)
                }
            },
            NmeaConstellationId::Galileo => {
                if in_range(svid, GALILEO_SVID_RANGE) {
                    (Constellation::Galileo, svid)
                } else {
                    warn!("unexpected svid {svid} for a Galileo report");
                    (Constellation::Unknown, svid)
                }
            }
            NmeaConstellationId::Glonass => {
                if in_range(svid, GLONASS_SVID_RANGE) {
                    (Constellation::Glonass, svid - GLONASS_SVID_SHIFT)
                } else {
                    (Constellation::Glonass, GLONASS_FCN_SVID)
                }
            }
            _ => {
                warn!("unknown constellation for svid {svid}");
                (Constellation::Unknown, svid)
            }
        }
    }
}

fn parse_int(field: &str) -> i32 {
    field.trim().parse().unwrap_or(0)
}

fn in_range(value: i32, range: (i32, i32)) -> bool {
    value >= range.0 && value <= range.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmea::with_checksum;

    #[test]
    fn gps_block_with_four_satellites() {
        let gsv = GsvSentence::parse(
            &with_checksum("GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00,13,06,292,00"),
            NmeaVersion::V23,
        );
        assert!(gsv.is_valid());
        assert_eq!(gsv.gnss_id(), NmeaConstellationId::GpsSbasQzss);
        assert_eq!(gsv.msg_amount(), 3);
        assert_eq!(gsv.msg_num(), 1);
        assert_eq!(gsv.num_sv_in_view(), 11);
        assert_eq!(gsv.satellites().len(), 4);

        let first = gsv.satellites()[0];
        assert_eq!(first.svid, 3);
        assert_eq!(first.constellation, Constellation::Gps);
        assert_eq!(first.elevation_degrees, 3.0);
        assert_eq!(first.azimuth_degrees, 111.0);
        assert_eq!(first.cn0_dbhz, 0.0);
        assert!((first.carrier_frequency_hz - 1_575_420_000.0).abs() < 1.0);
        assert!(first.flags.contains(SvFlags::HAS_CARRIER_FREQUENCY));
        assert!(first.flags.contains(SvFlags::HAS_ALMANAC_DATA));
    }

    #[test]
    fn sbas_and_qzss_share_the_gps_talker() {
        let gsv = GsvSentence::parse(
            &with_checksum("GPGSV,1,1,03,33,10,100,41,155,20,200,42,193,30,300,43"),
            NmeaVersion::V23,
        );
        assert!(gsv.is_valid());
        let svs = gsv.satellites();
        assert_eq!(svs[0].constellation, Constellation::Sbas);
        assert_eq!(svs[0].svid, 33 + 87);
        assert_eq!(svs[1].constellation, Constellation::Sbas);
        assert_eq!(svs[1].svid, 155 + 31);
        assert_eq!(svs[2].constellation, Constellation::Qzss);
        assert_eq!(svs[2].svid, 193);
    }

    #[test]
    fn glonass_svids_are_rebased() {
        let gsv = GsvSentence::parse(
            &with_checksum("GLGSV,1,1,02,65,60,045,40,99,10,200,30"),
            NmeaVersion::V23,
        );
        assert!(gsv.is_valid());
        let svs = gsv.satellites();
        assert_eq!(svs[0].constellation, Constellation::Glonass);
        assert_eq!(svs[0].svid, 1);
        assert!((svs[0].carrier_frequency_hz - 1_602_562_000.0).abs() < 1.0);
        // Out-of-slot GLONASS ids alias to the FCN placeholder.
        assert_eq!(svs[1].svid, 93);
    }

    #[test]
    fn mixed_talker_clears_the_carrier_frequency() {
        let gsv = GsvSentence::parse(
            &with_checksum("GNGSV,1,1,01,01,10,100,40"),
            NmeaVersion::V23,
        );
        assert!(gsv.is_valid());
        let sv = gsv.satellites()[0];
        assert!(!sv.flags.contains(SvFlags::HAS_CARRIER_FREQUENCY));
        assert_eq!(sv.carrier_frequency_hz, 0.0);
    }

    #[test]
    fn v41_signal_id_tail_is_ignored() {
        let gsv = GsvSentence::parse(
            &with_checksum("GAGSV,1,1,02,02,45,100,40,08,30,200,38,7"),
            NmeaVersion::V41,
        );
        assert!(gsv.is_valid());
        assert_eq!(gsv.satellites().len(), 2);
        assert_eq!(gsv.satellites()[0].constellation, Constellation::Galileo);
    }

    #[test]
    fn unknown_talker_is_rejected() {
        let gsv = GsvSentence::parse(
            &with_checksum("GQGSV,1,1,01,01,10,100,40"),
            NmeaVersion::V23,
        );
        assert!(!gsv.is_valid());
    }

    #[test]
    fn sentence_without_any_block_is_invalid() {
        let gsv = GsvSentence::parse(&with_checksum("GPGSV,1,1,00"), NmeaVersion::V23);
        assert!(!gsv.is_valid());
    }
}
