//! RXM-MEASX: satellite measurements for RRLP. One repeated block becomes
//! one per-satellite pseudorange measurement.

use super::{gnss_id, read_i32, read_u16, read_u32};
use crate::constants::MS_TO_NS;
use crate::error::ParseError;
use crate::types::{Constellation, GnssData, GnssMeasurement, MeasurementState, MultipathIndicator};
use log::trace;

const SINGLE_BLOCK_SIZE: usize = 44;
const REPEATED_BLOCK_SIZE: usize = 24;
const MAX_SVS: usize = 64;

// Single block offsets; the gaps are reserved wire fields.
const OFFSET_VERSION: usize = 0;
const OFFSET_GPS_TOW: usize = 4;
const OFFSET_GLONASS_TOW: usize = 8;
const OFFSET_BDS_TOW: usize = 12;
const OFFSET_QZSS_TOW: usize = 20;
const OFFSET_GPS_TOW_ACC: usize = 24;
const OFFSET_GLONASS_TOW_ACC: usize = 26;
const OFFSET_BDS_TOW_ACC: usize = 28;
const OFFSET_QZSS_TOW_ACC: usize = 32;
const OFFSET_NUM_SVS: usize = 34;
const OFFSET_TOW_SET: usize = 35;

// Repeated block offsets.
const OFFSET_GNSS_ID: usize = 0;
const OFFSET_SVID: usize = 1;
const OFFSET_CN0: usize = 2;
const OFFSET_MULTIPATH: usize = 3;
const OFFSET_PSEUDORANGE_RATE: usize = 4;

const PSEUDORANGE_RATE_SCALE: f64 = 0.04;
const TOW_ACC_SCALE: f64 = 16.0;
const PSEUDORANGE_RATE_UNCERTAINTY_MPS: f64 = 0.075;

const L1_BAND_FREQUENCY_HZ: f32 = 1_575_420_000.0;
const B1_BAND_FREQUENCY_HZ: f32 = 1_561_098_000.0;
const L1_GLONASS_BAND_FREQUENCY_HZ: f32 = 1_602_562_000.0;

// Satellite vehicle numbering per the interface description.
const GPS_SVID: (u8, u8) = (1, 32);
const SBAS_ONE_SVID: (u8, u8) = (120, 151);
const SBAS_TWO_SVID: (u8, u8) = (183, 192);
const GALILEO_SVID: (u8, u8) = (1, 36);
const QZSS_SVID: (u8, u8) = (193, 200);
const BEIDOU_SVID: (u8, u8) = (1, 37);
const GLONASS_SVID: (u8, u8) = (1, 24);
const GLONASS_FCN: (u8, u8) = (93, 106);

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct SingleBlock {
    version: u8,
    num_svs: u8,
    gps_tow_ms: u32,
    glonass_tow_ms: u32,
    bds_tow_ms: u32,
    qzss_tow_ms: u32,
    gps_tow_acc: u16,
    glonass_tow_acc: u16,
    bds_tow_acc: u16,
    qzss_tow_acc: u16,
    tow_set: u8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct RepeatedBlock {
    gnss_id: u8,
    svid: u8,
    cn0: u8,
    multipath: u8,
    pseudorange_rate: i32,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RxmMeasxParcel {
    valid: bool,
    single: SingleBlock,
    repeated: Vec<RepeatedBlock>,
}

impl RxmMeasxParcel {
    pub fn parse(payload: &[u8]) -> Self {
        let mut parsed = Self::default();
        if parsed.parse_blocks(payload).is_ok() {
            parsed.valid = true;
        } else {
            trace!("rxm-measx payload of {} bytes rejected", payload.len());
        }
        parsed
    }

    fn parse_blocks(&mut self, payload: &[u8]) -> Result<(), ParseError> {
        if payload.len() > MAX_SVS * REPEATED_BLOCK_SIZE + SINGLE_BLOCK_SIZE
            || payload.len() < SINGLE_BLOCK_SIZE + REPEATED_BLOCK_SIZE
        {
            return Err(ParseError::IncompletePacket);
        }
        self.parse_single_block(payload);
        if usize::from(self.single.num_svs) > MAX_SVS {
            return Err(ParseError::InvalidData);
        }
        self.parse_repeated_blocks(&payload[SINGLE_BLOCK_SIZE..])
    }

    fn parse_single_block(&mut self, p: &[u8]) {
        self.single = SingleBlock {
            version: p[OFFSET_VERSION],
            num_svs: p[OFFSET_NUM_SVS],
            gps_tow_ms: read_u32(p, OFFSET_GPS_TOW),
            glonass_tow_ms: read_u32(p, OFFSET_GLONASS_TOW),
            bds_tow_ms: read_u32(p, OFFSET_BDS_TOW),
            qzss_tow_ms: read_u32(p, OFFSET_QZSS_TOW),
            gps_tow_acc: read_u16(p, OFFSET_GPS_TOW_ACC),
            glonass_tow_acc: read_u16(p, OFFSET_GLONASS_TOW_ACC),
            bds_tow_acc: read_u16(p, OFFSET_BDS_TOW_ACC),
            qzss_tow_acc: read_u16(p, OFFSET_QZSS_TOW_ACC),
            tow_set: p[OFFSET_TOW_SET],
        };
    }

    fn parse_repeated_blocks(&mut self, blocks: &[u8]) -> Result<(), ParseError> {
        let mut offset = 0;
        for _ in 0..self.single.num_svs {
            if offset + REPEATED_BLOCK_SIZE > blocks.len() {
                break;
            }
            let block = &blocks[offset..offset + REPEATED_BLOCK_SIZE];
            self.repeated.push(RepeatedBlock {
                gnss_id: block[OFFSET_GNSS_ID],
                svid: block[OFFSET_SVID],
                cn0: block[OFFSET_CN0],
                multipath: block[OFFSET_MULTIPATH],
                pseudorange_rate: read_i32(block, OFFSET_PSEUDORANGE_RATE),
            });
            offset += REPEATED_BLOCK_SIZE;
        }
        if self.repeated.is_empty() {
            return Err(ParseError::IncompletePacket);
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn num_svs(&self) -> u8 {
        self.single.num_svs
    }

    /// Expand the repeated blocks into the measurement list of the record.
    pub fn into_gnss_data(&self, out: &mut GnssData) -> Result<(), ParseError> {
        if !self.valid {
            return Err(ParseError::InvalidData);
        }
        for block in &self.repeated {
            out.measurements.push(self.measurement_of(block));
        }
        Ok(())
    }

    fn measurement_of(&self, block: &RepeatedBlock) -> GnssMeasurement {
        let carrier_frequency_hz = carrier_frequency(block.gnss_id);
        let mut measurement = GnssMeasurement {
            svid: i16::from(valid_svid(block.gnss_id, block.svid)),
            constellation: constellation_of(block.gnss_id),
            carrier_frequency_hz,
            cn0_dbhz: f64::from(block.cn0),
            multipath_indicator: if block.multipath == 0 {
                MultipathIndicator::NotPresent
            } else {
                MultipathIndicator::Present
            },
            pseudorange_rate_mps: f64::from(block.pseudorange_rate) * PSEUDORANGE_RATE_SCALE,
            pseudorange_rate_uncertainty_mps: PSEUDORANGE_RATE_UNCERTAINTY_MPS,
            code_type: "C",
            ..Default::default()
        };

        let (tow_ms, state) = self.tow_of(block.gnss_id);
        measurement.state = state;
        measurement.received_sv_time_ns = i64::from(tow_ms) * MS_TO_NS;
        if self.single.tow_set != 0 && state != MeasurementState::empty() {
            let acc_ns =
                (f64::from(self.tow_acc_of(block.gnss_id)) / TOW_ACC_SCALE * MS_TO_NS as f64) as i64;
            // Never report a zero uncertainty.
            measurement.received_sv_time_uncertainty_ns = acc_ns.max(1);
        }
        measurement
    }

    /// Per-constellation time of week and its synchronisation state. SBAS
    /// and Galileo borrow the GPS time of week and only claim a known TOW.
    fn tow_of(&self, id: u8) -> (u32, MeasurementState) {
        match id {
            gnss_id::GPS => (self.single.gps_tow_ms, MeasurementState::STATE_TOW_DECODED),
            gnss_id::GLONASS => (
                self.single.glonass_tow_ms,
                MeasurementState::STATE_TOW_DECODED,
            ),
            gnss_id::QZSS => (self.single.qzss_tow_ms, MeasurementState::STATE_TOW_DECODED),
            gnss_id::BEIDOU => (self.single.bds_tow_ms, MeasurementState::STATE_TOW_DECODED),
            gnss_id::SBAS | gnss_id::GALILEO => {
                (self.single.gps_tow_ms, MeasurementState::STATE_TOW_KNOWN)
            }
            _ => (0, MeasurementState::empty()),
        }
    }

    fn tow_acc_of(&self, id: u8) -> u16 {
        match id {
            gnss_id::GPS | gnss_id::SBAS | gnss_id::GALILEO => self.single.gps_tow_acc,
            gnss_id::GLONASS => self.single.glonass_tow_acc,
            gnss_id::QZSS => self.single.qzss_tow_acc,
            gnss_id::BEIDOU => self.single.bds_tow_acc,
            _ => 0,
        }
    }
}

fn constellation_of(id: u8) -> Constellation {
    match id {
        gnss_id::GPS => Constellation::Gps,
        gnss_id::SBAS => Constellation::Sbas,
        gnss_id::GALILEO => Constellation::Galileo,
        gnss_id::BEIDOU => Constellation::Beidou,
        gnss_id::QZSS => Constellation::Qzss,
        gnss_id::GLONASS => Constellation::Glonass,
        _ => Constellation::Unknown,
    }
}

fn carrier_frequency(id: u8) -> f32 {
    match id {
        gnss_id::GPS | gnss_id::SBAS | gnss_id::GALILEO | gnss_id::QZSS => L1_BAND_FREQUENCY_HZ,
        gnss_id::BEIDOU => B1_BAND_FREQUENCY_HZ,
        gnss_id::GLONASS => L1_GLONASS_BAND_FREQUENCY_HZ,
        _ => 0.0,
    }
}

fn in_range(value: u8, range: (u8, u8)) -> bool {
    value >= range.0 && value <= range.1
}

/// Clamp the svid into the valid range of its constellation. Out-of-range
/// values fall back to the range start; GLONASS additionally admits the FCN
/// aliases and falls back to their start.
fn valid_svid(id: u8, svid: u8) -> u8 {
    match id {
        gnss_id::GPS => clamp_into(svid, GPS_SVID),
        gnss_id::SBAS => clamp_into_either(svid, SBAS_ONE_SVID, SBAS_TWO_SVID),
        gnss_id::GALILEO => clamp_into(svid, GALILEO_SVID),
        gnss_id::QZSS => clamp_into(svid, QZSS_SVID),
        gnss_id::BEIDOU => clamp_into(svid, BEIDOU_SVID),
        gnss_id::GLONASS => clamp_into_either(svid, GLONASS_SVID, GLONASS_FCN),
        _ => svid,
    }
}

fn clamp_into(svid: u8, range: (u8, u8)) -> u8 {
    if in_range(svid, range) {
        svid
    } else {
        range.0
    }
}

fn clamp_into_either(svid: u8, first: (u8, u8), second: (u8, u8)) -> u8 {
    if in_range(svid, first) || in_range(svid, second) {
        svid
    } else {
        second.0
    }
}

#[cfg(test)]
pub(crate) fn measx_payload(tow_set: u8, blocks: &[(u8, u8, u8, u8, i32)]) -> Vec<u8> {
    let mut p = vec![0u8; SINGLE_BLOCK_SIZE + blocks.len() * REPEATED_BLOCK_SIZE];
    p[OFFSET_VERSION] = 1;
    p[OFFSET_GPS_TOW..OFFSET_GPS_TOW + 4].copy_from_slice(&433200_000_u32.to_le_bytes());
    p[OFFSET_GLONASS_TOW..OFFSET_GLONASS_TOW + 4].copy_from_slice(&433210_000_u32.to_le_bytes());
    p[OFFSET_BDS_TOW..OFFSET_BDS_TOW + 4].copy_from_slice(&433220_000_u32.to_le_bytes());
    p[OFFSET_QZSS_TOW..OFFSET_QZSS_TOW + 4].copy_from_slice(&433230_000_u32.to_le_bytes());
    p[OFFSET_GPS_TOW_ACC..OFFSET_GPS_TOW_ACC + 2].copy_from_slice(&32_u16.to_le_bytes());
    p[OFFSET_GLONASS_TOW_ACC..OFFSET_GLONASS_TOW_ACC + 2].copy_from_slice(&48_u16.to_le_bytes());
    p[OFFSET_NUM_SVS] = blocks.len() as u8;
    p[OFFSET_TOW_SET] = tow_set;
    for (i, &(gnss, svid, cn0, multipath, prr)) in blocks.iter().enumerate() {
        let at = SINGLE_BLOCK_SIZE + i * REPEATED_BLOCK_SIZE;
        p[at + OFFSET_GNSS_ID] = gnss;
        p[at + OFFSET_SVID] = svid;
        p[at + OFFSET_CN0] = cn0;
        p[at + OFFSET_MULTIPATH] = multipath;
        p[at + OFFSET_PSEUDORANGE_RATE..at + OFFSET_PSEUDORANGE_RATE + 4]
            .copy_from_slice(&prr.to_le_bytes());
    }
    p
}
