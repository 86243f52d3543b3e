//! NAV-PVT: combined position, velocity and time solution.

use super::{read_i32, read_u32};
use crate::error::ParseError;
use log::trace;

/// Fixed part of the payload this parser consumes. Newer protocol versions
/// append fields past this block; they are accepted and ignored.
const BLOCK_SIZE: usize = 84;

const OFFSET_FIX_TYPE: usize = 20;
const OFFSET_FLAGS1: usize = 21;
const OFFSET_FLAGS2: usize = 22;
const OFFSET_NUM_SVS: usize = 23;
const OFFSET_LON: usize = 24;
const OFFSET_LAT: usize = 28;
const OFFSET_HEIGHT_MSL: usize = 36;
const OFFSET_HORIZONTAL_ACC: usize = 40;
const OFFSET_VERTICAL_ACC: usize = 44;
const OFFSET_GROUND_SPEED: usize = 60;
const OFFSET_HEADING: usize = 64;
const OFFSET_SPEED_ACC: usize = 68;
const OFFSET_HEADING_ACC: usize = 72;

const DEGREES_SCALE: f64 = 1e-7;
const MM_TO_M: f64 = 1e-3;
const HEADING_SCALE: f64 = 1e-5;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NavPvtParcel {
    valid: bool,
    fix_type: u8,
    flags1: u8,
    flags2: u8,
    num_svs: u8,
    lon_raw: i32,
    lat_raw: i32,
    height_msl_mm: i32,
    horizontal_acc_mm: u32,
    vertical_acc_mm: u32,
    ground_speed_mms: i32,
    heading_raw: i32,
    speed_acc_mms: u32,
    heading_acc_raw: u32,
}

impl NavPvtParcel {
    pub fn parse(payload: &[u8]) -> Self {
        // The payload must carry at least the fixed block.
        if payload.len() < BLOCK_SIZE {
            trace!("nav-pvt payload of {} bytes rejected", payload.len());
            return Self::default();
        }
        Self {
            valid: true,
            fix_type: payload[OFFSET_FIX_TYPE],
            flags1: payload[OFFSET_FLAGS1],
            flags2: payload[OFFSET_FLAGS2],
            num_svs: payload[OFFSET_NUM_SVS],
            lon_raw: read_i32(payload, OFFSET_LON),
            lat_raw: read_i32(payload, OFFSET_LAT),
            height_msl_mm: read_i32(payload, OFFSET_HEIGHT_MSL),
            horizontal_acc_mm: read_u32(payload, OFFSET_HORIZONTAL_ACC),
            vertical_acc_mm: read_u32(payload, OFFSET_VERTICAL_ACC),
            ground_speed_mms: read_i32(payload, OFFSET_GROUND_SPEED),
            heading_raw: read_i32(payload, OFFSET_HEADING),
            speed_acc_mms: read_u32(payload, OFFSET_SPEED_ACC),
            heading_acc_raw: read_u32(payload, OFFSET_HEADING_ACC),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn fix_type(&self) -> u8 {
        self.fix_type
    }

    pub fn num_svs(&self) -> u8 {
        self.num_svs
    }

    pub fn lat_degrees(&self) -> f64 {
        f64::from(self.lat_raw) * DEGREES_SCALE
    }

    pub fn lon_degrees(&self) -> f64 {
        f64::from(self.lon_raw) * DEGREES_SCALE
    }

    pub fn height_msl_meters(&self) -> f64 {
        f64::from(self.height_msl_mm) * MM_TO_M
    }

    pub fn horizontal_accuracy_meters(&self) -> f64 {
        f64::from(self.horizontal_acc_mm) * MM_TO_M
    }

    pub fn vertical_accuracy_meters(&self) -> f64 {
        f64::from(self.vertical_acc_mm) * MM_TO_M
    }

    pub fn ground_speed_mps(&self) -> f64 {
        f64::from(self.ground_speed_mms) * MM_TO_M
    }

    pub fn heading_degrees(&self) -> f64 {
        f64::from(self.heading_raw) * HEADING_SCALE
    }

    pub fn speed_accuracy_mps(&self) -> f64 {
        f64::from(self.speed_acc_mms) * MM_TO_M
    }

    pub fn heading_accuracy_degrees(&self) -> f64 {
        f64::from(self.heading_acc_raw) * HEADING_SCALE
    }

    pub fn ensure_valid(&self) -> Result<(), ParseError> {
        if self.valid {
            Ok(())
        } else {
            Err(ParseError::IncompletePacket)
        }
    }
}
