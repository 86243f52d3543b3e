//! RMC: recommended minimum navigation data, the core of every location
//! record.

use super::{split_fields, NmeaVersion};
use crate::error::ParseError;
use crate::types::{GnssLocation, LocationFlags};
use chrono::{Local, NaiveDate, Offset};
use log::trace;

const FIELD_TIME: usize = 1;
const FIELD_STATUS: usize = 2;
const FIELD_LATITUDE: usize = 3;
const FIELD_NORTH_SOUTH: usize = 4;
const FIELD_LONGITUDE: usize = 5;
const FIELD_EAST_WEST: usize = 6;
const FIELD_SPEED: usize = 7;
const FIELD_COURSE: usize = 8;
const FIELD_DATE: usize = 9;

/// Minimum field count per protocol version; the magnetic-variation pair at
/// the tail may be empty or absent.
const MIN_FIELDS: [usize; NmeaVersion::AMOUNT] = [12, 13, 13];

const KNOTS_TO_KMPH: f32 = 1.852;
const KMPH_TO_MPS: f32 = 3.6;
const MINUTES_PER_DEGREE: f64 = 60.0;

// Stated accuracies of the receiver generations behind each protocol
// version, from the NEO-7 / NEO-8 datasheets.
const SPEED_ACC_UBLOX7_MPS: f32 = 0.1;
const BEARING_ACC_UBLOX7_DEG: f32 = 0.5;
const SPEED_ACC_UBLOX8_MPS: f32 = 0.05;
const BEARING_ACC_UBLOX8_DEG: f32 = 0.3;

const STATUS_ACTIVE: &str = "A";

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Parcel {
    latitude: f64,
    longitude: f64,
    speed_mps: f32,
    course_deg: f32,
    timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RmcSentence {
    valid: bool,
    version: NmeaVersion,
    parcel: Parcel,
    flags: LocationFlags,
    speed_accuracy: f32,
    bearing_accuracy: f32,
}

impl RmcSentence {
    pub fn parse(sentence: &str, version: NmeaVersion) -> Self {
        let mut parsed = Self {
            valid: false,
            version,
            parcel: Parcel::default(),
            flags: LocationFlags::empty(),
            speed_accuracy: 0.0,
            bearing_accuracy: 0.0,
        };
        match parsed.parse_fields(sentence) {
            Ok(()) => {
                parsed.set_accuracy_constants();
                parsed.valid = true;
            }
            Err(e) => trace!("rmc rejected ({e}): {}", sentence.trim_end()),
        }
        parsed
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn protocol_version(&self) -> NmeaVersion {
        self.version
    }

    /// Copy the parsed fix into a location record.
    pub fn into_location(&self, out: &mut GnssLocation) -> Result<(), ParseError> {
        if !self.valid {
            return Err(ParseError::InvalidData);
        }
        out.flags = self.flags;
        out.timestamp_ms = self.parcel.timestamp_ms;
        out.latitude_degrees = self.parcel.latitude;
        out.longitude_degrees = self.parcel.longitude;
        out.speed_mps = self.parcel.speed_mps;
        out.bearing_degrees = self.parcel.course_deg;
        out.speed_accuracy_mps = self.speed_accuracy;
        out.bearing_accuracy_degrees = self.bearing_accuracy;
        Ok(())
    }

    fn parse_fields(&mut self, sentence: &str) -> Result<(), ParseError> {
        if sentence.is_empty() {
            return Err(ParseError::IncompletePacket);
        }
        let fields = split_fields(sentence);
        if fields.len() < MIN_FIELDS[self.version.index()] {
            return Err(ParseError::IncompletePacket);
        }
        if fields[FIELD_STATUS] != STATUS_ACTIVE {
            return Err(ParseError::InvalidData);
        }

        self.set_time(fields[FIELD_DATE], fields[FIELD_TIME])?;
        self.set_location(
            fields[FIELD_LATITUDE],
            fields[FIELD_LONGITUDE],
            fields[FIELD_NORTH_SOUTH],
            fields[FIELD_EAST_WEST],
        )?;
        self.set_motion(fields[FIELD_SPEED], fields[FIELD_COURSE])?;
        self.flags = LocationFlags::HAS_LAT_LONG
            | LocationFlags::HAS_SPEED
            | LocationFlags::HAS_BEARING
            | LocationFlags::HAS_SPEED_ACCURACY
            | LocationFlags::HAS_BEARING_ACCURACY;
        Ok(())
    }

    /// Combine `ddmmyy` and `hhmmss` as UTC, then add the host's current
    /// UTC offset to derive the reported epoch milliseconds.
    fn set_time(&mut self, date: &str, time: &str) -> Result<(), ParseError> {
        if date.len() < 6 || time.len() < 6 {
            return Err(ParseError::BadInputParameter);
        }
        let hour: u32 = parse_two(time, 0)?;
        let minute: u32 = parse_two(time, 2)?;
        let second: u32 = parse_two(time, 4)?;
        let day: u32 = parse_two(date, 0)?;
        let month: u32 = parse_two(date, 2)?;
        let two_digit_year: i32 = parse_two(date, 4)? as i32;
        // Two-digit year pivot: 80..99 belong to the 1900s.
        let year = if two_digit_year >= 80 {
            1900 + two_digit_year
        } else {
            2000 + two_digit_year
        };

        let timestamp = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .ok_or(ParseError::InvalidData)?
            .and_utc()
            .timestamp();
        let utc_offset = i64::from(Local::now().offset().fix().local_minus_utc());
        self.parcel.timestamp_ms = (timestamp + utc_offset) * 1000;
        Ok(())
    }

    fn set_location(
        &mut self,
        lat: &str,
        lon: &str,
        north_south: &str,
        east_west: &str,
    ) -> Result<(), ParseError> {
        if lat.is_empty() || lon.is_empty() {
            return Err(ParseError::BadInputParameter);
        }
        let raw_lat: f64 = lat.parse().map_err(|_| ParseError::InvalidData)?;
        let raw_lon: f64 = lon.parse().map_err(|_| ParseError::InvalidData)?;
        self.parcel.latitude = degrees_minutes_to_decimal(raw_lat, north_south == "S");
        self.parcel.longitude = degrees_minutes_to_decimal(raw_lon, east_west == "W");
        Ok(())
    }

    fn set_motion(&mut self, speed: &str, course: &str) -> Result<(), ParseError> {
        if speed.is_empty() || course.is_empty() {
            return Err(ParseError::BadInputParameter);
        }
        let knots: f32 = speed.parse().map_err(|_| ParseError::InvalidData)?;
        self.parcel.speed_mps = knots * KNOTS_TO_KMPH / KMPH_TO_MPS;
        self.parcel.course_deg = course.parse().map_err(|_| ParseError::InvalidData)?;
        Ok(())
    }

    fn set_accuracy_constants(&mut self) {
        let (speed, bearing) = match self.version {
            NmeaVersion::V23 => (SPEED_ACC_UBLOX7_MPS, BEARING_ACC_UBLOX7_DEG),
            NmeaVersion::V41 => (SPEED_ACC_UBLOX8_MPS, BEARING_ACC_UBLOX8_DEG),
            NmeaVersion::V40 => (0.0, 0.0),
        };
        self.speed_accuracy = speed;
        self.bearing_accuracy = bearing;
    }
}

fn parse_two(text: &str, at: usize) -> Result<u32, ParseError> {
    text.get(at..at + 2)
        .and_then(|chunk| chunk.parse().ok())
        .ok_or(ParseError::InvalidData)
}

/// `ddmm.mmmm` to signed decimal degrees.
fn degrees_minutes_to_decimal(raw: f64, negative: bool) -> f64 {
    let degrees = (raw / 100.0).trunc();
    let minutes = (raw / 100.0 - degrees) * 100.0;
    let decimal = degrees + minutes / MINUTES_PER_DEGREE;
    if negative {
        -decimal
    } else {
        decimal
    }
}
