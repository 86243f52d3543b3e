//! NMEA 0183 sentence handling: structural validation, XOR checksum, parser
//! selection and the per-sentence parsers.

pub mod gga;
pub mod gsa;
pub mod gsv;
pub mod pubx00;
pub mod rmc;
pub mod txt;

pub use gga::GgaSentence;
pub use gsa::GsaSentence;
pub use gsv::GsvSentence;
pub use pubx00::Pubx00Sentence;
pub use rmc::RmcSentence;
pub use txt::TxtSentence;

use crate::constants::{NMEA_CHECKSUM_CHAR_FROM_END, NMEA_MIN_SENTENCE_LEN};
use crate::error::ParseError;
use crate::queue::MessageQueue;
use crate::reader::NmeaFrame;
use crate::types::LocationFlags;
use log::{debug, trace};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const FRAME_WAIT: Duration = Duration::from_secs(1);

/// NMEA protocol version spoken by the receiver after configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum NmeaVersion {
    #[default]
    V23 = 0,
    V40 = 1,
    V41 = 2,
}

impl NmeaVersion {
    pub(crate) const AMOUNT: usize = 3;

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        match index {
            1 => NmeaVersion::V40,
            2 => NmeaVersion::V41,
            _ => NmeaVersion::V23,
        }
    }
}

/// Constellation grouping used by the NMEA side; GSV and GSA meet in this
/// index space when the sv-info builder joins them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmeaConstellationId {
    GpsSbasQzss = 0,
    Glonass = 1,
    Galileo = 2,
    Beidou = 3,
    /// Mixed-talker (`GN`) reports.
    Any = 4,
}

impl NmeaConstellationId {
    pub const COUNT: usize = 5;
}

/// Talker prefix to constellation index for pre-v4.1 GSA sentences.
pub(crate) fn talker_to_gnss_id(leading_field: &str) -> usize {
    let talker = leading_field.strip_prefix('$').unwrap_or(leading_field);
    match talker.get(..2) {
        Some("GP") | Some("GN") => NmeaConstellationId::GpsSbasQzss as usize,
        Some("GL") => NmeaConstellationId::Glonass as usize,
        Some("GA") => NmeaConstellationId::Galileo as usize,
        Some("GB") => NmeaConstellationId::Beidou as usize,
        _ => NmeaConstellationId::GpsSbasQzss as usize,
    }
}

/// Altitude and accuracy overlay merged into location records, fed by GGA
/// and PUBX,00.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LocationExtraInfo {
    pub flags: LocationFlags,
    pub altitude: f64,
    pub horizontal_acc: f32,
    pub vertical_acc: f32,
}

/// GGA and PUBX,00 share one queue; each kind merges itself into the latest
/// extra-info slot with its own overwrite rules.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraInfoSentence {
    Gga(GgaSentence),
    Pubx00(Pubx00Sentence),
}

impl ExtraInfoSentence {
    pub fn is_valid(&self) -> bool {
        match self {
            ExtraInfoSentence::Gga(s) => s.is_valid(),
            ExtraInfoSentence::Pubx00(s) => s.is_valid(),
        }
    }

    pub fn apply(&self, extra: &mut LocationExtraInfo) {
        match self {
            ExtraInfoSentence::Gga(s) => s.apply(extra),
            ExtraInfoSentence::Pubx00(s) => s.apply(extra),
        }
    }
}

/// One parsed sentence of any supported kind.
#[derive(Debug, Clone, PartialEq)]
pub enum NmeaParcel {
    Rmc(RmcSentence),
    Gga(GgaSentence),
    Gsa(GsaSentence),
    Gsv(GsvSentence),
    Pubx00(Pubx00Sentence),
    Txt(TxtSentence),
}

/// Split a sentence into comma-separated fields. The checksum suffix (from
/// `*` on) is not a field; a trailing comma yields a trailing empty field.
pub(crate) fn split_fields(sentence: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut rest = sentence;
    loop {
        match rest.find(',') {
            Some(comma) => {
                fields.push(&rest[..comma]);
                rest = &rest[comma + 1..];
            }
            None => {
                let end = rest.find('*').unwrap_or(rest.len());
                fields.push(&rest[..end]);
                break;
            }
        }
    }
    fields
}

/// Structural and checksum validation of one whole sentence.
///
/// The XOR runs over every byte between `$` and `*`, both exclusive, and is
/// compared against the two uppercase hex digits after the `*`.
pub fn validate_sentence(sentence: &str) -> Result<(), ParseError> {
    let bytes = sentence.as_bytes();
    let len = bytes.len();
    if len < NMEA_MIN_SENTENCE_LEN
        || bytes[0] != b'$'
        || bytes[len - 1] != b'\n'
        || bytes[len - NMEA_CHECKSUM_CHAR_FROM_END] != b'*'
    {
        debug!("incorrect sentence structure: {}", sentence.trim_end());
        return Err(ParseError::InvalidData);
    }

    let mut checksum = 0u8;
    for &byte in &bytes[1..len - NMEA_CHECKSUM_CHAR_FROM_END] {
        checksum ^= byte;
    }

    let expect_text = std::str::from_utf8(&bytes[len - NMEA_CHECKSUM_CHAR_FROM_END + 1..len - 2])
        .map_err(|_| ParseError::InvalidData)?;
    let expect = u8::from_str_radix(expect_text, 16).map_err(|_| ParseError::InvalidData)?;
    if checksum != expect {
        debug!("bad sentence checksum: {}", sentence.trim_end());
        return Err(ParseError::BadChecksum {
            expect: u16::from(expect),
            got: u16::from(checksum),
        });
    }
    Ok(())
}

/// Choose the parser by the type substring of the leading talker+type field
/// and run it. PUBX,00 is matched across the first separator because the
/// message id lives in the second field.
pub fn parse_sentence(sentence: &str, version: NmeaVersion) -> Result<NmeaParcel, ParseError> {
    let leading = sentence.split(',').next().unwrap_or("");
    if sentence.starts_with("$PUBX,00") {
        Ok(NmeaParcel::Pubx00(Pubx00Sentence::parse(sentence, version)))
    } else if leading.contains("GGA") {
        Ok(NmeaParcel::Gga(GgaSentence::parse(sentence, version)))
    } else if leading.contains("GSA") {
        Ok(NmeaParcel::Gsa(GsaSentence::parse(sentence, version)))
    } else if leading.contains("GSV") {
        Ok(NmeaParcel::Gsv(GsvSentence::parse(sentence, version)))
    } else if leading.contains("RMC") {
        Ok(NmeaParcel::Rmc(RmcSentence::parse(sentence, version)))
    } else if leading.contains("TXT") {
        Ok(NmeaParcel::Txt(TxtSentence::parse(sentence, version)))
    } else {
        Err(ParseError::UnknownType)
    }
}

/// Dispatcher thread: drains raw sentence frames, validates them, parses and
/// pushes typed parcels onto their queues.
pub struct NmeaMsgHandler {
    queue: Arc<MessageQueue>,
    protocol: Arc<AtomicUsize>,
    exit: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NmeaMsgHandler {
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        Self {
            queue,
            protocol: Arc::new(AtomicUsize::new(NmeaVersion::V23.index())),
            exit: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// The configurator raises the protocol version once the receiver is
    /// switched to NMEA 4.1.
    pub fn update_protocol_version(&self, version: NmeaVersion) {
        self.protocol.store(version.index(), Ordering::Release);
    }

    pub fn start_processing(&self) {
        self.exit.store(false, Ordering::Release);
        let queue = Arc::clone(&self.queue);
        let protocol = Arc::clone(&self.protocol);
        let exit = Arc::clone(&self.exit);
        let handle = thread::Builder::new()
            .name("nmea-handler".into())
            .spawn(move || processing_loop(&queue, &protocol, &exit))
            .expect("spawning the nmea handler thread");
        *self.worker.lock().unwrap() = Some(handle);
    }

    pub fn stop_processing(&self) {
        self.exit.store(true, Ordering::Release);
        self.queue.of::<NmeaFrame>().notify_all();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for NmeaMsgHandler {
    fn drop(&mut self) {
        self.stop_processing();
    }
}

fn processing_loop(queue: &Arc<MessageQueue>, protocol: &AtomicUsize, exit: &AtomicBool) {
    let frames = queue.of::<NmeaFrame>();
    while !exit.load(Ordering::Acquire) {
        let Some(frame) = frames.pop_wait(FRAME_WAIT) else {
            continue;
        };
        let Ok(sentence) = String::from_utf8(frame.0) else {
            debug!("dropping non-utf8 sentence");
            continue;
        };
        if validate_sentence(&sentence).is_err() {
            continue;
        }
        let version = NmeaVersion::from_index(protocol.load(Ordering::Acquire));
        match parse_sentence(&sentence, version) {
            Ok(parcel) => route_parcel(queue, parcel),
            Err(e) => trace!("unroutable sentence ({e}): {}", sentence.trim_end()),
        }
    }
}

fn route_parcel(queue: &Arc<MessageQueue>, parcel: NmeaParcel) {
    match parcel {
        NmeaParcel::Rmc(sentence) => queue.of::<RmcSentence>().push(sentence),
        NmeaParcel::Gga(sentence) => queue
            .of::<ExtraInfoSentence>()
            .push(ExtraInfoSentence::Gga(sentence)),
        NmeaParcel::Pubx00(sentence) => queue
            .of::<ExtraInfoSentence>()
            .push(ExtraInfoSentence::Pubx00(sentence)),
        NmeaParcel::Gsa(sentence) => queue.of::<GsaSentence>().push(sentence),
        NmeaParcel::Gsv(sentence) => queue.of::<GsvSentence>().push(sentence),
        // Diagnostics are logged by severity, never forwarded.
        NmeaParcel::Txt(sentence) => sentence.log(),
    }
}

/// Append the XOR checksum and line terminator to a bare sentence body.
#[cfg(test)]
pub(crate) fn with_checksum(body: &str) -> String {
    let checksum = body.bytes().fold(0u8, |acc, b| acc ^ b);
    format!("${body}*{checksum:02X}\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_empty_fields_and_strips_checksum() {
        let fields = split_fields("$GPRMC,123519,A,,N*6A\r\n");
        assert_eq!(fields, vec!["$GPRMC", "123519", "A", "", "N"]);
    }

    #[test]
    fn split_trailing_comma_yields_empty_field() {
        let fields = split_fields("$GPGSA,A,3,,*30\r\n");
        assert_eq!(fields, vec!["$GPGSA", "A", "3", "", ""]);
    }

    #[test]
    fn valid_checksum_passes() {
        let sentence = with_checksum("GPGLL,4916.45,N,12311.12,W,225444,A,");
        validate_sentence(&sentence).unwrap();
    }

    #[test]
    fn corrupted_checksum_fails() {
        let mut sentence = with_checksum("GPGLL,4916.45,N,12311.12,W,225444,A,");
        sentence.replace_range(1..2, "X");
        assert!(matches!(
            validate_sentence(&sentence),
            Err(ParseError::BadChecksum { .. })
        ));
    }

    #[test]
    fn truncated_sentence_fails_structure_check() {
        assert_eq!(
            validate_sentence("$GP\r\n"),
            Err(ParseError::InvalidData)
        );
        assert_eq!(
            validate_sentence("GPGGA,123,456*11\r\n"),
            Err(ParseError::InvalidData)
        );
    }

    #[test]
    fn parser_selection_by_leading_field() {
        let rmc = with_checksum("GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,,");
        assert!(matches!(
            parse_sentence(&rmc, NmeaVersion::V23),
            Ok(NmeaParcel::Rmc(_))
        ));
        let pubx = with_checksum("PUBX,00,081350.00,4717.113210,N,00833.915187,E,546.589,G3,2.1,2.0,0.007,77.52,0.007,,0.92,1.19,0.77,9,0,0");
        assert!(matches!(
            parse_sentence(&pubx, NmeaVersion::V23),
            Ok(NmeaParcel::Pubx00(_))
        ));
        let unknown = with_checksum("GPZDA,201530.00,04,07,2002,00,00");
        assert_eq!(
            parse_sentence(&unknown, NmeaVersion::V23).err(),
            Some(ParseError::UnknownType)
        );
    }

    #[test]
    fn talker_mapping() {
        assert_eq!(talker_to_gnss_id("$GPGSA"), 0);
        assert_eq!(talker_to_gnss_id("$GNGSA"), 0);
        assert_eq!(talker_to_gnss_id("$GLGSA"), 1);
        assert_eq!(talker_to_gnss_id("$GAGSA"), 2);
        assert_eq!(talker_to_gnss_id("$GBGSA"), 3);
    }
}
