//! Wire-level constants shared by the framed reader, the dispatchers and the
//! configurator.

pub const UBX_SYNC_CHAR_1: u8 = 0xb5;
pub const UBX_SYNC_CHAR_2: u8 = 0x62;
pub(crate) const UBX_CLASS_OFFSET: usize = 2; // After SYNC_CHAR_1, SYNC_CHAR_2
pub(crate) const UBX_MSG_ID_OFFSET: usize = 3; // After CLASS
pub(crate) const UBX_LENGTH_OFFSET: usize = 4; // After MSG_ID
pub(crate) const UBX_PAYLOAD_OFFSET: usize = 6;
/// Sync chars, class, id, length field and the two trailing checksum bytes.
pub(crate) const UBX_FRAME_OVERHEAD: usize = 8;

pub const NMEA_SYNC_CHAR: u8 = b'$';
pub const NMEA_END_CHAR_1: u8 = b'\r';
pub const NMEA_END_CHAR_2: u8 = b'\n';
/// sync (1) + talker (2) + msg type (3) + end chars (2)
pub(crate) const NMEA_MIN_SENTENCE_LEN: usize = 8;
/// `*` sits five characters before the end of a terminated sentence.
pub(crate) const NMEA_CHECKSUM_CHAR_FROM_END: usize = 5;

/// Per-type depth of every message queue; overflow drops the oldest entry.
pub const MAX_QUEUE_DEPTH: usize = 128;

/// Flat satellite cap of one emitted sv-info report.
pub(crate) const SVS_COUNT_MAX: usize = 64;

pub(crate) const MS_TO_NS: i64 = 1_000_000;
