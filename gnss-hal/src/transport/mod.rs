//! Byte sources and the framed write path.
//!
//! A transport hands out single bytes to the framed reader and accepts whole
//! UBX command bodies from the configurator. Reads and writes are serialised
//! by two separate locks so the reader thread and the configurator can
//! operate concurrently.

mod fake;
mod tty;

pub use fake::FakeTransport;
pub use tty::TtyTransport;

use crate::constants::{UBX_SYNC_CHAR_1, UBX_SYNC_CHAR_2};
use crate::error::TransportError;
use crate::ubx::checksum::ubx_checksum;

/// Host byte order, detected once and exposed to the framed reader for the
/// byte-order-sensitive UBX length capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

pub fn host_endian() -> Endian {
    if cfg!(target_endian = "big") {
        Endian::Big
    } else {
        Endian::Little
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Ready,
    NotReady,
}

pub trait Transport: Send + Sync {
    fn open(&self) -> Result<(), TransportError>;

    fn close(&self) -> Result<(), TransportError>;

    /// Idempotent close-then-open.
    fn reset(&self) -> Result<(), TransportError> {
        let _ = self.close();
        self.open()
    }

    /// Next byte from the source. Blocks until data is available, the read
    /// window elapses or the source reports end/error.
    fn read_byte(&self) -> Result<u8, TransportError>;

    /// Write raw bytes under the transport's write lock.
    fn write_raw(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Frame `body` as a UBX command and write it atomically: the sync pair,
    /// the body (class, id, length, payload) and the Fletcher-8 checksum of
    /// the body.
    fn write_frame(&self, body: &[u8]) -> Result<(), TransportError> {
        let mut wire = Vec::with_capacity(body.len() + 4);
        wire.push(UBX_SYNC_CHAR_1);
        wire.push(UBX_SYNC_CHAR_2);
        wire.extend_from_slice(body);
        let (ck_a, ck_b) = ubx_checksum(body);
        wire.push(ck_a);
        wire.push(ck_b);
        self.write_raw(&wire)
    }

    fn state(&self) -> TransportState;

    fn path(&self) -> &str;

    fn endian(&self) -> Endian {
        host_endian()
    }

    /// Current line rate; zero when the transport has no notion of baud.
    fn baud_rate(&self) -> u32 {
        0
    }

    /// Change the line rate. Transports without baud control accept and
    /// ignore the request.
    fn set_baud_rate(&self, _rate: u32) -> Result<(), TransportError> {
        Ok(())
    }
}
