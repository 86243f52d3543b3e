use core::fmt;
use std::io;

/// Transport level failures. Wire writes and reads keep these local to the
/// reader / configurator; nothing here is fatal by itself.
#[derive(Debug)]
pub enum TransportError {
    NotReady,
    FailedToRead,
    FailedToWrite,
    Io(io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotReady => f.write_str("transport is not ready"),
            TransportError::FailedToRead => f.write_str("failed to read from transport"),
            TransportError::FailedToWrite => f.write_str("failed to write to transport"),
            TransportError::Io(e) => write!(f, "transport i/o error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Error that is possible during parsing of one NMEA sentence or UBX frame.
/// A parse error drops the parcel; the reader resynchronises on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    IncompletePacket,
    InvalidData,
    BadChecksum { expect: u16, got: u16 },
    BadInputParameter,
    UnknownType,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::IncompletePacket => f.write_str("incomplete packet"),
            ParseError::InvalidData => f.write_str("invalid data"),
            ParseError::BadChecksum { expect, got } => write!(
                f,
                "checksum mismatch, expected 0x{expect:04x}, got 0x{got:04x}"
            ),
            ParseError::BadInputParameter => f.write_str("bad input parameter"),
            ParseError::UnknownType => f.write_str("unknown message type"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Builder level outcomes. Neither is fatal: the provider skips the current
/// output cycle and waits for the next interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// Some messages are missing.
    Incomplete,
    /// Some messages are invalid.
    Invalid,
    /// No parsers in the message queue at all.
    Empty,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Incomplete => f.write_str("some messages are missing"),
            BuildError::Invalid => f.write_str("some messages are invalid"),
            BuildError::Empty => f.write_str("message queue is empty"),
        }
    }
}

impl std::error::Error for BuildError {}

/// Configurator failures. The only errors of the core that are allowed to be
/// fatal for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No ACK arrived within the per-attempt window.
    AckTimeout { class: u8, id: u8 },
    /// The receiver answered with a NACK for the command.
    NackReceived { class: u8, id: u8 },
    /// MON-VER did not report a known software family.
    UnsupportedReceiver,
    /// Retries exhausted or the transport failed mid-sequence.
    InternalError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::AckTimeout { class, id } => {
                write!(f, "timed out waiting for ack of 0x{class:02x}/0x{id:02x}")
            }
            ConfigError::NackReceived { class, id } => {
                write!(f, "receiver nacked command 0x{class:02x}/0x{id:02x}")
            }
            ConfigError::UnsupportedReceiver => f.write_str("unsupported receiver software version"),
            ConfigError::InternalError => f.write_str("configurator internal error"),
        }
    }
}

impl std::error::Error for ConfigError {}
