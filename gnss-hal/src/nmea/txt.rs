//! TXT: receiver diagnostics. Logged by severity and never forwarded.

use super::{split_fields, NmeaVersion};
use crate::error::ParseError;
use log::{debug, error, info, trace, warn};

const FIELD_MSG_AMOUNT: usize = 1;
const FIELD_MSG_NUM: usize = 2;
const FIELD_MSG_TYPE: usize = 3;
const FIELD_TEXT: usize = 4;

const MIN_FIELDS: usize = 5;

const SEVERITY_ERROR: u8 = 0;
const SEVERITY_WARNING: u8 = 1;
const SEVERITY_NOTICE: u8 = 2;
const SEVERITY_USER: u8 = 7;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TxtSentence {
    valid: bool,
    msg_amount: u8,
    msg_num: u8,
    severity: u8,
    text: String,
}

impl TxtSentence {
    pub fn parse(sentence: &str, _version: NmeaVersion) -> Self {
        let mut parsed = Self::default();
        match parsed.parse_fields(sentence) {
            Ok(()) => parsed.valid = true,
            Err(e) => trace!("txt rejected ({e}): {}", sentence.trim_end()),
        }
        parsed
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Emit the diagnostic through the logger at its own severity.
    pub fn log(&self) {
        if !self.valid {
            return;
        }
        match self.severity {
            SEVERITY_ERROR => error!("receiver: {}", self.text),
            SEVERITY_WARNING => warn!("receiver: {}", self.text),
            SEVERITY_NOTICE => info!("receiver: {}", self.text),
            SEVERITY_USER => debug!("receiver: {}", self.text),
            other => trace!("receiver (severity {other}): {}", self.text),
        }
    }

    fn parse_fields(&mut self, sentence: &str) -> Result<(), ParseError> {
        if sentence.is_empty() {
            return Err(ParseError::IncompletePacket);
        }
        let fields = split_fields(sentence);
        if fields.len() < MIN_FIELDS {
            return Err(ParseError::IncompletePacket);
        }
        self.msg_amount = fields[FIELD_MSG_AMOUNT]
            .parse()
            .map_err(|_| ParseError::InvalidData)?;
        self.msg_num = fields[FIELD_MSG_NUM]
            .parse()
            .map_err(|_| ParseError::InvalidData)?;
        self.severity = fields[FIELD_MSG_TYPE]
            .parse()
            .map_err(|_| ParseError::InvalidData)?;
        self.text = fields[FIELD_TEXT].to_owned();
        Ok(())
    }
}
