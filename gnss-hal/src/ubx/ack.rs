//! ACK-ACK / ACK-NACK: command acknowledgement, consumed by the
//! configurator.

use super::UbxMsgKind;
use log::trace;

const BLOCK_SIZE: usize = 2;
const OFFSET_CLASS: usize = 0;
const OFFSET_ID: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckParcel {
    valid: bool,
    kind: UbxMsgKind,
    class: u8,
    id: u8,
}

impl AckParcel {
    pub fn parse(payload: &[u8], kind: UbxMsgKind) -> Self {
        if payload.len() != BLOCK_SIZE {
            trace!("ack payload of {} bytes rejected", payload.len());
            return Self {
                valid: false,
                kind,
                class: 0,
                id: 0,
            };
        }
        Self {
            valid: true,
            kind,
            class: payload[OFFSET_CLASS],
            id: payload[OFFSET_ID],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether this is an ACK or a NACK.
    pub fn kind(&self) -> UbxMsgKind {
        self.kind
    }

    /// (class, id) of the command being acknowledged.
    pub fn acknowledged(&self) -> Option<(u8, u8)> {
        self.valid.then_some((self.class, self.id))
    }
}
