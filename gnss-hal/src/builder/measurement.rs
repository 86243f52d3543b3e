//! Measurement builder: gathers one parser of each UBX kind needed for a
//! measurement epoch within a deadline, then merges them into one record.

use super::QUEUE_WAIT;
use crate::error::BuildError;
use crate::queue::MessageQueue;
use crate::types::{ElapsedRealtime, GnssData};
use crate::ubx::{MeasurementParcel, UbxMsgKind};
use log::trace;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// NAV-TIMEGPS, NAV-CLOCK, NAV-STATUS and RXM-MEASX.
const PARSERS_EXPECTED: usize = 4;
const COLLECT_DEADLINE: Duration = Duration::from_millis(2000);

pub struct MeasurementBuilder {
    queue: Arc<MessageQueue>,
}

impl MeasurementBuilder {
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        Self { queue }
    }

    /// One build cycle. The parsers apply in kind order, so the STATUS
    /// rebase sees the TIMEGPS time and CLOCK refines the bias last.
    pub fn build(&self, out: &mut GnssData) -> Result<(), BuildError> {
        let parsers = self.collect_parsers()?;
        for parser in parsers.values() {
            if !parser.is_valid() {
                return Err(BuildError::Invalid);
            }
            parser
                .into_gnss_data(out)
                .map_err(|_| BuildError::Invalid)?;
        }
        out.elapsed_realtime = ElapsedRealtime::now();
        Ok(())
    }

    /// Pull parsers off the shared queue until one of every expected kind is
    /// present or the deadline passes. Later parsers of a kind replace
    /// earlier ones.
    fn collect_parsers(&self) -> Result<BTreeMap<UbxMsgKind, MeasurementParcel>, BuildError> {
        let parcels = self.queue.of::<MeasurementParcel>();
        let mut collected = BTreeMap::new();
        let start = Instant::now();

        while collected.len() != PARSERS_EXPECTED || !parcels.is_empty() {
            match parcels.pop() {
                Some(parcel) => {
                    collected.insert(parcel.kind(), parcel);
                }
                None => {
                    parcels.wait_not_empty(QUEUE_WAIT);
                }
            }
            if start.elapsed() >= COLLECT_DEADLINE {
                break;
            }
        }

        if collected.len() != PARSERS_EXPECTED {
            trace!(
                "measurement epoch dropped with {} of {PARSERS_EXPECTED} parsers",
                collected.len()
            );
            return Err(if collected.is_empty() {
                BuildError::Empty
            } else {
                BuildError::Incomplete
            });
        }
        Ok(collected)
    }
}
