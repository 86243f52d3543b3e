//! UBX binary frame handling: Fletcher-8 validation, parser selection by
//! (class, id) and the per-message parsers.

pub mod ack;
pub mod checksum;
pub mod mon_ver;
pub mod nav_clock;
pub mod nav_pvt;
pub mod nav_status;
pub mod nav_timegps;
pub mod rxm_measx;

pub use ack::AckParcel;
pub use mon_ver::MonVerParcel;
pub use nav_clock::NavClockParcel;
pub use nav_pvt::NavPvtParcel;
pub use nav_status::NavStatusParcel;
pub use nav_timegps::NavTimeGpsParcel;
pub use rxm_measx::RxmMeasxParcel;

use crate::constants::{
    UBX_CLASS_OFFSET, UBX_FRAME_OVERHEAD, UBX_MSG_ID_OFFSET, UBX_PAYLOAD_OFFSET,
};
use crate::error::ParseError;
use crate::queue::MessageQueue;
use crate::reader::UbxFrame;
use crate::types::GnssData;
use checksum::UbxChecksumCalc;
use log::{debug, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const FRAME_WAIT: Duration = Duration::from_secs(1);

/// Message classes and ids of the frames this core speaks, both parsed and
/// written. The `NMEA_*` classes address sentence rate configuration through
/// CFG-MSG.
pub mod ids {
    pub const CLASS_NAV: u8 = 0x01;
    pub const CLASS_RXM: u8 = 0x02;
    pub const CLASS_ACK: u8 = 0x05;
    pub const CLASS_CFG: u8 = 0x06;
    pub const CLASS_MON: u8 = 0x0A;
    pub const CLASS_NMEA_CFG: u8 = 0xF0;
    pub const CLASS_NMEA_CFG_PUBX: u8 = 0xF1;

    pub const ID_ACK_NACK: u8 = 0x00;
    pub const ID_ACK_ACK: u8 = 0x01;
    pub const ID_NAV_STATUS: u8 = 0x03;
    pub const ID_NAV_PVT: u8 = 0x07;
    pub const ID_NAV_TIMEGPS: u8 = 0x20;
    pub const ID_NAV_CLOCK: u8 = 0x22;
    pub const ID_RXM_MEASX: u8 = 0x14;
    pub const ID_MON_VER: u8 = 0x04;

    pub const ID_CFG_PRT: u8 = 0x00;
    pub const ID_CFG_MSG: u8 = 0x01;
    pub const ID_CFG_RST: u8 = 0x04;
    pub const ID_CFG_CLEAR: u8 = 0x09;
    pub const ID_CFG_NMEA: u8 = 0x17;
    pub const ID_CFG_NAV5: u8 = 0x24;
    pub const ID_CFG_GNSS: u8 = 0x3E;

    pub const ID_NMEA_GLL: u8 = 0x01;
    pub const ID_NMEA_RMC: u8 = 0x04;
    pub const ID_NMEA_VTG: u8 = 0x05;
    pub const ID_NMEA_PUBX_POSITION: u8 = 0x00;
}

/// Constellation index of the UBX side (gnssId field values).
pub(crate) mod gnss_id {
    pub const GPS: u8 = 0;
    pub const SBAS: u8 = 1;
    pub const GALILEO: u8 = 2;
    pub const BEIDOU: u8 = 3;
    pub const QZSS: u8 = 5;
    pub const GLONASS: u8 = 6;
}

// Little-endian field accessors. The wire is always little-endian; these
// reverse bytes on a big-endian host by construction.

pub(crate) fn read_u16(payload: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([payload[offset], payload[offset + 1]])
}

pub(crate) fn read_i16(payload: &[u8], offset: usize) -> i16 {
    read_u16(payload, offset) as i16
}

pub(crate) fn read_u32(payload: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

pub(crate) fn read_i32(payload: &[u8], offset: usize) -> i32 {
    read_u32(payload, offset) as i32
}

/// Message kinds of the measurement set, ordered the way the measurement
/// builder applies them: MEASX and TIMEGPS populate the record, STATUS
/// rewrites the full bias from the derived time, CLOCK refines the bias
/// block last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UbxMsgKind {
    NavPvt,
    RxmMeasx,
    NavTimeGps,
    NavStatus,
    NavClock,
    AckAck,
    AckNack,
    MonVer,
}

/// One UBX parser contributing to a measurement epoch. All four kinds meet
/// in a single queue; the builder collects one of each.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementParcel {
    TimeGps(NavTimeGpsParcel),
    Clock(NavClockParcel),
    Status(NavStatusParcel),
    Measx(RxmMeasxParcel),
}

impl MeasurementParcel {
    pub fn kind(&self) -> UbxMsgKind {
        match self {
            MeasurementParcel::TimeGps(_) => UbxMsgKind::NavTimeGps,
            MeasurementParcel::Clock(_) => UbxMsgKind::NavClock,
            MeasurementParcel::Status(_) => UbxMsgKind::NavStatus,
            MeasurementParcel::Measx(_) => UbxMsgKind::RxmMeasx,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            MeasurementParcel::TimeGps(p) => p.is_valid(),
            MeasurementParcel::Clock(p) => p.is_valid(),
            MeasurementParcel::Status(p) => p.is_valid(),
            MeasurementParcel::Measx(p) => p.is_valid(),
        }
    }

    /// Merge this parser's contribution into the shared measurement record.
    pub fn into_gnss_data(&self, out: &mut GnssData) -> Result<(), ParseError> {
        match self {
            MeasurementParcel::TimeGps(p) => p.into_gnss_data(out),
            MeasurementParcel::Clock(p) => p.into_gnss_data(out),
            MeasurementParcel::Status(p) => p.into_gnss_data(out),
            MeasurementParcel::Measx(p) => p.into_gnss_data(out),
        }
    }
}

/// One parsed UBX frame of any supported kind.
#[derive(Debug, Clone, PartialEq)]
pub enum UbxParcel {
    Measurement(MeasurementParcel),
    Ack(AckParcel),
    MonVer(MonVerParcel),
    NavPvt(NavPvtParcel),
}

/// Validate the Fletcher-8 checksum and select the parser by (class, id).
///
/// `frame.data` spans the whole frame from the first sync byte to the second
/// checksum byte; the declared payload length must fit the buffer less the
/// eight bytes of framing.
pub fn parse_frame(frame: &UbxFrame) -> Result<UbxParcel, ParseError> {
    let data = &frame.data;
    let payload_len = usize::from(frame.payload_len);
    if data.len() < payload_len + UBX_FRAME_OVERHEAD {
        return Err(ParseError::IncompletePacket);
    }

    let mut calc = UbxChecksumCalc::new();
    calc.update(&data[UBX_CLASS_OFFSET..UBX_PAYLOAD_OFFSET + payload_len]);
    let (ck_a, ck_b) = calc.result();
    let (rx_ck_a, rx_ck_b) = (
        data[UBX_PAYLOAD_OFFSET + payload_len],
        data[UBX_PAYLOAD_OFFSET + payload_len + 1],
    );
    if !calc.is_valid(rx_ck_a, rx_ck_b) {
        trace!("ubx checksum mismatch");
        return Err(ParseError::BadChecksum {
            expect: u16::from_le_bytes([rx_ck_a, rx_ck_b]),
            got: u16::from_le_bytes([ck_a, ck_b]),
        });
    }

    let class = data[UBX_CLASS_OFFSET];
    let id = data[UBX_MSG_ID_OFFSET];
    let payload = &data[UBX_PAYLOAD_OFFSET..UBX_PAYLOAD_OFFSET + payload_len];

    match (class, id) {
        (ids::CLASS_ACK, ids::ID_ACK_ACK) => {
            Ok(UbxParcel::Ack(AckParcel::parse(payload, UbxMsgKind::AckAck)))
        }
        (ids::CLASS_ACK, ids::ID_ACK_NACK) => Ok(UbxParcel::Ack(AckParcel::parse(
            payload,
            UbxMsgKind::AckNack,
        ))),
        (ids::CLASS_NAV, ids::ID_NAV_TIMEGPS) => Ok(UbxParcel::Measurement(
            MeasurementParcel::TimeGps(NavTimeGpsParcel::parse(payload)),
        )),
        (ids::CLASS_NAV, ids::ID_NAV_CLOCK) => Ok(UbxParcel::Measurement(
            MeasurementParcel::Clock(NavClockParcel::parse(payload)),
        )),
        (ids::CLASS_NAV, ids::ID_NAV_STATUS) => Ok(UbxParcel::Measurement(
            MeasurementParcel::Status(NavStatusParcel::parse(payload)),
        )),
        (ids::CLASS_NAV, ids::ID_NAV_PVT) => {
            Ok(UbxParcel::NavPvt(NavPvtParcel::parse(payload)))
        }
        (ids::CLASS_RXM, ids::ID_RXM_MEASX) => Ok(UbxParcel::Measurement(
            MeasurementParcel::Measx(RxmMeasxParcel::parse(payload)),
        )),
        (ids::CLASS_MON, ids::ID_MON_VER) => {
            Ok(UbxParcel::MonVer(MonVerParcel::parse(payload)))
        }
        _ => {
            trace!("unexpected ubx message 0x{class:02x}/0x{id:02x}");
            Err(ParseError::UnknownType)
        }
    }
}

/// Dispatcher thread: drains raw UBX frames, validates and parses them, and
/// pushes typed parcels onto their queues.
pub struct UbxMsgHandler {
    queue: Arc<MessageQueue>,
    exit: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl UbxMsgHandler {
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        Self {
            queue,
            exit: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn start_processing(&self) {
        self.exit.store(false, Ordering::Release);
        let queue = Arc::clone(&self.queue);
        let exit = Arc::clone(&self.exit);
        let handle = thread::Builder::new()
            .name("ubx-handler".into())
            .spawn(move || processing_loop(&queue, &exit))
            .expect("spawning the ubx handler thread");
        *self.worker.lock().unwrap() = Some(handle);
    }

    pub fn stop_processing(&self) {
        self.exit.store(true, Ordering::Release);
        self.queue.of::<UbxFrame>().notify_all();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for UbxMsgHandler {
    fn drop(&mut self) {
        self.stop_processing();
    }
}

fn processing_loop(queue: &Arc<MessageQueue>, exit: &AtomicBool) {
    let frames = queue.of::<UbxFrame>();
    while !exit.load(Ordering::Acquire) {
        let Some(frame) = frames.pop_wait(FRAME_WAIT) else {
            continue;
        };
        match parse_frame(&frame) {
            Ok(parcel) => route_parcel(queue, parcel),
            Err(e) => debug!("dropping ubx frame: {e}"),
        }
    }
}

fn route_parcel(queue: &Arc<MessageQueue>, parcel: UbxParcel) {
    match parcel {
        UbxParcel::Measurement(parcel) => queue.of::<MeasurementParcel>().push(parcel),
        UbxParcel::Ack(parcel) => queue.of::<AckParcel>().push(parcel),
        UbxParcel::MonVer(parcel) => queue.of::<MonVerParcel>().push(parcel),
        UbxParcel::NavPvt(parcel) => queue.of::<NavPvtParcel>().push(parcel),
    }
}

/// Build a whole frame around a body for tests and the fakes.
#[cfg(test)]
pub(crate) fn frame_of(class: u8, id: u8, payload: &[u8]) -> UbxFrame {
    let mut body = Vec::with_capacity(payload.len() + 4);
    body.push(class);
    body.push(id);
    body.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    body.extend_from_slice(payload);
    let (ck_a, ck_b) = checksum::ubx_checksum(&body);
    let mut data = vec![0xB5, 0x62];
    data.extend_from_slice(&body);
    data.push(ck_a);
    data.push(ck_b);
    UbxFrame {
        data,
        payload_len: payload.len() as u16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_frame_selects_the_ack_parser() {
        let frame = frame_of(ids::CLASS_ACK, ids::ID_ACK_ACK, &[0x06, 0x3E]);
        match parse_frame(&frame).unwrap() {
            UbxParcel::Ack(ack) => {
                assert_eq!(ack.kind(), UbxMsgKind::AckAck);
                assert_eq!(ack.acknowledged(), Some((0x06, 0x3E)));
            }
            other => panic!("wrong parcel: {other:?}"),
        }
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut frame = frame_of(ids::CLASS_ACK, ids::ID_ACK_ACK, &[0x06, 0x3E]);
        let last = frame.data.len() - 1;
        frame.data[last] = frame.data[last].wrapping_add(1);
        assert!(matches!(
            parse_frame(&frame),
            Err(ParseError::BadChecksum { .. })
        ));
    }

    #[test]
    fn truncated_frame_is_incomplete() {
        let mut frame = frame_of(ids::CLASS_NAV, ids::ID_NAV_CLOCK, &[0u8; 20]);
        frame.data.truncate(10);
        assert_eq!(parse_frame(&frame), Err(ParseError::IncompletePacket));
    }

    #[test]
    fn unknown_class_is_not_forwarded() {
        let frame = frame_of(0x13, 0x37, &[]);
        assert_eq!(parse_frame(&frame), Err(ParseError::UnknownType));
    }

    #[test]
    fn field_accessors_decode_little_endian() {
        let payload = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(read_u16(&payload, 0), 0x0201);
        assert_eq!(read_u32(&payload, 0), 0x0403_0201);
        assert_eq!(read_i16(&payload, 2), 0x0403);
        assert_eq!(read_i32(&[0xFF, 0xFF, 0xFF, 0xFF], 0), -1);
    }

    #[test]
    fn measurement_kind_ordering_matches_application_order() {
        assert!(UbxMsgKind::RxmMeasx < UbxMsgKind::NavTimeGps);
        assert!(UbxMsgKind::NavTimeGps < UbxMsgKind::NavStatus);
        assert!(UbxMsgKind::NavStatus < UbxMsgKind::NavClock);
    }
}
