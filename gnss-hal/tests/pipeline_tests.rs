//! End-to-end pipeline tests: scripted transport bytes in, fused records
//! out, with the real reader, dispatchers, builders and providers in
//! between.

use gnss_hal::builder::{GnssInfoBuilder, LocationBuilder, MeasurementBuilder};
use gnss_hal::nmea::NmeaMsgHandler;
use gnss_hal::types::{LocationFlags, SvFlags};
use gnss_hal::ubx::{ids, UbxMsgHandler};
use gnss_hal::{
    Configurator, GnssData, HalConfig, LocationData, MessageQueue, SvInfoList, SwVersion,
    Transport, TransportError, TransportState, TtyReader,
};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Serves a scripted byte stream to the reader, then fails like a closed
/// device.
struct ScriptedTransport {
    bytes: Mutex<VecDeque<u8>>,
}

impl ScriptedTransport {
    fn new(stream: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            bytes: Mutex::new(stream.into()),
        })
    }
}

impl Transport for ScriptedTransport {
    fn open(&self) -> Result<(), TransportError> {
        Ok(())
    }
    fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
    fn read_byte(&self) -> Result<u8, TransportError> {
        self.bytes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::FailedToRead)
    }
    fn write_raw(&self, _bytes: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }
    fn state(&self) -> TransportState {
        TransportState::Ready
    }
    fn path(&self) -> &str {
        "scripted"
    }
}

fn nmea_sentence(body: &str) -> Vec<u8> {
    let checksum = body.bytes().fold(0u8, |acc, b| acc ^ b);
    format!("${body}*{checksum:02X}\r\n").into_bytes()
}

fn ubx_frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![class, id];
    body.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    body.extend_from_slice(payload);
    let (mut ck_a, mut ck_b) = (0u8, 0u8);
    for &byte in &body {
        ck_a = ck_a.wrapping_add(byte);
        ck_b = ck_b.wrapping_add(ck_a);
    }
    let mut frame = vec![0xB5, 0x62];
    frame.extend_from_slice(&body);
    frame.push(ck_a);
    frame.push(ck_b);
    frame
}

/// The real ingestion stack around a scripted transport.
struct Pipeline {
    queue: Arc<MessageQueue>,
    reader: TtyReader,
    nmea: NmeaMsgHandler,
    ubx: UbxMsgHandler,
}

impl Pipeline {
    fn start(stream: Vec<u8>) -> Self {
        let queue = MessageQueue::new();
        let transport = ScriptedTransport::new(stream);
        let reader = TtyReader::new(transport, Arc::clone(&queue));
        let nmea = NmeaMsgHandler::new(Arc::clone(&queue));
        let ubx = UbxMsgHandler::new(Arc::clone(&queue));
        nmea.start_processing();
        ubx.start_processing();
        reader.start().unwrap();
        Self {
            queue,
            reader,
            nmea,
            ubx,
        }
    }

    fn stop(self) {
        self.reader.stop();
        self.nmea.stop_processing();
        self.ubx.stop_processing();
    }
}

#[test]
fn rmc_bytes_become_a_location_record() {
    let mut stream = Vec::new();
    stream.extend(nmea_sentence(
        "GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,",
    ));
    stream.extend(nmea_sentence(
        "GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,,",
    ));

    let pipeline = Pipeline::start(stream);
    let builder = LocationBuilder::new(Arc::clone(&pipeline.queue));

    let mut data = LocationData::default();
    let mut built = false;
    for _ in 0..10 {
        if builder.build(&mut data).is_ok() {
            built = true;
            break;
        }
    }
    assert!(built, "no location came out of the pipeline");
    assert!((data.location.latitude_degrees - 48.1173).abs() < 1e-4);
    assert!((data.location.longitude_degrees - 11.5167).abs() < 1e-4);
    assert!((data.location.speed_mps - 11.5236).abs() < 1e-3);
    assert_eq!(data.location.bearing_degrees, 84.4);
    // GGA contributed altitude and the HDOP-derived accuracy.
    assert!((data.location.altitude_meters - 545.4).abs() < 1e-9);
    assert!((data.location.horizontal_accuracy_meters - 0.9 * 2.5).abs() < 1e-6);
    assert!(data.location.flags.contains(LocationFlags::HAS_ALTITUDE));

    pipeline.stop();
}

#[test]
fn corrupted_sentences_never_reach_a_builder() {
    let mut stream = Vec::new();
    // Valid structure, wrong checksum.
    stream.extend(b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,,*00\r\n".to_vec());

    let pipeline = Pipeline::start(stream);
    let builder = LocationBuilder::new(Arc::clone(&pipeline.queue));
    let mut data = LocationData::default();
    assert!(builder.build(&mut data).is_err());
    pipeline.stop();
}

#[test]
fn gsv_group_and_gsa_fuse_into_sv_info() {
    let mut stream = Vec::new();
    stream.extend(nmea_sentence(
        "GPGSV,3,1,11,01,03,111,00,02,15,270,00,06,01,010,00,13,06,292,00",
    ));
    stream.extend(nmea_sentence(
        "GPGSV,3,2,11,14,25,170,00,16,57,208,39,18,67,296,40,19,40,246,00",
    ));
    stream.extend(nmea_sentence(
        "GPGSV,3,3,11,22,42,067,42,24,14,311,43,27,05,244,00",
    ));
    stream.extend(nmea_sentence("GPGSA,A,3,01,02,,,,,,,,,,,2.5,1.3,2.1"));

    let pipeline = Pipeline::start(stream);
    let builder = GnssInfoBuilder::new(Arc::clone(&pipeline.queue));

    let mut list = SvInfoList::new();
    for _ in 0..100 {
        list.clear();
        builder.build(&mut list).unwrap();
        if list.len() == 11 && list.iter().any(|sv| sv.flags.contains(SvFlags::USED_IN_FIX)) {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(list.len(), 11);
    let used: Vec<i16> = list
        .iter()
        .filter(|sv| sv.flags.contains(SvFlags::USED_IN_FIX))
        .map(|sv| sv.svid)
        .collect();
    assert_eq!(used, vec![1, 2]);
    pipeline.stop();
}

#[test]
fn four_ubx_frames_become_one_measurement_record() {
    let mut timegps = vec![0u8; 16];
    timegps[0..4].copy_from_slice(&433200_000_u32.to_le_bytes()); // iTOW
    timegps[8..10].copy_from_slice(&2100_i16.to_le_bytes()); // week
    timegps[10] = 18; // leap seconds
    timegps[11] = 0x07; // tow, week and leap valid
    timegps[12..16].copy_from_slice(&30_u32.to_le_bytes());

    let mut clock = vec![0u8; 20];
    clock[4..8].copy_from_slice(&(-500_i32).to_le_bytes());
    clock[8..12].copy_from_slice(&25_i32.to_le_bytes());

    let mut status = vec![0u8; 16];
    status[12..16].copy_from_slice(&7000_u32.to_le_bytes()); // msss

    let mut measx = vec![0u8; 44 + 24];
    measx[4..8].copy_from_slice(&433200_000_u32.to_le_bytes()); // GPS TOW
    measx[24..26].copy_from_slice(&32_u16.to_le_bytes()); // GPS TOW acc
    measx[34] = 1; // one satellite
    measx[35] = 1; // TOW set
    measx[44] = 0; // GPS
    measx[45] = 7; // svid
    measx[46] = 41; // C/N0
    measx[48..52].copy_from_slice(&2500_i32.to_le_bytes()); // pseudorange rate

    let mut stream = Vec::new();
    stream.extend(ubx_frame(ids::CLASS_NAV, ids::ID_NAV_TIMEGPS, &timegps));
    stream.extend(ubx_frame(ids::CLASS_NAV, ids::ID_NAV_CLOCK, &clock));
    stream.extend(ubx_frame(ids::CLASS_NAV, ids::ID_NAV_STATUS, &status));
    stream.extend(ubx_frame(ids::CLASS_RXM, ids::ID_RXM_MEASX, &measx));

    let pipeline = Pipeline::start(stream);
    let builder = MeasurementBuilder::new(Arc::clone(&pipeline.queue));

    let mut data = GnssData::default();
    let mut built = false;
    for _ in 0..5 {
        data = GnssData::default();
        if builder.build(&mut data).is_ok() {
            built = true;
            break;
        }
    }
    assert!(built, "no measurement record came out of the pipeline");
    // NAV-STATUS rebased the epoch onto msss.
    assert_eq!(data.clock.time_ns, 7_000_000_000);
    assert_eq!(data.clock.bias_ns, -500.0);
    assert_eq!(data.measurements.len(), 1);
    assert_eq!(data.measurements[0].svid, 7);
    assert!((data.measurements[0].pseudorange_rate_mps - 100.0).abs() < 1e-9);
    pipeline.stop();
}

#[test]
fn three_frames_within_the_deadline_are_not_enough() {
    let mut stream = Vec::new();
    stream.extend(ubx_frame(ids::CLASS_NAV, ids::ID_NAV_CLOCK, &[0u8; 20]));
    stream.extend(ubx_frame(ids::CLASS_NAV, ids::ID_NAV_STATUS, &[0u8; 16]));
    let mut timegps = vec![0u8; 16];
    timegps[11] = 0x07;
    stream.extend(ubx_frame(ids::CLASS_NAV, ids::ID_NAV_TIMEGPS, &timegps));

    let pipeline = Pipeline::start(stream);
    let builder = MeasurementBuilder::new(Arc::clone(&pipeline.queue));
    let mut data = GnssData::default();
    assert!(builder.build(&mut data).is_err());
    pipeline.stop();
}

/// A receiver simulated at the byte level: every frame written to it is
/// answered with wire bytes that travel back through the framed reader and
/// the UBX dispatcher.
struct LoopbackReceiver {
    rx: Mutex<VecDeque<u8>>,
    available: Condvar,
}

impl LoopbackReceiver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            rx: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        })
    }

    fn respond(&self, written: &[u8]) {
        let (class, id) = (written[2], written[3]);
        let response = match (class, id) {
            (ids::CLASS_MON, ids::ID_MON_VER) => {
                let mut payload = vec![0u8; 40];
                let sw = b"ROM CORE 3.01 (107888)";
                payload[..sw.len()].copy_from_slice(sw);
                ubx_frame(ids::CLASS_MON, ids::ID_MON_VER, &payload)
            }
            // A resetting receiver acknowledges nothing.
            (ids::CLASS_CFG, ids::ID_CFG_RST) => return,
            _ => ubx_frame(ids::CLASS_ACK, ids::ID_ACK_ACK, &[class, id]),
        };
        self.rx.lock().unwrap().extend(response);
        self.available.notify_all();
    }
}

impl Transport for LoopbackReceiver {
    fn open(&self) -> Result<(), TransportError> {
        Ok(())
    }
    fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
    fn read_byte(&self) -> Result<u8, TransportError> {
        let bytes = self.rx.lock().unwrap();
        let (mut bytes, _) = self
            .available
            .wait_timeout_while(bytes, Duration::from_millis(200), |bytes| bytes.is_empty())
            .unwrap();
        bytes.pop_front().ok_or(TransportError::FailedToRead)
    }
    fn write_raw(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.respond(bytes);
        Ok(())
    }
    fn state(&self) -> TransportState {
        TransportState::Ready
    }
    fn path(&self) -> &str {
        "loopback"
    }
    fn baud_rate(&self) -> u32 {
        9600
    }
    fn set_baud_rate(&self, _rate: u32) -> Result<(), TransportError> {
        Ok(())
    }
}

#[test]
fn configurator_completes_over_the_wire() {
    let queue = MessageQueue::new();
    let receiver = LoopbackReceiver::new();
    let transport: Arc<dyn Transport> = Arc::clone(&receiver) as Arc<dyn Transport>;

    let reader = TtyReader::new(Arc::clone(&transport), Arc::clone(&queue));
    let ubx = UbxMsgHandler::new(Arc::clone(&queue));
    ubx.start_processing();
    reader.start().unwrap();

    let mut configurator = Configurator::new(transport, Arc::clone(&queue), &HalConfig::default());
    let family = configurator.configure().unwrap();
    assert_eq!(family, SwVersion::Spg301);

    reader.stop();
    ubx.stop_processing();
}

#[test]
fn noise_between_frames_is_skipped() {
    let mut stream = vec![0xDE, 0xAD, 0x42];
    stream.extend(ubx_frame(ids::CLASS_ACK, ids::ID_ACK_ACK, &[0x06, 0x24]));
    stream.extend(b"garbage".to_vec());
    stream.extend(nmea_sentence(
        "GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,,",
    ));

    let pipeline = Pipeline::start(stream);
    let builder = LocationBuilder::new(Arc::clone(&pipeline.queue));
    let mut data = LocationData::default();
    let mut built = false;
    for _ in 0..10 {
        if builder.build(&mut data).is_ok() {
            built = true;
            break;
        }
    }
    assert!(built);
    assert!((data.location.latitude_degrees - 48.1173).abs() < 1e-4);
    pipeline.stop();
}
