//! Framed reader: pumps single bytes from the transport through a small
//! state machine and emits whole NMEA sentences and whole UBX frames onto
//! their queues.

use crate::constants::{
    NMEA_END_CHAR_2, NMEA_SYNC_CHAR, UBX_FRAME_OVERHEAD, UBX_LENGTH_OFFSET, UBX_SYNC_CHAR_1,
    UBX_SYNC_CHAR_2,
};
use crate::error::TransportError;
use crate::queue::MessageQueue;
use crate::transport::{Endian, Transport};
use log::{debug, error, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const MAX_READ_RETRIES: u32 = 5;
const READ_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// One whole NMEA sentence, from `$` to the terminating line feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NmeaFrame(pub Vec<u8>);

/// One whole UBX frame, from the first sync byte to the second checksum
/// byte, together with the payload length captured while framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UbxFrame {
    pub data: Vec<u8>,
    pub payload_len: u16,
}

pub type DeathCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Waiting,
    CapturingNmea,
    WaitingUbxSync2,
    CapturingUbx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Capturing,
    NmeaDone,
    UbxDone,
    Reset,
}

/// The five-state byte machine of the reader, kept separate from the pump
/// thread so the framing rules are testable on their own.
struct FrameMachine {
    state: ReaderState,
    len_bytes: [u8; 2],
    offset: usize,
    endian: Endian,
}

impl FrameMachine {
    fn new(endian: Endian) -> Self {
        Self {
            state: ReaderState::Waiting,
            len_bytes: [0; 2],
            offset: 0,
            endian,
        }
    }

    fn reset(&mut self) {
        self.state = ReaderState::Waiting;
        self.len_bytes = [0; 2];
        self.offset = 0;
    }

    /// The UBX length field is little-endian on the wire; the capture slots
    /// are chosen so the native reinterpretation below yields the wire value
    /// on either host order.
    fn payload_len(&self) -> u16 {
        u16::from_ne_bytes(self.len_bytes)
    }

    fn handle_input(&mut self, ch: u8) -> Step {
        match (self.state, ch) {
            // Missed end of sentence: drop the partial parcel.
            (ReaderState::CapturingNmea, NMEA_SYNC_CHAR) => return Step::Reset,
            (ReaderState::Waiting, NMEA_SYNC_CHAR) => self.state = ReaderState::CapturingNmea,
            (ReaderState::Waiting, UBX_SYNC_CHAR_1) => self.state = ReaderState::WaitingUbxSync2,
            (ReaderState::WaitingUbxSync2, UBX_SYNC_CHAR_2) => {
                self.state = ReaderState::CapturingUbx;
            }
            (ReaderState::WaitingUbxSync2, _) => return Step::Reset,
            (ReaderState::CapturingUbx, _) => {
                if self.offset == UBX_LENGTH_OFFSET {
                    let slot = match self.endian {
                        Endian::Little => 0,
                        Endian::Big => 1,
                    };
                    self.len_bytes[slot] = ch;
                } else if self.offset == UBX_LENGTH_OFFSET + 1 {
                    let slot = match self.endian {
                        Endian::Little => 1,
                        Endian::Big => 0,
                    };
                    self.len_bytes[slot] = ch;
                }
            }
            _ => {}
        }
        self.capture(ch)
    }

    fn capture(&mut self, ch: u8) -> Step {
        match self.state {
            ReaderState::Waiting => Step::Reset,
            ReaderState::CapturingUbx => {
                self.offset += 1;
                if self.offset == usize::from(self.payload_len()) + UBX_FRAME_OVERHEAD {
                    Step::UbxDone
                } else {
                    Step::Capturing
                }
            }
            ReaderState::CapturingNmea => {
                if ch == NMEA_END_CHAR_2 {
                    Step::NmeaDone
                } else {
                    Step::Capturing
                }
            }
            ReaderState::WaitingUbxSync2 => {
                self.offset += 1;
                Step::Capturing
            }
        }
    }
}

/// Owns the transport and the pump thread. Stopping the reader always joins
/// the thread.
pub struct TtyReader {
    transport: Arc<dyn Transport>,
    queue: Arc<MessageQueue>,
    death_callback: Mutex<Option<Arc<DeathCallback>>>,
    exit: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl TtyReader {
    pub fn new(transport: Arc<dyn Transport>, queue: Arc<MessageQueue>) -> Self {
        Self {
            transport,
            queue,
            death_callback: Mutex::new(None),
            exit: Arc::new(AtomicBool::new(false)),
            pump: Mutex::new(None),
        }
    }

    /// Invoked after [`MAX_READ_RETRIES`] consecutive transport failures;
    /// may only be installed once.
    pub fn set_death_callback(&self, callback: DeathCallback) -> Result<(), TransportError> {
        let mut slot = self.death_callback.lock().unwrap();
        if slot.is_some() {
            return Err(TransportError::NotReady);
        }
        *slot = Some(Arc::new(callback));
        Ok(())
    }

    pub fn start(&self) -> Result<(), TransportError> {
        self.transport.reset()?;
        self.exit.store(false, Ordering::Release);

        let transport = Arc::clone(&self.transport);
        let queue = Arc::clone(&self.queue);
        let exit = Arc::clone(&self.exit);
        let death_callback = self.death_callback.lock().unwrap().clone();
        let handle = thread::Builder::new()
            .name("gnss-reader".into())
            .spawn(move || reading_loop(&transport, &queue, &exit, death_callback))
            .expect("spawning the reader thread");
        *self.pump.lock().unwrap() = Some(handle);
        Ok(())
    }

    pub fn stop(&self) {
        self.exit.store(true, Ordering::Release);
        if let Some(handle) = self.pump.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TtyReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reading_loop(
    transport: &Arc<dyn Transport>,
    queue: &Arc<MessageQueue>,
    exit: &AtomicBool,
    death_callback: Option<Arc<DeathCallback>>,
) {
    let nmea_frames = queue.of::<NmeaFrame>();
    let ubx_frames = queue.of::<UbxFrame>();
    let mut machine = FrameMachine::new(transport.endian());
    let mut read_try = 0u32;

    while !exit.load(Ordering::Acquire) {
        let mut parcel: Vec<u8> = Vec::new();
        let mut outcome = Step::Capturing;

        while !exit.load(Ordering::Acquire) {
            let byte = match transport.read_byte() {
                Ok(byte) => byte,
                Err(_) => {
                    read_try += 1;
                    thread::sleep(READ_RETRY_INTERVAL);
                    break;
                }
            };
            read_try = 0;

            parcel.push(byte);
            outcome = machine.handle_input(byte);
            match outcome {
                Step::Reset => {
                    trace!("incomplete or lost parcel, resynchronising");
                    machine.reset();
                    parcel.clear();
                }
                Step::NmeaDone | Step::UbxDone => break,
                Step::Capturing => {}
            }
        }

        match outcome {
            Step::NmeaDone => {
                trace!("captured nmea sentence of {} bytes", parcel.len());
                nmea_frames.push(NmeaFrame(parcel));
            }
            Step::UbxDone => {
                trace!("captured ubx frame of {} bytes", parcel.len());
                ubx_frames.push(UbxFrame {
                    data: parcel,
                    payload_len: machine.payload_len(),
                });
            }
            _ => {
                if read_try >= MAX_READ_RETRIES {
                    error!("transport failed {read_try} consecutive reads, giving up");
                    if let Some(callback) = &death_callback {
                        callback();
                    }
                    return;
                }
            }
        }

        machine.reset();
    }

    debug!("reader pump exiting");
}
