//! POSIX serial transport: 8N1, no parity, no flow control, explicit baud.

use super::{Transport, TransportState};
use crate::error::TransportError;
use log::{debug, error, info, warn};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

const SUPPORTED_BAUD_RATES: [u32; 7] = [2400, 4800, 9600, 19200, 38400, 57600, 115200];
const FALLBACK_BAUD_RATE: u32 = 9600;
const READ_TIMEOUT: Duration = Duration::from_millis(1000);
const RESET_OFF_DELAY: Duration = Duration::from_millis(200);
const RESET_ON_DELAY: Duration = Duration::from_millis(1000);

type PortSlot = Mutex<Option<Box<dyn SerialPort>>>;

pub struct TtyTransport {
    path: String,
    baud_rate: AtomicU32,
    /// Sysfs GPIO value file toggled before the first open when the receiver
    /// is an on-board chip.
    reset_line: Option<PathBuf>,
    reset_pending: AtomicBool,
    reader: PortSlot,
    writer: PortSlot,
    state: Mutex<TransportState>,
}

impl TtyTransport {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate: AtomicU32::new(normalize_baud_rate(baud_rate)),
            reset_line: None,
            reset_pending: AtomicBool::new(false),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            state: Mutex::new(TransportState::NotReady),
        }
    }

    /// Reset the receiver power line before the first open.
    pub fn with_reset_line(mut self, line: PathBuf) -> Self {
        self.reset_line = Some(line);
        self.reset_pending.store(true, Ordering::Release);
        self
    }

    fn reset_receiver(&self) -> Result<(), TransportError> {
        let Some(line) = &self.reset_line else {
            return Ok(());
        };
        fs::write(line, b"0")?;
        thread::sleep(RESET_OFF_DELAY);
        fs::write(line, b"1")?;
        thread::sleep(RESET_ON_DELAY);
        Ok(())
    }

    fn set_state(&self, state: TransportState) {
        *self.state.lock().unwrap() = state;
    }
}

fn normalize_baud_rate(rate: u32) -> u32 {
    if SUPPORTED_BAUD_RATES.contains(&rate) {
        rate
    } else {
        warn!("unsupported baud rate {rate}, falling back to {FALLBACK_BAUD_RATE}");
        FALLBACK_BAUD_RATE
    }
}

impl Transport for TtyTransport {
    fn open(&self) -> Result<(), TransportError> {
        if self.reset_pending.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.reset_receiver() {
                warn!("could not reset GNSS receiver, this may cause further malfunction: {e}");
            }
        }

        let baud = self.baud_rate.load(Ordering::Acquire);
        info!("opening {} at {baud} baud", self.path);
        let port = serialport::new(self.path.as_str(), baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| {
                error!("could not open tty device {}: {e}", self.path);
                TransportError::NotReady
            })?;
        let writer = port.try_clone().map_err(|e| {
            error!("could not clone tty handle for writing: {e}");
            TransportError::NotReady
        })?;

        *self.reader.lock().unwrap() = Some(port);
        *self.writer.lock().unwrap() = Some(writer);
        self.set_state(TransportState::Ready);
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        let mut reader = self.reader.lock().unwrap();
        let mut writer = self.writer.lock().unwrap();
        reader.take();
        writer.take();
        self.set_state(TransportState::NotReady);
        Ok(())
    }

    fn read_byte(&self) -> Result<u8, TransportError> {
        let mut slot = self.reader.lock().unwrap();
        let port = slot.as_mut().ok_or(TransportError::NotReady)?;
        let mut byte = [0u8; 1];
        match port.read(&mut byte) {
            Ok(1) => Ok(byte[0]),
            Ok(_) => Err(TransportError::FailedToRead),
            Err(e) => {
                debug!("tty read failed: {e}");
                Err(TransportError::FailedToRead)
            }
        }
    }

    fn write_raw(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut slot = self.writer.lock().unwrap();
        let port = slot.as_mut().ok_or(TransportError::NotReady)?;
        port.write_all(bytes)
            .and_then(|()| port.flush())
            .map_err(|e| {
                error!("tty write failed: {e}");
                TransportError::FailedToWrite
            })
    }

    fn state(&self) -> TransportState {
        *self.state.lock().unwrap()
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate.load(Ordering::Acquire)
    }

    fn set_baud_rate(&self, rate: u32) -> Result<(), TransportError> {
        let rate = normalize_baud_rate(rate);
        let old = self.baud_rate.swap(rate, Ordering::AcqRel);
        if rate == old {
            return Ok(());
        }

        let mut reader = self.reader.lock().unwrap();
        let mut writer = self.writer.lock().unwrap();
        for slot in [reader.as_mut(), writer.as_mut()] {
            if let Some(port) = slot {
                if let Err(e) = port.set_baud_rate(rate) {
                    error!("can not set tty baud rate to {rate}: {e}");
                    self.baud_rate.store(old, Ordering::Release);
                    return Err(TransportError::NotReady);
                }
            }
        }
        info!("line rate of {} is now {rate}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_rates_fall_back_to_9600() {
        assert_eq!(normalize_baud_rate(12345), 9600);
        assert_eq!(normalize_baud_rate(0), 9600);
    }

    #[test]
    fn supported_rates_are_kept() {
        for rate in SUPPORTED_BAUD_RATES {
            assert_eq!(normalize_baud_rate(rate), rate);
        }
    }

    #[test]
    fn closed_transport_refuses_io() {
        let transport = TtyTransport::new("/nonexistent/tty", 9600);
        assert_eq!(transport.state(), TransportState::NotReady);
        assert!(matches!(
            transport.read_byte(),
            Err(TransportError::NotReady)
        ));
        assert!(matches!(
            transport.write_raw(&[0x00]),
            Err(TransportError::NotReady)
        ));
    }
}
