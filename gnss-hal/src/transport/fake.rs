//! File-replay transport: hands out the bytes of a `lat,lon,speed` route
//! file and swallows writes.

use super::{Transport, TransportState};
use crate::error::TransportError;
use log::{debug, trace};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct FakeTransport {
    path: PathBuf,
    path_str: String,
    stream: Mutex<Option<BufReader<File>>>,
    state: Mutex<TransportState>,
}

impl FakeTransport {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let path_str = path.display().to_string();
        Self {
            path,
            path_str,
            stream: Mutex::new(None),
            state: Mutex::new(TransportState::NotReady),
        }
    }
}

impl Transport for FakeTransport {
    fn open(&self) -> Result<(), TransportError> {
        let file = File::open(&self.path).map_err(|e| {
            debug!("could not open fake route {}: {e}", self.path_str);
            TransportError::NotReady
        })?;
        *self.stream.lock().unwrap() = Some(BufReader::new(file));
        *self.state.lock().unwrap() = TransportState::Ready;
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        self.stream.lock().unwrap().take();
        *self.state.lock().unwrap() = TransportState::NotReady;
        Ok(())
    }

    fn read_byte(&self) -> Result<u8, TransportError> {
        let mut slot = self.stream.lock().unwrap();
        let stream = slot.as_mut().ok_or(TransportError::NotReady)?;
        let mut byte = [0u8; 1];
        match stream.read(&mut byte) {
            Ok(1) => Ok(byte[0]),
            // End of the route file.
            Ok(_) => Err(TransportError::FailedToRead),
            Err(e) => {
                debug!("fake route read failed: {e}");
                Err(TransportError::FailedToRead)
            }
        }
    }

    fn write_raw(&self, bytes: &[u8]) -> Result<(), TransportError> {
        trace!("fake transport discarding {} written bytes", bytes.len());
        Ok(())
    }

    fn state(&self) -> TransportState {
        *self.state.lock().unwrap()
    }

    fn path(&self) -> &str {
        &self.path_str
    }
}
