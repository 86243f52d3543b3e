//! Location builder: one RMC parcel per cycle, merged with the latest
//! altitude/accuracy overlay.

use super::QUEUE_WAIT;
use crate::error::BuildError;
use crate::nmea::{ExtraInfoSentence, LocationExtraInfo, RmcSentence};
use crate::queue::MessageQueue;
use crate::types::{ElapsedRealtime, LocationData};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

pub struct LocationBuilder {
    queue: Arc<MessageQueue>,
    extra_info: Arc<Mutex<LocationExtraInfo>>,
    exit: Arc<AtomicBool>,
    extra_worker: Mutex<Option<JoinHandle<()>>>,
}

impl LocationBuilder {
    /// Creation starts the extra-info drain thread.
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        let extra_info = Arc::new(Mutex::new(LocationExtraInfo::default()));
        let exit = Arc::new(AtomicBool::new(false));

        let worker = {
            let queue = Arc::clone(&queue);
            let extra_info = Arc::clone(&extra_info);
            let exit = Arc::clone(&exit);
            thread::Builder::new()
                .name("location-extra".into())
                .spawn(move || drain_extra_info(&queue, &extra_info, &exit))
                .expect("spawning the extra-info thread")
        };

        Self {
            queue,
            extra_info,
            exit,
            extra_worker: Mutex::new(Some(worker)),
        }
    }

    /// One build cycle: wait up to a second for an RMC parcel and merge the
    /// extra overlay into the produced record.
    pub fn build(&self, out: &mut LocationData) -> Result<(), BuildError> {
        let locations = self.queue.of::<RmcSentence>();
        let Some(parcel) = locations.pop_wait(QUEUE_WAIT) else {
            return Err(BuildError::Incomplete);
        };
        if !parcel.is_valid() {
            return Err(BuildError::Invalid);
        }
        parcel
            .into_location(&mut out.location)
            .map_err(|_| BuildError::Invalid)?;
        self.add_extra_info(out);
        Ok(())
    }

    fn add_extra_info(&self, out: &mut LocationData) {
        let extra = self.extra_info.lock().unwrap();
        out.location.flags.insert(extra.flags);
        out.location.altitude_meters = extra.altitude;
        out.location.horizontal_accuracy_meters = extra.horizontal_acc;
        out.location.vertical_accuracy_meters = extra.vertical_acc;
        out.elapsed_realtime = ElapsedRealtime::now();
    }
}

impl Drop for LocationBuilder {
    fn drop(&mut self) {
        self.exit.store(true, Ordering::Release);
        self.queue.of::<ExtraInfoSentence>().notify_all();
        if let Some(worker) = self.extra_worker.lock().unwrap().take() {
            let _ = worker.join();
        }
    }
}

fn drain_extra_info(
    queue: &Arc<MessageQueue>,
    extra_info: &Mutex<LocationExtraInfo>,
    exit: &AtomicBool,
) {
    let parcels = queue.of::<ExtraInfoSentence>();
    while !exit.load(Ordering::Acquire) {
        let Some(parcel) = parcels.pop_wait(QUEUE_WAIT) else {
            continue;
        };
        if !parcel.is_valid() {
            continue;
        }
        parcel.apply(&mut extra_info.lock().unwrap());
    }
}
