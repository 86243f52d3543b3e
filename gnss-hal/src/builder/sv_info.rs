//! Satellite-info builder: reassembles multi-message GSV groups, joins them
//! with GSA fix membership and emits one flat satellite list per cycle.

use super::QUEUE_WAIT;
use crate::constants::SVS_COUNT_MAX;
use crate::error::BuildError;
use crate::nmea::{GsaSentence, GsvSentence, NmeaConstellationId};
use crate::queue::{MessageQueue, TypedQueue};
use crate::types::{GnssSvInfo, SvFlags, SvInfoList};
use log::{debug, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

const GLONASS_SVID_SHIFT: i64 = 64;
const SBAS_RAW_RANGE_1: (i64, i64) = (140, 171);
const SBAS_RAW_SHIFT_1: i64 = 87;
const SBAS_RAW_RANGE_2: (i64, i64) = (183, 189);
const SBAS_RAW_SHIFT_2: i64 = 31;

type ConstellationMap<T> = [T; NmeaConstellationId::COUNT];

pub struct GnssInfoBuilder {
    satellites: Arc<Mutex<ConstellationMap<SvInfoList>>>,
    used_in_fix: Arc<Mutex<ConstellationMap<Vec<i64>>>>,
    queue: Arc<MessageQueue>,
    exit: Arc<AtomicBool>,
    fix_worker: Mutex<Option<JoinHandle<()>>>,
    group_worker: Mutex<Option<JoinHandle<()>>>,
}

impl GnssInfoBuilder {
    /// Creation starts both collector threads (fix membership and GSV group
    /// reassembly).
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        let satellites = Arc::new(Mutex::new(ConstellationMap::<SvInfoList>::default()));
        let used_in_fix = Arc::new(Mutex::new(ConstellationMap::<Vec<i64>>::default()));
        let exit = Arc::new(AtomicBool::new(false));

        let fix_worker = {
            let queue = Arc::clone(&queue);
            let used_in_fix = Arc::clone(&used_in_fix);
            let exit = Arc::clone(&exit);
            thread::Builder::new()
                .name("svinfo-fix".into())
                .spawn(move || collect_fix_lists(&queue, &used_in_fix, &exit))
                .expect("spawning the fix collector thread")
        };
        let group_worker = {
            let queue = Arc::clone(&queue);
            let satellites = Arc::clone(&satellites);
            let exit = Arc::clone(&exit);
            thread::Builder::new()
                .name("svinfo-group".into())
                .spawn(move || collect_groups(&queue, &satellites, &exit))
                .expect("spawning the group collector thread")
        };

        Self {
            satellites,
            used_in_fix,
            queue,
            exit,
            fix_worker: Mutex::new(Some(fix_worker)),
            group_worker: Mutex::new(Some(group_worker)),
        }
    }

    /// One build cycle: flatten the per-constellation lists, mark fix
    /// membership, stop at the platform cap.
    pub fn build(&self, out: &mut SvInfoList) -> Result<(), BuildError> {
        let mut count = 0usize;
        let mut satellites = self.satellites.lock().unwrap();
        'all: for constellation in 0..NmeaConstellationId::COUNT {
            for slot in 0..satellites[constellation].len() {
                let mut sv = satellites[constellation][slot];
                self.process_fix_flag(&mut sv, constellation);
                satellites[constellation][slot] = sv;
                out.push(sv);
                count += 1;
                if count >= SVS_COUNT_MAX {
                    break 'all;
                }
            }
        }
        trace!("built sv-info report with {count} satellites");
        Ok(())
    }

    /// Reverse the GSV svid normalisation back into raw wire space and mark
    /// the satellite when the GSA list of its constellation names it. A
    /// matched entry is consumed.
    fn process_fix_flag(&self, sv: &mut GnssSvInfo, constellation: usize) {
        let mut raw_svid = i64::from(sv.svid);
        if constellation == NmeaConstellationId::Glonass as usize {
            raw_svid += GLONASS_SVID_SHIFT;
        } else if raw_svid >= SBAS_RAW_RANGE_1.0 && raw_svid <= SBAS_RAW_RANGE_1.1 {
            raw_svid -= SBAS_RAW_SHIFT_1;
        } else if raw_svid >= SBAS_RAW_RANGE_2.0 && raw_svid <= SBAS_RAW_RANGE_2.1 {
            raw_svid -= SBAS_RAW_SHIFT_2;
        }

        let mut used_in_fix = self.used_in_fix.lock().unwrap();
        let list = &mut used_in_fix[constellation];
        if let Some(found) = list.iter().position(|&svid| svid == raw_svid) {
            sv.flags.insert(SvFlags::USED_IN_FIX);
            list.remove(found);
        }
    }
}

impl Drop for GnssInfoBuilder {
    fn drop(&mut self) {
        self.exit.store(true, Ordering::Release);
        self.queue.of::<GsaSentence>().notify_all();
        self.queue.of::<GsvSentence>().notify_all();
        for worker in [&self.fix_worker, &self.group_worker] {
            if let Some(handle) = worker.lock().unwrap().take() {
                let _ = handle.join();
            }
        }
    }
}

fn collect_fix_lists(
    queue: &Arc<MessageQueue>,
    used_in_fix: &Mutex<ConstellationMap<Vec<i64>>>,
    exit: &AtomicBool,
) {
    let parcels = queue.of::<GsaSentence>();
    while !exit.load(Ordering::Acquire) {
        let Some(parcel) = parcels.pop_wait(QUEUE_WAIT) else {
            continue;
        };
        if !parcel.is_valid() {
            continue;
        }
        let (gnss_id, sv_list) = parcel.into_fix_list();
        if gnss_id >= NmeaConstellationId::Any as usize {
            debug!("unknown GSA GNSS system id");
            continue;
        }
        used_in_fix.lock().unwrap()[gnss_id] = sv_list;
    }
}

/// Pull GSV parcels and reassemble groups. A group is complete when the
/// messages 1..N of one constellation arrived strictly in order; any gap,
/// invalid parcel or constellation change discards the partial group.
fn collect_groups(
    queue: &Arc<MessageQueue>,
    satellites: &Mutex<ConstellationMap<SvInfoList>>,
    exit: &AtomicBool,
) {
    let parcels = queue.of::<GsvSentence>();
    while !exit.load(Ordering::Acquire) {
        let mut expected_msg_num = 1u8;
        let mut gnss_id = NmeaConstellationId::Any;
        let mut collected: SvInfoList = Vec::new();
        let mut complete = false;

        while let Some(parcel) = next_in_group(&parcels, expected_msg_num) {
            expected_msg_num += 1;
            if parcel.msg_num() == 1 {
                gnss_id = parcel.gnss_id();
            } else if gnss_id != parcel.gnss_id() {
                // Interleaved constellation mid-group.
                break;
            }
            collected.extend_from_slice(parcel.satellites());
            if parcel.msg_amount() == parcel.msg_num() {
                complete = true;
                break;
            }
        }

        if !complete {
            continue;
        }
        trace!(
            "gsv group of {} satellites for constellation {gnss_id:?}",
            collected.len()
        );
        satellites.lock().unwrap()[gnss_id as usize] = collected;
    }
}

fn next_in_group(
    parcels: &TypedQueue<GsvSentence>,
    expected_msg_num: u8,
) -> Option<GsvSentence> {
    let parcel = parcels.pop_wait(QUEUE_WAIT)?;
    if !parcel.is_valid() {
        return None;
    }
    if parcel.msg_num() != expected_msg_num {
        trace!(
            "gsv sequence break: expected {expected_msg_num}, got {}",
            parcel.msg_num()
        );
        return None;
    }
    Some(parcel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmea::{with_checksum, NmeaVersion};
    use std::time::Duration;

    fn push_gsv(queue: &Arc<MessageQueue>, body: &str) {
        queue
            .of::<GsvSentence>()
            .push(GsvSentence::parse(&with_checksum(body), NmeaVersion::V23));
    }

    fn push_gsa(queue: &Arc<MessageQueue>, body: &str) {
        queue
            .of::<GsaSentence>()
            .push(GsaSentence::parse(&with_checksum(body), NmeaVersion::V23));
    }

    fn build_until(
        builder: &GnssInfoBuilder,
        settled: impl Fn(&SvInfoList) -> bool,
    ) -> SvInfoList {
        // Collector threads work asynchronously; poll until they settle.
        for _ in 0..100 {
            let mut list = SvInfoList::new();
            builder.build(&mut list).unwrap();
            if settled(&list) {
                return list;
            }
            thread::sleep(Duration::from_millis(20));
        }
        let mut list = SvInfoList::new();
        builder.build(&mut list).unwrap();
        list
    }

    #[test]
    fn complete_group_with_fix_membership() {
        let queue = MessageQueue::new();
        let builder = GnssInfoBuilder::new(Arc::clone(&queue));

        // Eleven satellites across three messages, then the fix list.
        push_gsv(
            &queue,
            "GPGSV,3,1,11,01,03,111,00,02,15,270,00,06,01,010,00,13,06,292,00",
        );
        push_gsv(
            &queue,
            "GPGSV,3,2,11,14,25,170,00,16,57,208,39,18,67,296,40,19,40,246,00",
        );
        push_gsv(&queue, "GPGSV,3,3,11,22,42,067,42,24,14,311,43,27,05,244,00");
        push_gsa(&queue, "GPGSA,A,3,01,02,,,,,,,,,,,2.5,1.3,2.1");

        let list = build_until(&builder, |list| {
            list.len() == 11 && list.iter().any(|sv| sv.flags.contains(SvFlags::USED_IN_FIX))
        });
        assert_eq!(list.len(), 11);
        let used: Vec<i16> = list
            .iter()
            .filter(|sv| sv.flags.contains(SvFlags::USED_IN_FIX))
            .map(|sv| sv.svid)
            .collect();
        assert_eq!(used, vec![1, 2]);
    }

    #[test]
    fn gap_in_msg_num_discards_partial_group() {
        let queue = MessageQueue::new();
        let builder = GnssInfoBuilder::new(Arc::clone(&queue));

        push_gsv(&queue, "GPGSV,3,1,09,01,03,111,00,02,15,270,00");
        // Message 2 lost; message 3 arrives next.
        push_gsv(&queue, "GPGSV,3,3,09,22,42,067,42");
        // A following complete single-message group must still land.
        push_gsv(&queue, "GAGSV,1,1,02,02,45,100,40,08,30,200,38");

        let list = build_until(&builder, |list| list.len() == 2);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].svid, 2);
    }

    #[test]
    fn constellation_change_discards_partial_group() {
        let queue = MessageQueue::new();
        let builder = GnssInfoBuilder::new(Arc::clone(&queue));

        push_gsv(&queue, "GPGSV,2,1,08,01,03,111,00,02,15,270,00");
        push_gsv(&queue, "GLGSV,2,2,08,65,60,045,40,66,34,200,31");
        push_gsv(&queue, "GLGSV,1,1,01,70,11,100,30");

        let list = build_until(&builder, |list| list.len() == 1);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].svid, 70 - 64);
    }

    #[test]
    fn glonass_fix_membership_uses_raw_svids() {
        let queue = MessageQueue::new();
        let builder = GnssInfoBuilder::new(Arc::clone(&queue));

        push_gsv(&queue, "GLGSV,1,1,02,65,60,045,40,66,34,200,31");
        // GSA carries raw (wire) svids.
        push_gsa(&queue, "GLGSA,A,3,65,,,,,,,,,,,,1.8,1.0,1.5");

        let list = build_until(&builder, |list| {
            list.len() == 2 && list[0].flags.contains(SvFlags::USED_IN_FIX)
        });
        assert_eq!(list.len(), 2);
        assert!(list[0].flags.contains(SvFlags::USED_IN_FIX));
        assert_eq!(list[0].svid, 1);
        assert!(!list[1].flags.contains(SvFlags::USED_IN_FIX));
    }

    #[test]
    fn report_is_capped_at_the_platform_maximum() {
        let queue = MessageQueue::new();
        let builder = GnssInfoBuilder::new(Arc::clone(&queue));

        // 4 messages x 4 GPS satellites, then 72 fake GLONASS entries via
        // direct map manipulation is not possible; instead push 18 groups of
        // 4 across constellations by reusing talkers.
        push_gsv(
            &queue,
            "GPGSV,1,1,04,01,03,111,00,02,15,270,00,03,01,010,00,04,06,292,00",
        );
        {
            // Fill the stored map directly for the remaining constellations.
            let mut satellites = builder.satellites.lock().unwrap();
            satellites[NmeaConstellationId::Glonass as usize] =
                vec![GnssSvInfo::default(); 40];
            satellites[NmeaConstellationId::Galileo as usize] =
                vec![GnssSvInfo::default(); 40];
        }

        let list = build_until(&builder, |list| list.len() == SVS_COUNT_MAX);
        assert_eq!(list.len(), SVS_COUNT_MAX);
    }
}
