//! File-replay location pipeline: a route of `lat,lon,speed` points is
//! interpolated into a continuous track and delivered through the regular
//! location sinks.

use crate::error::BuildError;
use crate::provider::{LocationSinkV1, LocationSinkV2};
use crate::queue::MessageQueue;
use crate::transport::Transport;
use crate::types::{ElapsedRealtime, GnssLocation, LocationData, LocationFlags};
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const FIELDS_PER_LINE: usize = 3;
const POINT_FEED_INTERVAL: Duration = Duration::from_millis(100);
const POINT_WAIT: Duration = Duration::from_millis(1000);
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

const EARTH_RADIUS_M: f64 = 6_373_000.0;
const FAKE_HORIZONTAL_ACCURACY_M: f32 = 1.0;

/// One waypoint of the replayed route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FakeLocationPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f32,
}

/// Loads the route file once and feeds its points onto the queue in an
/// endless loop.
pub struct FakeReader {
    queue: Arc<MessageQueue>,
    points: Vec<FakeLocationPoint>,
    exit: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FakeReader {
    /// Drain the route transport byte by byte and keep the parsed points.
    pub fn new(queue: Arc<MessageQueue>, transport: &dyn Transport) -> Result<Self, BuildError> {
        transport.reset().map_err(|_| BuildError::Empty)?;
        let points = load_route(transport);
        let _ = transport.close();
        if points.is_empty() {
            return Err(BuildError::Empty);
        }
        Ok(Self {
            queue,
            points,
            exit: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        })
    }

    pub fn start(&self) {
        self.exit.store(false, Ordering::Release);
        let queue = Arc::clone(&self.queue);
        let points = self.points.clone();
        let exit = Arc::clone(&self.exit);
        let handle = thread::Builder::new()
            .name("fake-reader".into())
            .spawn(move || {
                let parcels = queue.of::<FakeLocationPoint>();
                let mut route = points.iter().cycle();
                while !exit.load(Ordering::Acquire) {
                    if let Some(point) = route.next() {
                        parcels.push(*point);
                    }
                    thread::sleep(POINT_FEED_INTERVAL);
                }
            })
            .expect("spawning the fake reader thread");
        *self.worker.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        self.exit.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FakeReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn load_route(transport: &dyn Transport) -> Vec<FakeLocationPoint> {
    let mut points = Vec::new();
    let mut line = String::new();
    loop {
        match transport.read_byte() {
            Ok(b'\n') => {
                match parse_route_line(&line) {
                    Some(point) => points.push(point),
                    // A malformed line ends the route, like a read failure.
                    None => break,
                }
                line.clear();
            }
            Ok(byte) => line.push(char::from(byte)),
            Err(_) => {
                if let Some(point) = parse_route_line(&line) {
                    points.push(point);
                }
                break;
            }
        }
    }
    if points.is_empty() {
        warn!("fake route {} holds no usable points", transport.path());
    }
    points
}

fn parse_route_line(line: &str) -> Option<FakeLocationPoint> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() != FIELDS_PER_LINE {
        return None;
    }
    Some(FakeLocationPoint {
        latitude: fields[0].parse().ok()?,
        longitude: fields[1].parse().ok()?,
        speed: fields[2].parse().ok()?,
    })
}

/// Builds the per-second reports of one route leg: great-circle distance and
/// bearing between two waypoints, one interpolated report per second of
/// travel at the leg's speed.
pub struct FakeLocationBuilder {
    queue: Arc<MessageQueue>,
}

impl FakeLocationBuilder {
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        Self { queue }
    }

    pub fn build(
        &self,
        from: FakeLocationPoint,
        to: FakeLocationPoint,
        out: &mut VecDeque<LocationData>,
    ) -> Result<(), BuildError> {
        if from.speed <= 0.0 {
            return Err(BuildError::Invalid);
        }

        let dlat = (to.latitude - from.latitude).to_radians();
        let dlon = (to.longitude - from.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2)
            + from.latitude.to_radians().cos()
                * to.latitude.to_radians().cos()
                * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        let distance = EARTH_RADIUS_M * c;
        let travel_seconds = distance / f64::from(from.speed);
        let lat_step = (to.latitude - from.latitude) / travel_seconds;
        let lon_step = (to.longitude - from.longitude) / travel_seconds;

        let x = to.latitude.to_radians().cos() * dlon.sin();
        let y = from.latitude.to_radians().cos() * to.latitude.to_radians().sin()
            - from.latitude.to_radians().sin() * to.latitude.to_radians().cos() * dlon.cos();
        let bearing = x.atan2(y).to_degrees() as f32;

        let mut location = GnssLocation {
            flags: LocationFlags::HAS_LAT_LONG
                | LocationFlags::HAS_SPEED
                | LocationFlags::HAS_BEARING
                | LocationFlags::HAS_ALTITUDE
                | LocationFlags::HAS_HORIZONTAL_ACCURACY,
            latitude_degrees: from.latitude,
            longitude_degrees: from.longitude,
            speed_mps: from.speed,
            bearing_degrees: bearing,
            horizontal_accuracy_meters: FAKE_HORIZONTAL_ACCURACY_M,
            ..Default::default()
        };

        let steps = travel_seconds as i64;
        for step in 0..=steps {
            if step == steps {
                location.latitude_degrees = to.latitude;
                location.longitude_degrees = to.longitude;
            } else {
                location.latitude_degrees += lat_step;
                location.longitude_degrees += lon_step;
            }
            location.timestamp_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|epoch| epoch.as_millis() as i64)
                .unwrap_or(0);
            out.push_back(LocationData {
                location,
                elapsed_realtime: ElapsedRealtime::now(),
            });
        }
        Ok(())
    }

    /// Wait for the next waypoint of the route.
    pub fn next_point(&self) -> Option<FakeLocationPoint> {
        self.queue.of::<FakeLocationPoint>().pop_wait(POINT_WAIT)
    }
}

/// Delivers the interpolated track through the regular location sinks at a
/// fixed one-second cadence.
pub struct FakeLocationProvider {
    builder: Arc<FakeLocationBuilder>,
    sinks: Arc<Mutex<FakeSinks>>,
    enabled: Arc<AtomicBool>,
    exit: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct FakeSinks {
    v1_1: Option<LocationSinkV1>,
    v2_0: Option<LocationSinkV2>,
}

impl FakeLocationProvider {
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        Self {
            builder: Arc::new(FakeLocationBuilder::new(queue)),
            sinks: Arc::new(Mutex::new(FakeSinks::default())),
            enabled: Arc::new(AtomicBool::new(false)),
            exit: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn set_callback_1_1(&self, callback: LocationSinkV1) {
        self.sinks.lock().unwrap().v1_1 = Some(callback);
    }

    pub fn set_callback_2_0(&self, callback: LocationSinkV2) {
        self.sinks.lock().unwrap().v2_0 = Some(callback);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn start_providing(&self) {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return;
        }
        self.exit.store(false, Ordering::Release);
        let builder = Arc::clone(&self.builder);
        let sinks = Arc::clone(&self.sinks);
        let enabled = Arc::clone(&self.enabled);
        let exit = Arc::clone(&self.exit);
        *worker = Some(
            thread::Builder::new()
                .name("fake-location-provider".into())
                .spawn(move || provide(&builder, &sinks, &enabled, &exit))
                .expect("spawning the fake location provider thread"),
        );
    }

    pub fn stop_providing(&self) {
        self.exit.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FakeLocationProvider {
    fn drop(&mut self) {
        self.stop_providing();
    }
}

fn provide(
    builder: &FakeLocationBuilder,
    sinks: &Mutex<FakeSinks>,
    enabled: &AtomicBool,
    exit: &AtomicBool,
) {
    let mut reports = VecDeque::new();
    let mut previous: Option<FakeLocationPoint> = None;
    while !exit.load(Ordering::Acquire) {
        if reports.is_empty() {
            let Some(next) = builder.next_point() else {
                continue;
            };
            if let Some(from) = previous.replace(next) {
                if let Err(e) = builder.build(from, next, &mut reports) {
                    debug!("unbuildable route leg: {e}");
                }
            }
            continue;
        }

        if let Some(data) = reports.pop_front() {
            if enabled.load(Ordering::Acquire) {
                let sinks = sinks.lock().unwrap();
                if let Some(sink) = &sinks.v1_1 {
                    sink(&data.location);
                }
                if let Some(sink) = &sinks.v2_0 {
                    sink(&data);
                }
            }
        }
        thread::sleep(REPORT_INTERVAL);
    }
}
