//! Read-once configuration record.
//!
//! The original host exposed these knobs as boot properties; this port reads
//! them from the environment once at start-up and passes the record around by
//! value.

use std::env;
use std::path::PathBuf;

/// Sentinel device path that routes the HAL to the file-replay transport.
pub const FAKE_DEVICE_PATH: &str = "fake";

const DEFAULT_FAKE_ROUTE: &str = "fake_route.txt";
const DEFAULT_TTY_BAUD_RATE: u32 = 9600;
const DEFAULT_GNSS_BAUD_RATE: u32 = 38400;

const ENV_DEVICE_PATH: &str = "GNSS_MODE";
const ENV_TTY_BAUD_RATE: &str = "GNSS_TTY_BAUDRATE";
const ENV_GNSS_BAUD_RATE: &str = "GNSS_BAUDRATE";
const ENV_SECMAJOR: &str = "GNSS_SECMAJOR";
const ENV_SBAS: &str = "GNSS_SBAS";
const ENV_FAKE_ROUTE: &str = "GNSS_FAKE_ROUTE";

/// Second major constellation enabled in the CFG-GNSS mask.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SecondMajor {
    #[default]
    Glonass,
    Beidou,
    None,
}

#[derive(Debug, Clone)]
pub struct HalConfig {
    /// Requested receiver tty path; [`FAKE_DEVICE_PATH`] selects file replay.
    pub device_path: String,
    /// Requested baud for non-configurable devices and the initial line rate.
    pub tty_baud_rate: u32,
    /// Target line rate after configuration.
    pub gnss_baud_rate: u32,
    pub second_major: SecondMajor,
    pub sbas_enabled: bool,
    /// Input file for the fake transport.
    pub fake_route: PathBuf,
    /// Optional sysfs GPIO value file that resets an on-board receiver
    /// before the first open.
    pub reset_line: Option<PathBuf>,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            device_path: FAKE_DEVICE_PATH.to_owned(),
            tty_baud_rate: DEFAULT_TTY_BAUD_RATE,
            gnss_baud_rate: DEFAULT_GNSS_BAUD_RATE,
            second_major: SecondMajor::Glonass,
            sbas_enabled: true,
            fake_route: PathBuf::from(DEFAULT_FAKE_ROUTE),
            reset_line: None,
        }
    }
}

impl HalConfig {
    /// Snapshot the process environment into a config record.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            device_path: env::var(ENV_DEVICE_PATH).unwrap_or(defaults.device_path),
            tty_baud_rate: parse_var(ENV_TTY_BAUD_RATE).unwrap_or(defaults.tty_baud_rate),
            gnss_baud_rate: parse_var(ENV_GNSS_BAUD_RATE).unwrap_or(defaults.gnss_baud_rate),
            second_major: env::var(ENV_SECMAJOR)
                .map(|v| parse_second_major(&v))
                .unwrap_or(defaults.second_major),
            sbas_enabled: env::var(ENV_SBAS)
                .map(|v| !v.eq_ignore_ascii_case("disabled") && !v.eq_ignore_ascii_case("disable"))
                .unwrap_or(defaults.sbas_enabled),
            fake_route: env::var(ENV_FAKE_ROUTE)
                .map(PathBuf::from)
                .unwrap_or(defaults.fake_route),
            reset_line: None,
        }
    }

    pub fn is_fake(&self) -> bool {
        self.device_path == FAKE_DEVICE_PATH
    }
}

fn parse_var(name: &str) -> Option<u32> {
    env::var(name).ok()?.trim().parse().ok()
}

fn parse_second_major(value: &str) -> SecondMajor {
    if value.eq_ignore_ascii_case("glonass") {
        SecondMajor::Glonass
    } else if value.eq_ignore_ascii_case("beidou") {
        SecondMajor::Beidou
    } else {
        SecondMajor::None
    }
}
