//! Boot-time configurator: brings a u-blox receiver into a known operating
//! mode by a retried, ACK-gated command sequence selected by the receiver's
//! software family.

use crate::config::{HalConfig, SecondMajor};
use crate::error::ConfigError;
use crate::nmea::NmeaVersion;
use crate::queue::MessageQueue;
use crate::transport::Transport;
use crate::ubx::{ids, AckParcel, MonVerParcel, UbxMsgKind};
use log::{debug, error, info};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const MAX_ACK_RETRIES: u32 = 5;
const ACK_TIMEOUT: Duration = Duration::from_millis(5000);
const MON_VER_TIMEOUT: Duration = Duration::from_millis(5000);
/// CFG-RST is never acknowledged; give the receiver a moment instead.
const RESET_SETTLE: Duration = Duration::from_millis(25);

const MESSAGE_RATE_DEFAULT: u8 = 1;
const MESSAGE_RATE_DISABLED: u8 = 0;

/// Controlled software reset of the GNSS part only.
const RESET_MODE_GNSS: u8 = 0x02;
const UART1_PORT_ID: u8 = 1;

/// class + id + two length bytes ahead of every payload.
const CFG_HEADER_LEN: usize = 4;

// Command bodies (class, id, little-endian length, payload), written
// verbatim apart from the documented mutations.

const MSG_POLL_MON_VER: [u8; 4] = [0x0a, 0x04, 0x00, 0x00];

const CFG_RESET: [u8; 8] = [0x06, 0x04, 0x04, 0x00, 0xFF, 0xFF, 0x00, 0x00];

const CFG_CLEAR: [u8; 17] = [
    0x06, 0x09, 0x0D, 0x00, 0xFE, 0xFF, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0xFE, 0xFF, 0x00, 0x00, //
    0x17,
];

const CFG_NAV5: [u8; 40] = [
    0x06, 0x24, 0x24, 0x00, 0xFF, 0xFF, 0x04, 0x02, //
    0x00, 0x00, 0x00, 0x00, 0x10, 0x27, 0x00, 0x00, //
    0x05, 0x00, 0xFA, 0x00, 0xFA, 0x00, 0x64, 0x00, //
    0x5E, 0x01, 0x00, 0x3C, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

const CFG_NMEA41: [u8; 19] = [
    0x06, 0x17, 0x0F, 0x00, 0x20, 0x41, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x01, //
    0x00, 0x00, 0x00,
];

const CFG_NMEA23: [u8; 16] = [
    0x06, 0x17, 0x0C, 0x00, 0x20, 0x23, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x01,
];

const CFG_GNSS_SPG100: [u8; 40] = [
    0x06, 0x3E, 0x24, 0x00, 0x00, 0x16, 0x16, 0x04, //
    0x00, 0x04, 0xff, 0x00, 0x01, 0x00, 0x00, 0x00, // GPS
    0x01, 0x00, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, // SBAS
    0x05, 0x00, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, // QZSS
    0x06, 0x00, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, // GLONASS
];

const CFG_GNSS_SPG201: [u8; 48] = [
    0x06, 0x3E, 0x2C, 0x00, 0x00, 0x20, 0x20, 0x05, //
    0x00, 0x08, 0x10, 0x00, 0x01, 0x00, 0x01, 0x01, // GPS
    0x01, 0x01, 0x03, 0x00, 0x01, 0x00, 0x01, 0x01, // SBAS
    0x03, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01, 0x01, // BEIDOU
    0x05, 0x00, 0x03, 0x00, 0x01, 0x00, 0x01, 0x05, // QZSS
    0x06, 0x00, 0x0E, 0x00, 0x00, 0x00, 0x01, 0x01, // GLONASS
];

const CFG_GNSS_SPG301: [u8; 64] = [
    0x06, 0x3E, 0x3C, 0x00, 0x00, 0x20, 0x20, 0x07, //
    0x00, 0x08, 0x10, 0x00, 0x01, 0x00, 0x01, 0x01, // GPS
    0x01, 0x01, 0x03, 0x00, 0x01, 0x00, 0x01, 0x01, // SBAS
    0x02, 0x04, 0x08, 0x00, 0x01, 0x00, 0x01, 0x01, // GALILEO
    0x03, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01, 0x01, // BEIDOU
    0x04, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0x03, // IMES
    0x05, 0x00, 0x03, 0x00, 0x01, 0x00, 0x01, 0x05, // QZSS
    0x06, 0x00, 0x0E, 0x00, 0x00, 0x00, 0x01, 0x01, // GLONASS
];

/// Row layout of a CFG-GNSS message: 8-byte entries counted from the start
/// of the body, the header occupying row zero.
struct CfgGnssIndex {
    entry_size: usize,
    sbas_row: usize,
    beidou_row: usize,
    glonass_row: usize,
}

const CFG_GNSS_INDEX_SPG201: CfgGnssIndex = CfgGnssIndex {
    entry_size: 8,
    sbas_row: 2,
    beidou_row: 3,
    glonass_row: 5,
};

const CFG_GNSS_INDEX_SPG301: CfgGnssIndex = CfgGnssIndex {
    entry_size: 8,
    sbas_row: 2,
    beidou_row: 4,
    glonass_row: 7,
};

/// Byte of a CFG-GNSS row holding the minimum reserved tracking channels.
const CFG_GNSS_MIN_TRACKING: usize = 1;
/// Byte of a CFG-GNSS row holding the enable flag.
const CFG_GNSS_ENABLE: usize = 4;
const SECOND_MAJOR_TRACKING_CHANNELS: u8 = 0x08;

/// Known u-blox software families reported through MON-VER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwVersion {
    Spg100,
    Spg201,
    Spg301,
}

impl SwVersion {
    const EPSILON: f64 = 0.001;

    pub fn from_sw_version(version: f64) -> Option<Self> {
        if (version - 1.00).abs() < Self::EPSILON {
            Some(SwVersion::Spg100)
        } else if (version - 2.01).abs() < Self::EPSILON {
            Some(SwVersion::Spg201)
        } else if (version - 3.01).abs() < Self::EPSILON {
            Some(SwVersion::Spg301)
        } else {
            None
        }
    }

    /// NMEA protocol version spoken after the family's sequence ran.
    pub fn nmea_version(self) -> NmeaVersion {
        match self {
            SwVersion::Spg100 => NmeaVersion::V23,
            SwVersion::Spg201 | SwVersion::Spg301 => NmeaVersion::V41,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    Unconfigured,
    BaudNegotiating,
    VersionProbing,
    Sequencing(usize),
    Configured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    GnssReset,
    ClearConfig,
    SetNmea23,
    SetNmea41,
    ConfigGnssSpg100,
    ConfigGnssSpg201,
    ConfigGnssSpg301,
    SetNav5,
    EnablePubx00,
    DisableGll,
    DisableVtg,
    PollTimeGps,
    PollClock,
    PollMeasx,
    PollStatus,
    EnableRmc,
}

const SPG100_SEQUENCE: &[Step] = &[
    Step::GnssReset,
    Step::ClearConfig,
    Step::SetNmea23,
    Step::ConfigGnssSpg100,
    Step::SetNav5,
    Step::EnablePubx00,
    Step::DisableGll,
    Step::DisableVtg,
    Step::EnableRmc,
];

const SPG201_SEQUENCE: &[Step] = &[
    Step::GnssReset,
    Step::ClearConfig,
    Step::SetNmea41,
    Step::ConfigGnssSpg201,
    Step::SetNav5,
    Step::EnablePubx00,
    Step::DisableGll,
    Step::DisableVtg,
    Step::PollTimeGps,
    Step::PollClock,
    Step::PollMeasx,
    Step::PollStatus,
    Step::EnableRmc,
];

const SPG301_SEQUENCE: &[Step] = &[
    Step::GnssReset,
    Step::ClearConfig,
    Step::SetNmea41,
    Step::ConfigGnssSpg301,
    Step::SetNav5,
    Step::EnablePubx00,
    Step::DisableGll,
    Step::DisableVtg,
    Step::PollTimeGps,
    Step::PollClock,
    Step::PollMeasx,
    Step::PollStatus,
    Step::EnableRmc,
];

fn sequence_of(family: SwVersion) -> &'static [Step] {
    match family {
        SwVersion::Spg100 => SPG100_SEQUENCE,
        SwVersion::Spg201 => SPG201_SEQUENCE,
        SwVersion::Spg301 => SPG301_SEQUENCE,
    }
}

pub struct Configurator {
    transport: Arc<dyn Transport>,
    queue: Arc<MessageQueue>,
    gnss_baud_rate: u32,
    second_major: SecondMajor,
    sbas_enabled: bool,
    state: ConfigState,
}

impl Configurator {
    pub fn new(transport: Arc<dyn Transport>, queue: Arc<MessageQueue>, config: &HalConfig) -> Self {
        Self {
            transport,
            queue,
            gnss_baud_rate: config.gnss_baud_rate,
            second_major: config.second_major,
            sbas_enabled: config.sbas_enabled,
            state: ConfigState::Unconfigured,
        }
    }

    pub fn state(&self) -> ConfigState {
        self.state
    }

    /// Run the whole configuration against the receiver. Any error here is
    /// fatal for the session.
    pub fn configure(&mut self) -> Result<SwVersion, ConfigError> {
        self.enter(ConfigState::BaudNegotiating);
        self.change_baud_rate()?;

        self.enter(ConfigState::VersionProbing);
        let family = self.poll_mon_ver()?;
        info!("receiver software family {family:?}");

        // Stale acknowledgements must not satisfy the first step.
        self.queue.of::<AckParcel>().clear();
        for (index, step) in sequence_of(family).iter().enumerate() {
            self.enter(ConfigState::Sequencing(index));
            self.run_step(*step)?;
        }
        self.enter(ConfigState::Configured);
        info!("receiver configuration complete");
        Ok(family)
    }

    fn enter(&mut self, state: ConfigState) {
        debug!("configurator: {:?} -> {state:?}", self.state);
        self.state = state;
    }

    fn run_step(&self, step: Step) -> Result<(), ConfigError> {
        match step {
            Step::GnssReset => self.gnss_reset(),
            Step::ClearConfig => self.send_repeated(&CFG_CLEAR, ids::CLASS_CFG, ids::ID_CFG_CLEAR),
            Step::SetNmea23 => self.send_repeated(&CFG_NMEA23, ids::CLASS_CFG, ids::ID_CFG_NMEA),
            Step::SetNmea41 => self.send_repeated(&CFG_NMEA41, ids::CLASS_CFG, ids::ID_CFG_NMEA),
            Step::ConfigGnssSpg100 => {
                self.send_repeated(&CFG_GNSS_SPG100, ids::CLASS_CFG, ids::ID_CFG_GNSS)
            }
            Step::ConfigGnssSpg201 => {
                let mut body = CFG_GNSS_SPG201;
                self.prepare_gnss_config(&CFG_GNSS_INDEX_SPG201, &mut body);
                self.send_repeated(&body, ids::CLASS_CFG, ids::ID_CFG_GNSS)
            }
            Step::ConfigGnssSpg301 => {
                let mut body = CFG_GNSS_SPG301;
                self.prepare_gnss_config(&CFG_GNSS_INDEX_SPG301, &mut body);
                self.send_repeated(&body, ids::CLASS_CFG, ids::ID_CFG_GNSS)
            }
            Step::SetNav5 => self.send_repeated(&CFG_NAV5, ids::CLASS_CFG, ids::ID_CFG_NAV5),
            Step::EnablePubx00 => self.set_message_rate(
                ids::CLASS_NMEA_CFG_PUBX,
                ids::ID_NMEA_PUBX_POSITION,
                MESSAGE_RATE_DEFAULT,
            ),
            Step::DisableGll => {
                self.set_message_rate(ids::CLASS_NMEA_CFG, ids::ID_NMEA_GLL, MESSAGE_RATE_DISABLED)
            }
            Step::DisableVtg => {
                self.set_message_rate(ids::CLASS_NMEA_CFG, ids::ID_NMEA_VTG, MESSAGE_RATE_DISABLED)
            }
            Step::PollTimeGps => {
                self.set_message_rate(ids::CLASS_NAV, ids::ID_NAV_TIMEGPS, MESSAGE_RATE_DEFAULT)
            }
            Step::PollClock => {
                self.set_message_rate(ids::CLASS_NAV, ids::ID_NAV_CLOCK, MESSAGE_RATE_DEFAULT)
            }
            Step::PollMeasx => {
                self.set_message_rate(ids::CLASS_RXM, ids::ID_RXM_MEASX, MESSAGE_RATE_DEFAULT)
            }
            Step::PollStatus => {
                self.set_message_rate(ids::CLASS_NAV, ids::ID_NAV_STATUS, MESSAGE_RATE_DEFAULT)
            }
            Step::EnableRmc => {
                self.set_message_rate(ids::CLASS_NMEA_CFG, ids::ID_NMEA_RMC, MESSAGE_RATE_DEFAULT)
            }
        }
    }

    /// Mutate the enable bytes of the CFG-GNSS mask from the configured
    /// secondary-major and SBAS properties.
    fn prepare_gnss_config(&self, index: &CfgGnssIndex, body: &mut [u8]) {
        if !self.sbas_enabled {
            let row = index.entry_size * index.sbas_row;
            body[row + CFG_GNSS_MIN_TRACKING] = 0x00;
            body[row + CFG_GNSS_ENABLE] = 0x00;
        }
        match self.second_major {
            SecondMajor::Glonass => {
                let row = index.entry_size * index.glonass_row;
                body[row + CFG_GNSS_MIN_TRACKING] = SECOND_MAJOR_TRACKING_CHANNELS;
                body[row + CFG_GNSS_ENABLE] = 0x01;
            }
            SecondMajor::Beidou => {
                let row = index.entry_size * index.beidou_row;
                body[row + CFG_GNSS_MIN_TRACKING] = SECOND_MAJOR_TRACKING_CHANNELS;
                body[row + CFG_GNSS_ENABLE] = 0x01;
            }
            SecondMajor::None => {}
        }
    }

    /// Up to [`MAX_ACK_RETRIES`] attempts, each gated on a matching ACK.
    fn send_repeated(&self, body: &[u8], class: u8, id: u8) -> Result<(), ConfigError> {
        for attempt in 1..=MAX_ACK_RETRIES {
            self.transport
                .write_frame(body)
                .map_err(|_| ConfigError::InternalError)?;
            match self.wait_confirmation(class, id) {
                Ok(()) => return Ok(()),
                Err(e) => debug!("attempt {attempt} for 0x{class:02x}/0x{id:02x}: {e}"),
            }
        }
        error!("no ACK for 0x{class:02x}/0x{id:02x} after {MAX_ACK_RETRIES} attempts");
        Err(ConfigError::InternalError)
    }

    fn wait_confirmation(&self, class: u8, id: u8) -> Result<(), ConfigError> {
        let acks = self.queue.of::<AckParcel>();
        let Some(parcel) = acks.pop_wait(ACK_TIMEOUT) else {
            return Err(ConfigError::AckTimeout { class, id });
        };
        if parcel.kind() == UbxMsgKind::AckAck && parcel.acknowledged() == Some((class, id)) {
            Ok(())
        } else {
            Err(ConfigError::NackReceived { class, id })
        }
    }

    fn set_message_rate(&self, class: u8, id: u8, rate: u8) -> Result<(), ConfigError> {
        let body = [
            0x06, 0x01, 0x08, 0x00, class, id, rate, rate, //
            0x00, rate, rate, 0x00,
        ];
        self.send_repeated(&body, ids::CLASS_CFG, ids::ID_CFG_MSG)
    }

    fn gnss_reset(&self) -> Result<(), ConfigError> {
        let mut body = CFG_RESET;
        body[CFG_HEADER_LEN + 2] = RESET_MODE_GNSS;
        self.transport
            .write_frame(&body)
            .map_err(|_| ConfigError::InternalError)?;
        // The receiver restarts; nothing will acknowledge this command.
        thread::sleep(RESET_SETTLE);
        Ok(())
    }

    /// Negotiate the line rate: CFG-PRT goes out at the old rate, the TTY is
    /// re-based, and the acknowledgement is awaited on the new rate.
    fn change_baud_rate(&self) -> Result<(), ConfigError> {
        if self.transport.baud_rate() == self.gnss_baud_rate {
            return Ok(());
        }
        self.set_port_speed(UART1_PORT_ID, self.gnss_baud_rate)?;
        info!("gnss line rate set to {}", self.gnss_baud_rate);
        Ok(())
    }

    fn set_port_speed(&self, port: u8, speed: u32) -> Result<(), ConfigError> {
        const PAYLOAD_LEN: usize = 20;
        const MODE_8N1: u32 = (1 << 11) | (3 << 6);
        // NMEA and UBX in both directions; RTCM stays off.
        const PROTOCOL_MASK: u8 = 0x03;

        let mut body = [0u8; CFG_HEADER_LEN + PAYLOAD_LEN];
        body[0] = ids::CLASS_CFG;
        body[1] = ids::ID_CFG_PRT;
        body[2..4].copy_from_slice(&(PAYLOAD_LEN as u16).to_le_bytes());
        let payload = &mut body[CFG_HEADER_LEN..];
        payload[0] = port;
        payload[4..8].copy_from_slice(&MODE_8N1.to_le_bytes());
        payload[8..12].copy_from_slice(&speed.to_le_bytes());
        payload[12] = PROTOCOL_MASK;
        payload[14] = PROTOCOL_MASK;

        self.transport
            .write_frame(&body)
            .map_err(|_| ConfigError::InternalError)?;
        if self.transport.set_baud_rate(speed).is_err() {
            error!("can not set tty baud rate to {speed}");
            return Err(ConfigError::InternalError);
        }
        if self
            .wait_confirmation(ids::CLASS_CFG, ids::ID_CFG_PRT)
            .is_err()
        {
            error!("no ACK for the speed change");
            return Err(ConfigError::InternalError);
        }
        Ok(())
    }

    fn poll_mon_ver(&self) -> Result<SwVersion, ConfigError> {
        self.transport
            .write_frame(&MSG_POLL_MON_VER)
            .map_err(|_| ConfigError::InternalError)?;

        let versions = self.queue.of::<MonVerParcel>();
        let Some(parcel) = versions.pop_wait(MON_VER_TIMEOUT) else {
            error!("receiver did not answer the MON-VER poll");
            return Err(ConfigError::InternalError);
        };
        if !parcel.is_valid() {
            return Err(ConfigError::UnsupportedReceiver);
        }
        SwVersion::from_sw_version(parcel.sw_version()).ok_or(ConfigError::UnsupportedReceiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::TransportState;
    use crate::ubx::mon_ver::mon_ver_payload;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone, Copy, PartialEq)]
    enum AckPolicy {
        AlwaysAck,
        NackFirstAttempt,
        AlwaysNackClear,
    }

    struct MockReceiver {
        queue: Arc<MessageQueue>,
        policy: AckPolicy,
        sw_version: &'static str,
        /// Attempt counters keyed per distinct command; CFG-MSG commands
        /// differ by the message they target.
        attempts: Mutex<HashMap<(u8, u8, u8, u8), u32>>,
        writes: Mutex<Vec<Vec<u8>>>,
    }

    impl MockReceiver {
        fn new(queue: Arc<MessageQueue>, policy: AckPolicy, sw_version: &'static str) -> Self {
            Self {
                queue,
                policy,
                sw_version,
                attempts: Mutex::new(HashMap::new()),
                writes: Mutex::new(Vec::new()),
            }
        }

        fn attempts_for(&self, class: u8, id: u8) -> u32 {
            self.attempts
                .lock()
                .unwrap()
                .iter()
                .filter(|((c, i, _, _), _)| (*c, *i) == (class, id))
                .map(|(_, count)| count)
                .sum()
        }

        fn wrote_command(&self, class: u8, id: u8) -> bool {
            self.attempts_for(class, id) > 0
        }

        fn respond(&self, frame: &[u8]) {
            let (class, id) = (frame[2], frame[3]);
            if (class, id) == (ids::CLASS_MON, ids::ID_MON_VER) {
                self.queue
                    .of::<MonVerParcel>()
                    .push(MonVerParcel::parse(&mon_ver_payload(self.sw_version, &[])));
                return;
            }
            if (class, id) == (ids::CLASS_CFG, ids::ID_CFG_RST) {
                return; // a resetting receiver answers nothing
            }

            let target = if (class, id) == (ids::CLASS_CFG, ids::ID_CFG_MSG) {
                (frame[6], frame[7])
            } else {
                (0, 0)
            };
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let counter = attempts.entry((class, id, target.0, target.1)).or_insert(0);
                *counter += 1;
                *counter
            };
            let nack = match self.policy {
                AckPolicy::AlwaysAck => false,
                // Baud negotiation is not a sequence step; only steps see
                // the first-attempt NACK.
                AckPolicy::NackFirstAttempt => {
                    attempt == 1 && (class, id) != (ids::CLASS_CFG, ids::ID_CFG_PRT)
                }
                AckPolicy::AlwaysNackClear => (class, id) == (ids::CLASS_CFG, ids::ID_CFG_CLEAR),
            };
            let kind = if nack {
                UbxMsgKind::AckNack
            } else {
                UbxMsgKind::AckAck
            };
            self.queue
                .of::<AckParcel>()
                .push(AckParcel::parse(&[class, id], kind));
        }
    }

    impl Transport for MockReceiver {
        fn open(&self) -> Result<(), TransportError> {
            Ok(())
        }
        fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
        fn read_byte(&self) -> Result<u8, TransportError> {
            Err(TransportError::FailedToRead)
        }
        fn write_raw(&self, bytes: &[u8]) -> Result<(), TransportError> {
            self.writes.lock().unwrap().push(bytes.to_vec());
            self.respond(bytes);
            Ok(())
        }
        fn state(&self) -> TransportState {
            TransportState::Ready
        }
        fn path(&self) -> &str {
            "mock"
        }
        fn baud_rate(&self) -> u32 {
            9600
        }
        fn set_baud_rate(&self, _rate: u32) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn configurator_against(
        policy: AckPolicy,
        sw_version: &'static str,
    ) -> (Configurator, Arc<MockReceiver>) {
        let queue = MessageQueue::new();
        let mock = Arc::new(MockReceiver::new(Arc::clone(&queue), policy, sw_version));
        let transport: Arc<dyn Transport> = Arc::clone(&mock) as Arc<dyn Transport>;
        let configurator = Configurator::new(transport, queue, &HalConfig::default());
        (configurator, mock)
    }

    #[test]
    fn spg301_sequence_completes_against_a_cooperative_receiver() {
        let (mut configurator, mock) = configurator_against(AckPolicy::AlwaysAck, "ROM 3.01");
        let family = configurator.configure().unwrap();
        assert_eq!(family, SwVersion::Spg301);
        assert_eq!(configurator.state(), ConfigState::Configured);
        assert_eq!(family.nmea_version(), NmeaVersion::V41);

        // Baud negotiation happened at the configured rate.
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_PRT), 1);
        // Every ack-gated command went out exactly once.
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_CLEAR), 1);
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_NMEA), 1);
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_GNSS), 1);
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_NAV5), 1);
        // PUBX on, GLL/VTG off, four polls, RMC on: eight CFG-MSG writes.
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_MSG), 8);
    }

    #[test]
    fn each_step_retries_once_when_first_attempt_is_nacked() {
        let (mut configurator, mock) =
            configurator_against(AckPolicy::NackFirstAttempt, "ROM 2.01");
        let family = configurator.configure().unwrap();
        assert_eq!(family, SwVersion::Spg201);

        // Two attempts per ack-gated command, never more.
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_CLEAR), 2);
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_NMEA), 2);
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_GNSS), 2);
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_NAV5), 2);
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_MSG), 2 * 8);
    }

    #[test]
    fn persistent_nack_aborts_after_five_attempts() {
        let (mut configurator, mock) =
            configurator_against(AckPolicy::AlwaysNackClear, "ROM 3.01");
        let error = configurator.configure().unwrap_err();
        assert!(matches!(error, ConfigError::InternalError));
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_CLEAR), 5);
        // No step after CFG-CLEAR ran.
        assert!(!mock.wrote_command(ids::CLASS_CFG, ids::ID_CFG_NMEA));
        assert!(!mock.wrote_command(ids::CLASS_CFG, ids::ID_CFG_MSG));
    }

    #[test]
    fn unknown_software_family_is_unsupported() {
        let (mut configurator, _mock) = configurator_against(AckPolicy::AlwaysAck, "ROM 9.99");
        assert!(matches!(
            configurator.configure(),
            Err(ConfigError::UnsupportedReceiver)
        ));
    }

    #[test]
    fn second_major_and_sbas_mutate_the_gnss_mask() {
        let queue = MessageQueue::new();
        let mock = Arc::new(MockReceiver::new(
            Arc::clone(&queue),
            AckPolicy::AlwaysAck,
            "ROM 3.01",
        ));
        let transport: Arc<dyn Transport> = Arc::clone(&mock) as Arc<dyn Transport>;
        let config = HalConfig {
            second_major: SecondMajor::Beidou,
            sbas_enabled: false,
            ..HalConfig::default()
        };
        let mut configurator = Configurator::new(transport, queue, &config);
        configurator.configure().unwrap();

        let writes = mock.writes.lock().unwrap();
        let gnss = writes
            .iter()
            .find(|frame| frame[2] == ids::CLASS_CFG && frame[3] == ids::ID_CFG_GNSS)
            .expect("a CFG-GNSS frame was written");
        // Frame = 2 sync bytes + body; body rows of 8 from the body start.
        let body = &gnss[2..];
        // SBAS row disabled.
        assert_eq!(body[2 * 8 + CFG_GNSS_MIN_TRACKING], 0x00);
        assert_eq!(body[2 * 8 + CFG_GNSS_ENABLE], 0x00);
        // BEIDOU row enabled with eight reserved channels.
        assert_eq!(body[4 * 8 + CFG_GNSS_MIN_TRACKING], 0x08);
        assert_eq!(body[4 * 8 + CFG_GNSS_ENABLE], 0x01);
        // GLONASS row untouched.
        assert_eq!(body[7 * 8 + CFG_GNSS_ENABLE], 0x00);
    }

    #[test]
    fn matching_baud_rate_skips_negotiation() {
        let queue = MessageQueue::new();
        let mock = Arc::new(MockReceiver::new(
            Arc::clone(&queue),
            AckPolicy::AlwaysAck,
            "ROM 1.00",
        ));
        let transport: Arc<dyn Transport> = Arc::clone(&mock) as Arc<dyn Transport>;
        let config = HalConfig {
            gnss_baud_rate: 9600, // the mock's current rate
            ..HalConfig::default()
        };
        let mut configurator = Configurator::new(transport, queue, &config);
        let family = configurator.configure().unwrap();
        assert_eq!(family, SwVersion::Spg100);
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_PRT), 0);
        // The SPG100 sequence has no measurement polls.
        assert_eq!(mock.attempts_for(ids::CLASS_CFG, ids::ID_CFG_MSG), 4);
    }
}
