use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction};
use gnss_hal::{GeneralManager, HalConfig, SecondMajor, FAKE_DEVICE_PATH};
use log::info;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();

    let matches = clap::Command::new("gnss-hal-cli")
        .about("Stream fused GNSS reports as JSON lines")
        .arg(
            Arg::new("device")
                .value_name("path")
                .short('d')
                .long("device")
                .required(false)
                .default_value(FAKE_DEVICE_PATH)
                .help("Receiver tty path, or 'fake' for file replay"),
        )
        .arg(
            Arg::new("tty-baud")
                .value_name("rate")
                .long("tty-baud")
                .required(false)
                .default_value("9600")
                .value_parser(value_parser!(u32))
                .help("Initial line rate of the receiver"),
        )
        .arg(
            Arg::new("gnss-baud")
                .value_name("rate")
                .long("gnss-baud")
                .required(false)
                .default_value("38400")
                .value_parser(value_parser!(u32))
                .help("Line rate after configuration"),
        )
        .arg(
            Arg::new("secmajor")
                .value_name("gnss")
                .long("secmajor")
                .required(false)
                .value_parser(["glonass", "beidou", "none"])
                .default_value("glonass")
                .help("Second major constellation of the receiver configuration"),
        )
        .arg(
            Arg::new("no-sbas")
                .long("no-sbas")
                .action(ArgAction::SetTrue)
                .help("Disable SBAS in the receiver configuration"),
        )
        .arg(
            Arg::new("route")
                .value_name("file")
                .long("route")
                .required(false)
                .default_value("fake_route.txt")
                .value_parser(value_parser!(PathBuf))
                .help("Route file for the fake transport"),
        )
        .arg(
            Arg::new("interval")
                .value_name("micros")
                .long("interval")
                .required(false)
                .default_value("1000000")
                .value_parser(value_parser!(u64))
                .help("Provider update interval in microseconds"),
        )
        .get_matches();

    let config = HalConfig {
        device_path: matches.get_one::<String>("device").unwrap().clone(),
        tty_baud_rate: *matches.get_one::<u32>("tty-baud").unwrap(),
        gnss_baud_rate: *matches.get_one::<u32>("gnss-baud").unwrap(),
        second_major: match matches.get_one::<String>("secmajor").unwrap().as_str() {
            "beidou" => SecondMajor::Beidou,
            "glonass" => SecondMajor::Glonass,
            _ => SecondMajor::None,
        },
        sbas_enabled: !matches.get_flag("no-sbas"),
        fake_route: matches.get_one::<PathBuf>("route").unwrap().clone(),
        reset_line: None,
    };

    let mut manager = GeneralManager::new(config).context("building the GNSS pipeline")?;
    register_printers(&manager);
    manager.run().context("starting the GNSS pipeline")?;
    manager.set_update_interval(*matches.get_one::<u64>("interval").unwrap());
    manager.set_enabled(true);
    info!("pipeline running, streaming reports");

    loop {
        thread::sleep(Duration::from_secs(1));
        if !manager.is_transport_alive() {
            manager.stop();
            anyhow::bail!("receiver transport died");
        }
        if let Some(Err(e)) = manager.config_result() {
            manager.stop();
            anyhow::bail!("receiver configuration failed: {e}");
        }
    }
}

fn register_printers(manager: &GeneralManager) {
    if let Some(provider) = manager.location_provider() {
        provider.set_callback_2_1(Box::new(|data| {
            if let Ok(line) = serde_json::to_string(data) {
                println!("{{\"location\":{line}}}");
            }
        }));
    }
    if let Some(provider) = manager.sv_info_provider() {
        provider.set_callback_2_1(Box::new(|list| {
            if let Ok(line) = serde_json::to_string(list) {
                println!("{{\"satellites\":{line}}}");
            }
        }));
    }
    if let Some(provider) = manager.measurement_provider() {
        provider.set_callback_2_1(Box::new(|data| {
            if let Ok(line) = serde_json::to_string(data) {
                println!("{{\"measurement\":{line}}}");
            }
        }));
    }
    if let Some(provider) = manager.fake_location_provider() {
        provider.set_callback_2_0(Box::new(|data| {
            if let Ok(line) = serde_json::to_string(data) {
                println!("{{\"location\":{line}}}");
            }
        }));
    }
}
