use std::time::Duration;

use anyhow::{anyhow, Context};
use bluest::Uuid;
use clap::Parser;

/// Show the high-voltage battery current read through a Bluetooth LE OBD-II adapter
#[derive(Parser, Debug, Clone)]
#[command(name = "hvcurrent", version, about, long_about = None)]
pub struct Args {
    /// Advertised name of the OBD-II adapter
    #[arg(long, env = "HVCURRENT_DEVICE", default_value = "OBDII")]
    pub device_name: String,

    /// The adapter's serial GATT service
    #[arg(long, default_value = "0000fff0-0000-1000-8000-00805f9b34fb")]
    pub service_uuid: String,

    /// Characteristic commands are written to
    #[arg(long, default_value = "0000fff2-0000-1000-8000-00805f9b34fb")]
    pub write_uuid: String,

    /// Characteristic responses are notified on
    #[arg(long, default_value = "0000fff1-0000-1000-8000-00805f9b34fb")]
    pub notify_uuid: String,

    /// Minimum time between two current requests
    #[arg(long, value_name = "MS", default_value_t = 200)]
    pub poll_interval_ms: u64,

    /// Time between two display refreshes
    #[arg(long, value_name = "MS", default_value_t = 200)]
    pub render_interval_ms: u64,

    /// How long a sample keeps the reading live
    #[arg(long, value_name = "MS", default_value_t = 1500)]
    pub freshness_ms: u64,

    /// How long an unfinished multi-frame response may wait for its next frame
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub reassembly_timeout_ms: u64,

    /// Verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Validated settings
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub device_name: String,
    pub service_uuid: Uuid,
    pub write_uuid: Uuid,
    pub notify_uuid: Uuid,
    pub poll_interval: Duration,
    pub render_interval: Duration,
    pub freshness: Duration,
    pub reassembly_timeout: Duration,
}

impl TryFrom<Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> anyhow::Result<Self> {
        if args.device_name.trim().is_empty() {
            return Err(anyhow!("Device name must not be empty"));
        }
        if args.poll_interval_ms == 0 || args.render_interval_ms == 0 {
            return Err(anyhow!("Poll and render intervals must be greater than zero"));
        }

        Ok(Self {
            device_name: args.device_name,
            service_uuid: parse_uuid(&args.service_uuid, "service")?,
            write_uuid: parse_uuid(&args.write_uuid, "write characteristic")?,
            notify_uuid: parse_uuid(&args.notify_uuid, "notify characteristic")?,
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            render_interval: Duration::from_millis(args.render_interval_ms),
            freshness: Duration::from_millis(args.freshness_ms),
            reassembly_timeout: Duration::from_millis(args.reassembly_timeout_ms),
        })
    }
}

fn parse_uuid(s: &str, what: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("Invalid {what} UUID: {s}"))
}

#[test]
fn test_defaults() {
    let config = Config::try_from(Args::parse_from(["hvcurrent", "--device-name", "OBDII"])).unwrap();
    assert_eq!(config.device_name, "OBDII");
    assert_eq!(config.poll_interval, Duration::from_millis(200));
    assert_eq!(config.freshness, Duration::from_millis(1500));
    assert_eq!(
        config.notify_uuid,
        Uuid::parse_str("0000fff1-0000-1000-8000-00805f9b34fb").unwrap()
    );
}

#[test]
fn test_overrides() {
    let args = Args::parse_from([
        "hvcurrent",
        "--device-name",
        "Vgate",
        "--freshness-ms",
        "3000",
        "-vv",
    ]);
    assert_eq!(args.verbose, 2);
    let config = Config::try_from(args).unwrap();
    assert_eq!(config.device_name, "Vgate");
    assert_eq!(config.freshness, Duration::from_secs(3));
}

#[test]
fn test_invalid_uuid() {
    let args = Args::parse_from(["hvcurrent", "--write-uuid", "fff2"]);
    let err = Config::try_from(args).unwrap_err();
    assert!(err.to_string().contains("write characteristic"));
}

#[test]
fn test_zero_interval_rejected() {
    let args = Args::parse_from(["hvcurrent", "--poll-interval-ms", "0"]);
    assert!(Config::try_from(args).is_err());
}
