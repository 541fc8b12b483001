use std::time::Instant;

use anyhow::anyhow;
use bluest::Adapter;
use bluest::AdvertisingDevice;
use bluest::Characteristic;
use bluest::Device;
use futures_util::Stream;
use futures_util::StreamExt;
use tokio::time::timeout;
use tokio::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::display::{Display, Screen};
use crate::elm327::{self, INIT_SEQUENCE};
use crate::message::current_message::REQUEST;
use crate::monitor::CurrentMonitor;

/// A connection to an ELM327-style OBD-II adapter exposing a serial service over BLE.
pub struct ObdClient {
    adapter: Adapter,
    device: Device,
    write: Characteristic,
    notify: Characteristic,
    config: Config,
}

impl ObdClient {
    // How long to look for the adapter before giving up
    const DISCOVERY_TIMEOUT_S: u64 = 30;
    const CONNECT_RETRIES: u32 = 2;

    /// Disconnect from the adapter
    pub async fn stop(self) -> anyhow::Result<()> {
        self.adapter.disconnect_device(&self.device).await?;
        Ok(())
    }

    /// Create a new `ObdClient`, which includes attempting to discover the adapter.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let adapter = bluest::Adapter::default()
            .await
            .ok_or(anyhow!("Default adapter not found"))?;
        adapter.wait_available().await?;

        let device = timeout(
            Duration::from_secs(Self::DISCOVERY_TIMEOUT_S),
            Self::discover_device(&config, &adapter),
        )
        .await
        .map_err(|_| anyhow!("Device not found"))??;

        adapter.connect_device(&device.device).await?;
        info!("Connected to {}", config.device_name);

        let service = device
            .device
            .discover_services_with_uuid(config.service_uuid)
            .await?
            .first()
            .ok_or(anyhow!("The specified device does not support the serial service."))?
            .clone();
        let write = service
            .discover_characteristics_with_uuid(config.write_uuid)
            .await?
            .first()
            .ok_or(anyhow!("The specified device does not support the serial write characteristic."))?
            .clone();
        let notify = service
            .discover_characteristics_with_uuid(config.notify_uuid)
            .await?
            .first()
            .ok_or(anyhow!("The specified device does not support the serial notify characteristic."))?
            .clone();

        Ok(Self {
            adapter: adapter.clone(),
            device: device.device,
            write,
            notify,
            config,
        })
    }

    /// Initialize the adapter, then poll the battery current and refresh `display`
    /// until the link fails.
    ///
    /// Only returns with an error: a transport failure or the end of the
    /// notification stream. Call [`ObdClient::try_connect`] before running again.
    pub async fn run<D: Display>(
        &self,
        monitor: &mut CurrentMonitor,
        display: &mut D,
    ) -> anyhow::Result<()> {
        let notifications = self.notify.notify().await?;
        futures_util::pin_mut!(notifications);

        monitor.reset();
        for (command, settle) in INIT_SEQUENCE {
            self.send_command(command).await?;
            pump(&mut notifications, monitor, *settle).await?;
        }
        info!("Adapter initialized, polling {REQUEST}");

        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut render = tokio::time::interval(self.config.render_interval);
        render.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.send_command(REQUEST).await?;
                }
                _ = render.tick() => {
                    let connected = self.is_connected().await;
                    refresh(monitor, display, connected, Instant::now())?;
                    if !connected {
                        return Err(anyhow!("Adapter disconnected"));
                    }
                }
                rx = notifications.next() => match rx {
                    Some(Ok(data)) => {
                        monitor.ingest(&data, Instant::now());
                    }
                    Some(Err(err)) => {
                        warn!("Notification error: {err}");
                        return Err(err.into());
                    }
                    None => return Err(anyhow!("End of notification stream")),
                },
            }
        }
    }

    /// Send one command line to the adapter
    pub async fn send_command(&self, command: &str) -> anyhow::Result<()> {
        debug!("TX: {command}");
        self.write.write(&elm327::encode_command(command)).await?;
        Ok(())
    }

    async fn discover_device(config: &Config, adapter: &Adapter) -> anyhow::Result<AdvertisingDevice> {
        let required_services = [config.service_uuid];
        let mut adapter_events = adapter.scan(&required_services).await?;
        while let Some(device) = timeout(
            Duration::from_secs(Self::DISCOVERY_TIMEOUT_S),
            adapter_events.next(),
        )
        .await
        .map_err(|_| anyhow!("Device not found"))?
        {
            let device_name = device.device.name_async().await?;
            debug!("Discovered {device_name}");
            if device_name == config.device_name {
                return Ok(device);
            }
        }

        Err(anyhow!("Device not found"))
    }

    pub async fn is_connected(&self) -> bool {
        self.device.is_connected().await
    }

    /// Reconnect if the link dropped
    pub async fn try_connect(&self) -> anyhow::Result<()> {
        if !self.device.is_connected().await {
            let mut retries = Self::CONNECT_RETRIES;
            loop {
                match self.adapter.connect_device(&self.device).await {
                    Ok(()) => {
                        info!("Reconnected to {}", self.config.device_name);
                        return Ok(());
                    }
                    Err(err) if retries > 0 => {
                        warn!("Failed to connect: {err}");
                        retries -= 1;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }

        Ok(())
    }
}

/// One render tick: drop a stalled reassembly and show the current reading
/// together with the link state.
pub(crate) fn refresh<D: Display>(
    monitor: &mut CurrentMonitor,
    display: &mut D,
    connected: bool,
    now: Instant,
) -> anyhow::Result<()> {
    monitor.expire_stalled(now);
    display.show(&Screen::render(&monitor.reading(now), connected))
}

/// Feed everything the adapter sends within `window` into `monitor`.
///
/// Used while the adapter settles after a command, when replies are mostly
/// status text. Fails if the stream errors or ends.
pub(crate) async fn pump<T, E>(
    notifications: &mut T,
    monitor: &mut CurrentMonitor,
    window: Duration,
) -> anyhow::Result<()>
where
    T: Stream<Item = Result<Vec<u8>, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let deadline = tokio::time::Instant::now() + window;
    loop {
        match tokio::time::timeout_at(deadline, notifications.next()).await {
            Err(_) => return Ok(()),
            Ok(Some(Ok(data))) => {
                debug!("RX: {:?}", String::from_utf8_lossy(&data));
                monitor.ingest(&data, Instant::now());
            }
            Ok(Some(Err(err))) => return Err(err.into()),
            Ok(None) => return Err(anyhow!("End of notification stream")),
        }
    }
}

#[cfg(test)]
fn notifications(chunks: &[&[u8]]) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Unpin {
    let items: Vec<_> = chunks.iter().map(|c| Ok(c.to_vec())).collect();
    futures_util::stream::iter(items).chain(futures_util::stream::pending())
}

#[tokio::test]
async fn test_pump_feeds_monitor() {
    let mut monitor = CurrentMonitor::default();
    let mut stream = notifications(&[
        b"OK\r\r>",
        b"7DA1009621F9A010203\r",
        b"7DA2104007B00000000\r\r>",
    ]);

    pump(&mut stream, &mut monitor, Duration::from_millis(20)).await.unwrap();

    let reading = monitor.reading(Instant::now());
    assert!(reading.live);
    assert!((reading.amps - 0.15 * 12.3).abs() < 1e-4);
}

#[tokio::test]
async fn test_pump_quiet_stream_times_out() {
    let mut monitor = CurrentMonitor::default();
    let mut stream = notifications(&[]);
    pump(&mut stream, &mut monitor, Duration::from_millis(10)).await.unwrap();
    assert!(!monitor.reading(Instant::now()).live);
}

#[tokio::test]
async fn test_pump_end_of_stream() {
    let mut monitor = CurrentMonitor::default();
    let mut stream = futures_util::stream::iter(vec![Ok::<_, std::io::Error>(b"OK\r".to_vec())]);
    let err = pump(&mut stream, &mut monitor, Duration::from_secs(1)).await.unwrap_err();
    assert!(err.to_string().contains("End of notification stream"));
}

#[tokio::test]
async fn test_pump_stream_error() {
    let mut monitor = CurrentMonitor::default();
    let mut stream = futures_util::stream::iter(vec![Err::<Vec<u8>, _>(std::io::Error::other("link lost"))]);
    let err = pump(&mut stream, &mut monitor, Duration::from_secs(1)).await.unwrap_err();
    assert!(err.to_string().contains("link lost"));
}

#[test]
fn test_refresh_shows_link_state() {
    let mut monitor = CurrentMonitor::default();
    let mut display = crate::display::ConsoleDisplay::new(Vec::new());
    let now = Instant::now();
    monitor.ingest(b"7DA1009621F9A010203\r7DA2104007B00000000\r", now);

    refresh(&mut monitor, &mut display, true, now).unwrap();
    refresh(&mut monitor, &mut display, false, now).unwrap();

    let out = String::from_utf8(display.into_inner()).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("DISCHG  OBD:OK"));
    assert!(lines[1].contains("OBD:DISCONNECTED"));
}

#[test]
fn test_refresh_expires_stalled_session() {
    let mut monitor = CurrentMonitor::default();
    let mut display = crate::display::ConsoleDisplay::new(Vec::new());
    let t = Instant::now();
    monitor.ingest(b"7DA1009621F9A010203\r", t);

    refresh(&mut monitor, &mut display, true, t + Duration::from_millis(1001)).unwrap();
    assert_eq!(monitor.session().state(), crate::isotp::SessionState::Idle);
}
