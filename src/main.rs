use std::time::Instant;

use clap::Parser;
use hvcurrent::display::{ConsoleDisplay, Display, Screen};
use hvcurrent::{Args, Config, CurrentMonitor, ObdClient};
use tokio::time::{sleep, Duration};
use tracing_subscriber::EnvFilter;

const RECONNECT_DELAY: Duration = Duration::from_millis(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let config = Config::try_from(args)?;

    tracing::info!("hvcurrent v{} looking for {}", env!("CARGO_PKG_VERSION"), config.device_name);

    let mut display = ConsoleDisplay::stdout();
    display.show(&Screen::message("HV current...", "Connecting..."))?;

    let client = match ObdClient::new(config.clone()).await {
        Ok(client) => client,
        Err(err) => {
            display.show(&Screen::message("BT CONNECT FAIL", "check name/UUID"))?;
            return Err(err);
        }
    };

    let mut monitor = CurrentMonitor::new(config.freshness, config.reassembly_timeout);

    loop {
        let stop = tokio::select! {
            result = client.run(&mut monitor, &mut display) => {
                if let Err(err) = result {
                    tracing::warn!("Lost the adapter: {err:#}");
                }
                false
            }
            _ = tokio::signal::ctrl_c() => true,
        };
        if stop {
            break;
        }

        display.show(&Screen::render(&monitor.reading(Instant::now()), false))?;
        sleep(RECONNECT_DELAY).await;
        if let Err(err) = client.try_connect().await {
            tracing::warn!("Reconnect failed: {err:#}");
        }
    }

    tracing::info!("Disconnecting");
    client.stop().await
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
