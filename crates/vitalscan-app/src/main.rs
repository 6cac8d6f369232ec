//! Vitalscan Application
//!
//! Command-line front end for the Vitalscan biometric pipelines.
//!
//! # Usage
//!
//! ```bash
//! # Optical pulse demo against the simulated source (default)
//! vitalscan pulse --bpm 72
//!
//! # Connect a BLE oximeter and stream readings
//! vitalscan oximeter
//!
//! # List nearby oximeter candidates
//! vitalscan devices
//! ```

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use vitalscan_native::acquisition::{PulseConfig, PulseSession};
use vitalscan_native::capture::SimulatedPulseSource;

/// Vitalscan Application
#[derive(Parser, Debug)]
#[command(name = "vitalscan")]
#[command(author, version, about = "Vitalscan biometric sensor pipelines", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the optical pulse pipeline (default if no subcommand)
    Pulse {
        /// Simulated heart rate in BPM
        #[arg(long, default_value = "72")]
        bpm: f32,

        /// How long to run, in seconds
        #[arg(short, long, default_value = "30")]
        duration: u64,
    },

    /// Connect a BLE oximeter and stream readings
    Oximeter {
        /// BLE scan duration in seconds
        #[arg(long, default_value = "5")]
        scan_duration: u64,
    },

    /// List nearby oximeter candidates
    Devices {
        /// BLE scan duration in seconds
        #[arg(long, default_value = "5")]
        scan_duration: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Vitalscan v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        None => run_pulse(72.0, 30).await?,
        Some(Commands::Pulse { bpm, duration }) => run_pulse(bpm, duration).await?,
        Some(Commands::Oximeter { scan_duration }) => run_oximeter(scan_duration).await?,
        Some(Commands::Devices { scan_duration }) => list_devices(scan_duration).await?,
    }

    Ok(())
}

/// Run the optical pulse pipeline against the simulated source.
async fn run_pulse(bpm: f32, duration: u64) -> anyhow::Result<()> {
    let config = PulseConfig::default();
    let source = SimulatedPulseSource::new(config.sample_rate_hz, bpm);
    let mut session = PulseSession::new(source, config);
    let mut rx = session.subscribe();

    session.start().await?;
    info!("acquiring for {}s (ctrl-c to stop)", duration);

    let deadline = Instant::now() + Duration::from_secs(duration);
    let mut ticker = tokio::time::interval(config.sample_interval());
    let mut last_shown: Option<u16> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                session.tick(now);

                let snapshot = rx.borrow_and_update().clone();
                if snapshot.bpm != last_shown {
                    if let Some(rate) = snapshot.bpm {
                        info!("heart rate: {rate} BPM");
                    }
                    last_shown = snapshot.bpm;
                }

                if now >= deadline {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    session.stop().await;
    Ok(())
}

/// Connect an oximeter and stream readings until disconnect or ctrl-c.
async fn run_oximeter(scan_duration: u64) -> anyhow::Result<()> {
    #[cfg(feature = "ble")]
    {
        use vitalscan_native::ble::BleTransport;
        use vitalscan_native::oximeter::{ConnectionState, OximeterSession};

        let mut transport = BleTransport::new().await?;
        transport.set_scan_duration(Duration::from_secs(scan_duration));

        let mut session = OximeterSession::new(transport);
        let mut rx = session.subscribe();

        let protocol = session.connect().await?;
        info!("streaming via {} (ctrl-c to stop)", protocol.name());

        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = rx.borrow_and_update().clone();
                    if let Some(reading) = snapshot.reading {
                        info!(
                            "SpO2 {}%  pulse {} BPM  [{}]",
                            reading.spo2,
                            reading.pulse_rate,
                            reading.protocol.name()
                        );
                    }
                    if snapshot.state == ConnectionState::Disconnected {
                        info!("device disconnected");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    break;
                }
            }
        }

        session.disconnect().await;
    }

    #[cfg(not(feature = "ble"))]
    {
        let _ = scan_duration;
        anyhow::bail!(
            "BLE support not enabled. Rebuild with --features ble:\n\
             cargo run -p vitalscan-app --features ble"
        );
    }

    Ok(())
}

/// Scan and list oximeter candidates.
async fn list_devices(scan_duration: u64) -> anyhow::Result<()> {
    #[cfg(feature = "ble")]
    {
        use vitalscan_native::ble::BleTransport;

        let mut transport = BleTransport::new().await?;
        transport.set_scan_duration(Duration::from_secs(scan_duration));

        let devices = transport.scan().await?;
        if devices.is_empty() {
            info!("no oximeter candidates found");
        }
        for device in devices {
            info!(
                "{}  {}  rssi={}  plx={}",
                device.address,
                device.name.as_deref().unwrap_or("<unnamed>"),
                device.rssi.map_or("?".to_string(), |r| r.to_string()),
                device.has_plx_service,
            );
        }
    }

    #[cfg(not(feature = "ble"))]
    {
        let _ = scan_duration;
        anyhow::bail!(
            "BLE support not enabled. Rebuild with --features ble:\n\
             cargo run -p vitalscan-app --features ble"
        );
    }

    Ok(())
}
