//! Live Monitor Example
//!
//! Prints every decoded status frame from a DL24 until Ctrl-C:
//! - Listing and selecting serial ports
//! - Feeding the serial link into the telemetry state
//! - Watching for fresh frames with a timeout
//!
//! Usage:
//!   cargo run --example live_monitor                  # Interactive mode
//!   cargo run --example live_monitor -- /dev/ttyUSB0  # Specify port
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=debug cargo run --example live_monitor

use std::time::Duration;

use dl24_mppt::constants::{BAUD_RATE, FIRST_FRAME_TIMEOUT_MS};
use dl24_mppt::{Result, SerialTransport, TelemetryState};
use inquire::Select;
use log::{info, warn};

/// Interactive serial port selection using inquire
fn select_port() -> Result<String> {
    let ports = SerialTransport::list_ports()?;

    if ports.is_empty() {
        eprintln!("No serial ports found!");
        std::process::exit(1);
    }

    let port_names: Vec<String> = ports
        .iter()
        .map(|p| format!("{} - {:?}", p.port_name, p.port_type))
        .collect();

    let selection = Select::new("Select a serial port:", port_names)
        .prompt()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("Selection cancelled: {}", e)))?;

    Ok(selection.split(" - ").next().unwrap_or(&selection).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let port_name = std::env::args().nth(1).map(Ok).unwrap_or_else(select_port)?;

    let telemetry = TelemetryState::new();
    let reader = telemetry.reader();
    info!("Connecting to DL24 on {}...", port_name);
    let _transport = SerialTransport::open(&port_name, BAUD_RATE, telemetry)?;

    if !reader.wait_for_first_frame(Duration::from_millis(FIRST_FRAME_TIMEOUT_MS)).await {
        warn!("No status frame yet; is the load switched on?");
    }

    println!("{:>9} {:>9} {:>9} {:>9} {:>7} {:>9}", "frame", "V", "A", "W", "°C", "runtime");
    let mut seen = reader.frame_count();
    loop {
        tokio::select! {
            fresh = reader.wait_for_fresh_frame(seen, Duration::from_secs(5)) => {
                if !fresh {
                    warn!("No frame for 5 s");
                    continue;
                }
                let snap = reader.snapshot();
                seen = snap.frame_count;
                if let Some(m) = snap.measurement {
                    println!(
                        "{:>9} {:>9.1} {:>9.3} {:>9.3} {:>7} {:>3}:{:02}:{:02}",
                        snap.frame_count,
                        m.voltage,
                        m.current,
                        m.power(),
                        m.temperature_c,
                        m.run_time.hours,
                        m.run_time.minutes,
                        m.run_time.seconds,
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping after {} frames ({} misc)", reader.frame_count(), reader.snapshot().misc_count);
                break;
            }
        }
    }

    Ok(())
}
