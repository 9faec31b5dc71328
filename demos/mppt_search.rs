//! MPPT Search Example
//!
//! Finds the maximum power point of the source attached to a DL24:
//! - Loading settings from a TOML file (defaults when it is missing)
//! - Learning the session index the firmware expects
//! - Running the coarse ascent and fine dither search
//! - Appending the result to the CSV log
//! - Optionally walking the set-point back to zero
//!
//! Press Ctrl-C to stop the search between steps.
//!
//! Usage:
//!   cargo run --example mppt_search                               # Interactive mode
//!   cargo run --example mppt_search -- /dev/ttyUSB0               # Specify port
//!   cargo run --example mppt_search -- /dev/ttyUSB0 --reset       # Reset to zero afterwards
//!   cargo run --example mppt_search -- --config bench.toml
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=debug cargo run --example mppt_search

use std::path::PathBuf;

use dl24_mppt::{
    Addressing, Config, CsvResultLog, Dl24, MpptController, MpptPhase, Result, SerialTransport,
    SessionIndexLearner, TelemetryState,
};
use inquire::{Confirm, Select};
use log::{error, info, warn};

const DEFAULT_CONFIG: &str = "dl24.toml";

struct Args {
    port: Option<String>,
    config: PathBuf,
    reset: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        port: None,
        config: PathBuf::from(DEFAULT_CONFIG),
        reset: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => {
                if let Some(path) = it.next() {
                    args.config = PathBuf::from(path);
                }
            }
            "--reset" => args.reset = true,
            _ => args.port = Some(arg),
        }
    }
    args
}

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

    let args = parse_args();
    let mut config = Config::load(&args.config)?;
    if args.reset {
        config.mppt.reset_after_search = true;
    }

    let port_name = match args.port.or_else(|| config.serial.port.clone()) {
        Some(port) => port,
        None => select_port()?,
    };

    let telemetry = TelemetryState::new();
    let reader = telemetry.reader();
    info!("Connecting to DL24 on {}...", port_name);
    let transport = SerialTransport::open(&port_name, config.serial.baud_rate, telemetry)?;
    let mut dl24 = Dl24::new(transport, config.device.clone());

    let learned = SessionIndexLearner::new(reader.clone(), config.learner.clone())
        .learn(&mut dl24)
        .await;
    match learned.addressing {
        Addressing::Single(index) => info!("Using session index {}", index),
        Addressing::Broadcast => {
            warn!("Session index not learned; commands would go to every candidate");
            let go = Confirm::new("Continue the search in broadcast mode?")
                .with_default(false)
                .prompt()
                .unwrap_or(false);
            if !go {
                return Ok(());
            }
            config.mppt.allow_broadcast = true;
        }
    }

    let mut log = CsvResultLog::new(config.results.csv_path.clone());
    let mut controller = MpptController::new(&mut dl24, reader, config.mppt.clone());

    let stop = controller.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current step");
            stop.stop();
        }
    });

    let outcome = controller.run(&mut log).await?;

    match outcome.phase {
        MpptPhase::Done => {
            if let Some(best) = &outcome.best {
                info!(
                    "MPP: {:.3} W at {:.1} V / {:.3} A after {} steps",
                    best.power, best.voltage, best.current, outcome.total_steps
                );
            }
            info!("Result appended to {}", log.path().display());
        }
        _ => error!("Search aborted: {:?}", outcome.abort_reason),
    }

    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Could not serialize outcome: {}", e),
    }

    Ok(())
}
