//! # DL24 MPPT Library
//!
//! A Rust library for driving Atorch DL24 electronic loads over their
//! notify/write characteristic. It decodes the periodic status frames,
//! emulates front-panel button presses and uses both to find the
//! maximum-power operating point of whatever source is connected.
//!
//! ## Features
//!
//! - Reassemble and decode 36-byte status frames from arbitrarily chunked input
//! - Build command frames in either of the two checksum dialects seen in the field
//! - Learn the session index the firmware expects on every command
//! - Coarse ascent plus fine dither search for the maximum power point
//! - Optional reset of the set-point to zero after a search
//! - Append results to a CSV log
//!
//! ## Example
//!
//! ```no_run
//! use dl24_mppt::{
//!     Config, CsvResultLog, Dl24, MpptController, SerialTransport, SessionIndexLearner, TelemetryState,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let telemetry = TelemetryState::new();
//!     let reader = telemetry.reader();
//!     let transport = SerialTransport::open("/dev/ttyUSB0", config.serial.baud_rate, telemetry)?;
//!
//!     let mut dl24 = Dl24::new(transport, config.device.clone());
//!     SessionIndexLearner::new(reader.clone(), config.learner.clone()).learn(&mut dl24).await;
//!
//!     let mut log = CsvResultLog::new("mppt_results.csv");
//!     let outcome = MpptController::new(&mut dl24, reader, config.mppt.clone()).run(&mut log).await?;
//!     println!("Best: {:?}", outcome.best);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod mppt;
pub mod persistence;
pub mod protocol;
pub mod reassembler;
pub mod session;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use config::{Config, DeviceConfig, LearnerConfig, MpptConfig};
pub use error::{Dl24Error, Result};
pub use mppt::{MpptController, MpptSearchState, StopSignal};
pub use persistence::{CsvResultLog, ResultSink};
pub use protocol::Dl24;
pub use reassembler::{Frame, FrameReassembler};
pub use session::SessionIndexLearner;
pub use telemetry::{TelemetryReader, TelemetrySnapshot, TelemetryState};
pub use transport::{SerialTransport, Transport};
pub use types::*;
