//! Run configuration, loadable from a TOML file.
//!
//! Every field has a default, so an empty or missing file is a valid
//! configuration. Durations are given in milliseconds.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Dl24Error, Result};
use crate::types::{ButtonCodes, ChecksumDialect};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub device: DeviceConfig,
    pub learner: LearnerConfig,
    pub mppt: MpptConfig,
    pub results: ResultsConfig,
}

impl Config {
    /// Load `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        let txt = fs::read_to_string(path)?;
        Self::from_toml(&txt)
    }

    pub fn from_toml(txt: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(txt)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let m = &self.mppt;
        if m.coarse_burst == 0 || m.reset_burst == 0 {
            return Err(Dl24Error::Parse("burst sizes must be at least 1".to_string()));
        }
        if m.coarse_worse_threshold == 0 || m.fine_no_improvement_threshold == 0 {
            return Err(Dl24Error::Parse("thresholds must be at least 1".to_string()));
        }
        if m.fine_tolerance < 0.0 || m.coarse_epsilon < 0.0 {
            return Err(Dl24Error::Parse("tolerances must not be negative".to_string()));
        }
        if !SESSION_CANDIDATES.contains(&self.device.toggle_session_index) {
            return Err(Dl24Error::InvalidSessionIndex(self.device.toggle_session_index));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: Option<String>,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: None,
            baud_rate: BAUD_RATE,
        }
    }
}

/// Command framing and pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub dialect: ChecksumDialect,
    pub buttons: ButtonCodes,
    pub broadcast_gap_ms: u64,
    pub press_settle_ms: u64,
    pub toggle_session_index: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            dialect: ChecksumDialect::default(),
            buttons: ButtonCodes::default(),
            broadcast_gap_ms: BROADCAST_GAP_MS,
            press_settle_ms: PRESS_SETTLE_MS,
            toggle_session_index: TOGGLE_SESSION_INDEX,
        }
    }
}

impl DeviceConfig {
    pub fn broadcast_gap(&self) -> Duration {
        Duration::from_millis(self.broadcast_gap_ms)
    }

    pub fn press_settle(&self) -> Duration {
        Duration::from_millis(self.press_settle_ms)
    }
}

/// Session-index learning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    pub first_frame_timeout_ms: u64,
    pub probe_settle_ms: u64,
    pub undo_settle_ms: u64,
    pub min_current_delta: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        LearnerConfig {
            first_frame_timeout_ms: FIRST_FRAME_TIMEOUT_MS,
            probe_settle_ms: PROBE_SETTLE_MS,
            undo_settle_ms: UNDO_SETTLE_MS,
            min_current_delta: PROBE_MIN_CURRENT_DELTA,
        }
    }
}

impl LearnerConfig {
    pub fn first_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.first_frame_timeout_ms)
    }

    pub fn probe_settle(&self) -> Duration {
        Duration::from_millis(self.probe_settle_ms)
    }

    pub fn undo_settle(&self) -> Duration {
        Duration::from_millis(self.undo_settle_ms)
    }
}

/// Maximum-power-point search and reset-to-zero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpptConfig {
    pub coarse_burst: u32,
    pub coarse_safety_cap: u32,
    pub coarse_worse_threshold: u32,
    pub coarse_timeout_ms: u64,
    pub coarse_epsilon: f64,
    pub fine_cycles: u32,
    pub fine_tolerance: f64,
    pub fine_no_improvement_threshold: u32,
    pub fine_timeout_ms: u64,
    pub return_to_best: bool,
    pub return_timeout_ms: u64,
    pub reset_after_search: bool,
    pub reset_burst: u32,
    pub reset_hard_cap: u32,
    pub reset_current_threshold: f64,
    pub reset_timeout_ms: u64,
    /// Run even when the session index is unknown, broadcasting every press
    pub allow_broadcast: bool,
}

impl Default for MpptConfig {
    fn default() -> Self {
        MpptConfig {
            coarse_burst: COARSE_BURST,
            coarse_safety_cap: COARSE_SAFETY_CAP,
            coarse_worse_threshold: COARSE_WORSE_THRESHOLD,
            coarse_timeout_ms: COARSE_TIMEOUT_MS,
            coarse_epsilon: COARSE_EPSILON,
            fine_cycles: FINE_CYCLES,
            fine_tolerance: FINE_TOLERANCE,
            fine_no_improvement_threshold: FINE_NO_IMPROVEMENT_THRESHOLD,
            fine_timeout_ms: FINE_TIMEOUT_MS,
            return_to_best: true,
            return_timeout_ms: RETURN_TIMEOUT_MS,
            reset_after_search: false,
            reset_burst: RESET_BURST,
            reset_hard_cap: RESET_HARD_CAP,
            reset_current_threshold: RESET_CURRENT_THRESHOLD,
            reset_timeout_ms: RESET_TIMEOUT_MS,
            allow_broadcast: false,
        }
    }
}

impl MpptConfig {
    pub fn coarse_timeout(&self) -> Duration {
        Duration::from_millis(self.coarse_timeout_ms)
    }

    pub fn fine_timeout(&self) -> Duration {
        Duration::from_millis(self.fine_timeout_ms)
    }

    pub fn return_timeout(&self) -> Duration {
        Duration::from_millis(self.return_timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    pub csv_path: PathBuf,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        ResultsConfig {
            csv_path: PathBuf::from("mppt_results.csv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.mppt.coarse_burst, 3);
        assert_eq!(cfg.mppt.coarse_safety_cap, 500);
        assert_eq!(cfg.mppt.fine_cycles, 10);
        assert!(cfg.mppt.return_to_best);
        assert!(!cfg.mppt.allow_broadcast);
        assert_eq!(cfg.device.dialect, ChecksumDialect::RunningXor);
    }

    #[test]
    fn partial_override() {
        let cfg = Config::from_toml(
            r#"
            [device]
            dialect = "sum_xor"

            [device.buttons]
            set = 49
            ok = 50
            plus = 51
            minus = 52
            toggle = 0x32

            [mppt]
            coarse_burst = 5
            reset_after_search = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.device.dialect, ChecksumDialect::SumXor);
        assert_eq!(cfg.device.buttons, ButtonCodes::button_events());
        assert_eq!(cfg.mppt.coarse_burst, 5);
        assert!(cfg.mppt.reset_after_search);
        assert_eq!(cfg.mppt.fine_tolerance, 0.05);
    }

    #[test]
    fn rejects_zero_burst() {
        let err = Config::from_toml("[mppt]\ncoarse_burst = 0\n").unwrap_err();
        assert!(matches!(err, Dl24Error::Parse(_)));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/dl24.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }
}
