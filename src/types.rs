use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Elapsed load time reported by the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTime {
    pub hours: u16,
    pub minutes: u8,
    pub seconds: u8,
}

/// One decoded status frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub voltage: f64,
    pub current: f64,
    pub charge_ah: f64,
    pub energy_wh: f64,
    pub temperature_c: u16,
    pub run_time: RunTime,
}

impl Measurement {
    /// Derived power in watts
    pub fn power(&self) -> f64 {
        self.voltage * self.current
    }
}

/// Checksum formula of a command frame.
///
/// Both formulas cover bytes 2..=8 and are seeded with 0x44. Which one the
/// firmware actually checks is not settled, so the caller picks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumDialect {
    /// `0x44 ^ b2 ^ b3 ^ ... ^ b8`
    #[default]
    RunningXor,
    /// `(b2 + b3 + ... + b8) ^ 0x44`, truncated to a byte
    SumXor,
}

/// Emulated front-panel buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Set,
    Ok,
    Plus,
    Minus,
    Toggle,
}

impl Button {
    /// The button that undoes a set-point step
    pub fn opposite(self) -> Button {
        match self {
            Button::Plus => Button::Minus,
            Button::Minus => Button::Plus,
            other => other,
        }
    }
}

/// Command codes per button. Firmware revisions disagree, so this is configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonCodes {
    pub set: u8,
    pub ok: u8,
    pub plus: u8,
    pub minus: u8,
    pub toggle: u8,
}

impl ButtonCodes {
    /// Hex key-press codes
    pub const fn key_press() -> Self {
        ButtonCodes {
            set: KEY_SET,
            ok: KEY_OK,
            plus: KEY_PLUS,
            minus: KEY_MINUS,
            toggle: CMD_TOGGLE,
        }
    }

    /// Decimal button-event codes
    pub const fn button_events() -> Self {
        ButtonCodes {
            set: BUTTON_SET,
            ok: BUTTON_OK,
            plus: BUTTON_PLUS,
            minus: BUTTON_MINUS,
            toggle: CMD_TOGGLE,
        }
    }

    pub fn code(&self, button: Button) -> u8 {
        match button {
            Button::Set => self.set,
            Button::Ok => self.ok,
            Button::Plus => self.plus,
            Button::Minus => self.minus,
            Button::Toggle => self.toggle,
        }
    }
}

impl Default for ButtonCodes {
    fn default() -> Self {
        Self::key_press()
    }
}

/// How command frames are addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Addressing {
    /// Every command goes to one learned session index
    Single(u8),
    /// Session index unknown: every command is sent once per candidate index
    Broadcast,
}

impl Addressing {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Addressing::Single(_))
    }
}

/// Learning score of one candidate session index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeScore {
    pub index: u8,
    pub frames: u64,
    pub misc: u64,
    pub current_delta: f64,
    pub score: u64,
}

/// Result of a learning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnOutcome {
    pub probes: Vec<ProbeScore>,
    pub addressing: Addressing,
}

/// Phases of the maximum-power-point search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MpptPhase {
    CoarseAscent,
    FineDither,
    Returning,
    Done,
    Aborted,
}

/// Why a search ended in [`MpptPhase::Aborted`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// No fresh telemetry after a coarse burst
    CoarseTimeout,
    /// The caller raised the stop signal
    Stopped,
}

/// Best operating point seen so far
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestPoint {
    pub power: f64,
    pub voltage: f64,
    pub current: f64,
    pub position: i32,
}

/// One evaluated point of a search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchSample {
    pub phase: MpptPhase,
    pub position: i32,
    pub power: f64,
    pub best_power: f64,
}

/// Final report of a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpptOutcome {
    pub phase: MpptPhase,
    pub abort_reason: Option<AbortReason>,
    pub best: Option<BestPoint>,
    pub position: i32,
    pub total_steps: u32,
    pub dither_timed_out: bool,
    pub samples: Vec<SearchSample>,
    pub record: Option<MpptRecord>,
    pub reset: Option<ResetReport>,
}

/// Report of a reset-to-zero run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResetReport {
    pub taps: u32,
    pub last_current: Option<f64>,
    pub reached_threshold: bool,
}

/// Persisted result of one completed search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MpptRecord {
    pub timestamp: DateTime<Utc>,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
}
