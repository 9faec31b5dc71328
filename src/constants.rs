//! Protocol constants for Atorch DL24 communication.
//!
//! This module defines the constants used on the DL24 notify/write channel,
//! including frame markers, command codes, timing parameters, search defaults
//! and serial line configuration.

/// Two-byte marker at the start of every frame
pub const MAGIC: [u8; 2] = [0xFF, 0x55];

/// Frame type of a 36-byte measurement report
pub const TYPE_STATUS: u8 = 0x01;

/// Frame type of a short button acknowledgement
pub const TYPE_ACK: u8 = 0x02;

/// Frame type of a command frame (also seen echoed on the notify channel)
pub const TYPE_COMMAND: u8 = 0x11;

/// Length of a status frame
pub const STATUS_FRAME_LEN: usize = 36;

/// Length of an acknowledgement frame
pub const ACK_FRAME_LEN: usize = 8;

/// Length of a command frame
pub const COMMAND_FRAME_LEN: usize = 10;

/// Protocol version byte carried by command frames
pub const PROTOCOL_VERSION: u8 = TYPE_COMMAND;

/// Seed of both checksum dialects
pub const CHECKSUM_SEED: u8 = 0x44;

// Status frame field offsets (big-endian)
pub const OFFSET_VOLTAGE: usize = 4;
pub const OFFSET_CURRENT: usize = 7;
pub const OFFSET_CHARGE: usize = 10;
pub const OFFSET_ENERGY: usize = 13;
pub const OFFSET_TEMPERATURE: usize = 24;
pub const OFFSET_HOURS: usize = 26;
pub const OFFSET_MINUTES: usize = 28;
pub const OFFSET_SECONDS: usize = 29;

/// Raw voltage units per volt
pub const VOLTAGE_DIVISOR: f64 = 10.0;

/// Raw current units per amp
pub const CURRENT_DIVISOR: f64 = 1000.0;

/// Raw charge units per amp-hour
pub const CHARGE_DIVISOR: f64 = 100.0;

/// Session-index values the firmware has been observed to accept
pub const SESSION_CANDIDATES: [u8; 4] = [0, 1, 2, 3];

/// Start/stop toggle command code
pub const CMD_TOGGLE: u8 = 0x32;

// Hex key-press codes (paired with the running-XOR checksum in the field)
pub const KEY_SET: u8 = 0x49;
pub const KEY_OK: u8 = 0x50;
pub const KEY_PLUS: u8 = 0x51;
pub const KEY_MINUS: u8 = 0x52;

// Button-event codes (paired with the sum-XOR checksum in the field)
pub const BUTTON_SET: u8 = 49;
pub const BUTTON_OK: u8 = 50;
pub const BUTTON_PLUS: u8 = 51;
pub const BUTTON_MINUS: u8 = 52;

/// Session index the load toggle is addressed to
pub const TOGGLE_SESSION_INDEX: u8 = 2;

/// Delay between frames when broadcasting a press to every candidate index
pub const BROADCAST_GAP_MS: u64 = 40;

/// Settle time after an exact-index press
pub const PRESS_SETTLE_MS: u64 = 100;

/// Wait after a learning probe before reading the deltas
pub const PROBE_SETTLE_MS: u64 = 250;

/// Wait after the compensating press of a learning probe
pub const UNDO_SETTLE_MS: u64 = 150;

/// Minimum absolute current change for a probe to count as a hit (A)
pub const PROBE_MIN_CURRENT_DELTA: f64 = 0.0005;

/// How long to wait for the very first status frame
pub const FIRST_FRAME_TIMEOUT_MS: u64 = 2000;

/// Settle after each press of the CC-edit sequence
pub const CC_EDIT_SETTLE_MS: u64 = 120;

/// Pause between presses of the CC-edit sequence
pub const CC_EDIT_GAP_MS: u64 = 200;

/// Pause between frames of the panic-off sequence
pub const PANIC_FRAME_GAP_MS: u64 = 250;

/// Pause between rounds of the panic-off sequence
pub const PANIC_ROUND_GAP_MS: u64 = 800;

/// Rounds of the panic-off sequence
pub const PANIC_ROUNDS: usize = 3;

/// Current change a nudge waits for after each press (A)
pub const NUDGE_MIN_DELTA: f64 = 0.0005;

/// How long a nudge waits for the current to move
pub const NUDGE_DELTA_TIMEOUT_MS: u64 = 800;

/// Pause after each nudge press
pub const NUDGE_STEP_DELAY_MS: u64 = 40;

// MPPT search defaults
pub const COARSE_BURST: u32 = 3;
pub const COARSE_SAFETY_CAP: u32 = 500;
pub const COARSE_WORSE_THRESHOLD: u32 = 3;
pub const COARSE_TIMEOUT_MS: u64 = 5000;
pub const COARSE_EPSILON: f64 = 1e-6;
pub const FINE_CYCLES: u32 = 10;
pub const FINE_TOLERANCE: f64 = 0.05;
pub const FINE_NO_IMPROVEMENT_THRESHOLD: u32 = 4;
pub const FINE_TIMEOUT_MS: u64 = 3000;
pub const RETURN_TIMEOUT_MS: u64 = 3000;

// Reset-to-zero defaults
pub const RESET_BURST: u32 = 10;
pub const RESET_HARD_CAP: u32 = 1200;
pub const RESET_CURRENT_THRESHOLD: f64 = 0.02;
pub const RESET_TIMEOUT_MS: u64 = 3000;

/// Baud rate of the DL24 UART/BLE bridge
pub const BAUD_RATE: u32 = 9600;

/// Serial read timeout in milliseconds
pub const TIMEOUT_MS: u64 = 200;

/// Size of a single serial read
pub const READ_CHUNK_LEN: usize = 64;
