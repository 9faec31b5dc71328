//! Encoding and decoding of DL24 frames.
//!
//! Status frame (device to host, 36 bytes, big-endian):
//!
//! ```text
//! 0..2   FF 55        magic
//! 2      01           type (measurement)
//! 4..7   voltage      /10   V
//! 7..10  current      /1000 A
//! 10..13 charge       /100  Ah
//! 13..17 energy       Wh
//! 24..26 temperature  degC
//! 26..28 hours, 28 minutes, 29 seconds
//! ```
//!
//! Command frame (host to device, 10 bytes):
//!
//! ```text
//! FF 55 11 <index> <code> 00 00 00 00 <checksum>
//! ```
//!
//! The checksum covers bytes 2..=8 in one of two [`ChecksumDialect`]s.

use crate::constants::*;
use crate::types::{ChecksumDialect, Measurement, RunTime};

fn be24(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([0, data[offset], data[offset + 1], data[offset + 2]])
}

fn be32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

/// Decode a status frame. Returns `None` for anything that is not a complete
/// measurement frame; malformed input is expected on a noisy link.
pub fn decode_status(data: &[u8]) -> Option<Measurement> {
    if data.len() < STATUS_FRAME_LEN || data[0..2] != MAGIC || data[2] != TYPE_STATUS {
        return None;
    }

    Some(Measurement {
        voltage: be24(data, OFFSET_VOLTAGE) as f64 / VOLTAGE_DIVISOR,
        current: be24(data, OFFSET_CURRENT) as f64 / CURRENT_DIVISOR,
        charge_ah: be24(data, OFFSET_CHARGE) as f64 / CHARGE_DIVISOR,
        energy_wh: be32(data, OFFSET_ENERGY) as f64,
        temperature_c: be16(data, OFFSET_TEMPERATURE),
        run_time: RunTime {
            hours: be16(data, OFFSET_HOURS),
            minutes: data[OFFSET_MINUTES],
            seconds: data[OFFSET_SECONDS],
        },
    })
}

/// Checksum over the covered bytes (frame bytes 2..=8)
pub fn checksum(covered: &[u8], dialect: ChecksumDialect) -> u8 {
    match dialect {
        ChecksumDialect::RunningXor => covered.iter().fold(CHECKSUM_SEED, |acc, &b| acc ^ b),
        ChecksumDialect::SumXor => {
            let sum = covered.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
            sum ^ CHECKSUM_SEED
        }
    }
}

/// Build a command frame for `code` addressed to `session_index`
pub fn encode_command(code: u8, session_index: u8, dialect: ChecksumDialect) -> [u8; COMMAND_FRAME_LEN] {
    let mut frame = [0u8; COMMAND_FRAME_LEN];
    frame[0..2].copy_from_slice(&MAGIC);
    frame[2] = PROTOCOL_VERSION;
    frame[3] = session_index;
    frame[4] = code;
    frame[9] = checksum(&frame[2..9], dialect);
    frame
}

/// Check the trailing byte of a command frame against `dialect`
pub fn verify_checksum(frame: &[u8], dialect: ChecksumDialect) -> bool {
    frame.len() == COMMAND_FRAME_LEN && frame[9] == checksum(&frame[2..9], dialect)
}

/// Pull (session index, code) out of a well-formed command frame
pub fn decode_command(frame: &[u8], dialect: ChecksumDialect) -> Option<(u8, u8)> {
    if frame.len() != COMMAND_FRAME_LEN
        || frame[0..2] != MAGIC
        || frame[2] != PROTOCOL_VERSION
        || !verify_checksum(frame, dialect)
    {
        return None;
    }
    Some((frame[3], frame[4]))
}

/// Build a status frame. Values are truncated to their field widths.
pub fn encode_status(m: &Measurement) -> [u8; STATUS_FRAME_LEN] {
    let mut frame = [0u8; STATUS_FRAME_LEN];
    frame[0..2].copy_from_slice(&MAGIC);
    frame[2] = TYPE_STATUS;

    let mut put24 = |offset: usize, value: u32| {
        frame[offset..offset + 3].copy_from_slice(&value.to_be_bytes()[1..]);
    };
    put24(OFFSET_VOLTAGE, (m.voltage * VOLTAGE_DIVISOR).round() as u32);
    put24(OFFSET_CURRENT, (m.current * CURRENT_DIVISOR).round() as u32);
    put24(OFFSET_CHARGE, (m.charge_ah * CHARGE_DIVISOR).round() as u32);

    frame[OFFSET_ENERGY..OFFSET_ENERGY + 4].copy_from_slice(&(m.energy_wh.round() as u32).to_be_bytes());
    frame[OFFSET_TEMPERATURE..OFFSET_TEMPERATURE + 2].copy_from_slice(&m.temperature_c.to_be_bytes());
    frame[OFFSET_HOURS..OFFSET_HOURS + 2].copy_from_slice(&m.run_time.hours.to_be_bytes());
    frame[OFFSET_MINUTES] = m.run_time.minutes;
    frame[OFFSET_SECONDS] = m.run_time.seconds;
    frame
}

/// Space-separated hex dump used in debug logs
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}
