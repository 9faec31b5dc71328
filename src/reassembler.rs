//! Reassembly of notify-channel chunks into aligned frames.

use log::debug;

use crate::codec::hex;
use crate::constants::*;

/// A complete frame cut from the inbound stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// 36-byte measurement report
    Status(Vec<u8>),
    /// Short button acknowledgement, informational only
    Ack(Vec<u8>),
    /// Command frame echoed back by the bridge
    Echo(Vec<u8>),
}

impl Frame {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Frame::Status(b) | Frame::Ack(b) | Frame::Echo(b) => b,
        }
    }
}

/// Frame length implied by a type byte, `None` for unknown types
fn frame_len(frame_type: u8) -> Option<usize> {
    match frame_type {
        TYPE_STATUS => Some(STATUS_FRAME_LEN),
        TYPE_ACK => Some(ACK_FRAME_LEN),
        TYPE_COMMAND => Some(COMMAND_FRAME_LEN),
        _ => None,
    }
}

/// Turns chunks of arbitrary size and boundary into frames.
///
/// Output depends only on the concatenated input, never on how it was chunked.
/// Bytes that cannot start a frame are dropped one at a time, so the buffer
/// never holds more than one partial frame.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    buffer: Vec<u8>,
    dropped: u64,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every frame completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            match self.buffer.len() {
                0 => break,
                1 => {
                    if self.buffer[0] != MAGIC[0] {
                        self.drop_byte();
                    }
                    break;
                }
                _ => {}
            }

            if self.buffer[0..2] != MAGIC {
                self.drop_byte();
                continue;
            }

            let Some(&frame_type) = self.buffer.get(2) else {
                break;
            };

            let Some(len) = frame_len(frame_type) else {
                self.drop_byte();
                continue;
            };

            if self.buffer.len() < len {
                break;
            }

            let bytes: Vec<u8> = self.buffer.drain(..len).collect();
            debug!("RX frame: {}", hex(&bytes));
            frames.push(match frame_type {
                TYPE_STATUS => Frame::Status(bytes),
                TYPE_ACK => Frame::Ack(bytes),
                _ => Frame::Echo(bytes),
            });
        }

        frames
    }

    fn drop_byte(&mut self) {
        self.buffer.remove(0);
        self.dropped += 1;
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes discarded while resynchronising
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
