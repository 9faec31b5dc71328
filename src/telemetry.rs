//! Latest-measurement state shared between the inbound push path and the
//! control logic.
//!
//! [`TelemetryState`] is the single writer: it owns the reassembler and is
//! moved into whatever delivers inbound chunks. Everyone else holds a
//! [`TelemetryReader`], which only ever sees whole snapshots.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use tokio::sync::watch;

use crate::codec::{decode_status, hex};
use crate::constants::MAGIC;
use crate::reassembler::{Frame, FrameReassembler};
use crate::types::Measurement;

/// Point-in-time view of the telemetry record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub measurement: Option<Measurement>,
    /// Status frames decoded so far; never decreases
    pub frame_count: u64,
    /// Inbound messages that were not frames at all (no magic, no frame completed)
    pub misc_count: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TelemetrySnapshot {
    pub fn voltage(&self) -> Option<f64> {
        self.measurement.map(|m| m.voltage)
    }

    pub fn current(&self) -> Option<f64> {
        self.measurement.map(|m| m.current)
    }

    pub fn power(&self) -> Option<f64> {
        self.measurement.map(|m| m.power())
    }
}

/// Writer side of the telemetry record
#[derive(Debug)]
pub struct TelemetryState {
    reassembler: FrameReassembler,
    tx: watch::Sender<TelemetrySnapshot>,
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(TelemetrySnapshot::default());
        TelemetryState {
            reassembler: FrameReassembler::new(),
            tx,
        }
    }

    /// New read handle
    pub fn reader(&self) -> TelemetryReader {
        TelemetryReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Feed one inbound chunk; returns the number of status frames decoded.
    ///
    /// A chunk that arrives between frames, does not start with the magic and
    /// completes nothing counts as one misc message. Acknowledgements and
    /// command echoes are framed but not counted.
    pub fn ingest(&mut self, chunk: &[u8]) -> usize {
        if chunk.is_empty() {
            return 0;
        }
        let between_frames = self.reassembler.pending() == 0;
        let frames = self.reassembler.feed(chunk);
        if frames.is_empty() && between_frames && !chunk.starts_with(&MAGIC) {
            debug!("Misc message: {}", hex(chunk));
            self.note_misc();
        }

        let mut decoded = 0;
        for frame in frames {
            match frame {
                Frame::Status(bytes) => match decode_status(&bytes) {
                    Some(m) => {
                        self.publish(m);
                        decoded += 1;
                    }
                    None => debug!("Dropping malformed status frame: {}", hex(&bytes)),
                },
                Frame::Ack(bytes) | Frame::Echo(bytes) => debug!("Reply: {}", hex(&bytes)),
            }
        }
        decoded
    }

    /// Replace the latest measurement and bump the frame counter
    pub fn publish(&mut self, measurement: Measurement) {
        self.tx.send_modify(|s| {
            s.measurement = Some(measurement);
            s.frame_count += 1;
            s.updated_at = Some(Utc::now());
        });
    }

    /// Count a non-status message
    pub fn note_misc(&mut self) {
        self.tx.send_modify(|s| s.misc_count += 1);
    }
}

/// Read-only, cloneable handle on the telemetry record
#[derive(Debug, Clone)]
pub struct TelemetryReader {
    rx: watch::Receiver<TelemetrySnapshot>,
}

impl TelemetryReader {
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.rx.borrow().clone()
    }

    pub fn frame_count(&self) -> u64 {
        self.rx.borrow().frame_count
    }

    /// Suspend until a status frame newer than `baseline` has been decoded.
    /// Returns `false` on timeout or when the writer is gone.
    pub async fn wait_for_fresh_frame(&self, baseline: u64, timeout: Duration) -> bool {
        let mut rx = self.rx.clone();
        let fresh = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| s.frame_count > baseline)).await,
            Ok(Ok(_))
        );
        fresh
    }

    /// Suspend until at least one status frame has been decoded
    pub async fn wait_for_first_frame(&self, timeout: Duration) -> bool {
        self.wait_for_fresh_frame(0, timeout).await
    }

    /// Suspend until the measured current differs from `baseline` by at least `min_delta`
    pub async fn wait_for_current_change(&self, baseline: f64, min_delta: f64, timeout: Duration) -> bool {
        let mut rx = self.rx.clone();
        let moved = |s: &TelemetrySnapshot| s.current().is_some_and(|c| (c - baseline).abs() >= min_delta);
        let changed = matches!(tokio::time::timeout(timeout, rx.wait_for(moved)).await, Ok(Ok(_)));
        changed
    }
}
