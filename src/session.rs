//! Learning which session index the firmware currently honours.
//!
//! Commands carrying the wrong index are silently ignored, so each candidate
//! is probed with a PLUS press and scored by how much the device reacts:
//!
//! ```text
//! score = new status frames + new misc messages + (1 if |delta current| >= threshold)
//! ```
//!
//! A compensating MINUS at the same index undoes the probe on a best-effort
//! basis. The highest score wins, earlier candidates win ties, and a best
//! score of zero leaves the index unresolved.

use log::{info, warn};
use tokio::time::sleep;

use crate::config::LearnerConfig;
use crate::constants::SESSION_CANDIDATES;
use crate::protocol::Dl24;
use crate::telemetry::TelemetryReader;
use crate::transport::Transport;
use crate::types::{Addressing, Button, LearnOutcome, ProbeScore};

pub struct SessionIndexLearner {
    telemetry: TelemetryReader,
    config: LearnerConfig,
}

impl SessionIndexLearner {
    pub fn new(telemetry: TelemetryReader, config: LearnerConfig) -> Self {
        SessionIndexLearner { telemetry, config }
    }

    /// Probe every candidate and apply the result to `device`'s addressing
    pub async fn learn<T: Transport>(&self, device: &mut Dl24<T>) -> LearnOutcome {
        if !self.telemetry.wait_for_first_frame(self.config.first_frame_timeout()).await {
            warn!("No status frame received before learning");
        }

        info!("Learning session index (via PLUS)...");
        let mut probes = Vec::with_capacity(SESSION_CANDIDATES.len());
        let mut best: Option<ProbeScore> = None;

        for index in SESSION_CANDIDATES {
            let probe = self.probe(device, index).await;
            info!(
                "  index {}: frames={}, misc={}, dI={:.4} -> score {}",
                probe.index, probe.frames, probe.misc, probe.current_delta, probe.score
            );
            if best.map_or(true, |b| probe.score > b.score) {
                best = Some(probe);
            }
            probes.push(probe);
        }

        let addressing = match best {
            Some(b) if b.score > 0 => {
                info!("Session index learned: {}", b.index);
                Addressing::Single(b.index)
            }
            _ => {
                warn!("No session index responded; falling back to broadcast");
                Addressing::Broadcast
            }
        };
        device.set_addressing(addressing);

        LearnOutcome { probes, addressing }
    }

    async fn probe<T: Transport>(&self, device: &mut Dl24<T>, index: u8) -> ProbeScore {
        let before = self.telemetry.snapshot();

        if let Err(e) = device.press_exact(Button::Plus, index).await {
            warn!("Probe write at index {} failed: {}", index, e);
        }
        sleep(self.config.probe_settle()).await;

        let after = self.telemetry.snapshot();
        let frames = after.frame_count - before.frame_count;
        let misc = after.misc_count - before.misc_count;
        let current_delta = match (before.current(), after.current()) {
            (Some(a), Some(b)) => (b - a).abs(),
            _ => 0.0,
        };
        let hit = u64::from(current_delta >= self.config.min_current_delta);

        if let Err(e) = device.press_exact(Button::Minus, index).await {
            warn!("Undo write at index {} failed: {}", index, e);
        }
        sleep(self.config.undo_settle()).await;

        ProbeScore {
            index,
            frames,
            misc,
            current_delta,
            score: frames + misc + hit,
        }
    }
}
