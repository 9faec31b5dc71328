//! Maximum-power-point search.
//!
//! The set-point is only reachable through PLUS/MINUS presses, so the
//! controller tracks it as a step count relative to where the search started.
//! Every move is followed by a wait for a status frame newer than the move,
//! and only that fresh frame is used to judge the new point.
//!
//! ```text
//! CoarseAscent --timeout--> Aborted
//!      |
//!      v
//! FineDither --> Returning --> Done --> (reset to zero)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;

use crate::config::MpptConfig;
use crate::error::{Dl24Error, Result};
use crate::persistence::ResultSink;
use crate::protocol::Dl24;
use crate::telemetry::TelemetryReader;
use crate::transport::Transport;
use crate::types::*;

/// Cloneable flag that ends a running search between steps
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Search progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MpptSearchState {
    pub phase: MpptPhase,
    pub best: Option<BestPoint>,
    /// Set-point in steps relative to the search start
    pub position: i32,
    pub consecutive_worse: u32,
    pub no_improvement: u32,
    /// Every press attempted, successful or not
    pub total_steps: u32,
}

impl MpptSearchState {
    fn new() -> Self {
        MpptSearchState {
            phase: MpptPhase::CoarseAscent,
            best: None,
            position: 0,
            consecutive_worse: 0,
            no_improvement: 0,
            total_steps: 0,
        }
    }
}

/// Result of one dither attempt
enum Attempt {
    Accepted,
    Reverted,
    TimedOut,
}

type Flow = std::result::Result<(), AbortReason>;

pub struct MpptController<'a, T: Transport> {
    device: &'a mut Dl24<T>,
    telemetry: TelemetryReader,
    config: MpptConfig,
    stop: StopSignal,
    state: MpptSearchState,
    samples: Vec<SearchSample>,
    dither_timed_out: bool,
}

impl<'a, T: Transport> MpptController<'a, T> {
    /// Bursts below one press are raised to one.
    pub fn new(device: &'a mut Dl24<T>, telemetry: TelemetryReader, mut config: MpptConfig) -> Self {
        if config.coarse_burst == 0 || config.reset_burst == 0 {
            warn!("Burst sizes must be at least 1, raising");
            config.coarse_burst = config.coarse_burst.max(1);
            config.reset_burst = config.reset_burst.max(1);
        }
        MpptController {
            device,
            telemetry,
            config,
            stop: StopSignal::new(),
            state: MpptSearchState::new(),
            samples: Vec::new(),
            dither_timed_out: false,
        }
    }

    /// Use an external stop flag
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> &MpptSearchState {
        &self.state
    }

    /// Run one complete search and hand the best point to `sink`.
    ///
    /// Fails only when the session index is unresolved and broadcast
    /// operation was not allowed; every other problem ends in an outcome.
    pub async fn run<S: ResultSink + ?Sized>(&mut self, sink: &mut S) -> Result<MpptOutcome> {
        if !self.device.addressing().is_resolved() {
            if !self.config.allow_broadcast {
                return Err(Dl24Error::UnresolvedSessionIndex);
            }
            warn!("Session index unresolved; every press is broadcast to all candidates");
        }

        self.state = MpptSearchState::new();
        self.samples.clear();
        self.dither_timed_out = false;

        info!("MPPT: coarse ascent");
        if let Err(reason) = self.coarse_ascent().await {
            return Ok(self.abort(reason));
        }

        self.enter(MpptPhase::FineDither);
        if let Err(reason) = self.fine_dither().await {
            return Ok(self.abort(reason));
        }

        if self.config.return_to_best {
            self.return_to_best().await;
        }

        self.enter(MpptPhase::Done);
        let record = self.state.best.map(|b| MpptRecord {
            timestamp: Utc::now(),
            voltage: b.voltage,
            current: b.current,
            power: b.power,
        });
        match &record {
            Some(r) => {
                info!(
                    "MPPT best: {:.3} V, {:.3} A, {:.3} W at step {}",
                    r.voltage,
                    r.current,
                    r.power,
                    self.state.best.map_or(0, |b| b.position)
                );
                if let Err(e) = sink.append_result(r) {
                    warn!("Could not persist result: {}", e);
                }
            }
            None => warn!("MPPT finished without a single evaluated point"),
        }

        let reset = if self.config.reset_after_search {
            Some(self.reset_to_zero().await)
        } else {
            None
        };

        Ok(self.outcome(None, record, reset))
    }

    fn enter(&mut self, phase: MpptPhase) {
        info!("MPPT phase: {:?} -> {:?}", self.state.phase, phase);
        self.state.phase = phase;
    }

    fn check_stop(&self) -> Flow {
        if self.stop.is_stopped() {
            Err(AbortReason::Stopped)
        } else {
            Ok(())
        }
    }

    fn abort(&mut self, reason: AbortReason) -> MpptOutcome {
        warn!("MPPT aborted in {:?}: {:?}", self.state.phase, reason);
        self.state.phase = MpptPhase::Aborted;
        self.outcome(Some(reason), None, None)
    }

    fn outcome(&self, abort_reason: Option<AbortReason>, record: Option<MpptRecord>, reset: Option<ResetReport>) -> MpptOutcome {
        MpptOutcome {
            phase: self.state.phase,
            abort_reason,
            best: self.state.best,
            position: self.state.position,
            total_steps: self.state.total_steps,
            dither_timed_out: self.dither_timed_out,
            samples: self.samples.clone(),
            record,
            reset,
        }
    }

    /// Press once and track the set-point. Returns whether the write went out.
    async fn step(&mut self, button: Button) -> bool {
        self.state.total_steps += 1;
        match self.device.press(button).await {
            Ok(()) => {
                match button {
                    Button::Plus => self.state.position += 1,
                    Button::Minus => self.state.position -= 1,
                    _ => {}
                }
                true
            }
            Err(e) => {
                warn!("Press {:?} not sent: {}", button, e);
                false
            }
        }
    }

    async fn confirm(&self, baseline: u64, timeout: Duration) -> bool {
        self.telemetry.wait_for_fresh_frame(baseline, timeout).await
    }

    /// Judge the latest snapshot; true when it beats the best by more than `tolerance`
    fn evaluate(&mut self, phase: MpptPhase, tolerance: f64) -> bool {
        let Some(m) = self.telemetry.snapshot().measurement else {
            return false;
        };
        let power = m.power();
        let improved = self.state.best.map_or(true, |b| power > b.power + tolerance);
        if improved {
            self.state.best = Some(BestPoint {
                power,
                voltage: m.voltage,
                current: m.current,
                position: self.state.position,
            });
            info!("New best: {:.3} W ({:.3} V, {:.3} A) at step {}", power, m.voltage, m.current, self.state.position);
        }
        self.samples.push(SearchSample {
            phase,
            position: self.state.position,
            power,
            best_power: self.state.best.map_or(power, |b| b.power),
        });
        improved
    }

    async fn coarse_ascent(&mut self) -> Flow {
        let cap = self.config.coarse_safety_cap;
        while self.state.total_steps < cap {
            self.check_stop()?;

            let baseline = self.telemetry.frame_count();
            let burst = self.config.coarse_burst.min(cap - self.state.total_steps);
            for _ in 0..burst {
                self.step(Button::Plus).await;
            }

            if !self.confirm(baseline, self.config.coarse_timeout()).await {
                warn!("No fresh telemetry within {:?} after coarse burst", self.config.coarse_timeout());
                return Err(AbortReason::CoarseTimeout);
            }

            if self.evaluate(MpptPhase::CoarseAscent, self.config.coarse_epsilon) {
                self.state.consecutive_worse = 0;
            } else {
                self.state.consecutive_worse += 1;
                if self.state.consecutive_worse >= self.config.coarse_worse_threshold {
                    info!("Power fell {} times in a row, peak passed", self.state.consecutive_worse);
                    return Ok(());
                }
            }
        }
        info!("Coarse safety cap of {} steps reached", cap);
        Ok(())
    }

    /// Move to `target` in confirmed bursts. False when a burst went
    /// unconfirmed or no press of a burst could be sent.
    async fn travel(&mut self, target: i32, timeout: Duration) -> bool {
        while self.state.position != target {
            let diff = target - self.state.position;
            let button = if diff > 0 { Button::Plus } else { Button::Minus };
            let burst = diff.unsigned_abs().min(self.config.coarse_burst);

            let baseline = self.telemetry.frame_count();
            let mut sent = 0;
            for _ in 0..burst {
                if self.step(button).await {
                    sent += 1;
                }
            }
            if sent == 0 {
                return false;
            }
            if !self.confirm(baseline, timeout).await {
                return false;
            }
        }
        true
    }

    async fn fine_dither(&mut self) -> Flow {
        if let Some(best) = self.state.best {
            if self.state.position != best.position {
                info!("Moving back to step {} before dithering", best.position);
                if !self.travel(best.position, self.config.fine_timeout()).await {
                    warn!("Could not confirm move to the coarse best; skipping dither");
                    self.dither_timed_out = true;
                    return Ok(());
                }
            }
        }

        for cycle in 0..self.config.fine_cycles {
            let mut improved = false;
            for button in [Button::Plus, Button::Minus] {
                self.check_stop()?;
                match self.attempt(button).await {
                    Attempt::Accepted => improved = true,
                    Attempt::Reverted => {}
                    Attempt::TimedOut => {
                        warn!("No fresh telemetry during dither cycle {}, keeping best so far", cycle + 1);
                        self.dither_timed_out = true;
                        return Ok(());
                    }
                }
            }

            if !improved {
                self.state.no_improvement += 1;
                if self.state.no_improvement >= self.config.fine_no_improvement_threshold {
                    info!("No improvement in {} dither cycles", self.state.no_improvement);
                    break;
                }
            }
        }
        Ok(())
    }

    /// One dither step in the direction of `button`, reverted unless it beats the best
    async fn attempt(&mut self, button: Button) -> Attempt {
        let timeout = self.config.fine_timeout();

        let baseline = self.telemetry.frame_count();
        if !self.step(button).await {
            // Nothing moved, so there is nothing to revert
            return Attempt::Reverted;
        }
        if !self.confirm(baseline, timeout).await {
            return Attempt::TimedOut;
        }
        if self.evaluate(MpptPhase::FineDither, self.config.fine_tolerance) {
            return Attempt::Accepted;
        }

        let baseline = self.telemetry.frame_count();
        self.step(button.opposite()).await;
        if !self.confirm(baseline, timeout).await {
            return Attempt::TimedOut;
        }
        Attempt::Reverted
    }

    async fn return_to_best(&mut self) {
        let Some(best) = self.state.best else {
            return;
        };
        if self.state.position == best.position {
            return;
        }
        self.enter(MpptPhase::Returning);
        info!("Returning from step {} to best step {}", self.state.position, best.position);

        let diff = best.position - self.state.position;
        let button = if diff > 0 { Button::Plus } else { Button::Minus };
        let baseline = self.telemetry.frame_count();
        for _ in 0..diff.unsigned_abs() {
            self.step(button).await;
        }

        if self.confirm(baseline, self.config.return_timeout()).await {
            let snap = self.telemetry.snapshot();
            if let Some(m) = snap.measurement {
                info!("Back at best: {:.3} V, {:.3} A, {:.3} W", m.voltage, m.current, m.power());
            }
        } else {
            warn!("Return to best not confirmed (now at step {})", self.state.position);
        }
    }

    /// Press MINUS in bursts until the measured current is at or below the
    /// reset threshold or the hard cap of taps is used up.
    pub async fn reset_to_zero(&mut self) -> ResetReport {
        info!("Resetting set-point to zero");
        let cap = self.config.reset_hard_cap;
        let threshold = self.config.reset_current_threshold;
        let mut taps = 0;

        loop {
            let current = self.telemetry.snapshot().current();
            if current.is_some_and(|c| c <= threshold) {
                info!("Current {:.3} A at or below {:.3} A after {} taps", current.unwrap_or(0.0), threshold, taps);
                return ResetReport {
                    taps,
                    last_current: current,
                    reached_threshold: true,
                };
            }
            if taps >= cap || self.stop.is_stopped() {
                warn!("Reset stopped after {} taps without reaching the threshold", taps);
                return ResetReport {
                    taps,
                    last_current: current,
                    reached_threshold: false,
                };
            }

            let baseline = self.telemetry.frame_count();
            let burst = self.config.reset_burst.min(cap - taps);
            for _ in 0..burst {
                self.step(Button::Minus).await;
                taps += 1;
            }
            if !self.confirm(baseline, self.config.reset_timeout()).await {
                warn!("No fresh telemetry during reset, continuing");
            }
        }
    }
}
