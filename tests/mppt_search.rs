mod common;

use common::{peaked_curve, reported_power, SimDevice};
use dl24_mppt::{
    AbortReason, DeviceConfig, Dl24, Dl24Error, MpptConfig, MpptController, MpptPhase, MpptRecord, StopSignal,
};

const PEAK: i32 = 12;

fn device(sim: SimDevice, index: Option<u8>) -> Dl24<SimDevice> {
    let mut dl24 = Dl24::new(sim, DeviceConfig::default());
    if let Some(i) = index {
        dl24.set_session_index(i).unwrap();
    }
    dl24
}

#[tokio::test(start_paused = true)]
async fn finds_the_peak() {
    let sim = SimDevice::new(peaked_curve(PEAK));
    let reader = sim.reader();
    let mut dl24 = device(sim, Some(0));
    let config = MpptConfig::default();
    let mut results: Vec<MpptRecord> = Vec::new();

    let outcome = MpptController::new(&mut dl24, reader, config.clone())
        .run(&mut results)
        .await
        .unwrap();

    assert_eq!(outcome.phase, MpptPhase::Done);
    assert_eq!(outcome.abort_reason, None);
    assert!(!outcome.dither_timed_out);

    let best = outcome.best.unwrap();
    assert!((best.position - PEAK).abs() <= 1, "best at {}", best.position);
    assert_eq!(outcome.position, best.position);
    assert_eq!(dl24.transport().position, best.position);

    // Coarse phase noticed the downturn within the worse-count threshold of bursts
    let last_coarse = outcome
        .samples
        .iter()
        .filter(|s| s.phase == MpptPhase::CoarseAscent)
        .map(|s| s.position)
        .max()
        .unwrap();
    let overshoot = (config.coarse_worse_threshold * config.coarse_burst) as i32;
    assert!(last_coarse <= PEAK + overshoot);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].power, best.power);
    assert!(outcome.record.is_some());
    assert!(outcome.reset.is_none());
}

#[tokio::test(start_paused = true)]
async fn best_power_never_regresses() {
    let sim = SimDevice::new(peaked_curve(PEAK));
    let reader = sim.reader();
    let mut dl24 = device(sim, Some(1));
    let mut results: Vec<MpptRecord> = Vec::new();

    let outcome = MpptController::new(&mut dl24, reader, MpptConfig::default())
        .run(&mut results)
        .await
        .unwrap();

    assert!(outcome.samples.len() > 5);
    for pair in outcome.samples.windows(2) {
        assert!(pair[1].best_power >= pair[0].best_power);
    }
    assert_eq!(outcome.best.unwrap().power, outcome.samples.last().unwrap().best_power);
}

#[tokio::test(start_paused = true)]
async fn silent_device_aborts_with_single_point() {
    let sim = SimDevice::new(peaked_curve(PEAK)).with_frame_budget(1);
    let curve = peaked_curve(PEAK);
    let reader = sim.reader();
    let mut dl24 = device(sim, Some(0));
    let mut results: Vec<MpptRecord> = Vec::new();

    let outcome = MpptController::new(&mut dl24, reader, MpptConfig::default())
        .run(&mut results)
        .await
        .unwrap();

    assert_eq!(outcome.phase, MpptPhase::Aborted);
    assert_eq!(outcome.abort_reason, Some(AbortReason::CoarseTimeout));
    let best = outcome.best.unwrap();
    assert!((best.power - reported_power(&curve, 1)).abs() < 1e-9);
    assert_eq!(outcome.samples.len(), 1);
    assert!(results.is_empty());
    assert!(outcome.record.is_none());
}

#[tokio::test(start_paused = true)]
async fn refuses_to_start_without_session_index() {
    let sim = SimDevice::new(peaked_curve(PEAK));
    let reader = sim.reader();
    let mut dl24 = device(sim, None);
    let mut results: Vec<MpptRecord> = Vec::new();

    let err = MpptController::new(&mut dl24, reader, MpptConfig::default())
        .run(&mut results)
        .await
        .unwrap_err();

    assert!(matches!(err, Dl24Error::UnresolvedSessionIndex));
    assert!(dl24.transport().writes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn broadcast_mode_still_converges_when_allowed() {
    let sim = SimDevice::new(peaked_curve(PEAK)).honouring(&[1]);
    let reader = sim.reader();
    let mut dl24 = device(sim, None);
    let config = MpptConfig {
        allow_broadcast: true,
        ..Default::default()
    };
    let mut results: Vec<MpptRecord> = Vec::new();

    let outcome = MpptController::new(&mut dl24, reader, config).run(&mut results).await.unwrap();

    assert_eq!(outcome.phase, MpptPhase::Done);
    assert!((outcome.best.unwrap().position - PEAK).abs() <= 1);
    // Four frames per press, one per candidate index
    assert_eq!(dl24.transport().writes.len() as u32, outcome.total_steps * 4);
}

#[tokio::test(start_paused = true)]
async fn dither_timeout_keeps_coarse_best() {
    // 7 coarse bursts of 3 plus 9 presses back to the peak, then silence
    let sim = SimDevice::new(peaked_curve(PEAK)).with_frame_budget(30);
    let reader = sim.reader();
    let mut dl24 = device(sim, Some(0));
    let mut results: Vec<MpptRecord> = Vec::new();

    let outcome = MpptController::new(&mut dl24, reader, MpptConfig::default())
        .run(&mut results)
        .await
        .unwrap();

    assert_eq!(outcome.phase, MpptPhase::Done);
    assert!(outcome.dither_timed_out);
    assert_eq!(outcome.best.unwrap().position, PEAK);
    assert_eq!(results.len(), 1);
    // The unconfirmed dither step was walked back anyway
    assert_eq!(outcome.position, PEAK);
}

#[tokio::test(start_paused = true)]
async fn stop_signal_aborts_before_any_press() {
    let sim = SimDevice::new(peaked_curve(PEAK));
    let reader = sim.reader();
    let mut dl24 = device(sim, Some(0));
    let stop = StopSignal::new();
    stop.stop();
    let mut results: Vec<MpptRecord> = Vec::new();

    let outcome = MpptController::new(&mut dl24, reader, MpptConfig::default())
        .with_stop_signal(stop)
        .run(&mut results)
        .await
        .unwrap();

    assert_eq!(outcome.phase, MpptPhase::Aborted);
    assert_eq!(outcome.abort_reason, Some(AbortReason::Stopped));
    assert!(outcome.best.is_none());
    assert!(dl24.transport().writes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn safety_cap_ends_coarse_phase_normally() {
    // Monotonically rising power never triggers the worse counter
    let sim = SimDevice::new(Box::new(|pos| (10.0, 0.1 * pos.max(0) as f64)));
    let reader = sim.reader();
    let mut dl24 = device(sim, Some(0));
    let config = MpptConfig {
        coarse_safety_cap: 30,
        return_to_best: false,
        ..Default::default()
    };
    let mut results: Vec<MpptRecord> = Vec::new();

    let outcome = MpptController::new(&mut dl24, reader, config).run(&mut results).await.unwrap();

    assert_eq!(outcome.phase, MpptPhase::Done);
    let coarse_steps = outcome
        .samples
        .iter()
        .filter(|s| s.phase == MpptPhase::CoarseAscent)
        .count();
    assert_eq!(coarse_steps, 10);
    assert!(outcome.best.unwrap().position >= 30);
    assert_eq!(results.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn reset_to_zero_after_search() {
    let sim = SimDevice::new(peaked_curve(PEAK));
    let reader = sim.reader();
    let mut dl24 = device(sim, Some(0));
    let config = MpptConfig {
        reset_after_search: true,
        ..Default::default()
    };
    let mut results: Vec<MpptRecord> = Vec::new();

    let outcome = MpptController::new(&mut dl24, reader, config).run(&mut results).await.unwrap();

    let reset = outcome.reset.unwrap();
    assert!(reset.reached_threshold);
    assert_eq!(reset.taps, 20);
    assert_eq!(reset.last_current, Some(0.0));
    assert_eq!(dl24.transport().position, 0);
}

#[tokio::test(start_paused = true)]
async fn reset_respects_hard_cap() {
    // Current never drops, so only the cap ends the reset
    let sim = SimDevice::new(Box::new(|_| (10.0, 1.0)));
    let reader = sim.reader();
    let mut dl24 = device(sim, Some(0));
    dl24.transport_mut().emit();
    let config = MpptConfig {
        reset_burst: 10,
        reset_hard_cap: 35,
        ..Default::default()
    };

    let report = MpptController::new(&mut dl24, reader, config).reset_to_zero().await;

    assert!(!report.reached_threshold);
    assert_eq!(report.taps, 35);
    assert_eq!(dl24.transport().writes.len(), 35);
}

#[tokio::test(start_paused = true)]
async fn dither_moves_best_off_the_burst_grid() {
    // Coarse bursts of 3 land on 15, one step past the peak
    let sim = SimDevice::new(peaked_curve(14));
    let reader = sim.reader();
    let mut dl24 = device(sim, Some(0));
    let mut results: Vec<MpptRecord> = Vec::new();

    let outcome = MpptController::new(&mut dl24, reader, MpptConfig::default())
        .run(&mut results)
        .await
        .unwrap();

    let coarse_best = outcome
        .samples
        .iter()
        .filter(|s| s.phase == MpptPhase::CoarseAscent)
        .map(|s| s.best_power)
        .fold(f64::MIN, f64::max);
    let best = outcome.best.unwrap();

    assert_eq!(outcome.phase, MpptPhase::Done);
    assert!(!outcome.dither_timed_out);
    assert_eq!(best.position, 14);
    assert!(best.power > coarse_best);
    assert_eq!(outcome.position, 14);
    assert_eq!(dl24.transport().position, 14);
    assert_eq!(results[0].power, best.power);
}

#[tokio::test(start_paused = true)]
async fn return_to_best_completes_without_telemetry() {
    // Telemetry ends with the last coarse burst
    let sim = SimDevice::new(peaked_curve(PEAK)).with_frame_budget(21);
    let reader = sim.reader();
    let mut dl24 = device(sim, Some(0));
    let mut results: Vec<MpptRecord> = Vec::new();

    let outcome = MpptController::new(&mut dl24, reader, MpptConfig::default())
        .run(&mut results)
        .await
        .unwrap();

    assert_eq!(outcome.phase, MpptPhase::Done);
    assert!(outcome.dither_timed_out);
    assert_eq!(outcome.best.unwrap().position, PEAK);
    assert_eq!(outcome.position, PEAK);
    assert_eq!(dl24.transport().position, PEAK);
    assert_eq!(results.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_dither_press_is_not_reverted() {
    // Writes 1-30 are the coarse phase and the move back to the peak
    let mut sim = SimDevice::new(peaked_curve(PEAK));
    sim.failing_writes = vec![31];
    let reader = sim.reader();
    let mut dl24 = device(sim, Some(0));
    let mut results: Vec<MpptRecord> = Vec::new();

    let outcome = MpptController::new(&mut dl24, reader, MpptConfig::default())
        .run(&mut results)
        .await
        .unwrap();

    assert_eq!(outcome.phase, MpptPhase::Done);
    assert!(!outcome.dither_timed_out);
    assert_eq!(outcome.best.unwrap().position, PEAK);
    assert_eq!(outcome.position, PEAK);
    assert_eq!(dl24.transport().position, PEAK);
}

#[tokio::test(start_paused = true)]
async fn zero_bursts_are_raised_to_one() {
    let sim = SimDevice::new(peaked_curve(PEAK));
    let reader = sim.reader();
    let mut dl24 = device(sim, Some(0));
    let config = MpptConfig {
        coarse_burst: 0,
        reset_burst: 0,
        reset_after_search: true,
        ..Default::default()
    };
    let mut results: Vec<MpptRecord> = Vec::new();

    let outcome = MpptController::new(&mut dl24, reader, config).run(&mut results).await.unwrap();

    assert_eq!(outcome.phase, MpptPhase::Done);
    assert_eq!(outcome.best.unwrap().position, PEAK);
    let reset = outcome.reset.unwrap();
    assert!(reset.reached_threshold);
    assert_eq!(reset.taps, PEAK as u32);
}
