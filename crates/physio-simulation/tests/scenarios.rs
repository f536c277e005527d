//! End-to-end experiment runs driven through the public engine API

use physio_core::{ControlInputs, ExperimentKind, LoadMode, Phase, PhysiologicalParameters};
use physio_simulation::{
    instantaneous_value, ExperimentConfig, FatigueConfig, RunStatus, SimulationEngine,
};

const FRAME_MS: f64 = 16.0;

fn run_to_end(engine: &mut SimulationEngine, controls: &ControlInputs) {
    let mut ticks = 0;
    while engine.state().is_running() {
        engine.advance(FRAME_MS, controls);
        ticks += 1;
        assert!(ticks < 100_000, "run did not finish");
    }
}

fn assert_ordered(engine: &SimulationEngine) {
    let samples = engine.samples();
    for pair in samples.windows(2) {
        assert!(pair[1].t >= pair[0].t, "{:?} before {:?}", pair[0], pair[1]);
    }
}

#[test]
fn normal_twitch_landmarks() {
    let params = PhysiologicalParameters::twitch(50.0, 60.0, 90.0, 1.0);
    assert_eq!(instantaneous_value(0.0, &params), 0.0);
    assert_eq!(instantaneous_value(50.0, &params), 0.0);
    assert!((instantaneous_value(110.0, &params) - 1.0).abs() < 1e-9);
    assert!(instantaneous_value(200.0, &params).abs() < 1e-9);
}

#[test]
fn heat_rigor_does_not_relax() {
    let params = PhysiologicalParameters::sustained(15.0, 50.0, 1.3);
    assert!((instantaneous_value(1000.0, &params) - 1.3).abs() < 1e-9);

    let controls = ControlInputs::default().with_temperature(45.0);
    let mut engine = SimulationEngine::for_kind(ExperimentKind::Temperature);
    engine.start(&controls);
    run_to_end(&mut engine, &controls);

    assert_eq!(engine.state().status, RunStatus::Finished);
    assert!((engine.current_value() - 1.3).abs() < 1e-9);
    assert_ordered(&engine);
}

#[test]
fn tetanus_at_forty_hertz_saturates() {
    let controls = ControlInputs::default().with_frequency(40.0);
    let mut engine = SimulationEngine::for_kind(ExperimentKind::Tetanus);
    engine.start(&controls);
    run_to_end(&mut engine, &controls);

    let state = engine.state();
    assert_eq!(state.stimuli().len(), 120);
    assert_eq!(state.current_value, 0.0);
    assert_ordered(&engine);

    let ceiling = engine.config().tetanus.ceiling;
    let during_train = state.samples.slice_time(0.0, engine.config().tetanus.train_ms - 1.0);
    let saturated = during_train
        .iter()
        .filter(|p| (p.y - ceiling).abs() < 1e-9)
        .count();
    assert!(
        saturated * 2 > during_train.len(),
        "{} of {} samples at ceiling",
        saturated,
        during_train.len()
    );
    assert!(during_train.iter().all(|p| p.y <= ceiling));
}

#[test]
fn free_loading_lifts_higher_from_a_stretched_baseline() {
    let run = |mode: LoadMode| {
        let controls = ControlInputs::default().with_load(50.0, mode);
        let mut engine = SimulationEngine::for_kind(ExperimentKind::EffectOfLoad);
        engine.start(&controls);
        run_to_end(&mut engine, &controls);
        assert_ordered(&engine);
        let baseline = engine.state().baseline();
        let peak = engine.state().samples.stats().max - baseline;
        (baseline, peak)
    };

    let (after_baseline, after_peak) = run(LoadMode::AfterLoaded);
    let (free_baseline, free_peak) = run(LoadMode::FreeLoaded);

    assert_eq!(after_baseline, 0.0);
    assert!(free_baseline < 0.0);
    assert!(free_peak > after_peak);
}

#[test]
fn fatigue_series_weakens_until_exhausted() {
    let config = ExperimentConfig {
        fatigue: FatigueConfig {
            auto_stimulate: true,
            ..FatigueConfig::default()
        },
        ..ExperimentConfig::for_kind(ExperimentKind::Fatigue)
    };
    let controls = ControlInputs::default().with_voltage(8.0);
    let mut engine = SimulationEngine::new(config);
    engine.stimulate(&controls);
    run_to_end(&mut engine, &controls);

    let state = engine.state();
    assert_eq!(state.stimuli().len(), 15);
    assert!((state.fatigue_level() - 0.9).abs() < 1e-9);
    assert_eq!(state.phase, Phase::Rest);
    assert_ordered(&engine);

    let onsets: Vec<f64> = state.stimuli().iter().map(|e| e.onset_ms).collect();
    let peak_between = |start: f64, end: f64| {
        state
            .samples
            .slice_time(start, end)
            .iter()
            .map(|p| p.y)
            .fold(0.0, f64::max)
    };
    let first = peak_between(onsets[0], onsets[1]);
    let last = peak_between(onsets[14], state.elapsed_ms);
    assert!(first > 0.99);
    assert!(last < first * 0.2);
}

#[test]
fn heart_keeps_beating_until_stopped() {
    let controls = ControlInputs::default().with_temperature(30.0);
    let mut engine = SimulationEngine::for_kind(ExperimentKind::Cardiogram);
    engine.start(&controls);
    for _ in 0..250 {
        engine.advance(FRAME_MS, &controls);
    }
    assert!(engine.state().is_running());
    assert!(engine.state().samples.stats().max > 0.5);

    engine.stop();
    let frozen = engine.current_value();
    let elapsed = engine.state().elapsed_ms;
    engine.advance(FRAME_MS, &controls);
    assert_eq!(engine.current_value(), frozen);
    assert_eq!(engine.state().elapsed_ms, elapsed);
}

#[test]
fn warming_the_heart_speeds_it_up_without_phase_jump() {
    let cold = ControlInputs::default().with_temperature(10.0);
    let warm = ControlInputs::default().with_temperature(35.0);
    let mut engine = SimulationEngine::for_kind(ExperimentKind::Cardiogram);
    engine.start(&cold);

    let mut previous = engine.state().cycle_phase();
    for tick in 0..100 {
        let controls = if tick < 50 { &cold } else { &warm };
        engine.advance(FRAME_MS, controls);
        let phase = engine.state().cycle_phase();
        let step = (phase - previous).rem_euclid(1.0);
        assert!(step < 0.05, "phase jumped by {}", step);
        previous = phase;
    }
}
