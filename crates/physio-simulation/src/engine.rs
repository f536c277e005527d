//! Experiment engine: run state machine, simulation clock and sampler
//!
//! One engine serves every experiment. The experiment kind selects how
//! controls resolve into twitch parameters and how the output is evaluated;
//! the clock, sampling, finishing and archiving logic is shared.
//!
//! The engine never schedules its own ticks. Whoever owns it calls
//! [`SimulationEngine::advance`] with the real time that passed and the
//! controls as they are now, which keeps every run reproducible under a
//! test harness.

use physio_core::{
    ControlInputs, ExperimentKind, ParameterPolicy, Phase, PhysiologicalParameters, Retention,
    StimulusEvent, TraceBuffer, TracePoint, DEFAULT_MAX_POINTS,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::resolver::{
    fatigue_adjusted, load_parameters, resolve_cardiac, resolve_load, resolve_temperature,
    resolve_voltage,
};
use crate::scheduler::{summed_tension, FatigueTracker, StimulusScheduler, Treppe};
use crate::waveform::{cardiac_segment, cardiac_shape, instantaneous_value, phase_at};

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Finished,
}

/// Cosmetic noise added to the output after the model is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JitterConfig {
    /// Gaussian noise standard deviation
    pub std_dev: f64,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl JitterConfig {
    /// Finite, non-negative standard deviation
    pub fn is_valid(&self) -> bool {
        self.std_dev.is_finite() && self.std_dev >= 0.0
    }
}

/// Stimulus train of the tetanus experiment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TetanusConfig {
    /// Length of the stimulus train
    pub train_ms: f64,
    /// Absolute maximum tension of the muscle
    pub ceiling: f64,
    pub treppe: Treppe,
}

impl Default for TetanusConfig {
    fn default() -> Self {
        Self {
            train_ms: 3000.0,
            ceiling: 4.0,
            treppe: Treppe::default(),
        }
    }
}

/// Repeated stimulation of the fatigue experiment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueConfig {
    /// Stimuli delivered before fatigue starts to build
    pub warmup: usize,
    /// Fatigue added per stimulus after warm-up
    pub increment: f64,
    /// Level at which the muscle is fully fatigued
    pub max_level: f64,
    /// Deliver the next stimulus as soon as the previous twitch has finished
    pub auto_stimulate: bool,
    /// Automatic stimulation stops after this many stimuli even if the
    /// muscle never reaches `max_level`
    pub max_stimuli: usize,
    /// Absolute maximum tension when twitches overlap
    pub ceiling: f64,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            warmup: 3,
            increment: 0.08,
            max_level: 0.9,
            auto_stimulate: false,
            max_stimuli: 50,
            ceiling: 4.0,
        }
    }
}

/// Configuration of one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Experiment being simulated
    pub kind: ExperimentKind,
    /// Simulated milliseconds per real millisecond
    pub playback_speed: f64,
    /// Minimum simulated time between committed samples
    pub sample_spacing_ms: f64,
    /// Extra time a run keeps ticking after its window closes
    pub grace_ms: f64,
    /// Length of free-running runs and of a held heat-rigor contraction
    pub run_duration_ms: f64,
    /// Trace history policy
    pub retention: Retention,
    /// Hard cap on committed samples
    pub max_points: usize,
    /// Number of previous traces kept for overlay
    pub ghost_history: usize,
    pub tetanus: TetanusConfig,
    pub fatigue: FatigueConfig,
    pub jitter: Option<JitterConfig>,
}

impl ExperimentConfig {
    /// Default configuration of an experiment
    pub fn for_kind(kind: ExperimentKind) -> Self {
        let base = ExperimentConfig {
            kind,
            playback_speed: 1.0,
            sample_spacing_ms: 1.0,
            grace_ms: 20.0,
            run_duration_ms: 1000.0,
            retention: Retention::Full,
            max_points: DEFAULT_MAX_POINTS,
            ghost_history: 0,
            tetanus: TetanusConfig::default(),
            fatigue: FatigueConfig::default(),
            jitter: None,
        };

        match kind {
            // A 200 ms twitch is slowed down so it can be followed by eye
            ExperimentKind::SimpleTwitch => ExperimentConfig {
                playback_speed: 0.25,
                ghost_history: 4,
                ..base
            },
            ExperimentKind::EffectOfLoad | ExperimentKind::Temperature => ExperimentConfig {
                playback_speed: 0.25,
                ghost_history: 6,
                ..base
            },
            ExperimentKind::Fatigue => ExperimentConfig {
                grace_ms: 50.0,
                ..base
            },
            ExperimentKind::Tetanus => ExperimentConfig {
                sample_spacing_ms: 2.0,
                retention: Retention::Window { span_ms: 4000.0 },
                ghost_history: 2,
                ..base
            },
            ExperimentKind::Cardiogram => ExperimentConfig {
                sample_spacing_ms: 5.0,
                grace_ms: 0.0,
                run_duration_ms: 20_000.0,
                retention: Retention::Window { span_ms: 6000.0 },
                ..base
            },
        }
    }

    /// Create common preset configurations
    pub fn presets() -> Vec<(&'static str, ExperimentConfig)> {
        let mut presets: Vec<(&'static str, ExperimentConfig)> = ExperimentKind::ALL
            .iter()
            .map(|kind| (kind.description(), ExperimentConfig::for_kind(*kind)))
            .collect();

        presets.push((
            "Fatigue with automatic stimulation",
            ExperimentConfig {
                fatigue: FatigueConfig {
                    auto_stimulate: true,
                    ..FatigueConfig::default()
                },
                ..ExperimentConfig::for_kind(ExperimentKind::Fatigue)
            },
        ));
        presets.push((
            "Tetanus without treppe",
            ExperimentConfig {
                tetanus: TetanusConfig {
                    treppe: Treppe::NONE,
                    ..TetanusConfig::default()
                },
                ..ExperimentConfig::for_kind(ExperimentKind::Tetanus)
            },
        ));
        presets.push((
            "Cardiogram on a noisy drum",
            ExperimentConfig {
                jitter: Some(JitterConfig {
                    std_dev: 0.01,
                    seed: Some(7),
                }),
                ..ExperimentConfig::for_kind(ExperimentKind::Cardiogram)
            },
        ));

        presets
    }

    /// Copy with every numeric field forced into a usable domain.
    ///
    /// Negative values become 0; non-finite values fall back to the
    /// experiment's defaults. Invalid jitter is dropped.
    pub fn sanitized(&self) -> Self {
        let defaults = ExperimentConfig::for_kind(self.kind);
        let non_negative = |v: f64, fallback: f64| if v.is_finite() { v.max(0.0) } else { fallback };
        let tetanus = &self.tetanus;
        let fatigue = &self.fatigue;

        ExperimentConfig {
            playback_speed: if self.playback_speed > 0.0 && self.playback_speed.is_finite() {
                self.playback_speed
            } else {
                1.0
            },
            sample_spacing_ms: non_negative(self.sample_spacing_ms, defaults.sample_spacing_ms),
            grace_ms: non_negative(self.grace_ms, defaults.grace_ms),
            run_duration_ms: non_negative(self.run_duration_ms, defaults.run_duration_ms),
            max_points: self.max_points.max(1),
            tetanus: TetanusConfig {
                train_ms: non_negative(tetanus.train_ms, defaults.tetanus.train_ms),
                ceiling: non_negative(tetanus.ceiling, defaults.tetanus.ceiling),
                treppe: Treppe {
                    step: non_negative(tetanus.treppe.step, defaults.tetanus.treppe.step),
                    cap: non_negative(tetanus.treppe.cap, defaults.tetanus.treppe.cap),
                },
            },
            fatigue: FatigueConfig {
                increment: non_negative(fatigue.increment, defaults.fatigue.increment),
                max_level: non_negative(fatigue.max_level, defaults.fatigue.max_level).min(1.0),
                max_stimuli: fatigue.max_stimuli.max(1),
                ceiling: non_negative(fatigue.ceiling, defaults.fatigue.ceiling),
                ..*fatigue
            },
            jitter: self.jitter.filter(JitterConfig::is_valid),
            ..self.clone()
        }
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self::for_kind(ExperimentKind::SimpleTwitch)
    }
}

/// Trace of an earlier run kept for overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedTrace {
    pub run_id: Uuid,
    pub kind: ExperimentKind,
    pub samples: Vec<TracePoint>,
}

/// State of the current (or last) run
#[derive(Debug, Clone)]
pub struct RunState {
    /// Nil while idle
    pub run_id: Uuid,
    pub kind: ExperimentKind,
    pub status: RunStatus,
    pub elapsed_ms: f64,
    pub phase: Phase,
    pub current_value: f64,
    pub samples: TraceBuffer,
    pub policy: ParameterPolicy,
    /// Controls captured at run start for latched experiments
    pub latched: Option<ControlInputs>,
    scheduler: StimulusScheduler,
    stimulus_parameters: Vec<PhysiologicalParameters>,
    fatigue: FatigueTracker,
    baseline: f64,
    cycle_phase: f64,
    last_sample_t: Option<f64>,
}

impl RunState {
    fn idle(config: &ExperimentConfig) -> Self {
        let fatigue = &config.fatigue;
        RunState {
            run_id: Uuid::nil(),
            kind: config.kind,
            status: RunStatus::Idle,
            elapsed_ms: 0.0,
            phase: Phase::Rest,
            current_value: 0.0,
            samples: TraceBuffer::with_max_points(config.retention, config.max_points),
            policy: config.kind.policy(),
            latched: None,
            scheduler: StimulusScheduler::external(),
            stimulus_parameters: Vec::new(),
            fatigue: FatigueTracker::new(fatigue.warmup, fatigue.increment, fatigue.max_level),
            baseline: 0.0,
            cycle_phase: 0.0,
            last_sample_t: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    pub fn stimuli(&self) -> &[StimulusEvent] {
        self.scheduler.events()
    }

    /// Parameters of the twitch started by the stimulus with `index`
    pub fn parameters_for(&self, index: usize) -> Option<&PhysiologicalParameters> {
        self.stimulus_parameters.get(index)
    }

    pub fn fatigue_level(&self) -> f64 {
        self.fatigue.level()
    }

    /// Resting offset of the lever (negative under a free load)
    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    /// Position within the current heart beat, in [0, 1)
    pub fn cycle_phase(&self) -> f64 {
        self.cycle_phase
    }
}

/// Generic experiment engine
pub struct SimulationEngine {
    config: ExperimentConfig,
    state: RunState,
    ghosts: VecDeque<ArchivedTrace>,
    jitter: Option<(StdRng, Normal<f64>)>,
}

impl SimulationEngine {
    /// Create an idle engine for an experiment
    pub fn new(config: ExperimentConfig) -> Self {
        if let Some(jitter) = config.jitter.filter(|jitter| !jitter.is_valid()) {
            warn!("Jitter disabled: invalid std_dev {}", jitter.std_dev);
        }
        let config = config.sanitized();
        let jitter = config.jitter.and_then(|jitter| {
            let rng = match jitter.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            match Normal::new(0.0, jitter.std_dev) {
                Ok(normal) => Some((rng, normal)),
                Err(e) => {
                    warn!("Jitter disabled: {}", e);
                    None
                }
            }
        });

        SimulationEngine {
            state: RunState::idle(&config),
            config,
            ghosts: VecDeque::new(),
            jitter,
        }
    }

    pub fn for_kind(kind: ExperimentKind) -> Self {
        Self::new(ExperimentConfig::for_kind(kind))
    }

    /// Begin a fresh run, archiving the previous trace
    pub fn start(&mut self, controls: &ControlInputs) -> &RunState {
        let controls = controls.clamped();
        self.archive_current();

        let mut state = RunState::idle(&self.config);
        state.run_id = Uuid::new_v4();
        state.status = RunStatus::Running;
        if state.policy == ParameterPolicy::Latched {
            state.latched = Some(controls);
        }
        if self.config.kind == ExperimentKind::Tetanus {
            state.scheduler = StimulusScheduler::periodic(controls.frequency_hz, self.config.tetanus.train_ms);
        }
        self.state = state;

        match self.config.kind {
            ExperimentKind::Tetanus | ExperimentKind::Cardiogram => {}
            _ => self.deliver_stimulus(0.0, &controls),
        }

        debug!(
            "Run {} started: {} ({:?} parameters)",
            self.state.run_id, self.config.kind, self.state.policy
        );

        self.refresh(&controls);
        &self.state
    }

    /// Trigger a stimulus.
    ///
    /// The fatigue experiment adds a stimulus to the current run and resumes
    /// it; every other experiment starts a new run.
    pub fn stimulate(&mut self, controls: &ControlInputs) -> &RunState {
        if self.config.kind != ExperimentKind::Fatigue || self.state.status == RunStatus::Idle {
            return self.start(controls);
        }

        let controls = controls.clamped();
        self.state.latched = Some(controls);
        self.deliver_stimulus(self.state.elapsed_ms, &controls);
        if self.state.status != RunStatus::Running {
            self.state.status = RunStatus::Running;
            debug!("Run {} resumed at {:.1} ms", self.state.run_id, self.state.elapsed_ms);
        }
        self.refresh(&controls);
        &self.state
    }

    /// Cancel the current run, freezing the output where it is
    pub fn stop(&mut self) -> bool {
        if !self.state.is_running() {
            return false;
        }
        self.state.status = RunStatus::Finished;
        debug!(
            "Run {} stopped at {:.1} ms, value {:.3}",
            self.state.run_id, self.state.elapsed_ms, self.state.current_value
        );
        true
    }

    /// Discard the run, its stimuli and every archived trace
    pub fn reset(&mut self) {
        self.state = RunState::idle(&self.config);
        self.ghosts.clear();
        debug!("Engine reset: {}", self.config.kind);
    }

    /// Advance the clock by `real_dt_ms` of real time.
    ///
    /// Live experiments read `controls` on every call; latched experiments
    /// keep the controls they captured at start. Does nothing unless running.
    pub fn advance(&mut self, real_dt_ms: f64, controls: &ControlInputs) -> &RunState {
        if !self.state.is_running() {
            return &self.state;
        }

        let controls = self.effective_controls(controls);
        let real_dt = if real_dt_ms.is_finite() { real_dt_ms.max(0.0) } else { 0.0 };
        let dt = real_dt * self.config.playback_speed;
        self.state.elapsed_ms += dt;

        if self.config.kind == ExperimentKind::Cardiogram {
            let profile = resolve_cardiac(controls.temperature_c);
            self.state.cycle_phase = (self.state.cycle_phase + dt / profile.period_ms).rem_euclid(1.0);
        }

        self.refresh(&controls);
        &self.state
    }

    pub fn current_value(&self) -> f64 {
        self.state.current_value
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Committed samples, oldest first
    pub fn samples(&self) -> Vec<TracePoint> {
        self.state.samples.to_vec()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn ghosts(&self) -> impl Iterator<Item = &ArchivedTrace> + '_ {
        self.ghosts.iter()
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Replace the configuration; the engine returns to idle
    pub fn update_config(&mut self, config: ExperimentConfig) {
        *self = SimulationEngine::new(config);
    }

    /// Simulated time at which the current run closes (before grace)
    pub fn window_ms(&self) -> f64 {
        let last_twitch = self
            .state
            .stimuli()
            .last()
            .and_then(|event| self.state.parameters_for(event.index).map(|p| (event.onset_ms, *p)));

        match self.config.kind {
            ExperimentKind::Cardiogram => self.config.run_duration_ms,
            ExperimentKind::Tetanus => {
                let span = last_twitch
                    .and_then(|(_, params)| params.total_duration_ms())
                    .unwrap_or(0.0);
                self.config.tetanus.train_ms + span
            }
            _ => match last_twitch {
                Some((onset, params)) => {
                    let span = params
                        .total_duration_ms()
                        .unwrap_or_else(|| self.config.run_duration_ms.max(params.time_to_peak_ms()));
                    onset + span
                }
                None => 0.0,
            },
        }
    }

    fn effective_controls(&self, controls: &ControlInputs) -> ControlInputs {
        match (self.state.policy, self.state.latched) {
            (ParameterPolicy::Latched, Some(latched)) => latched,
            _ => controls.clamped(),
        }
    }

    /// Twitch parameters of a stimulus delivered under `controls`
    fn resolve(&self, controls: &ControlInputs, fatigue_level: f64) -> PhysiologicalParameters {
        match self.config.kind {
            ExperimentKind::SimpleTwitch => resolve_voltage(controls.voltage),
            ExperimentKind::EffectOfLoad => load_parameters(controls.load_grams, controls.load_mode),
            ExperimentKind::Fatigue => fatigue_adjusted(&resolve_voltage(controls.voltage), fatigue_level),
            ExperimentKind::Tetanus | ExperimentKind::Temperature | ExperimentKind::Cardiogram => {
                resolve_temperature(controls.temperature_c)
            }
        }
    }

    fn resolve_baseline(&self, controls: &ControlInputs) -> f64 {
        match self.config.kind {
            ExperimentKind::EffectOfLoad => resolve_load(controls.load_grams, controls.load_mode).baseline,
            _ => 0.0,
        }
    }

    fn deliver_stimulus(&mut self, at_ms: f64, controls: &ControlInputs) {
        if self.state.scheduler.trigger(at_ms).is_none() {
            return;
        }
        let level = if self.config.kind == ExperimentKind::Fatigue {
            self.state.fatigue.record_stimulus()
        } else {
            0.0
        };
        let params = self.resolve(controls, level);
        self.state.stimulus_parameters.push(params);
        self.state.baseline = self.resolve_baseline(controls);
    }

    /// Bring stimuli, output and trace up to the current elapsed time
    fn refresh(&mut self, controls: &ControlInputs) {
        match self.config.kind {
            ExperimentKind::EffectOfLoad | ExperimentKind::Temperature => {
                let params = self.resolve(controls, 0.0);
                if let Some(last) = self.state.stimulus_parameters.last_mut() {
                    // heat rigor is irreversible; cooling cannot relax it
                    if !last.sustained_plateau {
                        *last = params;
                    }
                }
                self.state.baseline = self.resolve_baseline(controls);
            }
            ExperimentKind::Tetanus => {
                let appended = self.state.scheduler.due(self.state.elapsed_ms).len();
                let params = self.resolve(controls, 0.0);
                self.state
                    .stimulus_parameters
                    .extend(std::iter::repeat(params).take(appended));
            }
            _ => {}
        }

        if self.state.elapsed_ms > self.window_ms() + self.config.grace_ms {
            self.finish(controls);
            return;
        }

        let (value, phase) = self.evaluate_at(self.state.elapsed_ms, controls);
        self.state.current_value = self.apply_jitter(value);
        self.state.phase = phase;
        self.commit_sample(false);
    }

    fn finish(&mut self, controls: &ControlInputs) {
        let fatigue = &self.config.fatigue;
        if self.config.kind == ExperimentKind::Fatigue
            && fatigue.auto_stimulate
            && !self.state.fatigue.is_exhausted()
            && self.state.stimuli().len() < fatigue.max_stimuli
        {
            self.deliver_stimulus(self.state.elapsed_ms, controls);
            let (value, phase) = self.evaluate_at(self.state.elapsed_ms, controls);
            self.state.current_value = self.apply_jitter(value);
            self.state.phase = phase;
            self.commit_sample(false);
            return;
        }

        let (value, phase) = match self.config.kind {
            ExperimentKind::Cardiogram => (0.0, Phase::Rest),
            // past the window every twitch has reached its resting value
            _ => self.evaluate_at(self.state.elapsed_ms, controls),
        };
        self.state.current_value = value;
        self.state.phase = phase;
        self.state.status = RunStatus::Finished;
        self.commit_sample(true);

        debug!(
            "Run {} finished at {:.1} ms with {} stimuli, {} samples",
            self.state.run_id,
            self.state.elapsed_ms,
            self.state.stimuli().len(),
            self.state.samples.len()
        );
    }

    /// Model output at simulated time `t`, without jitter
    fn evaluate_at(&self, t: f64, controls: &ControlInputs) -> (f64, Phase) {
        let state = &self.state;
        let params_for = |event: &StimulusEvent| {
            state
                .parameters_for(event.index)
                .copied()
                .unwrap_or_default()
        };
        let last = state.stimuli().last().map(|event| (event.onset_ms, params_for(event)));
        let last_phase = last.map_or(Phase::Rest, |(onset, params)| phase_at(t - onset, &params));

        match self.config.kind {
            ExperimentKind::Cardiogram => {
                let profile = resolve_cardiac(controls.temperature_c);
                (
                    profile.amplitude * cardiac_shape(state.cycle_phase),
                    cardiac_segment(state.cycle_phase).phase(),
                )
            }
            ExperimentKind::Tetanus => {
                let tetanus = &self.config.tetanus;
                let value = summed_tension(t, state.stimuli(), params_for, &tetanus.treppe, tetanus.ceiling);
                let phase = if t < tetanus.train_ms {
                    if value > 0.0 { Phase::Contraction } else { Phase::Latent }
                } else {
                    last_phase
                };
                (value, phase)
            }
            ExperimentKind::Fatigue => {
                let value = summed_tension(
                    t,
                    state.stimuli(),
                    params_for,
                    &Treppe::NONE,
                    self.config.fatigue.ceiling,
                );
                (value, last_phase)
            }
            ExperimentKind::SimpleTwitch | ExperimentKind::EffectOfLoad | ExperimentKind::Temperature => {
                let value = last.map_or(0.0, |(onset, params)| instantaneous_value(t - onset, &params));
                (state.baseline + value, last_phase)
            }
        }
    }

    fn apply_jitter(&mut self, value: f64) -> f64 {
        match self.jitter.as_mut() {
            Some((rng, normal)) => (value + normal.sample(rng)).max(self.state.baseline),
            None => value,
        }
    }

    fn commit_sample(&mut self, force: bool) {
        let t = self.state.elapsed_ms;
        let due = force
            || match self.state.last_sample_t {
                Some(last) => t - last >= self.config.sample_spacing_ms,
                None => true,
            };
        if due && self.state.samples.push(t, self.state.current_value) {
            self.state.last_sample_t = Some(t);
        }
    }

    fn archive_current(&mut self) {
        if self.config.ghost_history == 0 || self.state.samples.is_empty() {
            return;
        }
        self.ghosts.push_back(ArchivedTrace {
            run_id: self.state.run_id,
            kind: self.state.kind,
            samples: self.state.samples.to_vec(),
        });
        while self.ghosts.len() > self.config.ghost_history {
            self.ghosts.pop_front();
        }
    }
}
