//! Physiological parameter types shared by every experiment

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::PhysioError;

/// Timing and amplitude of a single muscle response
///
/// Durations are in simulated milliseconds. When `sustained_plateau` is set
/// the muscle never relaxes and `relaxation_duration_ms` is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysiologicalParameters {
    /// Delay between stimulus and first mechanical response
    pub latent_period_ms: f64,
    /// Duration of the rising phase
    pub contraction_duration_ms: f64,
    /// Duration of the falling phase
    pub relaxation_duration_ms: f64,
    /// Height of the response at the end of contraction
    pub peak_amplitude: f64,
    /// Hold at peak indefinitely instead of relaxing (heat rigor)
    #[serde(default)]
    pub sustained_plateau: bool,
}

impl PhysiologicalParameters {
    /// Regular twitch that contracts and then relaxes
    pub fn twitch(latent: f64, contraction: f64, relaxation: f64, amplitude: f64) -> Self {
        Self {
            latent_period_ms: latent,
            contraction_duration_ms: contraction,
            relaxation_duration_ms: relaxation,
            peak_amplitude: amplitude,
            sustained_plateau: false,
        }
    }

    /// Contraction that holds its peak for the rest of the run
    pub fn sustained(latent: f64, contraction: f64, amplitude: f64) -> Self {
        Self {
            latent_period_ms: latent,
            contraction_duration_ms: contraction,
            relaxation_duration_ms: 0.0,
            peak_amplitude: amplitude,
            sustained_plateau: true,
        }
    }

    /// Copy with every field clamped to its valid domain
    pub fn sanitized(&self) -> Self {
        Self {
            latent_period_ms: non_negative(self.latent_period_ms),
            contraction_duration_ms: non_negative(self.contraction_duration_ms),
            relaxation_duration_ms: non_negative(self.relaxation_duration_ms),
            peak_amplitude: non_negative(self.peak_amplitude),
            sustained_plateau: self.sustained_plateau,
        }
    }

    /// Time from stimulus to peak
    pub fn time_to_peak_ms(&self) -> f64 {
        self.latent_period_ms + self.contraction_duration_ms
    }

    /// Time from stimulus until the muscle is back at rest.
    ///
    /// `None` for a sustained plateau, which never returns to rest.
    pub fn total_duration_ms(&self) -> Option<f64> {
        if self.sustained_plateau {
            None
        } else {
            Some(self.time_to_peak_ms() + self.relaxation_duration_ms)
        }
    }
}

impl Default for PhysiologicalParameters {
    fn default() -> Self {
        Self::twitch(50.0, 60.0, 90.0, 1.0)
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.max(0.0)
    }
}

/// Mechanical phase reported to the animation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Phase {
    #[default]
    Rest,
    Latent,
    Contraction,
    Relaxation,
}

/// A delivered stimulus
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StimulusEvent {
    /// 0-based order of occurrence within the run
    pub index: usize,
    /// Simulated time of delivery
    pub onset_ms: f64,
}

/// The experiments offered by the laboratory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExperimentKind {
    /// Single twitch, amplitude set by stimulus voltage
    SimpleTwitch,
    /// Starling lever with after-loaded or free-loaded weight
    EffectOfLoad,
    /// Repeated externally triggered twitches with cumulative fatigue
    Fatigue,
    /// Periodic stimulus train with summation
    Tetanus,
    /// Twitch timing and height as a function of temperature
    Temperature,
    /// Free-running frog heart
    Cardiogram,
}

impl ExperimentKind {
    /// All experiments, in menu order
    pub const ALL: [ExperimentKind; 6] = [
        ExperimentKind::SimpleTwitch,
        ExperimentKind::EffectOfLoad,
        ExperimentKind::Fatigue,
        ExperimentKind::Tetanus,
        ExperimentKind::Temperature,
        ExperimentKind::Cardiogram,
    ];

    /// Whether control changes are read every tick or fixed at run start
    pub fn policy(&self) -> ParameterPolicy {
        match self {
            ExperimentKind::EffectOfLoad
            | ExperimentKind::Temperature
            | ExperimentKind::Cardiogram => ParameterPolicy::Live,
            ExperimentKind::SimpleTwitch
            | ExperimentKind::Fatigue
            | ExperimentKind::Tetanus => ParameterPolicy::Latched,
        }
    }

    /// Short identifier used on the command line and in config files
    pub fn slug(&self) -> &'static str {
        match self {
            ExperimentKind::SimpleTwitch => "twitch",
            ExperimentKind::EffectOfLoad => "load",
            ExperimentKind::Fatigue => "fatigue",
            ExperimentKind::Tetanus => "tetanus",
            ExperimentKind::Temperature => "temperature",
            ExperimentKind::Cardiogram => "cardiogram",
        }
    }

    /// Get experiment description
    pub fn description(&self) -> &'static str {
        match self {
            ExperimentKind::SimpleTwitch => "Simple muscle twitch",
            ExperimentKind::EffectOfLoad => "Effect of load (Starling's law)",
            ExperimentKind::Fatigue => "Genesis of fatigue",
            ExperimentKind::Tetanus => "Genesis of tetanus",
            ExperimentKind::Temperature => "Effect of temperature",
            ExperimentKind::Cardiogram => "Frog heart cardiogram",
        }
    }
}

impl FromStr for ExperimentKind {
    type Err = PhysioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ExperimentKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.slug() == wanted)
            .ok_or(PhysioError::UnknownExperiment { name: s.to_string() })
    }
}

/// How an experiment consumes control changes made during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterPolicy {
    /// Controls are re-read at the start of every tick
    Live,
    /// Controls are captured when the run (or stimulus) starts
    Latched,
}

/// Load application protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LoadMode {
    /// Weight supported until contraction begins
    #[default]
    AfterLoaded,
    /// Weight stretches the resting muscle
    FreeLoaded,
}

impl FromStr for LoadMode {
    type Err = PhysioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "after" | "after-loaded" | "afterloaded" => Ok(LoadMode::AfterLoaded),
            "free" | "free-loaded" | "freeloaded" => Ok(LoadMode::FreeLoaded),
            _ => Err(PhysioError::InvalidConfig {
                reason: format!("unknown load mode '{}'", s),
            }),
        }
    }
}

impl std::fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Rest => write!(f, "rest"),
            Phase::Latent => write!(f, "latent"),
            Phase::Contraction => write!(f, "contraction"),
            Phase::Relaxation => write!(f, "relaxation"),
        }
    }
}
