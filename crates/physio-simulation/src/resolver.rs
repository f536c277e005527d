//! Parameter resolution: control inputs to physiological parameters
//!
//! Every function here is pure. The constants are tuned for a plausible
//! kymograph trace rather than taken from a measured preparation.

use physio_core::{
    LoadMode, PhysiologicalParameters, FREQUENCY_RANGE, LOAD_RANGE, TEMPERATURE_RANGE,
    VOLTAGE_RANGE,
};

/// Twitch of a gastrocnemius at room temperature
pub const NORMAL_TWITCH: PhysiologicalParameters = PhysiologicalParameters {
    latent_period_ms: 50.0,
    contraction_duration_ms: 60.0,
    relaxation_duration_ms: 90.0,
    peak_amplitude: 1.0,
    sustained_plateau: false,
};

/// Temperature bands of the bath, each with its own twitch shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureBand {
    Cold,
    Cool,
    Normal,
    Warm,
    Hot,
    /// Irreversible sustained contraction from protein denaturation
    HeatRigor,
}

impl TemperatureBand {
    pub fn from_celsius(temperature_c: f64) -> Self {
        let t = TEMPERATURE_RANGE.clamp(temperature_c);
        if t <= 10.0 {
            TemperatureBand::Cold
        } else if t < 20.0 {
            TemperatureBand::Cool
        } else if t <= 30.0 {
            TemperatureBand::Normal
        } else if t < 40.0 {
            TemperatureBand::Warm
        } else if t < 43.0 {
            TemperatureBand::Hot
        } else {
            TemperatureBand::HeatRigor
        }
    }

    pub fn twitch_parameters(&self) -> PhysiologicalParameters {
        match self {
            TemperatureBand::Cold => PhysiologicalParameters::twitch(100.0, 120.0, 200.0, 0.6),
            TemperatureBand::Cool => PhysiologicalParameters::twitch(70.0, 90.0, 140.0, 0.8),
            TemperatureBand::Normal => NORMAL_TWITCH,
            TemperatureBand::Warm => PhysiologicalParameters::twitch(30.0, 45.0, 60.0, 1.2),
            TemperatureBand::Hot => PhysiologicalParameters::twitch(20.0, 40.0, 50.0, 1.1),
            TemperatureBand::HeatRigor => PhysiologicalParameters::sustained(15.0, 50.0, 1.3),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TemperatureBand::Cold => "cold: slow, weak twitch",
            TemperatureBand::Cool => "cool",
            TemperatureBand::Normal => "room temperature",
            TemperatureBand::Warm => "warm: fast, strong twitch",
            TemperatureBand::Hot => "hot: strength declining",
            TemperatureBand::HeatRigor => "heat rigor",
        }
    }
}

/// Twitch for a bath temperature
pub fn resolve_temperature(temperature_c: f64) -> PhysiologicalParameters {
    TemperatureBand::from_celsius(temperature_c).twitch_parameters()
}

const AFTER_LOAD_FAILURE_G: f64 = 100.0;
const FREE_LOAD_FAILURE_G: f64 = 150.0;
const STRETCH_BENEFIT_PER_G: f64 = 0.01;
const STRETCH_DROP_PER_G: f64 = 0.004;

/// Lever response to a hung weight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadResponse {
    /// Height of the lever tip at the peak of the twitch, above baseline
    pub peak_height: f64,
    /// Resting lever offset; negative when the weight pre-stretches the muscle
    pub baseline: f64,
}

/// Peak height and baseline for a load under either protocol
pub fn resolve_load(load_grams: f64, mode: LoadMode) -> LoadResponse {
    let load = LOAD_RANGE.clamp(load_grams);
    match mode {
        LoadMode::AfterLoaded => LoadResponse {
            peak_height: (1.0 - load / AFTER_LOAD_FAILURE_G).max(0.0),
            baseline: 0.0,
        },
        LoadMode::FreeLoaded => {
            let stretch = 1.0 + STRETCH_BENEFIT_PER_G * load;
            LoadResponse {
                peak_height: (stretch * (1.0 - load / FREE_LOAD_FAILURE_G)).max(0.0),
                baseline: -STRETCH_DROP_PER_G * load,
            }
        }
    }
}

/// Twitch under load; heavier weights delay and shorten the contraction
pub fn load_parameters(load_grams: f64, mode: LoadMode) -> PhysiologicalParameters {
    let load = LOAD_RANGE.clamp(load_grams);
    let response = resolve_load(load, mode);
    PhysiologicalParameters::twitch(
        NORMAL_TWITCH.latent_period_ms + 0.3 * load,
        (NORMAL_TWITCH.contraction_duration_ms - 0.2 * load).max(20.0),
        NORMAL_TWITCH.relaxation_duration_ms,
        response.peak_height,
    )
}

/// Voltage below which no fibre is recruited
pub const THRESHOLD_VOLTAGE: f64 = 1.0;
/// Voltage at which every fibre is recruited
pub const MAXIMAL_VOLTAGE: f64 = 8.0;

/// Fraction of fibres recruited by a stimulus voltage, in [0, 1]
pub fn voltage_fraction(voltage: f64) -> f64 {
    let v = VOLTAGE_RANGE.clamp(voltage);
    if v <= THRESHOLD_VOLTAGE {
        0.0
    } else if v >= MAXIMAL_VOLTAGE {
        1.0
    } else {
        (v - THRESHOLD_VOLTAGE) / (MAXIMAL_VOLTAGE - THRESHOLD_VOLTAGE)
    }
}

/// Twitch produced by a single stimulus of the given voltage
pub fn resolve_voltage(voltage: f64) -> PhysiologicalParameters {
    PhysiologicalParameters {
        peak_amplitude: NORMAL_TWITCH.peak_amplitude * voltage_fraction(voltage),
        ..NORMAL_TWITCH
    }
}

/// Weaker, slower-relaxing twitch of a fatigued muscle.
///
/// `fatigue_level` is 0 for a fresh muscle and 1 for complete fatigue.
pub fn fatigue_adjusted(base: &PhysiologicalParameters, fatigue_level: f64) -> PhysiologicalParameters {
    let level = if fatigue_level.is_nan() { 0.0 } else { fatigue_level.clamp(0.0, 1.0) };
    let base = base.sanitized();
    PhysiologicalParameters {
        peak_amplitude: base.peak_amplitude * (1.0 - level),
        relaxation_duration_ms: base.relaxation_duration_ms * (1.0 + 1.5 * level),
        ..base
    }
}

/// Interval between stimuli of a train
pub fn stimulus_interval_ms(frequency_hz: f64) -> f64 {
    1000.0 / FREQUENCY_RANGE.clamp(frequency_hz)
}

/// Temperatures a perfused frog heart keeps beating in
const HEART_MIN_C: f64 = 5.0;
const HEART_MAX_C: f64 = 40.0;

/// Beat period and contraction height of the heart
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardiacProfile {
    pub period_ms: f64,
    pub amplitude: f64,
}

impl CardiacProfile {
    pub fn beats_per_minute(&self) -> f64 {
        60_000.0 / self.period_ms
    }
}

/// Heart rate doubles per 10 °C (Q10 of 2); contraction is strongest near 22 °C
pub fn resolve_cardiac(temperature_c: f64) -> CardiacProfile {
    let t = TEMPERATURE_RANGE.clamp(temperature_c).clamp(HEART_MIN_C, HEART_MAX_C);
    let bpm = 40.0 * 2f64.powf((t - 20.0) / 10.0);
    CardiacProfile {
        period_ms: 60_000.0 / bpm,
        amplitude: (1.0 - 0.03 * (t - 22.0).abs()).max(0.2),
    }
}
