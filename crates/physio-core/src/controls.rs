//! User-facing control inputs and their valid ranges

use serde::{Deserialize, Serialize};

use crate::params::LoadMode;

/// Closed range a slider value is clamped into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlRange {
    pub min: f64,
    pub max: f64,
}

impl ControlRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp into the range; NaN maps to the minimum
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Stimulus voltage (V)
pub const VOLTAGE_RANGE: ControlRange = ControlRange::new(0.0, 10.0);
/// Weight hung on the lever (g)
pub const LOAD_RANGE: ControlRange = ControlRange::new(0.0, 200.0);
/// Tetanus stimulus frequency (Hz)
pub const FREQUENCY_RANGE: ControlRange = ControlRange::new(1.0, 100.0);
/// Ringer bath temperature (°C)
pub const TEMPERATURE_RANGE: ControlRange = ControlRange::new(0.0, 50.0);

/// Slider and selector values supplied by the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlInputs {
    pub voltage: f64,
    pub load_grams: f64,
    pub load_mode: LoadMode,
    pub frequency_hz: f64,
    pub temperature_c: f64,
}

impl Default for ControlInputs {
    fn default() -> Self {
        Self {
            voltage: 5.0,
            load_grams: 0.0,
            load_mode: LoadMode::AfterLoaded,
            frequency_hz: 40.0,
            temperature_c: 25.0,
        }
    }
}

impl ControlInputs {
    /// Copy with every slider clamped into its documented range
    pub fn clamped(&self) -> Self {
        Self {
            voltage: VOLTAGE_RANGE.clamp(self.voltage),
            load_grams: LOAD_RANGE.clamp(self.load_grams),
            load_mode: self.load_mode,
            frequency_hz: FREQUENCY_RANGE.clamp(self.frequency_hz),
            temperature_c: TEMPERATURE_RANGE.clamp(self.temperature_c),
        }
    }

    pub fn with_voltage(mut self, voltage: f64) -> Self {
        self.voltage = voltage;
        self
    }

    pub fn with_load(mut self, load_grams: f64, load_mode: LoadMode) -> Self {
        self.load_grams = load_grams;
        self.load_mode = load_mode;
        self
    }

    pub fn with_frequency(mut self, frequency_hz: f64) -> Self {
        self.frequency_hz = frequency_hz;
        self
    }

    pub fn with_temperature(mut self, temperature_c: f64) -> Self {
        self.temperature_c = temperature_c;
        self
    }
}
