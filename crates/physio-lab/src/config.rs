//! Laboratory session configuration
//!
//! A `LabConfig` names an experiment, the control panel values to run it
//! with and how the headless runner ticks it. Files are plain JSON; every
//! field is optional and falls back to the simple-twitch defaults.

use physio_core::{
    config_error, ControlInputs, ExperimentKind, LoadMode, PhysioError, PhysioResult,
};
use physio_simulation::{ExperimentConfig, JitterConfig, StreamConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One laboratory session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Session name shown in reports
    pub name: String,
    pub experiment: ExperimentKind,
    pub controls: ControlInputs,
    /// Real milliseconds per tick
    pub tick_ms: f64,
    /// Real time after which a headless run is cut off
    pub max_runtime_ms: f64,
    /// Overrides the experiment's default playback speed
    pub playback_speed: Option<f64>,
    /// Overrides the experiment's default run duration
    pub run_duration_ms: Option<f64>,
    pub auto_stimulate: Option<bool>,
    pub jitter: Option<JitterConfig>,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            name: ExperimentKind::SimpleTwitch.description().to_string(),
            experiment: ExperimentKind::SimpleTwitch,
            controls: ControlInputs::default(),
            tick_ms: 16.0,
            max_runtime_ms: 600_000.0,
            playback_speed: None,
            run_duration_ms: None,
            auto_stimulate: None,
            jitter: None,
        }
    }
}

impl LabConfig {
    pub fn for_kind(kind: ExperimentKind) -> Self {
        Self {
            name: kind.description().to_string(),
            experiment: kind,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> PhysioResult<Self> {
        let config: LabConfig = serde_json::from_str(json).map_err(|e| PhysioError::SerializationError {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> PhysioResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| PhysioError::IoError {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> PhysioResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PhysioError::SerializationError {
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> PhysioResult<()> {
        if !(self.tick_ms > 0.0 && self.tick_ms.is_finite()) {
            return Err(config_error!("tick_ms must be positive, got {}", self.tick_ms));
        }
        if !(self.max_runtime_ms > 0.0) {
            return Err(config_error!(
                "max_runtime_ms must be positive, got {}",
                self.max_runtime_ms
            ));
        }
        if let Some(speed) = self.playback_speed {
            if !(speed > 0.0 && speed.is_finite()) {
                return Err(config_error!("playback_speed must be positive, got {}", speed));
            }
        }
        if let Some(duration) = self.run_duration_ms {
            if !(duration >= 0.0) {
                return Err(config_error!("run_duration_ms must not be negative, got {}", duration));
            }
        }
        if let Some(jitter) = self.jitter {
            if !(jitter.std_dev >= 0.0 && jitter.std_dev.is_finite()) {
                return Err(config_error!("jitter std_dev must not be negative, got {}", jitter.std_dev));
            }
        }
        Ok(())
    }

    /// Engine configuration: experiment defaults with this session's overrides
    pub fn experiment_config(&self) -> ExperimentConfig {
        let mut config = ExperimentConfig::for_kind(self.experiment);
        if let Some(speed) = self.playback_speed {
            config.playback_speed = speed;
        }
        if let Some(duration) = self.run_duration_ms {
            config.run_duration_ms = duration;
        }
        if let Some(auto) = self.auto_stimulate {
            config.fatigue.auto_stimulate = auto;
        }
        if self.jitter.is_some() {
            config.jitter = self.jitter;
        }
        config
    }

    /// Real-time stream configuration ticking at `tick_ms`
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            experiment: self.experiment_config(),
            frame_rate: (1000.0 / self.tick_ms).min(1000.0),
            ..StreamConfig::default()
        }
    }

    /// A demonstration session for every experiment
    pub fn presets() -> Vec<LabConfig> {
        vec![
            LabConfig {
                name: "Maximal twitch".to_string(),
                controls: ControlInputs::default().with_voltage(9.0),
                ..LabConfig::for_kind(ExperimentKind::SimpleTwitch)
            },
            LabConfig {
                name: "Free-loaded 50 g".to_string(),
                controls: ControlInputs::default().with_load(50.0, LoadMode::FreeLoaded),
                ..LabConfig::for_kind(ExperimentKind::EffectOfLoad)
            },
            LabConfig {
                name: "Fatigue series".to_string(),
                controls: ControlInputs::default().with_voltage(8.0),
                auto_stimulate: Some(true),
                ..LabConfig::for_kind(ExperimentKind::Fatigue)
            },
            LabConfig {
                name: "Complete tetanus at 40 Hz".to_string(),
                controls: ControlInputs::default().with_frequency(40.0),
                ..LabConfig::for_kind(ExperimentKind::Tetanus)
            },
            LabConfig {
                name: "Heat rigor".to_string(),
                controls: ControlInputs::default().with_temperature(45.0),
                ..LabConfig::for_kind(ExperimentKind::Temperature)
            },
            LabConfig {
                name: "Warm heart".to_string(),
                controls: ControlInputs::default().with_temperature(30.0),
                run_duration_ms: Some(5000.0),
                ..LabConfig::for_kind(ExperimentKind::Cardiogram)
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = LabConfig::from_json(
            r#"{"experiment": "Tetanus", "controls": {"frequency_hz": 20.0}}"#,
        )
        .unwrap();
        assert_eq!(config.experiment, ExperimentKind::Tetanus);
        assert_eq!(config.controls.frequency_hz, 20.0);
        assert_eq!(config.controls.voltage, ControlInputs::default().voltage);
        assert_eq!(config.tick_ms, 16.0);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let original = LabConfig::presets().remove(1);
        file.write_all(original.to_json().unwrap().as_bytes()).unwrap();

        let loaded = LabConfig::load(file.path()).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LabConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PhysioError::IoError { .. }));
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let err = LabConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, PhysioError::SerializationError { .. }));
    }

    #[test]
    fn test_validation_rejects_bad_timing() {
        let err = LabConfig::from_json(r#"{"tick_ms": 0.0}"#).unwrap_err();
        assert!(matches!(err, PhysioError::InvalidConfig { .. }));

        let config = LabConfig {
            playback_speed: Some(-1.0),
            ..LabConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_reach_experiment_config() {
        let config = LabConfig {
            playback_speed: Some(2.0),
            auto_stimulate: Some(true),
            jitter: Some(JitterConfig {
                std_dev: 0.02,
                seed: Some(1),
            }),
            ..LabConfig::for_kind(ExperimentKind::Fatigue)
        };
        let experiment = config.experiment_config();
        assert_eq!(experiment.kind, ExperimentKind::Fatigue);
        assert_eq!(experiment.playback_speed, 2.0);
        assert!(experiment.fatigue.auto_stimulate);
        assert_eq!(experiment.jitter, config.jitter);
        assert_eq!(config.stream_config().frame_rate, 62.5);
    }

    #[test]
    fn test_presets_are_valid() {
        let presets = LabConfig::presets();
        assert_eq!(presets.len(), ExperimentKind::ALL.len());
        for preset in presets {
            assert!(preset.validate().is_ok(), "{}", preset.name);
        }
    }
}
