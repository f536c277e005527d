//! Headless experiment driver
//!
//! Ticks an engine at a fixed real-time step with no clock involved, so a
//! session always produces the same report (given a jitter seed).

use physio_core::{ExperimentKind, Phase, TracePoint, TraceStats};
use physio_simulation::{RunStatus, SimulationEngine};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LabConfig;

/// Outcome of one headless run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub name: String,
    pub run_id: Uuid,
    pub experiment: ExperimentKind,
    pub status: RunStatus,
    /// Run was cut off by `max_runtime_ms`
    pub truncated: bool,
    pub ticks: u64,
    pub elapsed_ms: f64,
    pub stimuli: usize,
    pub final_value: f64,
    pub final_phase: Phase,
    pub baseline: f64,
    pub fatigue_level: f64,
    pub stats: TraceStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<TracePoint>>,
}

/// Run a session to completion
pub fn run_session(config: &LabConfig, include_trace: bool) -> RunReport {
    let mut engine = SimulationEngine::new(config.experiment_config());
    let controls = config.controls.clamped();

    // the fatigue experiment is driven by stimuli rather than a start button
    engine.stimulate(&controls);

    let mut ticks = 0u64;
    let mut real_ms = 0.0;
    while engine.state().is_running() && real_ms < config.max_runtime_ms {
        engine.advance(config.tick_ms, &controls);
        real_ms += config.tick_ms;
        ticks += 1;
    }

    let truncated = engine.stop();
    if truncated {
        warn!(
            "{} cut off after {:.0} ms of real time",
            config.name, config.max_runtime_ms
        );
    }

    let state = engine.state();
    debug!("{} finished after {} ticks", config.name, ticks);

    RunReport {
        name: config.name.clone(),
        run_id: state.run_id,
        experiment: state.kind,
        status: state.status,
        truncated,
        ticks,
        elapsed_ms: state.elapsed_ms,
        stimuli: state.stimuli().len(),
        final_value: state.current_value,
        final_phase: state.phase,
        baseline: state.baseline(),
        fatigue_level: state.fatigue_level(),
        stats: state.samples.stats(),
        trace: include_trace.then(|| state.samples.to_vec()),
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.name, self.experiment)?;
        writeln!(f, "  run:        {}", self.run_id)?;
        writeln!(
            f,
            "  status:     {:?}{}",
            self.status,
            if self.truncated { " (cut off)" } else { "" }
        )?;
        writeln!(f, "  elapsed:    {:.1} ms in {} ticks", self.elapsed_ms, self.ticks)?;
        writeln!(f, "  stimuli:    {}", self.stimuli)?;
        writeln!(f, "  samples:    {}", self.stats.count)?;
        writeln!(
            f,
            "  peak:       {:.3} at {:.1} ms",
            self.stats.max, self.stats.peak_time
        )?;
        writeln!(f, "  range:      {:.3} .. {:.3}", self.stats.min, self.stats.max)?;
        writeln!(f, "  baseline:   {:.3}", self.baseline)?;
        if self.experiment == ExperimentKind::Fatigue {
            writeln!(f, "  fatigue:    {:.0}%", self.fatigue_level * 100.0)?;
        }
        write!(f, "  final:      {:.3} ({})", self.final_value, self.final_phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_preset_finishes() {
        for preset in LabConfig::presets() {
            let report = run_session(&preset, false);
            assert_eq!(report.status, RunStatus::Finished, "{}", preset.name);
            assert!(!report.truncated, "{}", preset.name);
            assert!(report.stats.count > 0);
            assert!(report.trace.is_none());
        }
    }

    #[test]
    fn test_runtime_cap_truncates() {
        let config = LabConfig {
            max_runtime_ms: 500.0,
            ..LabConfig::for_kind(ExperimentKind::Cardiogram)
        };
        let report = run_session(&config, false);
        assert!(report.truncated);
        assert_eq!(report.status, RunStatus::Finished);
        assert!(report.elapsed_ms < config.experiment_config().run_duration_ms);
    }

    #[test]
    fn test_report_serializes_with_trace() {
        let config = LabConfig::presets().remove(0);
        let report = run_session(&config, true);
        let json = serde_json::to_value(&report).unwrap();
        let trace = json["trace"].as_array().unwrap();
        assert_eq!(trace.len(), report.stats.count);
        assert_eq!(json["experiment"], "SimpleTwitch");
    }

    #[test]
    fn test_seeded_sessions_repeat() {
        let config = LabConfig {
            jitter: Some(physio_simulation::JitterConfig {
                std_dev: 0.02,
                seed: Some(11),
            }),
            ..LabConfig::presets().remove(3)
        };
        let a = run_session(&config, true);
        let b = run_session(&config, true);
        assert_eq!(a.trace, b.trace);
        assert_ne!(a.run_id, b.run_id);
    }

    #[test]
    fn test_summary_mentions_experiment() {
        let report = run_session(&LabConfig::presets().remove(2), false);
        let summary = report.to_string();
        assert!(summary.contains("Fatigue series"));
        assert!(summary.contains("fatigue:"));
    }
}
