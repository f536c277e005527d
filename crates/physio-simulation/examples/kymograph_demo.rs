//! Kymograph demo: every experiment run headless, printed as a coarse chart
//!
//! Run with `cargo run -p physio-simulation --example kymograph_demo`.

use physio_core::{ControlInputs, ExperimentKind, LoadMode};
use physio_simulation::{ExperimentConfig, SimulationEngine};

const COLUMNS: usize = 60;
const FRAME_MS: f64 = 16.0;

fn main() {
    println!("=== Virtual Physiology Laboratory ===\n");

    let sessions = [
        (ExperimentKind::SimpleTwitch, ControlInputs::default().with_voltage(9.0)),
        (
            ExperimentKind::EffectOfLoad,
            ControlInputs::default().with_load(50.0, LoadMode::FreeLoaded),
        ),
        (ExperimentKind::Tetanus, ControlInputs::default().with_frequency(40.0)),
        (ExperimentKind::Temperature, ControlInputs::default().with_temperature(8.0)),
        (ExperimentKind::Cardiogram, ControlInputs::default().with_temperature(25.0)),
    ];

    for (kind, controls) in sessions {
        let config = ExperimentConfig {
            run_duration_ms: 3000.0,
            ..ExperimentConfig::for_kind(kind)
        };
        let mut engine = SimulationEngine::new(config);
        engine.start(&controls);
        while engine.state().is_running() {
            engine.advance(FRAME_MS, &controls);
        }

        let stats = engine.state().samples.stats();
        println!(
            "{} - {} samples, peak {:.2} at {:.0} ms",
            kind, stats.count, stats.max, stats.peak_time
        );
        draw(&engine, stats.min, stats.max);
        println!();
    }
}

/// One row per time bucket, bar length proportional to the mean value
fn draw(engine: &SimulationEngine, min: f64, max: f64) {
    let samples = engine.samples();
    let span = (max - min).max(1e-9);
    for chunk in samples.chunks((samples.len() / 20).max(1)) {
        let mean = chunk.iter().map(|p| p.y).sum::<f64>() / chunk.len() as f64;
        let width = (((mean - min) / span) * COLUMNS as f64).round() as usize;
        println!("{:>8.0} ms |{}", chunk[0].t, "#".repeat(width));
    }
}
