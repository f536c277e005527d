//! Physio-Lab: headless virtual physiology laboratory

mod config;
mod runner;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use physio_core::{ExperimentKind, LoadMode};
use physio_simulation::{
    send_command, start_experiment_stream, JitterConfig, RunStatus, StreamCommand,
};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{info, warn};

use config::LabConfig;
use runner::run_session;

#[derive(Parser)]
#[command(name = "physio-lab")]
#[command(about = "Virtual physiology laboratory: frog muscle and heart experiments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment to completion and print a report
    Run {
        #[command(flatten)]
        session: SessionArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Include every committed sample in the JSON report
        #[arg(long)]
        trace: bool,

        /// Print the resolved session as JSON instead of running it
        #[arg(long)]
        print_config: bool,
    },

    /// Stream an experiment in real time, one line per frame
    Live {
        #[command(flatten)]
        session: SessionArgs,

        /// Stop streaming after this many seconds
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
    },

    /// List the built-in laboratory sessions
    Presets {
        /// Print the sessions as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Session selection; flags override values from the config file
#[derive(Args)]
struct SessionArgs {
    /// Session file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Experiment: twitch, load, fatigue, tetanus, temperature, cardiogram
    #[arg(short, long)]
    experiment: Option<String>,

    /// Stimulus voltage (0-10 V)
    #[arg(long)]
    voltage: Option<f64>,

    /// Load in grams (0-200)
    #[arg(long)]
    load: Option<f64>,

    /// Load mode: after or free
    #[arg(long)]
    load_mode: Option<String>,

    /// Stimulus frequency in Hz (1-100)
    #[arg(long)]
    frequency: Option<f64>,

    /// Ringer's solution temperature in °C (0-50)
    #[arg(long)]
    temperature: Option<f64>,

    /// Simulated ms per real ms
    #[arg(long)]
    speed: Option<f64>,

    /// Keep stimulating until the muscle is fatigued
    #[arg(long)]
    auto_stimulate: bool,

    /// Trace jitter standard deviation
    #[arg(long)]
    jitter: Option<f64>,

    /// Jitter seed
    #[arg(long)]
    seed: Option<u64>,
}

impl SessionArgs {
    fn resolve(&self) -> anyhow::Result<LabConfig> {
        let mut config = match &self.config {
            Some(path) => LabConfig::load(path)
                .with_context(|| format!("loading session {}", path.display()))?,
            None => LabConfig::default(),
        };

        if let Some(name) = &self.experiment {
            let kind: ExperimentKind = name.parse()?;
            config.experiment = kind;
            config.name = kind.description().to_string();
        }

        let controls = &mut config.controls;
        if let Some(voltage) = self.voltage {
            controls.voltage = voltage;
        }
        if let Some(load) = self.load {
            controls.load_grams = load;
        }
        if let Some(mode) = &self.load_mode {
            controls.load_mode = mode.parse::<LoadMode>()?;
        }
        if let Some(frequency) = self.frequency {
            controls.frequency_hz = frequency;
        }
        if let Some(temperature) = self.temperature {
            controls.temperature_c = temperature;
        }
        config.controls = config.controls.clamped();

        if let Some(speed) = self.speed {
            config.playback_speed = Some(speed);
        }
        if self.auto_stimulate {
            config.auto_stimulate = Some(true);
        }
        if self.jitter.is_some() || self.seed.is_some() {
            let current = config.jitter.unwrap_or(JitterConfig {
                std_dev: 0.01,
                seed: None,
            });
            config.jitter = Some(JitterConfig {
                std_dev: self.jitter.unwrap_or(current.std_dev),
                seed: self.seed.or(current.seed),
            });
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries reports and traces
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            session,
            json,
            trace,
            print_config,
        } => {
            let config = session.resolve()?;
            if print_config {
                println!("{}", config.to_json()?);
                return Ok(());
            }
            info!("Running {} ({})", config.name, config.experiment);
            let report = run_session(&config, trace);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
        }
        Commands::Live { session, seconds } => {
            let config = session.resolve()?;
            stream_live(&config, seconds).await?;
        }
        Commands::Presets { json } => {
            let presets = LabConfig::presets();
            if json {
                println!("{}", serde_json::to_string_pretty(&presets)?);
            } else {
                for preset in presets {
                    println!("{:<28} {}", preset.name, preset.experiment.slug());
                }
            }
        }
    }

    Ok(())
}

async fn stream_live(config: &LabConfig, seconds: f64) -> anyhow::Result<()> {
    anyhow::ensure!(
        seconds.is_finite() && seconds >= 0.0,
        "--seconds must be a non-negative number, got {}",
        seconds
    );
    let (mut frames, control) = start_experiment_stream(config.stream_config()).await?;
    let deadline = Instant::now() + Duration::from_secs_f64(seconds);

    send_command(&control, StreamCommand::UpdateControls(config.controls)).await?;
    send_command(&control, StreamCommand::Stimulate).await?;
    info!("Streaming {} for up to {:.1} s", config.name, seconds);

    loop {
        let frame = match timeout_at(deadline, frames.recv()).await {
            Err(_) => break,
            Ok(Ok(frame)) => frame,
            Ok(Err(RecvError::Lagged(skipped))) => {
                warn!("Display lagged, {} frames skipped", skipped);
                continue;
            }
            Ok(Err(RecvError::Closed)) => break,
        };

        for sample in &frame.new_samples {
            println!("{:>10.1} {:>8.4} {}", sample.t, sample.y, frame.phase);
        }
        if frame.status == RunStatus::Finished {
            info!("Run {} finished after {:.1} ms", frame.run_id, frame.elapsed_ms);
            break;
        }
    }

    send_command(&control, StreamCommand::Shutdown).await?;
    Ok(())
}
