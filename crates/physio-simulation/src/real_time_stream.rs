//! Real-time experiment streaming for live strip-chart displays
//!
//! A stream owns one [`SimulationEngine`], ticks it from a tokio interval
//! and publishes a [`LabFrame`] per tick. Commands arrive over an mpsc
//! channel and are applied between ticks, so a `Stop` takes effect before
//! the next advance.

use physio_core::{
    config_error, ControlInputs, ExperimentKind, Phase, PhysioError, PhysioResult, TracePoint,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{ExperimentConfig, RunStatus, SimulationEngine};

/// Configuration for real-time streaming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Experiment driven by the stream
    pub experiment: ExperimentConfig,
    /// Ticks per second of real time
    pub frame_rate: f64,
    /// Frames buffered per subscriber
    pub buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            experiment: ExperimentConfig::default(),
            frame_rate: 60.0,
            buffer_size: 256,
        }
    }
}

impl StreamConfig {
    pub fn for_kind(kind: ExperimentKind) -> Self {
        Self {
            experiment: ExperimentConfig::for_kind(kind),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PhysioResult<()> {
        if !(self.frame_rate > 0.0 && self.frame_rate <= 1000.0) {
            return Err(config_error!(
                "frame_rate must be in (0, 1000] Hz, got {}",
                self.frame_rate
            ));
        }
        if self.buffer_size == 0 {
            return Err(config_error!("buffer_size must be at least 1"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }
}

/// Commands for controlling the stream
#[derive(Debug, Clone)]
pub enum StreamCommand {
    /// Begin a fresh run with the current controls
    Start,
    /// Trigger a stimulus (adds to a fatigue run, starts any other)
    Stimulate,
    /// Cancel the run, freezing the output
    Stop,
    /// Discard the run and the archived traces
    Reset,
    /// New control panel values
    UpdateControls(ControlInputs),
    /// Switch experiment; the engine returns to idle
    UpdateConfig(ExperimentConfig),
    SetAutoStimulate(bool),
    /// End the stream task
    Shutdown,
}

/// Snapshot published after every tick and command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabFrame {
    pub run_id: Uuid,
    pub kind: ExperimentKind,
    pub status: RunStatus,
    pub elapsed_ms: f64,
    pub value: f64,
    pub phase: Phase,
    pub baseline: f64,
    pub stimuli: usize,
    pub fatigue_level: f64,
    /// Samples committed since the previous frame
    pub new_samples: Vec<TracePoint>,
}

/// Real-time experiment stream
pub struct ExperimentStream {
    config: StreamConfig,
    engine: SimulationEngine,
    controls: ControlInputs,
    frame_sender: broadcast::Sender<LabFrame>,
    control_receiver: mpsc::Receiver<StreamCommand>,
    control_sender: mpsc::Sender<StreamCommand>,
    current_frame: Arc<Mutex<Option<LabFrame>>>,
    last_sent_t: Option<f64>,
    frames_published: u64,
}

impl ExperimentStream {
    pub fn new(config: StreamConfig) -> PhysioResult<Self> {
        config.validate()?;
        let engine = SimulationEngine::new(config.experiment.clone());
        let (frame_sender, _) = broadcast::channel(config.buffer_size);
        let (control_sender, control_receiver) = mpsc::channel(32);

        Ok(ExperimentStream {
            config,
            engine,
            controls: ControlInputs::default(),
            frame_sender,
            control_receiver,
            control_sender,
            current_frame: Arc::new(Mutex::new(None)),
            last_sent_t: None,
            frames_published: 0,
        })
    }

    /// Start from these controls instead of the defaults
    pub fn with_controls(mut self, controls: ControlInputs) -> Self {
        self.controls = controls.clamped();
        self
    }

    /// Get a receiver for frames
    pub fn subscribe(&self) -> broadcast::Receiver<LabFrame> {
        self.frame_sender.subscribe()
    }

    /// Get control sender for sending commands
    pub fn control_handle(&self) -> mpsc::Sender<StreamCommand> {
        self.control_sender.clone()
    }

    /// Shared handle on the most recent frame
    pub fn current_frame_handle(&self) -> Arc<Mutex<Option<LabFrame>>> {
        Arc::clone(&self.current_frame)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Run the tick loop until a `Shutdown` command arrives
    pub async fn run(&mut self) -> PhysioResult<()> {
        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick = Instant::now();

        info!(
            "Experiment stream ready: {} at {:.0} Hz",
            self.config.experiment.kind, self.config.frame_rate
        );

        loop {
            tokio::select! {
                now = ticker.tick() => {
                    let real_dt_ms = now.duration_since(last_tick).as_secs_f64() * 1000.0;
                    last_tick = now;

                    if self.engine.state().is_running() {
                        self.engine.advance(real_dt_ms, &self.controls);
                        self.publish().await;
                    }
                }

                command = self.control_receiver.recv() => {
                    let Some(command) = command else {
                        info!("Experiment stream control channel closed");
                        break;
                    };
                    if matches!(command, StreamCommand::Shutdown) {
                        info!("Experiment stream shut down after {} frames", self.frames_published);
                        break;
                    }
                    let restarts_clock = match command {
                        StreamCommand::Start => true,
                        StreamCommand::Stimulate => !self.engine.state().is_running(),
                        _ => false,
                    };
                    if restarts_clock {
                        // the run's clock starts now, not at the previous tick
                        last_tick = Instant::now();
                    }
                    self.apply(command);
                    self.publish().await;
                }
            }
        }

        Ok(())
    }

    fn apply(&mut self, command: StreamCommand) {
        match command {
            StreamCommand::Start => {
                let state = self.engine.start(&self.controls);
                self.last_sent_t = None;
                info!("Run {} started", state.run_id);
            }
            StreamCommand::Stimulate => {
                let was_idle = self.engine.state().status == RunStatus::Idle;
                let run_id = self.engine.state().run_id;
                let state = self.engine.stimulate(&self.controls);
                if was_idle || state.run_id != run_id {
                    self.last_sent_t = None;
                }
                debug!("Stimulus {} delivered", state.stimuli().len());
            }
            StreamCommand::Stop => {
                if self.engine.stop() {
                    info!("Run stopped at {:.1} ms", self.engine.state().elapsed_ms);
                }
            }
            StreamCommand::Reset => {
                self.engine.reset();
                self.last_sent_t = None;
                info!("Experiment reset");
            }
            StreamCommand::UpdateControls(controls) => {
                self.controls = controls.clamped();
                debug!("Controls updated: {:?}", self.controls);
            }
            StreamCommand::UpdateConfig(experiment) => {
                self.config.experiment = experiment.clone();
                self.engine.update_config(experiment);
                self.last_sent_t = None;
                info!("Experiment switched to {}", self.config.experiment.kind);
            }
            StreamCommand::SetAutoStimulate(enabled) => {
                let mut experiment = self.config.experiment.clone();
                experiment.fatigue.auto_stimulate = enabled;
                if self.engine.state().status != RunStatus::Idle {
                    warn!("Auto-stimulation change discards the current run");
                }
                self.config.experiment = experiment.clone();
                self.engine.update_config(experiment);
                self.last_sent_t = None;
                info!("Auto-stimulation {}", if enabled { "enabled" } else { "disabled" });
            }
            StreamCommand::Shutdown => {}
        }
    }

    async fn publish(&mut self) {
        let state = self.engine.state();
        let new_samples = match self.last_sent_t {
            Some(t) => state.samples.since(t),
            None => state.samples.to_vec(),
        };
        if let Some(last) = new_samples.last() {
            self.last_sent_t = Some(last.t);
        }

        let frame = LabFrame {
            run_id: state.run_id,
            kind: state.kind,
            status: state.status,
            elapsed_ms: state.elapsed_ms,
            value: state.current_value,
            phase: state.phase,
            baseline: state.baseline(),
            stimuli: state.stimuli().len(),
            fatigue_level: state.fatigue_level(),
            new_samples,
        };

        *self.current_frame.lock().await = Some(frame.clone());
        self.frames_published += 1;
        // no subscribers is fine
        let _ = self.frame_sender.send(frame);
    }
}

/// Helper function to create and start a stream in the background
pub async fn start_experiment_stream(
    config: StreamConfig,
) -> PhysioResult<(broadcast::Receiver<LabFrame>, mpsc::Sender<StreamCommand>)> {
    let mut stream = ExperimentStream::new(config)?;
    let frame_receiver = stream.subscribe();
    let control_sender = stream.control_handle();

    tokio::spawn(async move {
        if let Err(e) = stream.run().await {
            warn!("Experiment stream error: {}", e);
        }
    });

    Ok((frame_receiver, control_sender))
}

/// Send a command to a running stream
pub async fn send_command(
    control: &mpsc::Sender<StreamCommand>,
    command: StreamCommand,
) -> PhysioResult<()> {
    control
        .send(command)
        .await
        .map_err(|_| PhysioError::ChannelClosed { channel: "stream control" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::sleep;

    fn fast_twitch() -> StreamConfig {
        StreamConfig {
            experiment: ExperimentConfig {
                playback_speed: 1.0,
                ..ExperimentConfig::for_kind(ExperimentKind::SimpleTwitch)
            },
            frame_rate: 100.0,
            ..StreamConfig::default()
        }
    }

    fn drain(receiver: &mut broadcast::Receiver<LabFrame>) -> Vec<LabFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = receiver.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_stream_config_validation() {
        assert!(StreamConfig::default().validate().is_ok());
        let bad_rate = StreamConfig {
            frame_rate: 0.0,
            ..StreamConfig::default()
        };
        assert!(bad_rate.validate().is_err());
        let bad_buffer = StreamConfig {
            buffer_size: 0,
            ..StreamConfig::default()
        };
        assert!(bad_buffer.validate().is_err());
    }

    #[tokio::test]
    async fn test_stream_runs_twitch_to_completion() {
        let (mut frames, control) = start_experiment_stream(fast_twitch()).await.unwrap();

        control.send(StreamCommand::Start).await.unwrap();
        sleep(Duration::from_millis(500)).await;

        let received = drain(&mut frames);
        assert!(received.len() >= 3, "only {} frames", received.len());
        assert_eq!(received[0].status, RunStatus::Running);
        assert_eq!(received.last().unwrap().status, RunStatus::Finished);

        let mut previous = f64::NEG_INFINITY;
        for sample in received.iter().flat_map(|frame| frame.new_samples.iter()) {
            assert!(sample.t >= previous);
            previous = sample.t;
        }
        for pair in received.windows(2) {
            assert!(pair[1].elapsed_ms >= pair[0].elapsed_ms);
        }

        control.send(StreamCommand::Shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_takes_effect_before_next_tick() {
        let config = StreamConfig::for_kind(ExperimentKind::Cardiogram);
        let (mut frames, control) = start_experiment_stream(config).await.unwrap();

        control.send(StreamCommand::Start).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        control.send(StreamCommand::Stop).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        let stopped = drain(&mut frames);
        let last = stopped.last().unwrap();
        assert_eq!(last.status, RunStatus::Finished);

        sleep(Duration::from_millis(100)).await;
        assert!(matches!(frames.try_recv(), Err(TryRecvError::Empty)));

        control.send(StreamCommand::Shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_publishes_idle_frame() {
        let config = StreamConfig::for_kind(ExperimentKind::Tetanus);
        let (mut frames, control) = start_experiment_stream(config).await.unwrap();

        control.send(StreamCommand::Start).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        control.send(StreamCommand::Reset).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        let last = drain(&mut frames).pop().unwrap();
        assert_eq!(last.status, RunStatus::Idle);
        assert_eq!(last.elapsed_ms, 0.0);
        assert_eq!(last.stimuli, 0);

        control.send(StreamCommand::Shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_live_controls_reach_engine() {
        let config = StreamConfig::for_kind(ExperimentKind::Cardiogram);
        let stream = ExperimentStream::new(config).unwrap();
        let current = stream.current_frame_handle();
        let mut frames = stream.subscribe();
        let control = stream.control_handle();
        let mut stream = stream;
        let task = tokio::spawn(async move { stream.run().await });

        control
            .send(StreamCommand::UpdateControls(ControlInputs::default().with_temperature(5.0)))
            .await
            .unwrap();
        control.send(StreamCommand::Start).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        let frame = current.lock().await.clone().unwrap();
        assert_eq!(frame.kind, ExperimentKind::Cardiogram);
        assert!(frame.value <= 0.55);
        assert!(!drain(&mut frames).is_empty());

        control.send(StreamCommand::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_command_after_shutdown_reports_closed_channel() {
        let mut stream = ExperimentStream::new(fast_twitch()).unwrap();
        let control = stream.control_handle();
        let task = tokio::spawn(async move { stream.run().await });

        send_command(&control, StreamCommand::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();

        let err = send_command(&control, StreamCommand::Start).await.unwrap_err();
        assert!(matches!(err, PhysioError::ChannelClosed { .. }));
    }
}
