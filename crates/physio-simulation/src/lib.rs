//! Physio-Simulation: experiment engine for the virtual physiology laboratory
//!
//! Closed-form twitch and heart-beat waveforms, the mapping from control
//! panel values to twitch parameters, stimulus trains with summation and
//! fatigue, the generic run engine and a tokio stream that drives it in
//! real time.

pub mod waveform;
pub mod resolver;
pub mod scheduler;
pub mod engine;
pub mod real_time_stream;

pub use waveform::*;
pub use resolver::*;
pub use scheduler::*;
pub use engine::*;
pub use real_time_stream::*;
