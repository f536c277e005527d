//! Physio-Core: Foundation types for the virtual physiology laboratory
//!
//! Parameter and stimulus types, clamped control inputs, the trace buffer
//! consumed by strip-chart displays, and the error type of the outer surfaces.

pub mod params;
pub mod controls;
pub mod trace;
pub mod error;

pub use params::*;
pub use controls::*;
pub use trace::*;
pub use error::{PhysioError, PhysioResult};
