//! Error handling for the virtual laboratory
//!
//! The simulation core is total over its clamped input domain and never
//! returns these errors. They cover the outer surfaces only: loading
//! configuration, naming experiments and talking to a running stream.

use core::fmt;

/// Result type alias for laboratory operations
pub type PhysioResult<T> = Result<T, PhysioError>;

/// Error type for the laboratory surfaces around the simulation core
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum PhysioError {
    /// Invalid experiment or laboratory configuration
    InvalidConfig {
        /// Description of the configuration error
        reason: String,
    },

    /// Experiment name that does not map to any known experiment
    UnknownExperiment {
        /// Name as supplied by the caller
        name: String,
    },

    /// Serialization/deserialization error
    SerializationError {
        /// Serialization error description
        reason: String,
    },

    /// Reading a configuration source failed
    IoError {
        /// Path or source that failed
        source_name: String,
        /// Underlying error description
        reason: String,
    },

    /// The control or frame channel of a running stream is gone
    ChannelClosed {
        /// Which channel was closed
        channel: &'static str,
    },
}

impl fmt::Display for PhysioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysioError::InvalidConfig { reason } => {
                write!(f, "Invalid configuration: {}", reason)
            }
            PhysioError::UnknownExperiment { name } => {
                write!(f, "Unknown experiment: '{}'", name)
            }
            PhysioError::SerializationError { reason } => {
                write!(f, "Serialization error: {}", reason)
            }
            PhysioError::IoError { source_name, reason } => {
                write!(f, "Failed to read {}: {}", source_name, reason)
            }
            PhysioError::ChannelClosed { channel } => {
                write!(f, "Stream channel closed: {}", channel)
            }
        }
    }
}

impl std::error::Error for PhysioError {}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::PhysioError::InvalidConfig {
            reason: format!($($arg)*),
        }
    };
}
