//! Unified error handling for counter-warden
//!
//! Every failure the coordinator can meet is classified here so callers can
//! decide between aborting the process and logging-then-continuing.

use std::io;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum WardenError {
    /// The shared record could not be created or attached. Fatal.
    #[error("Shared segment '{name}' unavailable: {message}")]
    SegmentUnavailable {
        name: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A worker process could not be launched. Retried on the next tick.
    #[error("Failed to spawn {role} worker: {source}")]
    SpawnFailed {
        role: String,
        #[source]
        source: io::Error,
    },

    /// The liveness of a pid could not be determined.
    #[error("Liveness check for pid {pid} inconclusive: {message}")]
    LivenessInconclusive { pid: u32, message: String },

    /// The cross-process mutex refused to lock or unlock.
    #[error("Shared lock error ({operation}): {message}")]
    Lock { message: String, operation: String },

    /// Operator typed something the console does not understand.
    #[error("Invalid command '{input}': {message}")]
    InvalidCommand { input: String, message: String },

    /// Settings could not be loaded or failed validation
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A background thread could not be started
    #[error("Failed to start thread '{name}': {source}")]
    Thread {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for convenience
pub type WardenResult<T> = Result<T, WardenError>;

impl WardenError {
    pub fn config(message: impl Into<String>) -> Self {
        WardenError::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn invalid_command(input: impl Into<String>, message: impl Into<String>) -> Self {
        WardenError::InvalidCommand {
            input: input.into(),
            message: message.into(),
        }
    }

    pub fn segment(name: impl Into<String>, message: impl Into<String>) -> Self {
        WardenError::SegmentUnavailable {
            name: name.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn lock(operation: impl Into<String>, message: impl Into<String>) -> Self {
        WardenError::Lock {
            message: message.into(),
            operation: operation.into(),
        }
    }

    /// Only an unavailable segment (and broken settings, which prevent
    /// reaching the segment at all) stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WardenError::SegmentUnavailable { .. } | WardenError::Config { .. }
        )
    }

    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Short text suitable for the operator console.
    pub fn user_message(&self) -> String {
        match self {
            WardenError::InvalidCommand { message, .. } => {
                format!("{message}. Type 'help' for help.")
            }
            WardenError::SegmentUnavailable { name, .. } => format!(
                "Shared memory '{name}' is not available. Is another instance being torn down?"
            ),
            other => other.to_string(),
        }
    }
}

impl From<config::ConfigError> for WardenError {
    fn from(value: config::ConfigError) -> Self {
        WardenError::Config {
            message: value.to_string(),
            source: Some(Box::new(value)),
        }
    }
}
