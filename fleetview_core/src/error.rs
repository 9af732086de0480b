//! Error types for the tracking core.

use thiserror::Error;

/// Why an inbound location message was dropped.
///
/// Never fatal: the session turns these into diagnostics and leaves the
/// queue, route log and driver untouched.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Payload is not valid JSON, or a location lacks numeric fields
    #[error("invalid location payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Bulk channel payload decoded to something other than an array
    #[error("bulk payload is not an array (found {found})")]
    NotAnArray { found: &'static str },

    /// A location decoded to something other than an object
    #[error("location is not an object (found {found})")]
    NotAnObject { found: &'static str },

    /// The configured coordinate policy refused the value
    #[error("coordinate ({latitude}, {longitude}) is out of range")]
    OutOfRange { latitude: f64, longitude: f64 },

    /// No channel is bound to the topic
    #[error("no channel bound to topic '{0}'")]
    UnroutedTopic(String),
}

/// Configuration loading/validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
