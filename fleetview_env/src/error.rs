//! Error types for the FleetView environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Broker connection could not be established
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Operation requires a connected client
    #[error("Client not connected")]
    NotConnected,

    /// Broker refused or failed a subscription
    #[error("Subscribe to '{topic}' failed: {reason}")]
    SubscribeFailed { topic: String, reason: String },

    /// Publish could not be delivered to the broker
    #[error("Publish to '{topic}' failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// The transport was shut down
    #[error("Transport closed")]
    TransportClosed,

    /// Connect did not finish in time
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a connect error.
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::ConnectFailed(msg.into())
    }

    /// Creates a subscribe error.
    pub fn subscribe(topic: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SubscribeFailed {
            topic: topic.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a publish error.
    pub fn publish(topic: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::PublishFailed {
            topic: topic.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EnvError::subscribe("Vehicle/Locations", "not authorized");
        assert_eq!(
            err.to_string(),
            "Subscribe to 'Vehicle/Locations' failed: not authorized"
        );
        assert_eq!(EnvError::NotConnected.to_string(), "Client not connected");
        assert_eq!(EnvError::connect("refused").to_string(), "Connect failed: refused");
        assert_eq!(EnvError::Timeout(5000).to_string(), "Timeout after 5000ms");
    }
}
