//! Common types for the FleetView environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier a tracker presents to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    /// Creates a new random ClientId (`fleetview-` + 8 hex chars).
    pub fn random() -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        Self(format!("fleetview-{}", &uuid[..8]))
    }

    /// Creates a deterministic ClientId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        Self(format!("fleetview-sim-{:016x}", seed))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::random()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerEndpoint {
    /// Broker locator, e.g. `tcp/127.0.0.1:7447`
    pub uri: String,

    /// Identity presented to the broker
    pub client_id: ClientId,
}

impl BrokerEndpoint {
    pub fn new(uri: impl Into<String>, client_id: ClientId) -> Self {
        Self {
            uri: uri.into(),
            client_id,
        }
    }
}

/// A raw text payload delivered on a subscribed topic.
///
/// The payload is opaque here; decoding into coordinates happens in the
/// ingestion adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Topic the payload was published on
    pub topic: String,

    /// Raw payload text
    pub payload: String,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Something the transport has to tell its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A payload arrived on a subscribed topic
    Message(InboundMessage),

    /// The broker connection dropped
    ConnectionLost { reason: String },
}
