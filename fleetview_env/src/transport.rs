//! Publish/subscribe transport abstraction for the FleetView tracker.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{BrokerEndpoint, ClientId, TransportEvent};

/// Abstraction for the message channel that delivers vehicle locations.
///
/// # Implementations
///
/// - **Production**: Wraps a zenoh session (see the `fleetview-agent` binary)
/// - **Simulation**: In-memory broker with injectable connect failures,
///   connection drops and per-topic loss
///
/// # Message Flow
///
/// ```text
/// Vehicle                    Broker                    Tracker
///   |                          |                          |
///   |-- publish(topic, json) ->|                          |
///   |                          |-- [subscribed topic] --->|
///   |                          |                          |-- recv() -> Message
/// ```
#[async_trait]
pub trait MessageTransport: Send + Sync + 'static {
    /// Opens a connection to the broker.
    ///
    /// # Returns
    /// * `Ok(())` - Connected; subscriptions may now be declared
    /// * `Err(EnvError::ConnectFailed)` - The broker could not be reached
    async fn connect(&self, endpoint: &BrokerEndpoint) -> Result<(), EnvError>;

    /// Subscribes to a topic. Messages on it are delivered through `recv()`.
    ///
    /// # Returns
    /// * `Err(EnvError::NotConnected)` - Called before `connect()` succeeded
    /// * `Err(EnvError::SubscribeFailed)` - Broker rejected the subscription
    async fn subscribe(&self, topic: &str) -> Result<(), EnvError>;

    /// Publishes a text payload on a topic.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), EnvError>;

    /// Receives the next transport event.
    ///
    /// # Returns
    /// * `Some(TransportEvent::Message)` - A payload arrived on a subscribed topic
    /// * `Some(TransportEvent::ConnectionLost)` - The connection dropped
    /// * `None` - The transport was shut down
    async fn recv(&self) -> Option<TransportEvent>;

    /// Closes the broker connection. Closing an unconnected client is a no-op.
    async fn disconnect(&self) -> Result<(), EnvError>;

    /// Returns whether the client currently holds a connection.
    fn is_connected(&self) -> bool;

    /// Returns this client's ID.
    fn client_id(&self) -> ClientId;
}

/// Marker trait for transport controllers in simulation.
///
/// Allows injecting faults like refused connects and connection drops.
pub trait TransportController: Send + Sync {
    /// Makes the next `count` connect attempts fail.
    fn fail_next_connects(&self, count: u32);

    /// Drops every live connection; clients observe `ConnectionLost`.
    fn drop_connections(&self);

    /// Sets message loss probability for a topic (0.0 - 1.0).
    fn set_topic_loss(&self, topic: &str, loss_rate: f64);
}
