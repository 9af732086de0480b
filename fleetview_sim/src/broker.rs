//! Simulated pub/sub broker with fault injection.
//!
//! One `SimBroker` stands in for the message broker; every tracker gets a
//! `SimTransport` client from it. Delivery is synchronous: a publish lands in
//! each subscriber's inbox before `publish` returns, so the harness decides
//! exactly when the tracker sees it (`SimTransport::drain`).

use async_trait::async_trait;
use fleetview_env::{
    BrokerEndpoint, ClientId, EnvError, InboundMessage, MessageTransport, TransportController,
    TransportEvent,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Delivery counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub published: u64,
    pub delivered: u64,
    /// Lost to injected per-topic loss
    pub dropped: u64,
    pub refused_connects: u64,
    pub dropped_connections: u64,
}

struct ClientLink {
    tx: mpsc::UnboundedSender<TransportEvent>,
    topics: BTreeSet<String>,
    connected: bool,
}

struct BrokerState {
    /// Keyed by client id string for a stable delivery order
    clients: BTreeMap<String, ClientLink>,
    refuse_connects: u32,
    topic_loss: HashMap<String, f64>,
    rng: ChaCha8Rng,
    stats: BrokerStats,
}

/// In-memory broker shared by the harness and its clients.
#[derive(Clone)]
pub struct SimBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl SimBroker {
    /// Creates a broker whose loss decisions are drawn from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                clients: BTreeMap::new(),
                refuse_connects: 0,
                topic_loss: HashMap::new(),
                rng: ChaCha8Rng::seed_from_u64(seed),
                stats: BrokerStats::default(),
            })),
        }
    }

    /// Registers a (not yet connected) client.
    pub fn client(&self, id: ClientId) -> SimTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().clients.insert(
            id.as_str().to_string(),
            ClientLink {
                tx,
                topics: BTreeSet::new(),
                connected: false,
            },
        );
        SimTransport {
            id,
            broker: self.clone(),
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    /// Publishes on behalf of a vehicle. Returns the number of deliveries.
    pub fn publish(&self, topic: &str, payload: &str) -> usize {
        let mut state = self.state.lock().unwrap();
        state.stats.published += 1;
        let loss = state.topic_loss.get(topic).copied().unwrap_or(0.0);

        let BrokerState {
            clients, rng, stats, ..
        } = &mut *state;

        let mut delivered = 0;
        for link in clients.values() {
            if !link.connected || !link.topics.contains(topic) {
                continue;
            }
            if loss > 0.0 && rng.gen::<f64>() < loss {
                stats.dropped += 1;
                continue;
            }
            let event = TransportEvent::Message(InboundMessage::new(topic, payload));
            if link.tx.send(event).is_ok() {
                stats.delivered += 1;
                delivered += 1;
            }
        }
        delivered
    }

    /// Returns a fault-injection handle.
    pub fn controller(&self) -> SimBrokerController {
        SimBrokerController {
            broker: self.clone(),
        }
    }

    pub fn stats(&self) -> BrokerStats {
        self.state.lock().unwrap().stats.clone()
    }

    /// Topics the client is currently subscribed to.
    pub fn subscriptions(&self, id: &ClientId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .clients
            .get(id.as_str())
            .map(|link| link.topics.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// A tracker's connection to the `SimBroker`.
pub struct SimTransport {
    id: ClientId,
    broker: SimBroker,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>>,
}

impl SimTransport {
    /// Takes every event already delivered, without waiting.
    pub fn drain(&self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        if let Ok(mut rx) = self.rx.try_lock() {
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }
        events
    }

    fn with_link<T>(&self, f: impl FnOnce(&mut ClientLink) -> T) -> Option<T> {
        let mut state = self.broker.state.lock().unwrap();
        state.clients.get_mut(self.id.as_str()).map(f)
    }
}

#[async_trait]
impl MessageTransport for SimTransport {
    async fn connect(&self, endpoint: &BrokerEndpoint) -> Result<(), EnvError> {
        let mut state = self.broker.state.lock().unwrap();
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            state.stats.refused_connects += 1;
            return Err(EnvError::connect(format!("{} refused the connection", endpoint.uri)));
        }
        match state.clients.get_mut(self.id.as_str()) {
            Some(link) => {
                link.connected = true;
                debug!(client = %self.id, "client connected");
                Ok(())
            }
            None => Err(EnvError::connect("unknown client")),
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<(), EnvError> {
        self.with_link(|link| {
            if !link.connected {
                return Err(EnvError::NotConnected);
            }
            link.topics.insert(topic.to_string());
            Ok(())
        })
        .unwrap_or(Err(EnvError::TransportClosed))
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), EnvError> {
        if !self.is_connected() {
            return Err(EnvError::NotConnected);
        }
        self.broker.publish(topic, payload);
        Ok(())
    }

    async fn recv(&self) -> Option<TransportEvent> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    async fn disconnect(&self) -> Result<(), EnvError> {
        self.with_link(|link| {
            link.connected = false;
            link.topics.clear();
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.with_link(|link| link.connected).unwrap_or(false)
    }

    fn client_id(&self) -> ClientId {
        self.id.clone()
    }
}

/// Fault injection for the `SimBroker`.
pub struct SimBrokerController {
    broker: SimBroker,
}

impl TransportController for SimBrokerController {
    fn fail_next_connects(&self, count: u32) {
        self.broker.state.lock().unwrap().refuse_connects = count;
    }

    fn drop_connections(&self) {
        let mut state = self.broker.state.lock().unwrap();
        let mut dropped = 0;
        for link in state.clients.values_mut().filter(|link| link.connected) {
            link.connected = false;
            link.topics.clear();
            let _ = link.tx.send(TransportEvent::ConnectionLost {
                reason: "broker dropped the connection".to_string(),
            });
            dropped += 1;
        }
        state.stats.dropped_connections += dropped;
    }

    fn set_topic_loss(&self, topic: &str, loss_rate: f64) {
        self.broker
            .state
            .lock()
            .unwrap()
            .topic_loss
            .insert(topic.to_string(), loss_rate.clamp(0.0, 1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> BrokerEndpoint {
        BrokerEndpoint::new("sim://broker", ClientId::from_seed(1))
    }

    #[tokio::test]
    async fn test_delivery_requires_subscription() {
        let broker = SimBroker::new(0);
        let client = broker.client(ClientId::from_seed(1));

        assert!(matches!(client.subscribe("a").await, Err(EnvError::NotConnected)));
        client.connect(&endpoint()).await.unwrap();
        client.subscribe("a").await.unwrap();

        assert_eq!(broker.publish("a", "1"), 1);
        assert_eq!(broker.publish("b", "2"), 0);

        let events = client.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], TransportEvent::Message(m) if m.payload == "1"));
        assert!(client.drain().is_empty());
    }

    #[tokio::test]
    async fn test_refused_connects() {
        let broker = SimBroker::new(0);
        let client = broker.client(ClientId::from_seed(1));
        broker.controller().fail_next_connects(1);

        assert!(client.connect(&endpoint()).await.is_err());
        assert!(!client.is_connected());
        assert!(client.connect(&endpoint()).await.is_ok());
        assert_eq!(broker.stats().refused_connects, 1);
    }

    #[tokio::test]
    async fn test_drop_connections_notifies_clients() {
        let broker = SimBroker::new(0);
        let client = broker.client(ClientId::from_seed(1));
        client.connect(&endpoint()).await.unwrap();
        client.subscribe("a").await.unwrap();

        broker.controller().drop_connections();

        assert!(!client.is_connected());
        assert!(broker.subscriptions(&client.client_id()).is_empty());
        assert_eq!(broker.publish("a", "late"), 0);
        assert!(matches!(
            client.drain().as_slice(),
            [TransportEvent::ConnectionLost { .. }]
        ));
    }

    #[tokio::test]
    async fn test_topic_loss_is_seeded() {
        let run = |seed| async move {
            let broker = SimBroker::new(seed);
            let client = broker.client(ClientId::from_seed(1));
            client.connect(&endpoint()).await.unwrap();
            client.subscribe("a").await.unwrap();
            broker.controller().set_topic_loss("a", 0.5);
            (0..100).map(|i| broker.publish("a", &i.to_string())).sum::<usize>()
        };

        let first = run(9).await;
        assert_eq!(first, run(9).await);
        assert!(first > 0 && first < 100);
    }

    #[tokio::test]
    async fn test_client_publish_loops_back() {
        let broker = SimBroker::new(0);
        let client = broker.client(ClientId::from_seed(1));
        assert!(matches!(client.publish("a", "x").await, Err(EnvError::NotConnected)));

        client.connect(&endpoint()).await.unwrap();
        client.subscribe("a").await.unwrap();
        client.publish("a", "x").await.unwrap();

        match client.recv().await {
            Some(TransportEvent::Message(m)) => assert_eq!(m.topic, "a"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
