//! zenoh-backed `MessageTransport`.
//!
//! Each subscription forwards samples into one channel that `recv()` reads,
//! so the tracker sees single and bulk topics on a single ordered stream.
//! A watcher task polls the session's router list and reports
//! `ConnectionLost` on the same channel once the last router is gone.

use async_trait::async_trait;
use fleetview_env::{
    BrokerEndpoint, ClientId, EnvError, InboundMessage, MessageTransport, TransportEvent,
};
use std::future::{Future, IntoFuture};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zenoh::pubsub::Subscriber;
use zenoh::Session;

/// Upper bound on opening a session.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How often the watcher asks the session for its routers.
const ROUTER_POLL: Duration = Duration::from_secs(1);

/// Turns router counts into link events.
///
/// Loss is only reported after at least one router has been seen, and only
/// once.
#[derive(Debug, Default)]
struct RouterWatch {
    seen_router: bool,
    reported: bool,
}

impl RouterWatch {
    fn observe(&mut self, routers: usize) -> Option<TransportEvent> {
        if routers > 0 {
            self.seen_router = true;
            return None;
        }
        if !self.seen_router || self.reported {
            return None;
        }
        self.reported = true;
        Some(TransportEvent::ConnectionLost {
            reason: "no zenoh router reachable".to_string(),
        })
    }
}

/// Runs `open` for at most `limit`.
async fn open_within<T, E, F>(limit: Duration, uri: &str, open: F) -> Result<T, EnvError>
where
    E: std::fmt::Display,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, open).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(EnvError::connect(format!("{}: {}", uri, e))),
        Err(_) => Err(EnvError::Timeout(limit.as_millis() as u64)),
    }
}

/// Polls `session` until the link drops or the transport disconnects.
async fn watch_routers(
    session: Session,
    connected: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut watch = RouterWatch::default();
    let mut ticker = tokio::time::interval(ROUTER_POLL);
    loop {
        ticker.tick().await;
        if !connected.load(Ordering::SeqCst) || session.is_closed() {
            return;
        }
        let routers = session.info().routers_zid().await.count();
        if let Some(event) = watch.observe(routers) {
            warn!("zenoh link lost");
            connected.store(false, Ordering::SeqCst);
            let _ = tx.send(event);
            return;
        }
    }
}

pub struct ZenohTransport {
    client_id: ClientId,
    session: Mutex<Option<Session>>,
    subscribers: Mutex<Vec<Subscriber<()>>>,
    tx: mpsc::UnboundedSender<TransportEvent>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    connected: Arc<AtomicBool>,
}

impl ZenohTransport {
    pub fn new(client_id: ClientId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            client_id,
            session: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            tx,
            rx: tokio::sync::Mutex::new(rx),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn session(&self) -> Result<Session, EnvError> {
        self.session
            .lock()
            .map_err(|_| EnvError::TransportClosed)?
            .clone()
            .ok_or(EnvError::NotConnected)
    }
}

#[async_trait]
impl MessageTransport for ZenohTransport {
    async fn connect(&self, endpoint: &BrokerEndpoint) -> Result<(), EnvError> {
        let mut config = zenoh::Config::default();
        config
            .insert_json5("mode", r#""client""#)
            .map_err(|e| EnvError::connect(e.to_string()))?;
        config
            .insert_json5("connect/endpoints", &format!(r#"["{}"]"#, endpoint.uri))
            .map_err(|e| EnvError::connect(e.to_string()))?;

        let session = open_within(CONNECT_TIMEOUT, &endpoint.uri, zenoh::open(config).into_future()).await?;

        info!(uri = %endpoint.uri, client = %self.client_id, zid = %session.zid(), "zenoh session open");
        if let Ok(mut slot) = self.session.lock() {
            *slot = Some(session.clone());
        }
        self.connected.store(true, Ordering::SeqCst);
        tokio::spawn(watch_routers(session, self.connected.clone(), self.tx.clone()));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), EnvError> {
        let session = self.session()?;
        let tx = self.tx.clone();

        let subscriber = session
            .declare_subscriber(topic)
            .callback(move |sample| {
                let topic = sample.key_expr().as_str().to_string();
                match String::from_utf8(sample.payload().to_bytes().into_owned()) {
                    Ok(payload) => {
                        let message = InboundMessage::new(topic, payload);
                        let _ = tx.send(TransportEvent::Message(message));
                    }
                    Err(e) => warn!(topic = %topic, error = %e, "non-UTF-8 payload dropped"),
                }
            })
            .await
            .map_err(|e| EnvError::subscribe(topic, e))?;

        debug!(topic, "zenoh subscriber declared");
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(subscriber);
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), EnvError> {
        let session = self.session()?;
        session
            .put(topic, payload.to_string())
            .await
            .map_err(|e| EnvError::publish(topic, e))
    }

    async fn recv(&self) -> Option<TransportEvent> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    async fn disconnect(&self) -> Result<(), EnvError> {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.clear();
        }
        let session = self.session.lock().ok().and_then(|mut slot| slot.take());
        self.connected.store(false, Ordering::SeqCst);

        if let Some(session) = session {
            session
                .close()
                .await
                .map_err(|e| EnvError::connect(format!("close: {}", e)))?;
            info!("zenoh session closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn client_id(&self) -> ClientId {
        self.client_id.clone()
    }
}
