//! Tracker Agent - wires a session to a transport, a clock and a surface.
//!
//! Generic over the context and transport implementations, so the same
//! runtime drives a live broker under tokio and an in-memory broker under a
//! virtual clock. Every event is applied on the caller's task; nothing here
//! is shared across threads.

use crate::config::TrackerConfig;
use crate::coordinate::Coordinate;
use crate::diagnostics::DiagnosticKind;
use crate::session::{TrackerSession, UserCommand};
use crate::surface::RenderSurface;
use fleetview_env::{EnvError, FleetViewContext, MessageTransport, TransportEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Broker link as seen by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
    /// The broker dropped us; no automatic reconnect
    Lost,
}

/// A tracker bound to its environment.
pub struct TrackerAgent<Ctx, Tx, S>
where
    Ctx: FleetViewContext,
    Tx: MessageTransport,
    S: RenderSurface,
{
    /// Environment context
    pub context: Arc<Ctx>,

    /// Broker client
    pub transport: Arc<Tx>,

    pub config: TrackerConfig,

    session: TrackerSession,
    surface: S,
    link: LinkState,
}

impl<Ctx, Tx, S> TrackerAgent<Ctx, Tx, S>
where
    Ctx: FleetViewContext,
    Tx: MessageTransport,
    S: RenderSurface,
{
    pub fn new(context: Arc<Ctx>, transport: Arc<Tx>, config: TrackerConfig, surface: S) -> Self {
        let session = TrackerSession::new(&config);
        Self {
            context,
            transport,
            config,
            session,
            surface,
            link: LinkState::Disconnected,
        }
    }

    /// Renders the first frame, connects and subscribes.
    ///
    /// A failed connect is not an error for the caller: it is recorded and
    /// the agent stays usable offline (replay and recenter still work).
    pub async fn start(&mut self) -> LinkState {
        let frame = self.session.bootstrap();
        self.surface.apply_all(&frame);

        if self.connect().await.is_ok() {
            self.subscribe_topics().await;
        }
        self.link
    }

    /// Connects with the configured number of attempts.
    pub async fn connect(&mut self) -> Result<(), EnvError> {
        let endpoint = self.config.endpoint();
        let attempts = self.config.connect_attempts();
        let mut last_error = EnvError::NotConnected;

        for attempt in 1..=attempts {
            match self.transport.connect(&endpoint).await {
                Ok(()) => {
                    info!(uri = %endpoint.uri, client = %endpoint.client_id, attempt, "connected to broker");
                    self.link = LinkState::Connected;
                    return Ok(());
                }
                Err(err) => {
                    let now = self.context.now();
                    self.session.record_diagnostic(
                        DiagnosticKind::ConnectFailed,
                        format!("attempt {}/{} to {}: {}", attempt, attempts, endpoint.uri, err),
                        now,
                    );
                    last_error = err;
                }
            }
        }

        let now = self.context.now();
        self.session.record_diagnostic(
            DiagnosticKind::ConnectRetryExhausted,
            format!("giving up on {} after {} attempts", endpoint.uri, attempts),
            now,
        );
        self.link = LinkState::Disconnected;
        Err(last_error)
    }

    /// Subscribes to the single and bulk topics. Returns how many were accepted.
    ///
    /// Without a connection every topic is rejected with a diagnostic.
    pub async fn subscribe_topics(&mut self) -> usize {
        let topics: Vec<String> = self
            .session
            .ingest()
            .topics()
            .all()
            .iter()
            .map(|t| t.to_string())
            .collect();

        let mut accepted = 0;
        for topic in &topics {
            let result = if self.link == LinkState::Connected {
                self.transport.subscribe(topic).await
            } else {
                Err(EnvError::NotConnected)
            };

            match result {
                Ok(()) => {
                    info!(topic = %topic, "subscribed");
                    accepted += 1;
                }
                Err(err) => {
                    let now = self.context.now();
                    self.session.record_diagnostic(
                        DiagnosticKind::SubscribeRejected,
                        format!("'{}': {}", topic, err),
                        now,
                    );
                }
            }
        }
        accepted
    }

    /// Sends a payload through the agent's transport.
    pub async fn publish(&self, topic: &str, payload: &str) -> Result<(), EnvError> {
        if self.link != LinkState::Connected {
            return Err(EnvError::NotConnected);
        }
        self.transport.publish(topic, payload).await
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        let now = self.context.now();
        match event {
            TransportEvent::Message(message) => {
                let commands = self.session.handle_message(&message, now);
                self.surface.apply_all(&commands);
            }
            TransportEvent::ConnectionLost { reason } => {
                self.link = LinkState::Lost;
                self.session
                    .record_diagnostic(DiagnosticKind::ConnectionLost, reason, now);
            }
        }
    }

    /// Applies a user command. Returns `false` once the agent should stop.
    pub fn handle_command(&mut self, command: UserCommand) -> bool {
        if command == UserCommand::Quit {
            return false;
        }
        let now = self.context.now();
        let commands = self.session.handle_command(command, now);
        self.surface.apply_all(&commands);
        true
    }

    /// Fires due transition completions. Returns the number of surface
    /// commands produced.
    pub fn tick(&mut self) -> usize {
        let now = self.context.now();
        let commands = self.session.advance(now);
        self.surface.apply_all(&commands);
        commands.len()
    }

    /// Replaces the recorded route (e.g. loaded from disk) and redraws it.
    pub fn restore_route(&mut self, points: Vec<Coordinate>) {
        let commands = self.session.restore_route(points);
        self.surface.apply_all(&commands);
    }

    /// Time left until the next transition completion.
    pub fn time_to_next_deadline(&self) -> Option<Duration> {
        self.session
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(self.context.now()))
    }

    /// Event loop: user commands, transport events and transition deadlines
    /// on one task until `Quit`, a closed command channel or a closed
    /// transport. Disconnects on the way out.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<UserCommand>) -> Result<(), EnvError> {
        let context = Arc::clone(&self.context);
        let transport = Arc::clone(&self.transport);

        loop {
            let wait = self.time_to_next_deadline();
            let listening = self.link == LinkState::Connected;

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            info!("quit requested");
                            break;
                        }
                    }
                    None => {
                        debug!("command channel closed");
                        break;
                    }
                },

                event = transport.recv(), if listening => match event {
                    Some(event) => self.handle_transport_event(event),
                    None => {
                        warn!("transport closed");
                        break;
                    }
                },

                _ = sleep_or_park(context.as_ref(), wait) => {
                    self.tick();
                }
            }
        }

        self.shutdown().await
    }

    /// Closes the broker connection if one is held.
    pub async fn shutdown(&mut self) -> Result<(), EnvError> {
        if self.link == LinkState::Disconnected {
            return Ok(());
        }
        self.link = LinkState::Disconnected;
        self.transport.disconnect().await
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    pub fn session(&self) -> &TrackerSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TrackerSession {
        &mut self.session
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}

async fn sleep_or_park<Ctx: FleetViewContext>(context: &Ctx, wait: Option<Duration>) {
    match wait {
        Some(duration) => context.sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Leg;
    use crate::surface::{CameraTarget, StatusReadout};
    use async_trait::async_trait;
    use fleetview_env::{BrokerEndpoint, ClientId, InboundMessage};
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::SystemTime;

    /// Clock that only moves when slept on.
    #[derive(Default)]
    struct ManualContext {
        now: Mutex<Duration>,
    }

    #[async_trait]
    impl FleetViewContext for ManualContext {
        fn now(&self) -> Duration {
            *self.now.lock().unwrap()
        }

        fn system_time(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH + self.now()
        }

        async fn sleep(&self, duration: Duration) {
            *self.now.lock().unwrap() += duration;
        }

        fn spawn<F>(&self, _name: &str, future: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            tokio::spawn(future);
        }

        fn seed(&self) -> u64 {
            0
        }
    }

    /// Replays a fixed list of events, then reports the transport closed.
    #[derive(Default)]
    struct ScriptedTransport {
        refuse_connects: AtomicU32,
        connected: AtomicBool,
        subscriptions: Mutex<Vec<String>>,
        published: Mutex<Vec<(String, String)>>,
        events: Mutex<VecDeque<TransportEvent>>,
        disconnects: AtomicU32,
    }

    impl ScriptedTransport {
        fn push(&self, event: TransportEvent) {
            self.events.lock().unwrap().push_back(event);
        }
    }

    #[async_trait]
    impl MessageTransport for ScriptedTransport {
        async fn connect(&self, endpoint: &BrokerEndpoint) -> Result<(), EnvError> {
            let refused = self.refuse_connects.load(Ordering::SeqCst);
            if refused > 0 {
                self.refuse_connects.store(refused - 1, Ordering::SeqCst);
                return Err(EnvError::connect(format!("{} refused", endpoint.uri)));
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn subscribe(&self, topic: &str) -> Result<(), EnvError> {
            self.subscriptions.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        async fn publish(&self, topic: &str, payload: &str) -> Result<(), EnvError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }

        async fn recv(&self) -> Option<TransportEvent> {
            self.events.lock().unwrap().pop_front()
        }

        async fn disconnect(&self) -> Result<(), EnvError> {
            self.connected.store(false, Ordering::SeqCst);
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn client_id(&self) -> ClientId {
            ClientId("scripted".into())
        }
    }

    #[derive(Default)]
    struct Frames {
        legs: Vec<Leg>,
        cameras: Vec<CameraTarget>,
        statuses: Vec<StatusReadout>,
    }

    impl RenderSurface for Frames {
        fn draw_route(&mut self, _route: &[Coordinate]) {}

        fn begin_leg(&mut self, leg: &Leg) {
            self.legs.push(*leg);
        }

        fn place_marker(&mut self, _position: Coordinate, _rotation: f64) {}

        fn move_camera(&mut self, target: &CameraTarget) {
            self.cameras.push(*target);
        }

        fn show_status(&mut self, status: &StatusReadout) {
            self.statuses.push(*status);
        }
    }

    type TestAgent = TrackerAgent<ManualContext, ScriptedTransport, Frames>;

    fn agent(transport: ScriptedTransport) -> TestAgent {
        TrackerAgent::new(
            Arc::new(ManualContext::default()),
            Arc::new(transport),
            TrackerConfig::default(),
            Frames::default(),
        )
    }

    fn location(lat: f64, lon: f64) -> TransportEvent {
        TransportEvent::Message(InboundMessage::new(
            "Vehicle/Locations",
            format!(r#"{{"latitude":{},"longitude":{}}}"#, lat, lon),
        ))
    }

    #[tokio::test]
    async fn test_start_subscribes_both_topics() {
        let mut agent = agent(ScriptedTransport::default());
        assert_eq!(agent.start().await, LinkState::Connected);

        let subs = agent.transport.subscriptions.lock().unwrap().clone();
        assert_eq!(subs, vec!["Vehicle/Locations", "Vehicle/BulkLocations/214342"]);
        assert!(agent.session().diagnostics().is_empty());
        // Bootstrap frame moved the camera to the initial region
        assert_eq!(agent.surface().cameras.len(), 1);
    }

    #[tokio::test]
    async fn test_connect_retries_once() {
        let transport = ScriptedTransport::default();
        transport.refuse_connects.store(1, Ordering::SeqCst);
        let mut agent = agent(transport);

        assert_eq!(agent.start().await, LinkState::Connected);
        let diags = agent.session().diagnostics();
        assert_eq!(diags.count(DiagnosticKind::ConnectFailed), 1);
        assert_eq!(diags.count(DiagnosticKind::ConnectRetryExhausted), 0);
    }

    #[tokio::test]
    async fn test_connect_gives_up() {
        let transport = ScriptedTransport::default();
        transport.refuse_connects.store(5, Ordering::SeqCst);
        let mut agent = agent(transport);

        assert_eq!(agent.start().await, LinkState::Disconnected);
        let diags = agent.session().diagnostics();
        assert_eq!(diags.count(DiagnosticKind::ConnectFailed), 2);
        assert_eq!(diags.count(DiagnosticKind::ConnectRetryExhausted), 1);
        assert!(agent.transport.subscriptions.lock().unwrap().is_empty());

        // Subscribing offline only leaves diagnostics
        assert_eq!(agent.subscribe_topics().await, 0);
        assert_eq!(agent.session().diagnostics().count(DiagnosticKind::SubscribeRejected), 2);
        assert!(matches!(
            agent.publish("Vehicle/Locations", "{}").await,
            Err(EnvError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connection_lost_keeps_state() {
        let mut agent = agent(ScriptedTransport::default());
        agent.start().await;
        agent.handle_transport_event(location(1.0, 1.0));
        let before = agent.session().snapshot();

        agent.handle_transport_event(TransportEvent::ConnectionLost {
            reason: "broker went away".into(),
        });

        assert_eq!(agent.link(), LinkState::Lost);
        assert_eq!(agent.session().snapshot(), before);
        assert_eq!(agent.session().diagnostics().count(DiagnosticKind::ConnectionLost), 1);
    }

    #[tokio::test]
    async fn test_tick_follows_clock() {
        let mut agent = agent(ScriptedTransport::default());
        agent.start().await;
        agent.handle_transport_event(location(1.0, 0.0));
        agent.handle_transport_event(location(2.0, 0.0));
        assert_eq!(agent.surface().legs.len(), 1);
        assert_eq!(agent.time_to_next_deadline(), Some(Duration::from_millis(300)));

        agent.context.sleep(Duration::from_millis(2000)).await;
        agent.tick();
        assert_eq!(agent.surface().legs.len(), 2);
        assert_eq!(agent.surface().legs[1].from, Coordinate::new(1.0, 0.0));
    }

    #[tokio::test]
    async fn test_run_drains_transport_then_disconnects() {
        let transport = ScriptedTransport::default();
        transport.push(location(1.0, 1.0));
        transport.push(location(2.0, 2.0));
        let mut agent = agent(transport);
        agent.start().await;

        let (_tx, rx) = mpsc::channel(4);
        agent.run(rx).await.unwrap();

        assert_eq!(agent.session().route().len(), 2);
        assert_eq!(agent.link(), LinkState::Disconnected);
        assert_eq!(agent.transport.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_quit() {
        let transport = ScriptedTransport::default();
        transport.push(location(1.0, 1.0));
        let mut agent = agent(transport);
        agent.start().await;

        let (tx, rx) = mpsc::channel(4);
        tx.send(UserCommand::ShowVehicle).await.unwrap();
        tx.send(UserCommand::Quit).await.unwrap();
        agent.run(rx).await.unwrap();

        // Commands win over transport events
        assert_eq!(agent.session().route().len(), 0);
        assert_eq!(agent.surface().cameras.len(), 2);
        assert_eq!(agent.link(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_run_offline_animates_replay() {
        let transport = ScriptedTransport::default();
        transport.refuse_connects.store(2, Ordering::SeqCst);
        let mut agent = agent(transport);
        agent.start().await;
        agent.restore_route(vec![Coordinate::new(1.0, 1.0), Coordinate::new(2.0, 2.0)]);

        let (tx, rx) = mpsc::channel(4);
        tx.send(UserCommand::Replay).await.unwrap();
        // Closed channel ends the loop once the queued command is consumed
        drop(tx);
        agent.run(rx).await.unwrap();

        assert_eq!(agent.surface().legs.len(), 1);
        assert_eq!(agent.session().driver().pending_count(), 1);
    }
}
