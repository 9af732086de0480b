//! Scenario runner - drives a simulated tracker through each scenario and
//! checks the invariants the tracker must hold.

use crate::broker::SimBroker;
use crate::context::SimContext;
use crate::exporter::SimFrame;
use crate::route_oracle::{bulk_payload, single_payload, RouteOracle, DEFAULT_START};
use crate::scenarios::ScenarioId;
use crate::tracker::SimulatedTracker;

use fleetview_core::{
    AnimationState, CameraTarget, Channel, Coordinate, DiagnosticKind, Leg, LinkState, TopicMap,
    TrackerConfig, UserCommand,
};
use fleetview_env::{ClientId, TransportController};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario name (or `route_replay`)
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether every check held
    pub passed: bool,

    /// Final virtual time in seconds
    pub final_time_secs: f64,

    /// Route log at the end of the run
    pub route: Vec<Coordinate>,

    /// Failed checks, joined
    pub failure_reason: Option<String>,

    pub metrics: ScenarioMetrics,

    /// Sampled frames (empty unless frames were requested)
    pub frames: Vec<SimFrame>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioMetrics {
    pub messages_published: u64,
    pub messages_delivered: u64,
    pub messages_rejected: u64,
    pub legs_started: u64,
    pub legs_completed: u64,
    pub stale_completions: u64,
    pub diagnostics: u64,
    pub max_pending: usize,
    pub replays: u64,
}

/// Runs scenarios.
pub struct ScenarioRunner {
    seed: u64,
    config: TrackerConfig,
    frame_interval: Option<Duration>,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: TrackerConfig::default(),
            frame_interval: None,
        }
    }

    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Samples frames every `interval` of virtual time.
    pub fn with_frames(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        self.block_on(scenario.name(), async {
            match scenario {
                ScenarioId::ChainedLegs => self.run_chained_legs().await,
                ScenarioId::BurstDuringAnimation => self.run_burst_during_animation().await,
                ScenarioId::BulkBackfill => self.run_bulk_backfill().await,
                ScenarioId::MalformedPayloads => self.run_malformed_payloads().await,
                ScenarioId::ReplayMidLeg => self.run_replay_mid_leg().await,
                ScenarioId::DoubleReplay => self.run_double_replay().await,
                ScenarioId::ConnectRetry => self.run_connect_retry().await,
                ScenarioId::ConnectionLost => self.run_connection_lost().await,
            }
        })
    }

    /// Loads a recorded route and plays it back once.
    pub fn replay_route(&self, points: Vec<Coordinate>) -> ScenarioResult {
        info!("Replaying recorded route: {} points (seed={})", points.len(), self.seed);

        self.block_on("route_replay", async {
            let mut h = self.harness(self.seed);
            h.start().await;

            let last = points.last().copied();
            let count = points.len();
            h.tracker.restore_route(points);
            h.tracker.command(UserCommand::Replay);
            h.tracker.settle();

            h.check_single_flight(&h.replay_times());
            h.checks.expect(
                h.tracker.session().driver().legs_completed() as usize == count,
                || format!("expected {} legs, got {}", count, h.tracker.session().driver().legs_completed()),
            );
            if let Some(last) = last {
                h.check_final_position(last);
            }
            h.finish("route_replay", self.seed)
        })
    }

    fn block_on<F>(&self, name: &str, scenario: F) -> ScenarioResult
    where
        F: std::future::Future<Output = ScenarioResult>,
    {
        match tokio::runtime::Builder::new_current_thread().build() {
            Ok(runtime) => runtime.block_on(scenario),
            Err(e) => ScenarioResult {
                scenario: name.to_string(),
                seed: self.seed,
                passed: false,
                final_time_secs: 0.0,
                route: Vec::new(),
                failure_reason: Some(format!("runtime: {}", e)),
                metrics: ScenarioMetrics::default(),
                frames: Vec::new(),
            },
        }
    }

    fn harness(&self, seed: u64) -> Harness {
        Harness::new(seed, &self.config, self.frame_interval)
    }

    fn leg_time(&self) -> Duration {
        Duration::from_millis(self.config.move_duration_ms)
    }

    /// Fixes arrive slower than a leg takes.
    async fn run_chained_legs(&self) -> ScenarioResult {
        let mut h = self.harness(self.seed);
        h.start().await;

        let n = h.oracle.pick_count(4, 8);
        let gap = self.leg_time() + Duration::from_millis(500);
        for i in 0..n {
            h.tracker.run_until(gap * i as u32);
            let fix = h.oracle.step(Duration::from_secs(2));
            h.send_single(fix);
        }
        h.tracker.settle();

        let emitted = h.oracle.emitted().to_vec();
        h.check_route(&emitted);
        h.check_leg_targets(&emitted);
        h.check_single_flight(&[]);
        h.checks.expect(h.tracker.max_pending() == 0, || {
            format!("queue should never build up, saw {}", h.tracker.max_pending())
        });
        h.checks.expect(h.tracker.session().diagnostics().is_empty(), || {
            "unexpected diagnostics".to_string()
        });
        h.check_final_position(h.oracle.position());
        h.finish(ScenarioId::ChainedLegs.name(), self.seed)
    }

    /// Fixes queue up behind the leg in flight.
    async fn run_burst_during_animation(&self) -> ScenarioResult {
        let mut h = self.harness(self.seed);
        h.start().await;

        let first = h.oracle.step(Duration::from_secs(1));
        h.send_single(first);
        h.tracker.run_until(Duration::from_millis(500));
        let in_flight = h.tracker.session().driver().in_flight().map(|leg| leg.id);

        let k = h.oracle.pick_count(3, 10);
        for fix in h.oracle.route(k, Duration::from_secs(1)) {
            h.send_single(fix);
        }
        h.tracker.run_until(Duration::from_millis(600));

        let driver = h.tracker.session().driver();
        h.checks.expect(driver.pending_count() == k, || {
            format!("expected {} pending, got {}", k, driver.pending_count())
        });
        h.checks.expect(driver.in_flight().map(|leg| leg.id) == in_flight, || {
            "burst interrupted the leg in flight".to_string()
        });

        let end = h.tracker.settle();
        let emitted = h.oracle.emitted().to_vec();
        h.check_leg_targets(&emitted);
        h.check_single_flight(&[]);
        h.checks.expect(end == self.leg_time() * (k as u32 + 1), || {
            format!("burst should take {} legs back to back, ended at {:?}", k + 1, end)
        });
        h.check_final_position(h.oracle.position());
        h.finish(ScenarioId::BurstDuringAnimation.name(), self.seed)
    }

    /// A bulk array followed by live fixes.
    async fn run_bulk_backfill(&self) -> ScenarioResult {
        let mut h = self.harness(self.seed);
        h.start().await;

        let count = h.oracle.pick_count(5, 15);
        let backfill = h.oracle.route(count, Duration::from_secs(5));
        h.send_bulk(&backfill);

        let live = h.oracle.pick_count(2, 5);
        for i in 0..live {
            h.tracker.run_until(Duration::from_millis(1000 + 300 * i as u64));
            let fix = h.oracle.step(Duration::from_secs(1));
            h.send_single(fix);
        }
        h.tracker.settle();

        let emitted = h.oracle.emitted().to_vec();
        h.check_route(&emitted);
        h.check_leg_targets(&emitted);
        h.check_single_flight(&[]);
        let first_from = h.tracker.leg_log().first().map(|(_, leg)| leg.from);
        h.checks.expect(first_from == Some(Coordinate::ORIGIN), || {
            format!("first leg should start at the origin, got {:?}", first_from)
        });
        h.check_final_position(h.oracle.position());
        h.finish(ScenarioId::BulkBackfill.name(), self.seed)
    }

    /// Garbage on both channels between valid fixes.
    async fn run_malformed_payloads(&self) -> ScenarioResult {
        let mut h = self.harness(self.seed);
        h.start().await;

        let n = h.oracle.pick_count(4, 8);
        let mut bad_single = 0;
        let mut bad_bulk = 0;
        for i in 0..n {
            h.tracker.run_until(Duration::from_millis(700 * i as u64));
            let fix = h.oracle.step(Duration::from_secs(1));
            h.send_single(fix);
            h.tracker.pump();

            let mut channels = vec![Channel::Single];
            if i % 2 == 0 {
                channels.push(Channel::Bulk);
            }
            for channel in channels {
                let payload = h.oracle.malformed_payload(channel);
                let before = h.tracker.session().snapshot();
                h.send_raw(channel, &payload);
                h.tracker.pump();
                let after = h.tracker.session().snapshot();
                h.checks.expect(before == after, || {
                    format!("{} payload {:?} changed tracker state", channel, payload)
                });
                match channel {
                    Channel::Single => bad_single += 1,
                    Channel::Bulk => bad_bulk += 1,
                }
            }
        }
        h.tracker.settle();

        let emitted = h.oracle.emitted().to_vec();
        h.check_route(&emitted);
        h.check_leg_targets(&emitted);

        let diagnostics = h.tracker.session().diagnostics();
        let single_failures = diagnostics.count(DiagnosticKind::DecodeFailed(Channel::Single));
        let bulk_failures = diagnostics.count(DiagnosticKind::DecodeFailed(Channel::Bulk));
        h.checks.expect(single_failures == bad_single && bulk_failures == bad_bulk, || {
            format!(
                "expected {}/{} decode failures, recorded {}/{}",
                bad_single, bad_bulk, single_failures, bulk_failures
            )
        });
        h.check_final_position(h.oracle.position());
        h.finish(ScenarioId::MalformedPayloads.name(), self.seed)
    }

    /// Replay while the second leg is halfway.
    async fn run_replay_mid_leg(&self) -> ScenarioResult {
        let mut h = self.harness(self.seed);
        h.start().await;

        let count = h.oracle.pick_count(3, 6);
        let route = h.oracle.route(count, Duration::from_secs(3));
        h.send_bulk(&route);

        let replay_at = self.leg_time() + self.leg_time() / 2;
        h.tracker.run_until(replay_at);
        h.tracker.command(UserCommand::Replay);

        let camera = h.tracker.surface().last_camera().copied();
        h.checks.expect(camera == Some(CameraTarget::focused(route[0])), || {
            format!("replay should focus the first point, camera at {:?}", camera)
        });
        let bearing = h.tracker.session().driver().current_bearing();
        h.checks.expect(bearing == 0.0, || format!("bearing {} after replay", bearing));

        let end = h.tracker.settle();

        let expected = route.clone();
        let replayed: Vec<Coordinate> = legs_since(h.tracker.leg_log(), replay_at)
            .map(|leg| leg.to)
            .collect();
        h.checks.expect(same_points(&replayed, &expected), || {
            format!("replay played {:?}, expected {:?}", replayed, expected)
        });
        h.check_single_flight(&[replay_at]);
        h.check_route(&route);
        h.checks.expect(h.tracker.session().driver().stale_completions() == 0, || {
            "the replaced leg still completed".to_string()
        });
        h.checks.expect(end == replay_at + self.leg_time() * count as u32, || {
            format!("replay ended at {:?}", end)
        });
        h.check_final_position(route[count - 1]);
        h.finish(ScenarioId::ReplayMidLeg.name(), self.seed)
    }

    /// Replay twice after the route settled.
    async fn run_double_replay(&self) -> ScenarioResult {
        let mut h = self.harness(self.seed);
        h.start().await;

        let count = h.oracle.pick_count(3, 6);
        let route = h.oracle.route(count, Duration::from_secs(3));
        h.send_bulk(&route);
        h.tracker.settle();

        let mut playbacks = Vec::new();
        for _ in 0..2 {
            let start = h.tracker.now();
            h.tracker.command(UserCommand::Replay);
            let end = h.tracker.settle();
            let targets: Vec<Coordinate> = legs_since(h.tracker.leg_log(), start)
                .map(|leg| leg.to)
                .collect();
            playbacks.push((targets, end - start, h.tracker.session().snapshot()));
        }

        let (first, second) = (&playbacks[0], &playbacks[1]);
        h.checks.expect(first.0 == second.0, || {
            format!("leg sequences differ: {:?} vs {:?}", first.0, second.0)
        });
        h.checks.expect(first.1 == second.1, || {
            format!("playback durations differ: {:?} vs {:?}", first.1, second.1)
        });
        h.checks.expect(first.2 == second.2, || "final states differ".to_string());
        h.checks.expect(first.2.state == AnimationState::Idle, || "still animating".to_string());
        let replays = h.replay_times();
        h.check_single_flight(&replays);
        h.check_route(&route);
        h.finish(ScenarioId::DoubleReplay.name(), self.seed)
    }

    /// One refused connect is retried; a dead broker leaves the tracker offline.
    async fn run_connect_retry(&self) -> ScenarioResult {
        let mut h = self.harness(self.seed);
        h.broker.controller().fail_next_connects(1);
        let link = h.start().await;

        let diagnostics = h.tracker.session().diagnostics();
        h.checks.expect(link == LinkState::Connected, || format!("link {:?} after retry", link));
        h.checks.expect(
            diagnostics.count(DiagnosticKind::ConnectFailed) == 1
                && diagnostics.count(DiagnosticKind::ConnectRetryExhausted) == 0,
            || "expected exactly one failed attempt".to_string(),
        );
        let subscriptions = h.broker.subscriptions(&h.client);
        h.checks.expect(subscriptions.len() == 2, || {
            format!("expected both topics subscribed, got {:?}", subscriptions)
        });

        let fix = h.oracle.step(Duration::from_secs(1));
        h.send_single(fix);
        h.tracker.settle();
        h.check_final_position(fix);

        // A broker that refuses every attempt
        let mut offline = self.harness(self.seed.wrapping_add(1));
        offline.broker.controller().fail_next_connects(u32::MAX);
        let link = offline.start().await;
        let accepted = offline.tracker.subscribe().await;
        let delivered = offline.send_single(fix);

        let diagnostics = offline.tracker.session().diagnostics();
        let attempts = self.config.connect_attempts() as usize;
        h.checks.expect(link == LinkState::Disconnected, || format!("offline link {:?}", link));
        h.checks.expect(diagnostics.count(DiagnosticKind::ConnectFailed) == attempts, || {
            format!(
                "expected {} failed attempts, got {}",
                attempts,
                diagnostics.count(DiagnosticKind::ConnectFailed)
            )
        });
        h.checks.expect(diagnostics.count(DiagnosticKind::ConnectRetryExhausted) == 1, || {
            "retry exhaustion not reported".to_string()
        });
        h.checks.expect(
            accepted == 0 && diagnostics.count(DiagnosticKind::SubscribeRejected) == 2,
            || "offline subscribe should be rejected per topic".to_string(),
        );
        h.checks.expect(delivered == 0 && offline.tracker.session().route().is_empty(), || {
            "offline tracker received a fix".to_string()
        });

        h.finish(ScenarioId::ConnectRetry.name(), self.seed)
    }

    /// Broker drops the connection while a bulk route animates.
    async fn run_connection_lost(&self) -> ScenarioResult {
        let mut h = self.harness(self.seed);
        h.start().await;

        let count = h.oracle.pick_count(3, 6);
        let route = h.oracle.route(count, Duration::from_secs(3));
        h.send_bulk(&route);
        h.tracker.run_until(Duration::from_millis(1000));

        let before = h.tracker.session().snapshot();
        h.broker.controller().drop_connections();
        h.tracker.note("broker dropped connections");
        h.tracker.pump();
        let after = h.tracker.session().snapshot();

        let link = h.tracker.link();
        h.checks.expect(link == LinkState::Lost, || format!("link {:?} after drop", link));
        h.checks.expect(before == after, || "connection loss changed tracker state".to_string());
        h.checks.expect(
            h.tracker.session().diagnostics().count(DiagnosticKind::ConnectionLost) == 1,
            || "connection loss not reported".to_string(),
        );

        let late = h.oracle.step(Duration::from_secs(1));
        let delivered = h.send_single(late);
        h.checks.expect(delivered == 0, || "fix delivered after the drop".to_string());

        h.tracker.settle();
        h.check_route(&route);
        h.check_leg_targets(&route);
        h.check_final_position(route[count - 1]);
        h.finish(ScenarioId::ConnectionLost.name(), self.seed)
    }
}

/// One tracker, its broker and the vehicle feeding it.
struct Harness {
    broker: SimBroker,
    client: ClientId,
    tracker: SimulatedTracker,
    oracle: RouteOracle,
    topics: TopicMap,
    move_duration: Duration,
    checks: Checks,
}

impl Harness {
    fn new(seed: u64, config: &TrackerConfig, frames: Option<Duration>) -> Self {
        let context = SimContext::shared(seed);
        let broker = SimBroker::new(context.derive_seed());
        let oracle = RouteOracle::new(context.derive_seed(), DEFAULT_START);
        let client = ClientId::from_seed(context.derive_seed());

        let mut config = config.clone();
        config.client_id = Some(client.to_string());
        let topics = config.topics();
        let move_duration = config.timing().move_duration;

        let transport = Arc::new(broker.client(client.clone()));
        let mut tracker = SimulatedTracker::new(context, transport, config);
        if let Some(interval) = frames {
            tracker = tracker.with_frames(interval);
        }

        Self {
            broker,
            client,
            tracker,
            oracle,
            topics,
            move_duration,
            checks: Checks::default(),
        }
    }

    async fn start(&mut self) -> LinkState {
        self.tracker.start().await
    }

    fn send_single(&mut self, fix: Coordinate) -> usize {
        self.send_raw(Channel::Single, &single_payload(fix))
    }

    fn send_bulk(&mut self, fixes: &[Coordinate]) -> usize {
        self.send_raw(Channel::Bulk, &bulk_payload(fixes))
    }

    fn send_raw(&mut self, channel: Channel, payload: &str) -> usize {
        let topic = match channel {
            Channel::Single => self.topics.single(),
            Channel::Bulk => self.topics.bulk(),
        };
        let delivered = self.broker.publish(topic, payload);
        debug!(%channel, delivered, "vehicle published");
        self.tracker.note(format!("published on {}", topic));
        delivered
    }

    fn replay_times(&self) -> Vec<Duration> {
        let session = self.tracker.session();
        // Replays start a leg from the first route point at bearing 0
        match session.route().first() {
            Some(first) => self
                .tracker
                .leg_log()
                .iter()
                .filter(|(_, leg)| leg.from == first && leg.to == first && leg.rotation_from == 0.0)
                .map(|(at, _)| *at)
                .collect(),
            None => Vec::new(),
        }
    }

    /// No leg may begin before the previous one had its full move duration,
    /// and each leg starts where the previous one ended. Replays restart the
    /// chain.
    fn check_single_flight(&mut self, replays: &[Duration]) {
        let log = self.tracker.leg_log().to_vec();
        for pair in log.windows(2) {
            let ((prev_at, prev), (at, leg)) = (pair[0], pair[1]);
            if replays.contains(&at) {
                continue;
            }
            self.checks.expect(at >= prev_at + self.move_duration, || {
                format!("{} began at {:?}, {} still moving", leg.id, at, prev.id)
            });
            self.checks.expect(leg.from == prev.to, || {
                format!("{} starts at {} but {} ended at {}", leg.id, leg.from, prev.id, prev.to)
            });
        }
    }

    fn check_route(&mut self, expected: &[Coordinate]) {
        let route = self.tracker.session().route().snapshot();
        self.checks.expect(same_points(&route, expected), || {
            format!("route log has {} points, expected {}", route.len(), expected.len())
        });
    }

    fn check_leg_targets(&mut self, expected: &[Coordinate]) {
        let targets: Vec<Coordinate> = self.tracker.leg_log().iter().map(|(_, leg)| leg.to).collect();
        self.checks.expect(same_points(&targets, expected), || {
            format!("legs went to {:?}, expected {:?}", targets, expected)
        });
    }

    fn check_final_position(&mut self, expected: Coordinate) {
        let driver = self.tracker.session().driver();
        let position = driver.current_position();
        self.checks.expect(same_points(&[position], &[expected]), || {
            format!("vehicle settled at {}, expected {}", position, expected)
        });
        self.checks.expect(driver.state() == AnimationState::Idle && driver.pending_count() == 0, || {
            "tracker did not drain".to_string()
        });
    }

    fn finish(mut self, scenario: &str, seed: u64) -> ScenarioResult {
        let session = self.tracker.session();
        let stats = session.stats();
        let broker = self.broker.stats();

        let metrics = ScenarioMetrics {
            messages_published: broker.published,
            messages_delivered: broker.delivered,
            messages_rejected: stats.messages_rejected,
            legs_started: stats.legs_started,
            legs_completed: session.driver().legs_completed(),
            stale_completions: session.driver().stale_completions(),
            diagnostics: session.diagnostics().total_recorded(),
            max_pending: self.tracker.max_pending(),
            replays: stats.replays,
        };
        let route = session.route().snapshot();
        let final_time_secs = self.tracker.now().as_secs_f64();
        let failure_reason = self.checks.failure();

        if let Some(reason) = &failure_reason {
            debug!(scenario, seed, reason = %reason, "checks failed");
        }

        ScenarioResult {
            scenario: scenario.to_string(),
            seed,
            passed: failure_reason.is_none(),
            final_time_secs,
            route,
            failure_reason,
            metrics,
            frames: self.tracker.take_frames(),
        }
    }
}

/// Collected check failures.
#[derive(Debug, Default)]
struct Checks {
    failures: Vec<String>,
}

impl Checks {
    fn expect(&mut self, ok: bool, describe: impl FnOnce() -> String) {
        if !ok {
            self.failures.push(describe());
        }
    }

    fn failure(&self) -> Option<String> {
        if self.failures.is_empty() {
            None
        } else {
            Some(self.failures.join("; "))
        }
    }
}

fn legs_since(log: &[(Duration, Leg)], since: Duration) -> impl Iterator<Item = &Leg> {
    log.iter().filter(move |(at, _)| *at >= since).map(|(_, leg)| leg)
}

/// Element-wise equality up to JSON float round-off.
fn same_points(a: &[Coordinate], b: &[Coordinate]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            (x.latitude - y.latitude).abs() < 1e-9 && (x.longitude - y.longitude).abs() < 1e-9
        })
}
