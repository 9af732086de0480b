//! Tracker Session - the single execution context everything runs on.
//!
//! Inbound messages, user commands and transition completions are three
//! kinds of events interleaving on one thread. The session owns the queue
//! (inside the driver), the route log and the transition clock, applies each
//! event in turn, and answers with the `SurfaceCommand`s to render. It never
//! blocks and never reads a clock itself: callers pass `now`.
//!
//! ```text
//!  InboundMessage ─► IngestionAdapter ─┬─► RouteLog.append_all
//!                                      └─► Driver.enqueue_all ─► rearm ─► BeginLeg
//!  TransitionClock ─► advance(now) ─► Driver.complete_leg ─► (next leg)
//!  UserCommand ─► PlaybackController ─► replay / recenter
//! ```

use crate::animation::{AnimationDriver, AnimationState, Leg, LegOutcome};
use crate::clock::{TransitionClock, TransitionKind};
use crate::config::TrackerConfig;
use crate::coordinate::Coordinate;
use crate::diagnostics::{DiagnosticKind, DiagnosticLog};
use crate::ingest::IngestionAdapter;
use crate::playback::PlaybackController;
use crate::route::RouteLog;
use crate::surface::{CameraTarget, StatusReadout, SurfaceCommand};
use fleetview_env::InboundMessage;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Named user actions ("Replay", "Show Vehicle" buttons).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Replay,
    ShowVehicle,
    /// Stop the runtime loop
    Quit,
}

impl FromStr for UserCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replay" | "r" => Ok(UserCommand::Replay),
            "show" | "show vehicle" | "recenter" | "s" => Ok(UserCommand::ShowVehicle),
            "quit" | "exit" | "q" => Ok(UserCommand::Quit),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

/// Counters kept over the session's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub messages_accepted: u64,
    pub messages_rejected: u64,
    pub coordinates_ingested: u64,
    pub legs_started: u64,
    pub replays: u64,
}

/// Point-in-time copy of everything a message may mutate.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub route: Vec<Coordinate>,
    pub pending: Vec<Coordinate>,
    pub state: AnimationState,
    pub in_flight: Option<Leg>,
    pub position: Coordinate,
    pub bearing: f64,
    pub marker_rotation: f64,
}

/// Owns the tracking state of one vehicle view.
pub struct TrackerSession {
    driver: AnimationDriver,
    route: RouteLog,
    ingest: IngestionAdapter,
    playback: PlaybackController,
    clock: TransitionClock,
    diagnostics: DiagnosticLog,
    initial_region: CameraTarget,
    leg_started_at: Option<Duration>,
    stats: SessionStats,
}

impl TrackerSession {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            driver: AnimationDriver::new(config.timing()),
            route: RouteLog::new(),
            ingest: IngestionAdapter::new(config.topics(), config.coordinate_policy),
            playback: PlaybackController::new(),
            clock: TransitionClock::new(),
            diagnostics: DiagnosticLog::new(config.diagnostics_capacity),
            initial_region: config.initial_region,
            leg_started_at: None,
            stats: SessionStats::default(),
        }
    }

    /// First frame: initial camera, (empty) route, marker and readout.
    pub fn bootstrap(&self) -> Vec<SurfaceCommand> {
        vec![
            SurfaceCommand::MoveCamera(self.initial_region),
            SurfaceCommand::DrawRoute(self.route.snapshot()),
            SurfaceCommand::PlaceMarker {
                position: self.driver.current_position(),
                rotation: self.driver.marker_rotation(),
            },
            SurfaceCommand::ShowStatus(self.status()),
        ]
    }

    /// Applies a transport message. Undecodable messages only leave a
    /// diagnostic behind.
    pub fn handle_message(&mut self, message: &InboundMessage, now: Duration) -> Vec<SurfaceCommand> {
        let channel = match self.ingest.route(&message.topic) {
            Ok(channel) => channel,
            Err(err) => {
                self.stats.messages_rejected += 1;
                self.diagnostics
                    .record(DiagnosticKind::UnroutedTopic, err.to_string(), now);
                return Vec::new();
            }
        };

        let coordinates = match self.ingest.decode(channel, &message.payload) {
            Ok(coordinates) => coordinates,
            Err(err) => {
                self.stats.messages_rejected += 1;
                self.diagnostics.record(
                    DiagnosticKind::DecodeFailed(channel),
                    format!("dropped {} payload on '{}': {}", channel, message.topic, err),
                    now,
                );
                return Vec::new();
            }
        };

        self.stats.messages_accepted += 1;
        self.stats.coordinates_ingested += coordinates.len() as u64;
        debug!(%channel, count = coordinates.len(), "locations received");

        self.route.append_all(&coordinates);
        self.driver.enqueue_all(&coordinates);

        let mut commands = vec![SurfaceCommand::DrawRoute(self.route.snapshot())];
        self.rearm(now, &mut commands);
        commands.push(SurfaceCommand::ShowStatus(self.status()));
        commands
    }

    /// Applies a user command.
    pub fn handle_command(&mut self, command: UserCommand, now: Duration) -> Vec<SurfaceCommand> {
        match command {
            UserCommand::Replay => self.replay(now),
            UserCommand::ShowVehicle => {
                vec![SurfaceCommand::MoveCamera(self.playback.recenter(&self.driver))]
            }
            UserCommand::Quit => Vec::new(),
        }
    }

    /// Fires every transition completion due at `now`.
    ///
    /// Each follow-up leg starts at the deadline of the leg before it, so a
    /// late poll does not stretch the chain.
    pub fn advance(&mut self, now: Duration) -> Vec<SurfaceCommand> {
        let mut commands = Vec::new();
        while let Some(done) = self.clock.pop_due(now) {
            match done.kind {
                TransitionKind::Rotation => trace!(leg = %done.leg, "rotation settled"),
                TransitionKind::Position => {
                    let rotation = self
                        .driver
                        .in_flight()
                        .map(|leg| leg.rotation_to)
                        .unwrap_or_else(|| self.driver.marker_rotation());

                    match self.driver.complete_leg(done.leg) {
                        LegOutcome::Settled { next } => {
                            self.leg_started_at = None;
                            commands.push(SurfaceCommand::PlaceMarker {
                                position: self.driver.current_position(),
                                rotation,
                            });
                            if let Some(leg) = next {
                                self.start_leg(leg, done.deadline, &mut commands);
                            }
                            commands.push(SurfaceCommand::ShowStatus(self.status()));
                        }
                        LegOutcome::Stale => {}
                    }
                }
            }
        }
        commands
    }

    /// Replaces the route log wholesale (e.g. a recorded route loaded from
    /// disk). The animation is untouched until the next replay.
    pub fn restore_route(&mut self, points: Vec<Coordinate>) -> Vec<SurfaceCommand> {
        info!(points = points.len(), "route restored");
        self.route.reset_to(points);
        vec![
            SurfaceCommand::DrawRoute(self.route.snapshot()),
            SurfaceCommand::ShowStatus(self.status()),
        ]
    }

    /// Records a failure observed outside the session (transport side).
    pub fn record_diagnostic(&mut self, kind: DiagnosticKind, detail: impl Into<String>, now: Duration) {
        self.diagnostics.record(kind, detail, now);
    }

    /// Earliest pending transition deadline.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.clock.next_deadline()
    }

    /// Interpolated marker pose at `now`.
    pub fn marker_pose(&self, now: Duration) -> (Coordinate, f64) {
        match (self.driver.in_flight(), self.leg_started_at) {
            (Some(leg), Some(started)) => {
                let elapsed = now.saturating_sub(started);
                (leg.position_at(elapsed), leg.rotation_at(elapsed))
            }
            _ => (self.driver.current_position(), self.driver.marker_rotation()),
        }
    }

    pub fn status(&self) -> StatusReadout {
        StatusReadout {
            pending: self.driver.pending_count(),
            animating: self.driver.is_animating(),
            bearing: self.driver.current_bearing(),
            route_points: self.route.len(),
            route_meters: self.route.distance_meters(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            route: self.route.snapshot(),
            pending: self.driver.queue().iter().copied().collect(),
            state: self.driver.state(),
            in_flight: self.driver.in_flight().copied(),
            position: self.driver.current_position(),
            bearing: self.driver.current_bearing(),
            marker_rotation: self.driver.marker_rotation(),
        }
    }

    pub fn driver(&self) -> &AnimationDriver {
        &self.driver
    }

    pub fn route(&self) -> &RouteLog {
        &self.route
    }

    pub fn ingest(&self) -> &IngestionAdapter {
        &self.ingest
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    fn replay(&mut self, now: Duration) -> Vec<SurfaceCommand> {
        // Reset wins: pending completions of the old leg never fire
        let cancelled = self.clock.cancel_all();
        self.leg_started_at = None;
        self.stats.replays += 1;

        let outcome = self.playback.replay(&mut self.driver, &self.route);
        debug!(cancelled, requeued = outcome.requeued, "replay");

        let mut commands = Vec::new();
        if let Some(camera) = outcome.camera {
            commands.push(SurfaceCommand::PlaceMarker {
                position: camera.center,
                rotation: 0.0,
            });
            commands.push(SurfaceCommand::MoveCamera(camera));
        }
        self.rearm(now, &mut commands);
        commands.push(SurfaceCommand::ShowStatus(self.status()));
        commands
    }

    fn rearm(&mut self, now: Duration, commands: &mut Vec<SurfaceCommand>) {
        if let Some(leg) = self.driver.rearm() {
            self.start_leg(leg, now, commands);
        }
    }

    fn start_leg(&mut self, leg: Leg, at: Duration, commands: &mut Vec<SurfaceCommand>) {
        self.clock.schedule(&leg, at);
        self.leg_started_at = Some(at);
        self.stats.legs_started += 1;
        commands.push(SurfaceCommand::BeginLeg(leg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Channel;
    use proptest::prelude::*;

    const SINGLE: &str = "Vehicle/Locations";
    const BULK: &str = "Vehicle/BulkLocations/214342";

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon)
    }

    fn session() -> TrackerSession {
        TrackerSession::new(&TrackerConfig::default())
    }

    fn single(lat: f64, lon: f64) -> InboundMessage {
        InboundMessage::new(SINGLE, format!(r#"{{"latitude":{},"longitude":{}}}"#, lat, lon))
    }

    fn bulk(points: &[(f64, f64)]) -> InboundMessage {
        let coords: Vec<Coordinate> = points.iter().copied().map(Coordinate::from).collect();
        InboundMessage::new(BULK, serde_json::to_string(&coords).unwrap())
    }

    fn legs(commands: &[SurfaceCommand]) -> Vec<Leg> {
        commands
            .iter()
            .filter_map(|cmd| match cmd {
                SurfaceCommand::BeginLeg(leg) => Some(*leg),
                _ => None,
            })
            .collect()
    }

    /// Runs the clock until nothing is pending, collecting leg targets.
    fn run_to_rest(session: &mut TrackerSession, mut now: Duration) -> (Vec<Coordinate>, Duration) {
        let mut visited = Vec::new();
        while let Some(deadline) = session.next_deadline() {
            now = now.max(deadline);
            visited.extend(legs(&session.advance(now)).into_iter().map(|l| l.to));
        }
        (visited, now)
    }

    #[test]
    fn test_bootstrap_frame() {
        let s = session();
        let commands = s.bootstrap();
        assert_eq!(commands.len(), 4);
        assert!(matches!(commands[0], SurfaceCommand::MoveCamera(t) if t.latitude_delta == 0.0922));
        assert_eq!(commands[1], SurfaceCommand::DrawRoute(vec![]));
    }

    #[test]
    fn test_chain_from_origin() {
        let mut s = session();
        let commands = s.handle_message(&bulk(&[(1.0, 1.0), (2.0, 2.0)]), Duration::ZERO);

        let first = legs(&commands);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].from, Coordinate::ORIGIN);
        assert_eq!(first[0].to, c(1.0, 1.0));
        assert_eq!(s.status().pending, 1);

        // Rotation finishes first; nothing visible changes
        assert!(s.advance(ms(300)).is_empty());
        assert!(s.advance(ms(1999)).is_empty());

        let commands = s.advance(ms(2000));
        let second = legs(&commands);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].from, c(1.0, 1.0));
        assert_eq!(second[0].to, c(2.0, 2.0));
        assert_eq!(s.status().pending, 0);
        assert_eq!(s.driver().current_position(), c(1.0, 1.0));

        s.advance(ms(4000));
        assert_eq!(s.driver().current_position(), c(2.0, 2.0));
        assert_eq!(s.driver().state(), AnimationState::Idle);
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn test_bulk_ingest_starts_with_first_element() {
        let mut s = session();
        let commands = s.handle_message(
            &InboundMessage::new(
                BULK,
                r#"[{"latitude":10,"longitude":20},{"latitude":30,"longitude":40}]"#,
            ),
            Duration::ZERO,
        );

        assert_eq!(s.route().snapshot(), vec![c(10.0, 20.0), c(30.0, 40.0)]);
        assert_eq!(legs(&commands)[0].to, c(10.0, 20.0));
        assert_eq!(s.driver().queue().iter().copied().collect::<Vec<_>>(), vec![c(30.0, 40.0)]);
        assert_eq!(commands[0], SurfaceCommand::DrawRoute(s.route().snapshot()));
    }

    #[test]
    fn test_enqueue_while_animating_does_not_interrupt() {
        let mut s = session();
        s.handle_message(&single(1.0, 0.0), Duration::ZERO);
        let in_flight = s.driver().in_flight().copied();

        let commands = s.handle_message(&single(2.0, 0.0), ms(500));
        assert!(legs(&commands).is_empty());
        assert_eq!(s.driver().in_flight().copied(), in_flight);
        assert_eq!(s.status().pending, 1);

        let (visited, _) = run_to_rest(&mut s, ms(500));
        assert_eq!(visited, vec![c(2.0, 0.0)]);
        assert_eq!(s.driver().current_position(), c(2.0, 0.0));
    }

    #[test]
    fn test_malformed_payload_changes_nothing() {
        let mut s = session();
        s.handle_message(&single(1.0, 1.0), Duration::ZERO);
        let before = s.snapshot();

        assert!(s.handle_message(&InboundMessage::new(SINGLE, "{bad json"), ms(10)).is_empty());
        assert!(s
            .handle_message(&InboundMessage::new(BULK, r#"{"latitude":1,"longitude":2}"#), ms(20))
            .is_empty());

        assert_eq!(s.snapshot(), before);
        assert_eq!(s.diagnostics().count(DiagnosticKind::DecodeFailed(Channel::Single)), 1);
        assert_eq!(s.diagnostics().count(DiagnosticKind::DecodeFailed(Channel::Bulk)), 1);
        assert_eq!(s.stats().messages_rejected, 2);

        // The next valid message still goes through
        s.handle_message(&single(2.0, 2.0), ms(30));
        assert_eq!(s.route().len(), 2);
        assert_eq!(s.status().pending, 1);
    }

    #[test]
    fn test_unrouted_topic() {
        let mut s = session();
        let before = s.snapshot();
        s.handle_message(&InboundMessage::new("Vehicle/BulkLocations/1", "[]"), Duration::ZERO);
        assert_eq!(s.snapshot(), before);
        assert_eq!(s.diagnostics().count(DiagnosticKind::UnroutedTopic), 1);
    }

    #[test]
    fn test_replay_mid_leg() {
        let mut s = session();
        s.handle_message(&bulk(&[(5.0, 5.0), (6.0, 6.0), (7.0, 7.0)]), Duration::ZERO);
        s.advance(ms(2000));
        s.advance(ms(3000));
        assert_eq!(s.driver().current_position(), c(5.0, 5.0));
        let stale = s.driver().in_flight().map(|l| l.id).unwrap();

        let commands = s.handle_command(UserCommand::Replay, ms(3000));

        assert!(commands.contains(&SurfaceCommand::MoveCamera(CameraTarget::focused(c(5.0, 5.0)))));
        let restarted = legs(&commands);
        assert_eq!(restarted.len(), 1);
        assert_eq!(restarted[0].from, c(5.0, 5.0));
        assert_eq!(restarted[0].to, c(5.0, 5.0));
        assert_ne!(restarted[0].id, stale);
        assert_eq!(s.status().pending, 2);
        assert_eq!(s.driver().current_bearing(), 0.0);
        assert_eq!(s.route().len(), 3);

        // The cancelled leg's deadline (4000 ms) never fires
        let (visited, end) = run_to_rest(&mut s, ms(3000));
        assert_eq!(visited, vec![c(6.0, 6.0), c(7.0, 7.0)]);
        assert_eq!(end, ms(9000));
        assert_eq!(s.driver().stale_completions(), 0);
        assert_eq!(s.driver().current_position(), c(7.0, 7.0));
    }

    #[test]
    fn test_double_replay_is_idempotent() {
        let mut s = session();
        s.handle_message(&bulk(&[(1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]), Duration::ZERO);
        let (_, now) = run_to_rest(&mut s, Duration::ZERO);

        let play = |s: &mut TrackerSession, at: Duration| {
            let mut targets: Vec<Coordinate> = legs(&s.handle_command(UserCommand::Replay, at))
                .into_iter()
                .map(|l| l.to)
                .collect();
            let (rest, end) = run_to_rest(s, at);
            targets.extend(rest);
            (targets, end, s.snapshot())
        };

        let (first, end, snap_a) = play(&mut s, now);
        let (second, _, snap_b) = play(&mut s, end);
        assert_eq!(first, second);
        assert_eq!(first, vec![c(1.0, 0.0), c(1.0, 1.0), c(0.0, 1.0)]);
        // One leg per recorded point: 3 x 2000 ms
        assert_eq!(end - now, ms(6000));
        assert_eq!(snap_a, snap_b);
        assert_eq!(s.stats().replays, 2);
    }

    #[test]
    fn test_replay_on_empty_route() {
        let mut s = session();
        let commands = s.handle_command(UserCommand::Replay, Duration::ZERO);
        assert!(legs(&commands).is_empty());
        assert_eq!(s.driver().state(), AnimationState::Idle);
        assert_eq!(s.driver().current_position(), Coordinate::ORIGIN);
    }

    #[test]
    fn test_show_vehicle_mid_animation() {
        let mut s = session();
        s.handle_message(&bulk(&[(1.0, 1.0), (2.0, 2.0)]), Duration::ZERO);
        s.advance(ms(2500));
        let before = s.snapshot();

        let commands = s.handle_command(UserCommand::ShowVehicle, ms(2600));
        assert_eq!(commands, vec![SurfaceCommand::MoveCamera(CameraTarget::focused(c(1.0, 1.0)))]);
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn test_marker_pose_interpolates() {
        let mut s = session();
        s.handle_message(&single(0.0, 2.0), ms(1000));

        let (pos, rot) = s.marker_pose(ms(2000));
        assert!((pos.longitude - 1.0).abs() < 1e-9);
        assert!((rot - 90.0).abs() < 1e-9);

        s.advance(ms(3000));
        assert_eq!(s.marker_pose(ms(3500)).0, c(0.0, 2.0));
    }

    #[test]
    fn test_restore_route_then_replay() {
        let mut s = session();
        let commands = s.restore_route(vec![c(1.0, 2.0), c(3.0, 4.0)]);
        assert_eq!(commands[0], SurfaceCommand::DrawRoute(vec![c(1.0, 2.0), c(3.0, 4.0)]));
        assert_eq!(s.driver().pending_count(), 0);

        s.handle_command(UserCommand::Replay, Duration::ZERO);
        let (visited, _) = run_to_rest(&mut s, Duration::ZERO);
        assert_eq!(visited, vec![c(3.0, 4.0)]);
        assert_eq!(s.driver().current_position(), c(3.0, 4.0));
    }

    #[test]
    fn test_user_command_parsing() {
        assert_eq!("Replay".parse::<UserCommand>(), Ok(UserCommand::Replay));
        assert_eq!(" show vehicle ".parse::<UserCommand>(), Ok(UserCommand::ShowVehicle));
        assert_eq!("q".parse::<UserCommand>(), Ok(UserCommand::Quit));
        assert!("jump".parse::<UserCommand>().is_err());
    }

    proptest! {
        #[test]
        fn prop_bulk_ingest_grows_log_and_queue_by_n(
            points in prop::collection::vec(
                ((-356i32..356), (-716i32..716))
                    .prop_map(|(lat, lon)| (lat as f64 * 0.25, lon as f64 * 0.25)),
                0..30,
            ),
        ) {
            let mut s = session();
            // Keep a leg in flight so the queue is not drained by rearm
            s.handle_message(&single(0.5, 0.5), Duration::ZERO);
            let route_before = s.route().len();
            let pending_before = s.status().pending;

            s.handle_message(&bulk(&points), ms(10));

            prop_assert_eq!(s.route().len(), route_before + points.len());
            prop_assert_eq!(s.status().pending, pending_before + points.len());
            let tail: Vec<Coordinate> = s.route().snapshot()[route_before..].to_vec();
            let expected: Vec<Coordinate> = points.iter().copied().map(Coordinate::from).collect();
            prop_assert_eq!(tail, expected);
        }

        #[test]
        fn prop_malformed_payload_leaves_state_unchanged(
            payload in "[^\\[\\{]{0,40}",
            use_bulk in any::<bool>(),
        ) {
            let mut s = session();
            s.handle_message(&bulk(&[(1.0, 1.0), (2.0, 2.0)]), Duration::ZERO);
            let before = s.snapshot();
            let topic = if use_bulk { BULK } else { SINGLE };

            let commands = s.handle_message(&InboundMessage::new(topic, payload), ms(5));

            prop_assert!(commands.is_empty());
            prop_assert_eq!(s.snapshot(), before);
            prop_assert_eq!(s.diagnostics().len(), 1);
        }
    }
}
