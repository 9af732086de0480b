//! SimulatedTracker - runs a `TrackerAgent` on virtual time.
//!
//! The harness owns the clock. Instead of the agent's `run` loop it steps
//! the agent directly: deliver what the broker has queued, then jump the
//! clock from one transition deadline (or frame sample) to the next.

use crate::broker::SimTransport;
use crate::context::SimContext;
use crate::exporter::SimFrame;
use crate::surface::RecordingSurface;

use fleetview_core::{Coordinate, Leg, LinkState, TrackerAgent, TrackerConfig, TrackerSession, UserCommand};
use fleetview_env::{EnvError, FleetViewContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A tracker running in the deterministic environment.
pub struct SimulatedTracker {
    inner: TrackerAgent<SimContext, SimTransport, RecordingSurface>,

    context: Arc<SimContext>,

    /// Every leg with the virtual time it began
    leg_log: Vec<(Duration, Leg)>,

    frame_interval: Option<Duration>,
    next_frame: Duration,
    frames: Vec<SimFrame>,
    pending_events: Vec<String>,

    max_pending: usize,
    events_delivered: u64,
}

impl SimulatedTracker {
    pub fn new(context: Arc<SimContext>, transport: Arc<SimTransport>, config: TrackerConfig) -> Self {
        let inner = TrackerAgent::new(context.clone(), transport, config, RecordingSurface::new());
        Self {
            inner,
            context,
            leg_log: Vec::new(),
            frame_interval: None,
            next_frame: Duration::ZERO,
            frames: Vec::new(),
            pending_events: Vec::new(),
            max_pending: 0,
            events_delivered: 0,
        }
    }

    /// Samples a frame every `interval` of virtual time.
    pub fn with_frames(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.frame_interval = Some(interval);
        }
        self
    }

    /// Bootstrap, connect and subscribe.
    pub async fn start(&mut self) -> LinkState {
        let link = self.inner.start().await;
        self.note(format!("start: {:?}", link));
        link
    }

    /// Subscribes again; without a connection this only records diagnostics.
    pub async fn subscribe(&mut self) -> usize {
        self.inner.subscribe_topics().await
    }

    /// Loads a recorded route into the route log.
    pub fn restore_route(&mut self, points: Vec<Coordinate>) {
        self.note(format!("route restored: {} points", points.len()));
        self.inner.restore_route(points);
    }

    pub async fn shutdown(&mut self) -> Result<(), EnvError> {
        self.inner.shutdown().await
    }

    /// Hands every queued transport event to the agent.
    pub fn pump(&mut self) -> usize {
        let events = self.inner.transport.drain();
        let count = events.len();
        for event in events {
            self.inner.handle_transport_event(event);
        }
        self.events_delivered += count as u64;
        self.observe();
        count
    }

    /// Applies a user command at the current virtual time.
    pub fn command(&mut self, command: UserCommand) {
        self.pump();
        self.note(format!("command: {:?}", command));
        self.inner.handle_command(command);
        self.observe();
    }

    /// Fires every deadline up to `end`, then leaves the clock at `end`.
    pub fn run_until(&mut self, end: Duration) {
        self.pump();
        loop {
            let deadline = self.inner.session().next_deadline();
            let frame_at = self.frame_interval.map(|_| self.next_frame);
            let stop = [deadline, frame_at]
                .into_iter()
                .flatten()
                .filter(|t| *t <= end)
                .min();
            let Some(stop) = stop else { break };

            self.context.set_time(stop);
            if frame_at == Some(stop) {
                self.capture_frame();
            }
            self.inner.tick();
            self.observe();
        }
        self.context.set_time(end);
    }

    /// Runs until no transition is pending. Returns the time it got there.
    pub fn settle(&mut self) -> Duration {
        self.pump();
        while let Some(deadline) = self.inner.session().next_deadline() {
            self.run_until(deadline);
        }
        if self.frame_interval.is_some() {
            self.capture_frame();
        }
        self.context.now()
    }

    pub fn now(&self) -> Duration {
        self.context.now()
    }

    pub fn link(&self) -> LinkState {
        self.inner.link()
    }

    pub fn session(&self) -> &TrackerSession {
        self.inner.session()
    }

    pub fn session_mut(&mut self) -> &mut TrackerSession {
        self.inner.session_mut()
    }

    pub fn surface(&self) -> &RecordingSurface {
        self.inner.surface()
    }

    pub fn leg_log(&self) -> &[(Duration, Leg)] {
        &self.leg_log
    }

    pub fn frames(&self) -> &[SimFrame] {
        &self.frames
    }

    pub fn take_frames(&mut self) -> Vec<SimFrame> {
        std::mem::take(&mut self.frames)
    }

    /// Largest pending-queue length seen.
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    pub fn events_delivered(&self) -> u64 {
        self.events_delivered
    }

    /// Records a harness event on the next exported frame.
    pub fn note(&mut self, event: impl Into<String>) {
        if self.frame_interval.is_some() {
            self.pending_events.push(event.into());
        }
    }

    fn observe(&mut self) {
        let now = self.context.now();
        let legs = &self.inner.surface().legs;
        for leg in &legs[self.leg_log.len()..] {
            debug!(at_ms = now.as_millis() as u64, leg = %leg.id, "leg began");
            self.leg_log.push((now, *leg));
        }
        self.max_pending = self.max_pending.max(self.inner.session().driver().pending_count());
    }

    fn capture_frame(&mut self) {
        let now = self.context.now();
        let session = self.inner.session();
        let (marker, rotation) = session.marker_pose(now);
        let frame = SimFrame {
            time_ms: now.as_millis() as u64,
            marker,
            rotation,
            state: session.driver().state(),
            pending: session.driver().pending_count(),
            route_points: session.route().len(),
            events: std::mem::take(&mut self.pending_events),
        };
        self.frames.push(frame);
        if let Some(interval) = self.frame_interval {
            self.next_frame = now + interval;
        }
    }
}
