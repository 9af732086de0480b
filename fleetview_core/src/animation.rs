//! The Animation Driver - single-flight state machine for marker movement.
//!
//! Pops one coordinate at a time from the pending queue and turns it into a
//! timed leg: a 2000 ms positional transition plus a 300 ms rotation towards
//! the rhumb-line bearing. Only the positional transition's completion moves
//! the machine back to `Idle`, and completion immediately re-arms the next
//! leg, so a backlog plays as one continuous chain.
//!
//! ```text
//!            rearm() [queue non-empty]
//!   ┌──────┐ ───────────────────────────► ┌───────────┐
//!   │ Idle │                              │ Animating │
//!   └──────┘ ◄─────────────────────────── └───────────┘
//!            complete_leg(id) [id current]
//! ```
//!
//! Completions carry the id of the leg they belong to. `reset()` bumps the
//! in-flight leg out, so a completion arriving after a replay is reported as
//! stale instead of resurrecting the old target.

use crate::bearing::{rhumb_line_bearing, shortest_sweep};
use crate::coordinate::Coordinate;
use crate::queue::CoordinateQueue;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Fixed durations of the two transitions of a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationTiming {
    pub move_duration: Duration,
    pub rotate_duration: Duration,
}

impl Default for AnimationTiming {
    fn default() -> Self {
        Self {
            move_duration: Duration::from_millis(2000),
            rotate_duration: Duration::from_millis(300),
        }
    }
}

/// Monotonic identifier of a leg within one driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LegId(pub u64);

impl std::fmt::Display for LegId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "leg#{}", self.0)
    }
}

/// One transition from the settled position to the next queued coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    pub id: LegId,
    pub from: Coordinate,
    pub to: Coordinate,
    /// Rhumb-line bearing of the leg, `[0, 360)`
    pub bearing: f64,
    /// Continuous marker angle at the start of the leg
    pub rotation_from: f64,
    /// Continuous marker angle after the shortest sweep to `bearing`
    pub rotation_to: f64,
    pub move_duration: Duration,
    pub rotate_duration: Duration,
}

impl Leg {
    /// Marker position `elapsed` after the leg started (linear).
    pub fn position_at(&self, elapsed: Duration) -> Coordinate {
        self.from.lerp(&self.to, progress(elapsed, self.move_duration))
    }

    /// Marker angle `elapsed` after the leg started (linear over the sweep).
    pub fn rotation_at(&self, elapsed: Duration) -> f64 {
        let t = progress(elapsed, self.rotate_duration);
        self.rotation_from + (self.rotation_to - self.rotation_from) * t
    }
}

fn progress(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
}

/// Whether a transition is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimationState {
    Idle,
    Animating,
}

/// Result of feeding a positional completion into the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LegOutcome {
    /// The leg settled; `next` is the leg that started right after it, if any
    Settled { next: Option<Leg> },
    /// The completion belongs to a leg that is no longer in flight
    Stale,
}

/// Owns the pending queue and the vehicle's animated pose.
#[derive(Debug, Clone)]
pub struct AnimationDriver {
    queue: CoordinateQueue,
    timing: AnimationTiming,
    in_flight: Option<Leg>,
    current_position: Coordinate,
    current_bearing: f64,
    marker_rotation: f64,
    next_leg_id: u64,
    legs_completed: u64,
    stale_completions: u64,
}

impl AnimationDriver {
    pub fn new(timing: AnimationTiming) -> Self {
        Self {
            queue: CoordinateQueue::new(),
            timing,
            in_flight: None,
            current_position: Coordinate::ORIGIN,
            current_bearing: 0.0,
            marker_rotation: 0.0,
            next_leg_id: 0,
            legs_completed: 0,
            stale_completions: 0,
        }
    }

    /// Appends to the pending queue. Never interrupts the leg in flight.
    pub fn enqueue(&mut self, c: Coordinate) {
        self.queue.enqueue(c);
    }

    pub fn enqueue_all(&mut self, cs: &[Coordinate]) {
        self.queue.enqueue_all(cs);
    }

    /// Idle → Animating if there is anything to animate.
    ///
    /// Returns the leg that started, or `None` when already animating or
    /// the queue is empty.
    pub fn rearm(&mut self) -> Option<Leg> {
        if self.in_flight.is_some() {
            return None;
        }
        let target = self.queue.dequeue()?;

        let bearing = rhumb_line_bearing(self.current_position, target);
        let rotation_to = shortest_sweep(self.marker_rotation, bearing);

        let leg = Leg {
            id: LegId(self.next_leg_id),
            from: self.current_position,
            to: target,
            bearing,
            rotation_from: self.marker_rotation,
            rotation_to,
            move_duration: self.timing.move_duration,
            rotate_duration: self.timing.rotate_duration,
        };
        self.next_leg_id += 1;

        self.current_bearing = bearing;
        self.marker_rotation = rotation_to;
        self.in_flight = Some(leg);

        debug!(leg = %leg.id, to = %target, bearing, pending = self.queue.len(), "leg started");
        Some(leg)
    }

    /// Animating → Idle on positional completion, then re-arm.
    pub fn complete_leg(&mut self, id: LegId) -> LegOutcome {
        match self.in_flight {
            Some(leg) if leg.id == id => {
                self.current_position = leg.to;
                self.in_flight = None;
                self.legs_completed += 1;
                debug!(leg = %id, position = %leg.to, "leg settled");
                LegOutcome::Settled { next: self.rearm() }
            }
            _ => {
                self.stale_completions += 1;
                debug!(leg = %id, "ignoring completion of a leg no longer in flight");
                LegOutcome::Stale
            }
        }
    }

    /// Drops the queue and any leg in flight and returns to `Idle` with
    /// bearing 0. The settled position moves to `position` when given.
    pub fn reset(&mut self, position: Option<Coordinate>) {
        self.queue.clear();
        self.in_flight = None;
        self.current_bearing = 0.0;
        self.marker_rotation = 0.0;
        if let Some(p) = position {
            self.current_position = p;
        }
    }

    pub fn state(&self) -> AnimationState {
        if self.in_flight.is_some() {
            AnimationState::Animating
        } else {
            AnimationState::Idle
        }
    }

    pub fn is_animating(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Position as of the last completed leg.
    pub fn current_position(&self) -> Coordinate {
        self.current_position
    }

    /// Bearing of the most recent leg, `[0, 360)`.
    pub fn current_bearing(&self) -> f64 {
        self.current_bearing
    }

    /// Continuous visual angle the marker is heading to.
    pub fn marker_rotation(&self) -> f64 {
        self.marker_rotation
    }

    pub fn in_flight(&self) -> Option<&Leg> {
        self.in_flight.as_ref()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn queue(&self) -> &CoordinateQueue {
        &self.queue
    }

    pub fn timing(&self) -> AnimationTiming {
        self.timing
    }

    pub fn legs_completed(&self) -> u64 {
        self.legs_completed
    }

    pub fn stale_completions(&self) -> u64 {
        self.stale_completions
    }
}

impl Default for AnimationDriver {
    fn default() -> Self {
        Self::new(AnimationTiming::default())
    }
}
