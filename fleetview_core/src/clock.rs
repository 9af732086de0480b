//! Transition clock - deadlines for the two transitions of each leg.
//!
//! The driver only says "a leg started". Something has to remember when its
//! rotation and movement finish and report those completions back in order.
//! Deadlines are measured on the context's monotonic clock, so the same
//! schedule plays in real time under tokio and instantly under a virtual
//! clock.

use crate::animation::{Leg, LegId};
use std::time::Duration;

/// Which of a leg's transitions finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransitionKind {
    Rotation,
    Position,
}

/// A scheduled (or fired) transition completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionDone {
    pub leg: LegId,
    pub kind: TransitionKind,
    pub deadline: Duration,
}

/// Pending transition completions ordered by deadline.
#[derive(Debug, Clone, Default)]
pub struct TransitionClock {
    pending: Vec<TransitionDone>,
    cancelled: u64,
}

impl TransitionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules both transitions of `leg`, starting at `started_at`.
    pub fn schedule(&mut self, leg: &Leg, started_at: Duration) {
        self.pending.push(TransitionDone {
            leg: leg.id,
            kind: TransitionKind::Rotation,
            deadline: started_at + leg.rotate_duration,
        });
        self.pending.push(TransitionDone {
            leg: leg.id,
            kind: TransitionKind::Position,
            deadline: started_at + leg.move_duration,
        });
        // Equal deadlines fire rotation first, then by leg order
        self.pending.sort_by_key(|t| (t.deadline, t.kind, t.leg));
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.first().map(|t| t.deadline)
    }

    /// Removes and returns the earliest completion due at or before `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<TransitionDone> {
        match self.pending.first() {
            Some(t) if t.deadline <= now => Some(self.pending.remove(0)),
            _ => None,
        }
    }

    /// Drops every pending completion. Returns how many were dropped.
    pub fn cancel_all(&mut self) -> usize {
        let n = self.pending.len();
        self.cancelled += n as u64;
        self.pending.clear();
        n
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Total completions dropped by `cancel_all` over the clock's lifetime.
    pub fn cancelled(&self) -> u64 {
        self.cancelled
    }
}
