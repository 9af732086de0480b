//! Diagnostic sink for non-fatal failures.
//!
//! Nothing in the tracker escalates to a crash: a refused connect, a
//! rejected subscription or an undecodable payload ends up here (and in the
//! `tracing` output) and the update is simply lost.

use crate::ingest::Channel;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{error, info, warn};

/// Category of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A connect attempt failed
    ConnectFailed,
    /// Every connect attempt failed; no further automatic retry
    ConnectRetryExhausted,
    /// Subscription not established (not connected, or broker refused)
    SubscribeRejected,
    /// The broker connection dropped
    ConnectionLost,
    /// A payload on the given channel could not be decoded
    DecodeFailed(Channel),
    /// A message arrived on a topic no channel is bound to
    UnroutedTopic,
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub detail: String,
    /// Context clock time of the failure
    pub at: Duration,
}

/// Bounded record of recent diagnostics; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
    total: u64,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            total: 0,
        }
    }

    /// Records a diagnostic and emits it as a `tracing` event.
    pub fn record(&mut self, kind: DiagnosticKind, detail: impl Into<String>, at: Duration) {
        let detail = detail.into();
        match kind {
            DiagnosticKind::ConnectRetryExhausted => {
                error!(?kind, at_ms = at.as_millis() as u64, "{}", detail)
            }
            DiagnosticKind::ConnectionLost => {
                info!(?kind, at_ms = at.as_millis() as u64, "{}", detail)
            }
            _ => warn!(?kind, at_ms = at.as_millis() as u64, "{}", detail),
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(Diagnostic { kind, detail, at });
        self.total += 1;
    }

    /// Retained diagnostics, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&Diagnostic> {
        self.entries.back()
    }

    /// Number of retained diagnostics of `kind`.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Everything ever recorded, including evicted entries.
    pub fn total_recorded(&self) -> u64 {
        self.total
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new(256)
    }
}
