//! Live `FleetViewContext` on the tokio runtime.

use crate::FleetViewContext;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::Instrument;

/// Wall-clock context: transition deadlines are real milliseconds.
pub struct TokioContext {
    /// Origin of `now()`
    started: Instant,
}

impl TokioContext {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Shared handle for the agent and its helper tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FleetViewContext for TokioContext {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Runs `future` on the ambient runtime inside a `task` span named `name`.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let span = tracing::debug_span!("task", name = %name);
        tokio::spawn(future.instrument(span));
    }

    fn seed(&self) -> u64 {
        0
    }
}
