//! The clock and task seam between the tracker and its host.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// Everything time-dependent the tracker asks of its host.
///
/// `TokioContext` answers with the wall clock; the simulator answers with
/// a virtual clock that only moves when a scenario advances it, so every
/// transition deadline lands on the same millisecond run after run.
#[async_trait]
pub trait FleetViewContext: Send + Sync + 'static {
    /// Monotonic time since the context was created. Deadlines and
    /// receive stamps are measured on this clock.
    fn now(&self) -> Duration;

    /// Wall-clock time, used only for log stamps and exports.
    fn system_time(&self) -> SystemTime;

    /// Waits `duration` on this context's clock.
    async fn sleep(&self, duration: Duration);

    /// Detaches a named background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Master seed, or 0 when the context is not seeded.
    fn seed(&self) -> u64;
}
