//! Playback Controller - "Replay" and "Show Vehicle".

use crate::animation::AnimationDriver;
use crate::route::RouteLog;
use crate::surface::CameraTarget;
use tracing::info;

/// What a replay did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayOutcome {
    /// Camera move to the start of the route; `None` when the route is empty
    pub camera: Option<CameraTarget>,
    /// Coordinates requeued
    pub requeued: usize,
}

/// Resets the animation to the start of the recorded route, or points the
/// camera at the vehicle.
#[derive(Debug, Clone, Default)]
pub struct PlaybackController;

impl PlaybackController {
    pub fn new() -> Self {
        Self
    }

    /// Requeues the whole recorded route from its first point.
    ///
    /// The driver goes back to `Idle` with bearing 0 and its settled position
    /// on the route's first point; the queue then holds the full snapshot.
    /// The route log itself is left as is. Re-arming is up to the caller.
    pub fn replay(&self, driver: &mut AnimationDriver, route: &RouteLog) -> ReplayOutcome {
        let snapshot = route.snapshot();
        let start = snapshot.first().copied();

        driver.reset(start);

        let camera = start.map(|first| {
            driver.enqueue_all(&snapshot);
            CameraTarget::focused(first)
        });

        info!(points = snapshot.len(), "replaying recorded route");
        ReplayOutcome {
            camera,
            requeued: snapshot.len(),
        }
    }

    /// Camera target on the vehicle's settled position. Touches nothing.
    pub fn recenter(&self, driver: &AnimationDriver) -> CameraTarget {
        CameraTarget::focused(driver.current_position())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::AnimationState;
    use crate::coordinate::Coordinate;

    fn route(points: &[(f64, f64)]) -> RouteLog {
        let mut log = RouteLog::new();
        for p in points {
            log.append(Coordinate::from(*p));
        }
        log
    }

    #[test]
    fn test_replay_requeues_full_route() {
        let log = route(&[(5.0, 5.0), (6.0, 6.0), (7.0, 7.0)]);
        let mut driver = AnimationDriver::default();
        driver.enqueue_all(&log.snapshot());
        driver.rearm();

        let outcome = PlaybackController::new().replay(&mut driver, &log);

        assert_eq!(outcome.requeued, 3);
        assert_eq!(outcome.camera, Some(CameraTarget::focused(Coordinate::new(5.0, 5.0))));
        assert_eq!(driver.state(), AnimationState::Idle);
        assert_eq!(driver.current_position(), Coordinate::new(5.0, 5.0));
        assert_eq!(driver.current_bearing(), 0.0);
        let pending: Vec<Coordinate> = driver.queue().iter().copied().collect();
        assert_eq!(pending, log.snapshot());
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_replay_empty_route_only_clears() {
        let log = RouteLog::new();
        let mut driver = AnimationDriver::default();
        driver.enqueue(Coordinate::new(1.0, 1.0));

        let outcome = PlaybackController::new().replay(&mut driver, &log);

        assert_eq!(outcome.camera, None);
        assert_eq!(outcome.requeued, 0);
        assert_eq!(driver.pending_count(), 0);
        assert_eq!(driver.current_position(), Coordinate::ORIGIN);
    }

    #[test]
    fn test_recenter_uses_settled_position() {
        let mut driver = AnimationDriver::default();
        driver.enqueue(Coordinate::new(3.0, 4.0));
        driver.rearm();

        // Mid-leg the settled position is still the origin
        let target = PlaybackController::new().recenter(&driver);
        assert_eq!(target, CameraTarget::focused(Coordinate::ORIGIN));
        assert_eq!(driver.pending_count(), 0);
        assert!(driver.is_animating());
    }
}
