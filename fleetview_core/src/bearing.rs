//! Heading math for the vehicle marker.
//!
//! Only the rhumb-line bearing feeds the animation. The marker's visual
//! angle is kept continuous (unbounded degrees) so every rotation can take
//! the short way round.

use crate::coordinate::Coordinate;
use std::f64::consts::{FRAC_PI_4, PI};

/// Constant-heading bearing from `from` to `to`, in degrees `[0, 360)`.
///
/// Standard rhumb-line formula: the longitude difference (taking the short
/// way across the antimeridian) against the difference in Mercator-projected
/// latitude, `atan2(Δλ, Δψ)`.
///
/// Identical points give `0`.
pub fn rhumb_line_bearing(from: Coordinate, to: Coordinate) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();

    let mut delta_lambda = (to.longitude - from.longitude).to_radians();
    if delta_lambda.abs() > PI {
        delta_lambda = if delta_lambda > 0.0 {
            -(2.0 * PI - delta_lambda)
        } else {
            2.0 * PI + delta_lambda
        };
    }

    let mut delta_psi = ((phi2 / 2.0 + FRAC_PI_4).tan() / (phi1 / 2.0 + FRAC_PI_4).tan()).ln();
    if !delta_psi.is_finite() {
        // Out-of-range latitudes break the projection; fall back to the
        // unprojected latitude difference.
        delta_psi = phi2 - phi1;
    }

    normalize_degrees(delta_lambda.atan2(delta_psi).to_degrees())
}

/// Maps any angle into `[0, 360)`.
pub fn normalize_degrees(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// Continuous marker angle that reaches `target_bearing` from `current_angle`
/// with the smallest sweep (at most 180 degrees either way).
///
/// `current_angle` may lie outside `[0, 360)`; the result stays on the same
/// unwrapped scale so consecutive sweeps never jump by a full turn.
pub fn shortest_sweep(current_angle: f64, target_bearing: f64) -> f64 {
    let mut delta = normalize_degrees(target_bearing - current_angle);
    if delta > 180.0 {
        delta -= 360.0;
    }
    current_angle + delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_cardinal_bearings() {
        let origin = Coordinate::ORIGIN;
        assert_abs_diff_eq!(rhumb_line_bearing(origin, Coordinate::new(1.0, 0.0)), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(rhumb_line_bearing(origin, Coordinate::new(0.0, 1.0)), 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(rhumb_line_bearing(origin, Coordinate::new(-1.0, 0.0)), 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(rhumb_line_bearing(origin, Coordinate::new(0.0, -1.0)), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_diagonal_near_equator() {
        // Mercator stretch is negligible this close to the equator
        let b = rhumb_line_bearing(Coordinate::ORIGIN, Coordinate::new(1.0, 1.0));
        assert_abs_diff_eq!(b, 45.0, epsilon = 0.01);
        assert!(b < 45.0);
    }

    #[test]
    fn test_identical_points() {
        let p = Coordinate::new(24.75, 55.48);
        assert_eq!(rhumb_line_bearing(p, p), 0.0);
    }

    #[test]
    fn test_antimeridian_takes_short_way() {
        let east = rhumb_line_bearing(Coordinate::new(0.0, 179.0), Coordinate::new(0.0, -179.0));
        assert_abs_diff_eq!(east, 90.0, epsilon = 1e-9);

        let west = rhumb_line_bearing(Coordinate::new(0.0, -179.0), Coordinate::new(0.0, 179.0));
        assert_abs_diff_eq!(west, 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_high_latitude_stretch() {
        // At 60N a degree of longitude is half as long; the heading tilts north
        let b = rhumb_line_bearing(Coordinate::new(60.0, 0.0), Coordinate::new(61.0, 1.0));
        assert!(b > 20.0 && b < 35.0, "bearing was {b}");
    }

    #[test]
    fn test_out_of_range_latitude_still_finite() {
        let b = rhumb_line_bearing(Coordinate::new(95.0, 0.0), Coordinate::new(100.0, 10.0));
        assert!(b.is_finite());
        assert!((0.0..360.0).contains(&b));
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(0.0), 0.0);
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(725.0), 5.0);
        assert_eq!(normalize_degrees(-1e-18), 0.0);
    }

    #[test]
    fn test_shortest_sweep() {
        assert_eq!(shortest_sweep(0.0, 90.0), 90.0);
        assert_eq!(shortest_sweep(350.0, 10.0), 370.0);
        assert_eq!(shortest_sweep(10.0, 350.0), -10.0);
        assert_eq!(shortest_sweep(370.0, 0.0), 360.0);
        assert_eq!(shortest_sweep(0.0, 180.0), 180.0);
        assert_eq!(shortest_sweep(-720.0, 270.0), -810.0);
    }
}
