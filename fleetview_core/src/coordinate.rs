//! Geographic coordinate value type and the range policy applied at ingestion.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};

/// A WGS84 position in decimal degrees.
///
/// Serialized as `{"latitude": f64, "longitude": f64}`, which is also the
/// wire shape of a single location update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Settled position of a vehicle that has not moved yet.
    pub const ORIGIN: Coordinate = Coordinate::new(0.0, 0.0);

    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Linear interpolation in latitude/longitude space.
    ///
    /// `t` is clamped to `[0, 1]`.
    pub fn lerp(&self, other: &Coordinate, t: f64) -> Coordinate {
        let t = t.clamp(0.0, 1.0);
        Coordinate {
            latitude: self.latitude + (other.latitude - self.latitude) * t,
            longitude: self.longitude + (other.longitude - self.longitude) * t,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// True when latitude is in [-90, 90] and longitude in [-180, 180].
    pub fn is_in_range(&self) -> bool {
        self.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Coordinate::new(latitude, longitude)
    }
}

impl From<Coordinate> for geo::Coord<f64> {
    fn from(c: Coordinate) -> Self {
        geo::Coord {
            x: c.longitude,
            y: c.latitude,
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// What to do with coordinates outside the valid latitude/longitude range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatePolicy {
    /// Animate whatever arrives
    #[default]
    Accept,
    /// Drop the whole message if any coordinate is out of range or non-finite
    Reject,
    /// Clamp latitude to [-90, 90] and wrap longitude into [-180, 180)
    Clamp,
}

impl CoordinatePolicy {
    pub fn apply(self, c: Coordinate) -> Result<Coordinate, IngestError> {
        match self {
            CoordinatePolicy::Accept => Ok(c),
            CoordinatePolicy::Reject if c.is_in_range() => Ok(c),
            CoordinatePolicy::Reject => Err(IngestError::OutOfRange {
                latitude: c.latitude,
                longitude: c.longitude,
            }),
            CoordinatePolicy::Clamp if c.is_finite() => Ok(Coordinate {
                latitude: c.latitude.clamp(-90.0, 90.0),
                longitude: wrap_longitude(c.longitude),
            }),
            CoordinatePolicy::Clamp => Err(IngestError::OutOfRange {
                latitude: c.latitude,
                longitude: c.longitude,
            }),
        }
    }
}

fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..=180.0).contains(&longitude) {
        return longitude;
    }
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lerp_endpoints_and_midpoint() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(10.0, 20.0);

        assert_eq!(a.lerp(&b, 0.0), a);
        assert_eq!(a.lerp(&b, 1.0), b);

        let mid = a.lerp(&b, 0.5);
        assert_relative_eq!(mid.latitude, 5.0);
        assert_relative_eq!(mid.longitude, 10.0);

        // Out-of-range factors are clamped
        assert_eq!(a.lerp(&b, 3.0), b);
        assert_eq!(a.lerp(&b, -1.0), a);
    }

    #[test]
    fn test_wire_shape() {
        let c: Coordinate =
            serde_json::from_str(r#"{"latitude": 12.9716, "longitude": 77.5946, "speed": 4}"#)
                .unwrap();
        assert_eq!(c, Coordinate::new(12.9716, 77.5946));

        let json = serde_json::to_string(&Coordinate::new(1.5, -2.0)).unwrap();
        assert_eq!(json, r#"{"latitude":1.5,"longitude":-2.0}"#);
    }

    #[test]
    fn test_accept_policy_keeps_out_of_range() {
        let c = Coordinate::new(123.0, 400.0);
        assert_eq!(CoordinatePolicy::Accept.apply(c).unwrap(), c);
    }

    #[test]
    fn test_reject_policy() {
        assert!(CoordinatePolicy::Reject.apply(Coordinate::new(91.0, 0.0)).is_err());
        assert!(CoordinatePolicy::Reject.apply(Coordinate::new(0.0, -180.5)).is_err());
        assert!(CoordinatePolicy::Reject.apply(Coordinate::new(f64::NAN, 0.0)).is_err());
        assert!(CoordinatePolicy::Reject.apply(Coordinate::new(-90.0, 180.0)).is_ok());
    }

    #[test]
    fn test_clamp_policy() {
        let c = CoordinatePolicy::Clamp.apply(Coordinate::new(95.0, 190.0)).unwrap();
        assert_relative_eq!(c.latitude, 90.0);
        assert_relative_eq!(c.longitude, -170.0);

        let c = CoordinatePolicy::Clamp.apply(Coordinate::new(-100.0, -540.0)).unwrap();
        assert_relative_eq!(c.latitude, -90.0);
        assert_relative_eq!(c.longitude, -180.0);

        assert!(CoordinatePolicy::Clamp
            .apply(Coordinate::new(f64::INFINITY, 0.0))
            .is_err());
    }

    #[test]
    fn test_policy_from_config_string() {
        let p: CoordinatePolicy = serde_json::from_str(r#""clamp""#).unwrap();
        assert_eq!(p, CoordinatePolicy::Clamp);
        assert_eq!(CoordinatePolicy::default(), CoordinatePolicy::Accept);
    }
}
