//! Ground-truth vehicle routes.
//!
//! The oracle drives a single vehicle on a seeded random walk and renders
//! what it "reports" as the JSON payloads the tracker consumes. It also keeps
//! everything it emitted so a scenario can compare the tracker's route log
//! against the truth.

use fleetview_core::{Channel, Coordinate};
use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use std::f64::consts::TAU;
use std::time::Duration;

/// Metres per degree of latitude (and of longitude at the equator).
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Default start: the tracker's initial camera region.
pub const DEFAULT_START: Coordinate = Coordinate {
    latitude: 24.74894444419256,
    longitude: 55.48447756374216,
};

const MALFORMED_SINGLE: &[&str] = &[
    "{bad json",
    r#"{"latitude":"north","longitude":55.4}"#,
    r#"{"latitude":24.7}"#,
    "[]",
    "null",
    r#""24.7,55.4""#,
];

const MALFORMED_BULK: &[&str] = &[
    r#"[{"latitude":1"#,
    r#"{"latitude":1,"longitude":2}"#,
    r#"[{"latitude":1,"longitude":2},42]"#,
    r#"[{"lat":1,"lng":2}]"#,
    "true",
];

/// Seeded ground truth for one vehicle.
pub struct RouteOracle {
    rng: ChaCha8Rng,
    position: Coordinate,
    /// Radians clockwise from north
    heading: f64,
    speed_mps: f64,
    /// Std-dev of the per-step heading change (radians)
    heading_jitter: f64,
    emitted: Vec<Coordinate>,
}

impl RouteOracle {
    pub fn new(seed: u64, start: Coordinate) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let heading = rng.gen_range(0.0..TAU);
        let speed_mps = rng.gen_range(8.0..20.0);
        Self {
            rng,
            position: start,
            heading,
            speed_mps,
            heading_jitter: 0.2,
            emitted: Vec::new(),
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = speed_mps;
        self
    }

    pub fn with_heading_jitter(mut self, std_dev: f64) -> Self {
        self.heading_jitter = std_dev;
        self
    }

    /// Moves the vehicle for `dt` and returns the reported fix.
    pub fn step(&mut self, dt: Duration) -> Coordinate {
        let turn: f64 = self.rng.sample(StandardNormal);
        self.heading = (self.heading + turn * self.heading_jitter).rem_euclid(TAU);

        // (east, north) in metres
        let offset = Vector2::new(self.heading.sin(), self.heading.cos())
            * (self.speed_mps * dt.as_secs_f64());

        let latitude = (self.position.latitude + offset.y / METERS_PER_DEGREE).clamp(-89.0, 89.0);
        let meters_per_lon_degree = METERS_PER_DEGREE * latitude.to_radians().cos();
        let longitude = wrap_longitude(self.position.longitude + offset.x / meters_per_lon_degree);

        // Six decimals, like a GPS fix
        self.position = Coordinate::new(round6(latitude), round6(longitude));
        self.emitted.push(self.position);
        self.position
    }

    /// `count` consecutive fixes, `dt` apart.
    pub fn route(&mut self, count: usize, dt: Duration) -> Vec<Coordinate> {
        (0..count).map(|_| self.step(dt)).collect()
    }

    /// A seeded count in `[low, high]`.
    pub fn pick_count(&mut self, low: usize, high: usize) -> usize {
        self.rng.gen_range(low..=high)
    }

    /// A payload that must fail to decode on `channel`.
    pub fn malformed_payload(&mut self, channel: Channel) -> String {
        let options = match channel {
            Channel::Single => MALFORMED_SINGLE,
            Channel::Bulk => MALFORMED_BULK,
        };
        options[self.rng.gen_range(0..options.len())].to_string()
    }

    pub fn position(&self) -> Coordinate {
        self.position
    }

    /// Every fix produced so far, in order.
    pub fn emitted(&self) -> &[Coordinate] {
        &self.emitted
    }
}

/// `{"latitude":..,"longitude":..}`
pub fn single_payload(c: Coordinate) -> String {
    format!(r#"{{"latitude":{},"longitude":{}}}"#, c.latitude, c.longitude)
}

/// JSON array of location objects.
pub fn bulk_payload(cs: &[Coordinate]) -> String {
    let items: Vec<String> = cs.iter().copied().map(single_payload).collect();
    format!("[{}]", items.join(","))
}

fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

fn wrap_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetview_core::{CoordinatePolicy, IngestionAdapter, TopicMap};
    use proptest::prelude::*;

    fn adapter() -> IngestionAdapter {
        IngestionAdapter::new(
            TopicMap::new("Vehicle/Locations", "Vehicle/BulkLocations", "214342"),
            CoordinatePolicy::Accept,
        )
    }

    #[test]
    fn test_same_seed_same_route() {
        let a = RouteOracle::new(42, DEFAULT_START).route(20, Duration::from_secs(1));
        let b = RouteOracle::new(42, DEFAULT_START).route(20, Duration::from_secs(1));
        let c = RouteOracle::new(43, DEFAULT_START).route(20, Duration::from_secs(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_step_length_matches_speed() {
        let mut oracle = RouteOracle::new(1, DEFAULT_START)
            .with_speed(10.0)
            .with_heading_jitter(0.0);
        let from = oracle.position();
        let to = oracle.step(Duration::from_secs(10));

        let dy = (to.latitude - from.latitude) * METERS_PER_DEGREE;
        let dx = (to.longitude - from.longitude) * METERS_PER_DEGREE * from.latitude.to_radians().cos();
        let travelled = (dx * dx + dy * dy).sqrt();
        assert!((travelled - 100.0).abs() < 1.0, "travelled {}", travelled);
        assert_eq!(oracle.emitted(), &[to]);
    }

    #[test]
    fn test_payloads_decode() {
        let mut oracle = RouteOracle::new(5, DEFAULT_START);
        let route = oracle.route(3, Duration::from_secs(2));
        let a = adapter();

        let single = a.decode(Channel::Single, &single_payload(route[0])).unwrap();
        assert_eq!(single, vec![route[0]]);

        let bulk = a.decode(Channel::Bulk, &bulk_payload(&route)).unwrap();
        assert_eq!(bulk.len(), 3);
        for (got, want) in bulk.iter().zip(&route) {
            assert!((got.latitude - want.latitude).abs() < 1e-9);
            assert!((got.longitude - want.longitude).abs() < 1e-9);
        }
    }

    #[test]
    fn test_malformed_payloads_never_decode() {
        let a = adapter();
        for payload in MALFORMED_SINGLE {
            assert!(a.decode(Channel::Single, payload).is_err(), "{}", payload);
        }
        for payload in MALFORMED_BULK {
            assert!(a.decode(Channel::Bulk, payload).is_err(), "{}", payload);
        }
    }

    proptest! {
        #[test]
        fn prop_fixes_stay_in_range(seed in any::<u64>(), steps in 1usize..200) {
            let mut oracle = RouteOracle::new(seed, DEFAULT_START).with_speed(5_000.0);
            for c in oracle.route(steps, Duration::from_secs(60)) {
                prop_assert!(c.is_in_range(), "{}", c);
            }
        }
    }
}
