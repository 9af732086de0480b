//! Append-only log of every coordinate received in the session.

use crate::coordinate::Coordinate;
use geo::{HaversineLength, LineString};

/// The travelled route.
///
/// Grows monotonically; only `reset_to` replaces its contents. Readers get
/// defensive copies through `snapshot`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteLog {
    points: Vec<Coordinate>,
}

impl RouteLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, c: Coordinate) {
        self.points.push(c);
    }

    pub fn append_all(&mut self, cs: &[Coordinate]) {
        self.points.extend_from_slice(cs);
    }

    /// Ordered copy, safe to hand to a renderer.
    pub fn snapshot(&self) -> Vec<Coordinate> {
        self.points.clone()
    }

    /// Replaces the whole log.
    pub fn reset_to(&mut self, cs: Vec<Coordinate>) {
        self.points = cs;
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<Coordinate> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<Coordinate> {
        self.points.last().copied()
    }

    /// Great-circle length of the polyline in metres.
    pub fn distance_meters(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        let line: LineString<f64> = self.points.iter().copied().map(geo::Coord::from).collect();
        line.haversine_length()
    }
}
