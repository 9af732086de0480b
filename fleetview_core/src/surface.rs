//! Rendering boundary - what the tracker asks a map surface to do.
//!
//! The session emits `SurfaceCommand`s; a `RenderSurface` (terminal, map
//! widget, recorder) carries them out.

use crate::animation::Leg;
use crate::coordinate::Coordinate;
use serde::{Deserialize, Serialize};

/// Camera pan/zoom target. Zero deltas zoom all the way in on `center`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraTarget {
    pub center: Coordinate,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl CameraTarget {
    /// Tight zoom on a single point.
    pub fn focused(center: Coordinate) -> Self {
        Self {
            center,
            latitude_delta: 0.0,
            longitude_delta: 0.0,
        }
    }

    pub fn region(center: Coordinate, latitude_delta: f64, longitude_delta: f64) -> Self {
        Self {
            center,
            latitude_delta,
            longitude_delta,
        }
    }
}

/// Diagnostics readout shown next to the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusReadout {
    /// Coordinates waiting in the queue
    pub pending: usize,
    pub animating: bool,
    /// Bearing of the latest leg, `[0, 360)`
    pub bearing: f64,
    pub route_points: usize,
    pub route_meters: f64,
}

impl std::fmt::Display for StatusReadout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "route size: {} IsVehicleOnMove: {}  Rotation: {:.1} (route {} pts, {:.0} m)",
            self.pending,
            if self.animating { "Yes" } else { "No" },
            self.bearing,
            self.route_points,
            self.route_meters,
        )
    }
}

/// One instruction for the rendering surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCommand {
    /// Redraw the travelled polyline
    DrawRoute(Vec<Coordinate>),
    /// Start animating the marker along a leg
    BeginLeg(Leg),
    /// Snap the marker to a pose without animating
    PlaceMarker { position: Coordinate, rotation: f64 },
    /// Pan/zoom the camera
    MoveCamera(CameraTarget),
    /// Refresh the diagnostics readout
    ShowStatus(StatusReadout),
}

/// A map surface able to carry out `SurfaceCommand`s.
pub trait RenderSurface {
    fn draw_route(&mut self, route: &[Coordinate]);

    fn begin_leg(&mut self, leg: &Leg);

    fn place_marker(&mut self, position: Coordinate, rotation: f64);

    fn move_camera(&mut self, target: &CameraTarget);

    fn show_status(&mut self, status: &StatusReadout);

    fn apply(&mut self, command: &SurfaceCommand) {
        match command {
            SurfaceCommand::DrawRoute(route) => self.draw_route(route),
            SurfaceCommand::BeginLeg(leg) => self.begin_leg(leg),
            SurfaceCommand::PlaceMarker { position, rotation } => {
                self.place_marker(*position, *rotation)
            }
            SurfaceCommand::MoveCamera(target) => self.move_camera(target),
            SurfaceCommand::ShowStatus(status) => self.show_status(status),
        }
    }

    fn apply_all(&mut self, commands: &[SurfaceCommand]) {
        for command in commands {
            self.apply(command);
        }
    }
}
