//! Rendering surface that records instead of drawing.

use fleetview_core::{CameraTarget, Coordinate, Leg, RenderSurface, StatusReadout};

/// Keeps every command the tracker issued, for assertions and export.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub legs: Vec<Leg>,
    pub cameras: Vec<CameraTarget>,
    pub markers: Vec<(Coordinate, f64)>,
    pub route: Vec<Coordinate>,
    pub route_draws: usize,
    pub last_status: Option<StatusReadout>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_camera(&self) -> Option<&CameraTarget> {
        self.cameras.last()
    }
}

impl RenderSurface for RecordingSurface {
    fn draw_route(&mut self, route: &[Coordinate]) {
        self.route = route.to_vec();
        self.route_draws += 1;
    }

    fn begin_leg(&mut self, leg: &Leg) {
        self.legs.push(*leg);
    }

    fn place_marker(&mut self, position: Coordinate, rotation: f64) {
        self.markers.push((position, rotation));
    }

    fn move_camera(&mut self, target: &CameraTarget) {
        self.cameras.push(*target);
    }

    fn show_status(&mut self, status: &StatusReadout) {
        self.last_status = Some(*status);
    }
}
