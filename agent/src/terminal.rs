//! Terminal rendering surface.
//!
//! No map here: every surface command becomes a log line, and the status
//! readout is printed the way the on-map label reads, or as one JSON object
//! per line for piping into other tools.

use fleetview_core::{CameraTarget, Coordinate, Leg, RenderSurface, StatusReadout};
use serde::Serialize;
use tracing::{debug, info, warn};

/// JSON form of a status readout.
#[derive(Debug, Serialize)]
struct StatusLine<'a> {
    vehicle: &'a str,
    #[serde(flatten)]
    status: &'a StatusReadout,
}

#[derive(Debug, Default)]
pub struct TerminalSurface {
    /// `Some(vehicle)` prints JSON status lines
    json_vehicle: Option<String>,
    last_status: Option<String>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(vehicle: impl Into<String>) -> Self {
        Self {
            json_vehicle: Some(vehicle.into()),
            last_status: None,
        }
    }

    fn render_status(&self, status: &StatusReadout) -> Option<String> {
        match &self.json_vehicle {
            None => Some(status.to_string()),
            Some(vehicle) => {
                let line = StatusLine { vehicle, status };
                match serde_json::to_string(&line) {
                    Ok(json) => Some(json),
                    Err(e) => {
                        warn!(error = %e, "status not serializable");
                        None
                    }
                }
            }
        }
    }

    /// Status line to print, or `None` when it repeats the previous one.
    fn next_status_line(&mut self, status: &StatusReadout) -> Option<String> {
        let line = self.render_status(status)?;
        if self.last_status.as_deref() == Some(line.as_str()) {
            return None;
        }
        self.last_status = Some(line.clone());
        Some(line)
    }
}

impl RenderSurface for TerminalSurface {
    fn draw_route(&mut self, route: &[Coordinate]) {
        debug!(points = route.len(), "route redrawn");
    }

    fn begin_leg(&mut self, leg: &Leg) {
        info!(
            "{} {} -> {} heading {:.1}° over {:?}",
            leg.id, leg.from, leg.to, leg.bearing, leg.move_duration
        );
    }

    fn place_marker(&mut self, position: Coordinate, rotation: f64) {
        debug!(%position, rotation, "marker placed");
    }

    fn move_camera(&mut self, target: &CameraTarget) {
        info!(
            "camera on {} (Δlat {}, Δlon {})",
            target.center, target.latitude_delta, target.longitude_delta
        );
    }

    fn show_status(&mut self, status: &StatusReadout) {
        if let Some(line) = self.next_status_line(status) {
            println!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readout(pending: usize, animating: bool) -> StatusReadout {
        StatusReadout {
            pending,
            animating,
            bearing: 45.0,
            route_points: 3,
            route_meters: 1200.0,
        }
    }

    #[test]
    fn test_text_status_is_deduplicated() {
        let mut surface = TerminalSurface::new();
        let first = surface.next_status_line(&readout(2, true)).unwrap();
        assert!(first.starts_with("route size: 2 IsVehicleOnMove: Yes"));
        assert!(surface.next_status_line(&readout(2, true)).is_none());
        assert!(surface.next_status_line(&readout(1, true)).is_some());
    }

    #[test]
    fn test_json_status_line() {
        let mut surface = TerminalSurface::json("214342");
        let line = surface.next_status_line(&readout(0, false)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["vehicle"], "214342");
        assert_eq!(value["pending"], 0);
        assert_eq!(value["animating"], false);
        assert_eq!(value["bearing"], 45.0);
        assert_eq!(value["route_points"], 3);
        assert!(surface.next_status_line(&readout(0, false)).is_none());
    }
}
