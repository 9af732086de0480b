//! FleetView Core - Vehicle Tracking and Marker Animation
//!
//! This library turns a bursty stream of location updates into a smooth,
//! strictly ordered marker animation:
//! 1. **Ingestion**: single and bulk location payloads decoded into coordinates
//! 2. **Route log**: append-only history used for the travelled polyline and replay
//! 3. **Animation driver**: single-flight state machine draining a FIFO queue,
//!    one timed leg at a time, with replay/recenter controls
//!
//! Everything runs on one logical execution context. Time and transport come
//! from `fleetview_env`, so the same session runs live or in simulation.

pub mod animation;
pub mod bearing;
pub mod clock;
pub mod config;
pub mod coordinate;
pub mod diagnostics;
pub mod error;
pub mod ingest;
pub mod playback;
pub mod queue;
pub mod route;
pub mod runtime;
pub mod session;
pub mod surface;

// Re-export key types for convenience
pub use animation::{AnimationDriver, AnimationState, AnimationTiming, Leg, LegId, LegOutcome};
pub use clock::{TransitionClock, TransitionDone, TransitionKind};
pub use config::TrackerConfig;
pub use coordinate::{Coordinate, CoordinatePolicy};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};
pub use error::{ConfigError, IngestError};
pub use ingest::{Channel, IngestionAdapter, TopicMap};
pub use playback::PlaybackController;
pub use queue::CoordinateQueue;
pub use route::RouteLog;
pub use runtime::{LinkState, TrackerAgent};
pub use session::{SessionSnapshot, SessionStats, TrackerSession, UserCommand};
pub use surface::{CameraTarget, RenderSurface, StatusReadout, SurfaceCommand};
