//! FleetView Deterministic Simulation Harness
//!
//! Runs the real tracker (`fleetview_core::TrackerAgent`) against a
//! simulated broker and vehicle, with every source of non-determinism under
//! the harness's control:
//! - **Time**: a virtual clock that jumps from one transition deadline to the next
//! - **Broker**: in-memory pub/sub with refused connects, dropped connections
//!   and per-topic loss
//! - **Randomness**: routes, loss and client ids all derive from one 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    ScenarioRunner                    │
//! │  ┌─────────────┐  publish   ┌──────────┐             │
//! │  │ RouteOracle │ ─────────► │ SimBroker│             │
//! │  └─────────────┘            └────┬─────┘             │
//! │                                  │ SimTransport      │
//! │                        ┌─────────▼─────────┐         │
//! │                        │ SimulatedTracker  │         │
//! │                        │  (TrackerAgent on │         │
//! │                        │   SimContext)     │         │
//! │                        └─────────┬─────────┘         │
//! │                                  ▼                   │
//! │                          RecordingSurface            │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use fleetview_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::ReplayMidLeg);
//! assert!(result.passed);
//! ```

mod broker;
mod context;
mod error;
mod exporter;
mod route_oracle;
mod runner;
mod surface;
mod tracker;
pub mod scenarios;

pub use broker::{BrokerStats, SimBroker, SimBrokerController, SimTransport};
pub use context::SimContext;
pub use error::SimError;
pub use exporter::{SimExport, SimFrame};
pub use route_oracle::{bulk_payload, single_payload, RouteOracle, DEFAULT_START};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use surface::RecordingSurface;
pub use tracker::SimulatedTracker;
