//! FleetView Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the FleetView
//! tracker to run in both **Production** (tokio + a real broker) and
//! **Simulation** (virtual clock + in-memory broker) environments.
//!
//! # Core Concept: The Reactor Pattern
//!
//! The tracker never touches I/O directly. It goes through:
//! - Time (`now()`, `sleep()`) for the animation clock
//! - Transport (`connect()`, `subscribe()`, `recv()`) for location updates
//!
//! Swapping both for virtual implementations makes every animation run
//! reproducible from a single seed.
//!
//! # Example
//!
//! ```ignore
//! use fleetview_env::{FleetViewContext, MessageTransport, TransportEvent};
//!
//! async fn pump<Ctx: FleetViewContext, Tx: MessageTransport>(ctx: &Ctx, tx: &Tx) {
//!     loop {
//!         tokio::select! {
//!             event = tx.recv() => handle(event),
//!             _ = ctx.sleep(Duration::from_millis(2000)) => leg_finished(),
//!         }
//!     }
//! }
//! ```

mod context;
mod transport;
mod types;
mod error;
mod tokio_impl;

pub use context::FleetViewContext;
pub use transport::{MessageTransport, TransportController};
pub use types::{BrokerEndpoint, ClientId, InboundMessage, TransportEvent};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
