//! Domain-level building blocks for tracking cross-ledger relay transfers.
//!
//! The monitor crate consumes the event model and transfer types defined
//! here; configuration and telemetry are shared so every embedding boots the
//! same way.

pub mod config;
pub mod destination;
pub mod model;
pub mod services;

pub use config::{ConfigError, EventNames, WatchConfig};
pub use destination::{encode_destination, DestinationDescriptor, DestinationError};
pub use model::*;
