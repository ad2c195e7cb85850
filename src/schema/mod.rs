//! Schema module - Configuration, persisted state and telemetry records.

mod config;
mod state;
mod telemetry;

pub use config::*;
pub use state::*;
pub use telemetry::*;
