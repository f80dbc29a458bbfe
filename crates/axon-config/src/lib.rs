#![allow(clippy::must_use_candidate)]

pub mod client;
mod env;
mod loader;
pub mod storage;
pub mod telemetry;

use indexmap::IndexMap;
use serde::Deserialize;

pub use client::*;
pub use storage::*;
pub use telemetry::{LogFormat, TelemetryConfig};

/// Top-level Axon configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
    /// Provider clients keyed by name
    #[serde(default)]
    pub clients: IndexMap<String, ClientConfig>,
}
