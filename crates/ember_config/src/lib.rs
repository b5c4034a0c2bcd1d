//! Parsing and validation of `ember.toml` analysis settings.
//!
//! This crate reads the session configuration file and produces a
//! strongly-typed [`EmberConfig`] whose [`AnalysisOptions`] steer the
//! incremental path and the memory bound of the analysis cache.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use types::*;
