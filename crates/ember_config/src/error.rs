//! Errors raised while reading `ember.toml` and checking the cache options in it.

use std::path::PathBuf;

use crate::types::MIN_CACHE_SIZE;

/// Why an `ember.toml` could not be turned into analysis options.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// Path of the file that was looked up.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed into options.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// `analysis.cache_size` leaves no room for trees once priority sources
    /// are kept.
    #[error("analysis.cache_size must be at least {min}, got {0}", min = MIN_CACHE_SIZE)]
    CacheTooSmall(usize),
}
