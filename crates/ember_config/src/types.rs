//! Configuration types deserialized from `ember.toml`.

use serde::Deserialize;

/// Smallest accepted `cache_size`.
pub const MIN_CACHE_SIZE: usize = 8;

/// How many cache places are kept free of priority sources, so background
/// work can still retain trees while many files are open.
pub const PRIORITY_ORDER_SIZE_DELTA: usize = 4;

/// The top-level configuration parsed from `ember.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct EmberConfig {
    /// Settings of the analysis cache and scheduler.
    #[serde(default)]
    pub analysis: AnalysisOptions,
}

/// Options that steer the analysis cache.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnalysisOptions {
    /// Attempt an incremental reparse of edited regions before falling back
    /// to a full reparse.
    #[serde(default = "default_true")]
    pub incremental: bool,
    /// Check every incremental result against a full reparse and discard the
    /// incremental cache on mismatch.
    #[serde(default = "default_true")]
    pub incremental_validation: bool,
    /// Maximum number of sources whose syntax trees stay cached before
    /// least-recently-used trees are flushed.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl AnalysisOptions {
    /// Returns how many priority sources are honoured under this cache size.
    pub fn max_priority_sources(&self) -> usize {
        self.cache_size.saturating_sub(PRIORITY_ORDER_SIZE_DELTA)
    }
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            incremental: true,
            incremental_validation: true,
            cache_size: default_cache_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_size() -> usize {
    64
}
