//! Snapshot of slot states across every cache entry.

use std::collections::{BTreeMap, HashSet};

use ember_source::SourceId;
use serde::{Deserialize, Serialize};

use crate::entry::SourceEntry;
use crate::error::AnalysisFailure;
use crate::state::{CacheState, SlotKind};

/// Per-state counts for one kind of slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRow {
    /// The slot kind counted.
    pub kind: SlotKind,
    /// Slots in the VALID state.
    pub valid: usize,
    /// Slots in the INVALID state.
    pub invalid: usize,
    /// Slots in the FLUSHED state.
    pub flushed: usize,
    /// Slots in the IN_PROCESS state.
    pub in_process: usize,
    /// Slots in the ERROR state.
    pub error: usize,
}

impl CacheRow {
    fn new(kind: SlotKind) -> Self {
        Self {
            kind,
            valid: 0,
            invalid: 0,
            flushed: 0,
            in_process: 0,
            error: 0,
        }
    }

    fn increment(&mut self, state: CacheState) {
        match state {
            CacheState::Valid => self.valid += 1,
            CacheState::Invalid => self.invalid += 1,
            CacheState::Flushed => self.flushed += 1,
            CacheState::InProcess => self.in_process += 1,
            CacheState::Error => self.error += 1,
        }
    }

    /// Number of slots in `state`.
    pub fn count(&self, state: CacheState) -> usize {
        match state {
            CacheState::Valid => self.valid,
            CacheState::Invalid => self.invalid,
            CacheState::Flushed => self.flushed,
            CacheState::InProcess => self.in_process,
            CacheState::Error => self.error,
        }
    }

    /// Number of slots inspected for this kind.
    pub fn total(&self) -> usize {
        CacheState::ALL.iter().map(|s| self.count(*s)).sum()
    }
}

/// A consistent snapshot of the whole cache.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisStatistics {
    /// One row per slot kind that occurred, in [`SlotKind`] order.
    pub rows: Vec<CacheRow>,
    /// Distinct failures found in ERROR slots, in the order first seen.
    pub causes: Vec<AnalysisFailure>,
    /// Every source inspected.
    pub sources: Vec<SourceId>,
}

impl AnalysisStatistics {
    /// The row for `kind`, if any slot of that kind was seen.
    pub fn row(&self, kind: SlotKind) -> Option<&CacheRow> {
        self.rows.iter().find(|r| r.kind == kind)
    }
}

/// Accumulates an [`AnalysisStatistics`] snapshot one entry at a time.
#[derive(Debug, Default)]
pub struct StatisticsCollector {
    rows: BTreeMap<SlotKind, CacheRow>,
    seen_causes: HashSet<AnalysisFailure>,
    causes: Vec<AnalysisFailure>,
    sources: Vec<SourceId>,
}

impl StatisticsCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot of `entries` in one pass.
    pub fn collect<'a>(
        entries: impl IntoIterator<Item = (SourceId, &'a SourceEntry)>,
    ) -> AnalysisStatistics {
        let mut collector = Self::new();
        for (source, entry) in entries {
            collector.record(source, entry);
        }
        collector.finish()
    }

    /// Counts every slot of `entry`.
    pub fn record(&mut self, source: SourceId, entry: &SourceEntry) {
        self.sources.push(source);
        entry.visit_slots(&mut |kind, state, cause| {
            self.rows
                .entry(kind)
                .or_insert_with(|| CacheRow::new(kind))
                .increment(state);
            if let Some(cause) = cause {
                if self.seen_causes.insert(cause.clone()) {
                    self.causes.push(cause.clone());
                }
            }
        });
    }

    /// Returns the snapshot.
    pub fn finish(self) -> AnalysisStatistics {
        AnalysisStatistics {
            rows: self.rows.into_values().collect(),
            causes: self.causes,
            sources: self.sources,
        }
    }
}
