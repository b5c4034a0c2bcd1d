//! Time spent in each analysis phase.
//!
//! A [`Metrics`] value belongs to one analysis context. Nothing here is
//! global, so two contexts never mix their numbers.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// A measured phase of analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Full scan and parse of a unit or markup document.
    Parse,
    /// Resolution of a library or markup document.
    Resolve,
    /// Incremental reparse of an edit window.
    IncrementalParse,
    /// Structural comparison of an incremental result against a full parse.
    Verification,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Parse => write!(f, "parse"),
            Phase::Resolve => write!(f, "resolve"),
            Phase::IncrementalParse => write!(f, "incremental-parse"),
            Phase::Verification => write!(f, "verification"),
        }
    }
}

/// Accumulated cost of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseTotals {
    /// How many times the phase ran.
    pub count: u64,
    /// Total time spent.
    pub elapsed: Duration,
}

/// Per-phase counters with explicit reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    phases: BTreeMap<Phase, PhaseTotals>,
}

impl Metrics {
    /// Creates empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one run of `phase` that took `elapsed`.
    pub fn record(&mut self, phase: Phase, elapsed: Duration) {
        let totals = self.phases.entry(phase).or_default();
        totals.count += 1;
        totals.elapsed += elapsed;
    }

    /// Runs `f` and records its wall-clock time under `phase`.
    pub fn time<R>(&mut self, phase: Phase, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.record(phase, start.elapsed());
        result
    }

    /// Totals for `phase`; zero if it never ran.
    pub fn totals(&self, phase: Phase) -> PhaseTotals {
        self.phases.get(&phase).copied().unwrap_or_default()
    }

    /// A copy of every phase that ran, in [`Phase`] order.
    pub fn snapshot(&self) -> Vec<(Phase, PhaseTotals)> {
        self.phases.iter().map(|(p, t)| (*p, *t)).collect()
    }

    /// Zeroes every counter.
    pub fn reset(&mut self) {
        self.phases.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accumulates() {
        let mut m = Metrics::new();
        m.record(Phase::Parse, Duration::from_millis(3));
        m.record(Phase::Parse, Duration::from_millis(4));
        let totals = m.totals(Phase::Parse);
        assert_eq!(totals.count, 2);
        assert_eq!(totals.elapsed, Duration::from_millis(7));
        assert_eq!(m.totals(Phase::Resolve), PhaseTotals::default());
    }

    #[test]
    fn time_returns_closure_result() {
        let mut m = Metrics::new();
        let value = m.time(Phase::Verification, || 41 + 1);
        assert_eq!(value, 42);
        assert_eq!(m.totals(Phase::Verification).count, 1);
    }

    #[test]
    fn snapshot_in_phase_order() {
        let mut m = Metrics::new();
        m.record(Phase::Verification, Duration::ZERO);
        m.record(Phase::Parse, Duration::ZERO);
        let phases: Vec<_> = m.snapshot().into_iter().map(|(p, _)| p).collect();
        assert_eq!(phases, vec![Phase::Parse, Phase::Verification]);
    }

    #[test]
    fn reset_is_explicit_and_local() {
        let mut a = Metrics::new();
        let b = Metrics::new();
        a.record(Phase::Resolve, Duration::from_micros(5));
        assert_eq!(b.totals(Phase::Resolve).count, 0);
        a.reset();
        assert!(a.snapshot().is_empty());
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::IncrementalParse.to_string(), "incremental-parse");
    }
}
