//! Priority queue of sources awaiting analysis.

use std::fmt;

use ember_source::{SourceId, SourceKind};
use serde::{Deserialize, Serialize};

/// Scheduling tier of a source, highest priority first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    /// A part of a library that was just resolved. Its tree is likely still
    /// cached, so finishing it now is cheap.
    PriorityPart,
    /// A library.
    Library,
    /// A source whose kind is not known yet.
    Unknown,
    /// A part with no particular reason to be hurried.
    NormalPart,
    /// A markup document.
    Markup,
}

impl Priority {
    /// Every tier in iteration order.
    pub const ALL: [Priority; 5] = [
        Priority::PriorityPart,
        Priority::Library,
        Priority::Unknown,
        Priority::NormalPart,
        Priority::Markup,
    ];

    /// The tier a source of the given kind is normally queued at.
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Library => Priority::Library,
            SourceKind::Part => Priority::NormalPart,
            SourceKind::Unknown => Priority::Unknown,
            SourceKind::Markup => Priority::Markup,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::PriorityPart => write!(f, "priority-part"),
            Priority::Library => write!(f, "library"),
            Priority::Unknown => write!(f, "unknown"),
            Priority::NormalPart => write!(f, "normal-part"),
            Priority::Markup => write!(f, "markup"),
        }
    }
}

/// Sources waiting to be analyzed, in five priority tiers.
///
/// A source is in at most one tier at a time. Within a tier sources are
/// served in the order they were queued.
#[derive(Debug, Clone, Default)]
pub struct WorkScheduler {
    tiers: [Vec<SourceId>; 5],
}

impl WorkScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `source` at the end of `priority`'s tier.
    ///
    /// The source is removed from every other tier first. If it is already
    /// queued at `priority` it keeps its position, so touching a source
    /// repeatedly cannot push it ahead of work queued before it.
    pub fn add(&mut self, source: SourceId, priority: Priority) {
        for (i, tier) in self.tiers.iter_mut().enumerate() {
            if i != priority.index() {
                tier.retain(|s| *s != source);
            }
        }
        let tier = &mut self.tiers[priority.index()];
        if !tier.contains(&source) {
            tier.push(source);
        }
    }

    /// Queues `source` at the front of `priority`'s tier, moving it there if
    /// it was queued anywhere else.
    pub fn add_first(&mut self, source: SourceId, priority: Priority) {
        self.remove(source);
        self.tiers[priority.index()].insert(0, source);
    }

    /// Removes `source` from every tier. Returns `true` if it was queued.
    pub fn remove(&mut self, source: SourceId) -> bool {
        let mut removed = false;
        for tier in &mut self.tiers {
            let before = tier.len();
            tier.retain(|s| *s != source);
            removed |= tier.len() != before;
        }
        removed
    }

    /// The tier `source` is queued at, if any.
    pub fn priority_of(&self, source: SourceId) -> Option<Priority> {
        Priority::ALL
            .into_iter()
            .find(|p| self.tiers[p.index()].contains(&source))
    }

    /// Returns `true` if `source` is queued.
    pub fn contains(&self, source: SourceId) -> bool {
        self.priority_of(source).is_some()
    }

    /// Sources queued at one tier, front first.
    pub fn tier(&self, priority: Priority) -> &[SourceId] {
        &self.tiers[priority.index()]
    }

    /// Number of queued sources.
    pub fn len(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(Vec::is_empty)
    }

    /// Drops every queued source.
    pub fn clear(&mut self) {
        for tier in &mut self.tiers {
            tier.clear();
        }
    }

    /// Iterates queued sources, highest tier first and front to back within
    /// a tier.
    ///
    /// The iterator reads the tiers lazily. It borrows the scheduler, so the
    /// scheduler cannot be changed until the iterator is dropped.
    pub fn iter(&self) -> WorkIter<'_> {
        WorkIter {
            tiers: &self.tiers,
            tier: 0,
            position: 0,
        }
    }
}

impl<'a> IntoIterator for &'a WorkScheduler {
    type Item = SourceId;
    type IntoIter = WorkIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over a [`WorkScheduler`].
#[derive(Debug, Clone)]
pub struct WorkIter<'a> {
    tiers: &'a [Vec<SourceId>; 5],
    tier: usize,
    position: usize,
}

impl WorkIter<'_> {
    /// The tier of the source most recently returned by `next`.
    pub fn current_priority(&self) -> Option<Priority> {
        if self.position == 0 {
            return None;
        }
        Priority::ALL.get(self.tier).copied()
    }
}

impl Iterator for WorkIter<'_> {
    type Item = SourceId;

    fn next(&mut self) -> Option<SourceId> {
        while let Some(tier) = self.tiers.get(self.tier) {
            if let Some(source) = tier.get(self.position) {
                self.position += 1;
                return Some(*source);
            }
            self.tier += 1;
            self.position = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(n: u32) -> SourceId {
        SourceId::from_raw(n)
    }

    fn order(scheduler: &WorkScheduler) -> Vec<u32> {
        scheduler.iter().map(SourceId::as_raw).collect()
    }

    #[test]
    fn iteration_follows_tier_order() {
        let mut s = WorkScheduler::new();
        s.add(id(1), Priority::Markup);
        s.add(id(2), Priority::NormalPart);
        s.add(id(3), Priority::Library);
        s.add(id(4), Priority::PriorityPart);
        s.add(id(5), Priority::Unknown);
        s.add(id(6), Priority::Library);
        assert_eq!(order(&s), vec![4, 3, 6, 5, 2, 1]);
    }

    #[test]
    fn add_moves_between_tiers() {
        let mut s = WorkScheduler::new();
        s.add(id(1), Priority::Unknown);
        s.add(id(1), Priority::Library);
        assert_eq!(s.priority_of(id(1)), Some(Priority::Library));
        assert!(s.tier(Priority::Unknown).is_empty());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn re_adding_keeps_position() {
        let mut s = WorkScheduler::new();
        s.add(id(1), Priority::Library);
        s.add(id(2), Priority::Library);
        s.add(id(1), Priority::Library);
        assert_eq!(order(&s), vec![1, 2]);
    }

    #[test]
    fn add_first_jumps_the_queue() {
        let mut s = WorkScheduler::new();
        s.add(id(1), Priority::Library);
        s.add(id(2), Priority::Library);
        s.add_first(id(2), Priority::Library);
        assert_eq!(order(&s), vec![2, 1]);
        s.add_first(id(3), Priority::Library);
        assert_eq!(order(&s), vec![3, 2, 1]);
    }

    #[test]
    fn remove_from_any_tier() {
        let mut s = WorkScheduler::new();
        s.add(id(1), Priority::Markup);
        assert!(s.remove(id(1)));
        assert!(!s.remove(id(1)));
        assert!(s.is_empty());
        assert!(!s.contains(id(1)));
    }

    #[test]
    fn iterator_is_lazy_and_reports_tier() {
        let mut s = WorkScheduler::new();
        s.add(id(1), Priority::Library);
        s.add(id(2), Priority::Markup);
        let mut iter = s.iter();
        assert_eq!(iter.current_priority(), None);
        assert_eq!(iter.next(), Some(id(1)));
        assert_eq!(iter.current_priority(), Some(Priority::Library));
        assert_eq!(iter.next(), Some(id(2)));
        assert_eq!(iter.current_priority(), Some(Priority::Markup));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn clear_empties_every_tier() {
        let mut s = WorkScheduler::new();
        for (n, p) in Priority::ALL.into_iter().enumerate() {
            s.add(id(n as u32), p);
        }
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.iter().count(), 0);
    }

    #[test]
    fn priority_for_kind() {
        assert_eq!(Priority::for_kind(SourceKind::Part), Priority::NormalPart);
        assert_eq!(Priority::for_kind(SourceKind::Markup), Priority::Markup);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u32, usize),
        AddFirst(u32, usize),
        Remove(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..8, 0usize..5).prop_map(|(s, p)| Op::Add(s, p)),
            (0u32..8, 0usize..5).prop_map(|(s, p)| Op::AddFirst(s, p)),
            (0u32..8).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn single_membership(ops in proptest::collection::vec(op(), 0..64)) {
            let mut s = WorkScheduler::new();
            for op in ops {
                match op {
                    Op::Add(source, p) => {
                        s.add(id(source), Priority::ALL[p]);
                        prop_assert_eq!(
                            s.iter().filter(|x| *x == id(source)).count(),
                            1
                        );
                    }
                    Op::AddFirst(source, p) => {
                        s.add_first(id(source), Priority::ALL[p]);
                        prop_assert_eq!(s.tier(Priority::ALL[p]).first(), Some(&id(source)));
                    }
                    Op::Remove(source) => {
                        s.remove(id(source));
                        prop_assert!(!s.contains(id(source)));
                    }
                }
                let mut seen = std::collections::HashSet::new();
                for source in &s {
                    prop_assert!(seen.insert(source), "{:?} queued twice", source);
                }
                prop_assert_eq!(seen.len(), s.len());
            }
        }

        #[test]
        fn add_twice_keeps_position(
            queued in proptest::collection::vec(0u32..8, 0..8),
            source in 0u32..8,
            p in 0usize..5,
        ) {
            let mut s = WorkScheduler::new();
            for q in queued {
                s.add(id(q), Priority::ALL[p]);
            }
            s.add(id(source), Priority::ALL[p]);
            let before = order(&s);
            s.add(id(source), Priority::ALL[p]);
            prop_assert_eq!(order(&s), before);
        }
    }
}
