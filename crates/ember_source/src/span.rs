//! Byte-offset ranges within a source.

use crate::source_id::SourceId;
use serde::{Deserialize, Serialize};

/// A byte offset range within a source, `start` inclusive and `end` exclusive.
///
/// Spans are position metadata: structural comparison of syntax trees
/// ignores them, since an edit shifts every span after it without changing
/// the shape of the tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Span {
    /// The source this span belongs to.
    pub source: SourceId,
    /// Byte offset of the start of the span (inclusive).
    pub start: u32,
    /// Byte offset of the end of the span (exclusive).
    pub end: u32,
}

impl Span {
    /// Creates a new span in the given source.
    pub fn new(source: SourceId, start: u32, end: u32) -> Self {
        Self { source, start, end }
    }

    /// Returns the length of this span in bytes.
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Returns `true` if this span has zero length.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns `true` if `offset` lies within `[start, end]`.
    ///
    /// The end is included so that an insertion right after a token still
    /// counts as touching it.
    pub fn touches(&self, offset: u32) -> bool {
        self.start <= offset && offset <= self.end
    }

    /// Merges two spans of the same source into one covering both.
    ///
    /// # Panics
    ///
    /// Panics if the spans belong to different sources.
    pub fn merge(self, other: Span) -> Span {
        assert_eq!(
            self.source, other.source,
            "cannot merge spans from different sources"
        );
        Span {
            source: self.source,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src() -> SourceId {
        SourceId::from_raw(0)
    }

    #[test]
    fn len_and_empty() {
        let s = Span::new(src(), 10, 20);
        assert_eq!(s.len(), 10);
        assert!(!s.is_empty());
        assert!(Span::new(src(), 5, 5).is_empty());
    }

    #[test]
    fn touches_includes_both_ends() {
        let s = Span::new(src(), 5, 8);
        assert!(s.touches(5));
        assert!(s.touches(8));
        assert!(!s.touches(4));
        assert!(!s.touches(9));
    }

    #[test]
    fn merge_order_independent() {
        let a = Span::new(src(), 5, 15);
        let b = Span::new(src(), 10, 25);
        assert_eq!(a.merge(b), b.merge(a));
        assert_eq!(a.merge(b), Span::new(src(), 5, 25));
    }

    #[test]
    #[should_panic(expected = "different sources")]
    fn merge_across_sources_panics() {
        let a = Span::new(SourceId::from_raw(0), 0, 1);
        let b = Span::new(SourceId::from_raw(1), 0, 1);
        let _ = a.merge(b);
    }
}
