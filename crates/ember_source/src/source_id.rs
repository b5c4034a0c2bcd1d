//! Opaque, interned identity of a tracked source.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a source known to the analysis session.
///
/// Produced by [`SourceRegistry::intern`](crate::SourceRegistry::intern).
/// Equality and hashing are O(1) and the value is stable for as long as the
/// registry that produced it lives, which makes it the key of every map and
/// graph in the cache.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(u32);

impl SourceId {
    /// Creates a `SourceId` from a raw index.
    ///
    /// Intended for tests and deserialization; normal code interns URIs.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw index of this identity.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

// SAFETY: `SourceId` wraps a `u32`, which always fits in `usize` on the
// supported platforms. `try_from_usize` rejects indices that overflow `u32`.
unsafe impl lasso::Key for SourceId {
    fn into_usize(self) -> usize {
        self.0 as usize
    }

    fn try_from_usize(int: usize) -> Option<Self> {
        u32::try_from(int).ok().map(SourceId)
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_as_raw_roundtrip() {
        assert_eq!(SourceId::from_raw(42).as_raw(), 42);
    }

    #[test]
    fn display_and_debug() {
        let id = SourceId::from_raw(7);
        assert_eq!(id.to_string(), "#7");
        assert_eq!(format!("{id:?}"), "SourceId(7)");
    }

    #[test]
    fn ordering_follows_raw_index() {
        assert!(SourceId::from_raw(1) < SourceId::from_raw(2));
    }

    #[test]
    fn serde_roundtrip() {
        let id = SourceId::from_raw(3);
        let json = serde_json::to_string(&id).unwrap();
        let back: SourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
