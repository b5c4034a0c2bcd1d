//! The lifecycle states shared by every cached artifact, and the names of
//! the artifacts themselves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one cache slot.
///
/// `Flushed` and `Invalid` both mean the value must be recomputed before use.
/// They are kept apart for diagnostics: `Flushed` was valid and evicted under
/// memory pressure, `Invalid` is known to be stale.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CacheState {
    /// The value is cached and current.
    Valid,
    /// The value is stale or was never computed.
    Invalid,
    /// The value was current but has been discarded to save memory.
    Flushed,
    /// The value is being computed.
    InProcess,
    /// Computing the value failed; the cause is cached instead.
    Error,
}

impl CacheState {
    /// All states, in the column order used by statistics.
    pub const ALL: [CacheState; 5] = [
        CacheState::Valid,
        CacheState::Invalid,
        CacheState::Flushed,
        CacheState::InProcess,
        CacheState::Error,
    ];

    /// Column index of this state in [`CacheState::ALL`].
    pub fn index(self) -> usize {
        match self {
            CacheState::Valid => 0,
            CacheState::Invalid => 1,
            CacheState::Flushed => 2,
            CacheState::InProcess => 3,
            CacheState::Error => 4,
        }
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheState::Valid => write!(f, "VALID"),
            CacheState::Invalid => write!(f, "INVALID"),
            CacheState::Flushed => write!(f, "FLUSHED"),
            CacheState::InProcess => write!(f, "IN_PROCESS"),
            CacheState::Error => write!(f, "ERROR"),
        }
    }
}

/// Names every kind of slot a source cache entry can carry.
///
/// The order of the variants is the row order of statistics reports.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlotKind {
    /// Offset to line/column mapping.
    LineIndex,
    /// Unresolved syntax tree of a unit.
    ParsedTree,
    /// Syntax errors of a unit.
    ParseDiagnostics,
    /// Libraries imported by a library.
    ImportedLibraries,
    /// Libraries exported by a library.
    ExportedLibraries,
    /// Parts included by a library.
    IncludedParts,
    /// Resolved syntax tree of a unit within one library.
    ResolvedTree,
    /// Resolution errors of a unit within one library.
    ResolutionDiagnostics,
    /// Semantic model of a library.
    LibraryElement,
    /// Names a library makes visible to importers.
    PublicNamespace,
    /// Unresolved tree of a markup document.
    ParsedMarkup,
    /// Resolved tree of a markup document.
    ResolvedMarkup,
    /// Semantic model of a markup document.
    MarkupElement,
    /// Libraries embedded in or linked from a markup document.
    ReferencedLibraries,
}

impl SlotKind {
    /// Stable kebab-case name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            SlotKind::LineIndex => "line-index",
            SlotKind::ParsedTree => "parsed-tree",
            SlotKind::ParseDiagnostics => "parse-diagnostics",
            SlotKind::ImportedLibraries => "imported-libraries",
            SlotKind::ExportedLibraries => "exported-libraries",
            SlotKind::IncludedParts => "included-parts",
            SlotKind::ResolvedTree => "resolved-tree",
            SlotKind::ResolutionDiagnostics => "resolution-diagnostics",
            SlotKind::LibraryElement => "library-element",
            SlotKind::PublicNamespace => "public-namespace",
            SlotKind::ParsedMarkup => "parsed-markup",
            SlotKind::ResolvedMarkup => "resolved-markup",
            SlotKind::MarkupElement => "markup-element",
            SlotKind::ReferencedLibraries => "referenced-libraries",
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_all_order() {
        for (i, state) in CacheState::ALL.iter().enumerate() {
            assert_eq!(state.index(), i);
        }
    }

    #[test]
    fn display() {
        assert_eq!(CacheState::InProcess.to_string(), "IN_PROCESS");
        assert_eq!(CacheState::Flushed.to_string(), "FLUSHED");
    }

    #[test]
    fn slot_kind_names_match_serde() {
        for kind in [
            SlotKind::ResolvedTree,
            SlotKind::PublicNamespace,
            SlotKind::ReferencedLibraries,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
    }
}
