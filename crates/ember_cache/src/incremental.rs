//! Coalesced text edits for incremental reparsing.
//!
//! After a unit has been resolved, the context keeps an [`IncrementalCache`]
//! anchored on the resolved tree. Subsequent edits to the same source grow a
//! single edit window as long as they stay contiguous, so a parser can
//! reprocess just that window instead of the whole unit. Every operation here
//! takes and returns `Option<IncrementalCache>`; `None` means no incremental
//! path is available and the caller falls back to a full reparse.

use std::sync::Arc;

use ember_source::SourceId;
use serde::{Deserialize, Serialize};

use crate::artifact::{SyntaxNode, TreeRef};
use crate::entry::SourceEntry;

/// A text replacement: `old_length` bytes at `offset` replaced by
/// `new_length` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EditWindow {
    /// Byte offset of the first changed byte.
    pub offset: usize,
    /// Length of the replaced text.
    pub old_length: usize,
    /// Length of the replacement text.
    pub new_length: usize,
}

impl EditWindow {
    /// Creates a window.
    pub fn new(offset: usize, old_length: usize, new_length: usize) -> Self {
        Self {
            offset,
            old_length,
            new_length,
        }
    }

    /// Returns `true` if the window describes no change at all.
    pub fn is_empty(&self) -> bool {
        self.old_length == 0 && self.new_length == 0
    }

    /// Returns `true` if an edit starting at `offset` touches this window,
    /// inclusive at both ends. A window whose end does not fit in `usize`
    /// touches nothing.
    pub fn touches(&self, offset: usize) -> bool {
        self.offset
            .checked_add(self.new_length)
            .is_some_and(|end| self.offset <= offset && offset <= end)
    }
}

/// A pending edit of one source on top of its last resolved tree.
#[derive(Debug, Clone)]
pub struct IncrementalCache {
    source: SourceId,
    library: SourceId,
    old_contents: String,
    new_contents: String,
    window: EditWindow,
    resolved_tree: TreeRef,
}

impl IncrementalCache {
    /// The edited source.
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// The library the retained tree was resolved in.
    pub fn library(&self) -> SourceId {
        self.library
    }

    /// Contents the retained tree was built from.
    pub fn old_contents(&self) -> &str {
        &self.old_contents
    }

    /// Latest contents of the source.
    pub fn new_contents(&self) -> &str {
        &self.new_contents
    }

    /// The accumulated edit window.
    pub fn window(&self) -> EditWindow {
        self.window
    }

    /// The tree the edit window applies to.
    pub fn resolved_tree(&self) -> &TreeRef {
        &self.resolved_tree
    }

    /// Drops the cache if `source` is the source it tracks.
    ///
    /// Used when `source` changed in a way the window cannot describe. A
    /// change to any other source leaves the cache alone.
    pub fn clear(cache: Option<Self>, source: SourceId) -> Option<Self> {
        match cache {
            Some(cache) if cache.source == source => {
                tracing::debug!(%source, "incremental cache cleared");
                None
            }
            other => other,
        }
    }

    /// Folds an edit of `source` into the cache.
    ///
    /// A new cache is started when there is none for `source`, or when the
    /// only library resolving `source` now holds a different resolved tree
    /// than the one the cache is anchored on. Starting one needs that tree
    /// and the old contents; for a pure insertion the old contents can be
    /// rebuilt by cutting the inserted text out of `new_contents`.
    ///
    /// An existing cache with an empty window takes `edit` as its window. A
    /// non-empty window only grows if `edit` starts inside it; any other edit
    /// discards the cache.
    pub fn update(
        cache: Option<Self>,
        source: SourceId,
        old_contents: Option<&str>,
        new_contents: &str,
        edit: EditWindow,
        entry: &SourceEntry,
    ) -> Option<Self> {
        let resolved = single_resolved_tree(source, entry);
        let anchored_elsewhere = match (&cache, &resolved) {
            (Some(cache), Some((_, tree))) => !Arc::ptr_eq(&cache.resolved_tree, tree),
            _ => false,
        };
        let mut cache = match cache {
            Some(cache) if cache.source == source && !anchored_elsewhere => cache,
            _ => return Self::start(source, old_contents, new_contents, edit, resolved),
        };

        if cache.window.is_empty() {
            cache.window = edit;
        } else if cache.window.touches(edit.offset) {
            cache.window.new_length = match cache
                .window
                .new_length
                .checked_add(edit.new_length)
                .and_then(|grown| grown.checked_sub(edit.old_length))
            {
                Some(length) => length,
                None => {
                    tracing::debug!(%source, "edit does not fit the window; incremental cache discarded");
                    return None;
                }
            };
        } else {
            tracing::debug!(
                %source,
                offset = edit.offset,
                window_offset = cache.window.offset,
                "non-contiguous edit; incremental cache discarded"
            );
            return None;
        }
        cache.new_contents = new_contents.to_string();
        Some(cache)
    }

    fn start(
        source: SourceId,
        old_contents: Option<&str>,
        new_contents: &str,
        edit: EditWindow,
        resolved: Option<(SourceId, TreeRef)>,
    ) -> Option<Self> {
        let (library, resolved_tree) = resolved?;
        let old_contents = match old_contents {
            Some(old) => old.to_string(),
            None if edit.old_length == 0 => {
                let head = new_contents.get(..edit.offset)?;
                let tail = new_contents.get(edit.offset.checked_add(edit.new_length)?..)?;
                format!("{head}{tail}")
            }
            None => return None,
        };
        tracing::debug!(%source, %library, "incremental cache started");
        Some(Self {
            source,
            library,
            old_contents,
            new_contents: new_contents.to_string(),
            window: edit,
            resolved_tree,
        })
    }

    /// Re-anchors the cache on the tree an incremental parse produced.
    ///
    /// The new cache has an empty window and treats the latest contents as
    /// both old and new. Without a tree the incremental parse failed and the
    /// cache is dropped.
    pub fn cache_result(cache: Option<&Self>, tree: Option<TreeRef>) -> Option<Self> {
        let (cache, tree) = (cache?, tree?);
        Some(Self {
            source: cache.source,
            library: cache.library,
            old_contents: cache.new_contents.clone(),
            new_contents: cache.new_contents.clone(),
            window: EditWindow::default(),
            resolved_tree: tree,
        })
    }

    /// Checks the retained tree of `source` against an independent full
    /// reparse, dropping the cache if their shapes differ.
    pub fn verify_structure(
        cache: Option<Self>,
        source: SourceId,
        full_tree: &SyntaxNode,
    ) -> Option<Self> {
        let cache = cache?;
        if cache.source == source && !cache.resolved_tree.structurally_equal(full_tree) {
            tracing::warn!(
                %source,
                "incremental tree differs from full reparse; incremental cache discarded"
            );
            return None;
        }
        Some(cache)
    }

    /// Returns `true` if there is an edit window to apply.
    pub fn has_work(cache: Option<&Self>) -> bool {
        cache.is_some_and(|c| !c.window.is_empty())
    }
}

/// The resolved tree of a unit, if exactly one library currently contains it
/// and that library's tree is cached.
///
/// A library's own unit is contained in the library itself. Resolution
/// states left over from libraries that no longer include the unit do not
/// count.
fn single_resolved_tree(source: SourceId, entry: &SourceEntry) -> Option<(SourceId, TreeRef)> {
    let unit = entry.as_unit()?;
    let own = entry.as_library().map(|_| source);
    let mut libraries = own.into_iter().chain(unit.containing_libraries().iter().copied());
    let (Some(library), None) = (libraries.next(), libraries.next()) else {
        return None;
    };
    unit.resolution(library)?
        .resolved_tree()
        .value()
        .map(|tree| (library, Arc::clone(tree)))
}
