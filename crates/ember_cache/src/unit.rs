//! Cache entries for code units and the libraries they form.
//!
//! A [`LibraryEntry`] is a [`UnitEntry`] plus the library-level slots. The
//! resolution slots of a unit are kept per library, because the same part can
//! be resolved within more than one library.

use std::sync::Arc;

use ember_diagnostics::Diagnostic;
use ember_source::{LineIndex, SourceId};

use crate::artifact::{LibraryElement, Namespace, TreeRef};
use crate::error::AnalysisFailure;
use crate::slot::Slot;
use crate::state::{CacheState, SlotKind};

/// Callback used to enumerate the slots of an entry.
pub type SlotVisitor<'a> = dyn FnMut(SlotKind, CacheState, Option<&AnalysisFailure>) + 'a;

pub(crate) fn visit<T>(slot: &Slot<T>, kind: SlotKind, f: &mut SlotVisitor<'_>) {
    f(kind, slot.state(), slot.cause());
}

/// Resolution results of one unit within one library.
#[derive(Debug, Clone)]
pub struct ResolutionState {
    library: SourceId,
    resolved_tree: Slot<TreeRef>,
    resolution_diagnostics: Slot<Vec<Diagnostic>>,
}

impl ResolutionState {
    fn new(library: SourceId) -> Self {
        Self {
            library,
            resolved_tree: Slot::new(),
            resolution_diagnostics: Slot::new(),
        }
    }

    /// The library this state was resolved within.
    pub fn library(&self) -> SourceId {
        self.library
    }

    /// The `resolved-tree` slot.
    pub fn resolved_tree(&self) -> &Slot<TreeRef> {
        &self.resolved_tree
    }

    /// Mutable access to the `resolved-tree` slot.
    pub fn resolved_tree_mut(&mut self) -> &mut Slot<TreeRef> {
        &mut self.resolved_tree
    }

    /// The `resolution-diagnostics` slot.
    pub fn resolution_diagnostics(&self) -> &Slot<Vec<Diagnostic>> {
        &self.resolution_diagnostics
    }

    /// Mutable access to the `resolution-diagnostics` slot.
    pub fn resolution_diagnostics_mut(&mut self) -> &mut Slot<Vec<Diagnostic>> {
        &mut self.resolution_diagnostics
    }

    fn invalidate(&mut self) {
        self.resolved_tree.invalidate();
        self.resolution_diagnostics.invalidate();
    }

    fn abandon(&mut self) -> usize {
        usize::from(self.resolved_tree.abandon()) + usize::from(self.resolution_diagnostics.abandon())
    }

    fn has_error_state(&self) -> bool {
        self.resolved_tree.state() == CacheState::Error
            || self.resolution_diagnostics.state() == CacheState::Error
    }
}

/// Cached state of a code unit.
#[derive(Debug, Clone, Default)]
pub struct UnitEntry {
    line_index: Slot<LineIndex>,
    parsed_tree: Slot<TreeRef>,
    parse_diagnostics: Slot<Vec<Diagnostic>>,
    resolutions: Vec<ResolutionState>,
    containing_libraries: Vec<SourceId>,
}

impl UnitEntry {
    /// Creates an entry with every slot INVALID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an entry with the same containing libraries and every slot
    /// INVALID.
    pub fn copy(&self) -> Self {
        Self {
            containing_libraries: self.containing_libraries.clone(),
            ..Self::default()
        }
    }

    /// The `line-index` slot.
    pub fn line_index(&self) -> &Slot<LineIndex> {
        &self.line_index
    }

    /// Mutable access to the `line-index` slot.
    pub fn line_index_mut(&mut self) -> &mut Slot<LineIndex> {
        &mut self.line_index
    }

    /// The `parsed-tree` slot.
    pub fn parsed_tree(&self) -> &Slot<TreeRef> {
        &self.parsed_tree
    }

    /// Mutable access to the `parsed-tree` slot.
    pub fn parsed_tree_mut(&mut self) -> &mut Slot<TreeRef> {
        &mut self.parsed_tree
    }

    /// The `parse-diagnostics` slot.
    pub fn parse_diagnostics(&self) -> &Slot<Vec<Diagnostic>> {
        &self.parse_diagnostics
    }

    /// Mutable access to the `parse-diagnostics` slot.
    pub fn parse_diagnostics_mut(&mut self) -> &mut Slot<Vec<Diagnostic>> {
        &mut self.parse_diagnostics
    }

    /// Resolution state of this unit within `library`, if any was recorded.
    pub fn resolution(&self, library: SourceId) -> Option<&ResolutionState> {
        self.resolutions.iter().find(|r| r.library == library)
    }

    /// Resolution state of this unit within `library`, created INVALID on
    /// first use.
    pub fn resolution_mut(&mut self, library: SourceId) -> &mut ResolutionState {
        let idx = match self.resolutions.iter().position(|r| r.library == library) {
            Some(idx) => idx,
            None => {
                self.resolutions.push(ResolutionState::new(library));
                self.resolutions.len() - 1
            }
        };
        &mut self.resolutions[idx]
    }

    /// All resolution states, in the order the libraries were first seen.
    pub fn resolutions(&self) -> &[ResolutionState] {
        &self.resolutions
    }

    /// Libraries this unit has resolution state in.
    pub fn libraries_resolving(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.resolutions.iter().map(|r| r.library)
    }

    /// State of the `resolved-tree` slot for `library`; INVALID if the unit
    /// was never resolved there.
    pub fn resolved_tree_state(&self, library: SourceId) -> CacheState {
        self.resolution(library)
            .map(|r| r.resolved_tree.state())
            .unwrap_or(CacheState::Invalid)
    }

    /// Libraries that include this unit, as recorded by their parse results.
    pub fn containing_libraries(&self) -> &[SourceId] {
        &self.containing_libraries
    }

    /// Records that `library` includes this unit.
    pub fn add_containing_library(&mut self, library: SourceId) {
        if !self.containing_libraries.contains(&library) {
            self.containing_libraries.push(library);
        }
    }

    /// Records that `library` no longer includes this unit.
    ///
    /// Resolution results within that library become meaningless and are
    /// invalidated.
    pub fn remove_containing_library(&mut self, library: SourceId) {
        self.containing_libraries.retain(|l| *l != library);
        if let Some(state) = self.resolutions.iter_mut().find(|r| r.library == library) {
            state.invalidate();
        }
    }

    /// Parse diagnostics followed by the resolution diagnostics of every
    /// library. Slots that are not VALID contribute nothing.
    pub fn all_diagnostics(&self) -> Vec<Diagnostic> {
        let mut all: Vec<Diagnostic> = self.parse_diagnostics.value().cloned().unwrap_or_default();
        for state in &self.resolutions {
            if let Some(diags) = state.resolution_diagnostics.value() {
                all.extend(diags.iter().cloned());
            }
        }
        all
    }

    /// The parsed tree if cached, otherwise any cached resolved tree.
    pub fn any_parsed_tree(&self) -> Option<&TreeRef> {
        self.parsed_tree
            .value()
            .or_else(|| self.any_resolved_tree())
    }

    /// The resolved tree of the first library that has one cached.
    pub fn any_resolved_tree(&self) -> Option<&TreeRef> {
        self.resolutions
            .iter()
            .find_map(|r| r.resolved_tree.value())
    }

    /// Returns `true` if some tree is cached that resolution could start from.
    pub fn has_resolvable_tree(&self) -> bool {
        self.parsed_tree.is_valid() || self.resolutions.iter().any(|r| r.resolved_tree.is_valid())
    }

    /// Returns `true` if the unit has been resolved in every library it has
    /// resolution state in, even if some of those trees were flushed since.
    pub fn is_refactoring_safe(&self) -> bool {
        !self.resolutions.is_empty()
            && self.resolutions.iter().all(|r| {
                matches!(
                    r.resolved_tree.state(),
                    CacheState::Valid | CacheState::Flushed
                )
            })
    }

    /// Returns `true` if any slot holds a cached failure.
    pub fn has_error_state(&self) -> bool {
        self.line_index.state() == CacheState::Error
            || self.parsed_tree.state() == CacheState::Error
            || self.parse_diagnostics.state() == CacheState::Error
            || self.resolutions.iter().any(ResolutionState::has_error_state)
    }

    pub(crate) fn invalidate_resolved_tree(&mut self) {
        for state in &mut self.resolutions {
            state.invalidate();
        }
    }

    pub(crate) fn invalidate_library_resolution(&mut self, library: SourceId) {
        if let Some(state) = self.resolutions.iter_mut().find(|r| r.library == library) {
            state.invalidate();
        }
    }

    pub(crate) fn invalidate_all(&mut self) {
        self.line_index.invalidate();
        self.parsed_tree.invalidate();
        self.parse_diagnostics.invalidate();
        self.invalidate_resolved_tree();
    }

    pub(crate) fn flush_ast_structures(&mut self) -> usize {
        let mut flushed = usize::from(self.parsed_tree.flush());
        for state in &mut self.resolutions {
            flushed += usize::from(state.resolved_tree.flush());
        }
        flushed
    }

    pub(crate) fn abandon_in_process(&mut self) -> usize {
        let mut abandoned = usize::from(self.line_index.abandon())
            + usize::from(self.parsed_tree.abandon())
            + usize::from(self.parse_diagnostics.abandon());
        for state in &mut self.resolutions {
            abandoned += state.abandon();
        }
        abandoned
    }

    /// Enumerates every slot. An entry without resolution state reports one
    /// INVALID row for each per-library slot kind.
    pub fn visit_slots(&self, f: &mut SlotVisitor<'_>) {
        visit(&self.line_index, SlotKind::LineIndex, f);
        visit(&self.parsed_tree, SlotKind::ParsedTree, f);
        visit(&self.parse_diagnostics, SlotKind::ParseDiagnostics, f);
        if self.resolutions.is_empty() {
            f(SlotKind::ResolvedTree, CacheState::Invalid, None);
            f(SlotKind::ResolutionDiagnostics, CacheState::Invalid, None);
        }
        for state in &self.resolutions {
            visit(&state.resolved_tree, SlotKind::ResolvedTree, f);
            visit(&state.resolution_diagnostics, SlotKind::ResolutionDiagnostics, f);
        }
    }
}

/// Cached state of a library: its defining unit plus library-level results.
#[derive(Debug, Clone, Default)]
pub struct LibraryEntry {
    unit: UnitEntry,
    imported_libraries: Slot<Vec<SourceId>>,
    exported_libraries: Slot<Vec<SourceId>>,
    included_parts: Slot<Vec<SourceId>>,
    library_element: Slot<Arc<LibraryElement>>,
    public_namespace: Slot<Arc<Namespace>>,
}

impl LibraryEntry {
    /// Creates an entry with every slot INVALID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns a unit entry that turned out to define a library into a library
    /// entry. The unit's slots are kept; the library slots start INVALID.
    pub fn from_unit(unit: UnitEntry) -> Self {
        Self {
            unit,
            ..Self::default()
        }
    }

    /// Drops the library slots, keeping the unit's.
    pub fn into_unit(self) -> UnitEntry {
        self.unit
    }

    /// Creates an entry with every slot INVALID.
    pub fn copy(&self) -> Self {
        Self::from_unit(self.unit.copy())
    }

    /// The unit-level slots of this library.
    pub fn unit(&self) -> &UnitEntry {
        &self.unit
    }

    /// Mutable access to the unit-level slots.
    ///
    /// Cascading invalidation has to go through [`LibraryEntry`] itself.
    pub fn unit_mut(&mut self) -> &mut UnitEntry {
        &mut self.unit
    }

    /// The `imported-libraries` slot.
    pub fn imported_libraries(&self) -> &Slot<Vec<SourceId>> {
        &self.imported_libraries
    }

    /// Mutable access to the `imported-libraries` slot.
    pub fn imported_libraries_mut(&mut self) -> &mut Slot<Vec<SourceId>> {
        &mut self.imported_libraries
    }

    /// The `exported-libraries` slot.
    pub fn exported_libraries(&self) -> &Slot<Vec<SourceId>> {
        &self.exported_libraries
    }

    /// Mutable access to the `exported-libraries` slot.
    pub fn exported_libraries_mut(&mut self) -> &mut Slot<Vec<SourceId>> {
        &mut self.exported_libraries
    }

    /// The `included-parts` slot.
    pub fn included_parts(&self) -> &Slot<Vec<SourceId>> {
        &self.included_parts
    }

    /// Mutable access to the `included-parts` slot.
    pub fn included_parts_mut(&mut self) -> &mut Slot<Vec<SourceId>> {
        &mut self.included_parts
    }

    /// The `library-element` slot.
    pub fn library_element(&self) -> &Slot<Arc<LibraryElement>> {
        &self.library_element
    }

    /// Mutable access to the `library-element` slot.
    pub fn library_element_mut(&mut self) -> &mut Slot<Arc<LibraryElement>> {
        &mut self.library_element
    }

    /// The `public-namespace` slot.
    pub fn public_namespace(&self) -> &Slot<Arc<Namespace>> {
        &self.public_namespace
    }

    /// Mutable access to the `public-namespace` slot.
    pub fn public_namespace_mut(&mut self) -> &mut Slot<Arc<Namespace>> {
        &mut self.public_namespace
    }

    /// Invalidates every resolution result of the library's own unit, the
    /// library element and the public namespace derived from it.
    pub fn invalidate_resolved_tree(&mut self) {
        self.unit.invalidate_resolved_tree();
        self.library_element.invalidate();
        self.public_namespace.invalidate();
    }

    /// Invalidates every slot.
    pub fn invalidate_all(&mut self) {
        self.unit.invalidate_all();
        self.imported_libraries.invalidate();
        self.exported_libraries.invalidate();
        self.included_parts.invalidate();
        self.library_element.invalidate();
        self.public_namespace.invalidate();
    }

    /// Returns `true` if any slot holds a cached failure.
    pub fn has_error_state(&self) -> bool {
        self.unit.has_error_state()
            || [
                self.imported_libraries.state(),
                self.exported_libraries.state(),
                self.included_parts.state(),
                self.library_element.state(),
                self.public_namespace.state(),
            ]
            .contains(&CacheState::Error)
    }

    pub(crate) fn abandon_in_process(&mut self) -> usize {
        self.unit.abandon_in_process()
            + [
                self.imported_libraries.abandon(),
                self.exported_libraries.abandon(),
                self.included_parts.abandon(),
                self.library_element.abandon(),
                self.public_namespace.abandon(),
            ]
            .into_iter()
            .filter(|abandoned| *abandoned)
            .count()
    }

    /// Enumerates every slot, unit-level slots first.
    pub fn visit_slots(&self, f: &mut SlotVisitor<'_>) {
        self.unit.visit_slots(f);
        visit(&self.imported_libraries, SlotKind::ImportedLibraries, f);
        visit(&self.exported_libraries, SlotKind::ExportedLibraries, f);
        visit(&self.included_parts, SlotKind::IncludedParts, f);
        visit(&self.library_element, SlotKind::LibraryElement, f);
        visit(&self.public_namespace, SlotKind::PublicNamespace, f);
    }
}
