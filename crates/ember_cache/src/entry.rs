//! The per-source container of cache slots.

use ember_diagnostics::{Diagnostic, Severity};
use ember_source::{LineIndex, SourceId, SourceKind};

use crate::markup::MarkupEntry;
use crate::slot::Slot;
use crate::state::CacheState;
use crate::unit::{LibraryEntry, SlotVisitor, UnitEntry};

/// Cached state of one tracked source.
///
/// A library is a unit with extra slots, so [`SourceEntry::as_unit`] returns
/// the unit part of both `Unit` and `Library` entries.
#[derive(Debug, Clone, Default)]
pub enum SourceEntry {
    /// The kind of the source has not been determined yet. Carries no slots.
    #[default]
    Unclassified,
    /// A code unit that is not known to define a library.
    Unit(UnitEntry),
    /// A code unit that defines a library.
    Library(LibraryEntry),
    /// A markup document.
    Markup(MarkupEntry),
}

impl SourceEntry {
    /// Creates an entry of the given kind with every slot INVALID.
    pub fn new(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Unknown => SourceEntry::Unclassified,
            SourceKind::Part => SourceEntry::Unit(UnitEntry::new()),
            SourceKind::Library => SourceEntry::Library(LibraryEntry::new()),
            SourceKind::Markup => SourceEntry::Markup(MarkupEntry::new()),
        }
    }

    /// The kind of source this entry describes.
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceEntry::Unclassified => SourceKind::Unknown,
            SourceEntry::Unit(_) => SourceKind::Part,
            SourceEntry::Library(_) => SourceKind::Library,
            SourceEntry::Markup(_) => SourceKind::Markup,
        }
    }

    /// Creates an entry of the same kind with every slot INVALID.
    ///
    /// Cached results are never carried over.
    pub fn copy(&self) -> Self {
        match self {
            SourceEntry::Unclassified => SourceEntry::Unclassified,
            SourceEntry::Unit(unit) => SourceEntry::Unit(unit.copy()),
            SourceEntry::Library(library) => SourceEntry::Library(library.copy()),
            SourceEntry::Markup(markup) => SourceEntry::Markup(markup.copy()),
        }
    }

    /// Changes the kind of this entry.
    ///
    /// A unit becoming a library, or a library becoming a plain unit, keeps
    /// its unit-level slots; the library slots are created or dropped. Every
    /// other change starts from a fresh entry.
    pub fn reclassify(&mut self, kind: SourceKind) {
        if self.kind() == kind {
            return;
        }
        *self = match (std::mem::take(self), kind) {
            (SourceEntry::Unit(unit), SourceKind::Library) => {
                SourceEntry::Library(LibraryEntry::from_unit(unit))
            }
            (SourceEntry::Library(library), SourceKind::Part) => {
                SourceEntry::Unit(library.into_unit())
            }
            (_, kind) => SourceEntry::new(kind),
        };
    }

    /// The unit-level slots of a `Unit` or `Library` entry.
    pub fn as_unit(&self) -> Option<&UnitEntry> {
        match self {
            SourceEntry::Unit(unit) => Some(unit),
            SourceEntry::Library(library) => Some(library.unit()),
            _ => None,
        }
    }

    /// Mutable unit-level slots of a `Unit` or `Library` entry.
    pub fn as_unit_mut(&mut self) -> Option<&mut UnitEntry> {
        match self {
            SourceEntry::Unit(unit) => Some(unit),
            SourceEntry::Library(library) => Some(library.unit_mut()),
            _ => None,
        }
    }

    /// The library entry, if this source defines a library.
    pub fn as_library(&self) -> Option<&LibraryEntry> {
        match self {
            SourceEntry::Library(library) => Some(library),
            _ => None,
        }
    }

    /// Mutable library entry, if this source defines a library.
    pub fn as_library_mut(&mut self) -> Option<&mut LibraryEntry> {
        match self {
            SourceEntry::Library(library) => Some(library),
            _ => None,
        }
    }

    /// The markup entry, if this source is a markup document.
    pub fn as_markup(&self) -> Option<&MarkupEntry> {
        match self {
            SourceEntry::Markup(markup) => Some(markup),
            _ => None,
        }
    }

    /// Mutable markup entry, if this source is a markup document.
    pub fn as_markup_mut(&mut self) -> Option<&mut MarkupEntry> {
        match self {
            SourceEntry::Markup(markup) => Some(markup),
            _ => None,
        }
    }

    /// The `line-index` slot. Unclassified entries have none.
    pub fn line_index(&self) -> Option<&Slot<LineIndex>> {
        match self {
            SourceEntry::Unclassified => None,
            SourceEntry::Unit(unit) => Some(unit.line_index()),
            SourceEntry::Library(library) => Some(library.unit().line_index()),
            SourceEntry::Markup(markup) => Some(markup.line_index()),
        }
    }

    /// Mutable `line-index` slot. Unclassified entries have none.
    pub fn line_index_mut(&mut self) -> Option<&mut Slot<LineIndex>> {
        match self {
            SourceEntry::Unclassified => None,
            SourceEntry::Unit(unit) => Some(unit.line_index_mut()),
            SourceEntry::Library(library) => Some(library.unit_mut().line_index_mut()),
            SourceEntry::Markup(markup) => Some(markup.line_index_mut()),
        }
    }

    /// Invalidates every slot, as after a content change.
    pub fn invalidate_all(&mut self) {
        match self {
            SourceEntry::Unclassified => {}
            SourceEntry::Unit(unit) => unit.invalidate_all(),
            SourceEntry::Library(library) => library.invalidate_all(),
            SourceEntry::Markup(markup) => markup.invalidate_all(),
        }
    }

    /// Invalidates every resolution result together with the results derived
    /// from it.
    ///
    /// For units this covers the resolution slots of every library; libraries
    /// also lose their element and public namespace; markup loses its
    /// resolved tree and element.
    pub fn invalidate_resolved_tree(&mut self) {
        match self {
            SourceEntry::Unclassified => {}
            SourceEntry::Unit(unit) => unit.invalidate_resolved_tree(),
            SourceEntry::Library(library) => library.invalidate_resolved_tree(),
            SourceEntry::Markup(markup) => markup.invalidate_resolved_markup(),
        }
    }

    /// Invalidates the resolution slots of a unit within one library only.
    pub fn invalidate_library_resolution(&mut self, library: SourceId) {
        if let Some(unit) = self.as_unit_mut() {
            unit.invalidate_library_resolution(library);
        }
    }

    /// Moves VALID trees to FLUSHED. Returns the number of trees discarded.
    pub fn flush_ast_structures(&mut self) -> usize {
        match self {
            SourceEntry::Unclassified => 0,
            SourceEntry::Unit(unit) => unit.flush_ast_structures(),
            SourceEntry::Library(library) => library.unit_mut().flush_ast_structures(),
            SourceEntry::Markup(markup) => markup.flush_ast_structures(),
        }
    }

    /// Moves every IN_PROCESS slot back to INVALID. Returns how many there
    /// were.
    pub fn abandon_in_process(&mut self) -> usize {
        match self {
            SourceEntry::Unclassified => 0,
            SourceEntry::Unit(unit) => unit.abandon_in_process(),
            SourceEntry::Library(library) => library.abandon_in_process(),
            SourceEntry::Markup(markup) => markup.abandon_in_process(),
        }
    }

    /// Returns `true` if any slot holds a cached failure.
    pub fn has_error_state(&self) -> bool {
        match self {
            SourceEntry::Unclassified => false,
            SourceEntry::Unit(unit) => unit.has_error_state(),
            SourceEntry::Library(library) => library.has_error_state(),
            SourceEntry::Markup(markup) => markup.has_error_state(),
        }
    }

    /// Returns `true` if any slot is IN_PROCESS.
    pub fn has_work_in_process(&self) -> bool {
        let mut in_process = false;
        self.visit_slots(&mut |_, state, _| in_process |= state == CacheState::InProcess);
        in_process
    }

    /// Parse diagnostics followed by resolution diagnostics.
    pub fn all_diagnostics(&self) -> Vec<Diagnostic> {
        self.as_unit()
            .map(UnitEntry::all_diagnostics)
            .unwrap_or_default()
    }

    /// The worst severity among the cached diagnostics, `None` when there
    /// are none or they are not computed yet.
    pub fn worst_severity(&self) -> Option<Severity> {
        Severity::worst(self.all_diagnostics().iter().map(|d| d.severity))
    }

    /// Enumerates every slot of the entry.
    pub fn visit_slots(&self, f: &mut SlotVisitor<'_>) {
        match self {
            SourceEntry::Unclassified => {}
            SourceEntry::Unit(unit) => unit.visit_slots(f),
            SourceEntry::Library(library) => library.visit_slots(f),
            SourceEntry::Markup(markup) => markup.visit_slots(f),
        }
    }
}
