//! Cache entries for markup documents.

use std::sync::Arc;

use ember_source::{LineIndex, SourceId};

use crate::artifact::{MarkupElement, TreeRef};
use crate::slot::Slot;
use crate::state::{CacheState, SlotKind};
use crate::unit::{visit, SlotVisitor};

/// Cached state of a markup document.
///
/// Markup is parsed into its own tree, which references libraries by
/// identity. Resolving the markup produces the resolved tree and the markup
/// element; the element is derived from the resolved tree and never outlives
/// it.
#[derive(Debug, Clone, Default)]
pub struct MarkupEntry {
    line_index: Slot<LineIndex>,
    parsed_markup: Slot<TreeRef>,
    referenced_libraries: Slot<Vec<SourceId>>,
    resolved_markup: Slot<TreeRef>,
    markup_element: Slot<Arc<MarkupElement>>,
}

impl MarkupEntry {
    /// Creates an entry with every slot INVALID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an entry with every slot INVALID.
    pub fn copy(&self) -> Self {
        Self::new()
    }

    /// The `line-index` slot.
    pub fn line_index(&self) -> &Slot<LineIndex> {
        &self.line_index
    }

    /// Mutable access to the `line-index` slot.
    pub fn line_index_mut(&mut self) -> &mut Slot<LineIndex> {
        &mut self.line_index
    }

    /// The `parsed-markup` slot.
    pub fn parsed_markup(&self) -> &Slot<TreeRef> {
        &self.parsed_markup
    }

    /// Mutable access to the `parsed-markup` slot.
    pub fn parsed_markup_mut(&mut self) -> &mut Slot<TreeRef> {
        &mut self.parsed_markup
    }

    /// The `referenced-libraries` slot.
    pub fn referenced_libraries(&self) -> &Slot<Vec<SourceId>> {
        &self.referenced_libraries
    }

    /// Mutable access to the `referenced-libraries` slot.
    pub fn referenced_libraries_mut(&mut self) -> &mut Slot<Vec<SourceId>> {
        &mut self.referenced_libraries
    }

    /// The `resolved-markup` slot.
    pub fn resolved_markup(&self) -> &Slot<TreeRef> {
        &self.resolved_markup
    }

    /// Mutable access to the `resolved-markup` slot.
    pub fn resolved_markup_mut(&mut self) -> &mut Slot<TreeRef> {
        &mut self.resolved_markup
    }

    /// The `markup-element` slot.
    pub fn markup_element(&self) -> &Slot<Arc<MarkupElement>> {
        &self.markup_element
    }

    /// Mutable access to the `markup-element` slot.
    pub fn markup_element_mut(&mut self) -> &mut Slot<Arc<MarkupElement>> {
        &mut self.markup_element
    }

    /// Invalidates the resolved markup and the element derived from it.
    pub fn invalidate_resolved_markup(&mut self) {
        self.resolved_markup.invalidate();
        self.markup_element.invalidate();
    }

    /// Invalidates every slot.
    pub fn invalidate_all(&mut self) {
        self.line_index.invalidate();
        self.parsed_markup.invalidate();
        self.referenced_libraries.invalidate();
        self.invalidate_resolved_markup();
    }

    /// The parsed tree if cached, otherwise the resolved one.
    pub fn any_tree(&self) -> Option<&TreeRef> {
        self.parsed_markup
            .value()
            .or_else(|| self.resolved_markup.value())
    }

    /// Returns `true` if any slot holds a cached failure.
    pub fn has_error_state(&self) -> bool {
        [
            self.line_index.state(),
            self.parsed_markup.state(),
            self.referenced_libraries.state(),
            self.resolved_markup.state(),
            self.markup_element.state(),
        ]
        .contains(&CacheState::Error)
    }

    pub(crate) fn flush_ast_structures(&mut self) -> usize {
        usize::from(self.parsed_markup.flush()) + usize::from(self.resolved_markup.flush())
    }

    pub(crate) fn abandon_in_process(&mut self) -> usize {
        [
            self.line_index.abandon(),
            self.parsed_markup.abandon(),
            self.referenced_libraries.abandon(),
            self.resolved_markup.abandon(),
            self.markup_element.abandon(),
        ]
        .into_iter()
        .filter(|abandoned| *abandoned)
        .count()
    }

    /// Enumerates every slot.
    pub fn visit_slots(&self, f: &mut SlotVisitor<'_>) {
        visit(&self.line_index, SlotKind::LineIndex, f);
        visit(&self.parsed_markup, SlotKind::ParsedMarkup, f);
        visit(&self.referenced_libraries, SlotKind::ReferencedLibraries, f);
        visit(&self.resolved_markup, SlotKind::ResolvedMarkup, f);
        visit(&self.markup_element, SlotKind::MarkupElement, f);
    }
}
