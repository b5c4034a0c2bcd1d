//! Units of work handed to the driver, and the results it hands back.
//!
//! The driver asks the context for the next [`WorkItem`], starts it with the
//! matching `begin_*` call to get a task, runs the external parser or
//! resolver, and reports the outcome with the matching `record_*` call. A task
//! holds the slot tickets of its computation, so a result whose inputs were
//! invalidated in the meantime is dropped instead of stored.

use std::fmt;
use std::time::Instant;

use ember_diagnostics::Diagnostic;
use ember_source::{LineIndex, SourceId};

use crate::artifact::{LibraryElement, MarkupElement, TreeRef};
use crate::incremental::IncrementalCache;
use crate::slot::Ticket;

/// The next thing the driver should compute.
#[derive(Debug, Clone)]
pub enum WorkItem {
    /// Reparse the edit window of a cached tree.
    Incremental(IncrementalCache),
    /// Scan and parse a code unit.
    Parse(SourceId),
    /// Resolve a library together with every library in its import cycle.
    ResolveLibrary {
        /// The library that asked for resolution.
        library: SourceId,
        /// Every library in the same strongly connected component, including
        /// `library`.
        cycle: Vec<SourceId>,
    },
    /// Parse a markup document.
    ParseMarkup(SourceId),
    /// Resolve a markup document against its referenced libraries.
    ResolveMarkup(SourceId),
}

impl WorkItem {
    /// The source the work is for.
    pub fn source(&self) -> SourceId {
        match self {
            WorkItem::Incremental(cache) => cache.source(),
            WorkItem::Parse(source)
            | WorkItem::ParseMarkup(source)
            | WorkItem::ResolveMarkup(source) => *source,
            WorkItem::ResolveLibrary { library, .. } => *library,
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::Incremental(cache) => write!(f, "incremental {}", cache.source()),
            WorkItem::Parse(source) => write!(f, "parse {source}"),
            WorkItem::ResolveLibrary { library, cycle } => {
                write!(f, "resolve {library}")?;
                if cycle.len() > 1 {
                    write!(f, " (cycle of {})", cycle.len())?;
                }
                Ok(())
            }
            WorkItem::ParseMarkup(source) => write!(f, "parse markup {source}"),
            WorkItem::ResolveMarkup(source) => write!(f, "resolve markup {source}"),
        }
    }
}

/// A started parse of one code unit.
#[derive(Debug)]
#[must_use = "a started task must be recorded"]
pub struct ParseTask {
    pub(crate) source: SourceId,
    pub(crate) started: Instant,
    pub(crate) line_index: Option<Ticket>,
    pub(crate) parsed_tree: Option<Ticket>,
    pub(crate) parse_diagnostics: Option<Ticket>,
}

impl ParseTask {
    /// The unit being parsed.
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Returns `true` if every parse result was already cached, so the
    /// parse has nothing to produce.
    pub fn is_empty(&self) -> bool {
        self.line_index.is_none() && self.parsed_tree.is_none() && self.parse_diagnostics.is_none()
    }
}

/// What the parser produced for a code unit.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    /// Line starts of the parsed text.
    pub line_index: LineIndex,
    /// The unresolved tree.
    pub tree: TreeRef,
    /// Syntax errors.
    pub diagnostics: Vec<Diagnostic>,
    /// Whether the unit defines a library, and if so its directives.
    pub library: Option<LibraryDirectives>,
}

/// Directives found while parsing a library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryDirectives {
    /// Imported libraries.
    pub imports: Vec<SourceId>,
    /// Exported libraries.
    pub exports: Vec<SourceId>,
    /// Included parts.
    pub parts: Vec<SourceId>,
}

#[derive(Debug)]
pub(crate) struct UnitTickets {
    pub(crate) unit: SourceId,
    pub(crate) resolved_tree: Option<Ticket>,
    pub(crate) resolution_diagnostics: Option<Ticket>,
}

#[derive(Debug)]
pub(crate) struct LibraryTickets {
    pub(crate) library: SourceId,
    pub(crate) element: Option<Ticket>,
    pub(crate) namespace: Option<Ticket>,
    pub(crate) units: Vec<UnitTickets>,
}

/// A started resolution of one import cycle.
#[derive(Debug)]
#[must_use = "a started task must be recorded"]
pub struct ResolutionTask {
    pub(crate) library: SourceId,
    pub(crate) started: Instant,
    pub(crate) libraries: Vec<LibraryTickets>,
}

impl ResolutionTask {
    /// The library that asked for resolution.
    pub fn library(&self) -> SourceId {
        self.library
    }

    /// Libraries resolved by this task.
    pub fn libraries(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.libraries.iter().map(|l| l.library)
    }

    /// Units of `library` to resolve, the library's own unit first.
    pub fn units_of(&self, library: SourceId) -> Vec<SourceId> {
        self.libraries
            .iter()
            .find(|l| l.library == library)
            .map(|l| l.units.iter().map(|u| u.unit).collect())
            .unwrap_or_default()
    }
}

/// What the resolver produced for an import cycle.
#[derive(Debug, Clone, Default)]
pub struct ResolutionOutput {
    /// One result per resolved library.
    pub libraries: Vec<LibraryResolution>,
}

/// Resolution result of one library.
#[derive(Debug, Clone)]
pub struct LibraryResolution {
    /// The library.
    pub library: SourceId,
    /// Its semantic model.
    pub element: LibraryElement,
    /// Resolved units of the library, its own unit included.
    pub units: Vec<UnitResolution>,
}

/// Resolution result of one unit within one library.
#[derive(Debug, Clone)]
pub struct UnitResolution {
    /// The unit.
    pub unit: SourceId,
    /// The resolved tree.
    pub tree: TreeRef,
    /// Resolution errors.
    pub diagnostics: Vec<Diagnostic>,
}

/// A started parse of a markup document.
#[derive(Debug)]
#[must_use = "a started task must be recorded"]
pub struct MarkupParseTask {
    pub(crate) source: SourceId,
    pub(crate) started: Instant,
    pub(crate) line_index: Option<Ticket>,
    pub(crate) parsed_markup: Option<Ticket>,
    pub(crate) referenced_libraries: Option<Ticket>,
}

impl MarkupParseTask {
    /// The document being parsed.
    pub fn source(&self) -> SourceId {
        self.source
    }
}

/// What the markup parser produced.
#[derive(Debug, Clone)]
pub struct MarkupParseOutput {
    /// Line starts of the parsed text.
    pub line_index: LineIndex,
    /// The unresolved markup tree.
    pub tree: TreeRef,
    /// Libraries embedded in or linked from the document.
    pub referenced_libraries: Vec<SourceId>,
}

/// A started resolution of a markup document.
#[derive(Debug)]
#[must_use = "a started task must be recorded"]
pub struct MarkupResolutionTask {
    pub(crate) source: SourceId,
    pub(crate) started: Instant,
    pub(crate) resolved_markup: Option<Ticket>,
    pub(crate) markup_element: Option<Ticket>,
}

impl MarkupResolutionTask {
    /// The document being resolved.
    pub fn source(&self) -> SourceId {
        self.source
    }
}

/// What the markup resolver produced.
#[derive(Debug, Clone)]
pub struct MarkupResolutionOutput {
    /// The resolved markup tree.
    pub tree: TreeRef,
    /// The semantic model of the document.
    pub element: MarkupElement,
}
