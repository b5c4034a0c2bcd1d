//! Incremental analysis cache and work scheduling.
//!
//! This crate keeps the analysis results of every tracked source in
//! independently invalidated cache slots, works out which computation a driver
//! should run next, and throws away exactly what an edit made stale. Parsing
//! and resolution themselves are done by the driver; the cache only stores
//! their results.
//!
//! The entry point is [`AnalysisContext`]. A typical driver loop:
//!
//! ```
//! use ember_cache::{AnalysisContext, WorkItem};
//! use ember_config::AnalysisOptions;
//! use ember_source::{SourceId, SourceKind};
//!
//! let mut ctx = AnalysisContext::new(AnalysisOptions::default());
//! ctx.add_source(SourceId::from_raw(1), SourceKind::Part);
//! while let Some(item) = ctx.next_work() {
//!     match item {
//!         WorkItem::Parse(source) => {
//!             let task = ctx.begin_parse(source).unwrap();
//!             // Run the parser here, then hand the outcome back.
//!             # let failure = ember_cache::AnalysisFailure::new(
//!             #     ember_cache::FailureKind::Parse, "no parser");
//!             ctx.record_parse(task, Err(failure)).unwrap();
//!         }
//!         _ => unreachable!(),
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod artifact;
pub mod context;
pub mod entry;
pub mod error;
pub mod graph;
pub mod incremental;
pub mod markup;
pub mod metrics;
pub mod scheduler;
pub mod slot;
pub mod state;
pub mod statistics;
pub mod task;
pub mod unit;

pub use artifact::{LibraryElement, MarkupElement, Namespace, Symbol, SyntaxNode, TreeRef};
pub use context::AnalysisContext;
pub use entry::SourceEntry;
pub use error::{AnalysisFailure, CacheError, CacheResult, FailureKind};
pub use graph::DirectedGraph;
pub use incremental::{EditWindow, IncrementalCache};
pub use metrics::{Metrics, Phase};
pub use scheduler::{Priority, WorkScheduler};
pub use slot::{Slot, Ticket};
pub use state::{CacheState, SlotKind};
pub use statistics::{AnalysisStatistics, CacheRow};
pub use task::{
    LibraryDirectives, LibraryResolution, MarkupParseOutput, MarkupParseTask,
    MarkupResolutionOutput, MarkupResolutionTask, ParseOutput, ParseTask, ResolutionOutput,
    ResolutionTask, UnitResolution, WorkItem,
};
