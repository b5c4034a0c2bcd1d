//! Source identities, classification, spans and line indexes.
//!
//! Every tracked source is named by a [`SourceId`] interned from its URI in a
//! [`SourceRegistry`]. Identities are stable for the lifetime of the registry
//! and are the only way cache entries refer to each other.

#![warn(missing_docs)]

pub mod kind;
pub mod line_index;
pub mod registry;
pub mod source_id;
pub mod span;

pub use kind::SourceKind;
pub use line_index::LineIndex;
pub use registry::SourceRegistry;
pub use source_id::SourceId;
pub use span::Span;
