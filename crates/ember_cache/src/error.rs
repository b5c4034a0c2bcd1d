//! Error types for the analysis cache.

use ember_common::InternalError;
use ember_source::{SourceId, SourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The phase of analysis in which a collaborator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureKind {
    /// The contents of the source could not be obtained.
    Content,
    /// Scanning or parsing failed.
    Parse,
    /// Building the element model or resolving names failed.
    Resolution,
    /// Parsing or resolving a markup document failed.
    Markup,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Content => write!(f, "content"),
            FailureKind::Parse => write!(f, "parse"),
            FailureKind::Resolution => write!(f, "resolution"),
            FailureKind::Markup => write!(f, "markup"),
        }
    }
}

/// Why a collaborator could not produce a slot's value.
///
/// Stored as the cause of a slot in the ERROR state. A cached failure is not
/// retried until something invalidates the slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} failed: {message}")]
pub struct AnalysisFailure {
    /// The phase that failed.
    pub kind: FailureKind,
    /// Description of the failure.
    pub message: String,
}

impl AnalysisFailure {
    /// Creates a failure record.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors returned by the analysis cache to its driver.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A graph query named a node the graph does not contain.
    #[error("node {node} is not in the dependency graph")]
    UnknownNode {
        /// Debug rendering of the missing node.
        node: String,
    },

    /// An operation named a source the context does not track.
    #[error("source {0} is not tracked by this context")]
    UnknownSource(SourceId),

    /// An operation needs a different kind of entry than the source has.
    #[error("source {id} is a {actual} entry, expected {expected}")]
    KindMismatch {
        /// The offending source.
        id: SourceId,
        /// The kind the operation requires.
        expected: SourceKind,
        /// The kind the entry actually has.
        actual: SourceKind,
    },

    /// A caller broke a contract of the cache.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Result type for fallible cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
