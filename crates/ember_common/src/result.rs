//! Result and error types for contract violations inside the analysis core.

/// The result type for operations that can only fail through caller misuse.
///
/// `Err` never describes a problem with user sources. Failures to analyze a
/// source are recorded in the cache as data; an `Err` here means the caller
/// broke a contract of the core (for example, starting a second computation
/// of a slot that is already being computed).
pub type EmberResult<T> = Result<T, InternalError>;

/// A contract violation indicating a bug in a caller of the analysis core.
///
/// These errors never occur when the single-writer discipline is respected.
/// Encountering one means two computations overlapped or a driver skipped a
/// required step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("internal analysis error: {message}")]
pub struct InternalError {
    /// Description of the violated contract.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
