//! Diagnostics produced by the parse and resolution collaborators.
//!
//! A [`Diagnostic`] is plain data: the analysis core stores lists of them in
//! the `parse-diagnostics` and `resolution-diagnostics` cache slots and hands
//! them back to clients, but never interprets them.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod severity;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::Diagnostic;
pub use severity::Severity;
