//! Structured diagnostic messages.

use crate::code::DiagnosticCode;
use crate::severity::Severity;
use ember_source::Span;
use serde::{Deserialize, Serialize};

/// A single problem report attached to a source location.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The code identifying the kind of problem.
    pub code: DiagnosticCode,
    /// The main diagnostic message.
    pub message: String,
    /// Where the problem was detected.
    pub span: Span,
    /// Explanatory footnotes.
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Creates a diagnostic with an explicit severity.
    pub fn new(
        severity: Severity,
        code: DiagnosticCode,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            span,
            notes: Vec::new(),
        }
    }

    /// Creates a diagnostic with the usual severity of its code's category.
    pub fn for_code(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::for_category(code.category), code, message, span)
    }

    /// Creates a new error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Error, code, message, span)
    }

    /// Creates a new warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Warning, code, message, span)
    }

    /// Adds a note to this diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Category;
    use ember_source::SourceId;

    fn span() -> Span {
        Span::new(SourceId::from_raw(0), 3, 9)
    }

    #[test]
    fn create_error() {
        let code = DiagnosticCode::new(Category::Syntax, 101);
        let diag = Diagnostic::error(code, "expected ';'", span());
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.message, "expected ';'");
        assert_eq!(diag.code.to_string(), "P101");
    }

    #[test]
    fn create_warning_with_note() {
        let code = DiagnosticCode::new(Category::Resolution, 4);
        let diag = Diagnostic::warning(code, "unused import", span())
            .with_note("imported library declares no used names");
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.notes.len(), 1);
    }

    #[test]
    fn severity_follows_category() {
        let parse = Diagnostic::for_code(DiagnosticCode::new(Category::Syntax, 1), "bad", span());
        let hint = Diagnostic::for_code(DiagnosticCode::new(Category::Hint, 3), "dead code", span());
        assert_eq!(parse.severity, Severity::Error);
        assert_eq!(hint.severity, Severity::Hint);
    }

    #[test]
    fn serde_roundtrip() {
        let diag = Diagnostic::error(
            DiagnosticCode::new(Category::Markup, 2),
            "unclosed tag",
            span(),
        );
        let json = serde_json::to_string(&diag).unwrap();
        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(diag, back);
    }
}
