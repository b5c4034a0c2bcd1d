//! Diagnostic codes with a phase prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The analysis phase that produced a diagnostic.
///
/// The phase decides which cache slot a diagnostic lives in: syntax codes
/// belong to `parse-diagnostics`, resolution and hint codes to the
/// library-keyed `resolution-diagnostics`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
    /// Scanning and parsing, prefixed with `P`.
    Syntax,
    /// Name and type resolution, prefixed with `R`.
    Resolution,
    /// Markup parsing and resolution, prefixed with `M`.
    Markup,
    /// Hints, prefixed with `H`.
    Hint,
}

impl Category {
    /// Returns the single-character prefix for this category.
    pub fn prefix(self) -> char {
        match self {
            Category::Syntax => 'P',
            Category::Resolution => 'R',
            Category::Markup => 'M',
            Category::Hint => 'H',
        }
    }
}

/// A diagnostic code: category prefix plus a zero-padded 3-digit number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct DiagnosticCode {
    /// The category of this diagnostic.
    pub category: Category,
    /// The numeric identifier within the category.
    pub number: u16,
}

impl DiagnosticCode {
    /// Creates a new diagnostic code.
    pub fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.category.prefix(), self.number)
    }
}
