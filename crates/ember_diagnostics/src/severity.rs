//! How much a diagnostic matters to the unit it is reported on.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::code::Category;

/// Severity of a cached diagnostic.
///
/// Parse, resolution and markup problems are errors unless the producer says
/// otherwise; hints never are. Declaration order runs from the least severe
/// level up, so `max` over a unit's diagnostics yields its worst problem.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Advice that does not make the unit wrong.
    Hint,
    /// Code that analyzes but likely misbehaves.
    Warning,
    /// Code that is invalid.
    Error,
}

impl Severity {
    /// The severity a producer reports for `category` when it has no reason
    /// to pick another.
    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Hint => Severity::Hint,
            Category::Syntax | Category::Resolution | Category::Markup => Severity::Error,
        }
    }

    /// Returns `true` if this severity is [`Error`](Severity::Error).
    pub fn is_error(self) -> bool {
        self == Severity::Error
    }

    /// Single-letter marker used in compact listings.
    pub fn marker(self) -> char {
        match self {
            Severity::Hint => 'H',
            Severity::Warning => 'W',
            Severity::Error => 'E',
        }
    }

    /// The worst severity among `severities`, or `None` for an empty list.
    pub fn worst(severities: impl IntoIterator<Item = Severity>) -> Option<Severity> {
        severities.into_iter().max()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Hint => "hint",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(name)
    }
}
