//! Classification of tracked sources.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a source turned out to be once it was examined.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum SourceKind {
    /// Not yet classified.
    Unknown,
    /// A code unit that is the root of a library.
    Library,
    /// A code unit that is included by one or more libraries.
    Part,
    /// A markup document that may embed or link libraries.
    Markup,
}

impl SourceKind {
    /// Returns `true` for code units, whether libraries or parts.
    pub fn is_unit(self) -> bool {
        matches!(self, SourceKind::Library | SourceKind::Part)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Unknown => write!(f, "unknown"),
            SourceKind::Library => write!(f, "library"),
            SourceKind::Part => write!(f, "part"),
            SourceKind::Markup => write!(f, "markup"),
        }
    }
}
