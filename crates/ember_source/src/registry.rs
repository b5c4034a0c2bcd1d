//! URI interning for source identities.

use lasso::ThreadedRodeo;

use crate::kind::SourceKind;
use crate::source_id::SourceId;

/// File extensions whose sources are markup documents rather than code units.
const MARKUP_EXTENSIONS: &[&str] = &["html", "htm"];

/// Thread-safe registry mapping source URIs to [`SourceId`]s.
///
/// Interning the same URI twice yields the same identity, so editor
/// notifications and dependency directives that name a source by URI all
/// land on one cache entry.
pub struct SourceRegistry {
    rodeo: ThreadedRodeo<SourceId>,
}

impl SourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
        }
    }

    /// Returns the identity for `uri`, allocating one on first mention.
    pub fn intern(&self, uri: &str) -> SourceId {
        self.rodeo.get_or_intern(uri)
    }

    /// Returns the identity for `uri` if it has been interned before.
    pub fn get(&self, uri: &str) -> Option<SourceId> {
        self.rodeo.get(uri)
    }

    /// Resolves an identity back to its URI.
    ///
    /// Returns `None` for identities not produced by this registry.
    pub fn uri(&self, id: SourceId) -> Option<&str> {
        self.rodeo.try_resolve(&id)
    }

    /// Returns the number of interned sources.
    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    /// Returns `true` if nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }

    /// Guesses the kind of a source from its URI alone.
    ///
    /// Markup is recognizable by extension. Whether a code unit is a library
    /// or a part is only known after parsing, so those report
    /// [`SourceKind::Unknown`].
    pub fn kind_hint(&self, id: SourceId) -> SourceKind {
        match self.uri(id) {
            Some(uri) if is_markup_uri(uri) => SourceKind::Markup,
            _ => SourceKind::Unknown,
        }
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_markup_uri(uri: &str) -> bool {
    uri.rsplit_once('.')
        .map(|(_, ext)| {
            MARKUP_EXTENSIONS
                .iter()
                .any(|m| ext.eq_ignore_ascii_case(m))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable() {
        let reg = SourceRegistry::new();
        let a = reg.intern("file:///lib/a.dart");
        let b = reg.intern("file:///lib/a.dart");
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn distinct_uris_distinct_ids() {
        let reg = SourceRegistry::new();
        assert_ne!(
            reg.intern("file:///lib/a.dart"),
            reg.intern("file:///lib/b.dart")
        );
    }

    #[test]
    fn uri_roundtrip() {
        let reg = SourceRegistry::new();
        let id = reg.intern("file:///web/index.html");
        assert_eq!(reg.uri(id), Some("file:///web/index.html"));
        assert_eq!(reg.get("file:///web/index.html"), Some(id));
        assert_eq!(reg.get("file:///missing.dart"), None);
    }

    #[test]
    fn unknown_id_has_no_uri() {
        let reg = SourceRegistry::new();
        assert!(reg.uri(SourceId::from_raw(99)).is_none());
    }

    #[test]
    fn kind_hint_by_extension() {
        let reg = SourceRegistry::new();
        let page = reg.intern("file:///web/Index.HTML");
        let code = reg.intern("file:///lib/main.dart");
        assert_eq!(reg.kind_hint(page), SourceKind::Markup);
        assert_eq!(reg.kind_hint(code), SourceKind::Unknown);
    }

    #[test]
    fn empty_registry() {
        let reg = SourceRegistry::default();
        assert!(reg.is_empty());
    }
}
