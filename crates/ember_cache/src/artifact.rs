//! Values stored in cache slots.
//!
//! The cache treats these as opaque results of external collaborators. The
//! only operations it needs itself are structural comparison of trees (for
//! verifying incremental reparses) and building a library's public namespace
//! from its element.

use std::collections::BTreeMap;
use std::sync::Arc;

use ember_source::{SourceId, Span};
use serde::{Deserialize, Serialize};

/// Shared handle to an immutable syntax tree.
///
/// Trees are shared between a unit's slots and the incremental cache. Two
/// handles to the same allocation are the same tree; see
/// [`Arc::ptr_eq`].
pub type TreeRef = Arc<SyntaxNode>;

/// One node of a parsed or resolved syntax tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    /// Grammar production of this node, e.g. `"class"` or `"import"`.
    pub kind: String,
    /// Source range covered by this node.
    pub span: Span,
    /// Declaration this node refers to, filled in by resolution.
    pub resolved: Option<Symbol>,
    /// Child nodes in source order.
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    /// Creates an unresolved leaf node.
    pub fn new(kind: impl Into<String>, span: Span) -> Self {
        Self {
            kind: kind.into(),
            span,
            resolved: None,
            children: Vec::new(),
        }
    }

    /// Appends a child node.
    pub fn with_child(mut self, child: SyntaxNode) -> Self {
        self.children.push(child);
        self
    }

    /// Attaches the declaration this node resolves to.
    pub fn with_resolution(mut self, symbol: Symbol) -> Self {
        self.resolved = Some(symbol);
        self
    }

    /// Returns the number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Compares the shape of two trees.
    ///
    /// Trees are structurally equal when they have the same node kinds
    /// arranged the same way. Spans and resolution results are ignored. The
    /// walk is iterative, so arbitrarily deep trees are fine.
    pub fn structurally_equal(&self, other: &SyntaxNode) -> bool {
        let mut stack = vec![(self, other)];
        while let Some((a, b)) = stack.pop() {
            if a.kind != b.kind || a.children.len() != b.children.len() {
                return false;
            }
            stack.extend(a.children.iter().zip(b.children.iter()));
        }
        true
    }
}

/// What kind of declaration a [`Symbol`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SymbolKind {
    /// A class or other type declaration.
    Type,
    /// A top-level function.
    Function,
    /// A top-level variable or constant.
    Variable,
}

/// A named top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    /// Declared name.
    pub name: String,
    /// Kind of declaration.
    pub kind: SymbolKind,
    /// Source containing the declaration.
    pub declared_in: SourceId,
}

impl Symbol {
    /// Creates a symbol.
    pub fn new(name: impl Into<String>, kind: SymbolKind, declared_in: SourceId) -> Self {
        Self {
            name: name.into(),
            kind,
            declared_in,
        }
    }

    /// Names starting with an underscore are private to their library.
    pub fn is_public(&self) -> bool {
        !self.name.starts_with('_')
    }
}

/// A `show` or `hide` clause on an export directive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Combinator {
    /// Only the listed names pass.
    Show(Vec<String>),
    /// Every name except the listed ones passes.
    Hide(Vec<String>),
}

impl Combinator {
    /// Returns `true` if `name` passes this clause.
    pub fn admits(&self, name: &str) -> bool {
        match self {
            Combinator::Show(names) => names.iter().any(|n| n == name),
            Combinator::Hide(names) => !names.iter().any(|n| n == name),
        }
    }
}

/// An export directive of a library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Export {
    /// The re-exported library.
    pub library: SourceId,
    /// Clauses applied in order; a name must pass all of them.
    pub combinators: Vec<Combinator>,
}

impl Export {
    /// Re-exports every public name of `library`.
    pub fn all(library: SourceId) -> Self {
        Self {
            library,
            combinators: Vec::new(),
        }
    }

    /// Returns `true` if `name` survives every combinator.
    pub fn admits(&self, name: &str) -> bool {
        self.combinators.iter().all(|c| c.admits(name))
    }
}

/// The semantic model of one library, produced by resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LibraryElement {
    /// Declared library name, if any.
    pub name: Option<String>,
    /// Declarations of the library and all its parts.
    pub symbols: Vec<Symbol>,
    /// Parts included by the library.
    pub parts: Vec<SourceId>,
    /// Imported libraries.
    pub imports: Vec<SourceId>,
    /// Export directives.
    pub exports: Vec<Export>,
}

/// The names a library makes visible to its importers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Namespace {
    names: BTreeMap<String, Symbol>,
}

impl Namespace {
    /// Builds the public namespace of `element`.
    ///
    /// Public declarations of the library come first. Each export then
    /// contributes the names of the exported library's namespace that pass
    /// its combinators; `exported` looks those namespaces up and returns
    /// `None` for libraries that are not resolved yet. A local declaration
    /// shadows an exported one with the same name.
    pub fn build<'a>(
        element: &LibraryElement,
        mut exported: impl FnMut(SourceId) -> Option<&'a Namespace>,
    ) -> Self {
        let mut names: BTreeMap<String, Symbol> = element
            .symbols
            .iter()
            .filter(|s| s.is_public())
            .map(|s| (s.name.clone(), s.clone()))
            .collect();
        for export in &element.exports {
            let Some(ns) = exported(export.library) else {
                continue;
            };
            for (name, symbol) in &ns.names {
                if export.admits(name) && !names.contains_key(name) {
                    names.insert(name.clone(), symbol.clone());
                }
            }
        }
        Self { names }
    }

    /// Looks up a visible name.
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.names.get(name)
    }

    /// Iterates visible names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Returns the number of visible names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if nothing is visible.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// The semantic model of a markup document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarkupElement {
    /// Libraries embedded in or linked from the document, in document order.
    pub libraries: Vec<SourceId>,
}
