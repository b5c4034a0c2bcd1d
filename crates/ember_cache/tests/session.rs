//! End-to-end sessions driving the cache with a toy language.
//!
//! Every line of a toy source is one directive:
//!
//! ```text
//! library            the unit defines a library
//! import <uri>       library import
//! export <uri>       library re-export
//! part <uri>         included part
//! def <name>         top-level declaration
//! script <uri>       (markup only) referenced library
//! ```
//!
//! Anything else is a syntax error.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use ember_cache::artifact::{Export, SymbolKind};
use ember_cache::{
    AnalysisContext, AnalysisFailure, CacheState, EditWindow, FailureKind, LibraryDirectives,
    LibraryElement, LibraryResolution, MarkupElement, MarkupParseOutput, MarkupResolutionOutput,
    ParseOutput, Phase, ResolutionOutput, ResolutionTask, Symbol, SyntaxNode, UnitResolution,
    WorkItem,
};
use ember_config::{load_config_from_str, AnalysisOptions};
use ember_diagnostics::{Category, Diagnostic, DiagnosticCode, Severity};
use ember_source::{LineIndex, SourceId, SourceRegistry, Span};

// ---------------------------------------------------------------------------
// Toy collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Sources {
    registry: SourceRegistry,
    texts: HashMap<SourceId, String>,
}

struct Line<'a> {
    span: Span,
    keyword: &'a str,
    argument: Option<&'a str>,
}

impl Sources {
    fn id(&self, uri: &str) -> SourceId {
        self.registry.intern(uri)
    }

    fn text(&self, source: SourceId) -> Result<&str, AnalysisFailure> {
        self.texts.get(&source).map(String::as_str).ok_or_else(|| {
            AnalysisFailure::new(FailureKind::Content, format!("no contents for {source}"))
        })
    }

    fn lines<'a>(source: SourceId, text: &'a str) -> Vec<Line<'a>> {
        let mut offset = 0u32;
        let mut lines = Vec::new();
        for raw in text.split_inclusive('\n') {
            let start = offset;
            offset += raw.len() as u32;
            let mut words = raw.split_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };
            lines.push(Line {
                span: Span::new(source, start, offset),
                keyword,
                argument: words.next(),
            });
        }
        lines
    }

    fn parse_text(&self, source: SourceId, text: &str) -> ParseOutput {
        let mut tree = SyntaxNode::new("unit", Span::new(source, 0, text.len() as u32));
        let mut diagnostics = Vec::new();
        let mut directives = LibraryDirectives::default();
        let mut is_library = false;
        for line in Self::lines(source, text) {
            let kind = match (line.keyword, line.argument) {
                ("library", None) => {
                    is_library = true;
                    "library"
                }
                ("import", Some(uri)) => {
                    directives.imports.push(self.id(uri));
                    "import"
                }
                ("export", Some(uri)) => {
                    directives.exports.push(self.id(uri));
                    "export"
                }
                ("part", Some(uri)) => {
                    directives.parts.push(self.id(uri));
                    "part"
                }
                ("def", Some(_)) => "def",
                _ => {
                    diagnostics.push(Diagnostic::for_code(
                        DiagnosticCode::new(Category::Syntax, 1),
                        format!("unexpected `{}`", line.keyword),
                        line.span,
                    ));
                    "error"
                }
            };
            tree = tree.with_child(SyntaxNode::new(kind, line.span));
        }
        ParseOutput {
            line_index: LineIndex::new(text),
            tree: Arc::new(tree),
            diagnostics,
            library: is_library.then_some(directives),
        }
    }

    fn parse(&self, source: SourceId) -> Result<ParseOutput, AnalysisFailure> {
        Ok(self.parse_text(source, self.text(source)?))
    }

    fn is_library(&self, source: SourceId) -> bool {
        self.texts
            .get(&source)
            .is_some_and(|t| t.lines().next() == Some("library"))
    }

    fn resolve(&self, task: &ResolutionTask) -> Result<ResolutionOutput, AnalysisFailure> {
        let mut output = ResolutionOutput::default();
        for library in task.libraries() {
            let mut element = LibraryElement::default();
            let mut units = Vec::new();
            for unit in task.units_of(library) {
                let text = self.text(unit)?;
                let mut diagnostics = Vec::new();
                for line in Self::lines(unit, text) {
                    match (line.keyword, line.argument) {
                        ("def", Some(name)) => {
                            element.symbols.push(Symbol::new(name, SymbolKind::Function, unit));
                        }
                        ("import", Some(uri)) => {
                            let target = self.id(uri);
                            element.imports.push(target);
                            if !self.is_library(target) {
                                diagnostics.push(Diagnostic::for_code(
                                    DiagnosticCode::new(Category::Resolution, 1),
                                    format!("`{uri}` is not a library"),
                                    line.span,
                                ));
                            }
                        }
                        ("export", Some(uri)) => element.exports.push(Export::all(self.id(uri))),
                        ("part", Some(uri)) => element.parts.push(self.id(uri)),
                        _ => {}
                    }
                }
                units.push(UnitResolution {
                    unit,
                    tree: self.parse_text(unit, text).tree,
                    diagnostics,
                });
            }
            output.libraries.push(LibraryResolution {
                library,
                element,
                units,
            });
        }
        Ok(output)
    }

    fn referenced(&self, source: SourceId) -> Result<Vec<SourceId>, AnalysisFailure> {
        let text = self.text(source)?;
        Ok(Self::lines(source, text)
            .into_iter()
            .filter(|l| l.keyword == "script")
            .filter_map(|l| l.argument.map(|uri| self.id(uri)))
            .collect())
    }

    fn parse_markup(&self, source: SourceId) -> Result<MarkupParseOutput, AnalysisFailure> {
        let text = self.text(source)?;
        Ok(MarkupParseOutput {
            line_index: LineIndex::new(text),
            tree: Arc::new(SyntaxNode::new("document", Span::new(source, 0, text.len() as u32))),
            referenced_libraries: self.referenced(source)?,
        })
    }

    fn resolve_markup(&self, source: SourceId) -> Result<MarkupResolutionOutput, AnalysisFailure> {
        let text = self.text(source)?;
        Ok(MarkupResolutionOutput {
            tree: Arc::new(SyntaxNode::new("document", Span::new(source, 0, text.len() as u32))),
            element: MarkupElement {
                libraries: self.referenced(source)?,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Single-threaded driver
// ---------------------------------------------------------------------------

struct Workspace {
    sources: Sources,
    ctx: AnalysisContext,
}

impl Workspace {
    fn new(options: AnalysisOptions) -> Self {
        Self {
            sources: Sources::default(),
            ctx: AnalysisContext::new(options),
        }
    }

    fn add(&mut self, uri: &str, text: &str) -> SourceId {
        let id = self.sources.id(uri);
        self.ctx.add_source(id, self.sources.registry.kind_hint(id));
        self.sources.texts.insert(id, text.to_string());
        self.ctx.set_contents(id, text).unwrap();
        id
    }

    fn replace(&mut self, uri: &str, text: &str) {
        let id = self.sources.id(uri);
        self.sources.texts.insert(id, text.to_string());
        self.ctx.set_contents(id, text).unwrap();
    }

    fn insert(&mut self, uri: &str, offset: usize, inserted: &str) {
        let id = self.sources.id(uri);
        let old = self.sources.texts[&id].clone();
        let mut new = old.clone();
        new.insert_str(offset, inserted);
        self.sources.texts.insert(id, new.clone());
        self.ctx
            .set_changed_contents(id, Some(&old), &new, EditWindow::new(offset, 0, inserted.len()))
            .unwrap();
    }

    /// Runs every piece of work and returns the items in the order done.
    fn run(&mut self) -> Vec<WorkItem> {
        let mut done = Vec::new();
        while let Some(item) = self.ctx.next_work() {
            assert!(done.len() < 200, "work does not converge: {done:?}");
            match &item {
                WorkItem::Parse(source) => {
                    let task = self.ctx.begin_parse(*source).unwrap();
                    self.ctx.record_parse(task, self.sources.parse(*source)).unwrap();
                }
                WorkItem::ResolveLibrary { library, .. } => {
                    let task = self.ctx.begin_resolution(*library).unwrap();
                    let output = self.sources.resolve(&task);
                    self.ctx.record_resolution(task, output).unwrap();
                }
                WorkItem::ParseMarkup(source) => {
                    let task = self.ctx.begin_markup_parse(*source).unwrap();
                    let output = self.sources.parse_markup(*source);
                    self.ctx.record_markup_parse(task, output).unwrap();
                }
                WorkItem::ResolveMarkup(source) => {
                    let task = self.ctx.begin_markup_resolution(*source).unwrap();
                    let output = self.sources.resolve_markup(*source);
                    self.ctx.record_markup_resolution(task, output).unwrap();
                }
                WorkItem::Incremental(cache) => {
                    let started = Instant::now();
                    let tree = self.sources.parse_text(cache.source(), cache.new_contents()).tree;
                    self.ctx
                        .metrics_mut()
                        .record(Phase::IncrementalParse, started.elapsed());
                    self.ctx.record_incremental(cache, Some(tree)).unwrap();
                }
            }
            done.push(item);
        }
        done
    }

    fn namespace(&self, uri: &str) -> Vec<String> {
        let id = self.sources.id(uri);
        self.ctx
            .entry(id)
            .and_then(|e| e.as_library())
            .and_then(|l| l.public_namespace().value())
            .map(|ns| ns.names().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn element_state(&self, uri: &str) -> CacheState {
        let id = self.sources.id(uri);
        self.ctx
            .entry(id)
            .and_then(|e| e.as_library())
            .map(|l| l.library_element().state())
            .unwrap_or(CacheState::Invalid)
    }
}

fn parsed(items: &[WorkItem]) -> HashSet<SourceId> {
    items
        .iter()
        .filter_map(|i| match i {
            WorkItem::Parse(s) => Some(*s),
            _ => None,
        })
        .collect()
}

fn resolved(items: &[WorkItem]) -> HashSet<SourceId> {
    items
        .iter()
        .filter_map(|i| match i {
            WorkItem::ResolveLibrary { library, .. } => Some(*library),
            _ => None,
        })
        .collect()
}

/// app imports util, which re-exports base. app includes one part.
fn layered(options: AnalysisOptions) -> Workspace {
    let mut ws = Workspace::new(options);
    ws.add(
        "app.src",
        "library\nimport util.src\npart app_part.src\ndef main\n",
    );
    ws.add("app_part.src", "def helper\n");
    ws.add("util.src", "library\nexport base.src\ndef tool\n");
    ws.add("base.src", "library\ndef base_fn\ndef _hidden\n");
    ws
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn workspace_reaches_fixpoint() {
    let mut ws = layered(AnalysisOptions::default());
    let done = ws.run();
    assert_eq!(resolved(&done).len(), 3);

    for uri in ["app.src", "util.src", "base.src"] {
        assert_eq!(ws.element_state(uri), CacheState::Valid, "{uri}");
    }
    assert_eq!(ws.namespace("base.src"), vec!["base_fn"]);
    assert_eq!(ws.namespace("util.src"), vec!["base_fn", "tool"]);
    assert_eq!(ws.namespace("app.src"), vec!["helper", "main"]);

    let stats = ws.ctx.statistics();
    assert!(stats.rows.iter().all(|r| r.in_process == 0 && r.invalid == 0));
    assert!(stats.causes.is_empty());
    assert!(ws.ctx.next_work().is_none());
}

#[test]
fn dependencies_resolve_first() {
    let mut ws = layered(AnalysisOptions::default());
    let done = ws.run();
    let position = |uri: &str| {
        let id = ws.sources.id(uri);
        done.iter()
            .position(|i| matches!(i, WorkItem::ResolveLibrary { library, .. } if *library == id))
            .unwrap()
    };
    assert!(position("base.src") < position("util.src"));
    assert!(position("util.src") < position("app.src"));
}

#[test]
fn edit_recomputes_only_what_depends_on_it() {
    let mut ws = layered(AnalysisOptions::default());
    ws.run();

    ws.replace("base.src", "library\ndef base_fn\ndef extra\n");
    let done = ws.run();
    let id = |uri| ws.sources.id(uri);
    assert_eq!(parsed(&done), HashSet::from([id("base.src")]));
    assert_eq!(
        resolved(&done),
        HashSet::from([id("base.src"), id("util.src"), id("app.src")])
    );
    assert_eq!(ws.namespace("util.src"), vec!["base_fn", "extra", "tool"]);

    let part = ws.ctx.entry(id("app_part.src")).unwrap().as_unit().unwrap();
    assert_eq!(part.resolved_tree_state(id("app.src")), CacheState::Valid);
    assert!(part.is_refactoring_safe());
}

#[test]
fn editing_a_part_reresolves_its_library_only() {
    let mut ws = layered(AnalysisOptions::default());
    ws.run();

    ws.replace("app_part.src", "def helper\ndef second\n");
    let done = ws.run();
    let id = |uri| ws.sources.id(uri);
    assert_eq!(parsed(&done), HashSet::from([id("app_part.src")]));
    assert_eq!(resolved(&done), HashSet::from([id("app.src")]));
    assert_eq!(ws.namespace("app.src"), vec!["helper", "main", "second"]);
}

#[test]
fn diagnostics_from_both_phases() {
    let mut ws = Workspace::new(AnalysisOptions::default());
    let app = ws.add("app.src", "library\nimport notes.src\nbogus line\n");
    ws.add("notes.src", "def note\n");
    ws.run();

    let codes: Vec<String> = ws
        .ctx
        .entry(app)
        .unwrap()
        .all_diagnostics()
        .iter()
        .map(|d| d.code.to_string())
        .collect();
    assert_eq!(codes, vec!["P001", "R001"]);
    assert_eq!(ws.ctx.entry(app).unwrap().worst_severity(), Some(Severity::Error));
    assert_eq!(ws.ctx.entry(ws.sources.id("notes.src")).unwrap().worst_severity(), None);
}

#[test]
fn import_cycle_is_one_resolution() {
    let mut ws = Workspace::new(AnalysisOptions::default());
    ws.add("a.src", "library\nimport b.src\ndef a1\n");
    ws.add("b.src", "library\nimport a.src\ndef b1\n");
    let done = ws.run();

    let cycles: Vec<usize> = done
        .iter()
        .filter_map(|i| match i {
            WorkItem::ResolveLibrary { cycle, .. } => Some(cycle.len()),
            _ => None,
        })
        .collect();
    assert_eq!(cycles, vec![2]);
    assert_eq!(ws.element_state("a.src"), CacheState::Valid);
    assert_eq!(ws.element_state("b.src"), CacheState::Valid);

    let order = ws.ctx.resolution_order();
    assert_eq!(order.len(), 1);
    assert_eq!(order[0].len(), 2);
}

#[test]
fn missing_contents_are_cached_failures() {
    let mut ws = Workspace::new(AnalysisOptions::default());
    ws.add("app.src", "library\nimport gone.src\n");
    ws.run();

    let gone = ws.sources.id("gone.src");
    let entry = ws.ctx.entry(gone).unwrap();
    assert!(entry.has_error_state());
    let causes = ws.ctx.statistics().causes;
    assert_eq!(causes.len(), 1);
    assert_eq!(causes[0].kind, FailureKind::Content);
    assert_eq!(ws.element_state("app.src"), CacheState::Valid);
}

#[test]
fn typing_takes_the_incremental_path() {
    let mut ws = layered(AnalysisOptions::default());
    ws.run();

    // Append to the name in "def helper".
    ws.insert("app_part.src", 10, "s");
    let done = ws.run();
    assert!(matches!(done.first(), Some(WorkItem::Incremental(_))));
    assert!(parsed(&done).contains(&ws.sources.id("app_part.src")));

    // The full reparse has the same shape, so the cache survives.
    let cache = ws.ctx.incremental_cache().unwrap();
    assert_eq!(cache.source(), ws.sources.id("app_part.src"));
    assert_eq!(cache.new_contents(), "def helpers\n");
    assert_eq!(ws.ctx.metrics().totals(Phase::IncrementalParse).count, 1);
    assert_eq!(ws.ctx.metrics().totals(Phase::Verification).count, 1);
    assert_eq!(ws.namespace("app.src"), vec!["helpers", "main"]);
}

#[test]
fn replacing_contents_drops_the_incremental_cache() {
    let mut ws = layered(AnalysisOptions::default());
    ws.run();
    ws.insert("app_part.src", 10, "s");
    ws.run();
    assert!(ws.ctx.incremental_cache().is_some());

    ws.replace("app_part.src", "def other\n");
    assert!(ws.ctx.incremental_cache().is_none());
}

#[test]
fn markup_resolves_after_its_scripts() {
    let mut ws = layered(AnalysisOptions::default());
    let page = ws.add("index.html", "script app.src\n");
    let done = ws.run();

    let app = ws.sources.id("app.src");
    let app_at = done
        .iter()
        .position(|i| matches!(i, WorkItem::ResolveLibrary { library, .. } if *library == app))
        .unwrap();
    let page_at = done
        .iter()
        .position(|i| matches!(i, WorkItem::ResolveMarkup(s) if *s == page))
        .unwrap();
    assert!(app_at < page_at);

    let markup = ws.ctx.entry(page).unwrap().as_markup().unwrap();
    let element = markup.markup_element().value().unwrap();
    assert_eq!(element.libraries, vec![app]);

    ws.replace("base.src", "library\n");
    let markup = ws.ctx.entry(page).unwrap().as_markup().unwrap();
    assert_eq!(markup.markup_element().state(), CacheState::Invalid);
}

#[test]
fn options_from_config_file() {
    let config = load_config_from_str("[analysis]\ncache_size = 8\nincremental = false\n").unwrap();
    let mut ws = layered(config.analysis);
    ws.run();

    ws.insert("app_part.src", 10, "s");
    assert!(ws.ctx.incremental_cache().is_none());
    let done = ws.run();
    assert!(!done.iter().any(|i| matches!(i, WorkItem::Incremental(_))));

    let many: Vec<SourceId> = ["app.src", "util.src", "base.src", "app_part.src", "x.src"]
        .into_iter()
        .map(|uri| ws.sources.id(uri))
        .collect();
    ws.ctx.set_priority_sources(&many);
    assert_eq!(ws.ctx.priority_sources().len(), 4);
}

#[test]
fn removed_library_turns_importers_stale() {
    let mut ws = layered(AnalysisOptions::default());
    ws.run();

    let base = ws.sources.id("base.src");
    ws.ctx.remove_source(base).unwrap();
    ws.sources.texts.remove(&base);
    assert_eq!(ws.element_state("util.src"), CacheState::Invalid);
    assert_eq!(ws.element_state("app.src"), CacheState::Invalid);

    assert!(!ws.ctx.library_graph().contains(base));

    ws.replace("util.src", "library\ndef tool\n");
    ws.run();
    assert_eq!(ws.namespace("util.src"), vec!["tool"]);
    assert_eq!(ws.element_state("app.src"), CacheState::Valid);
}

// ---------------------------------------------------------------------------
// Shared between threads
// ---------------------------------------------------------------------------

enum Started {
    Parse(ember_cache::ParseTask),
    Resolve(ResolutionTask),
}

struct Shared {
    ctx: AnalysisContext,
    in_flight: usize,
}

fn worker(shared: &Mutex<Shared>, sources: &Sources) -> usize {
    let mut done = 0;
    loop {
        let started = {
            let mut guard = shared.lock().unwrap();
            match guard.ctx.next_work() {
                Some(WorkItem::Parse(source)) => {
                    guard.in_flight += 1;
                    Started::Parse(guard.ctx.begin_parse(source).unwrap())
                }
                Some(WorkItem::ResolveLibrary { library, .. }) => {
                    guard.in_flight += 1;
                    Started::Resolve(guard.ctx.begin_resolution(library).unwrap())
                }
                Some(other) => panic!("unexpected work {other}"),
                None if guard.in_flight == 0 => return done,
                None => {
                    drop(guard);
                    thread::yield_now();
                    continue;
                }
            }
        };

        // The parser and resolver run without holding the lock.
        match started {
            Started::Parse(task) => {
                let output = sources.parse(task.source());
                let mut guard = shared.lock().unwrap();
                guard.ctx.record_parse(task, output).unwrap();
                guard.in_flight -= 1;
            }
            Started::Resolve(task) => {
                let output = sources.resolve(&task);
                let mut guard = shared.lock().unwrap();
                guard.ctx.record_resolution(task, output).unwrap();
                guard.in_flight -= 1;
            }
        }
        done += 1;
    }
}

#[test]
fn workers_share_one_context() {
    let mut sources = Sources::default();
    let mut ctx = AnalysisContext::new(AnalysisOptions::default());
    for n in 0..8 {
        let mut text = format!("library\npart lib{n}_part.src\ndef f{n}\n");
        if n > 0 {
            text.push_str(&format!("import lib{}.src\n", n - 1));
        }
        let lib = sources.id(&format!("lib{n}.src"));
        let part = sources.id(&format!("lib{n}_part.src"));
        sources.texts.insert(lib, text);
        sources.texts.insert(part, format!("def g{n}\n"));
        ctx.add_source(lib, ember_source::SourceKind::Unknown);
    }

    let sources = Arc::new(sources);
    let shared = Arc::new(Mutex::new(Shared { ctx, in_flight: 0 }));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let shared = Arc::clone(&shared);
            let sources = Arc::clone(&sources);
            thread::spawn(move || worker(&shared, &sources))
        })
        .collect();
    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(total >= 24, "8 libraries, 8 parts, 8 resolutions; got {total}");

    let guard = shared.lock().unwrap();
    let stats = guard.ctx.statistics();
    assert_eq!(stats.sources.len(), 16);
    assert!(stats.rows.iter().all(|r| r.in_process == 0 && r.invalid == 0));
    assert!(guard.ctx.scheduler().is_empty());
}
