//! The owner of every cache entry and the surface a driver talks to.
//!
//! An [`AnalysisContext`] is only ever changed through `&mut self`. Callers
//! that share one between threads put it behind a single `Mutex` and run the
//! external parser and resolver outside the lock, between a `begin_*` call and
//! the matching `record_*` call:
//!
//! ```text
//! next_work -> begin_parse -> (parse, unlocked) -> record_parse
//! ```
//!
//! Any edit that lands while a task is running invalidates the slots the task
//! holds tickets for, and its result is then dropped on record.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use ember_common::{ContentHash, EmberResult, InternalError};
use ember_config::AnalysisOptions;
use ember_source::{SourceId, SourceKind};

use crate::artifact::{LibraryElement, Namespace, SyntaxNode, TreeRef};
use crate::entry::SourceEntry;
use crate::error::{AnalysisFailure, CacheError, CacheResult, FailureKind};
use crate::graph::DirectedGraph;
use crate::incremental::{EditWindow, IncrementalCache};
use crate::markup::MarkupEntry;
use crate::metrics::{Metrics, Phase};
use crate::scheduler::{Priority, WorkScheduler};
use crate::slot::{Slot, Ticket};
use crate::state::CacheState;
use crate::statistics::{AnalysisStatistics, StatisticsCollector};
use crate::task::{
    LibraryDirectives, LibraryTickets, MarkupParseOutput, MarkupParseTask, MarkupResolutionOutput,
    MarkupResolutionTask, ParseOutput, ParseTask, ResolutionOutput, ResolutionTask, UnitTickets,
    WorkItem,
};
use crate::unit::UnitEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Done,
    Pending,
    Running,
}

impl Progress {
    fn of(states: impl IntoIterator<Item = CacheState>) -> Self {
        let mut progress = Progress::Done;
        for state in states {
            match state {
                CacheState::InProcess => return Progress::Running,
                CacheState::Invalid => progress = Progress::Pending,
                _ => {}
            }
        }
        progress
    }
}

enum Work {
    Item(WorkItem),
    Waiting,
    Done,
}

/// How strongly the trees of a source are kept when memory is short. Lower
/// ranks are flushed first; `Keep` is never flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Retention {
    Low,
    Unresolved,
    Keep,
}

/// Cached analysis state of a whole workspace.
#[derive(Debug)]
pub struct AnalysisContext {
    options: AnalysisOptions,
    entries: HashMap<SourceId, SourceEntry>,
    fingerprints: HashMap<SourceId, ContentHash>,
    /// Edges run from a library to the libraries it imports or exports.
    libraries: DirectedGraph<SourceId>,
    scheduler: WorkScheduler,
    incremental: Option<IncrementalCache>,
    priority_sources: Vec<SourceId>,
    /// Sources that recently had a tree stored, oldest first.
    recently_used: Vec<SourceId>,
    /// Units of the import cycles work was handed out for and that are not
    /// resolved yet. Their trees are not flushed.
    needed_for_resolution: HashSet<SourceId>,
    metrics: Metrics,
}

impl AnalysisContext {
    /// Creates an empty context.
    pub fn new(options: AnalysisOptions) -> Self {
        Self {
            options,
            entries: HashMap::new(),
            fingerprints: HashMap::new(),
            libraries: DirectedGraph::new(),
            scheduler: WorkScheduler::new(),
            incremental: None,
            priority_sources: Vec::new(),
            recently_used: Vec::new(),
            needed_for_resolution: HashSet::new(),
            metrics: Metrics::new(),
        }
    }

    /// The options the context was created with.
    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Starts tracking `source` and queues it for analysis.
    ///
    /// Returns `false` if the source was already tracked; its entry is left
    /// as it is.
    pub fn add_source(&mut self, source: SourceId, kind: SourceKind) -> bool {
        if self.entries.contains_key(&source) {
            return false;
        }
        self.entries.insert(source, SourceEntry::new(kind));
        if kind == SourceKind::Library {
            self.libraries.add_node(source);
        }
        self.scheduler.add(source, Priority::for_kind(kind));
        tracing::trace!(%source, %kind, "source added");
        true
    }

    /// Stops tracking `source`.
    ///
    /// Everything that depended on it is invalidated first, so libraries
    /// importing it or including it get resolved again.
    pub fn remove_source(&mut self, source: SourceId) -> CacheResult<()> {
        self.source_changed(source)?;
        self.entries.remove(&source);
        self.fingerprints.remove(&source);
        self.scheduler.remove(source);
        self.libraries.remove_node(source);
        self.release_parts(source, &[]);
        self.incremental = IncrementalCache::clear(self.incremental.take(), source);
        self.priority_sources.retain(|s| *s != source);
        self.recently_used.retain(|s| *s != source);
        self.needed_for_resolution.remove(&source);
        tracing::debug!(%source, "source removed");
        Ok(())
    }

    /// The entry of `source`, if tracked.
    pub fn entry(&self, source: SourceId) -> Option<&SourceEntry> {
        self.entries.get(&source)
    }

    /// Every tracked source, in no particular order.
    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.entries.keys().copied()
    }

    /// The work queue.
    pub fn scheduler(&self) -> &WorkScheduler {
        &self.scheduler
    }

    /// The library dependency graph.
    pub fn library_graph(&self) -> &DirectedGraph<SourceId> {
        &self.libraries
    }

    /// The pending incremental edit, if any.
    pub fn incremental_cache(&self) -> Option<&IncrementalCache> {
        self.incremental.as_ref()
    }

    /// Sources currently marked as priority.
    pub fn priority_sources(&self) -> &[SourceId] {
        &self.priority_sources
    }

    /// Replaces the contents of `source` wholesale.
    ///
    /// Contents identical to the last ones seen are ignored. Otherwise any
    /// incremental cache for the source is dropped, since the change cannot
    /// be described as an edit window.
    pub fn set_contents(&mut self, source: SourceId, contents: &str) -> CacheResult<()> {
        if !self.entries.contains_key(&source) {
            return Err(CacheError::UnknownSource(source));
        }
        if !self.record_fingerprint(source, contents) {
            tracing::trace!(%source, "contents unchanged");
            return Ok(());
        }
        self.incremental = IncrementalCache::clear(self.incremental.take(), source);
        self.source_changed(source)
    }

    /// Applies an edit of `source` that replaced `edit.old_length` bytes at
    /// `edit.offset` with `edit.new_length` bytes.
    ///
    /// When incremental analysis is enabled the edit is folded into the
    /// incremental cache before the entry is invalidated, so the tree it
    /// applies to is still available.
    pub fn set_changed_contents(
        &mut self,
        source: SourceId,
        old_contents: Option<&str>,
        new_contents: &str,
        edit: EditWindow,
    ) -> CacheResult<()> {
        if !self.entries.contains_key(&source) {
            return Err(CacheError::UnknownSource(source));
        }
        if !self.record_fingerprint(source, new_contents) {
            tracing::trace!(%source, "contents unchanged");
            return Ok(());
        }
        let previous = self.incremental.take();
        self.incremental = match self.entries.get(&source) {
            Some(entry) if self.options.incremental => {
                IncrementalCache::update(previous, source, old_contents, new_contents, edit, entry)
            }
            _ => IncrementalCache::clear(previous, source),
        };
        self.source_changed(source)
    }

    fn record_fingerprint(&mut self, source: SourceId, contents: &str) -> bool {
        let hash = ContentHash::of_text(contents);
        self.fingerprints.insert(source, hash) != Some(hash)
    }

    /// Invalidates everything derived from the contents of `source` and
    /// queues the affected sources.
    ///
    /// Besides the entry itself this covers the resolution of every library
    /// including the source, every library that imports or exports an
    /// affected library directly or transitively (which includes its import
    /// cycle), and every markup document referencing an affected library.
    pub fn source_changed(&mut self, source: SourceId) -> CacheResult<()> {
        let entry = self
            .entries
            .get_mut(&source)
            .ok_or(CacheError::UnknownSource(source))?;
        entry.invalidate_all();
        let kind = entry.kind();
        let roots = match entry {
            SourceEntry::Library(_) => vec![source],
            SourceEntry::Unit(unit) => unit.containing_libraries().to_vec(),
            SourceEntry::Unclassified | SourceEntry::Markup(_) => Vec::new(),
        };

        let affected = self.dependents_of(&roots);
        for library in &affected {
            self.invalidate_library(*library);
            self.scheduler.add(*library, Priority::Library);
        }

        let markups: Vec<SourceId> = self
            .entries
            .iter()
            .filter_map(|(id, entry)| {
                let referenced = entry.as_markup()?.referenced_libraries().value()?;
                referenced
                    .iter()
                    .any(|l| *l == source || affected.contains(l))
                    .then_some(*id)
            })
            .collect();
        for markup in &markups {
            if let Some(entry) = self.entries.get_mut(markup).and_then(SourceEntry::as_markup_mut) {
                entry.invalidate_resolved_markup();
            }
            self.scheduler.add(*markup, Priority::Markup);
        }

        let tier = self.tier_for(source, kind);
        self.scheduler.add(source, tier);
        tracing::debug!(
            %source,
            libraries = affected.len(),
            markups = markups.len(),
            "source changed"
        );
        Ok(())
    }

    /// `roots` plus every library that reaches one of them in the graph.
    fn dependents_of(&self, roots: &[SourceId]) -> Vec<SourceId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        for root in roots {
            if seen.insert(*root) {
                order.push(*root);
                queue.push_back(*root);
            }
        }
        while let Some(library) = queue.pop_front() {
            for head in self.libraries.heads_of(library) {
                if seen.insert(head) {
                    order.push(head);
                    queue.push_back(head);
                }
            }
        }
        order
    }

    /// Invalidates the resolution of `library`: its element, namespace and
    /// the resolution of every unit within it.
    fn invalidate_library(&mut self, library: SourceId) {
        for entry in self.entries.values_mut() {
            entry.invalidate_library_resolution(library);
        }
        if let Some(entry) = self.entries.get_mut(&library).and_then(SourceEntry::as_library_mut) {
            entry.invalidate_resolved_tree();
        }
    }

    fn tier_for(&self, source: SourceId, kind: SourceKind) -> Priority {
        if kind == SourceKind::Part && self.priority_sources.contains(&source) {
            Priority::PriorityPart
        } else {
            Priority::for_kind(kind)
        }
    }

    /// Marks the sources the user is looking at.
    ///
    /// Each is moved to the front of its tier, parts to the priority-part
    /// tier, and their trees are exempt from flushing. Only
    /// [`AnalysisOptions::max_priority_sources`] of them are honoured.
    pub fn set_priority_sources(&mut self, sources: &[SourceId]) {
        let limit = self.options.max_priority_sources();
        if sources.len() > limit {
            tracing::warn!(
                requested = sources.len(),
                limit,
                "too many priority sources; keeping the first ones"
            );
        }
        self.priority_sources = sources.iter().copied().take(limit).collect();
        let priority_sources = self.priority_sources.clone();
        for source in priority_sources.into_iter().rev() {
            let Some(kind) = self.entries.get(&source).map(SourceEntry::kind) else {
                tracing::trace!(%source, "untracked priority source ignored");
                continue;
            };
            let tier = self.tier_for(source, kind);
            self.scheduler.add_first(source, tier);
        }
    }

    /// The next piece of work, or `None` if the cache is fully computed.
    ///
    /// Pending incremental work comes first. Otherwise queued sources are
    /// examined in scheduler order; a source can yield work for another one,
    /// such as a part that has to be parsed before its library is resolved.
    /// Sources found to have nothing left to do are dequeued once the pass
    /// is over. Sources whose work is already running stay queued.
    pub fn next_work(&mut self) -> Option<WorkItem> {
        if self.options.incremental && IncrementalCache::has_work(self.incremental.as_ref()) {
            if let Some(cache) = &self.incremental {
                return Some(WorkItem::Incremental(cache.clone()));
            }
        }

        let mut finished = Vec::new();
        let mut found = None;
        for source in self.scheduler.iter() {
            match self.work_for(source) {
                Work::Item(item) => {
                    found = Some(item);
                    break;
                }
                Work::Waiting => {}
                Work::Done => finished.push(source),
            }
        }
        for source in finished {
            self.scheduler.remove(source);
        }
        if let Some(item) = &found {
            tracing::trace!(%item, "next work");
            self.retain_for_resolution(item);
        }
        found
    }

    /// Marks the units a library resolution waits on, so parsing them one by
    /// one cannot flush the trees parsed before.
    fn retain_for_resolution(&mut self, item: &WorkItem) {
        let libraries = match item {
            WorkItem::ResolveLibrary { cycle, .. } => cycle.clone(),
            WorkItem::Parse(source) => {
                let Some(unit) = self.entries.get(source).and_then(SourceEntry::as_unit) else {
                    return;
                };
                let own = self.entries.get(source).and_then(SourceEntry::as_library).map(|_| *source);
                own.into_iter()
                    .chain(unit.containing_libraries().iter().copied())
                    .filter(|l| self.library_progress(*l) != Progress::Done)
                    .flat_map(|l| self.cycle_or_self(l))
                    .collect()
            }
            _ => return,
        };
        for library in libraries {
            let units = self.units_of(library);
            self.needed_for_resolution.extend(units);
        }
    }

    fn work_for(&self, source: SourceId) -> Work {
        let Some(entry) = self.entries.get(&source) else {
            return Work::Done;
        };
        match entry {
            SourceEntry::Unclassified => Work::Item(WorkItem::Parse(source)),
            SourceEntry::Library(_) => self.work_for_library(source, &mut HashSet::new()),
            SourceEntry::Unit(unit) => {
                match parse_progress(unit, false) {
                    Progress::Running => return Work::Waiting,
                    Progress::Pending => return Work::Item(WorkItem::Parse(source)),
                    Progress::Done => {}
                }
                let mut visited = HashSet::new();
                for library in unit.containing_libraries() {
                    match self.work_for_library(*library, &mut visited) {
                        Work::Done => {}
                        work => return work,
                    }
                }
                Work::Done
            }
            SourceEntry::Markup(markup) => self.work_for_markup(source, markup),
        }
    }

    /// Work needed before `library` is resolved: parsing its units and
    /// those of its import cycle, then resolving libraries it depends on
    /// outside the cycle, then the resolution itself.
    fn work_for_library(&self, library: SourceId, visited: &mut HashSet<SourceId>) -> Work {
        if !visited.insert(library) {
            return Work::Done;
        }
        match self.library_progress(library) {
            Progress::Done => return Work::Done,
            Progress::Running => return Work::Waiting,
            Progress::Pending => {}
        }
        if self.entries.get(&library).and_then(SourceEntry::as_library).is_none() {
            // Not parsed yet, so whether it is a library is unknown.
            return self.parse_work(library, false);
        }

        let cycle = self.cycle_or_self(library);
        for member in &cycle {
            if self.library_progress(*member) == Progress::Running {
                return Work::Waiting;
            }
            for unit in std::iter::once(*member).chain(self.parts_of(*member)) {
                match self.parse_work(unit, true) {
                    Work::Done => {}
                    work => return work,
                }
            }
        }
        for member in &cycle {
            for dependency in self.libraries.tails_of(*member) {
                if cycle.contains(dependency) {
                    continue;
                }
                match self.work_for_library(*dependency, visited) {
                    Work::Done => {}
                    work => return work,
                }
            }
        }
        Work::Item(WorkItem::ResolveLibrary { library, cycle })
    }

    fn work_for_markup(&self, source: SourceId, markup: &MarkupEntry) -> Work {
        match markup_parse_progress(markup) {
            Progress::Running => return Work::Waiting,
            Progress::Pending => return Work::Item(WorkItem::ParseMarkup(source)),
            Progress::Done => {}
        }
        match Progress::of([
            markup.resolved_markup().state(),
            markup.markup_element().state(),
        ]) {
            Progress::Done => return Work::Done,
            Progress::Running => return Work::Waiting,
            Progress::Pending => {}
        }
        if markup.parsed_markup().state() == CacheState::Flushed {
            return Work::Item(WorkItem::ParseMarkup(source));
        }
        let mut visited = HashSet::new();
        for library in markup.referenced_libraries().value().into_iter().flatten() {
            match self.work_for_library(*library, &mut visited) {
                Work::Done => {}
                work => return work,
            }
        }
        Work::Item(WorkItem::ResolveMarkup(source))
    }

    fn parse_work(&self, source: SourceId, for_resolution: bool) -> Work {
        match self.entries.get(&source) {
            Some(SourceEntry::Unclassified) => Work::Item(WorkItem::Parse(source)),
            Some(entry) => match entry.as_unit().map(|u| parse_progress(u, for_resolution)) {
                Some(Progress::Pending) => Work::Item(WorkItem::Parse(source)),
                Some(Progress::Running) => Work::Waiting,
                Some(Progress::Done) | None => Work::Done,
            },
            None => Work::Done,
        }
    }

    fn library_progress(&self, library: SourceId) -> Progress {
        let entry = match self.entries.get(&library) {
            Some(SourceEntry::Library(entry)) => entry,
            Some(SourceEntry::Unclassified) => return Progress::Pending,
            Some(SourceEntry::Unit(unit)) => return parse_progress(unit, false),
            Some(SourceEntry::Markup(_)) | None => return Progress::Done,
        };
        let mut states = vec![
            entry.library_element().state(),
            entry.public_namespace().state(),
        ];
        for unit in self.units_of(library) {
            let Some(unit) = self.entries.get(&unit).and_then(SourceEntry::as_unit) else {
                continue;
            };
            match unit.resolution(library) {
                Some(state) => states.extend([
                    state.resolved_tree().state(),
                    state.resolution_diagnostics().state(),
                ]),
                None => states.push(CacheState::Invalid),
            }
        }
        Progress::of(states)
    }

    fn parts_of(&self, library: SourceId) -> Vec<SourceId> {
        self.entries
            .get(&library)
            .and_then(SourceEntry::as_library)
            .and_then(|l| l.included_parts().value())
            .cloned()
            .unwrap_or_default()
    }

    /// The library's own unit followed by its parts.
    fn units_of(&self, library: SourceId) -> Vec<SourceId> {
        let mut units = vec![library];
        units.extend(self.parts_of(library));
        units
    }

    fn cycle_or_self(&self, library: SourceId) -> Vec<SourceId> {
        self.libraries
            .component_containing(library)
            .unwrap_or_else(|_| vec![library])
    }

    /// Starts parsing a code unit.
    ///
    /// A source of unknown kind is treated as a unit from here on. Only the
    /// parse results that are missing get tickets; results that are cached,
    /// or cached as failures, are left alone.
    pub fn begin_parse(&mut self, source: SourceId) -> CacheResult<ParseTask> {
        let entry = self
            .entries
            .get_mut(&source)
            .ok_or(CacheError::UnknownSource(source))?;
        if matches!(entry, SourceEntry::Unclassified) {
            entry.reclassify(SourceKind::Part);
        }
        let actual = entry.kind();
        let unit = entry.as_unit_mut().ok_or(CacheError::KindMismatch {
            id: source,
            expected: SourceKind::Part,
            actual,
        })?;
        ensure_idle(
            source,
            "parse",
            [
                unit.line_index().state(),
                unit.parsed_tree().state(),
                unit.parse_diagnostics().state(),
            ],
        )?;
        let task = ParseTask {
            source,
            started: std::time::Instant::now(),
            line_index: start(unit.line_index_mut())?,
            parsed_tree: start(unit.parsed_tree_mut())?,
            parse_diagnostics: start(unit.parse_diagnostics_mut())?,
        };
        tracing::trace!(%source, "parse started");
        Ok(task)
    }

    /// Stores the outcome of a parse.
    ///
    /// Returns `Ok(false)` if the result was stale and dropped. A successful
    /// parse also classifies the unit: a library gets its directives stored,
    /// its graph edges replaced and its parts told that it includes them.
    pub fn record_parse(
        &mut self,
        task: ParseTask,
        outcome: Result<ParseOutput, AnalysisFailure>,
    ) -> CacheResult<bool> {
        let source = task.source;
        self.metrics.record(Phase::Parse, task.started.elapsed());
        let Some(unit) = self.entries.get_mut(&source).and_then(SourceEntry::as_unit_mut) else {
            tracing::trace!(%source, "parse result for untracked unit dropped");
            return Ok(false);
        };
        let fresh = !task.is_empty()
            && current(unit.line_index(), task.line_index)
            && current(unit.parsed_tree(), task.parsed_tree)
            && current(unit.parse_diagnostics(), task.parse_diagnostics);
        if !fresh {
            tracing::trace!(%source, "stale parse result dropped");
            return Ok(false);
        }

        let output = match outcome {
            Ok(output) => output,
            Err(failure) => {
                tracing::debug!(%source, %failure, "parse failed");
                finish(unit.line_index_mut(), task.line_index, Err(failure.clone()));
                finish(unit.parsed_tree_mut(), task.parsed_tree, Err(failure.clone()));
                finish(unit.parse_diagnostics_mut(), task.parse_diagnostics, Err(failure));
                return Ok(true);
            }
        };
        let tree = Arc::clone(&output.tree);
        finish(unit.line_index_mut(), task.line_index, Ok(output.line_index));
        finish(unit.parsed_tree_mut(), task.parsed_tree, Ok(output.tree));
        finish(unit.parse_diagnostics_mut(), task.parse_diagnostics, Ok(output.diagnostics));

        match output.library {
            Some(directives) => self.record_directives(source, directives)?,
            None => self.record_part(source),
        }
        if self.options.incremental_validation {
            self.verify_incremental(source, &tree);
        }
        self.touch(source);
        Ok(true)
    }

    fn record_directives(&mut self, library: SourceId, directives: LibraryDirectives) -> EmberResult<()> {
        if let Some(entry) = self.entries.get_mut(&library) {
            entry.reclassify(SourceKind::Library);
        }
        let LibraryDirectives {
            imports,
            exports,
            parts,
        } = directives;

        self.libraries.add_node(library);
        self.libraries.clear_tails(library);
        for dependency in imports.iter().chain(&exports) {
            self.libraries.add_edge(library, *dependency);
            self.add_source(*dependency, SourceKind::Unknown);
        }
        for part in &parts {
            self.add_source(*part, SourceKind::Part);
            let Some(entry) = self.entries.get_mut(part) else {
                continue;
            };
            if matches!(entry, SourceEntry::Unclassified) {
                entry.reclassify(SourceKind::Part);
            }
            if let Some(unit) = entry.as_unit_mut() {
                unit.add_containing_library(library);
            }
        }
        self.release_parts(library, &parts);

        tracing::debug!(
            %library,
            imports = imports.len(),
            exports = exports.len(),
            parts = parts.len(),
            "library directives recorded"
        );
        if let Some(entry) = self.entries.get_mut(&library).and_then(SourceEntry::as_library_mut) {
            store_now(entry.imported_libraries_mut(), imports)?;
            store_now(entry.exported_libraries_mut(), exports)?;
            store_now(entry.included_parts_mut(), parts)?;
        }
        self.scheduler.add(library, Priority::Library);
        Ok(())
    }

    fn record_part(&mut self, part: SourceId) {
        let was_library = self
            .entries
            .get(&part)
            .is_some_and(|e| e.kind() == SourceKind::Library);
        if was_library {
            if let Some(entry) = self.entries.get_mut(&part) {
                entry.reclassify(SourceKind::Part);
            }
            self.libraries.remove_node(part);
            self.release_parts(part, &[]);
            tracing::debug!(%part, "library is now a part");
        }
        let containing = self
            .entries
            .get(&part)
            .and_then(SourceEntry::as_unit)
            .map(|u| u.containing_libraries().to_vec())
            .unwrap_or_default();
        for library in containing {
            if self.library_progress(library) == Progress::Pending {
                self.scheduler.add(library, Priority::Library);
            }
        }
    }

    /// Detaches every unit `library` includes that is not in `keep`.
    fn release_parts(&mut self, library: SourceId, keep: &[SourceId]) {
        for (id, entry) in &mut self.entries {
            if *id == library || keep.contains(id) {
                continue;
            }
            if let Some(unit) = entry.as_unit_mut() {
                if unit.containing_libraries().contains(&library) {
                    unit.remove_containing_library(library);
                }
            }
        }
    }

    /// Starts resolving `library` together with its whole import cycle.
    pub fn begin_resolution(&mut self, library: SourceId) -> CacheResult<ResolutionTask> {
        let actual = self
            .entries
            .get(&library)
            .ok_or(CacheError::UnknownSource(library))?
            .kind();
        if actual != SourceKind::Library {
            return Err(CacheError::KindMismatch {
                id: library,
                expected: SourceKind::Library,
                actual,
            });
        }

        let members: Vec<(SourceId, Vec<SourceId>)> = self
            .cycle_or_self(library)
            .into_iter()
            .filter(|m| self.entries.get(m).and_then(SourceEntry::as_library).is_some())
            .map(|m| (m, self.units_of(m)))
            .collect();
        for (member, _) in &members {
            if self.library_progress(*member) == Progress::Running {
                return Err(InternalError::new(format!(
                    "resolution of {member} is already in process"
                ))
                .into());
            }
        }

        let mut libraries = Vec::with_capacity(members.len());
        for (member, units) in members {
            let mut unit_tickets = Vec::with_capacity(units.len());
            for unit in units {
                let Some(entry) = self.entries.get_mut(&unit).and_then(SourceEntry::as_unit_mut) else {
                    continue;
                };
                let state = entry.resolution_mut(member);
                unit_tickets.push(UnitTickets {
                    unit,
                    resolved_tree: start(state.resolved_tree_mut())?,
                    resolution_diagnostics: start(state.resolution_diagnostics_mut())?,
                });
            }
            let Some(entry) = self.entries.get_mut(&member).and_then(SourceEntry::as_library_mut) else {
                continue;
            };
            libraries.push(LibraryTickets {
                library: member,
                element: start(entry.library_element_mut())?,
                namespace: start(entry.public_namespace_mut())?,
                units: unit_tickets,
            });
        }
        tracing::trace!(%library, members = libraries.len(), "resolution started");
        Ok(ResolutionTask {
            library,
            started: std::time::Instant::now(),
            libraries,
        })
    }

    /// Stores the outcome of resolving an import cycle.
    ///
    /// Public namespaces are computed here from the stored elements. A
    /// library or unit the resolver gave no result for is recorded as a
    /// resolution failure. Returns `Ok(false)` if every library's result was
    /// stale.
    pub fn record_resolution(
        &mut self,
        task: ResolutionTask,
        outcome: Result<ResolutionOutput, AnalysisFailure>,
    ) -> CacheResult<bool> {
        let requested = task.library;
        self.metrics.record(Phase::Resolve, task.started.elapsed());
        let mut results = outcome.map(|output| {
            output
                .libraries
                .into_iter()
                .map(|l| (l.library, l))
                .collect::<HashMap<_, _>>()
        });

        let mut stored = Vec::new();
        let mut resolved_units = Vec::new();
        let mut pending_namespaces = Vec::new();
        for tickets in task.libraries {
            let library = tickets.library;
            let fresh = self
                .entries
                .get(&library)
                .and_then(SourceEntry::as_library)
                .is_some_and(|l| {
                    current(l.library_element(), tickets.element)
                        && current(l.public_namespace(), tickets.namespace)
                });
            if !fresh {
                tracing::trace!(%library, "stale resolution result dropped");
                continue;
            }

            let resolution = match &mut results {
                Ok(map) => map.remove(&library).ok_or_else(|| {
                    AnalysisFailure::new(
                        FailureKind::Resolution,
                        format!("no resolution result for library {library}"),
                    )
                }),
                Err(failure) => Err(failure.clone()),
            };
            let (element, mut units) = match resolution {
                Ok(resolution) => (
                    Ok(Arc::new(resolution.element)),
                    Ok(resolution
                        .units
                        .into_iter()
                        .map(|u| (u.unit, (u.tree, u.diagnostics)))
                        .collect::<HashMap<_, _>>()),
                ),
                Err(failure) => (Err(failure.clone()), Err(failure)),
            };

            for unit_tickets in tickets.units {
                let unit = unit_tickets.unit;
                let (tree, diagnostics) = match &mut units {
                    Ok(map) => match map.remove(&unit) {
                        Some((tree, diagnostics)) => (Ok(tree), Ok(diagnostics)),
                        None => {
                            let failure = AnalysisFailure::new(
                                FailureKind::Resolution,
                                format!("no resolution result for {unit} in library {library}"),
                            );
                            (Err(failure.clone()), Err(failure))
                        }
                    },
                    Err(failure) => (Err(failure.clone()), Err(failure.clone())),
                };
                let Some(entry) = self.entries.get_mut(&unit).and_then(SourceEntry::as_unit_mut) else {
                    continue;
                };
                let state = entry.resolution_mut(library);
                if finish(state.resolved_tree_mut(), unit_tickets.resolved_tree, tree) {
                    resolved_units.push(unit);
                }
                finish(
                    state.resolution_diagnostics_mut(),
                    unit_tickets.resolution_diagnostics,
                    diagnostics,
                );
            }

            let Some(entry) = self.entries.get_mut(&library).and_then(SourceEntry::as_library_mut) else {
                continue;
            };
            let failure = element.as_ref().err().cloned();
            finish(entry.library_element_mut(), tickets.element, element);
            match (failure, tickets.namespace) {
                (Some(failure), Some(ticket)) => {
                    entry.public_namespace_mut().commit(ticket, Err(failure));
                }
                (None, Some(ticket)) => pending_namespaces.push((library, ticket)),
                (_, None) => {}
            }
            stored.push(library);
        }

        self.build_namespaces(pending_namespaces);
        for library in &stored {
            for unit in self.units_of(*library) {
                self.needed_for_resolution.remove(&unit);
            }
        }
        for library in &stored {
            for part in self.parts_of(*library) {
                if self.scheduler.contains(part) {
                    self.scheduler.add(part, Priority::PriorityPart);
                }
            }
        }
        for unit in resolved_units {
            self.touch(unit);
        }
        tracing::debug!(library = %requested, resolved = stored.len(), "resolution recorded");
        Ok(!stored.is_empty())
    }

    /// Computes and stores public namespaces from the cached elements.
    fn build_namespaces(&mut self, pending: Vec<(SourceId, Ticket)>) {
        let elements: Vec<(SourceId, Ticket, Option<Arc<LibraryElement>>)> = pending
            .into_iter()
            .map(|(library, ticket)| {
                let element = self
                    .entries
                    .get(&library)
                    .and_then(SourceEntry::as_library)
                    .and_then(|l| l.library_element().value())
                    .cloned();
                (library, ticket, element)
            })
            .collect();

        // Libraries in a cycle can export each other, so rebuild until no
        // namespace changes. Names only ever get added.
        let mut built: HashMap<SourceId, Namespace> = HashMap::new();
        for _ in 0..=elements.len() {
            let mut next = HashMap::with_capacity(elements.len());
            for (library, _, element) in &elements {
                if let Some(element) = element {
                    let namespace = Namespace::build(element, |exported| {
                        built
                            .get(&exported)
                            .or_else(|| self.cached_namespace(exported))
                    });
                    next.insert(*library, namespace);
                }
            }
            let settled = next == built;
            built = next;
            if settled {
                break;
            }
        }

        for (library, ticket, element) in elements {
            let outcome = match (element, built.remove(&library)) {
                (Some(_), Some(namespace)) => Ok(Arc::new(namespace)),
                _ => Err(AnalysisFailure::new(
                    FailureKind::Resolution,
                    format!("library element of {library} is unavailable"),
                )),
            };
            if let Some(entry) = self.entries.get_mut(&library).and_then(SourceEntry::as_library_mut) {
                entry.public_namespace_mut().commit(ticket, outcome);
            }
        }
    }

    fn cached_namespace(&self, library: SourceId) -> Option<&Namespace> {
        self.entries
            .get(&library)?
            .as_library()?
            .public_namespace()
            .value()
            .map(Arc::as_ref)
    }

    fn markup_mut(&mut self, source: SourceId) -> CacheResult<&mut MarkupEntry> {
        let entry = self
            .entries
            .get_mut(&source)
            .ok_or(CacheError::UnknownSource(source))?;
        let actual = entry.kind();
        entry.as_markup_mut().ok_or(CacheError::KindMismatch {
            id: source,
            expected: SourceKind::Markup,
            actual,
        })
    }

    /// Starts parsing a markup document.
    pub fn begin_markup_parse(&mut self, source: SourceId) -> CacheResult<MarkupParseTask> {
        let markup = self.markup_mut(source)?;
        ensure_idle(
            source,
            "markup parse",
            [
                markup.line_index().state(),
                markup.parsed_markup().state(),
                markup.referenced_libraries().state(),
            ],
        )?;
        Ok(MarkupParseTask {
            source,
            started: std::time::Instant::now(),
            line_index: start(markup.line_index_mut())?,
            parsed_markup: start(markup.parsed_markup_mut())?,
            referenced_libraries: start(markup.referenced_libraries_mut())?,
        })
    }

    /// Stores the outcome of a markup parse. Referenced libraries that are not
    /// tracked yet start being tracked.
    pub fn record_markup_parse(
        &mut self,
        task: MarkupParseTask,
        outcome: Result<MarkupParseOutput, AnalysisFailure>,
    ) -> CacheResult<bool> {
        let source = task.source;
        self.metrics.record(Phase::Parse, task.started.elapsed());
        let Some(markup) = self.entries.get_mut(&source).and_then(SourceEntry::as_markup_mut) else {
            return Ok(false);
        };
        let fresh = current(markup.line_index(), task.line_index)
            && current(markup.parsed_markup(), task.parsed_markup)
            && current(markup.referenced_libraries(), task.referenced_libraries);
        if !fresh {
            tracing::trace!(%source, "stale markup parse result dropped");
            return Ok(false);
        }
        match outcome {
            Err(failure) => {
                tracing::debug!(%source, %failure, "markup parse failed");
                finish(markup.line_index_mut(), task.line_index, Err(failure.clone()));
                finish(markup.parsed_markup_mut(), task.parsed_markup, Err(failure.clone()));
                finish(markup.referenced_libraries_mut(), task.referenced_libraries, Err(failure));
            }
            Ok(output) => {
                let referenced = output.referenced_libraries.clone();
                finish(markup.line_index_mut(), task.line_index, Ok(output.line_index));
                finish(markup.parsed_markup_mut(), task.parsed_markup, Ok(output.tree));
                finish(
                    markup.referenced_libraries_mut(),
                    task.referenced_libraries,
                    Ok(output.referenced_libraries),
                );
                for library in referenced {
                    self.add_source(library, SourceKind::Unknown);
                }
                self.scheduler.add(source, Priority::Markup);
                self.touch(source);
            }
        }
        Ok(true)
    }

    /// Starts resolving a markup document.
    pub fn begin_markup_resolution(&mut self, source: SourceId) -> CacheResult<MarkupResolutionTask> {
        let markup = self.markup_mut(source)?;
        ensure_idle(
            source,
            "markup resolution",
            [markup.resolved_markup().state(), markup.markup_element().state()],
        )?;
        Ok(MarkupResolutionTask {
            source,
            started: std::time::Instant::now(),
            resolved_markup: start(markup.resolved_markup_mut())?,
            markup_element: start(markup.markup_element_mut())?,
        })
    }

    /// Stores the outcome of a markup resolution.
    pub fn record_markup_resolution(
        &mut self,
        task: MarkupResolutionTask,
        outcome: Result<MarkupResolutionOutput, AnalysisFailure>,
    ) -> CacheResult<bool> {
        let source = task.source;
        self.metrics.record(Phase::Resolve, task.started.elapsed());
        let Some(markup) = self.entries.get_mut(&source).and_then(SourceEntry::as_markup_mut) else {
            return Ok(false);
        };
        if !(current(markup.resolved_markup(), task.resolved_markup)
            && current(markup.markup_element(), task.markup_element))
        {
            tracing::trace!(%source, "stale markup resolution result dropped");
            return Ok(false);
        }
        let (tree, element) = match outcome {
            Ok(output) => (Ok(output.tree), Ok(Arc::new(output.element))),
            Err(failure) => (Err(failure.clone()), Err(failure)),
        };
        let stored = finish(markup.resolved_markup_mut(), task.resolved_markup, tree);
        finish(markup.markup_element_mut(), task.markup_element, element);
        if stored {
            self.touch(source);
        }
        Ok(true)
    }

    /// Gives up every running computation of `source`, returning the number
    /// of slots released. Use when a started task will never be recorded.
    pub fn abandon(&mut self, source: SourceId) -> CacheResult<usize> {
        let entry = self
            .entries
            .get_mut(&source)
            .ok_or(CacheError::UnknownSource(source))?;
        let released = entry.abandon_in_process();
        let kind = entry.kind();
        if released > 0 {
            let tier = self.tier_for(source, kind);
            self.scheduler.add(source, tier);
            tracing::debug!(%source, released, "running work abandoned");
        }
        Ok(released)
    }

    /// Stores the tree an incremental reparse of `cache` produced, or drops
    /// the cache if the reparse failed (`tree` is `None`).
    ///
    /// Returns `false` without touching anything if another edit arrived
    /// after `cache` was handed out.
    pub fn record_incremental(&mut self, cache: &IncrementalCache, tree: Option<TreeRef>) -> CacheResult<bool> {
        let unchanged = self.incremental.as_ref().is_some_and(|pending| {
            pending.source() == cache.source()
                && pending.window() == cache.window()
                && pending.new_contents() == cache.new_contents()
                && Arc::ptr_eq(pending.resolved_tree(), cache.resolved_tree())
        });
        let source = cache.source();
        if !unchanged {
            tracing::trace!(%source, "stale incremental result dropped");
            return Ok(false);
        }

        match &tree {
            Some(tree) => {
                if let Some(unit) = self.entries.get_mut(&source).and_then(SourceEntry::as_unit_mut) {
                    let slot = unit.resolution_mut(cache.library()).resolved_tree_mut();
                    if slot.needs_computation() {
                        store_now(slot, Arc::clone(tree))?;
                    }
                }
                tracing::debug!(%source, library = %cache.library(), "incremental result stored");
            }
            None => {
                tracing::debug!(%source, "incremental reparse failed; falling back to full analysis");
            }
        }
        let stored = tree.is_some();
        self.incremental = IncrementalCache::cache_result(Some(cache), tree);
        if stored {
            self.touch(source);
        }
        Ok(true)
    }

    /// Compares the incremental tree of `source` against a full reparse.
    ///
    /// On mismatch the incremental cache is dropped and the library that
    /// received the incremental tree is resolved again. Returns `false` only
    /// in that case. Nothing is checked while an edit window is still pending,
    /// since the tree then describes older contents.
    pub fn verify_incremental(&mut self, source: SourceId, full_tree: &SyntaxNode) -> bool {
        let checked = match self.incremental.as_ref() {
            Some(cache) if cache.source() == source && !IncrementalCache::has_work(Some(cache)) => {
                cache.library()
            }
            _ => return true,
        };
        let cache = self.incremental.take();
        self.incremental = self.metrics.time(Phase::Verification, || {
            IncrementalCache::verify_structure(cache, source, full_tree)
        });
        if self.incremental.is_some() {
            return true;
        }
        self.invalidate_library(checked);
        self.scheduler.add(checked, Priority::Library);
        false
    }

    /// The import cycle containing `library`.
    pub fn cycle_containing(&self, library: SourceId) -> CacheResult<Vec<SourceId>> {
        self.libraries.component_containing(library)
    }

    /// Libraries in an order they can be resolved in, dependencies first.
    ///
    /// Libraries that import each other come out together as one batch;
    /// every other batch holds a single library.
    pub fn resolution_order(&self) -> Vec<Vec<SourceId>> {
        let mut graph = self.libraries.clone();
        let mut batches = Vec::new();
        loop {
            while let Some(sink) = graph.remove_any_sink() {
                batches.push(vec![sink]);
            }
            // Components come dependencies first, so the first one has no
            // edges leaving it.
            let Some(cycle) = graph.components().into_iter().next() else {
                break;
            };
            for library in &cycle {
                graph.remove_node(*library);
            }
            batches.push(cycle);
        }
        batches
    }

    fn touch(&mut self, source: SourceId) {
        self.recently_used.retain(|s| *s != source);
        self.recently_used.push(source);
        self.flush_ast_structures();
    }

    /// Flushes trees of the least recently used sources until at most
    /// `cache_size` sources hold trees.
    ///
    /// Priority sources and units a pending library resolution waits on are
    /// never flushed. Units whose resolution is still outstanding go only
    /// after every other candidate. Returns the number of trees discarded.
    pub fn flush_ast_structures(&mut self) -> usize {
        let mut flushed = 0;
        while self.recently_used.len() > self.options.cache_size {
            let candidate = self
                .recently_used
                .iter()
                .enumerate()
                .map(|(age, source)| (self.retention_of(*source), age))
                .filter(|(retention, _)| *retention != Retention::Keep)
                .min();
            let Some((_, oldest)) = candidate else {
                break;
            };
            let victim = self.recently_used.remove(oldest);
            if let Some(entry) = self.entries.get_mut(&victim) {
                flushed += entry.flush_ast_structures();
            }
        }
        if flushed > 0 {
            tracing::debug!(flushed, retained = self.recently_used.len(), "trees flushed");
        }
        flushed
    }

    fn retention_of(&self, source: SourceId) -> Retention {
        if self.priority_sources.contains(&source) || self.needed_for_resolution.contains(&source) {
            return Retention::Keep;
        }
        let Some(entry) = self.entries.get(&source) else {
            return Retention::Low;
        };
        let Some(unit) = entry.as_unit() else {
            return Retention::Low;
        };
        let own = entry.as_library().map(|_| source);
        let unresolved = own
            .into_iter()
            .chain(unit.containing_libraries().iter().copied())
            .any(|library| {
                unit.resolution(library)
                    .map_or(true, |r| r.resolution_diagnostics().state() == CacheState::Invalid)
            });
        if unresolved {
            Retention::Unresolved
        } else {
            Retention::Low
        }
    }

    /// A snapshot of every slot's state, sources in identity order.
    pub fn statistics(&self) -> AnalysisStatistics {
        let mut entries: Vec<(SourceId, &SourceEntry)> =
            self.entries.iter().map(|(id, entry)| (*id, entry)).collect();
        entries.sort_by_key(|(id, _)| *id);
        StatisticsCollector::collect(entries)
    }

    /// Time spent per phase since the last reset.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Mutable counters, for phases the driver times itself such as
    /// incremental reparsing.
    pub fn metrics_mut(&mut self) -> &mut Metrics {
        &mut self.metrics
    }

    /// Zeroes the phase counters.
    pub fn reset_metrics(&mut self) {
        self.metrics.reset();
    }
}

fn parse_progress(unit: &UnitEntry, for_resolution: bool) -> Progress {
    let progress = Progress::of([
        unit.line_index().state(),
        unit.parsed_tree().state(),
        unit.parse_diagnostics().state(),
    ]);
    let tree_missing = unit.parsed_tree().state() == CacheState::Flushed && !unit.has_resolvable_tree();
    if progress == Progress::Done && for_resolution && tree_missing {
        return Progress::Pending;
    }
    progress
}

fn markup_parse_progress(markup: &MarkupEntry) -> Progress {
    Progress::of([
        markup.line_index().state(),
        markup.parsed_markup().state(),
        markup.referenced_libraries().state(),
    ])
}

fn ensure_idle(
    source: SourceId,
    what: &str,
    states: impl IntoIterator<Item = CacheState>,
) -> EmberResult<()> {
    if states.into_iter().any(|s| s == CacheState::InProcess) {
        return Err(InternalError::new(format!(
            "{what} of {source} is already in process"
        )));
    }
    Ok(())
}

/// Issues a ticket for a slot that has to be (re)computed.
fn start<T>(slot: &mut Slot<T>) -> EmberResult<Option<Ticket>> {
    if !slot.needs_computation() {
        return Ok(None);
    }
    slot.invalidate();
    slot.mark_in_process().map(Some)
}

fn current<T>(slot: &Slot<T>, ticket: Option<Ticket>) -> bool {
    ticket.map_or(true, |t| slot.accepts(t))
}

fn finish<T>(slot: &mut Slot<T>, ticket: Option<Ticket>, outcome: Result<T, AnalysisFailure>) -> bool {
    ticket.is_some_and(|t| slot.commit(t, outcome))
}

/// Stores a value derived as a by-product of another computation.
fn store_now<T>(slot: &mut Slot<T>, value: T) -> EmberResult<()> {
    slot.invalidate();
    let ticket = slot.mark_in_process()?;
    slot.commit(ticket, Ok(value));
    Ok(())
}
