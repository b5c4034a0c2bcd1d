//! Directed graph over source identities with strongly connected component
//! detection.
//!
//! The context keeps one graph whose edges run from a library to the
//! libraries it imports or exports. Libraries in the same strongly connected
//! component refer to each other's elements and are resolved as one batch.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{CacheError, CacheResult};

/// A directed graph stored as one tail list per head.
///
/// Adding an edge that already exists, including a self-edge, has no effect.
#[derive(Debug, Clone)]
pub struct DirectedGraph<N> {
    edges: HashMap<N, Vec<N>>,
}

impl<N> Default for DirectedGraph<N> {
    fn default() -> Self {
        Self {
            edges: HashMap::new(),
        }
    }
}

impl<N: Copy + Eq + Hash + Debug> DirectedGraph<N> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with no edges. No-op if the node exists.
    pub fn add_node(&mut self, node: N) {
        self.edges.entry(node).or_default();
    }

    /// Adds the edge `head -> tail`, adding either endpoint if missing.
    pub fn add_edge(&mut self, head: N, tail: N) {
        self.add_node(tail);
        let tails = self.edges.entry(head).or_default();
        if !tails.contains(&tail) {
            tails.push(tail);
        }
    }

    /// Removes a node and every edge touching it. Returns `false` if the
    /// node was not in the graph.
    pub fn remove_node(&mut self, node: N) -> bool {
        if self.edges.remove(&node).is_none() {
            return false;
        }
        for tails in self.edges.values_mut() {
            tails.retain(|t| *t != node);
        }
        true
    }

    /// Removes the edge `head -> tail`. Both nodes stay in the graph.
    pub fn remove_edge(&mut self, head: N, tail: N) -> bool {
        match self.edges.get_mut(&head) {
            Some(tails) => {
                let before = tails.len();
                tails.retain(|t| *t != tail);
                tails.len() != before
            }
            None => false,
        }
    }

    /// Removes every outgoing edge of `head`, keeping the node.
    pub fn clear_tails(&mut self, head: N) {
        if let Some(tails) = self.edges.get_mut(&head) {
            tails.clear();
        }
    }

    /// Returns `true` if the node is in the graph.
    pub fn contains(&self, node: N) -> bool {
        self.edges.contains_key(&node)
    }

    /// Direct successors of `head`, in insertion order. Empty for unknown
    /// nodes.
    pub fn tails_of(&self, head: N) -> &[N] {
        self.edges.get(&head).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct predecessors of `tail`. Walks every edge.
    pub fn heads_of(&self, tail: N) -> Vec<N> {
        self.edges
            .iter()
            .filter(|(_, tails)| tails.contains(&tail))
            .map(|(head, _)| *head)
            .collect()
    }

    /// Every node, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = N> + '_ {
        self.edges.keys().copied()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Removes and returns some node without outgoing edges.
    ///
    /// Which sink is picked when there are several is unspecified. Returns
    /// `None` if the graph is empty or every node lies on or leads into a
    /// cycle.
    pub fn remove_any_sink(&mut self) -> Option<N> {
        let sink = self
            .edges
            .iter()
            .find(|(_, tails)| tails.is_empty())
            .map(|(node, _)| *node)?;
        self.remove_node(sink);
        Some(sink)
    }

    /// The strongly connected component containing `node`.
    ///
    /// Only the part of the graph reachable from `node` is searched. Order
    /// within the component is unspecified.
    pub fn component_containing(&self, node: N) -> CacheResult<Vec<N>> {
        if !self.contains(node) {
            return Err(CacheError::UnknownNode {
                node: format!("{node:?}"),
            });
        }
        let mut tarjan = Tarjan::new(self);
        tarjan.strong_connect(node);
        // The root of the search finishes last, so its component is the last
        // one found.
        Ok(tarjan.components.pop().unwrap_or_default())
    }

    /// Every strongly connected component of the graph.
    ///
    /// Components come out dependencies first: no component has an edge to
    /// a component that appears after it.
    pub fn components(&self) -> Vec<Vec<N>> {
        let mut tarjan = Tarjan::new(self);
        for node in self.edges.keys() {
            if !tarjan.discovered.contains_key(node) {
                tarjan.strong_connect(*node);
            }
        }
        tarjan.components
    }
}

/// Iterative Tarjan search state.
///
/// Nodes are numbered in discovery order; that number doubles as the index
/// into the per-node vectors.
struct Tarjan<'g, N> {
    graph: &'g DirectedGraph<N>,
    discovered: HashMap<N, usize>,
    nodes: Vec<N>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<N>>,
}

impl<'g, N: Copy + Eq + Hash + Debug> Tarjan<'g, N> {
    fn new(graph: &'g DirectedGraph<N>) -> Self {
        Self {
            graph,
            discovered: HashMap::new(),
            nodes: Vec::new(),
            lowlink: Vec::new(),
            on_stack: Vec::new(),
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    fn discover(&mut self, node: N) -> usize {
        let index = self.nodes.len();
        self.discovered.insert(node, index);
        self.nodes.push(node);
        self.lowlink.push(index);
        self.on_stack.push(true);
        self.stack.push(index);
        index
    }

    fn strong_connect(&mut self, root: N) {
        // Each frame is a discovered node and the position of the next tail
        // to look at.
        let graph = self.graph;
        let mut frames = vec![(self.discover(root), 0usize)];
        while let Some(&(v, next)) = frames.last() {
            let tails = graph.tails_of(self.nodes[v]);
            if let Some(&tail) = tails.get(next) {
                let top = frames.len() - 1;
                frames[top].1 += 1;
                match self.discovered.get(&tail).copied() {
                    None => {
                        let w = self.discover(tail);
                        frames.push((w, 0));
                    }
                    Some(w) if self.on_stack[w] => {
                        self.lowlink[v] = self.lowlink[v].min(w);
                    }
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                self.lowlink[parent] = self.lowlink[parent].min(self.lowlink[v]);
            }
            if self.lowlink[v] == v {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w] = false;
                    component.push(self.nodes[w]);
                    if w == v {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }
}
