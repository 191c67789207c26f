//! Dynamic graph for dependency-ordered execution.
//!
//! This module provides [`DynamicGraph`], an arena-indexed directed graph
//! whose edges carry the ordering relation they were derived from. Nodes
//! are opaque payloads; the executor only needs indices and edge kinds.

use petgraph::algo::toposort;
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

/// The ordering relation an edge was derived from.
///
/// An edge `a -> b` always means "a resolves before b starts". Only
/// [`EdgeKind::AlwaysRunAfter`] lets `b` run when `a` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// `b` depends on `a`.
    DependsOn,
    /// `a` was declared to run before `b`.
    RunBefore,
    /// `b` was declared to run after `a`.
    RunAfter,
    /// `b` runs after `a` even if `a` fails.
    AlwaysRunAfter,
}

impl EdgeKind {
    /// Whether a failure upstream of this edge leaves the target runnable.
    pub fn is_exempt(self) -> bool {
        matches!(self, EdgeKind::AlwaysRunAfter)
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::DependsOn => write!(f, "depends_on"),
            EdgeKind::RunBefore => write!(f, "run_before"),
            EdgeKind::RunAfter => write!(f, "run_after"),
            EdgeKind::AlwaysRunAfter => write!(f, "always_run_after"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// A directed graph of work items with typed edges.
///
/// Node indices are assigned in insertion order; the executor uses that
/// order to break ties between ready nodes.
pub struct DynamicGraph<T> {
    graph: DiGraph<T, EdgeKind>,
}

impl<T> DynamicGraph<T> {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
        }
    }

    pub fn add_node(&mut self, node: T) -> NodeIndex {
        self.graph.add_node(node)
    }

    /// Add an edge meaning `from` resolves before `to` starts.
    ///
    /// Returns `false` when the pair is already connected; the existing
    /// edge keeps its kind.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) -> bool {
        if self.graph.find_edge(from, to).is_some() {
            return false;
        }
        self.graph.add_edge(from, to, kind);
        true
    }

    pub fn node(&self, index: NodeIndex) -> Option<&T> {
        self.graph.node_weight(index)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.graph.node_weights()
    }

    pub fn edge_kind(&self, from: NodeIndex, to: NodeIndex) -> Option<EdgeKind> {
        let edge = self.graph.find_edge(from, to)?;
        self.graph.edge_weight(edge).copied()
    }

    /// Outgoing edges of `index`, ordered by target index.
    pub fn successors(&self, index: NodeIndex) -> Vec<(NodeIndex, EdgeKind)> {
        let mut out: Vec<_> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .map(|edge| (edge.target(), *edge.weight()))
            .collect();
        out.sort_by_key(|(target, _)| *target);
        out
    }

    /// Number of incoming edges of `index`, exempt ones included.
    pub fn predecessor_count(&self, index: NodeIndex) -> usize {
        self.graph
            .edges_directed(index, Direction::Incoming)
            .count()
    }

    /// Find one cycle, returned as the node path `a, b, ..., a`.
    ///
    /// Depth-first, visiting roots and successors in index order so the
    /// reported cycle is the same for identical graphs.
    pub fn find_cycle(&self) -> Option<Vec<NodeIndex>> {
        let mut marks = vec![Mark::Unvisited; self.graph.node_count()];
        let mut stack = Vec::new();
        for index in self.graph.node_indices() {
            if marks[index.index()] == Mark::Unvisited {
                if let Some(cycle) = self.visit(index, &mut marks, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit(
        &self,
        index: NodeIndex,
        marks: &mut [Mark],
        stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        marks[index.index()] = Mark::OnStack;
        stack.push(index);

        for (next, _) in self.successors(index) {
            match marks[next.index()] {
                Mark::OnStack => {
                    if let Some(start) = stack.iter().position(|&n| n == next) {
                        let mut cycle = stack[start..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                }
                Mark::Unvisited => {
                    if let Some(cycle) = self.visit(next, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        stack.pop();
        marks[index.index()] = Mark::Done;
        None
    }

    /// Node indices in an order where every edge points forward, or `None`
    /// when the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<NodeIndex>> {
        toposort(&self.graph, None).ok()
    }
}

impl<T: std::fmt::Display> DynamicGraph<T> {
    /// Render the graph in Graphviz DOT format.
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::with_config(&self.graph, &[]))
    }
}

impl<T> Default for DynamicGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for DynamicGraph<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicGraph")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}
