//! In-memory directed graph shared read-only by all workers of a process

pub mod dot;
pub mod provider;

pub use dot::parse_dot;
pub use provider::{provider_for, FileGraphProvider, GraphProvider, HttpGraphProvider};

use crate::common::Vertex;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

/// Directed graph over integer vertices.
///
/// Parallel edges collapse into one adjacency entry; self-loops are kept.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    inner: DiGraphMap<Vertex, ()>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an edge list, adding every endpoint as a vertex.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (Vertex, Vertex)>,
    {
        let mut graph = Self::new();
        for (source, target) in edges {
            graph.add_edge(source, target);
        }
        graph
    }

    pub fn add_vertex(&mut self, vertex: Vertex) {
        self.inner.add_node(vertex);
    }

    pub fn add_edge(&mut self, source: Vertex, target: Vertex) {
        self.inner.add_edge(source, target, ());
    }

    pub fn vertex_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn contains(&self, vertex: Vertex) -> bool {
        self.inner.contains_node(vertex)
    }

    /// Vertices in insertion order
    pub fn vertices(&self) -> impl Iterator<Item = Vertex> + '_ {
        self.inner.nodes()
    }

    /// Targets of the outbound edges of `vertex`; empty for unknown vertices.
    pub fn successors(&self, vertex: Vertex) -> Vec<Vertex> {
        if !self.inner.contains_node(vertex) {
            return Vec::new();
        }
        self.inner
            .neighbors_directed(vertex, Direction::Outgoing)
            .collect()
    }

    pub fn out_degree(&self, vertex: Vertex) -> usize {
        if !self.inner.contains_node(vertex) {
            return 0;
        }
        self.inner
            .neighbors_directed(vertex, Direction::Outgoing)
            .count()
    }

    pub fn is_sink(&self, vertex: Vertex) -> bool {
        self.out_degree(vertex) == 0
    }
}
