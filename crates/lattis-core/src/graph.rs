//! Compressed directed graph over site indices.
//!
//! Nodes are `0..num_nodes`; edges are hoppings. Out-neighbors are stored
//! in compressed sparse row form and kept sorted, so edge queries are a
//! binary search.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Edge ({0}, {1}) refers to a node outside 0..{2}")]
    NodeOutOfRange(usize, usize, usize),

    #[error("Duplicate edge ({0}, {1})")]
    DuplicateEdge(usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Graph {
    heads_idxs: Vec<usize>,
    heads: Vec<usize>,
}

impl Graph {
    /// Build a graph from `(tail, head)` pairs.
    pub fn from_edges(
        num_nodes: usize,
        edges: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self, GraphError> {
        let mut edges: Vec<(usize, usize)> = edges.into_iter().collect();
        if let Some(&(a, b)) = edges.iter().find(|(a, b)| *a >= num_nodes || *b >= num_nodes) {
            return Err(GraphError::NodeOutOfRange(a, b, num_nodes));
        }
        edges.sort_unstable();
        if let Some(w) = edges.windows(2).find(|w| w[0] == w[1]) {
            return Err(GraphError::DuplicateEdge(w[0].0, w[0].1));
        }

        let mut heads_idxs = vec![0; num_nodes + 1];
        for &(tail, _) in &edges {
            heads_idxs[tail + 1] += 1;
        }
        for i in 0..num_nodes {
            heads_idxs[i + 1] += heads_idxs[i];
        }
        let heads = edges.into_iter().map(|(_, head)| head).collect();
        Ok(Self { heads_idxs, heads })
    }

    pub fn num_nodes(&self) -> usize {
        self.heads_idxs.len().saturating_sub(1)
    }

    pub fn num_edges(&self) -> usize {
        self.heads.len()
    }

    /// Heads of the edges leaving `node`, in increasing order.
    pub fn out_neighbors(&self, node: usize) -> &[usize] {
        if node >= self.num_nodes() {
            return &[];
        }
        &self.heads[self.heads_idxs[node]..self.heads_idxs[node + 1]]
    }

    pub fn has_edge(&self, tail: usize, head: usize) -> bool {
        self.out_neighbors(tail).binary_search(&head).is_ok()
    }

    /// All edges as `(tail, head)` pairs, sorted.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.num_nodes()).flat_map(move |t| self.out_neighbors(t).iter().map(move |&h| (t, h)))
    }
}
