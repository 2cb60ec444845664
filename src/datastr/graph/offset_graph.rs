//! Adjacency array view over the two sort indices.
//!
//! The edges of a node in a direction are a half open range of the sorted
//! index for that direction, delimited by a CSR style offset array with one
//! entry per node plus a trailing sentinel. Both offset arrays are rebuilt
//! wholesale after every bulk mutation; there is no incremental maintenance.

use super::*;

/// Graph over owned node and edge records.
#[derive(Debug, Clone)]
pub struct OffsetGraph<N, E> {
    nodes: Vec<N>,
    edges: Vec<E>,
    out_edges: EdgeIndex,
    in_edges: EdgeIndex,
    out_offsets: Vec<u32>,
    in_offsets: Vec<u32>,
}

impl<N, E: EdgeRecord> OffsetGraph<N, E> {
    /// Take ownership of nodes and edges, sort both adjacency indices and
    /// build the offset arrays. `O(|E| log |E|)`.
    pub fn new(nodes: Vec<N>, mut edges: Vec<E>) -> OffsetGraph<N, E> {
        assert!(nodes.len() < NO_NODE as usize);
        assert!(edges.len() < NO_EDGE as usize);
        for (i, edge) in edges.iter_mut().enumerate() {
            debug_assert!(edge.id() == NO_EDGE || edge.id() == i as EdgeId);
            edge.set_id(i as EdgeId);
        }

        let mut graph = OffsetGraph {
            out_edges: EdgeIndex::identity(edges.len()),
            in_edges: EdgeIndex::identity(edges.len()),
            out_offsets: Vec::new(),
            in_offsets: Vec::new(),
            nodes,
            edges,
        };
        graph.update();
        graph
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edge records in the store, including logically removed ones.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, node: NodeId) -> &N {
        &self.nodes[node as usize]
    }

    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    pub fn edge(&self, edge: EdgeId) -> &E {
        &self.edges[edge as usize]
    }

    /// The whole edge store in id order.
    pub fn edges(&self) -> &[E] {
        &self.edges
    }

    /// Number of active edges of `node` in `direction`. O(1).
    pub fn degree(&self, node: NodeId, direction: Direction) -> usize {
        self.node_edge_ids(node, direction).len()
    }

    /// Number of active edges of `node` over both directions.
    pub fn total_degree(&self, node: NodeId) -> usize {
        self.degree(node, Direction::Out) + self.degree(node, Direction::In)
    }

    /// Ids of the active edges of `node` in `direction`, in adjacency order.
    pub fn node_edge_ids(&self, node: NodeId, direction: Direction) -> &[EdgeId] {
        let (index, offsets) = match direction {
            Direction::Out => (&self.out_edges, &self.out_offsets),
            Direction::In => (&self.in_edges, &self.in_offsets),
        };
        let node = node as usize;
        &index.ids()[offsets[node] as usize..offsets[node + 1] as usize]
    }

    /// The active edges of `node` in `direction`, in adjacency order.
    pub fn node_edges<'a>(&'a self, node: NodeId, direction: Direction) -> impl Iterator<Item = &'a E> + 'a {
        self.node_edge_ids(node, direction).iter().map(move |&id| &self.edges[id as usize])
    }

    /// Append an edge to the store under a fresh id and register it in both
    /// adjacency indices. The indices are stale until [`OffsetGraph::update`].
    pub fn push_edge(&mut self, mut edge: E) -> EdgeId {
        let id = self.edges.len() as EdgeId;
        assert!(id != NO_EDGE);
        edge.set_id(id);
        self.edges.push(edge);
        self.out_edges.push(id);
        self.in_edges.push(id);
        id
    }

    /// Overwrite the record of `id` with `new`, keeping the id. The new
    /// record must connect the same endpoints, otherwise the sort indices
    /// would silently go stale.
    pub fn replace_edge(&mut self, id: EdgeId, mut new: E) {
        let old = &self.edges[id as usize];
        assert_eq!((old.src(), old.tgt()), (new.src(), new.tgt()));
        new.set_id(id);
        self.edges[id as usize] = new;
    }

    /// Logically remove from both indices every edge matching `drop`. The
    /// records stay in the store; offsets are stale until
    /// [`OffsetGraph::update`].
    pub fn drop_indexed_edges(&mut self, mut drop: impl FnMut(&E) -> bool) {
        self.out_edges.erase_if(&self.edges, &mut drop);
        self.in_edges.erase_if(&self.edges, &mut drop);
    }

    /// Reinstall the full edge store in both indices, then rebuild offsets.
    pub fn reset_indices(&mut self) {
        self.out_edges.reset_sorted(&self.edges, out_order);
        self.in_edges.reset_sorted(&self.edges, in_order);
        self.init_offsets();
    }

    /// Drop the index and offset storage entirely. Only export by id makes
    /// sense afterwards.
    pub fn clear_indices(&mut self) {
        self.out_edges.clear();
        self.in_edges.clear();
        self.out_offsets = Vec::new();
        self.in_offsets = Vec::new();
    }

    /// Re-sort both indices and rebuild both offset arrays from the current
    /// index contents. `O(|E| log |E|)`.
    pub fn update(&mut self) {
        self.out_edges.sync_sorted(&self.edges, out_order);
        self.in_edges.sync_sorted(&self.edges, in_order);
        self.init_offsets();
    }

    fn init_offsets(&mut self) {
        debug_assert!(self.out_edges.is_sorted_by(&self.edges, out_order));
        debug_assert!(self.in_edges.is_sorted_by(&self.edges, in_order));

        let n = self.nodes.len();
        self.out_offsets = vec![0; n + 1];
        self.in_offsets = vec![0; n + 1];

        for edge in self.out_edges.iter(&self.edges) {
            self.out_offsets[edge.src() as usize] += 1;
        }
        for edge in self.in_edges.iter(&self.edges) {
            self.in_offsets[edge.tgt() as usize] += 1;
        }

        let mut out_sum = 0;
        let mut in_sum = 0;
        for i in 0..n {
            let (out_count, in_count) = (self.out_offsets[i], self.in_offsets[i]);
            self.out_offsets[i] = out_sum;
            self.in_offsets[i] = in_sum;
            out_sum += out_count;
            in_sum += in_count;
        }
        assert_eq!(out_sum as usize, self.out_edges.len());
        assert_eq!(in_sum as usize, self.in_edges.len());
        self.out_offsets[n] = out_sum;
        self.in_offsets[n] = in_sum;
    }
}
