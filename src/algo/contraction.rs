//! The contraction round mutator.
//!
//! A [`ShortcutGraph`] is the working state of the construction: the full
//! edge store (originals plus every shortcut accepted so far), the two
//! shrinking adjacency indices over the not yet contracted part, and the
//! level assigned to each contracted node. One call to
//! [`ShortcutGraph::restructure`] applies a whole contraction round; the
//! caller (normally [`driver`]) decides which nodes to contract and which
//! candidate shortcuts they induce.

use crate::datastr::graph::*;

pub mod driver;

/// The flat view of a finished hierarchy: everything export needs, by id.
#[derive(Debug, Clone, Copy)]
pub struct ChOutData<'a, N, E> {
    pub nodes: &'a [N],
    pub node_levels: &'a [Level],
    pub edges: &'a [ChEdge<E>],
}

/// A graph under contraction.
#[derive(Debug, Clone)]
pub struct ShortcutGraph<N, E> {
    graph: OffsetGraph<N, ChEdge<E>>,
    node_levels: Vec<Level>,
    next_level: Level,
}

impl<N: Clone, E: EdgeRecord + Metric> ShortcutGraph<N, E> {
    /// Wrap the ingested records; every edge starts out as an original.
    pub fn new(nodes: Vec<N>, edges: Vec<E>) -> ShortcutGraph<N, E> {
        let node_levels = vec![NO_LEVEL; nodes.len()];
        let edges = edges.into_iter().map(ChEdge::original).collect();
        ShortcutGraph {
            graph: OffsetGraph::new(nodes, edges),
            node_levels,
            next_level: 0,
        }
    }

    pub fn graph(&self) -> &OffsetGraph<N, ChEdge<E>> {
        &self.graph
    }

    pub fn node_levels(&self) -> &[Level] {
        &self.node_levels
    }

    pub fn level(&self, node: NodeId) -> Level {
        self.node_levels[node as usize]
    }

    /// True while `node` has not been contracted.
    pub fn is_active(&self, node: NodeId) -> bool {
        self.node_levels[node as usize] == NO_LEVEL
    }

    /// Apply one contraction round.
    ///
    /// `deleted` lists the distinct, previously uncontracted nodes ranked in
    /// this round, `to_delete` is the same set as a bitmap over all nodes,
    /// and `new_shortcuts` are the candidates the witness search produced
    /// for them. Candidates whose center was not contracted in this round
    /// are dropped (a time bounded witness search may overapproximate); a
    /// candidate with a contracted endpoint is a bug in the caller.
    pub fn restructure(&mut self, deleted: &[NodeId], to_delete: &[bool], mut new_shortcuts: Vec<ChEdge<E>>) {
        assert_eq!(to_delete.len(), self.graph.num_nodes());

        for &node in deleted {
            assert!(to_delete[node as usize]);
            assert_eq!(self.node_levels[node as usize], NO_LEVEL, "node contracted twice");
            self.node_levels[node as usize] = self.next_level;
        }
        self.next_level += 1;

        // only candidates whose center actually went away this round count
        new_shortcuts.retain(|sc| {
            let center = sc.center_node.value().expect("shortcut candidate without center node");
            if !to_delete[center as usize] {
                return false;
            }
            assert!(
                !to_delete[sc.src() as usize] && !to_delete[sc.tgt() as usize],
                "candidate endpoint contracted in the same round as its center"
            );
            true
        });

        // adjacency order, shorter first, so the dedup below keeps the best
        // candidate per endpoint pair
        new_shortcuts.sort_unstable_by(|a, b| (a.src(), a.tgt(), a.metric()).cmp(&(b.src(), b.tgt(), b.metric())));
        new_shortcuts.dedup_by(|a, b| a.src() == b.src() && a.tgt() == b.tgt());

        // a candidate that does not beat what the graph already has between
        // its endpoints is dropped; if it beats an existing shortcut, that
        // record is overwritten under its old id so references to it stay
        // valid. Originals are never overwritten: they carry the authoritative
        // road distance.
        let graph = &mut self.graph;
        new_shortcuts.retain(|sc| {
            enum Outcome {
                Append,
                Drop,
                Replace(EdgeId),
            }
            let mut outcome = Outcome::Append;
            for edge in graph.node_edges(sc.src(), Direction::Out) {
                if edge.tgt() != sc.tgt() {
                    continue;
                }
                if sc.metric() >= edge.metric() {
                    outcome = Outcome::Drop;
                    break;
                }
                if edge.is_shortcut() {
                    outcome = Outcome::Replace(edge.id());
                    break;
                }
            }
            match outcome {
                Outcome::Append => true,
                Outcome::Drop => false,
                Outcome::Replace(id) => {
                    graph.replace_edge(id, sc.clone());
                    false
                }
            }
        });

        // edges touching a contracted node leave the indices but stay in the
        // store: export still reaches them by id
        self.graph
            .drop_indexed_edges(|edge| to_delete[edge.src() as usize] || to_delete[edge.tgt() as usize]);

        for sc in new_shortcuts {
            self.graph.push_edge(sc);
        }

        self.graph.update();
    }

    /// Reinstall every edge ever seen in both indices. Undoes the shrinking
    /// of the active graph once contraction is finished.
    pub fn rebuild_complete_graph(&mut self) {
        self.graph.reset_indices();
    }

    /// Does traversing `edge` in `direction` move to a higher level node?
    /// An edge between two nodes of equal level cannot exist in a well
    /// formed hierarchy, in particular not between two uncontracted nodes.
    pub fn is_up(&self, edge: &ChEdge<E>, direction: Direction) -> bool {
        let src_level = self.level(edge.src());
        let tgt_level = self.level(edge.tgt());
        assert_ne!(src_level, tgt_level, "edge between nodes of equal level");

        if src_level < tgt_level {
            direction == Direction::Out
        } else {
            direction == Direction::In
        }
    }

    /// Borrow the flat export view.
    pub fn ch_data(&self) -> ChOutData<'_, N, E> {
        ChOutData {
            nodes: self.graph.nodes(),
            node_levels: &self.node_levels,
            edges: self.graph.edges(),
        }
    }

    /// Like [`ShortcutGraph::ch_data`], but releases the index and offset
    /// storage first. The graph can no longer answer adjacency queries.
    pub fn export_data(&mut self) -> ChOutData<'_, N, E> {
        self.graph.clear_indices();
        ChOutData {
            nodes: self.graph.nodes(),
            node_levels: &self.node_levels,
            edges: self.graph.edges(),
        }
    }
}
