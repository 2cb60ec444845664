//! Drives a whole contraction: priority based independent sets, witness
//! searches, one [`ShortcutGraph::restructure`] per round.
//!
//! The priority is the classic cheap edge difference estimate
//! `in_degree * out_degree - (in_degree + out_degree)`; a node is contracted
//! when it is strictly minimal (priority, then id) within its active
//! neighborhood, so no round ever contracts two adjacent nodes and the
//! candidate validity rules of the core hold by construction.

use super::*;
use crate::datastr::index_heap::{IndexedMinHeap, Indexing};

/// Contract every node of the graph. Terminates because each round
/// contracts at least the globally minimal active node.
pub fn contract_all<N: Clone, E: EdgeRecord + Metric>(graph: &mut ShortcutGraph<N, E>) {
    let n = graph.graph().num_nodes();
    let mut witness = WitnessSearch::new(n);
    let mut rounds = 0u32;
    let mut remaining = n;

    while remaining > 0 {
        let (deleted, to_delete) = independent_set(graph);
        assert!(!deleted.is_empty());
        remaining -= deleted.len();

        let mut candidates = Vec::new();
        for &node in &deleted {
            collect_candidates(graph, node, &mut witness, &mut candidates);
        }

        graph.restructure(&deleted, &to_delete, candidates);
        rounds += 1;
    }

    report!("contraction_rounds", rounds);
    report!("edges_after_contraction", graph.graph().num_edges());
}

fn priority<N, E: EdgeRecord>(graph: &OffsetGraph<N, ChEdge<E>>, node: NodeId) -> i64 {
    let out_degree = graph.degree(node, Direction::Out) as i64;
    let in_degree = graph.degree(node, Direction::In) as i64;
    in_degree * out_degree - (in_degree + out_degree)
}

/// All active nodes that are minimal within their active neighborhood.
fn independent_set<N: Clone, E: EdgeRecord + Metric>(graph: &ShortcutGraph<N, E>) -> (Vec<NodeId>, Vec<bool>) {
    let inner = graph.graph();
    let n = inner.num_nodes();

    let priorities: Vec<i64> = (0..n as NodeId).map(|node| priority(inner, node)).collect();

    let mut deleted = Vec::new();
    let mut to_delete = vec![false; n];
    for node in (0..n as NodeId).filter(|&node| graph.is_active(node)) {
        let key = (priorities[node as usize], node);
        let beats = |other: NodeId| other == node || key < (priorities[other as usize], other);
        let minimal = inner.node_edges(node, Direction::Out).all(|e| beats(e.tgt()))
            && inner.node_edges(node, Direction::In).all(|e| beats(e.src()));
        if minimal {
            deleted.push(node);
            to_delete[node as usize] = true;
        }
    }

    (deleted, to_delete)
}

/// Run the witness searches for one node about to be contracted and push
/// the shortcut candidates its neighbor pairs need.
fn collect_candidates<N: Clone, E: EdgeRecord + Metric>(
    graph: &ShortcutGraph<N, E>,
    node: NodeId,
    witness: &mut WitnessSearch,
    candidates: &mut Vec<ChEdge<E>>,
) {
    let inner = graph.graph();
    for incoming in inner.node_edges(node, Direction::In) {
        let from = incoming.src();
        if from == node {
            continue;
        }
        for outgoing in inner.node_edges(node, Direction::Out) {
            let to = outgoing.tgt();
            if to == node || to == from {
                continue;
            }
            let via = incoming.metric() + outgoing.metric();
            if witness.distance_without(inner, from, to, node, via) < via {
                continue;
            }
            candidates.push(ChEdge::shortcut(
                E::concat(&incoming.edge, &outgoing.edge),
                incoming.id(),
                outgoing.id(),
                node,
            ));
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, PartialOrd, Ord)]
struct State {
    distance: Weight,
    node: NodeId,
}

impl Indexing for State {
    fn as_index(&self) -> usize {
        self.node as usize
    }
}

/// A cost capped Dijkstra over the active graph, with reusable storage
/// across searches. Distances are reset through a touched list, so each
/// search costs only what it visits.
struct WitnessSearch {
    distances: Vec<Weight>,
    touched: Vec<NodeId>,
    queue: IndexedMinHeap<State>,
}

impl WitnessSearch {
    fn new(n: usize) -> WitnessSearch {
        WitnessSearch {
            distances: vec![INFINITY; n],
            touched: Vec::new(),
            queue: IndexedMinHeap::new(n),
        }
    }

    /// Shortest distance from `from` to `to` in the active graph avoiding
    /// `skip`, or [`INFINITY`] if none not longer than `cap` exists.
    fn distance_without<N, E: EdgeRecord + Metric>(
        &mut self,
        graph: &OffsetGraph<N, ChEdge<E>>,
        from: NodeId,
        to: NodeId,
        skip: NodeId,
        cap: Weight,
    ) -> Weight {
        for &node in &self.touched {
            self.distances[node as usize] = INFINITY;
        }
        self.touched.clear();
        self.queue.clear();

        self.distances[from as usize] = 0;
        self.touched.push(from);
        self.queue.push(State { distance: 0, node: from });

        while let Some(State { distance, node }) = self.queue.pop() {
            if distance > cap || node == to {
                break;
            }
            for edge in graph.node_edges(node, Direction::Out) {
                let next = edge.tgt();
                if next == skip {
                    continue;
                }
                let next_distance = distance + edge.metric();
                if next_distance < self.distances[next as usize] {
                    if self.distances[next as usize] == INFINITY && !self.queue.contains_index(next as usize) {
                        self.touched.push(next);
                        self.queue.push(State {
                            distance: next_distance,
                            node: next,
                        });
                    } else if self.queue.contains_index(next as usize) {
                        self.queue.decrease_key(State {
                            distance: next_distance,
                            node: next,
                        });
                    } else {
                        // already settled with a smaller distance
                        continue;
                    }
                    self.distances[next as usize] = next_distance;
                }
            }
        }

        self.distances[to as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(src: NodeId, tgt: NodeId, dist: Weight) -> PlainEdge {
        PlainEdge {
            id: NO_EDGE,
            src,
            tgt,
            dist,
        }
    }

    fn both_ways(a: NodeId, b: NodeId, dist: Weight) -> [PlainEdge; 2] {
        [edge(a, b, dist), edge(b, a, dist)]
    }

    #[test]
    fn contracts_every_node_with_monotone_levels() {
        //  0 <-> 1 <-> 2 <-> 3 <-> 4
        let edges = [both_ways(0, 1, 1), both_ways(1, 2, 1), both_ways(2, 3, 1), both_ways(3, 4, 1)]
            .into_iter()
            .flatten()
            .collect();
        let mut graph = ShortcutGraph::new(vec![(); 5], edges);
        contract_all(&mut graph);

        assert!((0..5).all(|node| !graph.is_active(node)));
        // leaves go before their inner neighbors
        assert!(graph.level(0) < graph.level(1));
        assert!(graph.level(4) < graph.level(3));
        // a chain never needs shortcuts
        assert_eq!(graph.graph().num_edges(), 8);
    }

    #[test]
    fn every_edge_of_the_finished_hierarchy_is_directed_in_levels() {
        let edges = [both_ways(0, 1, 2), both_ways(1, 2, 3), both_ways(2, 0, 4), both_ways(2, 3, 1)]
            .into_iter()
            .flatten()
            .collect();
        let mut graph = ShortcutGraph::new(vec![(); 4], edges);
        contract_all(&mut graph);
        graph.rebuild_complete_graph();

        for edge in graph.graph().edges() {
            // is_up asserts that no edge connects equal levels
            let up_out = graph.is_up(edge, Direction::Out);
            let up_in = graph.is_up(edge, Direction::In);
            assert_ne!(up_out, up_in);
        }
    }

    #[test]
    fn through_node_without_witness_gets_shortcuts() {
        //  ring around node 0: the cheap paths 1 -> 0 -> 3 and 3 -> 0 -> 1
        //  have no witness, the expensive detour via 2 is no alternative
        let edges = [
            both_ways(0, 1, 1),
            both_ways(0, 3, 1),
            both_ways(1, 2, 5),
            both_ways(2, 3, 5),
        ]
        .into_iter()
        .flatten()
        .collect();
        let mut graph = ShortcutGraph::new(vec![(); 4], edges);
        contract_all(&mut graph);

        // node 0 went first and induced exactly the two shortcuts 1 <-> 3
        assert_eq!(graph.level(0), 0);
        assert_eq!(graph.graph().num_edges(), 10);
        let shortcuts: Vec<_> = graph.graph().edges().iter().filter(|e| e.is_shortcut()).collect();
        assert_eq!(shortcuts.len(), 2);
        for shortcut in shortcuts {
            assert_eq!(shortcut.center_node.value(), Some(0));
            assert_eq!(shortcut.metric(), 2);
            assert!(shortcut.child_edge1.value().unwrap() < shortcut.id());
            assert!(shortcut.child_edge2.value().unwrap() < shortcut.id());
            let (src, tgt) = (shortcut.src(), shortcut.tgt());
            assert!((src, tgt) == (1, 3) || (src, tgt) == (3, 1));
        }
    }

    #[test]
    fn witness_path_prevents_the_shortcut() {
        //  diamond: 1 - 0 - 2 with a cheaper side path 1 - 3 - 2
        let edges = [
            both_ways(1, 0, 2),
            both_ways(0, 2, 2),
            both_ways(1, 3, 1),
            both_ways(3, 2, 1),
        ]
        .into_iter()
        .flatten()
        .collect();
        let mut graph = ShortcutGraph::new(vec![(); 4], edges);
        contract_all(&mut graph);

        assert!(graph.graph().edges().iter().all(|e| !e.is_shortcut()));
        assert_eq!(graph.graph().num_edges(), 8);
    }
}
