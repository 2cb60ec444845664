use ch_constructor::algo::contraction::driver::contract_all;
use ch_constructor::algo::contraction::ShortcutGraph;
use ch_constructor::datastr::graph::*;
use ch_constructor::io::offline_tp::{self, GraphFile, GridSpec, TpEdge, TpNode};
use ch_constructor::io::{text, FileFormat};
use std::io::Cursor;

// A ring of five nodes, each leg a 1000m residential road:
//
//          (3) 49.02,8.01
//          /  \
//  49.01,8    49.01,8.02
//    (4)        (2)
//          \  /
//     (0)---(1)
//  49,8      49,8.01
//
// Contracting it has to rank every node, keep the originals untouched and
// insert the ring shortcuts the witness search cannot avoid.
const RING: &str = "\
5
10
0 100 49 8 0
1 101 49 8.01 0
2 102 49.01 8.02 0
3 103 49.02 8.01 0
4 104 49.01 8 0
0 1 1000 12 50
1 0 1000 12 50
1 2 1000 12 50
2 1 1000 12 50
2 3 1000 12 50
3 2 1000 12 50
3 4 1000 12 50
4 3 1000 12 50
4 0 1000 12 50
0 4 1000 12 50
";

// keeps the test files small; the on disk shape is identical
const SMALL_GRID: GridSpec = GridSpec {
    levels: [(5, 8), (10, 4), (20, 2), (40, 1)],
    block_size: 15,
};

#[test]
fn text_round_trip_preserves_the_graph() {
    let input: text::GraphInput<OsmNode, OsmEdge> = text::read_graph(FileFormat::Std, RING.as_bytes(), "ring").unwrap();
    assert_eq!(input.nodes.len(), 5);
    assert_eq!(input.edges.len(), 10);

    let mut written = Vec::new();
    text::write_graph(FileFormat::Std, &mut written, &input.nodes, &input.edges).unwrap();
    assert_eq!(String::from_utf8(written).unwrap(), RING);
}

#[test]
fn full_construction_and_nearest_node_lookup() {
    let input: text::GraphInput<OsmNode, OsmEdge> = text::read_graph(FileFormat::Std, RING.as_bytes(), "ring").unwrap();

    let nodes: Vec<TpNode> = input.nodes.iter().map(TpNode::from).collect();
    let edges: Vec<TpEdge> = input.edges.iter().map(TpEdge::from).collect();
    let originals = edges.clone();

    let mut graph = ShortcutGraph::new(nodes.clone(), edges);
    contract_all(&mut graph);

    // every node got a rank, in particular the ring has no core
    assert!((0..5).all(|node| graph.level(node) < 40));

    // the ring forces exactly the two shortcuts bridging the first
    // contracted node
    let first = (0..5).find(|&node| graph.level(node) == 0).unwrap();
    let shortcuts: Vec<_> = graph.graph().edges().iter().filter(|e| e.is_shortcut()).cloned().collect();
    assert_eq!(shortcuts.len(), 2);
    for shortcut in &shortcuts {
        assert_eq!(shortcut.center_node.value(), Some(first));
        assert_eq!(shortcut.metric(), 2 * 1000 * 1300 / 50);
    }

    // originals go through contraction untouched
    for original in &originals {
        let stored = graph.graph().edge(original.id);
        assert!(!stored.is_shortcut());
        assert_eq!(stored.edge, *original);
    }

    // every surviving edge is strictly directed in levels
    graph.rebuild_complete_graph();
    let edge_ids: Vec<EdgeId> = (0..graph.graph().num_edges() as EdgeId).collect();
    for id in edge_ids {
        let edge = graph.graph().edge(id).clone();
        assert_ne!(graph.is_up(&edge, Direction::Out), graph.is_up(&edge, Direction::In));
    }

    // serialize and query back
    let mut bytes = Vec::new();
    let stats = {
        let ch = graph.export_data();
        offline_tp::write_ch_graph_with(&mut bytes, ch, &SMALL_GRID).unwrap()
    };
    // no core means every edge of the hierarchy lands in the file
    assert_eq!(stats.edges_written, 12);

    let mut file = GraphFile::new(Cursor::new(bytes));
    file.load_header().unwrap();

    // querying at a node's own coordinates finds exactly that node
    for (node, tp) in nodes.iter().enumerate() {
        let found = file.find_node(tp.lon as f64 / 1e7, tp.lat as f64 / 1e7).unwrap();
        assert_eq!(found, Some(stats.node_file_ids[node]), "node {}", node);
    }

    // a query strictly closest to node 0 resolves to node 0
    let found = file.find_node(8.001, 49.0005).unwrap();
    assert_eq!(found, Some(stats.node_file_ids[0]));
}
