//! Node and edge records plus the id vocabulary shared by all graph
//! structures.
//!
//! The containers and algorithms in this crate are generic over the record
//! types below. The record shape is fixed when a graph is read; there is no
//! runtime polymorphism, only the traits at the seams.

use crate::util::InRangeOption;
use std::cmp::Ordering;

pub mod edge_index;
pub mod offset_graph;

pub use edge_index::EdgeIndex;
pub use offset_graph::OffsetGraph;

/// Node ids are dense 32bit unsigned ints.
pub type NodeId = u32;
/// Edge ids are dense 32bit unsigned ints, stable from ingest to export.
pub type EdgeId = u32;
/// Weights are 32bit unsigned ints.
pub type Weight = u32;
/// The rank a node receives when it is contracted.
pub type Level = u32;

/// Placeholder id of a node that does not exist (yet).
pub const NO_NODE: NodeId = NodeId::MAX;
/// Placeholder id of an edge that does not exist (yet).
pub const NO_EDGE: EdgeId = EdgeId::MAX;
/// Level of a node that has not been contracted. Compares greater than any
/// assigned rank.
pub const NO_LEVEL: Level = Level::MAX;
/// A sufficiently large infinity. `INFINITY + INFINITY` does not overflow.
pub const INFINITY: Weight = Weight::MAX / 2;

/// Traversal direction relative to an edge's endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
}

impl Direction {
    pub fn reverse(self) -> Direction {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
        }
    }
}

/// Record types usable as graph nodes.
pub trait NodeRecord: Clone {
    fn id(&self) -> NodeId;
    fn set_id(&mut self, id: NodeId);
}

/// Record types usable as graph edges.
pub trait EdgeRecord: Clone {
    fn id(&self) -> EdgeId;
    fn set_id(&mut self, id: EdgeId);
    fn src(&self) -> NodeId;
    fn tgt(&self) -> NodeId;

    /// The node reached by traversing the edge in `direction`.
    fn other_node(&self, direction: Direction) -> NodeId {
        match direction {
            Direction::Out => self.tgt(),
            Direction::In => self.src(),
        }
    }

    /// Join two adjacent edges into a record for the whole path
    /// `first.src() -> second.tgt()`. The new record has no id yet.
    fn concat(first: &Self, second: &Self) -> Self;
}

/// The weight the hierarchy is built on. Distinct from the plain `dist`
/// field because some record types rank paths by travel time instead.
pub trait Metric {
    fn metric(&self) -> Weight;
}

/// Outgoing adjacency order: by source, then target.
pub fn out_order<E: EdgeRecord>(a: &E, b: &E) -> Ordering {
    (a.src(), a.tgt()).cmp(&(b.src(), b.tgt()))
}

/// Incoming adjacency order: by target, then source.
pub fn in_order<E: EdgeRecord>(a: &E, b: &E) -> Ordering {
    (a.tgt(), a.src()).cmp(&(b.tgt(), b.src()))
}

/// A node as it appears in the OSM derived text formats.
#[derive(Debug, Clone, PartialEq)]
pub struct OsmNode {
    pub id: NodeId,
    pub osm_id: u64,
    pub lat: f64,
    pub lon: f64,
    pub elev: i32,
}

impl NodeRecord for OsmNode {
    fn id(&self) -> NodeId {
        self.id
    }
    fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }
}

/// A node carrying only geographic data.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoNode {
    pub id: NodeId,
    pub lat: f64,
    pub lon: f64,
    pub elev: i32,
}

impl NodeRecord for GeoNode {
    fn id(&self) -> NodeId {
        self.id
    }
    fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }
}

impl From<&OsmNode> for GeoNode {
    fn from(node: &OsmNode) -> GeoNode {
        GeoNode {
            id: node.id,
            lat: node.lat,
            lon: node.lon,
            elev: node.elev,
        }
    }
}

/// An edge as it appears in the OSM derived text formats. `speed` is the
/// posted speed, `-1` when unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct OsmEdge {
    pub id: EdgeId,
    pub src: NodeId,
    pub tgt: NodeId,
    pub dist: Weight,
    pub road_type: u32,
    pub speed: i32,
}

impl EdgeRecord for OsmEdge {
    fn id(&self) -> EdgeId {
        self.id
    }
    fn set_id(&mut self, id: EdgeId) {
        self.id = id;
    }
    fn src(&self) -> NodeId {
        self.src
    }
    fn tgt(&self) -> NodeId {
        self.tgt
    }

    fn concat(first: &Self, second: &Self) -> Self {
        assert_eq!(first.tgt, second.src);
        OsmEdge {
            id: NO_EDGE,
            src: first.src,
            tgt: second.tgt,
            dist: first.dist + second.dist,
            road_type: 0,
            speed: -1,
        }
    }
}

impl Metric for OsmEdge {
    fn metric(&self) -> Weight {
        self.dist
    }
}

/// A plain weighted edge.
#[derive(Debug, Clone, PartialEq)]
pub struct PlainEdge {
    pub id: EdgeId,
    pub src: NodeId,
    pub tgt: NodeId,
    pub dist: Weight,
}

impl EdgeRecord for PlainEdge {
    fn id(&self) -> EdgeId {
        self.id
    }
    fn set_id(&mut self, id: EdgeId) {
        self.id = id;
    }
    fn src(&self) -> NodeId {
        self.src
    }
    fn tgt(&self) -> NodeId {
        self.tgt
    }

    fn concat(first: &Self, second: &Self) -> Self {
        assert_eq!(first.tgt, second.src);
        PlainEdge {
            id: NO_EDGE,
            src: first.src,
            tgt: second.tgt,
            dist: first.dist + second.dist,
        }
    }
}

impl Metric for PlainEdge {
    fn metric(&self) -> Weight {
        self.dist
    }
}

impl From<&OsmEdge> for PlainEdge {
    fn from(edge: &OsmEdge) -> PlainEdge {
        PlainEdge {
            id: edge.id,
            src: edge.src,
            tgt: edge.tgt,
            dist: edge.dist,
        }
    }
}

/// An edge of the hierarchy: either an original road edge or a shortcut
/// standing in for two child edges joined at a contracted center node.
/// For originals all three extra fields are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ChEdge<E> {
    pub edge: E,
    pub child_edge1: InRangeOption<EdgeId>,
    pub child_edge2: InRangeOption<EdgeId>,
    pub center_node: InRangeOption<NodeId>,
}

impl<E> ChEdge<E> {
    pub fn original(edge: E) -> ChEdge<E> {
        ChEdge {
            edge,
            child_edge1: InRangeOption::NONE,
            child_edge2: InRangeOption::NONE,
            center_node: InRangeOption::NONE,
        }
    }

    pub fn shortcut(edge: E, child_edge1: EdgeId, child_edge2: EdgeId, center_node: NodeId) -> ChEdge<E> {
        ChEdge {
            edge,
            child_edge1: InRangeOption::some(child_edge1),
            child_edge2: InRangeOption::some(child_edge2),
            center_node: InRangeOption::some(center_node),
        }
    }

    pub fn is_shortcut(&self) -> bool {
        self.center_node.value().is_some()
    }
}

impl<E: EdgeRecord> EdgeRecord for ChEdge<E> {
    fn id(&self) -> EdgeId {
        self.edge.id()
    }
    fn set_id(&mut self, id: EdgeId) {
        self.edge.set_id(id);
    }
    fn src(&self) -> NodeId {
        self.edge.src()
    }
    fn tgt(&self) -> NodeId {
        self.edge.tgt()
    }

    fn concat(first: &Self, second: &Self) -> Self {
        ChEdge::original(E::concat(&first.edge, &second.edge))
    }
}

impl<E: Metric> Metric for ChEdge<E> {
    fn metric(&self) -> Weight {
        self.edge.metric()
    }
}
