//! The block structured binary file for the offline client.
//!
//! Nodes are sorted into a hierarchy of grids by their contraction level:
//! the finest grid holds the unimportant nodes, coarser grids the higher
//! levels, and the top of the hierarchy lands in a single "core" chain.
//! Every (grid, cell) owns a chain of fixed size blocks of node ids, and the
//! chains of one base cell are linked vertically through all levels, so a
//! reader can visit everything lying over a base cell by following `next`
//! pointers from the base block. Edges are stored once, either outgoing on
//! their lower endpoint or incoming on the upper one; shortcuts that live
//! entirely in the core are dropped because the core is searched fully
//! anyway.
//!
//! All integers on disk are big endian; the five sections are 4096 byte
//! aligned. The layout is fixed by the client, so the writer asserts rather
//! than repairs when handed a graph that cannot be expressed.

use super::FormatError;
use crate::algo::contraction::ChOutData;
use crate::datastr::graph::*;
use std::cmp::min;
use std::collections::HashSet;
use std::error::Error;
use std::io::{self, Read, Seek, SeekFrom, Write};

const PAGE_SIZE: u64 = 4096;
const MAGIC: [u32; 2] = [0x4348_474F, 0x6666_5450]; // "CHGOffTP"
const VERSION: u32 = 1;
const NO_BLOCK: u32 = u32::MAX;

/// A node as stored in the file: coordinates only, in micro degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpNode {
    pub lat: i32,
    pub lon: i32,
}

fn micro_degrees(deg: f64) -> i32 {
    (deg * 1e7).round() as i32
}

impl From<&OsmNode> for TpNode {
    fn from(node: &OsmNode) -> TpNode {
        TpNode {
            lat: micro_degrees(node.lat),
            lon: micro_degrees(node.lon),
        }
    }
}

impl From<&GeoNode> for TpNode {
    fn from(node: &GeoNode) -> TpNode {
        TpNode {
            lat: micro_degrees(node.lat),
            lon: micro_degrees(node.lon),
        }
    }
}

/// An edge as stored in the file: length plus travel time. The hierarchy
/// for this format is built on the time, so that is the metric.
#[derive(Debug, Clone, PartialEq)]
pub struct TpEdge {
    pub id: EdgeId,
    pub src: NodeId,
    pub tgt: NodeId,
    pub dist: u32,
    /// travel time in units of 9/325 s (1/130000 h)
    pub time: u32,
}

fn default_speed(road_type: u32) -> u64 {
    match road_type {
        1 => 130,
        2 => 100,
        3 | 4 => 70,
        5 | 6 => 65,
        7 | 8 => 60,
        9 | 10 => 80,
        11 => 30,
        12 => 50,
        13..=16 => 30,
        _ => 50,
    }
}

/// Travel time for a road of the given length, type and posted speed.
pub fn calc_time(dist: u32, road_type: u32, speed: i32) -> u32 {
    let speed = if speed > 0 { speed as u64 } else { default_speed(road_type) };
    min(u64::from(u32::MAX), u64::from(dist) * 1300 / speed) as u32
}

impl From<&OsmEdge> for TpEdge {
    fn from(edge: &OsmEdge) -> TpEdge {
        TpEdge {
            id: edge.id,
            src: edge.src,
            tgt: edge.tgt,
            dist: edge.dist,
            time: calc_time(edge.dist, edge.road_type, edge.speed),
        }
    }
}

impl EdgeRecord for TpEdge {
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
        TpEdge {
            id: NO_EDGE,
            src: first.src,
            tgt: second.tgt,
            dist: first.dist + second.dist,
            time: first.time + second.time,
        }
    }
}

impl Metric for TpEdge {
    fn metric(&self) -> Weight {
        self.time
    }
}

/// The grid hierarchy: `(first level beyond the grid, cells per axis)` from
/// finest to coarsest, plus the node capacity of a block. Nodes at or above
/// the last threshold form the core.
#[derive(Debug, Clone, Copy)]
pub struct GridSpec {
    pub levels: [(Level, u32); 4],
    pub block_size: u32,
}

/// The layout the offline client expects.
pub const STANDARD_GRID: GridSpec = GridSpec {
    levels: [(5, 256), (10, 64), (20, 32), (40, 8)],
    block_size: 255,
};

impl GridSpec {
    fn base_dim(&self) -> u32 {
        self.levels[0].1
    }

    fn core_level(&self) -> Level {
        self.levels[3].0
    }

    fn cell_count(&self) -> usize {
        self.levels.iter().map(|&(_, dim)| (dim * dim) as usize).sum()
    }
}

/// What the writer learned while laying out the file. `node_file_ids` maps
/// every node of the graph to its `(block << 10) | slot` file id.
#[derive(Debug)]
pub struct WriteStats {
    pub blocks: usize,
    pub edges_written: usize,
    pub node_file_ids: Vec<u32>,
}

/// Serialize a finished hierarchy with the client's standard layout.
pub fn write_ch_graph<W: Write>(out: &mut W, data: ChOutData<TpNode, TpEdge>) -> Result<WriteStats, Box<dyn Error>> {
    write_ch_graph_with(out, data, &STANDARD_GRID)
}

/// Serialize with an explicit grid layout. The file is self describing, so
/// readers cope with any layout; the standard one is what ships.
pub fn write_ch_graph_with<W: Write>(
    out: &mut W,
    data: ChOutData<TpNode, TpEdge>,
    spec: &GridSpec,
) -> Result<WriteStats, Box<dyn Error>> {
    assert!(spec.block_size > 0 && spec.block_size < 1024, "block size must fit 10 bit slots");
    for &(_, dim) in &spec.levels {
        assert_eq!(spec.base_dim() % dim, 0, "coarser grids must align to the base grid");
    }
    if data.nodes.len() != data.node_levels.len() {
        return Err(Box::new(FormatError("level array does not match the node array")));
    }

    let mut writer = TpWriter::new(data, *spec);
    writer.calc_bounds();
    writer.prepare_cell_blocks();
    writer.fill_blocks();
    writer.count_and_sort_edges();
    writer.write(out)?;

    report!("offtp_blocks_in_use", writer.blocks.len());
    report!("offtp_edges_written", writer.use_edges.len());

    Ok(WriteStats {
        blocks: writer.blocks.len(),
        edges_written: writer.use_edges.len(),
        node_file_ids: writer.node_file_ids,
    })
}

#[derive(Debug, Clone)]
struct Block {
    base_x: i32,
    base_y: i32,
    level: u32,
    next: u32,
    count: u32,
    node_ids: Vec<u32>,
}

struct TpWriter<'a> {
    nodes: &'a [TpNode],
    node_levels: &'a [Level],
    edges: &'a [ChEdge<TpEdge>],
    spec: GridSpec,

    min_lon: i32,
    min_lat: i32,
    max_lon: i32,
    max_lat: i32,
    base_cell_x: i32,
    base_cell_y: i32,
    base_cell_width: i32,
    base_cell_height: i32,

    blocks: Vec<Block>,
    /// per (grid, cell) the first block of its chain, all grids back to back
    cell_blocks: Vec<u32>,
    core_block_start: u32,
    /// ascending insertion guard; core is `usize::MAX`
    current_grid: usize,

    node_file_ids: Vec<u32>,
    node_first_out: Vec<u32>,
    node_first_in: Vec<u32>,
    node_end_edge: Vec<u32>,
    /// file edge id -> index into the edge store
    use_edges: Vec<u32>,
    /// index into the edge store -> file edge id, or absent
    edges_reverse: Vec<u32>,
}

enum Stored {
    Outgoing,
    Incoming,
}

impl<'a> TpWriter<'a> {
    fn new(data: ChOutData<'a, TpNode, TpEdge>, spec: GridSpec) -> TpWriter<'a> {
        TpWriter {
            nodes: data.nodes,
            node_levels: data.node_levels,
            edges: data.edges,
            spec,
            min_lon: 0,
            min_lat: 0,
            max_lon: 0,
            max_lat: 0,
            base_cell_x: 0,
            base_cell_y: 0,
            base_cell_width: 1,
            base_cell_height: 1,
            blocks: Vec::new(),
            cell_blocks: Vec::new(),
            core_block_start: NO_BLOCK,
            current_grid: 0,
            node_file_ids: Vec::new(),
            node_first_out: Vec::new(),
            node_first_in: Vec::new(),
            node_end_edge: Vec::new(),
            use_edges: Vec::new(),
            edges_reverse: Vec::new(),
        }
    }

    fn calc_bounds(&mut self) {
        self.min_lon = self.nodes.iter().map(|n| n.lon).min().unwrap_or(0);
        self.max_lon = self.nodes.iter().map(|n| n.lon).max().unwrap_or(0);
        self.min_lat = self.nodes.iter().map(|n| n.lat).min().unwrap_or(0);
        self.max_lat = self.nodes.iter().map(|n| n.lat).max().unwrap_or(0);
    }

    fn prepare_cell_blocks(&mut self) {
        let dim = self.spec.base_dim();
        self.base_cell_x = self.min_lon - 1;
        self.base_cell_y = self.min_lat - 1;
        self.base_cell_width = ((i64::from(self.max_lon) - i64::from(self.min_lon)) / i64::from(dim) + 1) as i32;
        self.base_cell_height = ((i64::from(self.max_lat) - i64::from(self.min_lat)) / i64::from(dim) + 1) as i32;

        self.cell_blocks = vec![NO_BLOCK; self.spec.cell_count()];

        // the base grid is fully allocated up front, in row major order so
        // that cell index and block index coincide
        for y in 0..dim {
            for x in 0..dim {
                let base_x = self.base_cell_x + x as i32 * self.base_cell_width;
                let base_y = self.base_cell_y + y as i32 * self.base_cell_height;
                let block = self.create_block(base_x, base_y, 0);
                let cell = (y * dim + x) as usize;
                assert_eq!(block, cell as u32);
                self.cell_blocks[cell] = block;
            }
        }
    }

    fn create_block(&mut self, base_x: i32, base_y: i32, level: u32) -> u32 {
        let index = self.blocks.len() as u32;
        self.blocks.push(Block {
            base_x,
            base_y,
            level,
            next: NO_BLOCK,
            count: 0,
            node_ids: vec![NO_BLOCK; self.spec.block_size as usize],
        });
        index
    }

    fn extend_block(&mut self, block: u32) -> u32 {
        let old = self.blocks[block as usize].clone();
        assert_eq!(old.next, NO_BLOCK);
        let index = self.create_block(old.base_x, old.base_y, old.level);
        self.blocks[block as usize].next = index;
        index
    }

    /// Last block of the chain starting at `block` that still belongs to the
    /// same grid cell. A chain crossing into another cell here means nodes
    /// were inserted out of level order.
    fn same_level_last_block(&self, mut block: u32) -> u32 {
        loop {
            let b = &self.blocks[block as usize];
            let next = b.next;
            if next == NO_BLOCK {
                return block;
            }
            let n = &self.blocks[next as usize];
            assert!(
                (n.base_x, n.base_y, n.level) == (b.base_x, b.base_y, b.level),
                "block chain continues in another grid cell"
            );
            block = next;
        }
    }

    /// Last block of the whole vertical chain over a base cell.
    fn base_cell_last_block(&self, x: i32, y: i32) -> u32 {
        let mut block = self.cell_blocks[self.cell_offset(0, x, y)];
        assert_ne!(block, NO_BLOCK);
        while self.blocks[block as usize].next != NO_BLOCK {
            block = self.blocks[block as usize].next;
        }
        block
    }

    fn grid_axis(&self, grid: usize, value: i64, origin: i64, cell_extent: i64) -> u32 {
        let base_cell = (value - origin) / cell_extent;
        ((base_cell * i64::from(self.spec.levels[grid].1)) / i64::from(self.spec.base_dim())) as u32
    }

    fn grid_x(&self, grid: usize, lon: i32) -> u32 {
        self.grid_axis(grid, lon.into(), self.base_cell_x.into(), self.base_cell_width.into())
    }

    fn grid_y(&self, grid: usize, lat: i32) -> u32 {
        self.grid_axis(grid, lat.into(), self.base_cell_y.into(), self.base_cell_height.into())
    }

    fn cell_offset(&self, grid: usize, lon: i32, lat: i32) -> usize {
        let before: usize = self.spec.levels[..grid].iter().map(|&(_, dim)| (dim * dim) as usize).sum();
        let dim = self.spec.levels[grid].1;
        before + (self.grid_y(grid, lat) * dim + self.grid_x(grid, lon)) as usize
    }

    /// Base cell coordinates of the south-west corner of the coarse cell
    /// containing the given axis cell.
    fn aligned_base(&self, grid: usize, cell: u32, origin: i32, cell_extent: i32) -> i32 {
        let base_cells_per_cell = self.spec.base_dim() / self.spec.levels[grid].1;
        origin + cell_extent * (cell * base_cells_per_cell) as i32
    }

    /// Sort one node into the grid. Must be called in ascending level order;
    /// the vertical chaining relies on coarser blocks arriving later.
    fn grid_add_node(&mut self, node: u32) -> u32 {
        let TpNode { lon, lat } = self.nodes[node as usize];
        let rank = self.node_levels[node as usize];
        let grid = self.spec.levels.iter().position(|&(limit, _)| rank < limit);

        let grid_key = grid.unwrap_or(usize::MAX);
        assert!(grid_key >= self.current_grid, "nodes not inserted in ascending level order");
        self.current_grid = grid_key;

        let block = match grid {
            Some(0) => self.cell_blocks[self.cell_offset(0, lon, lat)],
            Some(grid) => {
                let cell = self.cell_offset(grid, lon, lat);
                if self.cell_blocks[cell] == NO_BLOCK {
                    let base_x = self.aligned_base(grid, self.grid_x(grid, lon), self.base_cell_x, self.base_cell_width);
                    let base_y = self.aligned_base(grid, self.grid_y(grid, lat), self.base_cell_y, self.base_cell_height);
                    self.cell_blocks[cell] = self.create_block(base_x, base_y, grid as u32);
                }
                self.cell_blocks[cell]
            }
            None => {
                if self.core_block_start == NO_BLOCK {
                    self.core_block_start = self.create_block(self.base_cell_x, self.base_cell_y, u32::MAX);
                }
                self.core_block_start
            }
        };

        if grid != Some(0) {
            // hang this level's chain onto the vertical chain of the node's
            // base cell, unless the base cell already reaches it
            let old = self.base_cell_last_block(lon, lat);
            if old < block {
                assert_eq!(self.blocks[old as usize].next, NO_BLOCK);
                self.blocks[old as usize].next = block;
            } else {
                debug_assert_eq!(old, self.same_level_last_block(block));
            }
        }

        self.block_add_node(node, block)
    }

    fn block_add_node(&mut self, node: u32, block: u32) -> u32 {
        let mut block = self.same_level_last_block(block);
        if self.blocks[block as usize].count >= self.spec.block_size {
            block = self.extend_block(block);
        }
        let entry = &mut self.blocks[block as usize];
        let slot = entry.count;
        entry.node_ids[slot as usize] = node;
        entry.count += 1;
        (block << 10) | slot
    }

    fn fill_blocks(&mut self) {
        let mut order: Vec<u32> = (0..self.nodes.len() as u32).collect();
        order.sort_unstable_by_key(|&node| (self.node_levels[node as usize], node));

        self.node_file_ids = vec![NO_BLOCK; self.nodes.len()];
        for node in order {
            let file_id = self.grid_add_node(node);
            assert!(((file_id >> 10) as usize) < self.blocks.len());
            assert!((file_id & 1023) < self.spec.block_size);
            self.node_file_ids[node as usize] = file_id;
        }
    }

    fn stored_direction(&self, edge: &ChEdge<TpEdge>) -> Option<Stored> {
        let core = self.spec.core_level();
        let src_level = self.node_levels[edge.src() as usize];
        let tgt_level = self.node_levels[edge.tgt() as usize];
        assert_ne!(src_level, tgt_level, "edge between nodes of equal level");

        if src_level >= core && tgt_level >= core {
            let core_shortcut = edge
                .center_node
                .value()
                .map_or(false, |center| self.node_levels[center as usize] >= core);
            // the core is searched fully, its shortcuts carry no information
            if core_shortcut {
                None
            } else {
                Some(Stored::Outgoing)
            }
        } else if src_level < tgt_level {
            Some(Stored::Outgoing)
        } else {
            Some(Stored::Incoming)
        }
    }

    fn count_and_sort_edges(&mut self) {
        let n = self.nodes.len();
        self.node_first_out = vec![0; n];
        self.node_first_in = vec![0; n];
        self.node_end_edge = vec![0; n];

        let mut used = 0usize;
        for edge in self.edges {
            match self.stored_direction(edge) {
                Some(Stored::Outgoing) => {
                    self.node_first_out[edge.src() as usize] += 1;
                    used += 1;
                }
                Some(Stored::Incoming) => {
                    self.node_first_in[edge.tgt() as usize] += 1;
                    used += 1;
                }
                None => {}
            }
        }

        // lay out the per node edge ranges in block order: outgoing run,
        // then incoming run, then the next node
        let mut next_out = vec![0u32; n];
        let mut next_in = vec![0u32; n];
        let mut next_edge_id = 0u32;
        for block in &self.blocks {
            for &node in &block.node_ids[..block.count as usize] {
                let node = node as usize;

                let first = next_edge_id;
                next_edge_id += self.node_first_out[node];
                next_out[node] = first;
                self.node_first_out[node] = first;

                let first = next_edge_id;
                next_edge_id += self.node_first_in[node];
                next_in[node] = first;
                self.node_first_in[node] = first;

                self.node_end_edge[node] = next_edge_id;
            }
        }
        assert_eq!(next_edge_id as usize, used);

        self.use_edges = vec![0; used];
        self.edges_reverse = vec![NO_BLOCK; self.edges.len()];
        for (index, edge) in self.edges.iter().enumerate() {
            let slot = match self.stored_direction(edge) {
                Some(Stored::Outgoing) => {
                    let slot = next_out[edge.src() as usize];
                    next_out[edge.src() as usize] += 1;
                    slot
                }
                Some(Stored::Incoming) => {
                    let slot = next_in[edge.tgt() as usize];
                    next_in[edge.tgt() as usize] += 1;
                    slot
                }
                None => continue,
            };
            self.use_edges[slot as usize] = index as u32;
            self.edges_reverse[index] = slot;
        }
    }

    fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut out = SectionWriter { out, written: 0 };

        // 1. header
        out.write_u32(MAGIC[0])?;
        out.write_u32(MAGIC[1])?;
        out.write_u32(VERSION)?;
        out.write_i32(self.base_cell_x)?;
        out.write_i32(self.base_cell_y)?;
        out.write_i32(self.base_cell_width)?;
        out.write_i32(self.base_cell_height)?;
        out.write_u32(self.spec.base_dim())?;
        out.write_u32(self.spec.base_dim())?;
        out.write_u32(self.spec.block_size)?;
        out.write_u32(self.blocks.len() as u32)?;
        out.write_u32(self.core_block_start)?;
        out.write_u32(self.use_edges.len() as u32)?;
        out.align()?;

        // 2. node geo data
        for block in &self.blocks {
            out.write_u32(block.next)?;
            out.write_u32(block.count)?;
            for slot in 0..self.spec.block_size as usize {
                match block.node_ids.get(slot).filter(|&&n| n != NO_BLOCK) {
                    Some(&node) => {
                        out.write_i32(self.nodes[node as usize].lon)?;
                        out.write_i32(self.nodes[node as usize].lat)?;
                    }
                    None => {
                        out.write_u32(0)?;
                        out.write_u32(0)?;
                    }
                }
            }
        }
        out.align()?;

        // 3. node edge pointers; empty slots repeat the running end id so
        // adjacent slot subtraction yields zero edges
        let mut current_end = 0u32;
        for block in &self.blocks {
            out.write_u32(0)?;
            for slot in 0..self.spec.block_size as usize {
                match block.node_ids.get(slot).filter(|&&n| n != NO_BLOCK) {
                    Some(&node) => {
                        out.write_u32(self.node_first_out[node as usize])?;
                        out.write_u32(self.node_first_in[node as usize])?;
                        current_end = self.node_end_edge[node as usize];
                    }
                    None => {
                        out.write_u32(current_end)?;
                        out.write_u32(current_end)?;
                    }
                }
            }
            out.write_u32(current_end)?;
        }
        out.align()?;

        // 4. edges: neighbor in file id form plus travel time
        let core = self.spec.core_level();
        for &index in &self.use_edges {
            let edge = &self.edges[index as usize];
            let src_level = self.node_levels[edge.src() as usize];
            let tgt_level = self.node_levels[edge.tgt() as usize];
            // the neighbor is the upper endpoint, or the target for core edges
            if src_level < tgt_level || tgt_level >= core {
                out.write_u32(self.node_file_ids[edge.tgt() as usize])?;
            } else {
                out.write_u32(self.node_file_ids[edge.src() as usize])?;
            }
            out.write_u32(edge.edge.time)?;
        }
        out.align()?;

        // 5. edge details
        for &index in &self.use_edges {
            let edge = &self.edges[index as usize];
            out.write_u32(edge.edge.dist)?;
            assert_eq!(edge.child_edge1.value().is_some(), edge.child_edge2.value().is_some());
            match (edge.child_edge1.value(), edge.child_edge2.value(), edge.center_node.value()) {
                (Some(child1), Some(child2), Some(center)) => {
                    let child1 = self.edges_reverse[child1 as usize];
                    let child2 = self.edges_reverse[child2 as usize];
                    assert!(child1 != NO_BLOCK && child2 != NO_BLOCK, "shortcut child not stored in the file");
                    out.write_u32(child1)?;
                    out.write_u32(child2)?;
                    out.write_u32(self.node_file_ids[center as usize])?;
                }
                (None, None, None) => {
                    out.write_u32(u32::MAX)?;
                    out.write_u32(u32::MAX)?;
                    out.write_u32(u32::MAX)?;
                }
                _ => panic!("shortcut fields partially set"),
            }
        }

        Ok(())
    }
}

struct SectionWriter<'a, W: Write> {
    out: &'a mut W,
    written: u64,
}

impl<W: Write> SectionWriter<'_, W> {
    fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.written += 4;
        self.out.write_all(&value.to_be_bytes())
    }

    fn write_i32(&mut self, value: i32) -> io::Result<()> {
        self.write_u32(value as u32)
    }

    fn align(&mut self) -> io::Result<()> {
        let pad = (PAGE_SIZE - self.written % PAGE_SIZE) % PAGE_SIZE;
        for _ in 0..pad {
            self.out.write_all(&[0])?;
        }
        self.written += pad;
        Ok(())
    }
}

fn align_page(offset: u64) -> u64 {
    (offset + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

#[derive(Debug, Clone, Copy, Default)]
struct Header {
    base_cell_x: i32,
    base_cell_y: i32,
    base_cell_width: i32,
    base_cell_height: i32,
    base_grid_width: u32,
    base_grid_height: u32,
    block_size: u32,
    block_count: u32,
    core_block_start: u32,
    edge_count: u32,
}

#[derive(Debug, Clone, Copy, Default)]
#[allow(dead_code)] // the nearest node search only touches the geo section
struct Meta {
    stride: u64,
    offset_node_geo: u64,
    offset_node_edges: u64,
    offset_edges: u64,
    offset_edges_details: u64,
}

/// Random access reader over a written file. Only the lookups the offline
/// client needs at startup are implemented: the header and nearest node.
#[derive(Debug)]
pub struct GraphFile<F> {
    source: F,
    header: Option<Header>,
    meta: Meta,
}

struct ChainCursor {
    visited: HashSet<u32>,
    block: u32,
    next_block: u32,
    slot: u32,
    count: u32,
    offset: u64,
}

impl ChainCursor {
    fn new() -> ChainCursor {
        ChainCursor {
            visited: HashSet::new(),
            block: NO_BLOCK,
            next_block: NO_BLOCK,
            slot: 0,
            count: 0,
            offset: 0,
        }
    }

    /// Restart at the head of another chain; visited blocks stay skipped.
    fn load_block(&mut self, block: u32) {
        self.block = NO_BLOCK;
        self.next_block = block;
        self.slot = 0;
        self.count = 0;
    }
}

#[derive(Debug, Clone, Copy)]
struct FileNode {
    id: u32,
    lon: i32,
    lat: i32,
}

fn square_distance(a_lon: i32, a_lat: i32, b_lon: i32, b_lat: i32) -> u64 {
    let dlon = i64::from(a_lon) - i64::from(b_lon);
    let dlat = i64::from(a_lat) - i64::from(b_lat);
    (dlon * dlon + dlat * dlat) as u64
}

impl<F: Read + Seek> GraphFile<F> {
    pub fn new(source: F) -> GraphFile<F> {
        GraphFile {
            source,
            header: None,
            meta: Meta::default(),
        }
    }

    /// Read and validate the header and derive the section offsets.
    pub fn load_header(&mut self) -> io::Result<()> {
        let mut words = [0u32; 13];
        self.read_u32s(0, &mut words)?;

        if words[0] != MAGIC[0] || words[1] != MAGIC[1] || words[2] != VERSION {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not an offline graph file"));
        }

        let header = Header {
            base_cell_x: words[3] as i32,
            base_cell_y: words[4] as i32,
            base_cell_width: words[5] as i32,
            base_cell_height: words[6] as i32,
            base_grid_width: words[7],
            base_grid_height: words[8],
            block_size: words[9],
            block_count: words[10],
            core_block_start: words[11],
            edge_count: words[12],
        };

        let stride = (u64::from(header.block_size) + 1) * 2 * 4;
        let offset_node_geo = PAGE_SIZE;
        let offset_node_edges = align_page(offset_node_geo + u64::from(header.block_count) * stride);
        let offset_edges = align_page(offset_node_edges + u64::from(header.block_count) * stride);
        let offset_edges_details = align_page(offset_edges + u64::from(header.edge_count) * 8);
        self.meta = Meta {
            stride,
            offset_node_geo,
            offset_node_edges,
            offset_edges,
            offset_edges_details,
        };
        self.header = Some(header);
        Ok(())
    }

    /// The node geographically closest to the query, as a file id, or
    /// `None` for a file without nodes.
    ///
    /// Starts in the base cell under the query (falling back to the first
    /// core node when that cell is empty), then repeatedly walks one cell
    /// toward the query from the best node found so far until the best node
    /// stops moving. Visited block chains are skipped, they cannot improve
    /// the result again.
    pub fn find_node(&mut self, lon: f64, lat: f64) -> io::Result<Option<u32>> {
        let header = *self.header.as_ref().expect("header not loaded");
        let (search_lon, search_lat) = (micro_degrees(lon), micro_degrees(lat));

        let mut best: Option<FileNode> = None;
        let mut min_dist = u64::MAX;
        let mut cursor = ChainCursor::new();

        let mut scan = |gf: &mut Self, cursor: &mut ChainCursor, best: &mut Option<FileNode>, min_dist: &mut u64| -> io::Result<()> {
            while let Some(node) = gf.chain_next(cursor)? {
                let d = square_distance(search_lon, search_lat, node.lon, node.lat);
                if d < *min_dist {
                    *min_dist = d;
                    *best = Some(node);
                }
            }
            Ok(())
        };

        loop {
            let last_id = best.map(|b| b.id);
            let (center_lon, center_lat) = match best {
                Some(node) => (node.lon, node.lat),
                None => (search_lon, search_lat),
            };
            let (cell_x, cell_y) = self.grid_coords_for(center_lon, center_lat);

            cursor.load_block(cell_y * header.base_grid_width + cell_x);
            scan(self, &mut cursor, &mut best, &mut min_dist)?;

            if best.map(|b| b.id) != last_id {
                // better node found, re-center on it
                continue;
            }

            let Some(found) = best else {
                // empty cell: seed the search with the first core node
                let mut core_cursor = ChainCursor::new();
                core_cursor.load_block(header.core_block_start);
                match self.chain_next(&mut core_cursor)? {
                    None => return Ok(None),
                    Some(node) => {
                        min_dist = square_distance(search_lon, search_lat, node.lon, node.lat);
                        best = Some(node);
                        continue;
                    }
                }
            };

            // step one cell toward the query, plus the diagonal
            let step_x = if search_lon < found.lon && cell_x > 0 {
                cell_x - 1
            } else if search_lon > found.lon && cell_x + 1 < header.base_grid_width {
                cell_x + 1
            } else {
                cell_x
            };
            let step_y = if search_lat < found.lat && cell_y > 0 {
                cell_y - 1
            } else if search_lat > found.lat && cell_y + 1 < header.base_grid_height {
                cell_y + 1
            } else {
                cell_y
            };
            for (x, y) in [(cell_x, step_y), (step_x, cell_y), (step_x, step_y)] {
                cursor.load_block(y * header.base_grid_width + x);
                scan(self, &mut cursor, &mut best, &mut min_dist)?;
            }

            if best.map(|b| b.id) == last_id {
                return Ok(best.map(|b| b.id));
            }
        }
    }

    fn chain_next(&mut self, cursor: &mut ChainCursor) -> io::Result<Option<FileNode>> {
        let header = *self.header.as_ref().expect("header not loaded");

        while cursor.slot >= cursor.count {
            if cursor.next_block >= header.block_count {
                return Ok(None);
            }
            if !cursor.visited.insert(cursor.next_block) {
                // the rest of this chain was scanned before
                return Ok(None);
            }
            cursor.block = cursor.next_block;
            cursor.offset = self.meta.offset_node_geo + u64::from(cursor.block) * self.meta.stride;

            let mut words = [0u32; 2];
            self.read_u32s(cursor.offset, &mut words)?;
            cursor.offset += 8;
            cursor.next_block = words[0];
            cursor.count = words[1];
            cursor.slot = 0;
        }

        let mut words = [0u32; 2];
        self.read_u32s(cursor.offset, &mut words)?;
        cursor.offset += 8;
        let node = FileNode {
            id: (cursor.block << 10) | cursor.slot,
            lon: words[0] as i32,
            lat: words[1] as i32,
        };
        cursor.slot += 1;
        Ok(Some(node))
    }

    fn grid_coords_for(&self, lon: i32, lat: i32) -> (u32, u32) {
        let header = self.header.as_ref().expect("header not loaded");
        let axis = |value: i32, origin: i32, extent: i32, cells: u32| -> u32 {
            if value < origin {
                return 0;
            }
            let cell = (i64::from(value) - i64::from(origin)) / i64::from(extent);
            min(u64::from(cells - 1), cell as u64) as u32
        };
        (
            axis(lon, header.base_cell_x, header.base_cell_width, header.base_grid_width),
            axis(lat, header.base_cell_y, header.base_cell_height, header.base_grid_height),
        )
    }

    pub fn into_inner(self) -> F {
        self.source
    }

    fn read_u32s(&mut self, offset: u64, target: &mut [u32]) -> io::Result<()> {
        let mut bytes = vec![0u8; target.len() * 4];
        self.source.seek(SeekFrom::Start(offset))?;
        self.source.read_exact(&mut bytes)?;
        for (word, chunk) in target.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_be_bytes(chunk.try_into().unwrap());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // a small layout so the tests do not shuffle megabytes of padding
    const TEST_GRID: GridSpec = GridSpec {
        levels: [(5, 8), (10, 4), (20, 2), (40, 1)],
        block_size: 15,
    };

    fn node(lat_deg: f64, lon_deg: f64) -> TpNode {
        TpNode {
            lat: micro_degrees(lat_deg),
            lon: micro_degrees(lon_deg),
        }
    }

    #[test]
    fn travel_time_follows_the_speed_table() {
        // posted speed wins
        assert_eq!(calc_time(1000, 1, 50), 1000 * 1300 / 50);
        // road type default otherwise
        assert_eq!(calc_time(1000, 1, 0), 1000 * 1300 / 130);
        assert_eq!(calc_time(1000, 12, -1), 1000 * 1300 / 50);
        assert_eq!(calc_time(1000, 99, -1), 1000 * 1300 / 50);
        assert_eq!(calc_time(700, 16, -1), 700 * 1300 / 30);
        // saturates instead of wrapping
        assert_eq!(calc_time(u32::MAX, 11, -1), u32::MAX);
    }

    #[test]
    fn concat_adds_both_metrics() {
        let a = TpEdge {
            id: 0,
            src: 0,
            tgt: 1,
            dist: 100,
            time: 10,
        };
        let b = TpEdge {
            id: 1,
            src: 1,
            tgt: 2,
            dist: 50,
            time: 99,
        };
        let joined = TpEdge::concat(&a, &b);
        assert_eq!((joined.src, joined.tgt), (0, 2));
        assert_eq!(joined.dist, 150);
        assert_eq!(joined.time, 109);
        assert_eq!(joined.metric(), 109);
    }

    fn write_nodes_only(nodes: &[TpNode], levels: &[Level]) -> (Vec<u8>, WriteStats) {
        let data = ChOutData {
            nodes,
            node_levels: levels,
            edges: &[],
        };
        let mut bytes = Vec::new();
        let stats = write_ch_graph_with(&mut bytes, data, &TEST_GRID).unwrap();
        (bytes, stats)
    }

    #[test]
    fn header_words_and_alignment() {
        let nodes = [node(49.0, 8.0), node(49.5, 8.5)];
        let (bytes, stats) = write_nodes_only(&nodes, &[0, 0]);

        let word = |i: usize| u32::from_be_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
        assert_eq!(word(0), 0x4348474F);
        assert_eq!(word(1), 0x66665450);
        assert_eq!(word(2), 1);
        assert_eq!(word(7), 8); // base grid width
        assert_eq!(word(8), 8);
        assert_eq!(word(9), 15); // block size
        assert_eq!(word(10) as usize, stats.blocks);
        assert_eq!(word(12), 0); // no edges

        // sections are page aligned: header page plus two node sections of
        // blocks * stride rounded up, no edge payload
        let stride = (15 + 1) * 2 * 4;
        let section = align_page(stats.blocks as u64 * stride);
        assert_eq!(bytes.len() as u64, PAGE_SIZE + 2 * section);
        // the base grid is fully allocated even for two nodes
        assert!(stats.blocks >= 64);
    }

    #[test]
    fn standard_grid_is_the_client_layout() {
        assert_eq!(STANDARD_GRID.levels, [(5, 256), (10, 64), (20, 32), (40, 8)]);
        assert_eq!(STANDARD_GRID.block_size, 255);
        assert_eq!(STANDARD_GRID.core_level(), 40);
    }

    #[test]
    fn find_node_returns_each_node_at_its_own_coordinates() {
        let nodes = [node(49.0, 8.0), node(49.01, 8.02), node(49.4, 8.7), node(48.8, 7.9)];
        let (bytes, stats) = write_nodes_only(&nodes, &[0, 1, 2, 3]);

        let mut file = GraphFile::new(Cursor::new(bytes));
        file.load_header().unwrap();
        for (i, n) in nodes.iter().enumerate() {
            let found = file.find_node(n.lon as f64 / 1e7, n.lat as f64 / 1e7).unwrap();
            assert_eq!(found, Some(stats.node_file_ids[i]), "node {}", i);
        }
    }

    #[test]
    fn find_node_picks_the_unique_nearest_corner() {
        // four corners of a square, query close to the north east one
        let nodes = [node(49.0, 8.0), node(49.0, 9.0), node(50.0, 8.0), node(50.0, 9.0)];
        let (bytes, stats) = write_nodes_only(&nodes, &[0, 0, 0, 0]);

        let mut file = GraphFile::new(Cursor::new(bytes));
        file.load_header().unwrap();
        let found = file.find_node(8.9, 49.9).unwrap();
        assert_eq!(found, Some(stats.node_file_ids[3]));
    }

    #[test]
    fn nodes_above_the_thresholds_climb_the_grids() {
        // levels 0, 7, 15 and 50 land in the four different containers
        let nodes = [node(49.0, 8.0), node(49.0, 8.1), node(49.1, 8.0), node(49.1, 8.1)];
        let (_, stats) = write_nodes_only(&nodes, &[0, 7, 15, 50]);

        // base grid fully allocated, plus one block each for the level 1
        // grid, the level 2 grid and the core
        assert_eq!(stats.blocks, 64 + 3);
        // the level 0 node sits in a base block, the others above the grid
        assert!(stats.node_file_ids[0] >> 10 < 64);
        assert!(stats.node_file_ids[1] >> 10 >= 64);
        assert!(stats.node_file_ids[2] >> 10 >= 64);
        assert!(stats.node_file_ids[3] >> 10 >= 64);
    }

    #[test]
    fn empty_file_has_no_nearest_node() {
        let (bytes, _) = write_nodes_only(&[], &[]);
        let mut file = GraphFile::new(Cursor::new(bytes));
        file.load_header().unwrap();
        assert_eq!(file.find_node(8.0, 49.0).unwrap(), None);
    }

    #[test]
    fn rejects_a_foreign_file() {
        let mut file = GraphFile::new(Cursor::new(vec![0u8; 8192]));
        assert!(file.load_header().is_err());
    }
}
