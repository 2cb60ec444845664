//! The line based text formats.
//!
//! All four formats share the same shape: an optional comment header, the
//! node and edge counts, one node per line, one edge per line. Which record
//! types the lines carry is decided by the caller's type parameters; the
//! format value only selects header handling.

use super::{FileFormat, FormatError, IngestError};
use crate::datastr::graph::*;
use rand::Rng;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::SplitWhitespace;

/// Nodes and edges as read from a file, ids assigned by line position.
#[derive(Debug)]
pub struct GraphInput<N, E> {
    pub nodes: Vec<N>,
    pub edges: Vec<E>,
}

/// A record that is one line of whitespace separated fields.
pub trait LineRecord: Sized {
    /// Parse the record from the tokens of its line. `None` on malformed
    /// or missing fields; surplus fields are ignored.
    fn parse(tokens: &mut SplitWhitespace) -> Option<Self>;
    /// Write the record as one line including the terminator.
    fn write_line(&self, out: &mut dyn Write) -> io::Result<()>;
}

fn field<T: std::str::FromStr>(tokens: &mut SplitWhitespace) -> Option<T> {
    tokens.next()?.parse().ok()
}

impl LineRecord for OsmNode {
    fn parse(tokens: &mut SplitWhitespace) -> Option<OsmNode> {
        Some(OsmNode {
            id: field(tokens)?,
            osm_id: field(tokens)?,
            lat: field(tokens)?,
            lon: field(tokens)?,
            elev: field(tokens)?,
        })
    }

    fn write_line(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{} {} {} {} {}", self.id, self.osm_id, self.lat, self.lon, self.elev)
    }
}

impl LineRecord for GeoNode {
    fn parse(tokens: &mut SplitWhitespace) -> Option<GeoNode> {
        Some(GeoNode {
            id: NO_NODE,
            lat: field(tokens)?,
            lon: field(tokens)?,
            elev: field(tokens)?,
        })
    }

    fn write_line(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{} {} {}", self.lat, self.lon, self.elev)
    }
}

impl LineRecord for OsmEdge {
    fn parse(tokens: &mut SplitWhitespace) -> Option<OsmEdge> {
        Some(OsmEdge {
            id: NO_EDGE,
            src: field(tokens)?,
            tgt: field(tokens)?,
            dist: field(tokens)?,
            road_type: field(tokens)?,
            speed: field(tokens)?,
        })
    }

    fn write_line(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{} {} {} {} {}", self.src, self.tgt, self.dist, self.road_type, self.speed)
    }
}

impl LineRecord for PlainEdge {
    fn parse(tokens: &mut SplitWhitespace) -> Option<PlainEdge> {
        Some(PlainEdge {
            id: NO_EDGE,
            src: field(tokens)?,
            tgt: field(tokens)?,
            dist: field(tokens)?,
        })
    }

    fn write_line(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{} {} {}", self.src, self.tgt, self.dist)
    }
}

struct LineReader<R> {
    lines: io::Lines<BufReader<R>>,
    file: String,
    line: usize,
}

impl<R: io::Read> LineReader<R> {
    fn new(source: R, file: &str) -> LineReader<R> {
        LineReader {
            lines: BufReader::new(source).lines(),
            file: file.to_string(),
            line: 0,
        }
    }

    fn err(&self, what: impl Into<String>) -> IngestError {
        IngestError::new(&self.file, self.line, what)
    }

    /// Next line with content, skipping blank ones.
    fn next_line(&mut self) -> Result<String, IngestError> {
        loop {
            self.line += 1;
            match self.lines.next() {
                Some(Ok(line)) => {
                    if !line.trim().is_empty() {
                        return Ok(line);
                    }
                }
                Some(Err(e)) => return Err(self.err(e.to_string())),
                None => return Err(self.err("unexpected end of file")),
            }
        }
    }
}

/// Read a whole graph. The record types have to fit the format the file was
/// written in; a line that does not parse is an error, not a skip.
pub fn read_graph<N, E, R>(format: FileFormat, source: R, file: &str) -> Result<GraphInput<N, E>, IngestError>
where
    N: LineRecord + NodeRecord,
    E: LineRecord + EdgeRecord,
    R: io::Read,
{
    let mut reader = LineReader::new(source, file);

    let mut line = reader.next_line()?;
    if format == FileFormat::Fmi {
        while line.starts_with('#') {
            line = reader.next_line()?;
        }
    }

    // the counts sit on their own lines, but a single "n m" line also occurs
    let mut tokens = line.split_whitespace();
    let node_count: usize = field(&mut tokens).ok_or_else(|| reader.err("expected node count"))?;
    let edge_count: usize = match field(&mut tokens) {
        Some(count) => count,
        None => {
            let line = reader.next_line()?;
            field(&mut line.split_whitespace()).ok_or_else(|| reader.err("expected edge count"))?
        }
    };

    let mut nodes = Vec::with_capacity(node_count);
    for index in 0..node_count {
        let line = reader.next_line()?;
        let mut node = N::parse(&mut line.split_whitespace()).ok_or_else(|| reader.err("malformed node"))?;
        if node.id() != NO_NODE && node.id() != index as NodeId {
            return Err(reader.err(format!("invalid node id {} at index {}", node.id(), index)));
        }
        node.set_id(index as NodeId);
        nodes.push(node);
    }

    let mut edges = Vec::with_capacity(edge_count);
    for index in 0..edge_count {
        let line = reader.next_line()?;
        let mut edge = E::parse(&mut line.split_whitespace()).ok_or_else(|| reader.err("malformed edge"))?;
        edge.set_id(index as EdgeId);
        if edge.src() as usize >= node_count || edge.tgt() as usize >= node_count {
            return Err(reader.err("edge endpoint out of range"));
        }
        edges.push(edge);
    }

    Ok(GraphInput { nodes, edges })
}

pub fn read_graph_file<N, E>(format: FileFormat, path: &Path) -> Result<GraphInput<N, E>, IngestError>
where
    N: LineRecord + NodeRecord,
    E: LineRecord + EdgeRecord,
{
    let name = path.display().to_string();
    let file = File::open(path).map_err(|e| IngestError::new(&name, 0, e.to_string()))?;
    read_graph(format, file, &name)
}

fn random_id(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap())
        .collect()
}

fn write_header(format: FileFormat, out: &mut dyn Write, nodes: usize, edges: usize) -> Result<(), Box<dyn Error>> {
    match format {
        FileFormat::Std | FileFormat::Simple => {}
        FileFormat::FmiCh => {
            writeln!(out, "# Id : {}", random_id(32))?;
            writeln!(out, "# Timestamp : {}", time::OffsetDateTime::now_utc().unix_timestamp())?;
            writeln!(out, "# Type: maxspeed")?;
            writeln!(out, "# Revision: 1")?;
            writeln!(out)?;
        }
        FileFormat::Fmi | FileFormat::OffTp => {
            return Err(Box::new(FormatError("this format has no text writer")));
        }
    }
    writeln!(out, "{}", nodes)?;
    writeln!(out, "{}", edges)?;
    Ok(())
}

/// Write a whole graph in the given text format.
pub fn write_graph<N, E>(format: FileFormat, out: &mut dyn Write, nodes: &[N], edges: &[E]) -> Result<(), Box<dyn Error>>
where
    N: LineRecord + NodeRecord,
    E: LineRecord,
{
    write_header(format, out, nodes.len(), edges.len())?;
    for (index, node) in nodes.iter().enumerate() {
        assert!(
            node.id() == NO_NODE || node.id() == index as NodeId,
            "node id {} written at index {}",
            node.id(),
            index
        );
        node.write_line(out)?;
    }
    for edge in edges {
        edge.write_line(out)?;
    }
    Ok(())
}

pub fn write_graph_file<N, E>(format: FileFormat, path: &Path, nodes: &[N], edges: &[E]) -> Result<(), Box<dyn Error>>
where
    N: LineRecord + NodeRecord,
    E: LineRecord,
{
    let mut out = BufWriter::new(File::create(path)?);
    write_graph(format, &mut out, nodes, edges)?;
    Ok(out.flush()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STD_GRAPH: &str = "\
2
1
0 100 49.5 8.25 120
1 101 49.625 8.5 130
0 1 1500 2 100
";

    #[test]
    fn std_read_write_round_trip() {
        let input: GraphInput<OsmNode, OsmEdge> = read_graph(FileFormat::Std, STD_GRAPH.as_bytes(), "test").unwrap();
        assert_eq!(input.nodes.len(), 2);
        assert_eq!(input.edges.len(), 1);
        assert_eq!(input.nodes[1].osm_id, 101);
        assert_eq!(input.edges[0].id, 0);
        assert_eq!(input.edges[0].speed, 100);

        let mut written = Vec::new();
        write_graph(FileFormat::Std, &mut written, &input.nodes, &input.edges).unwrap();
        assert_eq!(String::from_utf8(written).unwrap(), STD_GRAPH);
    }

    #[test]
    fn simple_round_trip() {
        let text = "3\n2\n49.5 8.25 120\n49.5 8.5 0\n49.75 8.125 -3\n0 1 7\n2 0 9\n";
        let input: GraphInput<GeoNode, PlainEdge> = read_graph(FileFormat::Simple, text.as_bytes(), "test").unwrap();
        assert_eq!(input.nodes[2].elev, -3);
        // geo nodes get their ids from the line position
        assert_eq!(input.nodes[1].id, 1);

        let mut written = Vec::new();
        write_graph(FileFormat::Simple, &mut written, &input.nodes, &input.edges).unwrap();
        assert_eq!(String::from_utf8(written).unwrap(), text);
    }

    #[test]
    fn fmi_skips_comment_header() {
        let text = "# some comment\n# another : one\n2\n0\n0 1 49.0 8.0 0\n1 2 49.5 8.5 0\n";
        let input: GraphInput<OsmNode, OsmEdge> = read_graph(FileFormat::Fmi, text.as_bytes(), "test").unwrap();
        assert_eq!(input.nodes.len(), 2);
    }

    #[test]
    fn node_id_must_match_line_index() {
        let text = "2\n0\n0 1 49.0 8.0 0\n5 2 49.5 8.5 0\n";
        let err = read_graph::<OsmNode, OsmEdge, _>(FileFormat::Std, text.as_bytes(), "broken").unwrap_err();
        assert_eq!(err.line, 4);
        assert!(err.what.contains("invalid node id 5"));
    }

    #[test]
    fn truncated_file_reports_position() {
        let text = "3\n1\n0 1 49.0 8.0 0\n";
        let err = read_graph::<OsmNode, OsmEdge, _>(FileFormat::Std, text.as_bytes(), "short").unwrap_err();
        assert!(err.what.contains("end of file"));
        assert_eq!(err.file, "short");
    }

    #[test]
    fn fmi_ch_header_shape() {
        let nodes = [OsmNode {
            id: 0,
            osm_id: 7,
            lat: 1.0,
            lon: 2.0,
            elev: 0,
        }];
        let mut written = Vec::new();
        write_graph(FileFormat::FmiCh, &mut written, &nodes, &[] as &[OsmEdge]).unwrap();
        let text = String::from_utf8(written).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[0].starts_with("# Id : "));
        assert_eq!(lines[0].len(), "# Id : ".len() + 32);
        assert!(lines[1].starts_with("# Timestamp : "));
        assert_eq!(lines[2], "# Type: maxspeed");
        assert_eq!(lines[3], "# Revision: 1");
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "1");
        assert_eq!(lines[6], "0");
    }
}
