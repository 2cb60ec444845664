// The constructor pipeline: read a graph, contract every node, write the
// hierarchy in the requested format.

use ch_constructor::{
    algo::contraction::{driver::contract_all, ShortcutGraph},
    cli::CliErr,
    datastr::graph::*,
    io::{
        offline_tp::{self, TpEdge, TpNode},
        text, FileFormat, FormatError,
    },
    report::{enable_reporting, report_time},
};
use ch_constructor::report;
use std::env;
use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    let _reporter = enable_reporting("ch-constructor");

    let mut args = env::args();
    args.next();
    let usage = CliErr("usage: ch-constructor <in-format> <in-file> <out-format> <out-file>");
    let input_format: FileFormat = args.next().ok_or(usage)?.parse()?;
    let input = args.next().ok_or(CliErr("no input file given"))?;
    let output_format: FileFormat = args.next().ok_or(CliErr("no output format given"))?.parse()?;
    let output = args.next().ok_or(CliErr("no output file given"))?;

    let input = Path::new(&input);
    let output = Path::new(&output);

    match input_format {
        FileFormat::Std | FileFormat::Fmi => from_osm(input_format, input, output_format, output),
        FileFormat::Simple => from_simple(input, output_format, output),
        FileFormat::FmiCh | FileFormat::OffTp => Err(Box::new(FormatError("this format cannot be read"))),
    }
}

fn from_osm(input_format: FileFormat, input: &Path, output_format: FileFormat, output: &Path) -> Result<(), Box<dyn Error>> {
    let data = report_time("read graph", || text::read_graph_file::<OsmNode, OsmEdge>(input_format, input))?;
    report!("nodes", data.nodes.len());
    report!("edges", data.edges.len());

    match output_format {
        FileFormat::OffTp => {
            // the offline file ranks by travel time, so the hierarchy has
            // to be built on the time annotated records
            let nodes: Vec<TpNode> = data.nodes.iter().map(TpNode::from).collect();
            let edges: Vec<TpEdge> = data.edges.iter().map(TpEdge::from).collect();
            let mut graph = ShortcutGraph::new(nodes, edges);
            report_time("contraction", || contract_all(&mut graph));

            let mut out = BufWriter::new(File::create(output)?);
            let ch = graph.export_data();
            report_time("write graph", || offline_tp::write_ch_graph(&mut out, ch))?;
            Ok(out.flush()?)
        }
        FileFormat::Std | FileFormat::FmiCh => {
            let mut graph = ShortcutGraph::new(data.nodes, data.edges);
            report_time("contraction", || contract_all(&mut graph));

            let ch = graph.export_data();
            let edges: Vec<OsmEdge> = ch.edges.iter().map(|edge| edge.edge.clone()).collect();
            report_time("write graph", || text::write_graph_file(output_format, output, ch.nodes, &edges))
        }
        FileFormat::Simple => {
            let nodes: Vec<GeoNode> = data.nodes.iter().map(GeoNode::from).collect();
            let edges: Vec<PlainEdge> = data.edges.iter().map(PlainEdge::from).collect();
            let mut graph = ShortcutGraph::new(nodes, edges);
            report_time("contraction", || contract_all(&mut graph));

            let ch = graph.export_data();
            let edges: Vec<PlainEdge> = ch.edges.iter().map(|edge| edge.edge.clone()).collect();
            report_time("write graph", || text::write_graph_file(output_format, output, ch.nodes, &edges))
        }
        FileFormat::Fmi => Err(Box::new(FormatError("this format has no writer"))),
    }
}

fn from_simple(input: &Path, output_format: FileFormat, output: &Path) -> Result<(), Box<dyn Error>> {
    let data = report_time("read graph", || {
        text::read_graph_file::<GeoNode, PlainEdge>(FileFormat::Simple, input)
    })?;
    report!("nodes", data.nodes.len());
    report!("edges", data.edges.len());

    if output_format != FileFormat::Simple {
        // plain records carry neither OSM ids nor road types
        return Err(Box::new(FormatError("a SIMPLE graph can only be written as SIMPLE")));
    }

    let mut graph = ShortcutGraph::new(data.nodes, data.edges);
    report_time("contraction", || contract_all(&mut graph));

    let ch = graph.export_data();
    let edges: Vec<PlainEdge> = ch.edges.iter().map(|edge| edge.edge.clone()).collect();
    report_time("write graph", || text::write_graph_file(output_format, output, ch.nodes, &edges))
}
