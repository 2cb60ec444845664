// Nearest node lookup against a written offline graph file.

use ch_constructor::cli::CliErr;
use ch_constructor::io::offline_tp::GraphFile;
use std::env;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = env::args();
    args.next();

    let file = args.next().ok_or(CliErr("usage: find_nearest <graph-file> <lon> <lat>"))?;
    let lon: f64 = args.next().ok_or(CliErr("no longitude given"))?.parse()?;
    let lat: f64 = args.next().ok_or(CliErr("no latitude given"))?.parse()?;

    let mut graph = GraphFile::new(BufReader::new(File::open(file)?));
    graph.load_header()?;

    match graph.find_node(lon, lat)? {
        Some(id) => println!("{} (block {}, slot {})", id, id >> 10, id & 1023),
        None => println!("no node"),
    }
    Ok(())
}
