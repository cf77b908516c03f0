use std::path::PathBuf;
use std::time::Instant;

use graph_engine::prelude::*;
use graph_toolkit::{bfs::bfs, choose_root};

const USAGE: &str = "bfs <threads> <binary_edge_file> <vertices> [source]";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = cli::parse().map_err(|err| {
        eprintln!("{USAGE}");
        err
    })?;

    let group = SingleProcess::shared();
    let graph: Graph<()> = Graph::load_directed(
        &args.path,
        args.vertices,
        GraphConfig::with_threads(args.threads),
        group.clone(),
    )?;

    let root = choose_root(group.as_ref(), args.vertices, args.source)?;

    let start = Instant::now();
    let result = bfs(&graph, root)?;
    let exec_time = start.elapsed();

    if graph.partition_id() == 0 {
        println!("exec_time={:.6}(s)", exec_time.as_secs_f64());
        println!("found_vertices = {}", result.found_vertices);
    }

    Ok(())
}

mod cli {
    use super::PathBuf;

    pub(crate) struct Args {
        pub(crate) threads: usize,
        pub(crate) path: PathBuf,
        pub(crate) vertices: u64,
        pub(crate) source: Option<u64>,
    }

    fn as_path_buf(arg: &std::ffi::OsStr) -> Result<PathBuf, std::convert::Infallible> {
        Ok(arg.into())
    }

    pub(crate) fn parse() -> Result<Args, Box<dyn std::error::Error>> {
        let mut pargs = pico_args::Arguments::from_env();

        let threads = pargs.free_from_str()?;
        if threads == 0 {
            return Err("thread count must be positive".into());
        }
        let path = pargs.free_from_os_str(as_path_buf)?;
        let vertices = pargs.free_from_str()?;
        if vertices == 0 {
            return Err("vertex count must be positive".into());
        }
        let source = pargs.opt_free_from_str()?;
        if let Some(source) = source {
            if source >= vertices {
                return Err(format!("source {source} out of range").into());
            }
        }

        let rest = pargs.finish();
        if !rest.is_empty() {
            return Err(format!("unexpected arguments: {rest:?}").into());
        }

        Ok(Args {
            threads,
            path,
            vertices,
            source,
        })
    }
}
