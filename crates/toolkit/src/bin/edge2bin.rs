use std::path::PathBuf;

use graph_toolkit::edge2bin::{convert, ConvertOptions, WeightMode};

const USAGE: &str = "\
edge2bin -e <edges> [options]

Converts a text edge list (one `src dst [weight]` per line) into the packed
binary edge format.

options:
    -t N      worker threads (default 32)
    -e N      number of edges to convert (required)
    -f path   input text file (default ./input_graph)
    -o path   output binary file (default ./output_graph)
    -w        input has a weight column
    -a        input is unweighted, attach uniform [0,1) weights
    -i        input ids are 1-based, convert to 0-based
    -h        print this help
";

fn main() {
    env_logger::init();

    let options = match cli::parse() {
        Ok(Some(options)) => options,
        Ok(None) => {
            print!("{USAGE}");
            return;
        }
        Err(err) => {
            eprintln!("edge2bin: {err}");
            eprint!("{USAGE}");
            std::process::exit(1);
        }
    };

    match convert(&options) {
        Ok(summary) => {
            println!(
                "converted {} edges, use at least {} vertices",
                summary.edges, summary.vertices_hint
            );
        }
        Err(err) => {
            eprintln!("edge2bin: {err}");
            std::process::exit(1);
        }
    }
}

mod cli {
    use super::*;

    pub(crate) fn parse() -> Result<Option<ConvertOptions>, Box<dyn std::error::Error>> {
        let mut pargs = pico_args::Arguments::from_env();

        if pargs.contains("-h") {
            return Ok(None);
        }

        let weighted = pargs.contains("-w");
        let random = pargs.contains("-a");
        if weighted && random {
            return Err("-w and -a are mutually exclusive".into());
        }
        let weights = match (weighted, random) {
            (true, _) => WeightMode::FromInput,
            (_, true) => WeightMode::Random,
            _ => WeightMode::None,
        };

        fn as_path(arg: &std::ffi::OsStr) -> Result<PathBuf, std::convert::Infallible> {
            Ok(arg.into())
        }

        let defaults = ConvertOptions::default();
        let options = ConvertOptions {
            threads: pargs
                .opt_value_from_str("-t")?
                .unwrap_or(defaults.threads),
            edges: pargs.value_from_str("-e")?,
            input: pargs
                .opt_value_from_os_str("-f", as_path)?
                .unwrap_or(defaults.input),
            output: pargs
                .opt_value_from_os_str("-o", as_path)?
                .unwrap_or(defaults.output),
            weights,
            one_indexed: pargs.contains("-i"),
        };

        let rest = pargs.finish();
        if !rest.is_empty() {
            return Err(format!("unexpected arguments: {rest:?}").into());
        }

        Ok(Some(options))
    }
}
