//! Parallel text-to-binary edge list conversion.
//!
//! The output file is sized up front from the user-supplied edge count,
//! preallocated and memory-mapped; every worker thread owns a disjoint
//! record region of the map and a private read handle on the text input, so
//! parsed records are written in place without any coordination. Worker
//! failures surface as a nonzero result for the whole conversion.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use graph_engine::input::record_bytes;
use linereader::LineReader;
use log::info;
use memmap2::MmapMut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use atoi::FromRadix10 as _;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("i/o failure")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("worker {worker}: line {line}: {reason}")]
    Parse {
        worker: usize,
        line: u64,
        reason: String,
    },
}

/// How the weight column of the output records is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightMode {
    /// Unweighted input, unweighted output.
    None,
    /// Third input column is parsed as an `f32` weight.
    FromInput,
    /// Unweighted input; each record gets a uniform `[0, 1)` weight drawn
    /// from a per-worker generator seeded from OS entropy.
    Random,
}

impl WeightMode {
    pub fn record_bytes(self) -> usize {
        match self {
            WeightMode::None => record_bytes::<()>(),
            WeightMode::FromInput | WeightMode::Random => record_bytes::<f32>(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConvertOptions {
    pub threads: usize,
    /// Number of edges to convert; the input must have at least this many
    /// lines.
    pub edges: u64,
    pub input: PathBuf,
    pub output: PathBuf,
    pub weights: WeightMode,
    /// Input ids are 1-based and converted to 0-based on write.
    pub one_indexed: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            threads: 32,
            edges: 0,
            input: PathBuf::from("./input_graph"),
            output: PathBuf::from("./output_graph"),
            weights: WeightMode::None,
            one_indexed: false,
        }
    }
}

pub struct ConvertSummary {
    pub edges: u64,
    /// One past the largest vertex id seen; pass this as `|V|` to the
    /// engine when no better bound is known.
    pub vertices_hint: u64,
}

/// Converts `options.edges` lines of `options.input` into packed binary
/// records in `options.output`.
pub fn convert(options: &ConvertOptions) -> Result<ConvertSummary, ConvertError> {
    let record = options.weights.record_bytes();

    let output = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&options.output)?;
    output.set_len(options.edges * record as u64)?;

    if options.edges == 0 {
        return Ok(ConvertSummary {
            edges: 0,
            vertices_hint: 0,
        });
    }

    let mut map = unsafe { MmapMut::map_mut(&output)? };
    map.advise(memmap2::Advice::Sequential)?;

    let workers = options.threads.max(1).min(options.edges as usize);
    let per_worker = options.edges / workers as u64;

    // carve the map into one disjoint record region per worker; the last
    // worker absorbs the remainder
    let mut regions = Vec::with_capacity(workers);
    let mut rest: &mut [u8] = &mut map;
    for worker in 0..workers {
        let count = if worker == workers - 1 {
            options.edges - per_worker * (workers as u64 - 1)
        } else {
            per_worker
        };
        let (region, tail) = rest.split_at_mut(count as usize * record);
        regions.push((worker, per_worker * worker as u64, count, region));
        rest = tail;
    }

    let max_ids = std::thread::scope(|scope| {
        let handles = regions
            .into_iter()
            .map(|(worker, skip, count, region)| {
                scope.spawn(move || run_worker(options, worker, skip, count, region))
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect::<Result<Vec<_>, _>>()
    })?;

    map.flush()?;

    let vertices_hint = max_ids.into_iter().max().map_or(0, |max| max + 1);
    info!(
        "Converted {} edges from {:?}, largest vertex id {}",
        options.edges,
        options.input,
        vertices_hint - 1
    );

    Ok(ConvertSummary {
        edges: options.edges,
        vertices_hint,
    })
}

fn run_worker(
    options: &ConvertOptions,
    worker: usize,
    skip: u64,
    count: u64,
    region: &mut [u8],
) -> Result<u64, ConvertError> {
    let record = options.weights.record_bytes();
    let mut lines = LineReader::new(File::open(&options.input)?);
    let mut line_no = 0_u64;

    // discard the lines owned by earlier workers
    while line_no < skip {
        next_line(&mut lines, worker, line_no)?;
        line_no += 1;
    }

    let mut rng = StdRng::from_entropy();

    let mut max_id = 0_u64;
    for i in 0..count as usize {
        let out = &mut region[i * record..(i + 1) * record];

        let line = next_line(&mut lines, worker, line_no)?;
        line_no += 1;

        let (src, dst, weight) = parse_line(&line, options, worker, line_no)?;
        max_id = max_id.max(src).max(dst);

        out[..8].copy_from_slice(&src.to_le_bytes());
        out[8..16].copy_from_slice(&dst.to_le_bytes());
        match options.weights {
            WeightMode::None => {}
            WeightMode::FromInput => out[16..20].copy_from_slice(&weight.to_le_bytes()),
            WeightMode::Random => {
                let weight: f32 = rng.gen();
                out[16..20].copy_from_slice(&weight.to_le_bytes());
            }
        }
    }

    Ok(max_id)
}

fn next_line<R: std::io::Read>(
    lines: &mut LineReader<R>,
    worker: usize,
    line_no: u64,
) -> Result<Vec<u8>, ConvertError> {
    match lines.next_line() {
        Some(Ok(line)) => Ok(line.to_vec()),
        Some(Err(source)) => Err(ConvertError::Io { source }),
        None => Err(ConvertError::Parse {
            worker,
            line: line_no + 1,
            reason: "unexpected end of input".into(),
        }),
    }
}

fn parse_line(
    line: &[u8],
    options: &ConvertOptions,
    worker: usize,
    line_no: u64,
) -> Result<(u64, u64, f32), ConvertError> {
    let fail = |reason: &str| ConvertError::Parse {
        worker,
        line: line_no,
        reason: reason.into(),
    };

    let mut rest = line;
    while let [head @ .., b'\n' | b'\r'] = rest {
        rest = head;
    }

    let (mut src, used) = u64::from_radix_10(rest);
    if used == 0 {
        return Err(fail("expected a source vertex id"));
    }
    rest = skip_separators(&rest[used..]);

    let (mut dst, used) = u64::from_radix_10(rest);
    if used == 0 {
        return Err(fail("expected a destination vertex id"));
    }
    rest = skip_separators(&rest[used..]);

    let weight = if options.weights == WeightMode::FromInput {
        let (weight, _) =
            fast_float2::parse_partial::<f32, _>(rest).map_err(|_| fail("expected a weight"))?;
        weight
    } else {
        0.0
    };

    if options.one_indexed {
        if src == 0 || dst == 0 {
            return Err(fail("vertex id 0 in 1-indexed input"));
        }
        src -= 1;
        dst -= 1;
    }

    Ok((src, dst, weight))
}

fn skip_separators(bytes: &[u8]) -> &[u8] {
    let mut rest = bytes;
    while let [b' ' | b'\t', tail @ ..] = rest {
        rest = tail;
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_text(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn options(input: &tempfile::NamedTempFile, edges: u64, threads: usize) -> (ConvertOptions, tempfile::NamedTempFile) {
        let output = tempfile::NamedTempFile::new().unwrap();
        let options = ConvertOptions {
            threads,
            edges,
            input: input.path().to_path_buf(),
            output: output.path().to_path_buf(),
            ..ConvertOptions::default()
        };
        (options, output)
    }

    fn read_unweighted(path: &std::path::Path) -> Vec<(u64, u64)> {
        std::fs::read(path)
            .unwrap()
            .chunks_exact(16)
            .map(|record| {
                (
                    u64::from_le_bytes(record[..8].try_into().unwrap()),
                    u64::from_le_bytes(record[8..].try_into().unwrap()),
                )
            })
            .collect()
    }

    #[test]
    fn unweighted_round_trip_across_workers() {
        let input = write_text("0 1\n1 2\n2 3\n3 4\n4 5\n5 6\n6 0\n");
        let (options, output) = options(&input, 7, 3);

        let summary = convert(&options).unwrap();
        assert_eq!(summary.edges, 7);
        assert_eq!(summary.vertices_hint, 7);

        let records = read_unweighted(output.path());
        assert_eq!(
            records,
            vec![(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 0)]
        );
    }

    #[test]
    fn weighted_input_keeps_the_weight_column() {
        let input = write_text("0 1 0.5\n1 2 1.25\n");
        let (mut options, output) = options(&input, 2, 1);
        options.weights = WeightMode::FromInput;

        convert(&options).unwrap();

        let bytes = std::fs::read(output.path()).unwrap();
        assert_eq!(bytes.len(), 2 * 20);
        let weight = f32::from_le_bytes(bytes[16..20].try_into().unwrap());
        assert_eq!(weight, 0.5);
        let weight = f32::from_le_bytes(bytes[36..40].try_into().unwrap());
        assert_eq!(weight, 1.25);
    }

    #[test]
    fn random_weights_share_the_id_columns() {
        let text = "0 1\n1 2\n2 0\n";
        let input = write_text(text);
        let (plain_options, plain_output) = options(&input, 3, 2);
        convert(&plain_options).unwrap();

        let (mut random_options, random_output) = options(&input, 3, 2);
        random_options.weights = WeightMode::Random;
        convert(&random_options).unwrap();

        let plain = std::fs::read(plain_output.path()).unwrap();
        let random = std::fs::read(random_output.path()).unwrap();
        assert_eq!(random.len(), 3 * 20);

        for i in 0..3 {
            // src/dst fields are bit-identical, only the weight column differs
            assert_eq!(plain[i * 16..i * 16 + 16], random[i * 20..i * 20 + 16]);
            let weight = f32::from_le_bytes(random[i * 20 + 16..i * 20 + 20].try_into().unwrap());
            assert!((0.0..1.0).contains(&weight));
        }
    }

    #[test]
    fn one_indexed_input_is_shifted() {
        let input = write_text("1 2\n2 3\n");
        let (mut options, output) = options(&input, 2, 1);
        options.one_indexed = true;

        let summary = convert(&options).unwrap();
        assert_eq!(summary.vertices_hint, 3);
        assert_eq!(read_unweighted(output.path()), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn one_indexed_rejects_id_zero() {
        let input = write_text("0 2\n");
        let (mut options, _output) = options(&input, 1, 1);
        options.one_indexed = true;

        assert!(matches!(
            convert(&options),
            Err(ConvertError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn worker_parse_failures_propagate() {
        let input = write_text("0 1\n1 x\n2 3\n");
        let (options, _output) = options(&input, 3, 3);

        assert!(matches!(
            convert(&options),
            Err(ConvertError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn short_input_is_an_error() {
        let input = write_text("0 1\n");
        let (options, _output) = options(&input, 5, 2);

        assert!(convert(&options).is_err());
    }

    #[test]
    fn zero_edges_produce_an_empty_file() {
        let input = write_text("");
        let (options, output) = options(&input, 0, 4);

        let summary = convert(&options).unwrap();
        assert_eq!(summary.edges, 0);
        assert_eq!(std::fs::metadata(output.path()).unwrap().len(), 0);
    }

    #[test]
    fn more_workers_than_edges() {
        let input = write_text("0 1\n1 2\n");
        let (options, output) = options(&input, 2, 16);

        convert(&options).unwrap();
        assert_eq!(read_unweighted(output.path()), vec![(0, 1), (1, 2)]);
    }
}
