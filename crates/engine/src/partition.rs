//! Degree-balanced 1D partitioning of the vertex id space.
//!
//! The `|V|` vertex ids are cut into one contiguous range per process such
//! that the ranges carry near-equal degree weight, then each partition is
//! cut again into per-socket sub-ranges by the same scheme. Parallel loops
//! over any vertex range use [`weighted_chunks`] to hand threads chunks of
//! comparable edge work rather than comparable vertex count.

use std::ops::Range;

use crate::VertexId;

/// The per-process and per-socket cut points of the vertex id space.
///
/// All processes compute the same cuts from the same degree histograms, so
/// ownership lookups never need communication.
#[derive(Debug)]
pub struct Partitioning {
    cuts: Box<[VertexId]>,
    sockets: Box<[Box<[VertexId]>]>,
}

impl Partitioning {
    /// Cuts `0..weights.len()` into `partitions` ranges of near-equal total
    /// weight, each sub-divided into `sockets` ranges. Ties go to earlier
    /// ranges.
    pub(crate) fn new(weights: &[u64], partitions: usize, sockets: usize) -> Self {
        assert!(partitions > 0 && sockets > 0);

        let vertices = weights.len() as VertexId;
        let cuts = balanced_cuts(weights, 0..vertices, partitions);
        let socket_cuts = (0..partitions)
            .map(|p| balanced_cuts(weights, cuts[p]..cuts[p + 1], sockets).into_boxed_slice())
            .collect();

        Self {
            cuts: cuts.into_boxed_slice(),
            sockets: socket_cuts,
        }
    }

    pub fn partitions(&self) -> usize {
        self.cuts.len() - 1
    }

    pub fn sockets(&self) -> usize {
        self.sockets[0].len() - 1
    }

    pub fn partition_range(&self, partition: usize) -> Range<VertexId> {
        self.cuts[partition]..self.cuts[partition + 1]
    }

    pub fn socket_range(&self, partition: usize, socket: usize) -> Range<VertexId> {
        self.sockets[partition][socket]..self.sockets[partition][socket + 1]
    }

    /// The partition owning `v`. Requires `v` to be a valid vertex id.
    pub fn owner_of(&self, v: VertexId) -> usize {
        self.cuts.partition_point(|&cut| cut <= v) - 1
    }
}

// Greedy sweep: each range takes vertices until it reaches its share of the
// weight still unassigned. Zero total weight degrades to an even split by
// vertex count.
fn balanced_cuts(weights: &[u64], range: Range<VertexId>, parts: usize) -> Vec<VertexId> {
    let mut remaining: u64 = weights[range.start as usize..range.end as usize]
        .iter()
        .sum();
    let even = remaining == 0;

    let mut cuts = Vec::with_capacity(parts + 1);
    cuts.push(range.start);

    let mut v = range.start;
    for part in 0..parts - 1 {
        let remaining_parts = (parts - part) as u64;
        let mut acc = 0_u64;

        if even {
            let left = range.end - v;
            v += left / remaining_parts;
        } else {
            let target = remaining.div_ceil(remaining_parts);
            while v < range.end && acc < target {
                acc += weights[v as usize];
                v += 1;
            }
        }

        remaining -= acc;
        cuts.push(v);
    }
    cuts.push(range.end);

    cuts
}

/// Cuts `range` into at most `max_chunks` contiguous chunks whose summed
/// `weight` is roughly equal. The final chunk absorbs any remainder.
pub(crate) fn weighted_chunks<F>(
    range: Range<VertexId>,
    weight: F,
    max_chunks: usize,
) -> Vec<Range<VertexId>>
where
    F: Fn(VertexId) -> u64,
{
    if range.is_empty() {
        return Vec::new();
    }

    let max_chunks = max_chunks.max(1);
    let total: u64 = range.clone().map(&weight).sum();
    let batch = (total / max_chunks as u64).max(1);

    let mut chunks = Vec::new();
    let mut start = range.start;
    let mut acc = 0_u64;

    for v in range.clone() {
        acc += weight(v);
        if acc >= batch && chunks.len() < max_chunks - 1 {
            chunks.push(start..v + 1);
            start = v + 1;
            acc = 0;
        }
    }
    if start < range.end {
        chunks.push(start..range.end);
    }

    chunks
}

/// Number of NUMA nodes exposed by the kernel, 1 if undetectable.
pub(crate) fn detect_sockets() -> usize {
    let nodes = std::fs::read_dir("/sys/devices/system/node")
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    name.strip_prefix("node")
                        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
                })
                .count()
        })
        .unwrap_or(0);

    nodes.max(1)
}
