//! The per-partition edge store.
//!
//! Each process keeps two CSR views of the edges it is responsible for:
//!
//! * the **outgoing** store holds every edge whose destination falls into
//!   the local partition, indexed by (global) source — this is what the
//!   receiving side of a push iteration walks;
//! * the **incoming** store holds every edge whose source falls into the
//!   local partition, indexed by (global) destination — this is what a pull
//!   iteration folds over.
//!
//! Across all processes each edge is stored exactly once per view. Within a
//! partition, each view is split into one CSR per NUMA socket sub-range;
//! [`AdjLists`] chains the per-socket neighbor lists back together.

use std::ops::Range;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};
use std::sync::atomic::AtomicU64;

use rayon::prelude::*;

use crate::input::EdgeFile;
use crate::wire::Wire;
use crate::{SharedMut, VertexId};

/// The two edge orientations a store can be keyed by.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Keyed by source; the filtered side is the destination.
    Outgoing,
    /// Keyed by destination; the filtered side is the source.
    Incoming,
}

/// One adjacency entry: the vertex on the far end of the edge and the edge
/// payload.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct Target<E> {
    pub target: VertexId,
    pub value: E,
}

impl<E> Target<E> {
    pub fn new(target: VertexId, value: E) -> Self {
        Self { target, value }
    }
}

pub(crate) struct Csr<E> {
    offsets: Box<[u64]>,
    targets: Box<[Target<E>]>,
}

impl<E: Wire> Csr<E> {
    /// Builds a CSR over all `vertices` keys containing the edges whose
    /// filtered endpoint lies in `filter`.
    ///
    /// Two passes over the file: an atomic degree histogram, then placement
    /// into positions handed out by an exclusive prefix sum. The histogram
    /// offsets produce non-overlapping positions, so the parallel placement
    /// writes each slot exactly once. Lists are sorted afterwards to make
    /// neighbor order reproducible across runs.
    fn build(
        file: &EdgeFile<E>,
        vertices: u64,
        direction: Direction,
        filter: Range<VertexId>,
    ) -> Self {
        let keyed = |src: VertexId, dst: VertexId| match direction {
            Direction::Outgoing => (src, dst),
            Direction::Incoming => (dst, src),
        };

        let degrees = (0..vertices as usize)
            .into_par_iter()
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>();

        file.records().for_each(|(src, dst, _)| {
            let (key, other) = keyed(src, dst);
            if filter.contains(&other) {
                degrees[key as usize].fetch_add(1, AcqRel);
            }
        });

        let offsets = prefix_sum_atomic(degrees);
        let edge_count = offsets[vertices as usize].load(Acquire) as usize;

        let mut targets = Vec::<Target<E>>::with_capacity(edge_count);
        let targets_ptr = SharedMut::new(targets.as_mut_ptr());

        // SAFETY: the prefix sum yields a unique position per stored edge;
        // every thread writes disjoint slots and all `edge_count` slots are
        // written before set_len.
        file.records().for_each(|(src, dst, value)| {
            let (key, other) = keyed(src, dst);
            if filter.contains(&other) {
                let offset = offsets[key as usize].fetch_add(1, AcqRel);
                unsafe {
                    targets_ptr
                        .add(offset as usize)
                        .write(Target::new(other, value));
                }
            }
        });
        unsafe {
            targets.set_len(edge_count);
        }

        // Placement advanced each key's offset by its degree; shift right to
        // restore exclusive prefix sums.
        let mut offsets = offsets
            .into_iter()
            .map(AtomicU64::into_inner)
            .collect::<Vec<_>>();
        offsets.rotate_right(1);
        offsets[0] = 0;

        sort_targets(&offsets, &mut targets);

        Self {
            offsets: offsets.into_boxed_slice(),
            targets: targets.into_boxed_slice(),
        }
    }

    #[inline]
    fn degree(&self, v: VertexId) -> u64 {
        self.offsets[v as usize + 1] - self.offsets[v as usize]
    }

    #[inline]
    fn targets(&self, v: VertexId) -> &[Target<E>] {
        &self.targets[self.offsets[v as usize] as usize..self.offsets[v as usize + 1] as usize]
    }

    fn edge_count(&self) -> u64 {
        self.targets.len() as u64
    }
}

/// One direction's adjacency for the local partition, split by socket.
pub struct EdgeStore<E: Wire> {
    sockets: Box<[Csr<E>]>,
}

impl<E: Wire> EdgeStore<E> {
    pub(crate) fn build(
        file: &EdgeFile<E>,
        vertices: u64,
        direction: Direction,
        socket_ranges: &[Range<VertexId>],
    ) -> Self {
        let sockets = socket_ranges
            .iter()
            .map(|range| Csr::build(file, vertices, direction, range.clone()))
            .collect();

        Self { sockets }
    }

    /// Total number of edges held by this store.
    pub fn edge_count(&self) -> u64 {
        self.sockets.iter().map(Csr::edge_count).sum()
    }

    /// Number of stored edges keyed by `v`.
    pub fn degree(&self, v: VertexId) -> u64 {
        self.sockets.iter().map(|csr| csr.degree(v)).sum()
    }

    /// The neighbor list of `v` across all socket sub-partitions.
    pub fn adj(&self, v: VertexId) -> AdjLists<'_, E> {
        AdjLists {
            sockets: &self.sockets,
            vertex: v,
        }
    }
}

/// A borrowed view of one vertex's neighbor lists.
#[derive(Clone, Copy)]
pub struct AdjLists<'a, E: Wire> {
    sockets: &'a [Csr<E>],
    vertex: VertexId,
}

impl<'a, E: Wire> AdjLists<'a, E> {
    pub fn len(&self) -> u64 {
        let v = self.vertex;
        self.sockets.iter().map(|csr| csr.degree(v)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Target<E>> + 'a {
        let v = self.vertex;
        self.sockets
            .iter()
            .flat_map(move |csr| csr.targets(v).iter())
    }
}

/// For each locally owned source, the set of partitions holding at least one
/// of its out-edges. Drives selective message replication in push mode.
pub(crate) struct PartitionMask {
    base: VertexId,
    width: usize,
    words: Box<[AtomicU64]>,
}

impl PartitionMask {
    pub(crate) fn new(range: Range<VertexId>, partitions: usize) -> Self {
        let width = partitions.div_ceil(64);
        let rows = (range.end - range.start) as usize;
        let words = (0..rows * width)
            .into_par_iter()
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            base: range.start,
            width,
            words,
        }
    }

    #[inline]
    fn word(&self, v: VertexId, partition: usize) -> usize {
        (v - self.base) as usize * self.width + partition / 64
    }

    pub(crate) fn mark(&self, v: VertexId, partition: usize) {
        self.words[self.word(v, partition)].fetch_or(1 << (partition % 64), Relaxed);
    }

    pub(crate) fn contains(&self, v: VertexId, partition: usize) -> bool {
        self.words[self.word(v, partition)].load(Relaxed) & (1 << (partition % 64)) != 0
    }
}

fn prefix_sum_atomic(degrees: Vec<AtomicU64>) -> Vec<AtomicU64> {
    let mut last = degrees.last().map_or(0, |d| d.load(Acquire));
    let mut sums = degrees
        .into_iter()
        .scan(0_u64, |total, degree| {
            let value = *total;
            *total += degree.into_inner();
            Some(AtomicU64::new(value))
        })
        .collect::<Vec<_>>();

    last += sums.last().map_or(0, |d| d.load(Acquire));
    sums.push(AtomicU64::new(last));

    sums
}

fn sort_targets<E: Wire>(offsets: &[u64], targets: &mut [Target<E>]) {
    to_mut_slices(offsets, targets)
        .par_iter_mut()
        .for_each(|list| list.sort_unstable_by_key(|t| (t.target, t.value.sort_key())));
}

fn to_mut_slices<'targets, E>(
    offsets: &[u64],
    targets: &'targets mut [Target<E>],
) -> Vec<&'targets mut [Target<E>]> {
    let key_count = offsets.len() - 1;
    let mut slices = Vec::with_capacity(key_count);
    let mut tail = targets;
    let mut prev_offset = offsets[0];

    for &offset in &offsets[1..] {
        let (list, remainder) = tail.split_at_mut((offset - prev_offset) as usize);
        slices.push(list);
        tail = remainder;
        prev_offset = offset;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn edge_file(edges: &[(u64, u64)]) -> (tempfile::NamedTempFile, EdgeFile<()>) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for &(src, dst) in edges {
            file.write_all(&src.to_le_bytes()).unwrap();
            file.write_all(&dst.to_le_bytes()).unwrap();
        }
        file.flush().unwrap();
        let mapped = EdgeFile::open(file.path()).unwrap();
        (file, mapped)
    }

    #[test]
    fn outgoing_store_is_keyed_by_source() {
        let (_guard, file) = edge_file(&[(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]);
        let store = EdgeStore::build(&file, 4, Direction::Outgoing, &[0..4]);

        assert_eq!(store.edge_count(), 5);
        assert_eq!(store.degree(0), 2);
        assert_eq!(store.degree(1), 2);
        assert_eq!(store.degree(3), 0);

        let neighbors: Vec<_> = store.adj(1).iter().map(|t| t.target).collect();
        assert_eq!(neighbors, vec![2, 3]);
    }

    #[test]
    fn incoming_store_is_keyed_by_destination() {
        let (_guard, file) = edge_file(&[(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]);
        let store = EdgeStore::build(&file, 4, Direction::Incoming, &[0..4]);

        assert_eq!(store.edge_count(), 5);
        assert_eq!(store.degree(2), 2);
        assert_eq!(store.degree(0), 0);

        let sources: Vec<_> = store.adj(3).iter().map(|t| t.target).collect();
        assert_eq!(sources, vec![1, 2]);
    }

    #[test]
    fn filter_restricts_the_stored_edges() {
        let (_guard, file) = edge_file(&[(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]);

        // destinations 0..2 only
        let store = EdgeStore::build(&file, 4, Direction::Outgoing, &[0..2]);
        assert_eq!(store.edge_count(), 1);
        assert_eq!(store.adj(0).iter().map(|t| t.target).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn socket_split_chains_neighbor_lists() {
        let (_guard, file) = edge_file(&[(0, 1), (0, 2), (0, 3), (1, 3)]);
        let split = EdgeStore::build(&file, 4, Direction::Outgoing, &[0..2, 2..4]);
        let whole = EdgeStore::build(&file, 4, Direction::Outgoing, &[0..4]);

        assert_eq!(split.edge_count(), whole.edge_count());
        assert_eq!(split.degree(0), 3);

        let mut split_targets: Vec<_> = split.adj(0).iter().map(|t| t.target).collect();
        split_targets.sort_unstable();
        assert_eq!(split_targets, vec![1, 2, 3]);
        assert_eq!(split.adj(0).len(), 3);
        assert!(!split.adj(0).is_empty());
        assert!(split.adj(3).is_empty());
    }

    #[test]
    fn parallel_edges_and_self_loops_are_kept() {
        let (_guard, file) = edge_file(&[(0, 0), (0, 1), (0, 1)]);
        let store = EdgeStore::build(&file, 2, Direction::Outgoing, &[0..2]);

        assert_eq!(store.edge_count(), 3);
        let targets: Vec<_> = store.adj(0).iter().map(|t| t.target).collect();
        assert_eq!(targets, vec![0, 1, 1]);
    }

    #[test]
    fn partition_mask_marks_and_tests() {
        let mask = PartitionMask::new(10..20, 3);
        mask.mark(12, 0);
        mask.mark(12, 2);

        assert!(mask.contains(12, 0));
        assert!(!mask.contains(12, 1));
        assert!(mask.contains(12, 2));
        assert!(!mask.contains(13, 0));
    }

    #[test]
    fn prefix_sum_shifts_degrees() {
        let degrees = vec![42, 0, 1337, 4]
            .into_iter()
            .map(AtomicU64::new)
            .collect::<Vec<_>>();

        let sums = prefix_sum_atomic(degrees)
            .into_iter()
            .map(AtomicU64::into_inner)
            .collect::<Vec<_>>();

        assert_eq!(sums, vec![0, 42, 42, 1379, 1383]);
    }
}
