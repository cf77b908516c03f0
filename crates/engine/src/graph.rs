//! The `Graph` handle and the two execution drivers.
//!
//! [`Graph::process_vertices`] is a parallel map-reduce over the local
//! partition. [`Graph::process_edges`] runs one bulk-synchronous edge
//! traversal: it selects push (sparse) or pull (dense) execution from the
//! globally reduced frontier density, rotates the ring of partitions and
//! overlaps the point-to-point exchange with the worker scans. Both drivers
//! return a globally all-reduced activation sum.

use std::ops::Range;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::{mpsc, Arc};
use std::time::Instant;

use log::info;
use rayon::prelude::*;

use crate::cluster::{ProcessGroup, ReduceOp, TAG_GATHER, TAG_SCATTER};
use crate::input::EdgeFile;
use crate::partition::{self, Partitioning};
use crate::subset::VertexSubset;
use crate::topology::{AdjLists, Direction, EdgeStore, PartitionMask};
use crate::varray::VertexArray;
use crate::wire::{decode_envelope, encode_envelope, envelope_bytes, Wire};
use crate::{Error, VertexId};

/// Tuning knobs for loading and executing a graph.
#[derive(Clone, Debug)]
pub struct GraphConfig {
    /// Worker threads per process.
    pub threads: usize,
    /// NUMA socket count; autodetected when `None`.
    pub sockets: Option<usize>,
    /// Weight of an in-edge relative to an out-edge when balancing
    /// partitions, reflecting the cost asymmetry between push and pull.
    pub alpha: u64,
    /// Upper bound for one message chunk on the wire.
    pub chunk_bytes: usize,
    /// Push mode runs while `active_edges * dense_threshold < |E|`.
    pub dense_threshold: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            sockets: None,
            alpha: 8,
            chunk_bytes: 64 * 1024,
            dense_threshold: 20,
        }
    }
}

impl GraphConfig {
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads,
            ..Self::default()
        }
    }
}

/// Message sink handed to the signal callbacks.
pub struct Emitter<'a, M: Wire> {
    pub(crate) buf: &'a mut Vec<(VertexId, M)>,
}

impl<M: Wire> Emitter<'_, M> {
    /// Queues one message. In sparse mode `vertex` must be the source being
    /// signaled; in dense mode it is the destination the message is
    /// aggregated for.
    pub fn emit(&mut self, vertex: VertexId, msg: M) {
        self.buf.push((vertex, msg));
    }
}

/// The four callbacks of one bulk-synchronous edge iteration.
///
/// Signals run on the side that owns the readable state and emit messages;
/// slots run on the partition that owns the written vertex and return how
/// many vertices they activated. Slot implementations must go through the
/// atomic primitives of [`VertexArray`] and [`VertexSubset`], since many
/// worker threads update the owner partition's state concurrently.
pub trait EdgeOps<E: Wire, M: Wire>: Sync {
    /// Push mode: called exactly once per vertex of `active_in` owned by
    /// this partition.
    fn sparse_signal(&self, src: VertexId, emitter: &mut Emitter<'_, M>);

    /// Push mode: called on the owning partition for each received message,
    /// with the outgoing adjacency of `src` restricted to destinations of
    /// this partition.
    fn sparse_slot(&self, src: VertexId, msg: M, out_adj: AdjLists<'_, E>) -> u64;

    /// Pull mode: called for every destination of the currently paired
    /// partition, with the incoming adjacency restricted to sources owned by
    /// this partition. Emits at most one aggregated message.
    fn dense_signal(&self, dst: VertexId, in_adj: AdjLists<'_, E>, emitter: &mut Emitter<'_, M>);

    /// Pull mode: called on the owning partition once per aggregated
    /// message.
    fn dense_slot(&self, dst: VertexId, msg: M) -> u64;
}

/// A directed graph, partitioned across the ranks of a [`ProcessGroup`].
pub struct Graph<E: Wire> {
    config: GraphConfig,
    group: Arc<dyn ProcessGroup>,
    pool: rayon::ThreadPool,
    vertices: u64,
    edges: u64,
    partitioning: Partitioning,
    out_store: EdgeStore<E>,
    in_store: EdgeStore<E>,
    out_degrees: Box<[u64]>,
    in_degrees: Box<[u64]>,
    dst_partitions: PartitionMask,
}

impl<E: Wire> Graph<E> {
    /// Loads the binary edge file at `path` and builds this rank's
    /// partition: degree histograms, the degree-balanced cuts and both
    /// socket-split CSR views.
    ///
    /// Every rank scans the whole file; the cuts are a pure function of the
    /// histograms, so all ranks agree without communication. Ids `>=
    /// vertices` and mis-sized files are fatal.
    pub fn load_directed(
        path: impl AsRef<Path>,
        vertices: u64,
        config: GraphConfig,
        group: Arc<dyn ProcessGroup>,
    ) -> Result<Self, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()?;
        let path = path.as_ref();

        let (file, out_degrees, in_degrees, partitioning) = pool.install(|| {
            let start = Instant::now();
            let file = EdgeFile::<E>::open(path)?;

            let out_counts = zeroed(vertices);
            let in_counts = zeroed(vertices);
            file.records().try_for_each(|(src, dst, _)| {
                for vertex in [src, dst] {
                    if vertex >= vertices {
                        return Err(Error::InvalidVertexId { vertex, vertices });
                    }
                }
                out_counts[src as usize].fetch_add(1, Relaxed);
                in_counts[dst as usize].fetch_add(1, Relaxed);
                Ok(())
            })?;

            let out_degrees = unwrap_counts(out_counts);
            let in_degrees = unwrap_counts(in_counts);
            info!("Computed degree histograms in {:?}", start.elapsed());

            let start = Instant::now();
            let sockets = config.sockets.unwrap_or_else(partition::detect_sockets);
            let weights = (0..vertices as usize)
                .into_par_iter()
                .map(|v| out_degrees[v] + config.alpha * in_degrees[v])
                .collect::<Vec<_>>();
            let partitioning = Partitioning::new(&weights, group.size(), sockets);
            info!(
                "Partitioned {} vertices into {} x {} ranges in {:?}",
                vertices,
                group.size(),
                sockets,
                start.elapsed()
            );

            Ok::<_, Error>((file, out_degrees, in_degrees, partitioning))
        })?;

        let rank = group.rank();
        let local_sockets = (0..partitioning.sockets())
            .map(|s| partitioning.socket_range(rank, s))
            .collect::<Vec<_>>();
        let local = partitioning.partition_range(rank);

        let (out_store, in_store, dst_partitions) = pool.install(|| {
            let start = Instant::now();
            let out_store = EdgeStore::build(&file, vertices, Direction::Outgoing, &local_sockets);
            info!("Built outgoing edge store in {:?}", start.elapsed());

            let start = Instant::now();
            let in_store = EdgeStore::build(&file, vertices, Direction::Incoming, &local_sockets);
            info!("Built incoming edge store in {:?}", start.elapsed());

            let dst_partitions = PartitionMask::new(local.clone(), group.size());
            file.records().for_each(|(src, dst, _)| {
                if local.contains(&src) {
                    dst_partitions.mark(src, partitioning.owner_of(dst));
                }
            });

            (out_store, in_store, dst_partitions)
        });

        let edges = file.edge_count();

        Ok(Self {
            config,
            group,
            pool,
            vertices,
            edges,
            partitioning,
            out_store,
            in_store,
            out_degrees,
            in_degrees,
            dst_partitions,
        })
    }

    pub fn vertices(&self) -> u64 {
        self.vertices
    }

    pub fn edges(&self) -> u64 {
        self.edges
    }

    /// The rank of this process, which is also its partition id.
    pub fn partition_id(&self) -> usize {
        self.group.rank()
    }

    pub fn partitions(&self) -> usize {
        self.group.size()
    }

    pub fn partitioning(&self) -> &Partitioning {
        &self.partitioning
    }

    /// The contiguous vertex id range owned by this process.
    pub fn local_range(&self) -> Range<VertexId> {
        self.partitioning.partition_range(self.partition_id())
    }

    pub fn out_degree(&self, v: VertexId) -> u64 {
        self.out_degrees[v as usize]
    }

    pub fn in_degree(&self, v: VertexId) -> u64 {
        self.in_degrees[v as usize]
    }

    /// Edges stored in the local outgoing view (destination owned locally).
    pub fn local_out_edges(&self) -> u64 {
        self.out_store.edge_count()
    }

    /// Edges stored in the local incoming view (source owned locally).
    pub fn local_in_edges(&self) -> u64 {
        self.in_store.edge_count()
    }

    pub fn alloc_vertex_array<T: Wire>(&self) -> VertexArray<T> {
        self.pool.install(|| VertexArray::new(self.vertices))
    }

    pub fn alloc_vertex_subset(&self) -> VertexSubset {
        self.pool.install(|| VertexSubset::new(self.vertices))
    }

    /// Writes `value` to every entry, parallelized over the socket
    /// sub-partition layout.
    pub fn fill_vertex_array<T: Wire>(&self, array: &VertexArray<T>, value: T) {
        let chunks = (0..self.partitions())
            .flat_map(|p| (0..self.partitioning.sockets()).map(move |s| (p, s)))
            .flat_map(|(p, s)| {
                partition::weighted_chunks(
                    self.partitioning.socket_range(p, s),
                    |_| 1,
                    self.config.threads,
                )
            })
            .collect::<Vec<_>>();

        self.pool.install(|| {
            chunks
                .into_par_iter()
                .for_each(|range| array.fill_range(range, value));
        });
    }

    /// All-to-one exchange: after this returns, rank `root` holds a globally
    /// consistent copy. Every other rank keeps only its local slice valid.
    pub fn gather_vertex_array<T: Wire>(
        &self,
        array: &VertexArray<T>,
        root: usize,
    ) -> Result<(), Error> {
        if self.partitions() == 1 {
            return Ok(());
        }

        if self.partition_id() == root {
            for from in (0..self.partitions()).filter(|&p| p != root) {
                let bytes = self.group.recv(from, TAG_GATHER)?;
                array.install_range(self.partitioning.partition_range(from), &bytes);
            }
        } else {
            let bytes = array.encode_range(self.local_range());
            self.group.send(root, TAG_GATHER, &bytes)?;
        }
        Ok(())
    }

    /// One-to-all exchange: rank `root` distributes each partition's slice
    /// to its owner.
    pub fn scatter_vertex_array<T: Wire>(
        &self,
        array: &VertexArray<T>,
        root: usize,
    ) -> Result<(), Error> {
        if self.partitions() == 1 {
            return Ok(());
        }

        if self.partition_id() == root {
            for to in (0..self.partitions()).filter(|&p| p != root) {
                let bytes = array.encode_range(self.partitioning.partition_range(to));
                self.group.send(to, TAG_SCATTER, &bytes)?;
            }
        } else {
            let bytes = self.group.recv(root, TAG_SCATTER)?;
            array.install_range(self.local_range(), &bytes);
        }
        Ok(())
    }

    /// Parallel map over the local partition, optionally filtered by
    /// `active`, reduced to the cluster-wide sum of the returned counts.
    pub fn process_vertices<F>(&self, f: F, active: Option<&VertexSubset>) -> Result<u64, Error>
    where
        F: Fn(VertexId) -> u64 + Sync,
    {
        let chunks = partition::weighted_chunks(self.local_range(), |_| 1, self.worker_chunks());

        let local_sum: u64 = self.pool.install(|| {
            chunks
                .into_par_iter()
                .map(|range| {
                    let mut acc = 0;
                    for v in range {
                        if active.map_or(true, |subset| subset.get_bit(v)) {
                            acc += f(v);
                        }
                    }
                    acc
                })
                .sum()
        });

        self.group.all_reduce_u64(local_sum, ReduceOp::Sum)
    }

    /// Runs one bulk-synchronous edge iteration and returns the cluster-wide
    /// activation sum.
    ///
    /// The mode is chosen globally: every rank contributes its active vertex
    /// count and their summed out-degrees; push runs while the active edges
    /// stay below `|E| / dense_threshold`, pull otherwise. `visited` is an
    /// optional short-circuit mask applied before `dense_signal` is invoked;
    /// it has no effect in push mode.
    ///
    /// An empty global frontier returns 0 without touching any vertex state
    /// and without exchanging messages.
    pub fn process_edges<M, Ops>(
        &self,
        ops: &Ops,
        active_in: &VertexSubset,
        visited: Option<&VertexSubset>,
    ) -> Result<u64, Error>
    where
        M: Wire,
        Ops: EdgeOps<E, M>,
    {
        let start = Instant::now();

        let chunks = partition::weighted_chunks(self.local_range(), |_| 1, self.worker_chunks());
        let (active_local, active_edges_local) = self.pool.install(|| {
            chunks
                .into_par_iter()
                .map(|range| {
                    let mut count = 0_u64;
                    let mut edge_sum = 0_u64;
                    for v in range {
                        if active_in.get_bit(v) {
                            count += 1;
                            edge_sum += self.out_degrees[v as usize];
                        }
                    }
                    (count, edge_sum)
                })
                .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1))
        });

        let active_total = self.group.all_reduce_u64(active_local, ReduceOp::Sum)?;
        if active_total == 0 {
            return Ok(0);
        }
        let active_edges = self.group.all_reduce_u64(active_edges_local, ReduceOp::Sum)?;

        let sparse =
            u128::from(active_edges) * u128::from(self.config.dense_threshold) < u128::from(self.edges);
        info!(
            "process_edges: {} active vertices, {} active edges, {} mode",
            active_total,
            active_edges,
            if sparse { "sparse" } else { "dense" }
        );

        let activated_local = if sparse {
            self.sparse_pass(ops, active_in)?
        } else {
            self.dense_pass(ops, visited)?
        };

        let activated = self
            .group
            .all_reduce_u64(activated_local, ReduceOp::Sum)?;
        info!("process_edges: {} activated in {:?}", activated, start.elapsed());

        Ok(activated)
    }

    // Push: signal the local frontier exactly once, then rotate the ring,
    // forwarding each buffered message to the partitions that hold
    // out-edges of its source.
    fn sparse_pass<M, Ops>(&self, ops: &Ops, active_in: &VertexSubset) -> Result<u64, Error>
    where
        M: Wire,
        Ops: EdgeOps<E, M>,
    {
        let signal_chunks = partition::weighted_chunks(
            self.local_range(),
            |v| 1 + self.out_degrees[v as usize],
            self.worker_chunks(),
        );

        let messages: Vec<(VertexId, M)> = self.pool.install(|| {
            signal_chunks
                .into_par_iter()
                .map(|range| {
                    let mut buf = Vec::new();
                    let mut emitter = Emitter { buf: &mut buf };
                    for v in range {
                        if active_in.get_bit(v) {
                            ops.sparse_signal(v, &mut emitter);
                        }
                    }
                    buf
                })
                .flatten()
                .collect()
        });

        let envelope = envelope_bytes::<M>();
        let mut activated = 0;

        for step in 0..self.partitions() {
            let target = (self.partition_id() + step) % self.partitions();

            activated += self.exchange_step(
                step as u64,
                target,
                |sink| {
                    self.pool.install(|| {
                        let per_job = (messages.len() / self.worker_chunks() + 1).max(64);
                        messages.par_chunks(per_job).for_each_with(
                            sink,
                            |sink, slice| {
                                let mut buf = Vec::with_capacity(self.config.chunk_bytes);
                                for &(src, msg) in slice {
                                    if !self.dst_partitions.contains(src, target) {
                                        continue;
                                    }
                                    encode_envelope(src, msg, &mut buf);
                                    if buf.len() + envelope > self.config.chunk_bytes {
                                        let full = std::mem::replace(
                                            &mut buf,
                                            Vec::with_capacity(self.config.chunk_bytes),
                                        );
                                        let _ = sink.send(full);
                                    }
                                }
                                if !buf.is_empty() {
                                    let _ = sink.send(buf);
                                }
                            },
                        );
                    });
                },
                |bytes| {
                    bytes
                        .par_chunks_exact(envelope)
                        .map(|chunk| {
                            let (src, msg) = decode_envelope::<M>(chunk);
                            ops.sparse_slot(src, msg, self.out_store.adj(src))
                        })
                        .sum()
                },
            )?;
        }

        Ok(activated)
    }

    // Pull: at step k fold this rank's local in-edges for every destination
    // of partition (rank + k) % P and ship the aggregated messages to the
    // owner.
    fn dense_pass<M, Ops>(&self, ops: &Ops, visited: Option<&VertexSubset>) -> Result<u64, Error>
    where
        M: Wire,
        Ops: EdgeOps<E, M>,
    {
        let envelope = envelope_bytes::<M>();
        let mut activated = 0;

        for step in 0..self.partitions() {
            let target = (self.partition_id() + step) % self.partitions();
            let target_range = self.partitioning.partition_range(target);

            activated += self.exchange_step(
                step as u64,
                target,
                |sink| {
                    let chunks = partition::weighted_chunks(
                        target_range,
                        |v| 1 + self.in_store.degree(v),
                        self.worker_chunks(),
                    );
                    self.pool.install(|| {
                        chunks.into_par_iter().for_each_with(sink, |sink, range| {
                            let mut out = Vec::with_capacity(self.config.chunk_bytes);
                            let mut scratch = Vec::new();
                            for dst in range {
                                if visited.is_some_and(|mask| mask.get_bit(dst)) {
                                    continue;
                                }
                                let mut emitter = Emitter { buf: &mut scratch };
                                ops.dense_signal(dst, self.in_store.adj(dst), &mut emitter);
                                for (vertex, msg) in scratch.drain(..) {
                                    encode_envelope(vertex, msg, &mut out);
                                    if out.len() + envelope > self.config.chunk_bytes {
                                        let full = std::mem::replace(
                                            &mut out,
                                            Vec::with_capacity(self.config.chunk_bytes),
                                        );
                                        let _ = sink.send(full);
                                    }
                                }
                            }
                            if !out.is_empty() {
                                let _ = sink.send(out);
                            }
                        });
                    });
                },
                |bytes| {
                    bytes
                        .par_chunks_exact(envelope)
                        .map(|chunk| {
                            let (dst, msg) = decode_envelope::<M>(chunk);
                            ops.dense_slot(dst, msg)
                        })
                        .sum()
                },
            )?;
        }

        Ok(activated)
    }

    // One ring step: produce chunks for `target` while shipping them from a
    // sender thread, receive the paired partition's chunks on a receiver
    // thread and consume them as they arrive. Self-directed steps loop
    // through the work queue without touching the process group.
    fn exchange_step<P, C>(&self, step: u64, target: usize, produce: P, consume: C) -> Result<u64, Error>
    where
        P: FnOnce(mpsc::Sender<Vec<u8>>) + Send,
        C: Fn(&[u8]) -> u64 + Sync,
    {
        let rank = self.partition_id();
        let size = self.partitions();
        let from = (rank + size - step as usize) % size;
        let group = self.group.as_ref();

        let (work_tx, work_rx) = mpsc::channel::<Vec<u8>>();

        if target == rank {
            std::thread::scope(|scope| {
                let producer = scope.spawn(move || produce(work_tx));

                let mut sum = 0;
                for chunk in work_rx.iter() {
                    sum += self.pool.install(|| consume(&chunk));
                }

                join(producer);
                Ok(sum)
            })
        } else {
            let (send_tx, send_rx) = mpsc::channel::<Vec<u8>>();

            std::thread::scope(|scope| {
                let sender = scope.spawn(move || -> Result<(), Error> {
                    for chunk in send_rx.iter() {
                        group.send(target, step, &chunk)?;
                    }
                    // end-of-step marker
                    group.send(target, step, &[])
                });

                let receiver = scope.spawn(move || -> Result<(), Error> {
                    loop {
                        let bytes = group.recv(from, step)?;
                        if bytes.is_empty() || work_tx.send(bytes).is_err() {
                            return Ok(());
                        }
                    }
                });

                let producer = scope.spawn(move || produce(send_tx));

                let mut sum = 0;
                for chunk in work_rx.iter() {
                    sum += self.pool.install(|| consume(&chunk));
                }

                join(producer);
                join(sender)?;
                join(receiver)?;
                Ok(sum)
            })
        }
    }

    fn worker_chunks(&self) -> usize {
        self.config.threads.max(1) * 4
    }
}

fn join<T>(handle: std::thread::ScopedJoinHandle<'_, T>) -> T {
    handle
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

fn zeroed(len: u64) -> Vec<AtomicU64> {
    (0..len as usize)
        .into_par_iter()
        .map(|_| AtomicU64::new(0))
        .collect()
}

fn unwrap_counts(counts: Vec<AtomicU64>) -> Box<[u64]> {
    counts
        .into_par_iter()
        .map(AtomicU64::into_inner)
        .collect::<Vec<_>>()
        .into_boxed_slice()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::SingleProcess;
    use std::io::Write as _;

    fn write_graph(edges: &[(u64, u64)]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for &(src, dst) in edges {
            file.write_all(&src.to_le_bytes()).unwrap();
            file.write_all(&dst.to_le_bytes()).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn config() -> GraphConfig {
        GraphConfig {
            sockets: Some(2),
            ..GraphConfig::with_threads(2)
        }
    }

    fn load(edges: &[(u64, u64)], vertices: u64) -> Graph<()> {
        let file = write_graph(edges);
        Graph::load_directed(file.path(), vertices, config(), SingleProcess::shared()).unwrap()
    }

    // propagates the source id along out-edges, BFS-step style
    struct Propagate<'a> {
        label: &'a VertexArray<u64>,
        active_in: &'a VertexSubset,
        active_out: &'a VertexSubset,
        none: u64,
    }

    impl EdgeOps<(), u64> for Propagate<'_> {
        fn sparse_signal(&self, src: VertexId, emitter: &mut Emitter<'_, u64>) {
            emitter.emit(src, src);
        }

        fn sparse_slot(&self, src: VertexId, _msg: u64, out_adj: AdjLists<'_, ()>) -> u64 {
            let mut activated = 0;
            for target in out_adj.iter() {
                if self.label.cas(target.target, self.none, src) {
                    self.active_out.set_bit(target.target);
                    activated += 1;
                }
            }
            activated
        }

        fn dense_signal(&self, dst: VertexId, in_adj: AdjLists<'_, ()>, emitter: &mut Emitter<'_, u64>) {
            for source in in_adj.iter() {
                if self.active_in.get_bit(source.target) {
                    emitter.emit(dst, source.target);
                    break;
                }
            }
        }

        fn dense_slot(&self, dst: VertexId, msg: u64) -> u64 {
            if self.label.cas(dst, self.none, msg) {
                self.active_out.set_bit(dst);
                1
            } else {
                0
            }
        }
    }

    #[test]
    fn load_builds_both_views() {
        let graph = load(&[(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)], 4);

        assert_eq!(graph.vertices(), 4);
        assert_eq!(graph.edges(), 5);
        assert_eq!(graph.local_out_edges(), 5);
        assert_eq!(graph.local_in_edges(), 5);
        assert_eq!(graph.out_degree(1), 2);
        assert_eq!(graph.in_degree(3), 2);
        assert_eq!(graph.local_range(), 0..4);
    }

    #[test]
    fn load_rejects_out_of_range_ids() {
        let file = write_graph(&[(0, 7)]);
        let result =
            Graph::<()>::load_directed(file.path(), 4, config(), SingleProcess::shared());
        assert!(matches!(
            result,
            Err(Error::InvalidVertexId {
                vertex: 7,
                vertices: 4
            })
        ));
    }

    #[test]
    fn process_vertices_sums_over_the_filter() {
        let graph = load(&[(0, 1), (1, 2), (2, 3)], 4);

        let all = graph.process_vertices(|v| v, None).unwrap();
        assert_eq!(all, 0 + 1 + 2 + 3);

        let subset = graph.alloc_vertex_subset();
        subset.set_bit(1);
        subset.set_bit(3);
        let filtered = graph.process_vertices(|v| v, Some(&subset)).unwrap();
        assert_eq!(filtered, 4);
    }

    #[test]
    fn empty_frontier_short_circuits() {
        let graph = load(&[(0, 1), (1, 2)], 3);

        let label = graph.alloc_vertex_array::<u64>();
        graph.fill_vertex_array(&label, 3);
        let active_in = graph.alloc_vertex_subset();
        let active_out = graph.alloc_vertex_subset();

        let ops = Propagate {
            label: &label,
            active_in: &active_in,
            active_out: &active_out,
            none: 3,
        };
        let activated = graph.process_edges(&ops, &active_in, None).unwrap();

        assert_eq!(activated, 0);
        assert!(label.iter().all(|value| value == 3));
        assert_eq!(active_out.count_in(0..3), 0);
    }

    fn run_propagation(dense_threshold: u64) -> (Vec<u64>, u64) {
        let file = write_graph(&[(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]);
        let config = GraphConfig {
            dense_threshold,
            ..config()
        };
        let graph: Graph<()> =
            Graph::load_directed(file.path(), 4, config, SingleProcess::shared()).unwrap();

        let label = graph.alloc_vertex_array::<u64>();
        graph.fill_vertex_array(&label, 4);
        label.set(0, 0);

        let active_in = graph.alloc_vertex_subset();
        active_in.set_bit(0);
        let active_out = graph.alloc_vertex_subset();

        let ops = Propagate {
            label: &label,
            active_in: &active_in,
            active_out: &active_out,
            none: 4,
        };
        let activated = graph.process_edges(&ops, &active_in, None).unwrap();

        (label.iter().collect(), activated)
    }

    #[test]
    fn sparse_pass_propagates_along_out_edges() {
        // threshold 0 forces push mode
        let (labels, activated) = run_propagation(0);
        assert_eq!(activated, 2);
        assert_eq!(labels, vec![0, 0, 0, 4]);
    }

    #[test]
    fn dense_pass_agrees_with_sparse() {
        // a large threshold forces pull mode
        let (labels, activated) = run_propagation(1000);
        assert_eq!(activated, 2);
        assert_eq!(labels, vec![0, 0, 0, 4]);
    }

    #[test]
    fn visited_mask_short_circuits_dense_signals() {
        let file = write_graph(&[(0, 1), (1, 2)]);
        let config = GraphConfig {
            dense_threshold: u64::MAX / 1024,
            ..config()
        };
        let graph: Graph<()> =
            Graph::load_directed(file.path(), 3, config, SingleProcess::shared()).unwrap();

        let label = graph.alloc_vertex_array::<u64>();
        graph.fill_vertex_array(&label, 3);
        label.set(0, 0);

        let active_in = graph.alloc_vertex_subset();
        active_in.set_bit(0);
        let active_out = graph.alloc_vertex_subset();
        let visited = graph.alloc_vertex_subset();
        visited.set_bit(0);
        visited.set_bit(1);

        let ops = Propagate {
            label: &label,
            active_in: &active_in,
            active_out: &active_out,
            none: 3,
        };
        let activated = graph.process_edges(&ops, &active_in, Some(&visited)).unwrap();

        // dst 1 is masked, so nothing reaches it even though 0 is active
        assert_eq!(activated, 0);
        assert_eq!(label.get(1), 3);
    }

    #[test]
    fn self_loops_are_delivered() {
        let graph = load(&[(0, 0), (0, 1)], 2);

        let label = graph.alloc_vertex_array::<u64>();
        graph.fill_vertex_array(&label, 2);
        label.set(0, 0);

        let active_in = graph.alloc_vertex_subset();
        active_in.set_bit(0);
        let active_out = graph.alloc_vertex_subset();

        let ops = Propagate {
            label: &label,
            active_in: &active_in,
            active_out: &active_out,
            none: 2,
        };
        // the self-loop is delivered like any other edge; 0 is already set
        let activated = graph.process_edges(&ops, &active_in, None).unwrap();
        assert_eq!(activated, 1);
        assert_eq!(label.get(1), 0);
        assert_eq!(label.get(0), 0);
    }
}
