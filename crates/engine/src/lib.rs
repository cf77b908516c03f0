//! A library for partitioned, bulk-synchronous, vertex-centric graph
//! computations.
//!
//! The engine splits the vertex id space into one contiguous, degree-balanced
//! partition per process and keeps two CSR-style adjacency views per
//! partition. Iterative algorithms are expressed against [`Graph`] through
//! two drivers: [`Graph::process_vertices`], a parallel map-reduce over the
//! local partition, and [`Graph::process_edges`], a single bulk-synchronous
//! edge traversal that picks a push (sparse) or pull (dense) strategy per
//! call based on the density of the active vertex set. All intra-process
//! parallelism is driven by [rayon](https://github.com/rayon-rs/rayon);
//! inter-process exchanges go through a pluggable [`ProcessGroup`].
//!
//! # Loading a graph
//!
//! Graphs are loaded from a packed little-endian binary edge list, two `u64`
//! fields per edge plus an optional payload (see [`input::EdgeFile`]):
//!
//! ```
//! use graph_engine::prelude::*;
//! use std::io::Write as _;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut file = tempfile::NamedTempFile::new()?;
//! for (src, dst) in [(0u64, 1u64), (0, 2), (1, 2), (1, 3), (2, 3)] {
//!     file.write_all(&src.to_le_bytes())?;
//!     file.write_all(&dst.to_le_bytes())?;
//! }
//!
//! let graph: Graph<()> =
//!     Graph::load_directed(file.path(), 4, GraphConfig::default(), SingleProcess::shared())?;
//!
//! assert_eq!(graph.vertices(), 4);
//! assert_eq!(graph.edges(), 5);
//! assert_eq!(graph.out_degree(1), 2);
//! assert_eq!(graph.in_degree(2), 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Running a computation
//!
//! A kernel owns its vertex state and describes one iteration through the
//! four callbacks of [`EdgeOps`]; the engine decides how the iteration is
//! executed. See the `graph_toolkit` crate for complete BFS and SSSP
//! kernels.

pub mod cluster;
pub mod graph;
pub mod input;
pub mod partition;
pub mod prelude;
pub mod subset;
pub mod topology;
pub mod varray;
pub mod wire;

pub use crate::cluster::{LocalCluster, LocalProcess, ProcessGroup, ReduceOp, SingleProcess};
pub use crate::graph::{EdgeOps, Emitter, Graph, GraphConfig};
pub use crate::subset::VertexSubset;
pub use crate::topology::{AdjLists, Target};
pub use crate::varray::VertexArray;
pub use crate::wire::Wire;

use thiserror::Error;

/// Identifies a vertex. Valid ids are `0..vertices`; the value `vertices`
/// itself is conventionally used by kernels as a "none" sentinel.
pub type VertexId = u64;

#[derive(Error, Debug)]
pub enum Error {
    #[error("error while loading graph")]
    IoError {
        #[from]
        source: std::io::Error,
    },
    #[error("edge file length {actual} is not a multiple of the {record} byte record size")]
    InvalidFormat { record: usize, actual: u64 },
    #[error("vertex id {vertex} out of range, graph has {vertices} vertices")]
    InvalidVertexId { vertex: VertexId, vertices: u64 },
    #[error("invalid partitioning")]
    InvalidPartitioning,
    #[error("failed to build worker pool")]
    ThreadPool {
        #[from]
        source: rayon::ThreadPoolBuildError,
    },
    #[error("communication failure: {0}")]
    Communication(String),
}

#[repr(transparent)]
pub(crate) struct SharedMut<T>(*mut T);
unsafe impl<T: Send> Send for SharedMut<T> {}
unsafe impl<T: Sync> Sync for SharedMut<T> {}

impl<T> SharedMut<T> {
    pub(crate) fn new(ptr: *mut T) -> Self {
        SharedMut(ptr)
    }

    /// # Safety
    ///
    /// Ensure that `count` does not exceed the capacity of the backing Vec.
    pub(crate) unsafe fn add(&self, count: usize) -> *mut T {
        self.0.add(count)
    }
}
