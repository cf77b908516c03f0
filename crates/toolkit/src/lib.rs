//! Application kernels and tooling for the partitioned graph engine.
//!
//! The kernels ([`bfs`], [`sssp`]) are thin clients of
//! [`graph_engine::Graph`]: they own their vertex state and describe one
//! iteration through the engine's four edge callbacks. [`edge2bin`] converts
//! text edge lists into the engine's packed binary format.

pub mod bfs;
pub mod edge2bin;
pub mod sssp;

use log::info;
use rand::Rng as _;

use graph_engine::{Error, ProcessGroup, ReduceOp, VertexId};

/// Resolves the source vertex for a kernel run.
///
/// With no requested source, every rank draws a uniform vertex and the ranks
/// agree on the all-reduced maximum, so repeated iterations on the same
/// cluster all start from one common root.
pub fn choose_root(
    group: &dyn ProcessGroup,
    vertices: u64,
    requested: Option<VertexId>,
) -> Result<VertexId, Error> {
    if let Some(root) = requested {
        return Ok(root);
    }

    let drawn = rand::thread_rng().gen_range(0..vertices);
    let root = group.all_reduce_u64(drawn, ReduceOp::Max)?;
    info!("Using randomly generated source vertex {root}");
    Ok(root)
}
