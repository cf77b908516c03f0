//! Breadth-first search over the partitioned engine.
//!
//! Produces a parent pointer per reachable vertex. Push iterations let each
//! frontier vertex claim its unvisited out-neighbors with a compare-and-swap
//! on the parent array; pull iterations let every unvisited vertex look for
//! one frontier in-neighbor. The `visited` subset doubles as the engine's
//! dense-mode short-circuit mask.

use std::time::Instant;

use log::{debug, info};

use graph_engine::prelude::*;

pub struct BfsResult {
    /// Parent per vertex, `graph.vertices()` for unreached ones. Globally
    /// consistent on rank 0 after the terminal gather; other ranks hold
    /// their local slice only.
    pub parent: VertexArray<u64>,
    /// Number of vertices reached from the root, including the root.
    pub found_vertices: u64,
}

struct BfsOps<'a> {
    parent: &'a VertexArray<u64>,
    visited: &'a VertexSubset,
    active_in: &'a VertexSubset,
    active_out: &'a VertexSubset,
    none: u64,
}

impl EdgeOps<(), u64> for BfsOps<'_> {
    fn sparse_signal(&self, src: VertexId, emitter: &mut Emitter<'_, u64>) {
        emitter.emit(src, src);
    }

    fn sparse_slot(&self, src: VertexId, _msg: u64, out_adj: AdjLists<'_, ()>) -> u64 {
        let mut activated = 0;
        for edge in out_adj.iter() {
            let dst = edge.target;
            if self.parent.get(dst) == self.none && self.parent.cas(dst, self.none, src) {
                self.active_out.set_bit(dst);
                activated += 1;
            }
        }
        activated
    }

    fn dense_signal(&self, dst: VertexId, in_adj: AdjLists<'_, ()>, emitter: &mut Emitter<'_, u64>) {
        if self.visited.get_bit(dst) {
            return;
        }
        for edge in in_adj.iter() {
            let src = edge.target;
            if self.active_in.get_bit(src) {
                emitter.emit(dst, src);
                break;
            }
        }
    }

    fn dense_slot(&self, dst: VertexId, msg: u64) -> u64 {
        if self.parent.cas(dst, self.none, msg) {
            self.active_out.set_bit(dst);
            1
        } else {
            0
        }
    }
}

/// Runs BFS from `root` until the frontier drains.
///
/// Collective: every rank of the graph's process group must call this with
/// the same root.
pub fn bfs(graph: &Graph<()>, root: VertexId) -> Result<BfsResult, Error> {
    let start = Instant::now();
    let none = graph.vertices();

    let parent = graph.alloc_vertex_array::<u64>();
    graph.fill_vertex_array(&parent, none);
    parent.set(root, root);

    let visited = graph.alloc_vertex_subset();
    let mut active_in = graph.alloc_vertex_subset();
    let mut active_out = graph.alloc_vertex_subset();
    visited.set_bit(root);
    active_in.set_bit(root);

    let mut active_vertices = 1;
    for iteration in 0.. {
        if active_vertices == 0 {
            break;
        }
        info!("active({iteration}) >= {active_vertices}");

        active_out.clear();
        let ops = BfsOps {
            parent: &parent,
            visited: &visited,
            active_in: &active_in,
            active_out: &active_out,
            none,
        };
        let activated = graph.process_edges(&ops, &active_in, Some(&visited))?;
        debug!("iteration {iteration} activated {activated}");

        active_vertices = graph.process_vertices(
            |v| {
                visited.set_bit(v);
                1
            },
            Some(&active_out),
        )?;

        std::mem::swap(&mut active_in, &mut active_out);
    }

    let found_vertices = graph.process_vertices(|v| u64::from(parent.get(v) < none), None)?;
    graph.gather_vertex_array(&parent, 0)?;

    info!("bfs took {:?}, found_vertices = {found_vertices}", start.elapsed());

    Ok(BfsResult {
        parent,
        found_vertices,
    })
}
