//! Single-source shortest paths by parallel Bellman-Ford relaxation.
//!
//! Push iterations relax the out-edges of the frontier with monotone
//! min-writes on the distance array. Pull iterations fold over **all**
//! incoming neighbors, not just the active ones — full relaxation considers
//! more edges per iteration than strict frontier expansion but converges to
//! the same distances, and a stale source distance can only produce a
//! message that loses the min-write.

use std::time::Instant;

use log::{debug, info};

use graph_engine::prelude::*;

/// Distance assigned to unreached vertices.
pub const UNREACHED: f32 = 1e9;

pub struct SsspResult {
    /// Tentative distance per vertex, [`UNREACHED`] where no path exists.
    /// Globally consistent on rank 0 after the terminal gather; other ranks
    /// hold their local slice only.
    pub distance: VertexArray<f32>,
    /// Number of vertices with a finite distance, including the root.
    pub reached_vertices: u64,
}

struct SsspOps<'a> {
    distance: &'a VertexArray<f32>,
    active_out: &'a VertexSubset,
}

impl EdgeOps<f32, f32> for SsspOps<'_> {
    fn sparse_signal(&self, src: VertexId, emitter: &mut Emitter<'_, f32>) {
        emitter.emit(src, self.distance.get(src));
    }

    fn sparse_slot(&self, _src: VertexId, msg: f32, out_adj: AdjLists<'_, f32>) -> u64 {
        let mut activated = 0;
        for edge in out_adj.iter() {
            let dst = edge.target;
            let relax_dist = msg + edge.value;
            if relax_dist < self.distance.get(dst) && self.distance.write_min(dst, relax_dist) {
                self.active_out.set_bit(dst);
                activated += 1;
            }
        }
        activated
    }

    fn dense_signal(&self, dst: VertexId, in_adj: AdjLists<'_, f32>, emitter: &mut Emitter<'_, f32>) {
        let mut msg = UNREACHED;
        for edge in in_adj.iter() {
            let relax_dist = self.distance.get(edge.target) + edge.value;
            if relax_dist < msg {
                msg = relax_dist;
            }
        }
        if msg < UNREACHED {
            emitter.emit(dst, msg);
        }
    }

    fn dense_slot(&self, dst: VertexId, msg: f32) -> u64 {
        if msg < self.distance.get(dst) {
            self.distance.write_min(dst, msg);
            self.active_out.set_bit(dst);
            1
        } else {
            0
        }
    }
}

/// Computes shortest-path distances from `root` until no relaxation fires.
///
/// Collective: every rank of the graph's process group must call this with
/// the same root.
pub fn sssp(graph: &Graph<f32>, root: VertexId) -> Result<SsspResult, Error> {
    let start = Instant::now();

    let distance = graph.alloc_vertex_array::<f32>();
    graph.fill_vertex_array(&distance, UNREACHED);
    distance.set(root, 0.0);

    let mut active_in = graph.alloc_vertex_subset();
    let mut active_out = graph.alloc_vertex_subset();
    active_in.set_bit(root);

    let mut active_vertices = 1;
    for iteration in 0.. {
        if active_vertices == 0 {
            break;
        }
        info!("active({iteration}) >= {active_vertices}");

        active_out.clear();
        let ops = SsspOps {
            distance: &distance,
            active_out: &active_out,
        };
        active_vertices = graph.process_edges(&ops, &active_in, None)?;
        debug!("iteration {iteration} relaxed {active_vertices}");

        std::mem::swap(&mut active_in, &mut active_out);
    }

    let reached_vertices =
        graph.process_vertices(|v| u64::from(distance.get(v) < UNREACHED), None)?;
    graph.gather_vertex_array(&distance, 0)?;

    info!(
        "sssp took {:?}, reached_vertices = {reached_vertices}",
        start.elapsed()
    );

    Ok(SsspResult {
        distance,
        reached_vertices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_ord::FloatOrd;
    use graph_engine::{LocalCluster, SingleProcess};
    use std::cmp::Reverse;
    use std::io::Write as _;
    use std::sync::Arc;

    fn write_graph(edges: &[(u64, u64, f32)]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for &(src, dst, weight) in edges {
            file.write_all(&src.to_le_bytes()).unwrap();
            file.write_all(&dst.to_le_bytes()).unwrap();
            file.write_all(&weight.to_le_bytes()).unwrap();
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

    fn dijkstra(edges: &[(u64, u64, f32)], vertices: usize, root: u64) -> Vec<f32> {
        let mut adjacency = vec![Vec::new(); vertices];
        for &(src, dst, weight) in edges {
            adjacency[src as usize].push((dst, weight));
        }

        let mut distances = vec![FloatOrd(UNREACHED); vertices];
        distances[root as usize] = FloatOrd(0.0);

        let mut queue = std::collections::BinaryHeap::new();
        queue.push(Reverse((FloatOrd(0.0), root)));

        while let Some(Reverse((cost, node))) = queue.pop() {
            if cost != distances[node as usize] {
                continue;
            }
            for &(target, weight) in &adjacency[node as usize] {
                let next = FloatOrd(cost.0 + weight);
                if next < distances[target as usize] {
                    distances[target as usize] = next;
                    queue.push(Reverse((next, target)));
                }
            }
        }

        distances.into_iter().map(|d| d.0).collect()
    }

    #[test]
    fn tiny_weighted_graph() {
        let edges = [
            (0_u64, 1_u64, 1.0_f32),
            (0, 2, 4.0),
            (1, 2, 2.0),
            (2, 3, 1.0),
        ];
        let file = write_graph(&edges);
        let graph: Graph<f32> =
            Graph::load_directed(file.path(), 5, config(), SingleProcess::shared()).unwrap();

        let result = sssp(&graph, 0).unwrap();

        let distances: Vec<f32> = result.distance.iter().collect();
        assert_eq!(distances, vec![0.0, 1.0, 3.0, 4.0, UNREACHED]);
        assert_eq!(result.reached_vertices, 4);
    }

    #[test]
    fn agrees_with_dijkstra() {
        // deterministic pseudo-random graph
        let vertices = 64_u64;
        let mut edges = Vec::new();
        let mut state = 88172645463325252_u64;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for _ in 0..400 {
            let src = next() % vertices;
            let dst = next() % vertices;
            let weight = (next() % 1000) as f32 / 100.0;
            edges.push((src, dst, weight));
        }

        let file = write_graph(&edges);
        let graph: Graph<f32> =
            Graph::load_directed(file.path(), vertices, config(), SingleProcess::shared())
                .unwrap();

        let result = sssp(&graph, 0).unwrap();
        let expected = dijkstra(&edges, vertices as usize, 0);

        for v in 0..vertices {
            let actual = result.distance.get(v);
            let expected = expected[v as usize];
            assert!(
                (actual - expected).abs() < 1e-3,
                "distance[{v}] = {actual}, expected {expected}"
            );
        }
    }

    #[test]
    fn cluster_ranks_agree_with_a_single_process() {
        let edges = [
            (0_u64, 1_u64, 1.0_f32),
            (0, 2, 4.0),
            (1, 2, 2.0),
            (2, 3, 1.0),
        ];
        let file = write_graph(&edges);
        let path = file.path().to_path_buf();

        let results = LocalCluster::run(2, |process| {
            let group: Arc<dyn ProcessGroup> = Arc::new(process);
            let graph: Graph<f32> = Graph::load_directed(&path, 5, config(), group).unwrap();
            let result = sssp(&graph, 0).unwrap();
            let distances: Vec<f32> = result.distance.iter().collect();
            (distances, result.reached_vertices)
        });

        assert_eq!(results[0].1, 4);
        assert_eq!(results[0].0, vec![0.0, 1.0, 3.0, 4.0, UNREACHED]);
    }
}
