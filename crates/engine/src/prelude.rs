pub use crate::cluster::LocalCluster;
pub use crate::cluster::LocalProcess;
pub use crate::cluster::ProcessGroup;
pub use crate::cluster::ReduceOp;
pub use crate::cluster::SingleProcess;
pub use crate::graph::EdgeOps;
pub use crate::graph::Emitter;
pub use crate::graph::Graph;
pub use crate::graph::GraphConfig;
pub use crate::input::record_bytes;
pub use crate::input::EdgeFile;
pub use crate::subset::VertexSubset;
pub use crate::topology::AdjLists;
pub use crate::topology::Target;
pub use crate::varray::VertexArray;
pub use crate::wire::Wire;
pub use crate::Error;
pub use crate::VertexId;
