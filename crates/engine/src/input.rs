//! Binary edge list input.
//!
//! The on-disk format is packed little-endian with no header: two `u64`
//! fields `(src, dst)` per edge, followed by the payload bytes when the
//! graph is weighted. The file is mapped once and scanned in parallel by
//! record-aligned chunks.

use std::fs::File;
use std::marker::PhantomData;
use std::path::Path;

use log::info;
use memmap2::Mmap;
use rayon::prelude::*;

use crate::wire::Wire;
use crate::{Error, VertexId};

/// On-disk size of one edge record for payload type `E`.
pub const fn record_bytes<E: Wire>() -> usize {
    2 * std::mem::size_of::<VertexId>() + E::BYTES
}

/// A memory-mapped binary edge file.
pub struct EdgeFile<E: Wire> {
    mmap: Option<Mmap>,
    edges: u64,
    _payload: PhantomData<E>,
}

impl<E: Wire> EdgeFile<E> {
    /// Maps `path` and derives the edge count from the file length.
    ///
    /// A length that is not an exact multiple of the record size is fatal.
    /// Empty files are valid and represent an edgeless graph.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let record = record_bytes::<E>();

        if len % record as u64 != 0 {
            return Err(Error::InvalidFormat {
                record,
                actual: len,
            });
        }

        let edges = len / record as u64;
        let mmap = if len == 0 {
            None
        } else {
            Some(unsafe { memmap2::MmapOptions::new().populate().map(&file)? })
        };

        info!("Mapped {:?}: {} edges, {} byte records", path, edges, record);

        Ok(Self {
            mmap,
            edges,
            _payload: PhantomData,
        })
    }

    pub fn edge_count(&self) -> u64 {
        self.edges
    }

    fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Parallel iteration over all `(src, dst, payload)` records.
    pub(crate) fn records(
        &self,
    ) -> impl IndexedParallelIterator<Item = (VertexId, VertexId, E)> + '_ {
        self.bytes()
            .par_chunks_exact(record_bytes::<E>())
            .map(|record| {
                let src = VertexId::decode(record);
                let dst = VertexId::decode(&record[8..]);
                let payload = E::decode(&record[16..]);
                (src, dst, payload)
            })
    }
}
