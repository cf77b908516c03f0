//! Typed per-vertex state with word-atomic access.
//!
//! A [`VertexArray`] spans the whole vertex id space on every process, but
//! only the local partition's slice is authoritative; remote slices become
//! meaningful after [`crate::Graph::gather_vertex_array`] or
//! [`crate::Graph::scatter_vertex_array`]. Elements live in
//! [`atomic::Atomic`] cells, so they are aligned to the word size being
//! CAS-ed and the compare-and-swap / monotone-min primitives below are the
//! only synchronization user callbacks need on shared vertex state.

use std::ops::Range;
use std::sync::atomic::Ordering;

use atomic::Atomic;
use rayon::prelude::*;

use crate::wire::Wire;
use crate::VertexId;

pub struct VertexArray<T: Wire> {
    values: Box<[Atomic<T>]>,
}

impl<T: Wire> VertexArray<T> {
    pub(crate) fn new(vertices: u64) -> Self {
        let values = (0..vertices as usize)
            .into_par_iter()
            .map(|_| Atomic::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self { values }
    }

    pub fn len(&self) -> u64 {
        self.values.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, v: VertexId) -> T {
        self.values[v as usize].load(Ordering::Relaxed)
    }

    pub fn set(&self, v: VertexId, value: T) {
        self.values[v as usize].store(value, Ordering::Relaxed);
    }

    /// Atomic compare-and-swap on a single element. Returns whether the
    /// swap happened.
    pub fn cas(&self, v: VertexId, expected: T, desired: T) -> bool {
        self.values[v as usize]
            .compare_exchange(expected, desired, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Stores `min(current, value)` through a compare-and-swap loop.
    /// Returns whether memory changed.
    pub fn write_min(&self, v: VertexId, value: T) -> bool
    where
        T: PartialOrd,
    {
        let cell = &self.values[v as usize];
        let mut current = cell.load(Ordering::SeqCst);
        while value < current {
            match cell.compare_exchange_weak(current, value, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return true,
                // lost the race, retry against the new minimum
                Err(observed) => current = observed,
            }
        }
        false
    }

    /// Snapshot iteration over all elements. Not synchronized against
    /// concurrent writers.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.values.iter().map(|cell| cell.load(Ordering::Relaxed))
    }

    pub(crate) fn fill_range(&self, range: Range<VertexId>, value: T) {
        for v in range {
            self.values[v as usize].store(value, Ordering::Relaxed);
        }
    }

    pub(crate) fn encode_range(&self, range: Range<VertexId>) -> Vec<u8> {
        let mut out = Vec::with_capacity((range.end - range.start) as usize * T::BYTES);
        for v in range {
            self.get(v).encode(&mut out);
        }
        out
    }

    pub(crate) fn install_range(&self, range: Range<VertexId>, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), (range.end - range.start) as usize * T::BYTES);
        for (v, chunk) in range.zip(bytes.chunks_exact(T::BYTES.max(1))) {
            self.set(v, T::decode(chunk));
        }
    }
}
