//! A process-wide vertex bitmap with atomic bit operations, used to drive
//! activation between iterations.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;

use crate::VertexId;

const WORD_BITS: u64 = 64;

/// A fixed-size bitmap over all `|V|` vertex ids.
///
/// Every process holds all bits, but during edge processing writes normally
/// target the local partition's bit range only; cross-partition activation
/// travels in messages, not by replicating the bitmap. `set_bit` and
/// `clear_bit` are individually atomic and may race from any thread;
/// `get_bit` is a plain load and may observe a concurrent writer late.
pub struct VertexSubset {
    vertices: u64,
    words: Box<[AtomicU64]>,
}

impl VertexSubset {
    pub fn new(vertices: u64) -> Self {
        let word_count = vertices.div_ceil(WORD_BITS) as usize;
        let words = (0..word_count)
            .into_par_iter()
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self { vertices, words }
    }

    pub fn vertices(&self) -> u64 {
        self.vertices
    }

    /// Resets every bit to zero.
    pub fn clear(&self) {
        self.words
            .par_iter()
            .for_each(|word| word.store(0, Ordering::Relaxed));
    }

    pub fn set_bit(&self, v: VertexId) {
        debug_assert!(v < self.vertices);
        self.words[(v / WORD_BITS) as usize].fetch_or(1 << (v % WORD_BITS), Ordering::Relaxed);
    }

    pub fn clear_bit(&self, v: VertexId) {
        debug_assert!(v < self.vertices);
        self.words[(v / WORD_BITS) as usize].fetch_and(!(1 << (v % WORD_BITS)), Ordering::Relaxed);
    }

    pub fn get_bit(&self, v: VertexId) -> bool {
        debug_assert!(v < self.vertices);
        self.words[(v / WORD_BITS) as usize].load(Ordering::Relaxed) & (1 << (v % WORD_BITS)) != 0
    }

    /// Population count over `range`. The caller decides whether the range
    /// is the local partition or the whole id space.
    pub fn count_in(&self, range: Range<VertexId>) -> u64 {
        if range.is_empty() {
            return 0;
        }

        let first_word = range.start / WORD_BITS;
        let last_word = (range.end - 1) / WORD_BITS;

        (first_word..last_word + 1)
            .into_par_iter()
            .map(|w| {
                let mut word = self.words[w as usize].load(Ordering::Relaxed);
                if w == first_word {
                    word &= !0 << (range.start % WORD_BITS);
                }
                if w == last_word {
                    let used = (range.end - 1) % WORD_BITS + 1;
                    if used < WORD_BITS {
                        word &= (1 << used) - 1;
                    }
                }
                u64::from(word.count_ones())
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear() {
        let subset = VertexSubset::new(200);
        assert!(!subset.get_bit(63));

        subset.set_bit(63);
        subset.set_bit(64);
        subset.set_bit(199);

        assert!(subset.get_bit(63));
        assert!(subset.get_bit(64));
        assert!(subset.get_bit(199));
        assert!(!subset.get_bit(0));

        subset.clear_bit(64);
        assert!(!subset.get_bit(64));

        subset.clear();
        assert_eq!(subset.count_in(0..200), 0);
    }

    #[test]
    fn count_in_sub_word_ranges() {
        let subset = VertexSubset::new(256);
        for v in [0, 1, 63, 64, 65, 127, 128, 255] {
            subset.set_bit(v);
        }

        assert_eq!(subset.count_in(0..256), 8);
        assert_eq!(subset.count_in(0..64), 3);
        assert_eq!(subset.count_in(64..128), 3);
        assert_eq!(subset.count_in(1..64), 2);
        assert_eq!(subset.count_in(65..66), 1);
        assert_eq!(subset.count_in(66..66), 0);
        assert_eq!(subset.count_in(128..256), 2);
    }

    #[test]
    fn concurrent_set_bits_all_land() {
        let subset = VertexSubset::new(10_000);
        (0..10_000_u64).into_par_iter().for_each(|v| {
            if v % 3 == 0 {
                subset.set_bit(v);
            }
        });

        let expected = (0..10_000_u64).filter(|v| v % 3 == 0).count() as u64;
        assert_eq!(subset.count_in(0..10_000), expected);
    }
}
