//! Deterministic pseudo-random stream derived from BLAKE3's extendable output.
//!
//! Invariants:
//! - The same seed and label always yield the same sequence, on every
//!   platform and in every release of the crate.
//! - Streams with different labels are independent.

use blake3::{Hasher, OutputReader};

const STREAM_CONTEXT: &str = "genloom 2024 seeded stream v1";

/// Map a 64-bit word into `[0, p)` with a multiply-high.
///
/// Callers must pass `p > 0`. Not equivalent to `% p`.
#[inline]
pub fn fast_range(word: u64, p: u64) -> u64 {
    debug_assert!(p > 0);
    let product = (word as u128).wrapping_mul(p as u128);
    (product >> 64) as u64
}

/// Reproducible stream of uniformly distributed words.
pub struct SeededStream {
    reader: OutputReader,
}

impl SeededStream {
    pub fn new(seed: u64, label: &[u8]) -> Self {
        let mut hasher = Hasher::new_derive_key(STREAM_CONTEXT);
        hasher.update(&seed.to_le_bytes());
        hasher.update(&(label.len() as u64).to_le_bytes());
        hasher.update(label);
        Self {
            reader: hasher.finalize_xof(),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut word = [0u8; 8];
        self.reader.fill(&mut word);
        u64::from_le_bytes(word)
    }

    /// Uniform value in `[0, bound)`. `bound` must be non-zero.
    ///
    /// Multiply-high reduction with rejection of the biased low zone, so the
    /// result is exactly uniform.
    pub fn below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        let threshold = bound.wrapping_neg() % bound;
        loop {
            let word = self.next_u64();
            let low = word.wrapping_mul(bound);
            if low >= threshold {
                return fast_range(word, bound);
            }
        }
    }

    /// Uniform float in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}
