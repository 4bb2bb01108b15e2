//! Frequency Sketch Module
//!
//! Count-min sketch of 4-bit saturating counters estimating how often a key
//! hash has been seen recently.
//!
//! ```text
//! row 0: [c c c c c c c c c c c c c c c c][c c ...]   16 counters per u64
//! row 1: [ ... ]
//! row 2: [ ... ]
//! row 3: [ ... ]
//!
//! estimate(h) = min(row[i][mix(h, seed[i]) & mask]) for i in 0..4
//! ```
//!
//! After `reset_at` increments every counter is halved so recent popularity
//! outweighs historical counts.
//!
//! Not internally synchronized: the policy owns it behind its flush lock.

const ROWS: usize = 4;
const COUNTERS_PER_WORD: usize = 16;
const COUNTER_MAX: u64 = 0xF;
const HALVE_MASK: u64 = 0x7777_7777_7777_7777;

const ROW_SEEDS: [u64; ROWS] = [
    0xc3a5_c85c_97cb_3127,
    0xb492_b66f_be98_f273,
    0x9ae1_6a3b_2f90_404f,
    0xcbf2_9ce4_8422_2325,
];

// == Frequency Sketch ==
/// Approximate, aging access-frequency counter.
#[derive(Debug)]
pub struct FrequencySketch {
    rows: [Vec<u64>; ROWS],
    mask: u64,
    additions: usize,
    reset_at: usize,
}

impl FrequencySketch {
    // == Constructor ==
    /// Creates a sketch with at least `num_counters` counters per row.
    ///
    /// Counters are halved after `num_counters` increments.
    pub fn new(num_counters: usize) -> Self {
        let width = num_counters.max(COUNTERS_PER_WORD).next_power_of_two();
        let words = width / COUNTERS_PER_WORD;
        Self {
            rows: std::array::from_fn(|_| vec![0; words]),
            mask: (width - 1) as u64,
            additions: 0,
            reset_at: num_counters.max(1),
        }
    }

    // == Increment ==
    /// Records one access of `key_hash`, aging the sketch when due.
    pub fn increment(&mut self, key_hash: u64) {
        for (row, seed) in self.rows.iter_mut().zip(ROW_SEEDS) {
            let (word, shift) = slot(key_hash, seed, self.mask);
            if (row[word] >> shift) & COUNTER_MAX < COUNTER_MAX {
                row[word] += 1 << shift;
            }
        }
        self.additions += 1;
        if self.additions >= self.reset_at {
            self.age();
        }
    }

    // == Estimate ==
    /// Returns the estimated recent access count of `key_hash` (0..=15).
    pub fn estimate(&self, key_hash: u64) -> u8 {
        self.rows
            .iter()
            .zip(ROW_SEEDS)
            .map(|(row, seed)| {
                let (word, shift) = slot(key_hash, seed, self.mask);
                ((row[word] >> shift) & COUNTER_MAX) as u8
            })
            .min()
            .unwrap_or(0)
    }

    // == Age ==
    /// Halves every counter.
    pub fn age(&mut self) {
        for row in self.rows.iter_mut() {
            for word in row.iter_mut() {
                *word = (*word >> 1) & HALVE_MASK;
            }
        }
        self.additions /= 2;
    }

    // == Clear ==
    /// Zeroes every counter.
    pub fn clear(&mut self) {
        for row in self.rows.iter_mut() {
            row.fill(0);
        }
        self.additions = 0;
    }

    /// Increments applied since the last aging pass, halved by each pass.
    pub fn additions(&self) -> usize {
        self.additions
    }
}

/// Word index and bit shift of `key_hash`'s counter in the row seeded by `seed`.
fn slot(key_hash: u64, seed: u64, mask: u64) -> (usize, u32) {
    let mut h = (key_hash ^ seed).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    h ^= h >> 32;
    let index = h & mask;
    ((index / COUNTERS_PER_WORD as u64) as usize, ((index % 16) * 4) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_key_estimates_zero() {
        let sketch = FrequencySketch::new(1024);
        assert_eq!(sketch.estimate(42), 0);
    }

    #[test]
    fn test_increment_raises_estimate() {
        let mut sketch = FrequencySketch::new(1024);
        for _ in 0..5 {
            sketch.increment(7);
        }
        assert_eq!(sketch.estimate(7), 5);
    }

    #[test]
    fn test_counters_saturate() {
        let mut sketch = FrequencySketch::new(1024);
        for _ in 0..100 {
            sketch.increment(7);
        }
        assert_eq!(sketch.estimate(7), 15);
    }

    #[test]
    fn test_estimates_are_per_key() {
        let mut sketch = FrequencySketch::new(4096);
        for _ in 0..8 {
            sketch.increment(1);
        }
        sketch.increment(2);
        assert_eq!(sketch.estimate(1), 8);
        assert_eq!(sketch.estimate(2), 1);
    }

    #[test]
    fn test_age_halves_counters() {
        let mut sketch = FrequencySketch::new(1024);
        for _ in 0..10 {
            sketch.increment(3);
        }
        sketch.age();
        assert_eq!(sketch.estimate(3), 5);
        assert_eq!(sketch.additions(), 5);
    }

    #[test]
    fn test_automatic_aging_after_reset_threshold() {
        // reset_at = 16: the 16th increment halves everything
        let mut sketch = FrequencySketch::new(16);
        for _ in 0..15 {
            sketch.increment(9);
        }
        assert_eq!(sketch.estimate(9), 15);
        sketch.increment(9);
        assert_eq!(sketch.estimate(9), 7);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut sketch = FrequencySketch::new(1024);
        sketch.increment(11);
        sketch.clear();
        assert_eq!(sketch.estimate(11), 0);
        assert_eq!(sketch.additions(), 0);
    }
}
