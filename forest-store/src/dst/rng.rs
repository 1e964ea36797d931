//! `DeterministicRng` - Seeded Random Number Generator
//!
//! `TigerStyle`: ChaCha20-based RNG for deterministic simulation.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// A deterministic random number generator.
///
/// `TigerStyle`:
/// - Same seed always produces same sequence
/// - Fork creates independent streams
/// - All randomness flows through this
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    rng: ChaCha20Rng,
    seed: u64,
    /// Counter for generating fork seeds
    fork_counter: u64,
}

impl DeterministicRng {
    /// Create a new RNG with the given seed.
    ///
    /// # Example
    /// ```
    /// use forest_store::dst::DeterministicRng;
    /// let mut rng = DeterministicRng::new(42);
    /// let value = rng.next_float();
    /// assert!((0.0..1.0).contains(&value));
    /// ```
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed,
            fork_counter: 0,
        }
    }

    /// Get the original seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generate a random float in [0, 1).
    pub fn next_float(&mut self) -> f64 {
        let value = self.rng.gen::<f64>();

        // Postcondition
        assert!((0.0..1.0).contains(&value), "float must be in [0, 1)");
        value
    }

    /// Generate a random u64.
    pub fn next_u64(&mut self) -> u64 {
        self.rng.gen()
    }

    /// Generate a random usize in [min, max] (inclusive).
    ///
    /// # Panics
    /// Panics if min > max.
    pub fn next_usize(&mut self, min: usize, max: usize) -> usize {
        // Precondition
        assert!(min <= max, "min ({min}) must be <= max ({max})");

        self.rng.gen_range(min..=max)
    }

    /// Generate a random boolean with the given probability of true.
    ///
    /// # Panics
    /// Panics if probability is not in [0, 1].
    pub fn next_bool(&mut self, probability: f64) -> bool {
        // Precondition
        assert!(
            (0.0..=1.0).contains(&probability),
            "probability must be in [0, 1], got {probability}"
        );

        self.next_float() < probability
    }

    /// Choose a random element from a slice.
    ///
    /// # Panics
    /// Panics if the slice is empty.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        // Precondition
        assert!(!items.is_empty(), "cannot choose from empty slice");

        let index = self.next_usize(0, items.len() - 1);
        &items[index]
    }

    /// Shuffle a mutable slice in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        // Fisher-Yates
        for i in (1..items.len()).rev() {
            let j = self.next_usize(0, i);
            items.swap(i, j);
        }
    }

    /// Create an independent fork of this RNG.
    ///
    /// `TigerStyle`: Forks have independent sequences derived from parent.
    pub fn fork(&mut self) -> Self {
        // Golden ratio constant for good distribution
        let fork_seed = self.seed.wrapping_add(
            self.fork_counter
                .wrapping_add(1)
                .wrapping_mul(0x9E37_79B9_7F4A_7C15),
        );
        self.fork_counter += 1;

        Self::new(fork_seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..100 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_next_usize_bounds() {
        let mut rng = DeterministicRng::new(42);

        for _ in 0..100 {
            let val = rng.next_usize(5, 10);
            assert!((5..=10).contains(&val));
        }
    }

    #[test]
    fn test_next_bool_extremes() {
        let mut rng = DeterministicRng::new(42);

        for _ in 0..100 {
            assert!(!rng.next_bool(0.0));
            assert!(rng.next_bool(1.0));
        }
    }

    #[test]
    fn test_fork_independence() {
        let mut rng = DeterministicRng::new(42);

        let mut fork1 = rng.fork();
        let mut fork2 = rng.fork();

        assert_ne!(fork1.seed(), fork2.seed());

        let a: Vec<u64> = (0..5).map(|_| fork1.next_u64()).collect();
        let b: Vec<u64> = (0..5).map(|_| fork2.next_u64()).collect();
        assert_ne!(a, b, "forks should have different sequences");
    }

    #[test]
    fn test_shuffle_keeps_elements() {
        let mut rng = DeterministicRng::new(42);
        let mut items: Vec<u32> = (1..=10).collect();

        rng.shuffle(&mut items);
        assert_ne!(items, (1..=10).collect::<Vec<_>>());

        items.sort_unstable();
        assert_eq!(items, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    #[should_panic(expected = "cannot choose from empty slice")]
    fn test_choose_empty() {
        let mut rng = DeterministicRng::new(42);
        let items: Vec<i32> = vec![];
        rng.choose(&items);
    }
}
