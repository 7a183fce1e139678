//! Seeded random stream for row sampling and machine partitioning.

use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Deterministic random stream keyed by a single seed.
///
/// Machine partitioning relies on every machine drawing the exact same
/// sequence, so all draws go through one generator, and the generator is
/// only ever advanced from the orchestrator thread. Draw order is defined
/// as a single linear pass over rows (or query groups).
#[derive(Clone, Debug)]
pub struct Random {
    rng: Xoshiro256PlusPlus,
}

impl Random {
    /// Create a stream from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    /// Uniform integer in `[lo, hi)`.
    #[inline]
    pub fn next_int(&mut self, lo: usize, hi: usize) -> usize {
        self.rng.gen_range(lo..hi)
    }

    /// Draw `min(n, k)` distinct indices from `[0, n)`, ascending.
    ///
    /// Selection sampling: each candidate index consumes exactly one draw
    /// until the quota is filled, so the stream advances the same way as a
    /// linear scan over the input.
    pub fn sample(&mut self, n: usize, k: usize) -> Vec<usize> {
        let k = k.min(n);
        let mut out = Vec::with_capacity(k);
        for i in 0..n {
            let need = k - out.len();
            if need == 0 {
                break;
            }
            if self.rng.gen_range(0..n - i) < need {
                out.push(i);
            }
        }
        out
    }
}
