//! Sources of randomness for the mock port's generation loop.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::ops::Range;
use std::time::Duration;

/// Seed used when the caller does not pick one.
pub const DEFAULT_SEED: u64 = 1;

/// Delay between bursts, in milliseconds (upper bound exclusive).
pub const DELAY_MS: Range<u64> = 1000..5000;

/// Burst length in bytes (upper bound exclusive).
pub const BURST_LEN: Range<usize> = 1..32;

/// Decides when the next burst arrives and what it contains.
///
/// The loop always asks for the delay first and only draws the burst once the
/// delay has elapsed and the port is still open.
pub trait BurstGenerator: Send + 'static {
    fn next_delay(&mut self) -> Duration;
    fn next_burst(&mut self) -> Vec<u8>;
}

/// Uniformly random bursts drawn from a single RNG.
#[derive(Debug, Clone)]
pub struct SeededBursts<R = ChaCha8Rng> {
    rng: R,
}

impl SeededBursts<ChaCha8Rng> {
    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl Default for SeededBursts<ChaCha8Rng> {
    fn default() -> Self {
        Self::from_seed(DEFAULT_SEED)
    }
}

impl<R: Rng> SeededBursts<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send + 'static> BurstGenerator for SeededBursts<R> {
    fn next_delay(&mut self) -> Duration {
        Duration::from_millis(self.rng.gen_range(DELAY_MS))
    }

    fn next_burst(&mut self) -> Vec<u8> {
        let len = self.rng.gen_range(BURST_LEN);
        (0..len).map(|_| self.rng.gen::<u8>()).collect()
    }
}
