use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Caller-owned random key. Every stochastic operation consumes one and returns its successor,
/// so the same key always reproduces the same draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RandomState {
    seed: u64,
    #[serde(default)]
    counter: u64,
}

impl RandomState {
    pub fn new(seed: u64) -> Self {
        Self { seed, counter: 0 }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Generator for this key together with the key that follows it.
    pub fn split(self) -> (RandomState, Xoshiro256PlusPlus) {
        let rng = Xoshiro256PlusPlus::seed_from_u64(mix(self.seed, self.counter));
        (self.next(), rng)
    }

    pub fn next(self) -> RandomState {
        Self {
            seed: self.seed,
            counter: self.counter.wrapping_add(1),
        }
    }
}

fn mix(seed: u64, counter: u64) -> u64 {
    splitmix64(seed ^ splitmix64(counter.wrapping_add(GOLDEN_GAMMA)))
}

fn splitmix64(value: u64) -> u64 {
    let mut z = value.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
