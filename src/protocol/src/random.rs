//! Randomness service for argument expansion and nonces
//!
//! One instance is seeded at process start and shared by every worker that
//! builds proposals; the generator sits behind a mutex so draws are safe from
//! any task.

use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use uuid::Uuid;

/// Length of the nonce placed in every signature header
pub const NONCE_SIZE: usize = 24;

pub struct RandomSource {
    rng: Mutex<StdRng>,
}

impl RandomSource {
    /// Seed from operating system entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic source for reproducible runs and tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Random `[A-Za-z0-9]` string of exactly `len` characters
    pub fn alphanumeric(&self, len: usize) -> String {
        let mut rng = self.rng.lock();
        (0..len).map(|_| rng.sample(Alphanumeric) as char).collect()
    }

    /// Uniform value in `[low, high]`
    pub fn usize_inclusive(&self, low: usize, high: usize) -> usize {
        self.rng.lock().gen_range(low..=high)
    }

    /// Uniform value in `[low, high)`; callers guarantee `low < high`
    pub fn i64_in(&self, low: i64, high: i64) -> i64 {
        self.rng.lock().gen_range(low..high)
    }

    /// Random (version 4) UUID
    pub fn uuid(&self) -> Uuid {
        let mut bytes = [0u8; 16];
        self.rng.lock().fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }

    pub fn nonce(&self) -> Vec<u8> {
        let mut nonce = vec![0u8; NONCE_SIZE];
        self.rng.lock().fill_bytes(&mut nonce);
        nonce
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::from_entropy()
    }
}
