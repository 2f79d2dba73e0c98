//! Injectable time and randomness.
//!
//! Request signing needs a timestamp and a request id, and salted keys need
//! random letters. Both are drawn from an [`Entropy`] so tests can pin them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub trait Entropy: Send + Sync {
    /// Seconds since the Unix epoch.
    fn unix_time(&self) -> u64;
    fn random_u32(&self) -> u32;
    /// One ASCII letter, upper or lower case.
    fn random_letter(&self) -> char;
}

/// Wall clock plus the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEntropy;

impl Entropy for SystemEntropy {
    fn unix_time(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn random_u32(&self) -> u32 {
        rand::thread_rng().gen()
    }

    fn random_letter(&self) -> char {
        LETTERS[rand::thread_rng().gen_range(0..LETTERS.len())] as char
    }
}

/// Deterministic entropy: a seeded RNG and a fixed clock.
pub struct SeededEntropy {
    rng: Mutex<StdRng>,
    time: u64,
}

impl SeededEntropy {
    pub fn new(seed: u64, time: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            time,
        }
    }
}

impl Entropy for SeededEntropy {
    fn unix_time(&self) -> u64 {
        self.time
    }

    fn random_u32(&self) -> u32 {
        self.rng.lock().unwrap_or_else(|e| e.into_inner()).gen()
    }

    fn random_letter(&self) -> char {
        let idx = self
            .rng
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .gen_range(0..LETTERS.len());
        LETTERS[idx] as char
    }
}
