//! Account number generation
//!
//! Candidates only; uniqueness is checked by the account service.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::domain::AccountNumber;

/// Source of candidate account numbers
pub trait AccountNumberGenerator: Send + Sync {
    fn next_number(&self) -> AccountNumber;
}

/// Uniform random ten-digit numbers
#[derive(Debug)]
pub struct RandomAccountNumberGenerator {
    rng: Mutex<StdRng>,
}

impl RandomAccountNumberGenerator {
    /// Seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence for a given seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomAccountNumberGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountNumberGenerator for RandomAccountNumberGenerator {
    fn next_number(&self) -> AccountNumber {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        AccountNumber::random(&mut *rng)
    }
}
