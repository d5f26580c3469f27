//! Critical-click rolls.
//!
//! The engine never calls a platform RNG directly; every roll goes through a
//! [`CritRoll`] so tests can pin the outcome.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Source of Bernoulli trials for critical clicks.
pub trait CritRoll {
    /// Returns true with probability `p`.
    fn roll(&mut self, p: f64) -> bool;
}

/// Seeded PCG stream used in play.
pub struct PcgRoll {
    inner: Pcg32,
}

impl PcgRoll {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Pcg32::seed_from_u64(seed),
        }
    }

    /// Seed from the environment: `Math.random()` in the browser, the clock elsewhere.
    pub fn from_entropy() -> Self {
        Self::new(session_seed())
    }
}

impl CritRoll for PcgRoll {
    fn roll(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.inner.gen_bool(p)
    }
}

/// Always returns the same outcome.
pub struct FixedRoll(pub bool);

impl CritRoll for FixedRoll {
    fn roll(&mut self, _p: f64) -> bool {
        self.0
    }
}

#[cfg(target_arch = "wasm32")]
fn session_seed() -> u64 {
    (js_sys::Math::random() * u64::MAX as f64) as u64
}

#[cfg(not(target_arch = "wasm32"))]
fn session_seed() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default() as u64
}
