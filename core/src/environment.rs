//! Injectable environment: time and randomness.
//!
//! Orchestration code never calls `Utc::now()` or `thread_rng()` directly.
//! Production wires [`SystemClock`] and [`ThreadRandom`]; tests wire fixed
//! implementations from the testing crate.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::{Rng, RngCore};

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```ignore
/// // Test - fixed time for deterministic tests
/// struct FixedClock { time: DateTime<Utc> }
/// impl Clock for FixedClock {
///     fn now(&self) -> DateTime<Utc> {
///         self.time
///     }
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of randomness for member shuffling and share codes.
pub trait RandomSource: Send + Sync {
    /// Uniform integer in `0..bound`. `bound` is never zero.
    fn below(&self, bound: usize) -> usize;

    /// Fill `dest` with random bytes.
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// Thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn below(&self, bound: usize) -> usize {
        rand::thread_rng().gen_range(0..bound)
    }

    fn fill_bytes(&self, dest: &mut [u8]) {
        rand::thread_rng().fill_bytes(dest);
    }
}

/// Fisher–Yates shuffle driven by `rng`.
pub fn shuffle<T>(rng: &dyn RandomSource, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = rng.below(i + 1);
        items.swap(i, j);
    }
}

/// URL-safe base64 of `nbytes` random bytes, without padding.
///
/// Six bytes encode to exactly eight characters.
#[must_use]
pub fn token_urlsafe(rng: &dyn RandomSource, nbytes: usize) -> String {
    let mut buf = vec![0u8; nbytes];
    rng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}
