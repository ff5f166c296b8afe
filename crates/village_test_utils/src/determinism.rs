//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the engine produces identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! A seeded session must replay exactly. Sources of divergence include:
//!
//! - **Floating-point math**: We use fixed-point arithmetic via
//!   [`village_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: State collections are `Vec`s kept in id
//!   order, never hash maps.
//!
//! - **Ambient randomness**: The engine draws only from its injected
//!   generator.
//!
//! - **Wall-clock reads**: Time is always passed in.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use village_core::clock::Timestamp;
use village_core::config::GameConfig;
use village_core::engine::Engine;
use village_core::persistence::{restore, Snapshot};

/// Start time of harness sessions. Zero is reserved as the missing-timestamp
/// sentinel in saves.
pub const SESSION_START: Timestamp = 1_000;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps simulated.
    pub steps: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic session).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Session is non-deterministic!\n\
                 Runs: {}\n\
                 Steps: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a session multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the session
/// * `steps` - Number of steps per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance by one step, given the step index
/// * `hash` - Function to compute the state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    steps: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();
        for i in 0..steps {
            step(&mut state, i);
        }
        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// Advance a seeded engine `steps` times, `interval_ms` apart, on each of
/// `runs` fresh copies and compare final state hashes.
pub fn verify_engine_determinism(
    config: &GameConfig,
    seed: u64,
    runs: usize,
    steps: u64,
    interval_ms: u64,
) -> DeterminismResult {
    verify_determinism(
        runs,
        steps,
        || Engine::seeded(config.clone(), seed, SESSION_START),
        |engine, i| {
            engine.advance(SESSION_START + (i + 1) * interval_ms);
        },
        |engine| engine.state().state_hash(),
    )
}

/// Compare two seeded engines step by step, finding the first divergence.
///
/// # Returns
///
/// `None` if they stay identical, `Some(step)` at the first step whose hash
/// differs (0 for the initial state).
pub fn find_first_divergence(
    config: &GameConfig,
    seed: u64,
    steps: u64,
    interval_ms: u64,
) -> Option<u64> {
    let mut a = Engine::seeded(config.clone(), seed, SESSION_START);
    let mut b = Engine::seeded(config.clone(), seed, SESSION_START);

    if a.state().state_hash() != b.state().state_hash() {
        return Some(0);
    }

    for step in 1..=steps {
        let now = SESSION_START + step * interval_ms;
        a.advance(now);
        b.advance(now);
        if a.state().state_hash() != b.state().state_hash() {
            return Some(step);
        }
    }

    None
}

/// Verify that a snapshot round trip preserves an advanced session exactly.
pub fn verify_snapshot_round_trip(config: &GameConfig, seed: u64, until: Timestamp) -> bool {
    let mut engine = Engine::seeded(config.clone(), seed, SESSION_START);
    engine.advance(until);
    let hash_before = engine.state().state_hash();

    let Ok(raw) = Snapshot::capture(engine.state(), until).to_json() else {
        return false;
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let Ok(restored) = restore(&raw, config, until, &mut rng) else {
        return false;
    };

    restored.state_hash() == hash_before
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for engine inputs.
pub mod strategies {
    use proptest::prelude::*;
    use village_core::economy::ResourceKind;
    use village_core::math::{pct, Fixed};

    /// Any currency.
    pub fn arb_resource_kind() -> impl Strategy<Value = ResourceKind> {
        prop_oneof![
            Just(ResourceKind::Gold),
            Just(ResourceKind::Elixir),
            Just(ResourceKind::DarkElixir),
            Just(ResourceKind::Gems),
        ]
    }

    /// Favor, including values outside the clamped range.
    pub fn arb_raw_favor() -> impl Strategy<Value = i32> {
        -500i32..500
    }

    /// Power in tenths, from an empty army to a late-game one.
    pub fn arb_power_deci() -> impl Strategy<Value = u64> {
        0u64..200_000
    }

    /// A fraction in `[0, 1]`, in whole percent.
    pub fn arb_fraction() -> impl Strategy<Value = Fixed> {
        (0i32..=100).prop_map(pct)
    }

    /// Gaps between advances: mostly short, sometimes hours.
    pub fn arb_gap_ms() -> impl Strategy<Value = u64> {
        prop_oneof![
            4 => 0u64..10_000,
            2 => 10_000u64..600_000,
            1 => 600_000u64..20_000_000,
        ]
    }

    /// A sequence of advance gaps.
    pub fn arb_gaps(max_len: usize) -> impl Strategy<Value = Vec<u64>> {
        prop::collection::vec(arb_gap_ms(), 1..max_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::quiet_config;

    #[test]
    fn test_verify_determinism_basic() {
        let result = verify_determinism(
            3,
            10,
            || 0u64,
            |n, i| *n += i,
            |n| compute_hash(n),
        );
        result.assert_deterministic();
        assert_eq!(result.unique_hashes().len(), 1);
    }

    #[test]
    fn test_quiet_engine_is_deterministic() {
        verify_engine_determinism(&quiet_config(), 7, 2, 20, 30_000).assert_deterministic();
    }
}
