//! Balance sweeps for raid and invasion resolution.
//!
//! Runs thousands of seeded resolutions to check that win rates move the
//! way the power ratio says they should.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use village_core::combat::{resolve_defense, resolve_raid};

/// Aggregate of a sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BattleStats {
    /// Resolutions run.
    pub total: u32,
    /// Wins for the side under test.
    pub wins: u32,
    /// Stars summed over wins (raids only).
    pub stars: u32,
}

impl BattleStats {
    /// Win rate (0.0 to 1.0).
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.5;
        }
        f64::from(self.wins) / f64::from(self.total)
    }

    /// Average stars per win.
    #[must_use]
    pub fn avg_stars(&self) -> f64 {
        if self.wins == 0 {
            return 0.0;
        }
        f64::from(self.stars) / f64::from(self.wins)
    }

    /// Whether the win rate lies within `[min_rate, max_rate]`.
    #[must_use]
    pub fn is_within(&self, min_rate: f64, max_rate: f64) -> bool {
        let rate = self.win_rate();
        rate >= min_rate && rate <= max_rate
    }
}

/// Resolve `runs` raids of `attack` against `defense` (tenths).
#[must_use]
pub fn raid_sweep(attack: u64, defense: u64, runs: u32, seed: u64) -> BattleStats {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut stats = BattleStats::default();
    for _ in 0..runs {
        let outcome = resolve_raid(attack, defense, &mut rng);
        stats.total += 1;
        if outcome.victory {
            stats.wins += 1;
            stats.stars += u32::from(outcome.stars);
        }
    }
    tracing::debug!(attack, defense, win_rate = stats.win_rate(), "Raid sweep");
    stats
}

/// Resolve `runs` invasions of `attack` against `defense` (tenths), from
/// the defender's side.
#[must_use]
pub fn defense_sweep(defense: u64, attack: u64, runs: u32, seed: u64) -> BattleStats {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut stats = BattleStats::default();
    for _ in 0..runs {
        stats.total += 1;
        if resolve_defense(defense, attack, &mut rng).defended {
            stats.wins += 1;
        }
    }
    tracing::debug!(defense, attack, win_rate = stats.win_rate(), "Defense sweep");
    stats
}

/// Raid win rate for each attack-to-defense multiple in `multiples`
/// (tenths), against a fixed defense.
#[must_use]
pub fn raid_curve(defense: u64, multiples: &[u64], runs: u32, seed: u64) -> Vec<(u64, f64)> {
    multiples
        .iter()
        .map(|&m| (m, raid_sweep(defense * m / 10, defense, runs, seed).win_rate()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_raid_is_a_coin_flip() {
        let stats = raid_sweep(1_000, 1_000, 2_000, 3);
        assert!(stats.is_within(0.35, 0.65), "{stats:?}");
    }

    #[test]
    fn test_overwhelming_raid_always_wins() {
        let stats = raid_sweep(10_000, 1_000, 500, 3);
        assert_eq!(stats.wins, 500);
        assert!(stats.avg_stars() >= 2.0);
    }

    #[test]
    fn test_raid_curve_is_monotonic() {
        let curve = raid_curve(1_000, &[5, 8, 10, 12, 20], 1_000, 11);
        for pair in curve.windows(2) {
            assert!(pair[0].1 <= pair[1].1, "{curve:?}");
        }
    }

    #[test]
    fn test_weak_defense_falls() {
        let stats = defense_sweep(100, 2_000, 500, 5);
        assert_eq!(stats.wins, 0);
    }
}
