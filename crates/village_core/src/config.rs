//! Tuned timing constants for the simulation.
//!
//! Every field has a default, so a config file only needs to list the values
//! it overrides.
//!
//! # Example RON
//!
//! ```ron
//! GameConfig(
//!     drift_interval_ms: 300000,
//!     max_neighbors: 256,
//! )
//! ```

use serde::{Deserialize, Serialize};

use crate::clock::{MS_PER_HOUR, MS_PER_MINUTE, MS_PER_SECOND};
use crate::error::{GameError, Result};

/// Timing and population constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Minimum elapsed time before a resource collection commits.
    pub collect_threshold_ms: u64,
    /// Interval between neighbor favor drift sweeps.
    pub drift_interval_ms: u64,
    /// Interval between worker fatigue updates.
    pub fatigue_interval_ms: u64,
    /// One new neighbor appears per interval.
    pub neighbor_growth_interval_ms: u64,
    /// Neighbors generated for a fresh world.
    pub initial_neighbors: u32,
    /// Hard population ceiling for neighbors.
    pub max_neighbors: u32,
    /// Unanswered donation requests expire after this long.
    pub donation_expiry_ms: u64,
    /// Chance per drift sweep that a new donation request appears.
    pub donation_chance_pct: u32,
    /// Cooldown between aid requests to the same neighbor.
    pub aid_cooldown_ms: u64,
    /// Quiet period before a debounced save is written.
    pub autosave_quiet_ms: u64,
    /// Delay between a neighbor invasion alert and its resolution.
    pub invasion_resolve_delay_ms: u64,
    /// Delay between an NPC invasion trigger and its resolution.
    pub npc_resolve_delay_ms: u64,
    /// How long a resolved invasion stays active for display.
    pub invasion_display_ms: u64,
    /// Minimum gap between NPC invasions.
    pub npc_invasion_cooldown_ms: u64,
    /// Interval between tree growth rolls.
    pub tree_growth_interval_ms: u64,
    /// Maximum number of trees in the village.
    pub max_trees: u32,
    /// Cooldown between clan castle reinforcement requests.
    pub reinforcement_cooldown_ms: u64,
    /// Cooldown after a campaign attempt.
    pub campaign_cooldown_ms: u64,
    /// Storage key holding the snapshot.
    pub save_key: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            collect_threshold_ms: 6 * MS_PER_SECOND,
            drift_interval_ms: MS_PER_MINUTE,
            fatigue_interval_ms: MS_PER_MINUTE,
            neighbor_growth_interval_ms: MS_PER_MINUTE,
            initial_neighbors: 10,
            max_neighbors: 1024,
            donation_expiry_ms: 3 * MS_PER_MINUTE,
            donation_chance_pct: 30,
            aid_cooldown_ms: MS_PER_HOUR,
            autosave_quiet_ms: MS_PER_SECOND,
            invasion_resolve_delay_ms: 3 * MS_PER_SECOND,
            npc_resolve_delay_ms: 100,
            invasion_display_ms: 3 * MS_PER_SECOND,
            npc_invasion_cooldown_ms: 5 * MS_PER_MINUTE,
            tree_growth_interval_ms: MS_PER_MINUTE,
            max_trees: 10,
            reinforcement_cooldown_ms: 25 * MS_PER_SECOND,
            campaign_cooldown_ms: 10 * MS_PER_MINUTE,
            save_key: "village-sim-save".to_string(),
        }
    }
}

impl GameConfig {
    /// Parse a config from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ConfigParse`] if the text is not valid RON for
    /// this struct or a value is out of range.
    pub fn from_ron(source: &str, label: &str) -> Result<Self> {
        let config: Self = ron::from_str(source).map_err(|e| GameError::ConfigParse {
            path: label.to_string(),
            message: e.to_string(),
        })?;
        config.validate().map_err(|message| GameError::ConfigParse {
            path: label.to_string(),
            message,
        })?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.initial_neighbors > self.max_neighbors {
            return Err(format!(
                "initial_neighbors ({}) exceeds max_neighbors ({})",
                self.initial_neighbors, self.max_neighbors
            ));
        }
        if self.donation_chance_pct > 100 {
            return Err("donation_chance_pct must be at most 100".to_string());
        }
        let intervals = [
            ("drift_interval_ms", self.drift_interval_ms),
            ("fatigue_interval_ms", self.fatigue_interval_ms),
            ("neighbor_growth_interval_ms", self.neighbor_growth_interval_ms),
            ("tree_growth_interval_ms", self.tree_growth_interval_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(format!("{name} must be non-zero"));
        }
        if self.save_key.is_empty() {
            return Err("save_key must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(GameConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_ron_overrides() {
        let config =
            GameConfig::from_ron("GameConfig(drift_interval_ms: 5000, max_trees: 3)", "inline")
                .unwrap();
        assert_eq!(config.drift_interval_ms, 5_000);
        assert_eq!(config.max_trees, 3);
        assert_eq!(config.max_neighbors, 1024);
    }

    #[test]
    fn test_invalid_ron_rejected() {
        let err = GameConfig::from_ron("GameConfig(drift_interval_ms: \"x\")", "bad.ron")
            .unwrap_err();
        assert!(err.to_string().contains("bad.ron"));

        let err = GameConfig::from_ron("GameConfig(initial_neighbors: 50, max_neighbors: 5)", "x")
            .unwrap_err();
        assert!(matches!(err, GameError::ConfigParse { .. }));
    }
}
