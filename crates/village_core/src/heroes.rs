//! Heroes and their upgrade queue.
//!
//! Hero upgrades mirror structure upgrades but bypass the worker pool. A hero
//! at level 0 is not yet summoned; its first upgrade brings it to level 1.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Timestamp, MS_PER_SECOND};
use crate::error::{CommandError, CommandResult, Target};

/// Hero identifier.
pub type HeroId = u32;

/// Barbarian King id.
pub const BARBARIAN_KING: HeroId = 1;
/// Archer Queen id.
pub const ARCHER_QUEEN: HeroId = 2;

/// A hero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hero {
    /// Identifier.
    pub id: HeroId,
    /// Display name.
    pub name: String,
    /// Current level; 0 until summoned.
    #[serde(default)]
    pub level: u32,
    /// Absolute level cap.
    #[serde(default)]
    pub max_level: u32,
    /// Town level needed to summon.
    #[serde(default, alias = "unlockTH")]
    pub unlock_threshold: u32,
    /// Whether an upgrade is in flight.
    #[serde(default)]
    pub upgrading: bool,
    /// End of the in-flight upgrade.
    #[serde(default, alias = "upgradeEndTime")]
    pub upgrade_end_at: Option<Timestamp>,
}

impl Hero {
    /// Highest level reachable at `town_level`.
    #[must_use]
    pub fn level_cap(&self, town_level: u32) -> u32 {
        if town_level < self.unlock_threshold {
            return 0;
        }
        let cap = match (self.id, town_level) {
            (BARBARIAN_KING, 7) => 5,
            (BARBARIAN_KING, 8) => 10,
            _ => self.max_level,
        };
        cap.min(self.max_level)
    }

    /// Upgrade duration in seconds from the current level.
    #[must_use]
    pub fn upgrade_seconds(&self) -> u64 {
        let table: &[u64] = match self.id {
            BARBARIAN_KING => &[300, 600, 900, 1200, 1800],
            ARCHER_QUEEN => &[600, 900, 1200, 1800],
            _ => &[600],
        };
        table
            .get(self.level as usize)
            .or_else(|| table.last())
            .copied()
            .unwrap_or(600)
    }
}

/// The two heroes, unsummoned.
#[must_use]
pub fn default_heroes() -> Vec<Hero> {
    vec![
        Hero {
            id: BARBARIAN_KING,
            name: "Barbarian King".to_string(),
            level: 0,
            max_level: 20,
            unlock_threshold: 7,
            upgrading: false,
            upgrade_end_at: None,
        },
        Hero {
            id: ARCHER_QUEEN,
            name: "Archer Queen".to_string(),
            level: 0,
            max_level: 10,
            unlock_threshold: 9,
            upgrading: false,
            upgrade_end_at: None,
        },
    ]
}

/// An in-flight hero upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroJob {
    /// Hero being upgraded.
    pub hero_id: HeroId,
    /// Level reached on completion.
    pub target_level: u32,
    /// When the job started.
    #[serde(default)]
    pub started_at: Timestamp,
    /// When the job completes.
    pub end_at: Timestamp,
}

/// Start a hero upgrade. Returns the job's end time.
///
/// # Errors
///
/// Unknown hero, town level below the unlock threshold, already upgrading,
/// or already at the cap for the current town level.
pub fn start_upgrade(
    heroes: &mut [Hero],
    queue: &mut Vec<HeroJob>,
    id: HeroId,
    town_level: u32,
    now: Timestamp,
) -> CommandResult<Timestamp> {
    let hero = heroes
        .iter_mut()
        .find(|h| h.id == id)
        .ok_or_else(|| CommandError::not_found(Target::Hero, id))?;
    if town_level < hero.unlock_threshold {
        return Err(CommandError::TownLevelTooLow {
            required: hero.unlock_threshold,
        });
    }
    if hero.upgrading {
        return Err(CommandError::AlreadyUpgrading);
    }
    let cap = hero.level_cap(town_level);
    if hero.level >= cap {
        return Err(CommandError::MaxLevel { max_level: cap });
    }
    let end_at = now + hero.upgrade_seconds() * MS_PER_SECOND;
    hero.upgrading = true;
    hero.upgrade_end_at = Some(end_at);
    queue.push(HeroJob {
        hero_id: id,
        target_level: hero.level + 1,
        started_at: now,
        end_at,
    });
    Ok(end_at)
}

/// Complete every hero job due at `now`. Returns `(hero id, new level)` pairs.
pub fn tick(heroes: &mut [Hero], queue: &mut Vec<HeroJob>, now: Timestamp) -> Vec<(HeroId, u32)> {
    let mut done = Vec::new();
    queue.retain(|job| {
        if job.end_at > now {
            return true;
        }
        if let Some(hero) = heroes.iter_mut().find(|h| h.id == job.hero_id) {
            hero.level = (hero.level + 1).min(hero.max_level);
            hero.upgrading = false;
            hero.upgrade_end_at = None;
            debug!(hero = %hero.name, level = hero.level, "Hero upgrade complete");
            done.push((hero.id, hero.level));
        }
        false
    });
    done
}
