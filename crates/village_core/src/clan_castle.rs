//! Clan castle: a singleton structure outside the registry.
//!
//! It upgrades through the same worker pool as ordinary structures (keyed by
//! [`UpgradeTarget::CLAN_CASTLE`](crate::workers::UpgradeTarget::CLAN_CASTLE))
//! and holds reinforcement troops donated on request.

use serde::{Deserialize, Serialize};

use crate::clock::{remaining_secs, Timestamp};
use crate::error::{CommandError, CommandResult, Target};
use crate::math::roll_inclusive;
use crate::training::Unit;

/// Highest clan castle level.
pub const MAX_LEVEL: u32 = 6;

/// Per-level stats: `(capacity, gold cost, build seconds, town level required)`.
const LEVELS: [(u64, u64, u64, u32); 6] = [
    (10, 10_000, 300, 5),
    (15, 50_000, 600, 5),
    (20, 100_000, 900, 6),
    (25, 200_000, 1_200, 7),
    (30, 500_000, 1_800, 8),
    (35, 1_000_000, 2_700, 9),
];

fn level_stats(level: u32) -> Option<(u64, u64, u64, u32)> {
    level
        .checked_sub(1)
        .and_then(|i| LEVELS.get(i as usize))
        .copied()
}

/// A stack of donated troops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reinforcement {
    /// Unit name.
    pub name: String,
    /// Donated level.
    pub level: u32,
    /// Number in the stack.
    pub count: u32,
    /// Housing space per unit.
    #[serde(default = "one", alias = "population")]
    pub population_cost: u32,
}

const fn one() -> u32 {
    1
}

/// Next clan castle upgrade, as validated by [`ClanCastle::plan_upgrade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradePlan {
    /// Level reached on completion.
    pub next_level: u32,
    /// Gold to charge.
    pub gold_cost: u64,
    /// Duration in seconds.
    pub seconds: u64,
}

/// Clan castle state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClanCastle {
    /// 0 until built.
    pub level: u32,
    /// Reinforcement stacks.
    pub troops: Vec<Reinforcement>,
    /// Time of the last reinforcement request.
    #[serde(alias = "lastRequestTime")]
    pub last_request_at: Option<Timestamp>,
}

impl ClanCastle {
    /// Reinforcement housing at the current level.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        level_stats(self.level).map_or(0, |(cap, ..)| cap)
    }

    /// Housing used by reinforcements.
    #[must_use]
    pub fn population(&self) -> u64 {
        self.troops
            .iter()
            .map(|t| u64::from(t.population_cost) * u64::from(t.count))
            .sum()
    }

    /// Label a worker carries while building or upgrading the castle.
    #[must_use]
    pub fn task_label(&self) -> &'static str {
        if self.level == 0 {
            "Build Clan Castle"
        } else {
            "Upgrade Clan Castle"
        }
    }

    /// Validate the next upgrade against town level and gold.
    ///
    /// # Errors
    ///
    /// Max level, town level gate, or insufficient gold.
    pub fn plan_upgrade(&self, town_level: u32, gold: u64) -> CommandResult<UpgradePlan> {
        let next_level = self.level + 1;
        let (_, gold_cost, seconds, required) =
            level_stats(next_level).ok_or(CommandError::MaxLevel {
                max_level: MAX_LEVEL,
            })?;
        if town_level < required {
            return Err(CommandError::TownLevelTooLow { required });
        }
        if gold < gold_cost {
            return Err(CommandError::InsufficientResource {
                resource: crate::economy::ResourceKind::Gold,
                required: gold_cost,
                available: gold,
            });
        }
        Ok(UpgradePlan {
            next_level,
            gold_cost,
            seconds,
        })
    }

    /// Ask for `count` donated units of `name`. Returns the donated level.
    ///
    /// # Errors
    ///
    /// Castle not built, request on cooldown, unit unknown, or not enough
    /// housing left.
    pub fn request<R: rand::RngCore + ?Sized>(
        &mut self,
        units: &[Unit],
        name: &str,
        count: u32,
        now: Timestamp,
        cooldown_ms: u64,
        rng: &mut R,
    ) -> CommandResult<u32> {
        if self.level == 0 {
            return Err(CommandError::Locked("clan castle not built"));
        }
        if count == 0 {
            return Err(CommandError::InvalidValue("count must be positive"));
        }
        if let Some(last) = self.last_request_at {
            let ready_at = last + cooldown_ms;
            if now < ready_at {
                return Err(CommandError::Cooldown {
                    remaining_secs: remaining_secs(ready_at, now),
                });
            }
        }
        let unit = units
            .iter()
            .find(|u| u.name == name)
            .ok_or(CommandError::InvalidValue("unknown unit"))?;
        let population_cost = unit.population_cost.max(1);
        let requested = u64::from(population_cost) * u64::from(count);
        let used = self.population();
        let capacity = self.capacity();
        if used + requested > capacity {
            return Err(CommandError::CapacityExceeded {
                used,
                requested,
                capacity,
            });
        }

        let level = roll_inclusive(rng, 1, 3);
        match self
            .troops
            .iter_mut()
            .find(|t| t.name == name && t.level == level)
        {
            Some(stack) => stack.count += count,
            None => self.troops.push(Reinforcement {
                name: name.to_string(),
                level,
                count,
                population_cost,
            }),
        }
        self.last_request_at = Some(now);
        Ok(level)
    }

    /// Remove up to `count` units from a stack.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotFound`] if no stack matches.
    pub fn remove(&mut self, name: &str, level: u32, count: u32) -> CommandResult<()> {
        let index = self
            .troops
            .iter()
            .position(|t| t.name == name && t.level == level)
            .ok_or_else(|| CommandError::not_found(Target::Reinforcement, level))?;
        if self.troops[index].count <= count {
            self.troops.remove(index);
        } else {
            self.troops[index].count -= count;
        }
        Ok(())
    }

    /// Drop every reinforcement.
    pub fn clear(&mut self) {
        self.troops.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::default_units;
    use rand::rngs::mock::StepRng;

    fn built(level: u32) -> ClanCastle {
        ClanCastle {
            level,
            ..ClanCastle::default()
        }
    }

    #[test]
    fn test_plan_upgrade_gates() {
        let castle = ClanCastle::default();
        assert_eq!(
            castle.plan_upgrade(4, 1_000_000),
            Err(CommandError::TownLevelTooLow { required: 5 })
        );
        assert!(matches!(
            castle.plan_upgrade(5, 9_999),
            Err(CommandError::InsufficientResource { .. })
        ));
        let plan = castle.plan_upgrade(5, 10_000).unwrap();
        assert_eq!((plan.next_level, plan.gold_cost, plan.seconds), (1, 10_000, 300));
        assert_eq!(
            built(6).plan_upgrade(9, u64::MAX),
            Err(CommandError::MaxLevel { max_level: 6 })
        );
    }

    #[test]
    fn test_request_requires_castle() {
        let mut castle = ClanCastle::default();
        let mut rng = StepRng::new(0, 0);
        assert!(matches!(
            castle.request(&default_units(), "Archer", 1, 0, 25_000, &mut rng),
            Err(CommandError::Locked(_))
        ));
    }

    #[test]
    fn test_request_cooldown_and_capacity() {
        let mut castle = built(1);
        let units = default_units();
        let mut rng = StepRng::new(u64::MAX, 0);
        assert_eq!(castle.request(&units, "Giant", 1, 0, 25_000, &mut rng), Ok(3));
        assert_eq!(
            castle.request(&units, "Archer", 1, 10_000, 25_000, &mut rng),
            Err(CommandError::Cooldown { remaining_secs: 15 })
        );
        assert_eq!(
            castle.request(&units, "Giant", 2, 25_000, 25_000, &mut rng),
            Err(CommandError::CapacityExceeded {
                used: 5,
                requested: 10,
                capacity: 10
            })
        );
        assert_eq!(castle.request(&units, "Giant", 1, 25_000, 25_000, &mut rng), Ok(3));
        assert_eq!(castle.population(), 10);
    }

    #[test]
    fn test_stacks_merge_by_name_and_level() {
        let mut castle = built(2);
        let units = default_units();
        let mut rng = StepRng::new(0, 0);
        castle.request(&units, "Archer", 2, 0, 0, &mut rng).unwrap();
        castle.request(&units, "Archer", 3, 0, 0, &mut rng).unwrap();
        assert_eq!(castle.troops.len(), 1);
        assert_eq!(castle.population(), 5);

        castle.remove("Archer", 1, 2).unwrap();
        assert_eq!(castle.troops[0].count, 3);
        castle.remove("Archer", 1, 10).unwrap();
        assert!(castle.troops.is_empty());
        assert!(castle.remove("Archer", 1, 1).is_err());
    }
}
