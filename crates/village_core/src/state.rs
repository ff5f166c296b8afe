//! The full game state aggregate.
//!
//! [`GameState`] owns every entity the engine mutates. Derived values
//! (capacities, production, army housing, defense) are recomputed from it on
//! demand rather than cached.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::campaign::CampaignProgress;
use crate::clan_castle::ClanCastle;
use crate::clock::Timestamp;
use crate::config::GameConfig;
use crate::data::StructureKind;
use crate::donations::DonationBoard;
use crate::economy::{Capacity, Production, ResourceState};
use crate::heroes::{default_heroes, Hero, HeroJob};
use crate::history::{BattleRecord, MessageLog, RingBuffer, BATTLE_HISTORY_CAPACITY};
use crate::invasion::InvasionState;
use crate::neighbors::{initial_cohort, Neighbor};
use crate::obstacles::Grove;
use crate::scheduler::EventQueue;
use crate::structures::{army_capacity, default_structures, defense_power, Structure};
use crate::training::{army_population, default_units, TrainingQueue, Unit};
use crate::workers::WorkerPool;

/// UI colour scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Light scheme.
    #[default]
    Light,
    /// Dark scheme.
    Dark,
}

impl ThemeMode {
    /// The other scheme.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

/// Last run of each periodic sweep. `None` means "never", and the first
/// advance anchors it without running the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SweepTimers {
    /// Favor drift, neighbor invasions and donation requests.
    pub drift_at: Option<Timestamp>,
    /// Worker fatigue and the NPC invasion roll.
    pub fatigue_at: Option<Timestamp>,
    /// Neighbor population growth.
    pub neighbor_growth_at: Option<Timestamp>,
    /// Obstacle growth.
    pub tree_growth_at: Option<Timestamp>,
}

impl SweepTimers {
    /// Every sweep anchored at `now`.
    #[must_use]
    pub const fn anchored(now: Timestamp) -> Self {
        Self {
            drift_at: Some(now),
            fatigue_at: Some(now),
            neighbor_growth_at: Some(now),
            tree_growth_at: Some(now),
        }
    }
}

/// Everything the simulation owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
    /// Player progression tier, republished by town hall upgrades.
    pub town_level: u32,
    /// Global production multiplier.
    pub multiplier: u32,
    /// UI colour scheme, persisted with the save.
    pub theme_mode: ThemeMode,
    /// Currency balances.
    pub resources: ResourceState,
    /// Structure registry.
    pub structures: Vec<Structure>,
    /// Workers and their upgrade jobs.
    pub workers: WorkerPool,
    /// Owned troop types.
    pub units: Vec<Unit>,
    /// Training queue.
    pub training: TrainingQueue,
    /// Heroes.
    pub heroes: Vec<Hero>,
    /// Hero upgrade queue.
    pub hero_jobs: Vec<HeroJob>,
    /// Clan castle.
    pub clan_castle: ClanCastle,
    /// Neighbor population, in id order.
    pub neighbors: Vec<Neighbor>,
    /// Open donation requests.
    pub donations: DonationBoard,
    /// Active invasions and NPC invasion history.
    pub invasions: InvasionState,
    /// Deferred one-shot events.
    pub events: EventQueue,
    /// Obstacles.
    pub grove: Grove,
    /// Campaign progress.
    pub campaign: CampaignProgress,
    /// Notifications.
    pub messages: MessageLog,
    /// Settled raids and neighbor invasions, newest first.
    pub battle_history: RingBuffer<BattleRecord, BATTLE_HISTORY_CAPACITY>,
    /// Next battle record id.
    pub next_battle_id: u64,
    /// Periodic sweep anchors.
    pub timers: SweepTimers,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            town_level: 1,
            multiplier: 1,
            theme_mode: ThemeMode::default(),
            resources: ResourceState::default(),
            structures: default_structures(),
            workers: WorkerPool::default(),
            units: default_units(),
            training: TrainingQueue::default(),
            heroes: default_heroes(),
            hero_jobs: Vec::new(),
            clan_castle: ClanCastle::default(),
            neighbors: Vec::new(),
            donations: DonationBoard::default(),
            invasions: InvasionState::default(),
            events: EventQueue::default(),
            grove: Grove::default(),
            campaign: CampaignProgress::default(),
            messages: MessageLog::default(),
            battle_history: RingBuffer::default(),
            next_battle_id: 0,
            timers: SweepTimers::default(),
        }
    }
}

impl GameState {
    /// A new village at `now` with the starting neighbor cohort.
    pub fn new<R: RngCore + ?Sized>(config: &GameConfig, now: Timestamp, rng: &mut R) -> Self {
        Self {
            resources: ResourceState::new(now),
            neighbors: initial_cohort(config.initial_neighbors, now, rng),
            timers: SweepTimers::anchored(now),
            ..Self::default()
        }
    }

    /// Storage ceilings.
    #[must_use]
    pub fn capacity(&self) -> Capacity {
        Capacity::derive(&self.structures, self.town_level)
    }

    /// Production per minute.
    #[must_use]
    pub fn production(&self) -> Production {
        Production::derive(&self.structures, self.town_level, self.multiplier)
    }

    /// Army housing from barracks.
    #[must_use]
    pub fn army_capacity(&self) -> u64 {
        army_capacity(&self.structures)
    }

    /// Housing used by owned units.
    #[must_use]
    pub fn army_population(&self) -> u64 {
        army_population(&self.units)
    }

    /// Village defense power, in tenths.
    #[must_use]
    pub fn defense_deci(&self) -> u64 {
        defense_power(&self.structures, self.town_level) * 10
    }

    /// Defensive structures as `(kind, level)`, for battle narratives.
    #[must_use]
    pub fn defenses(&self) -> Vec<(StructureKind, u32)> {
        self.structures
            .iter()
            .filter(|s| s.kind.base_defense().is_some())
            .map(|s| (s.kind, s.level))
            .collect()
    }

    /// Allocate the next battle record id.
    pub fn next_battle_id(&mut self) -> u64 {
        self.next_battle_id += 1;
        self.next_battle_id
    }

    /// Hash of the full state.
    ///
    /// Two states with identical content produce identical hashes, so a
    /// replayed session can be checked against its original.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        match bincode::serialize(self) {
            Ok(bytes) => bytes.hash(&mut hasher),
            Err(e) => {
                tracing::warn!(error = %e, "State hash fell back to empty encoding");
                0u8.hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Panics when a ledger or worker invariant no longer holds.
    #[cfg(feature = "debug-validation")]
    pub fn assert_invariants(&self) {
        let capacity = self.capacity();
        for kind in crate::economy::ResourceKind::ALL {
            assert!(
                self.resources.balance(kind) <= capacity.of(kind),
                "{kind} balance above capacity"
            );
        }
        let bound = self.workers.jobs.iter().filter(|j| j.worker_id.is_some()).count();
        assert_eq!(self.workers.idle_count() + bound, self.workers.workers.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn test_new_village() {
        let state = GameState::new(&GameConfig::default(), 1_000, &mut StepRng::new(0, 0));
        assert_eq!(state.town_level, 1);
        assert_eq!(state.neighbors.len(), 10);
        assert_eq!(state.resources.last_collect_at, 1_000);
        assert_eq!(state.timers.drift_at, Some(1_000));
        assert_eq!(state.production().gold, 20);
        assert_eq!(state.army_capacity(), 15);
        assert_eq!(state.defense_deci(), 300);
        assert_eq!(state.defenses(), vec![(StructureKind::Cannon, 1)]);
    }

    #[test]
    fn test_hash_tracks_content() {
        let config = GameConfig::default();
        let a = GameState::new(&config, 0, &mut StepRng::new(0, 0));
        let mut b = GameState::new(&config, 0, &mut StepRng::new(0, 0));
        assert_eq!(a.state_hash(), b.state_hash());
        b.resources.gold += 1;
        assert_ne!(a.state_hash(), b.state_hash());
    }
}
