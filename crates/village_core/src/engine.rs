//! The simulation engine.
//!
//! [`Engine`] owns the [`GameState`], the injected random source, and the
//! persistence coordinator. The host calls [`Engine::advance`] on whatever
//! cadence it likes; every call catches up on all time elapsed since the
//! previous one. Player commands are methods returning
//! [`CommandResult`]; a successful command marks the state dirty for the
//! debounced autosave.
//!
//! # Advance Order
//!
//! 1. **Collect** accrued production
//! 2. **Completions** of upgrades, training and hero jobs
//! 3. **Scheduled events** that have come due
//! 4. **Neighbor growth** and strength recomputation
//! 5. **Fatigue** sweeps, then the NPC invasion roll
//! 6. **Drift** sweeps with neighbor invasions and donation requests
//! 7. **Donation expiry** and **tree growth**
//! 8. **Autosave** if the quiet interval has passed
//!
//! Completions run before any probabilistic trigger, so triggers see
//! post-completion state.
//!
//! # Example
//!
//! ```
//! use village_core::config::GameConfig;
//! use village_core::engine::Engine;
//!
//! let mut engine = Engine::seeded(GameConfig::default(), 42, 0);
//! engine.advance(60_000);
//! assert_eq!(engine.state().resources.gold, 520);
//! ```

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::battle_log::{defense_log, raid_log, DefenseReport, RaidReport};
use crate::clan_castle::MAX_LEVEL as CLAN_CASTLE_MAX_LEVEL;
use crate::clock::{Timestamp, MS_PER_SECOND};
use crate::combat::{
    apply_troop_losses, attack_power_deci, deployable, raid_loot, resolve_raid, whole,
};
use crate::config::GameConfig;
use crate::data::{donation_recipe, StructureKind};
use crate::donations::Expired;
use crate::economy::{Collected, ResourceKind};
use crate::error::{CommandError, CommandResult, Target};
use crate::heroes::{self, HeroId};
use crate::history::{BattleKind, BattleRecord, InvasionRecord, LootDelta, MessageKind, MessagePayload};
use crate::invasion::{neighbor_invasion_chance, resolve_neighbor, resolve_npc, NeighborInvasion};
use crate::math::{chance, whole_percent};
use crate::neighbors::{self, GiftKind, NeighborId};
use crate::obstacles::{roll_gems, REMOVAL_COST_ELIXIR};
use crate::persistence::{MemoryStorage, PersistenceCoordinator, StoragePort};
use crate::relations::{self, shift_favor, AidGrant, RaidFallout};
use crate::scheduler::EventKind;
use crate::state::{GameState, ThemeMode};
use crate::structures::{begin_upgrade, check_upgradeable, finish_upgrade};
use crate::training::{train_one, TrainingCompleted, UnitId};
use crate::workers::{UpgradeTarget, WorkerId};

/// Most sweeps of one kind replayed by a single advance. Longer gaps skip
/// the oldest intervals.
pub const MAX_CATCH_UP_SWEEPS: u64 = 120;

/// Favor an attacking neighbor gains when its invasion is repelled.
pub const REPELLED_FAVOR: i32 = 5;

/// Favor an attacking neighbor loses after plundering the village.
pub const PLUNDERED_FAVOR: i32 = -10;

/// Something that happened during [`Engine::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Production was credited.
    Collected(Collected),
    /// A structure or clan castle upgrade finished.
    UpgradeCompleted {
        /// What was upgraded.
        target: UpgradeTarget,
        /// New level.
        level: u32,
    },
    /// The town hall reached a new level.
    TownLevelChanged(u32),
    /// A unit finished training.
    TrainingCompleted(TrainingCompleted),
    /// A hero upgrade finished.
    HeroUpgraded {
        /// Hero id.
        hero_id: HeroId,
        /// New level.
        level: u32,
    },
    /// A neighbor moved in.
    NeighborJoined(NeighborId),
    /// Neighbors aged into a higher strength.
    NeighborsStrengthened(usize),
    /// A hostile neighbor launched an invasion.
    NeighborInvasionStarted(NeighborId),
    /// A neighbor invasion was settled.
    NeighborInvasionResolved {
        /// Attacking neighbor.
        neighbor_id: NeighborId,
        /// Whether the village held.
        defended: bool,
    },
    /// An NPC raid began.
    NpcInvasionStarted(String),
    /// An NPC raid was settled.
    NpcInvasionResolved(InvasionRecord),
    /// A neighbor asked for a donation.
    DonationRequested {
        /// Request id.
        request_id: u64,
        /// Asking neighbor.
        neighbor_id: NeighborId,
    },
    /// A donation request went unanswered.
    DonationExpired(Expired),
    /// An obstacle appeared.
    TreeGrown(u64),
    /// The state was written to storage.
    Saved,
}

/// A started structure upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeStarted {
    /// Worker bound to the job.
    pub worker_id: WorkerId,
    /// Level reached on completion.
    pub target_level: u32,
    /// Completion time.
    pub end_at: Timestamp,
}

/// Result of a raid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidResult {
    /// Battle record id.
    pub battle_id: u64,
    /// Whether the raid succeeded.
    pub victory: bool,
    /// Stars awarded.
    pub stars: u8,
    /// Attacker share of total power, whole percent.
    pub power_ratio: u32,
    /// Resources credited to the player.
    pub loot: LootDelta,
    /// Units lost per type.
    pub troops_lost: Vec<(String, u32)>,
    /// Favor consequences.
    pub fallout: RaidFallout,
}

/// Result of a gift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftResult {
    /// Favor change applied to the recipient.
    pub favor_change: i32,
    /// Recipient's favor afterwards.
    pub favor: i32,
    /// Recipient's reply.
    pub reply: String,
}

/// Result of an aid request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AidResult {
    /// What the neighbor sent.
    pub grant: AidGrant,
    /// Amount that fit in storage.
    pub credited: u64,
}

/// Result of a fatigue restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    /// Gems charged.
    pub gems_spent: u64,
    /// Workers restored.
    pub workers: usize,
}

/// Result of clearing an obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeRemoval {
    /// Elixir charged.
    pub elixir_spent: u64,
    /// Gems found.
    pub gems: u64,
}

/// Run the sweeps due between `anchor` and `now`, moving the anchor forward
/// by whole intervals. Returns the timestamp of each sweep.
fn due_sweeps(anchor: &mut Option<Timestamp>, now: Timestamp, interval: u64) -> Vec<Timestamp> {
    let interval = interval.max(1);
    let Some(last) = *anchor else {
        *anchor = Some(now);
        return Vec::new();
    };
    if now < last.saturating_add(interval) {
        return Vec::new();
    }
    let due = (now - last) / interval;
    let skipped = due.saturating_sub(MAX_CATCH_UP_SWEEPS);
    let start = last + skipped * interval;
    *anchor = Some(last + due * interval);
    (1..=due - skipped).map(|k| start + k * interval).collect()
}

fn loss(amount: u64) -> i64 {
    -i64::try_from(amount).unwrap_or(i64::MAX)
}

fn gain(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

/// The simulation engine. See the [module docs](self).
pub struct Engine<R: RngCore = ChaCha8Rng> {
    state: GameState,
    config: GameConfig,
    rng: R,
    persistence: PersistenceCoordinator,
    now: Timestamp,
}

impl<R: RngCore> std::fmt::Debug for Engine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("now", &self.now)
            .field("town_level", &self.state.town_level)
            .field("persistence", &self.persistence)
            .finish_non_exhaustive()
    }
}

impl Engine<ChaCha8Rng> {
    /// An engine with in-memory storage and a seeded generator.
    #[must_use]
    pub fn seeded(config: GameConfig, seed: u64, now: Timestamp) -> Self {
        Self::load(
            config,
            Box::new(MemoryStorage::new()),
            ChaCha8Rng::seed_from_u64(seed),
            now,
        )
    }

    /// An engine over `storage` seeded from the operating system.
    #[must_use]
    pub fn from_entropy(config: GameConfig, storage: Box<dyn StoragePort>, now: Timestamp) -> Self {
        Self::load(config, storage, ChaCha8Rng::from_entropy(), now)
    }
}

impl<R: RngCore> Engine<R> {
    /// Load the village stored in `storage`, falling back to a fresh one.
    ///
    /// Autosave is enabled once loading finishes.
    pub fn load(config: GameConfig, storage: Box<dyn StoragePort>, mut rng: R, now: Timestamp) -> Self {
        let mut persistence = PersistenceCoordinator::new(storage, &config);
        let state = persistence.load_or_fresh(&config, now, &mut rng);
        persistence.mark_initialized();
        Self {
            state,
            config,
            rng,
            persistence,
            now,
        }
    }

    /// Wrap an existing state.
    pub fn with_state(
        state: GameState,
        config: GameConfig,
        storage: Box<dyn StoragePort>,
        rng: R,
        now: Timestamp,
    ) -> Self {
        let mut persistence = PersistenceCoordinator::new(storage, &config);
        persistence.mark_initialized();
        Self {
            state,
            config,
            rng,
            persistence,
            now,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Mutable state, for fixtures and tooling. Does not mark the state dirty.
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Persistence coordinator.
    #[must_use]
    pub fn persistence(&self) -> &PersistenceCoordinator {
        &self.persistence
    }

    /// Latest time the engine has seen.
    #[must_use]
    pub const fn now(&self) -> Timestamp {
        self.now
    }

    /// Write the state now, bypassing the debounce.
    ///
    /// # Errors
    ///
    /// Serialization or storage failure.
    pub fn save(&mut self, now: Timestamp) -> crate::error::Result<bool> {
        self.persistence.flush(&self.state, now)
    }

    /// Catch up on everything due at `now`. See the [module docs](self).
    pub fn advance(&mut self, now: Timestamp) -> Vec<EngineEvent> {
        self.now = self.now.max(now);
        let mut events = Vec::new();

        if let Some(collected) = self.collect_resources(now) {
            events.push(EngineEvent::Collected(collected));
        }
        self.complete_due(now, &mut events);
        self.process_scheduled(now, &mut events);
        self.grow_neighbors(now, &mut events);
        self.fatigue_sweeps(now, &mut events);
        self.drift_sweeps(now, &mut events);
        self.expire_donations(now, &mut events);
        self.grow_trees(now, &mut events);

        #[cfg(feature = "debug-validation")]
        self.state.assert_invariants();

        if !events.is_empty() {
            self.persistence.mark_dirty(now);
        }
        if self.persistence.flush_if_due(&self.state, now) {
            events.push(EngineEvent::Saved);
        }
        events
    }

    /// Credit production accrued since the last collection.
    ///
    /// A no-op below the collection threshold.
    pub fn collect_resources(&mut self, now: Timestamp) -> Option<Collected> {
        let production = self.state.production();
        let capacity = self.state.capacity();
        self.state.resources.collect(
            now,
            self.config.collect_threshold_ms,
            &production,
            &capacity,
        )
    }

    fn complete_due(&mut self, now: Timestamp, events: &mut Vec<EngineEvent>) {
        for target in self.state.workers.due_targets(now) {
            self.complete_job(target, events);
        }
        let freed = self.state.workers.release_expired(now);
        if freed > 0 {
            debug!(freed, "Released workers with expired tasks");
        }
        for done in self.state.training.tick(&mut self.state.units, now) {
            events.push(EngineEvent::TrainingCompleted(done));
        }
        for (hero_id, level) in heroes::tick(&mut self.state.heroes, &mut self.state.hero_jobs, now) {
            events.push(EngineEvent::HeroUpgraded { hero_id, level });
        }
    }

    fn complete_job(&mut self, target: UpgradeTarget, events: &mut Vec<EngineEvent>) -> Option<u32> {
        let (job, freed) = self.state.workers.complete(target)?;
        let level = match target {
            UpgradeTarget::Structure(id) => {
                let (kind, level) = finish_upgrade(&mut self.state.structures, id)?;
                if kind == StructureKind::TownHall {
                    self.state.town_level = level;
                    events.push(EngineEvent::TownLevelChanged(level));
                }
                level
            }
            UpgradeTarget::ClanCastle(_) => {
                let castle = &mut self.state.clan_castle;
                castle.level = job.target_level.max(castle.level).min(CLAN_CASTLE_MAX_LEVEL);
                castle.level
            }
        };
        debug!(?target, level, worker = ?freed, "Upgrade complete");
        events.push(EngineEvent::UpgradeCompleted { target, level });
        Some(level)
    }

    fn process_scheduled(&mut self, now: Timestamp, events: &mut Vec<EngineEvent>) {
        for event in self.state.events.drain_due(now) {
            match event.kind {
                EventKind::ResolveNeighborInvasion => {
                    self.resolve_neighbor_invasion(event.due_at, events);
                }
                EventKind::ResolveNpcInvasion => self.resolve_npc_invasion(event.due_at, events),
                EventKind::ClearNeighborInvasion => {
                    if self
                        .state
                        .invasions
                        .neighbor
                        .as_ref()
                        .is_some_and(|i| i.result.is_some())
                    {
                        self.state.invasions.neighbor = None;
                    }
                }
                EventKind::ClearNpcInvasion => {
                    if self
                        .state
                        .invasions
                        .npc
                        .as_ref()
                        .is_some_and(|r| r.result.is_some())
                    {
                        self.state.invasions.npc = None;
                    }
                }
            }
        }
    }

    fn resolve_neighbor_invasion(&mut self, at: Timestamp, events: &mut Vec<EngineEvent>) {
        let Some(invasion) = self
            .state
            .invasions
            .neighbor
            .clone()
            .filter(|i| i.result.is_none())
        else {
            return;
        };
        let defense = self.state.defense_deci();
        let defense_result = resolve_neighbor(
            &invasion,
            defense,
            &mut self.state.resources,
            self.state.town_level,
            &mut self.rng,
        );
        let result = defense_result.result;
        let losses = result.losses;
        let defenses = self.state.defenses();
        let battle_log = defense_log(
            &DefenseReport {
                attacker: &invasion.attacker_name,
                attackers: &invasion.troops,
                defenses: &defenses,
                defended: result.defended,
                defense_rate: defense_result.outcome.defense_rate,
                lost: (losses.gold, losses.elixir, losses.dark),
            },
            &mut self.rng,
        );

        if let Some(attacker) = neighbors::find_mut(&mut self.state.neighbors, invasion.neighbor_id) {
            let delta = if result.defended {
                REPELLED_FAVOR
            } else {
                PLUNDERED_FAVOR
            };
            shift_favor(attacker, delta);
        }

        let id = self.state.next_battle_id();
        self.state.battle_history.push(BattleRecord {
            id,
            kind: BattleKind::Defense,
            target: invasion.attacker_name.clone(),
            victory: result.defended,
            player_power: whole(defense),
            enemy_power: whole(invasion.attack_deci()),
            stars: None,
            loot: LootDelta {
                gold: loss(losses.gold),
                elixir: loss(losses.elixir),
                dark: loss(losses.dark),
            },
            battle_log,
            at,
        });

        let (kind, title, content, payload) = if result.defended {
            (
                MessageKind::Success,
                "Invasion repelled",
                format!("{} was driven off.", invasion.attacker_name),
                MessagePayload::DefenseSuccess,
            )
        } else {
            (
                MessageKind::Danger,
                "Village plundered",
                format!(
                    "{} stole {} gold, {} elixir and {} dark elixir.",
                    invasion.attacker_name, losses.gold, losses.elixir, losses.dark
                ),
                MessagePayload::DefenseFail,
            )
        };
        self.state.messages.push(kind, title, content, payload, at);

        info!(
            neighbor = invasion.neighbor_id,
            defended = result.defended,
            defense_rate = result.defense_rate,
            "Neighbor invasion resolved"
        );
        events.push(EngineEvent::NeighborInvasionResolved {
            neighbor_id: invasion.neighbor_id,
            defended: result.defended,
        });
        self.state.invasions.neighbor = Some(NeighborInvasion {
            result: Some(result),
            ..invasion
        });
        self.state
            .events
            .schedule(EventKind::ClearNeighborInvasion, at + self.config.invasion_display_ms);
    }

    fn resolve_npc_invasion(&mut self, at: Timestamp, events: &mut Vec<EngineEvent>) {
        let Some(raid) = self
            .state
            .invasions
            .npc
            .clone()
            .filter(|r| r.result.is_none())
        else {
            return;
        };
        let record = resolve_npc(
            &raid,
            self.state.defense_deci(),
            &mut self.state.resources,
            self.state.town_level,
            at,
            &mut self.rng,
        );
        let invasions = &mut self.state.invasions;
        invasions.history.push(record.clone());
        invasions.last_npc_at = Some(at);
        if let Some(active) = invasions.npc.as_mut() {
            active.result = Some(record.clone());
        }

        let (kind, title, content, payload) = if record.defended {
            (
                MessageKind::Success,
                "Raiders repelled",
                format!("{} were beaten back.", record.attacker_name),
                MessagePayload::DefenseSuccess,
            )
        } else {
            (
                MessageKind::Danger,
                "Raiders broke through",
                format!(
                    "{} took {} gold, {} elixir and {} trophies.",
                    record.attacker_name, record.gold_lost, record.elixir_lost, record.trophies_lost
                ),
                MessagePayload::DefenseFail,
            )
        };
        self.state.messages.push(kind, title, content, payload, at);
        info!(
            attacker = %record.attacker_name,
            defended = record.defended,
            defense_rate = record.defense_rate,
            "NPC invasion resolved"
        );
        events.push(EngineEvent::NpcInvasionResolved(record));
        self.state
            .events
            .schedule(EventKind::ClearNpcInvasion, at + self.config.invasion_display_ms);
    }

    fn grow_neighbors(&mut self, now: Timestamp, events: &mut Vec<EngineEvent>) {
        let interval = self.config.neighbor_growth_interval_ms.max(1);
        let anchor = &mut self.state.timers.neighbor_growth_at;
        let Some(last) = *anchor else {
            *anchor = Some(now);
            return;
        };
        if now >= last.saturating_add(interval) {
            let due = (now - last) / interval;
            *anchor = Some(last + due * interval);
            let room = (self.config.max_neighbors as usize).saturating_sub(self.state.neighbors.len());
            let spawns = due.min(room as u64);
            for k in 1..=spawns {
                let created_at = last + k * interval;
                let id = neighbors::spawn(&mut self.state.neighbors, created_at, now, &mut self.rng);
                let name = neighbors::find(&self.state.neighbors, id)
                    .map(|n| n.display_name.clone())
                    .unwrap_or_default();
                self.state.messages.push(
                    MessageKind::Info,
                    "New neighbor",
                    format!("{name} settled nearby."),
                    MessagePayload::NewNeighbor { neighbor_id: id },
                    created_at,
                );
                info!(neighbor = id, population = self.state.neighbors.len(), "Neighbor joined");
                events.push(EngineEvent::NeighborJoined(id));
            }
        }

        let strengthened = neighbors::update_strength(&mut self.state.neighbors, now, &mut self.rng);
        if strengthened > 0 {
            debug!(strengthened, "Neighbors grew stronger");
            events.push(EngineEvent::NeighborsStrengthened(strengthened));
        }
    }

    fn fatigue_sweeps(&mut self, now: Timestamp, events: &mut Vec<EngineEvent>) {
        let sweeps = due_sweeps(
            &mut self.state.timers.fatigue_at,
            now,
            self.config.fatigue_interval_ms,
        );
        if sweeps.is_empty() {
            return;
        }
        for _ in &sweeps {
            self.state.workers.tick_fatigue(&mut self.rng);
        }
        let average = self.state.workers.average_fatigue();
        debug!(sweeps = sweeps.len(), average, "Fatigue sweep");

        let started = self
            .state
            .invasions
            .roll_npc(
                average,
                self.state.town_level,
                now,
                self.config.npc_invasion_cooldown_ms,
                &mut self.rng,
            )
            .map(|raid| raid.attacker_name.clone());
        if let Some(attacker) = started {
            self.state
                .events
                .schedule(EventKind::ResolveNpcInvasion, now + self.config.npc_resolve_delay_ms);
            self.state.messages.push(
                MessageKind::Danger,
                "Raiders sighted",
                format!("{attacker} are attacking while your workers are exhausted!"),
                MessagePayload::NpcInvasion {
                    attacker: attacker.clone(),
                },
                now,
            );
            info!(attacker = %attacker, average_fatigue = average, "NPC invasion started");
            events.push(EngineEvent::NpcInvasionStarted(attacker));
        }
    }

    fn drift_sweeps(&mut self, now: Timestamp, events: &mut Vec<EngineEvent>) {
        let sweeps = due_sweeps(&mut self.state.timers.drift_at, now, self.config.drift_interval_ms);
        for at in sweeps {
            relations::drift(&mut self.state.neighbors, &mut self.rng);
            self.roll_neighbor_invasion(at, events);

            let opened = self
                .state
                .donations
                .maybe_open(
                    &self.state.neighbors,
                    at,
                    self.config.donation_chance_pct,
                    &mut self.rng,
                )
                .cloned();
            if let Some(request) = opened {
                let name = neighbors::find(&self.state.neighbors, request.neighbor_id)
                    .map(|n| n.display_name.clone())
                    .unwrap_or_default();
                let plea = donation_recipe(request.personality).plea;
                self.state.messages.push(
                    MessageKind::Info,
                    "Donation request",
                    format!("{name}: \"{plea}\""),
                    MessagePayload::DonationRequest {
                        request_id: request.id,
                        neighbor_id: request.neighbor_id,
                        resource: request.resource,
                        amount: request.amount,
                        reward: request.reward_favor,
                    },
                    at,
                );
                events.push(EngineEvent::DonationRequested {
                    request_id: request.id,
                    neighbor_id: request.neighbor_id,
                });
            }
        }
    }

    fn roll_neighbor_invasion(&mut self, at: Timestamp, events: &mut Vec<EngineEvent>) {
        if self.state.invasions.neighbor.is_some() {
            return;
        }
        let mut attacker = None;
        for neighbor in &self.state.neighbors {
            let Some(p) = neighbor_invasion_chance(neighbor.personality, neighbor.favor) else {
                continue;
            };
            if chance(&mut self.rng, p) {
                attacker = Some(NeighborInvasion::muster(neighbor, at));
                break;
            }
        }
        let Some(invasion) = attacker else {
            return;
        };
        let neighbor_id = invasion.neighbor_id;
        self.state.messages.push(
            MessageKind::Danger,
            "Invasion!",
            format!("{} is marching on the village!", invasion.attacker_name),
            MessagePayload::Invasion { neighbor_id },
            at,
        );
        self.state.invasions.neighbor = Some(invasion);
        self.state.events.schedule(
            EventKind::ResolveNeighborInvasion,
            at + self.config.invasion_resolve_delay_ms,
        );
        info!(neighbor = neighbor_id, "Neighbor invasion started");
        events.push(EngineEvent::NeighborInvasionStarted(neighbor_id));
    }

    fn expire_donations(&mut self, now: Timestamp, events: &mut Vec<EngineEvent>) {
        let expired = self.state.donations.expire(
            &mut self.state.neighbors,
            now,
            self.config.donation_expiry_ms,
        );
        for e in expired {
            let name = neighbors::find(&self.state.neighbors, e.neighbor_id)
                .map(|n| n.display_name.clone())
                .unwrap_or_default();
            self.state.messages.push(
                MessageKind::Warning,
                "Request ignored",
                format!("{name} is disappointed you never answered."),
                MessagePayload::DonationExpired {
                    neighbor_id: e.neighbor_id,
                },
                now,
            );
            debug!(request = e.request_id, penalty = e.penalty, "Donation request expired");
            events.push(EngineEvent::DonationExpired(e));
        }
    }

    fn grow_trees(&mut self, now: Timestamp, events: &mut Vec<EngineEvent>) {
        let sweeps = due_sweeps(
            &mut self.state.timers.tree_growth_at,
            now,
            self.config.tree_growth_interval_ms,
        );
        for at in sweeps {
            if let Some(tree) = self.state.grove.try_grow(at, self.config.max_trees, &mut self.rng) {
                events.push(EngineEvent::TreeGrown(tree.id));
            }
        }
    }

    fn run<T>(
        &mut self,
        command: &'static str,
        now: Option<Timestamp>,
        f: impl FnOnce(&mut Self) -> CommandResult<T>,
    ) -> CommandResult<T> {
        if let Some(now) = now {
            self.now = self.now.max(now);
        }
        let result = f(self);
        match &result {
            Ok(_) => {
                debug!(command, "Command applied");
                self.persistence.mark_dirty(self.now);
            }
            Err(e) => debug!(command, error = %e, "Command rejected"),
        }
        result
    }

    // --- Ledger ---

    /// Spend currency.
    ///
    /// # Errors
    ///
    /// [`CommandError::InsufficientResource`]; nothing is spent.
    pub fn spend(&mut self, kind: ResourceKind, amount: u64) -> CommandResult<()> {
        self.run("spend", None, |e| e.state.resources.debit(kind, amount))
    }

    /// Credit currency, clamped to capacity. Returns the amount credited.
    pub fn credit(&mut self, kind: ResourceKind, amount: u64) -> u64 {
        let capacity = self.state.capacity();
        let credited = self.state.resources.credit(kind, amount, &capacity);
        self.persistence.mark_dirty(self.now);
        credited
    }

    /// Switch between the light and dark UI schemes.
    pub fn toggle_theme(&mut self) -> ThemeMode {
        self.state.theme_mode = self.state.theme_mode.toggled();
        self.persistence.mark_dirty(self.now);
        self.state.theme_mode
    }

    /// Change the global production multiplier.
    ///
    /// # Errors
    ///
    /// [`CommandError::InvalidValue`] for zero.
    pub fn set_multiplier(&mut self, multiplier: u32) -> CommandResult<u32> {
        self.run("set_multiplier", None, |e| {
            if multiplier == 0 {
                return Err(CommandError::InvalidValue("multiplier must be positive"));
            }
            e.state.multiplier = multiplier;
            Ok(multiplier)
        })
    }

    // --- Structures and workers ---

    /// Start upgrading a structure with the most rested idle worker.
    ///
    /// # Errors
    ///
    /// Unknown structure, already upgrading, max level, storage capped by
    /// town level, or no idle worker.
    pub fn start_upgrade(&mut self, id: u32, now: Timestamp) -> CommandResult<UpgradeStarted> {
        self.run("start_upgrade", Some(now), |e| {
            let structure = check_upgradeable(&e.state.structures, id, e.state.town_level)?;
            let duration = structure.kind.upgrade_duration_secs(structure.level) * MS_PER_SECOND;
            let target_level = structure.level + 1;
            let label = structure.task_label();
            let end_at = now + duration;
            let worker_id = e.state.workers.assign(
                UpgradeTarget::Structure(id),
                label,
                target_level,
                now,
                end_at,
            )?;
            begin_upgrade(&mut e.state.structures, id, end_at);
            Ok(UpgradeStarted {
                worker_id,
                target_level,
                end_at,
            })
        })
    }

    /// Finish an in-flight upgrade immediately. Returns the new level.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotFound`] if nothing is upgrading under `target`.
    pub fn complete_upgrade(&mut self, target: UpgradeTarget) -> CommandResult<u32> {
        self.run("complete_upgrade", None, |e| {
            let mut events = Vec::new();
            e.complete_job(target, &mut events).ok_or_else(|| match target {
                UpgradeTarget::Structure(id) => CommandError::not_found(Target::Structure, id),
                UpgradeTarget::ClanCastle(_) => CommandError::Locked("clan castle is not upgrading"),
            })
        })
    }

    /// Hire another worker for gems. Returns the new worker's id.
    ///
    /// # Errors
    ///
    /// Pool full or not enough gems.
    pub fn hire_worker(&mut self) -> CommandResult<WorkerId> {
        self.run("hire_worker", None, |e| {
            let workers = e.state.workers.workers.len() as u64;
            let cost = e
                .state
                .workers
                .next_hire_cost()
                .ok_or(CommandError::CapacityExceeded {
                    used: workers,
                    requested: 1,
                    capacity: workers,
                })?;
            e.state.resources.debit(ResourceKind::Gems, cost)?;
            Ok(e.state.workers.hire())
        })
    }

    /// Restore fatigue on one worker, or every worker with `None`, for gems.
    ///
    /// # Errors
    ///
    /// Unknown worker, zero amount, or not enough gems.
    pub fn restore_worker_fatigue(
        &mut self,
        worker_id: Option<WorkerId>,
        amount: u32,
    ) -> CommandResult<RestoreResult> {
        self.run("restore_worker_fatigue", None, |e| {
            if amount == 0 {
                return Err(CommandError::InvalidValue("amount must be positive"));
            }
            if let Some(id) = worker_id {
                e.state
                    .workers
                    .worker(id)
                    .ok_or_else(|| CommandError::not_found(Target::Worker, id))?;
            }
            let gems_spent = e.state.workers.restore_cost(worker_id, amount);
            e.state.resources.debit(ResourceKind::Gems, gems_spent)?;
            let workers = e.state.workers.restore(worker_id, amount)?;
            Ok(RestoreResult {
                gems_spent,
                workers,
            })
        })
    }

    // --- Training and heroes ---

    /// Queue a training job. Never blocked by capacity.
    pub fn enqueue_training(
        &mut self,
        unit_id: UnitId,
        unit_name: &str,
        population_cost: u32,
        now: Timestamp,
    ) -> Timestamp {
        self.now = self.now.max(now);
        let end_at = self
            .state
            .training
            .enqueue(unit_id, unit_name, population_cost, now)
            .end_at;
        self.persistence.mark_dirty(self.now);
        end_at
    }

    /// Add one unit immediately if it fits in army housing. Returns the new
    /// count.
    ///
    /// # Errors
    ///
    /// Unknown or locked unit, or housing exceeded; the count is unchanged.
    pub fn train_unit(&mut self, unit_id: UnitId) -> CommandResult<u32> {
        self.run("train_unit", None, |e| {
            let capacity = e.state.army_capacity();
            train_one(&mut e.state.units, unit_id, capacity)
        })
    }

    /// Start a hero upgrade. Returns its end time.
    ///
    /// # Errors
    ///
    /// Unknown hero, locked, already upgrading, or at the town-level cap.
    pub fn upgrade_hero(&mut self, hero_id: HeroId, now: Timestamp) -> CommandResult<Timestamp> {
        self.run("upgrade_hero", Some(now), |e| {
            heroes::start_upgrade(
                &mut e.state.heroes,
                &mut e.state.hero_jobs,
                hero_id,
                e.state.town_level,
                now,
            )
        })
    }

    // --- Clan castle ---

    /// Build or upgrade the clan castle through the worker pool.
    ///
    /// # Errors
    ///
    /// Max level, town level gate, not enough gold, already upgrading, or no
    /// idle worker. Gold is only charged once every check has passed.
    pub fn upgrade_clan_castle(&mut self, now: Timestamp) -> CommandResult<UpgradeStarted> {
        self.run("upgrade_clan_castle", Some(now), |e| {
            let plan = e
                .state
                .clan_castle
                .plan_upgrade(e.state.town_level, e.state.resources.gold)?;
            if e.state.workers.job_for(UpgradeTarget::CLAN_CASTLE).is_some() {
                return Err(CommandError::AlreadyUpgrading);
            }
            if e.state.workers.next_idle().is_none() {
                return Err(CommandError::NoIdleWorker);
            }
            e.state.resources.debit(ResourceKind::Gold, plan.gold_cost)?;
            let end_at = now + plan.seconds * MS_PER_SECOND;
            let label = e.state.clan_castle.task_label().to_string();
            let worker_id = e.state.workers.assign(
                UpgradeTarget::CLAN_CASTLE,
                label,
                plan.next_level,
                now,
                end_at,
            )?;
            Ok(UpgradeStarted {
                worker_id,
                target_level: plan.next_level,
                end_at,
            })
        })
    }

    /// Ask for reinforcements. Returns the donated level.
    ///
    /// # Errors
    ///
    /// Castle not built, cooldown, unknown unit, or housing exceeded.
    pub fn request_reinforcements(
        &mut self,
        unit_name: &str,
        count: u32,
        now: Timestamp,
    ) -> CommandResult<u32> {
        self.run("request_reinforcements", Some(now), |e| {
            e.state.clan_castle.request(
                &e.state.units,
                unit_name,
                count,
                now,
                e.config.reinforcement_cooldown_ms,
                &mut e.rng,
            )
        })
    }

    /// Remove reinforcements from one stack.
    ///
    /// # Errors
    ///
    /// No matching stack.
    pub fn remove_reinforcements(&mut self, unit_name: &str, level: u32, count: u32) -> CommandResult<()> {
        self.run("remove_reinforcements", None, |e| {
            e.state.clan_castle.remove(unit_name, level, count)
        })
    }

    /// Drop every reinforcement.
    pub fn clear_reinforcements(&mut self) {
        self.state.clan_castle.clear();
        self.persistence.mark_dirty(self.now);
    }

    // --- Combat ---

    /// Raid a neighbor with every deployable unit.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotFound`] for an unknown neighbor.
    pub fn raid(&mut self, neighbor_id: NeighborId, now: Timestamp) -> CommandResult<RaidResult> {
        self.run("raid", Some(now), |e| {
            let target = neighbors::find(&e.state.neighbors, neighbor_id)
                .cloned()
                .ok_or_else(|| CommandError::not_found(Target::Neighbor, neighbor_id))?;
            let attackers = deployable(&e.state.units);
            let attack = attack_power_deci(&attackers);
            let defense = target.power_deci();
            let outcome = resolve_raid(attack, defense, &mut e.rng);

            let mut loot = LootDelta::default();
            let mut taken = (0, 0, 0);
            if outcome.victory {
                let stock = target.resources;
                taken = (
                    raid_loot(stock.gold, attack, defense),
                    raid_loot(stock.elixir, attack, defense),
                    raid_loot(stock.dark, attack, defense),
                );
                if let Some(n) = neighbors::find_mut(&mut e.state.neighbors, neighbor_id) {
                    n.resources.gold = n.resources.gold.saturating_sub(taken.0);
                    n.resources.elixir = n.resources.elixir.saturating_sub(taken.1);
                    n.resources.dark = n.resources.dark.saturating_sub(taken.2);
                }
                let capacity = e.state.capacity();
                let resources = &mut e.state.resources;
                loot = LootDelta {
                    gold: gain(resources.credit(ResourceKind::Gold, taken.0, &capacity)),
                    elixir: gain(resources.credit(ResourceKind::Elixir, taken.1, &capacity)),
                    dark: gain(resources.credit(ResourceKind::DarkElixir, taken.2, &capacity)),
                };
            }

            let troops_lost = apply_troop_losses(&mut e.state.units, outcome.loss_rate);
            let fallout = relations::apply_raid(&mut e.state.neighbors, neighbor_id, outcome.victory)?;

            let battle_log = raid_log(
                &RaidReport {
                    target: &target.display_name,
                    personality: target.personality,
                    defender_power: whole(defense),
                    garrison: &target.troops,
                    attackers: &attackers,
                    victory: outcome.victory,
                    power_ratio: outcome.power_ratio,
                    stars: outcome.stars,
                    loot: taken,
                },
                &mut e.rng,
            );
            let battle_id = e.state.next_battle_id();
            e.state.battle_history.push(BattleRecord {
                id: battle_id,
                kind: BattleKind::Attack,
                target: target.display_name.clone(),
                victory: outcome.victory,
                player_power: whole(attack),
                enemy_power: whole(defense),
                stars: Some(outcome.stars),
                loot,
                battle_log,
                at: now,
            });
            info!(
                neighbor = neighbor_id,
                victory = outcome.victory,
                stars = outcome.stars,
                "Raid resolved"
            );
            Ok(RaidResult {
                battle_id,
                victory: outcome.victory,
                stars: outcome.stars,
                power_ratio: whole_percent(outcome.power_ratio),
                loot,
                troops_lost,
                fallout,
            })
        })
    }

    /// Dismiss settled invasions. Returns whether anything was dismissed.
    ///
    /// An NPC raid still in progress cannot be dismissed.
    pub fn acknowledge_invasion(&mut self) -> CommandResult<bool> {
        self.run("acknowledge_invasion", None, |e| {
            let invasions = &mut e.state.invasions;
            let mut cleared = false;
            if invasions.npc.as_ref().is_some_and(|r| r.result.is_some()) {
                invasions.npc = None;
                cleared = true;
            }
            if invasions.neighbor.as_ref().is_some_and(|i| i.result.is_some()) {
                invasions.neighbor = None;
                cleared = true;
            }
            Ok(cleared)
        })
    }

    // --- Relations ---

    /// Give currency to a neighbor.
    ///
    /// # Errors
    ///
    /// Unknown neighbor, zero amount, or not enough currency.
    pub fn gift_resource(
        &mut self,
        neighbor_id: NeighborId,
        resource: ResourceKind,
        amount: u64,
        now: Timestamp,
    ) -> CommandResult<GiftResult> {
        self.run("gift_resource", Some(now), |e| {
            if amount == 0 {
                return Err(CommandError::InvalidValue("amount must be positive"));
            }
            let neighbor = neighbors::find(&e.state.neighbors, neighbor_id)
                .ok_or_else(|| CommandError::not_found(Target::Neighbor, neighbor_id))?;
            let change = relations::resource_gift_favor(neighbor, resource);
            e.state.resources.debit(resource, amount)?;
            let applied = relations::apply_gift(
                &mut e.state.neighbors,
                neighbor_id,
                GiftKind::Resource { resource, amount },
                change,
                now,
            )?;
            e.gift_result(neighbor_id, applied)
        })
    }

    /// Give one owned unit to a neighbor.
    ///
    /// # Errors
    ///
    /// Unknown neighbor or unit, or no unit of that type owned.
    pub fn gift_troop(
        &mut self,
        neighbor_id: NeighborId,
        unit_id: UnitId,
        now: Timestamp,
    ) -> CommandResult<GiftResult> {
        self.run("gift_troop", Some(now), |e| {
            let neighbor = neighbors::find(&e.state.neighbors, neighbor_id)
                .ok_or_else(|| CommandError::not_found(Target::Neighbor, neighbor_id))?;
            let unit = e
                .state
                .units
                .iter_mut()
                .find(|u| u.id == unit_id)
                .ok_or_else(|| CommandError::not_found(Target::Unit, unit_id))?;
            if unit.count == 0 {
                return Err(CommandError::InvalidValue("no units of that type to give"));
            }
            let change =
                relations::troop_gift_favor(neighbor, &unit.name, unit.level, unit.population_cost);
            unit.count -= 1;
            let gift = GiftKind::Troop {
                name: unit.name.clone(),
                level: unit.level,
            };
            let applied = relations::apply_gift(&mut e.state.neighbors, neighbor_id, gift, change, now)?;
            e.gift_result(neighbor_id, applied)
        })
    }

    fn gift_result(&self, neighbor_id: NeighborId, applied: i32) -> CommandResult<GiftResult> {
        let neighbor = neighbors::find(&self.state.neighbors, neighbor_id)
            .ok_or_else(|| CommandError::not_found(Target::Neighbor, neighbor_id))?;
        Ok(GiftResult {
            favor_change: applied,
            favor: neighbor.favor,
            reply: relations::greeting(neighbor).to_string(),
        })
    }

    /// Form an alliance. Returns the neighbor's reply.
    ///
    /// # Errors
    ///
    /// Unknown neighbor, favor too low, or already allied.
    pub fn propose_alliance(&mut self, neighbor_id: NeighborId) -> CommandResult<String> {
        self.run("propose_alliance", None, |e| {
            relations::propose_alliance(&mut e.state.neighbors, neighbor_id).map(str::to_string)
        })
    }

    /// Ask a friendly neighbor for aid.
    ///
    /// # Errors
    ///
    /// Unknown neighbor, favor too low, or cooldown.
    pub fn request_aid(&mut self, neighbor_id: NeighborId, now: Timestamp) -> CommandResult<AidResult> {
        self.run("request_aid", Some(now), |e| {
            let grant = relations::request_aid(
                &mut e.state.neighbors,
                neighbor_id,
                e.state.town_level,
                now,
                e.config.aid_cooldown_ms,
                &mut e.rng,
            )?;
            let capacity = e.state.capacity();
            let credited = e.state.resources.credit(grant.resource, grant.amount, &capacity);
            Ok(AidResult { grant, credited })
        })
    }

    /// Pay a donation request. Returns the favor gained.
    ///
    /// # Errors
    ///
    /// Unknown request, already fulfilled, or not enough currency; the
    /// request stays open if payment fails.
    pub fn fulfill_donation(&mut self, request_id: u64) -> CommandResult<i32> {
        self.run("fulfill_donation", None, |e| {
            let request = e
                .state
                .donations
                .get(request_id)
                .ok_or_else(|| CommandError::not_found(Target::DonationRequest, request_id))?;
            if request.fulfilled {
                return Err(CommandError::AlreadyFulfilled);
            }
            let (resource, amount) = (request.resource, request.amount);
            e.state.resources.debit(resource, amount)?;
            let request = e.state.donations.take_for_fulfillment(request_id)?;
            let gained = neighbors::find_mut(&mut e.state.neighbors, request.neighbor_id)
                .map_or(0, |n| shift_favor(n, request.reward_favor));
            Ok(gained)
        })
    }

    /// Turn down a donation request. Returns the favor penalty.
    ///
    /// # Errors
    ///
    /// Unknown request.
    pub fn reject_donation(&mut self, request_id: u64) -> CommandResult<i32> {
        self.run("reject_donation", None, |e| {
            e.state.donations.reject(&mut e.state.neighbors, request_id)
        })
    }

    // --- Obstacles and campaign ---

    /// Clear an obstacle for elixir, maybe finding gems.
    ///
    /// # Errors
    ///
    /// Unknown obstacle or not enough elixir.
    pub fn remove_tree(&mut self, tree_id: u64, now: Timestamp) -> CommandResult<TreeRemoval> {
        self.run("remove_tree", Some(now), |e| {
            if !e.state.grove.trees.iter().any(|t| t.id == tree_id) {
                return Err(CommandError::not_found(Target::Tree, tree_id));
            }
            e.state.resources.debit(ResourceKind::Elixir, REMOVAL_COST_ELIXIR)?;
            e.state.grove.remove(tree_id)?;
            let found = roll_gems(&mut e.rng);
            let capacity = e.state.capacity();
            let gems = e.state.resources.credit(ResourceKind::Gems, found, &capacity);
            if gems > 0 {
                e.state.messages.push(
                    MessageKind::Success,
                    "Hidden treasure",
                    format!("You found {gems} gems while clearing the way."),
                    MessagePayload::TreeReward { gems },
                    now,
                );
            }
            Ok(TreeRemoval {
                elixir_spent: REMOVAL_COST_ELIXIR,
                gems,
            })
        })
    }

    /// Spend a campaign attempt. Returns attempts made today.
    ///
    /// # Errors
    ///
    /// [`CommandError::Cooldown`] while the previous attempt cools down.
    pub fn start_campaign_attempt(&mut self, now: Timestamp) -> CommandResult<u32> {
        self.run("start_campaign_attempt", Some(now), |e| {
            e.state
                .campaign
                .use_attempt(now, e.config.campaign_cooldown_ms)
        })
    }

    /// Record a completed campaign level. Returns `false` if already done.
    pub fn complete_campaign_level(&mut self, level_id: u32) -> bool {
        let added = self.state.campaign.complete(level_id);
        if added {
            self.persistence.mark_dirty(self.now);
        }
        added
    }

    // --- Messages ---

    /// Mark one message read.
    pub fn mark_message_read(&mut self, id: u64) -> bool {
        let changed = self.state.messages.mark_read(id);
        if changed {
            self.persistence.mark_dirty(self.now);
        }
        changed
    }

    /// Mark every message read.
    pub fn mark_all_messages_read(&mut self) {
        self.state.messages.mark_all_read();
        self.persistence.mark_dirty(self.now);
    }

    /// Delete every message.
    pub fn clear_messages(&mut self) {
        self.state.messages.clear();
        self.persistence.mark_dirty(self.now);
    }
}
