//! Incoming invasions.
//!
//! Two independent triggers feed the defender path of the combat resolver:
//! hostile neighbors (checked on every drift tick) and generic NPC raiding
//! parties (checked when average worker fatigue is low). At most one of each
//! kind is active at a time; resolution happens through the scheduled-event
//! queue a short delay after the trigger.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::combat::{resolve_defense, stacks_power_deci, DefenseOutcome, TroopStack};
use crate::data::{invasion_loadout, Personality, DARK_ELIXIR_UNLOCK_TOWN_LEVEL};
use crate::economy::ResourceState;
use crate::history::{InvasionRecord, RingBuffer, INVASION_HISTORY_CAPACITY};
use crate::math::{
    chance, pct, pick, ppm_of, roll_below, roll_inclusive, scale_ppm, whole_percent, Fixed, PPM,
};
use crate::neighbors::{Neighbor, NeighborId};
use crate::relations::HOSTILE_FAVOR;

/// Average fatigue at or below which NPC raids become possible.
pub const NPC_FATIGUE_THRESHOLD: u32 = 50;

/// A generic raiding party.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NpcRaider {
    /// Name.
    pub name: &'static str,
    /// Town level it attacks at.
    pub town_level: u32,
    /// Strength as a whole percentage.
    pub strength_pct: u32,
    /// Share of the defender's stores it can carry off, whole percent.
    pub greed_pct: u32,
}

const fn raider(name: &'static str, town_level: u32, strength_pct: u32, greed_pct: u32) -> NpcRaider {
    NpcRaider {
        name,
        town_level,
        strength_pct,
        greed_pct,
    }
}

/// Roster of NPC raiders, weakest first.
pub const NPC_RAIDERS: [NpcRaider; 7] = [
    raider("Goblin Bandits", 3, 30, 15),
    raider("Barbarian Tribe", 4, 40, 20),
    raider("Shadow Raiders", 5, 50, 25),
    raider("Skeleton Legion", 6, 60, 30),
    raider("Giant Alliance", 7, 70, 35),
    raider("Dragon Riders", 8, 80, 40),
    raider("Dark Lord", 9, 90, 45),
];

impl NpcRaider {
    /// `town_level × 50 × strength`, in tenths.
    #[must_use]
    pub const fn attack_deci(&self) -> u64 {
        self.town_level as u64 * 5 * self.strength_pct as u64
    }
}

/// Raiders matched to a town level: from two below to one above.
#[must_use]
pub fn eligible_raiders(town_level: u32) -> Vec<NpcRaider> {
    NPC_RAIDERS
        .iter()
        .filter(|r| r.town_level + 2 >= town_level && r.town_level <= town_level + 1)
        .copied()
        .collect()
}

/// Probability of an NPC raid at an average fatigue. `None` above the threshold.
#[must_use]
pub fn npc_invasion_chance(average_fatigue: u32) -> Option<Fixed> {
    let percent = match average_fatigue {
        0..=10 => 60,
        11..=20 => 40,
        21..=30 => 25,
        31..=40 => 15,
        41..=NPC_FATIGUE_THRESHOLD => 5,
        _ => return None,
    };
    Some(pct(percent))
}

/// Probability that a hostile neighbor invades on a drift tick. `None` unless
/// favor is below -20.
#[must_use]
pub fn neighbor_invasion_chance(personality: Personality, favor: i32) -> Option<Fixed> {
    if favor >= HOSTILE_FAVOR {
        return None;
    }
    let percent = if favor <= -60 {
        if personality == Personality::Theatrical {
            25
        } else {
            15
        }
    } else if favor <= -40 {
        if personality == Personality::Aggressive {
            12
        } else {
            8
        }
    } else {
        5
    };
    Some(pct(percent))
}

/// Resources taken from the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Losses {
    /// Gold.
    pub gold: u64,
    /// Elixir.
    pub elixir: u64,
    /// Dark elixir.
    pub dark: u64,
    /// Trophies.
    #[serde(default)]
    pub trophies: u64,
}

/// Take `rate_ppm` parts per million of gold and elixir, and half that of
/// dark elixir once the town can store it.
pub fn plunder(resources: &mut ResourceState, town_level: u32, rate_ppm: u64) -> Losses {
    let rate_ppm = rate_ppm.min(PPM);
    let gold = scale_ppm(resources.gold, rate_ppm);
    let elixir = scale_ppm(resources.elixir, rate_ppm);
    let dark = if town_level >= DARK_ELIXIR_UNLOCK_TOWN_LEVEL {
        scale_ppm(resources.dark_elixir, rate_ppm / 2)
    } else {
        0
    };
    resources.gold -= gold;
    resources.elixir -= elixir;
    resources.dark_elixir -= dark;
    Losses {
        gold,
        elixir,
        dark,
        trophies: 0,
    }
}

/// Settled invasion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvasionResult {
    /// The village held.
    pub defended: bool,
    /// Resources lost.
    pub losses: Losses,
    /// Final defense rate, whole percent.
    pub defense_rate: u32,
}

/// A hostile neighbor's attack in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborInvasion {
    /// Attacking neighbor.
    pub neighbor_id: NeighborId,
    /// Label for the attacking army.
    pub attacker_name: String,
    /// Committed troops.
    pub troops: Vec<TroopStack>,
    /// When the alarm sounded.
    pub started_at: Timestamp,
    /// Outcome once resolved.
    #[serde(default)]
    pub result: Option<InvasionResult>,
}

impl NeighborInvasion {
    /// Muster the neighbor's invasion loadout.
    #[must_use]
    pub fn muster(neighbor: &Neighbor, now: Timestamp) -> Self {
        let troops = invasion_loadout(neighbor.personality)
            .iter()
            .map(|(unit, level, count)| TroopStack::new(unit.name(), *level, *count))
            .collect();
        Self {
            neighbor_id: neighbor.id,
            attacker_name: format!("{}'s army", neighbor.display_name),
            troops,
            started_at: now,
            result: None,
        }
    }

    /// Committed attack power, in tenths.
    #[must_use]
    pub fn attack_deci(&self) -> u64 {
        stacks_power_deci(&self.troops)
    }
}

/// An NPC raid in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcInvasion {
    /// Raider name.
    pub attacker_name: String,
    /// Raider town level.
    pub attacker_town_level: u32,
    /// Raider strength, whole percent.
    pub strength_pct: u32,
    /// Raider greed, whole percent.
    pub greed_pct: u32,
    /// When the raid began.
    pub started_at: Timestamp,
    /// Outcome once resolved, shown until the display window closes or it is
    /// acknowledged.
    #[serde(default)]
    pub result: Option<InvasionRecord>,
}

impl NpcInvasion {
    /// Start a raid by `raider`.
    #[must_use]
    pub fn start(raider: &NpcRaider, now: Timestamp) -> Self {
        Self {
            attacker_name: raider.name.to_string(),
            attacker_town_level: raider.town_level,
            strength_pct: raider.strength_pct,
            greed_pct: raider.greed_pct,
            started_at: now,
            result: None,
        }
    }

    /// Attack power, in tenths.
    #[must_use]
    pub fn attack_deci(&self) -> u64 {
        u64::from(self.attacker_town_level) * 5 * u64::from(self.strength_pct)
    }
}

/// Active invasions and NPC invasion history.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvasionState {
    /// Neighbor invasion in progress or on display.
    pub neighbor: Option<NeighborInvasion>,
    /// NPC raid in progress or on display.
    pub npc: Option<NpcInvasion>,
    /// When the last NPC raid resolved.
    #[serde(alias = "lastInvasionTime")]
    pub last_npc_at: Option<Timestamp>,
    /// Settled NPC raids, newest first.
    #[serde(alias = "invasionHistory")]
    pub history: RingBuffer<InvasionRecord, INVASION_HISTORY_CAPACITY>,
}

impl InvasionState {
    /// Whether a new NPC raid may be rolled at `now`.
    #[must_use]
    pub fn npc_ready(&self, now: Timestamp, cooldown_ms: u64) -> bool {
        self.npc.is_none()
            && self
                .last_npc_at
                .map_or(true, |last| now.saturating_sub(last) >= cooldown_ms)
    }

    /// Roll the NPC trigger. Returns the raid started, if any.
    pub fn roll_npc<R: RngCore + ?Sized>(
        &mut self,
        average_fatigue: u32,
        town_level: u32,
        now: Timestamp,
        cooldown_ms: u64,
        rng: &mut R,
    ) -> Option<&NpcInvasion> {
        if !self.npc_ready(now, cooldown_ms) {
            return None;
        }
        let p = npc_invasion_chance(average_fatigue)?;
        if !chance(rng, p) {
            return None;
        }
        let roster = eligible_raiders(town_level);
        let raider = pick(rng, &roster)?;
        self.npc = Some(NpcInvasion::start(raider, now));
        self.npc.as_ref()
    }
}

/// What the defender path produced for a neighbor invasion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborDefense {
    /// Combat outcome.
    pub outcome: DefenseOutcome,
    /// Settled result.
    pub result: InvasionResult,
}

/// Resolve a neighbor invasion against the player's stores.
///
/// A failed defense loses 15 % to 25 % of current balances.
pub fn resolve_neighbor<R: RngCore + ?Sized>(
    invasion: &NeighborInvasion,
    defense_deci: u64,
    resources: &mut ResourceState,
    town_level: u32,
    rng: &mut R,
) -> NeighborDefense {
    let outcome = resolve_defense(defense_deci, invasion.attack_deci(), rng);
    let losses = if outcome.defended {
        Losses::default()
    } else {
        // 15 % plus up to 10 % more, in whole parts per million.
        let rate_ppm = 150_000 + u64::from(roll_below(rng, 100_000));
        plunder(resources, town_level, rate_ppm)
    };
    NeighborDefense {
        outcome,
        result: InvasionResult {
            defended: outcome.defended,
            losses,
            defense_rate: whole_percent(outcome.defense_rate),
        },
    }
}

/// Resolve an NPC raid. Returns the history record.
///
/// A failed defense loses `greed × (1 − defense rate)` of balances and
/// 5 to 19 trophies.
pub fn resolve_npc<R: RngCore + ?Sized>(
    invasion: &NpcInvasion,
    defense_deci: u64,
    resources: &mut ResourceState,
    town_level: u32,
    now: Timestamp,
    rng: &mut R,
) -> InvasionRecord {
    let outcome = resolve_defense(defense_deci, invasion.attack_deci(), rng);
    let mut losses = Losses::default();
    if !outcome.defended {
        let exposed_ppm = PPM.saturating_sub(ppm_of(outcome.defense_rate));
        let rate_ppm = u64::from(invasion.greed_pct) * exposed_ppm / 100;
        losses = plunder(resources, town_level, rate_ppm);
        let trophies = u64::from(roll_inclusive(rng, 5, 19)).min(resources.trophies);
        resources.trophies -= trophies;
        losses.trophies = trophies;
    }
    InvasionRecord {
        attacker_name: invasion.attacker_name.clone(),
        attacker_town_level: invasion.attacker_town_level,
        defended: outcome.defended,
        gold_lost: losses.gold,
        elixir_lost: losses.elixir,
        dark_lost: losses.dark,
        trophies_lost: losses.trophies,
        defense_rate: whole_percent(outcome.defense_rate),
        at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::Neighbor;
    use rand::rngs::mock::StepRng;

    fn stores() -> ResourceState {
        ResourceState {
            gold: 1_000,
            elixir: 2_000,
            dark_elixir: 400,
            gems: 0,
            trophies: 10,
            last_collect_at: 0,
        }
    }

    #[test]
    fn test_npc_chance_tiers() {
        assert_eq!(npc_invasion_chance(51), None);
        assert_eq!(npc_invasion_chance(50), Some(pct(5)));
        assert_eq!(npc_invasion_chance(40), Some(pct(15)));
        assert_eq!(npc_invasion_chance(0), Some(pct(60)));
    }

    #[test]
    fn test_neighbor_chance_tiers() {
        assert_eq!(neighbor_invasion_chance(Personality::Peaceful, -20), None);
        assert_eq!(neighbor_invasion_chance(Personality::Peaceful, -21), Some(pct(5)));
        assert_eq!(neighbor_invasion_chance(Personality::Aggressive, -40), Some(pct(12)));
        assert_eq!(neighbor_invasion_chance(Personality::Greedy, -40), Some(pct(8)));
        assert_eq!(neighbor_invasion_chance(Personality::Theatrical, -60), Some(pct(25)));
        assert_eq!(neighbor_invasion_chance(Personality::Aggressive, -60), Some(pct(15)));
    }

    #[test]
    fn test_raider_roster_window() {
        let names: Vec<_> = eligible_raiders(1).iter().map(|r| r.town_level).collect();
        assert!(names.is_empty());
        let names: Vec<_> = eligible_raiders(5).iter().map(|r| r.town_level).collect();
        assert_eq!(names, vec![3, 4, 5, 6]);
        assert_eq!(NPC_RAIDERS[0].attack_deci(), 450);
    }

    #[test]
    fn test_plunder_dark_gated() {
        let mut res = stores();
        let lost = plunder(&mut res, 6, 500_000);
        assert_eq!((lost.gold, lost.elixir, lost.dark), (500, 1_000, 0));
        let mut res = stores();
        let lost = plunder(&mut res, 7, 500_000);
        assert_eq!(lost.dark, 100);
        assert_eq!(res.dark_elixir, 300);
    }

    #[test]
    fn test_npc_cooldown() {
        let mut state = InvasionState::default();
        let mut rng = StepRng::new(0, 0);
        assert!(state.roll_npc(0, 5, 1_000, 300_000, &mut rng).is_some());
        assert!(state.roll_npc(0, 5, 1_000, 300_000, &mut rng).is_none());
        state.npc = None;
        state.last_npc_at = Some(1_000);
        assert!(!state.npc_ready(300_999, 300_000));
        assert!(state.npc_ready(301_000, 300_000));
    }

    #[test]
    fn test_npc_defeat_costs_trophies() {
        let raid = NpcInvasion::start(&NPC_RAIDERS[6], 0);
        let mut res = stores();
        let record = resolve_npc(&raid, 0, &mut res, 1, 5, &mut StepRng::new(0, 0));
        assert!(!record.defended);
        // Defense rate 0: greed 45 % of balances.
        assert_eq!(record.gold_lost, 450);
        assert_eq!(record.elixir_lost, 900);
        assert_eq!(record.trophies_lost, 5);
        assert_eq!(res.trophies, 5);
        assert_eq!(res.gold, 1_000 - record.gold_lost);
    }

    #[test]
    fn test_plunder_whole_percent_is_exact() {
        let mut res = stores();
        let lost = plunder(&mut res, 1, 150_000);
        assert_eq!((lost.gold, lost.elixir), (150, 300));
        assert_eq!((res.gold, res.elixir), (850, 1_700));
    }

    #[test]
    fn test_plunder_rate_capped_at_everything() {
        let mut res = stores();
        let lost = plunder(&mut res, 7, 2 * PPM);
        assert_eq!((lost.gold, lost.elixir, lost.dark), (1_000, 2_000, 200));
        assert_eq!(res.gold, 0);
    }

    #[test]
    fn test_neighbor_defeat_loses_at_least_fifteen_percent() {
        let neighbor = Neighbor::generate(10, 0, 0, &mut StepRng::new(0, 0));
        let invasion = NeighborInvasion::muster(&neighbor, 0);
        let mut res = stores();
        // No defense and the lowest loss roll.
        let defense = resolve_neighbor(&invasion, 0, &mut res, 1, &mut StepRng::new(0, 0));
        assert!(!defense.result.defended);
        assert_eq!(defense.result.losses.gold, 150);
        assert_eq!(defense.result.losses.elixir, 300);
        assert_eq!(res.gold, 850);
    }

    #[test]
    fn test_neighbor_invasion_repelled() {
        let neighbor = Neighbor::generate(10, 0, 0, &mut StepRng::new(0, 0));
        let invasion = NeighborInvasion::muster(&neighbor, 0);
        assert_eq!(invasion.troops.len(), 2);
        let mut res = stores();
        let defense = resolve_neighbor(&invasion, 1_000_000, &mut res, 1, &mut StepRng::new(0, 0));
        assert!(defense.result.defended);
        assert_eq!(defense.result.losses, Losses::default());
        assert_eq!(res, stores());
    }
}
