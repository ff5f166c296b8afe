//! Version-1 save migration.
//!
//! Version-1 documents keep balances at the top level, store builders and the
//! upgrade queue as separate lists, name obstacle kinds in the display
//! language and keep neighbors only as a relationship overlay on a
//! regenerated population. [`migrate`] lifts one into a [`GameState`]; the
//! caller still runs the repair pass afterwards.
//!
//! Every section is read on its own. A section or list entry that fails to
//! decode is logged and dropped, the rest of the save survives.

use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::Timestamp;
use crate::config::GameConfig;
use crate::donations::{DonationBoard, DonationRequest};
use crate::economy::{ResourceKind, ResourceState};
use crate::error::{GameError, Result};
use crate::heroes::default_heroes;
use crate::history::{BattleRecord, InvasionRecord};
use crate::neighbors::{self, GiftKind, GiftRecord, Neighbor, NeighborId};
use crate::obstacles::{Grove, Tree, TreeKind};
use crate::relations::clamp_favor;
use crate::state::{GameState, SweepTimers, ThemeMode};
use crate::structures::default_structures;
use crate::training::{default_units, TrainingJob, TrainingQueue};
use crate::workers::{UpgradeJob, UpgradeTarget, WorkerPool};

/// Obstacle names used by version-1 saves, in [`TreeKind::ALL`] order.
const LEGACY_TREE_NAMES: [&str; 6] = ["橡树", "松树", "灌木", "蘑菇", "石头", "宝箱树"];

/// Top-level sections of a version-1 document.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacySave {
    town_hall_level: Option<Value>,
    gold: Option<Value>,
    elixir: Option<Value>,
    dark_elixir: Option<Value>,
    gems: Option<Value>,
    trophies: Option<Value>,
    last_collect_time: Option<Value>,
    resource_multiplier: Option<Value>,
    theme_mode: Option<Value>,
    buildings: Option<Value>,
    troops: Option<Value>,
    builders: Option<Value>,
    upgrade_queue: Option<Value>,
    training_queue: Option<Value>,
    heroes: Option<Value>,
    hero_upgrade_queue: Option<Value>,
    campaign_progress: Option<Value>,
    clan_castle: Option<Value>,
    npc_invasion: Option<Value>,
    trees: Option<Value>,
    neighbors: Option<Value>,
    battle_history: Option<Value>,
    donation_requests: Option<Value>,
    last_neighbor_drift_time: Option<Value>,
    last_fatigue_check_time: Option<Value>,
    last_neighbor_grow_time: Option<Value>,
    last_tree_grow_time: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyUpgrade {
    building_id: UpgradeTarget,
    #[serde(default)]
    building_name: String,
    #[serde(default)]
    start_time: Timestamp,
    end_time: Timestamp,
    #[serde(default)]
    target_level: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyInvasion {
    attacker_name: String,
    /// A town level for raiders, a label for neighbor invasions.
    #[serde(default, rename = "attackerTH")]
    attacker_th: Value,
    #[serde(default)]
    defended: bool,
    #[serde(default)]
    gold_lost: Value,
    #[serde(default)]
    elixir_lost: Value,
    #[serde(default)]
    dark_lost: Value,
    #[serde(default)]
    defense_rate: Value,
    #[serde(default)]
    time: Value,
}

#[derive(Debug, Deserialize)]
struct LegacyTree {
    id: u64,
    #[serde(rename = "type")]
    kind: Value,
    #[serde(default, rename = "grownAt")]
    grown_at: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyNeighbor {
    id: NeighborId,
    #[serde(default)]
    favor: Value,
    #[serde(default)]
    allied: Option<bool>,
    #[serde(default)]
    last_aid_time: Value,
    #[serde(default)]
    gift_history: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyGift {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    favor_change: Value,
    #[serde(default)]
    time: Value,
}

/// Non-negative whole number, floored. JSON numbers written by the old
/// client may carry a fraction.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.floor() as u64)
    })
}

#[allow(clippy::cast_possible_truncation)]
fn signed(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64))
}

fn whole_u32(value: Option<&Value>) -> Option<u32> {
    value.and_then(whole).map(|n| u32::try_from(n).unwrap_or(u32::MAX))
}

fn section<T: DeserializeOwned>(name: &str, value: Option<Value>) -> Option<T> {
    match serde_json::from_value(value?) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(section = name, error = %e, "Dropped unreadable legacy section");
            None
        }
    }
}

fn entries<T: DeserializeOwned>(name: &str, value: Option<Value>) -> Vec<T> {
    let items = match value {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            warn!(section = name, "Legacy section is not a list");
            return Vec::new();
        }
    };
    let total = items.len();
    let kept: Vec<T> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if kept.len() < total {
        warn!(section = name, dropped = total - kept.len(), "Dropped unreadable legacy entries");
    }
    kept
}

fn tree_kind(value: &Value) -> TreeKind {
    if let Some(name) = value.as_str() {
        if let Some(index) = LEGACY_TREE_NAMES.iter().position(|n| *n == name) {
            return TreeKind::ALL[index];
        }
    }
    serde_json::from_value(value.clone()).unwrap_or(TreeKind::Oak)
}

fn invasion_record(old: LegacyInvasion) -> InvasionRecord {
    InvasionRecord {
        attacker_name: old.attacker_name,
        attacker_town_level: whole_u32(Some(&old.attacker_th)).unwrap_or(0),
        defended: old.defended,
        gold_lost: whole(&old.gold_lost).unwrap_or(0),
        elixir_lost: whole(&old.elixir_lost).unwrap_or(0),
        dark_lost: whole(&old.dark_lost).unwrap_or(0),
        trophies_lost: 0,
        defense_rate: whole_u32(Some(&old.defense_rate)).unwrap_or(0).min(100),
        at: whole(&old.time).unwrap_or(0),
    }
}

fn gift_record(old: LegacyGift) -> Option<GiftRecord> {
    let gift = match old.kind.as_str() {
        "resource" => GiftKind::Resource {
            resource: serde_json::from_value::<ResourceKind>(old.data.get("type")?.clone()).ok()?,
            amount: whole(old.data.get("amount")?)?,
        },
        "troop" => GiftKind::Troop {
            name: old.data.get("troopName")?.as_str()?.to_string(),
            level: whole_u32(old.data.get("level")).unwrap_or(1),
        },
        _ => return None,
    };
    Some(GiftRecord {
        gift,
        favor_change: signed(&old.favor_change)
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or(0),
        at: whole(&old.time).unwrap_or(0),
    })
}

/// Battle records from before the narrative format settled lose their log
/// rather than the whole record.
fn battle_record(item: Value) -> Option<BattleRecord> {
    if let Ok(record) = serde_json::from_value(item.clone()) {
        return Some(record);
    }
    let Value::Object(mut fields) = item else {
        return None;
    };
    fields.remove("battleLog");
    serde_json::from_value(Value::Object(fields)).ok()
}

fn overlay_neighbor(neighbor: &mut Neighbor, saved: LegacyNeighbor) {
    if let Some(favor) = signed(&saved.favor) {
        let favor = i32::try_from(favor).unwrap_or(if favor < 0 { i32::MIN } else { i32::MAX });
        neighbor.favor = clamp_favor(favor);
    }
    if let Some(allied) = saved.allied {
        neighbor.allied = allied;
    }
    neighbor.last_aid_at = whole(&saved.last_aid_time);
    let gifts: Vec<LegacyGift> = entries("giftHistory", saved.gift_history);
    neighbor.gift_history = gifts.into_iter().filter_map(gift_record).collect();
}

/// Rebuild the neighbor population and overlay the saved relationships.
///
/// The population grows to cover the highest saved id, up to the
/// configured cap.
fn neighbors_from<R: RngCore + ?Sized>(
    value: Option<Value>,
    config: &GameConfig,
    now: Timestamp,
    rng: &mut R,
) -> Vec<Neighbor> {
    let saved: Vec<LegacyNeighbor> = entries("neighbors", value);
    let mut population = neighbors::initial_cohort(config.initial_neighbors, now, rng);
    let wanted = saved
        .iter()
        .map(|n| n.id as usize)
        .max()
        .unwrap_or(0)
        .min(config.max_neighbors as usize);
    while population.len() < wanted {
        neighbors::spawn(&mut population, now, now, rng);
    }
    for entry in saved {
        match neighbors::find_mut(&mut population, entry.id) {
            Some(neighbor) => overlay_neighbor(neighbor, entry),
            None => debug!(neighbor = entry.id, "Saved neighbor beyond population cap"),
        }
    }
    population
}

/// Build a state from a version-1 document.
///
/// Missing balances take the starting values. Upgrade jobs come over
/// unbound; repair binds them to the builders that hold them.
///
/// # Errors
///
/// [`GameError::SnapshotParse`] if the document is not a JSON object.
pub fn migrate<R: RngCore + ?Sized>(
    document: Value,
    config: &GameConfig,
    now: Timestamp,
    rng: &mut R,
) -> Result<GameState> {
    if !document.is_object() {
        return Err(GameError::SnapshotParse("legacy save is not an object".into()));
    }
    let save: LegacySave =
        serde_json::from_value(document).map_err(|e| GameError::SnapshotParse(e.to_string()))?;

    let start = ResourceState::new(0);
    let balance = |value: &Option<Value>, fallback: u64| value.as_ref().and_then(whole).unwrap_or(fallback);
    let resources = ResourceState {
        gold: balance(&save.gold, start.gold),
        elixir: balance(&save.elixir, start.elixir),
        dark_elixir: balance(&save.dark_elixir, start.dark_elixir),
        gems: balance(&save.gems, start.gems),
        trophies: balance(&save.trophies, start.trophies),
        last_collect_at: balance(&save.last_collect_time, 0),
    };

    let mut structures = entries("buildings", save.buildings);
    if structures.is_empty() {
        structures = default_structures();
    }
    let mut units = entries("troops", save.troops);
    if units.is_empty() {
        units = default_units();
    }
    let mut heroes = entries("heroes", save.heroes);
    if heroes.is_empty() {
        heroes = default_heroes();
    }

    let training: Vec<TrainingJob> = entries("trainingQueue", save.training_queue);
    let upgrades: Vec<LegacyUpgrade> = entries("upgradeQueue", save.upgrade_queue);
    let workers = WorkerPool {
        workers: entries("builders", save.builders),
        jobs: upgrades
            .into_iter()
            .map(|u| UpgradeJob {
                target: u.building_id,
                target_level: u.target_level,
                started_at: u.start_time,
                end_at: u.end_time,
                worker_id: None,
                label: format!("Upgrade {}", u.building_name),
            })
            .collect(),
    };

    let mut state = GameState {
        town_level: whole_u32(save.town_hall_level.as_ref()).unwrap_or(1),
        multiplier: whole_u32(save.resource_multiplier.as_ref()).unwrap_or(1),
        theme_mode: section::<ThemeMode>("themeMode", save.theme_mode).unwrap_or_default(),
        resources,
        structures,
        workers,
        units,
        training: TrainingQueue::from(training),
        heroes,
        hero_jobs: entries("heroUpgradeQueue", save.hero_upgrade_queue),
        clan_castle: section("clanCastle", save.clan_castle).unwrap_or_default(),
        campaign: section("campaignProgress", save.campaign_progress).unwrap_or_default(),
        timers: SweepTimers {
            drift_at: save.last_neighbor_drift_time.as_ref().and_then(whole),
            fatigue_at: save.last_fatigue_check_time.as_ref().and_then(whole),
            neighbor_growth_at: save.last_neighbor_grow_time.as_ref().and_then(whole),
            tree_growth_at: save.last_tree_grow_time.as_ref().and_then(whole),
        },
        ..GameState::default()
    };

    if let Some(Value::Object(npc)) = save.npc_invasion {
        state.invasions.last_npc_at = npc.get("lastInvasionTime").and_then(whole);
        let records: Vec<LegacyInvasion> =
            entries("invasionHistory", npc.get("invasionHistory").cloned());
        // Stored newest first; pushing oldest first keeps that order.
        for record in records.into_iter().rev() {
            state.invasions.history.push(invasion_record(record));
        }
    }

    let trees: Vec<LegacyTree> = entries("trees", save.trees);
    state.grove = Grove {
        next_id: trees.iter().map(|t| t.id).max().unwrap_or(0),
        trees: trees
            .into_iter()
            .map(|t| Tree {
                id: t.id,
                kind: tree_kind(&t.kind),
                grown_at: whole(&t.grown_at).unwrap_or(0),
            })
            .collect(),
    };

    if let Some(Value::Array(battles)) = save.battle_history {
        let records: Vec<BattleRecord> = battles.into_iter().filter_map(battle_record).collect();
        state.next_battle_id = records.iter().map(|r| r.id).max().unwrap_or(0);
        for record in records.into_iter().rev() {
            state.battle_history.push(record);
        }
    }

    let requests: Vec<DonationRequest> = entries("donationRequests", save.donation_requests);
    state.donations = DonationBoard {
        next_id: requests.iter().map(|r| r.id).max().unwrap_or(0),
        requests,
    };

    state.neighbors = neighbors_from(save.neighbors, config, now, rng);
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use serde_json::json;

    fn migrate_json(document: Value) -> GameState {
        migrate(document, &GameConfig::default(), 50_000, &mut StepRng::new(0, 0)).unwrap()
    }

    // =========================================================================
    // Top-level sections
    // =========================================================================

    #[test]
    fn test_top_level_balances_and_timers() {
        let state = migrate_json(json!({
            "version": 1,
            "townHallLevel": 3,
            "gold": 1234,
            "elixir": 99.7,
            "gems": 7,
            "trophies": 40,
            "lastCollectTime": 12_000,
            "resourceMultiplier": 2,
            "themeMode": "dark",
            "lastNeighborDriftTime": 777,
            "lastFatigueCheckTime": 888,
            "lastNeighborGrowTime": 999,
            "lastTreeGrowTime": 1_111
        }));
        assert_eq!(state.town_level, 3);
        assert_eq!(state.resources.gold, 1_234);
        assert_eq!(state.resources.elixir, 99);
        assert_eq!(state.resources.dark_elixir, 0);
        assert_eq!(state.resources.gems, 7);
        assert_eq!(state.resources.trophies, 40);
        assert_eq!(state.resources.last_collect_at, 12_000);
        assert_eq!(state.multiplier, 2);
        assert_eq!(state.theme_mode, ThemeMode::Dark);
        assert_eq!(
            state.timers,
            SweepTimers {
                drift_at: Some(777),
                fatigue_at: Some(888),
                neighbor_growth_at: Some(999),
                tree_growth_at: Some(1_111),
            }
        );
    }

    #[test]
    fn test_missing_balances_take_starting_values() {
        let state = migrate_json(json!({ "version": 1 }));
        let start = ResourceState::new(0);
        assert_eq!(state.resources.gold, start.gold);
        assert_eq!(state.resources.gems, start.gems);
        assert_eq!(state.structures.len(), default_structures().len());
        assert_eq!(state.workers, WorkerPool { jobs: Vec::new(), workers: Vec::new() });
        assert_eq!(state.timers, SweepTimers::default());
    }

    #[test]
    fn test_non_object_rejected() {
        let err = migrate(json!([1, 2]), &GameConfig::default(), 0, &mut StepRng::new(0, 0));
        assert!(matches!(err, Err(GameError::SnapshotParse(_))));
    }

    // =========================================================================
    // Builders and queues
    // =========================================================================

    #[test]
    fn test_builders_and_upgrade_queue() {
        let state = migrate_json(json!({
            "builders": [
                {"id": 1, "busy": true, "task": "升级金矿", "endTime": 90_000, "fatigue": 62},
                {"id": 2, "busy": false, "task": null, "endTime": null}
            ],
            "upgradeQueue": [
                {"buildingId": 2, "buildingType": "goldmine", "buildingName": "金矿",
                 "startTime": 30_000, "endTime": 90_000, "targetLevel": 2},
                {"buildingId": "clancastle", "buildingType": "clancastle", "buildingName": "部落城堡",
                 "startTime": 30_000, "endTime": 95_000, "targetLevel": 1}
            ]
        }));
        let pool = &state.workers;
        assert_eq!(pool.workers.len(), 2);
        assert_eq!(pool.workers[0].fatigue, 62);
        assert_eq!(pool.workers[0].task_label.as_deref(), Some("升级金矿"));
        assert_eq!(pool.workers[1].fatigue, 100);
        assert_eq!(pool.jobs.len(), 2);
        assert_eq!(pool.jobs[0].target, UpgradeTarget::Structure(2));
        assert_eq!(pool.jobs[0].label, "Upgrade 金矿");
        assert_eq!(pool.jobs[1].target, UpgradeTarget::CLAN_CASTLE);
        assert!(pool.jobs.iter().all(|j| j.worker_id.is_none()));
    }

    #[test]
    fn test_bad_entries_dropped_individually() {
        let state = migrate_json(json!({
            "builders": [{"id": 1}, {"id": "one"}, "junk"],
            "heroes": "not a list"
        }));
        assert_eq!(state.workers.workers.len(), 1);
        assert_eq!(state.heroes, default_heroes());
    }

    // =========================================================================
    // Obstacles, history and neighbors
    // =========================================================================

    #[test]
    fn test_tree_names_mapped_in_order() {
        let state = migrate_json(json!({
            "trees": [
                {"id": 10, "type": "松树", "grownAt": 5},
                {"id": 12, "type": "宝箱树", "grownAt": 6},
                {"id": 11, "type": "unknown", "grownAt": 7}
            ]
        }));
        let kinds: Vec<_> = state.grove.trees.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TreeKind::Pine, TreeKind::TreasureTree, TreeKind::Oak]);
        assert_eq!(state.grove.next_id, 12);
    }

    #[test]
    fn test_invasion_history_keeps_newest_first() {
        let state = migrate_json(json!({
            "npcInvasion": {
                "lastInvasionTime": 40_000,
                "invasionHistory": [
                    {"attackerName": "Neighbor army", "attackerTH": "邻邦", "defended": false,
                     "goldLost": 150, "elixirLost": 300, "darkLost": 0, "defenseRate": 35, "time": 40_000},
                    {"attackerName": "Goblins", "attackerTH": 4, "defended": true,
                     "goldLost": 0, "elixirLost": 0, "darkLost": 0, "defenseRate": 80, "time": 20_000}
                ]
            }
        }));
        let invasions = &state.invasions;
        assert_eq!(invasions.last_npc_at, Some(40_000));
        let names: Vec<_> = invasions.history.iter().map(|r| r.attacker_name.as_str()).collect();
        assert_eq!(names, vec!["Neighbor army", "Goblins"]);
        let latest = invasions.history.latest().unwrap();
        assert_eq!((latest.attacker_town_level, latest.gold_lost), (0, 150));
    }

    #[test]
    fn test_neighbors_regenerated_with_saved_relationships() {
        let state = migrate_json(json!({
            "neighbors": [
                {"id": 3, "name": "ignored", "favor": 140, "allied": true, "lastAidTime": 9_000,
                 "giftHistory": [
                    {"type": "resource", "data": {"type": "gems", "amount": 20}, "favorChange": 15, "time": 8_000},
                    {"type": "troop", "data": {"troopId": 1, "troopName": "野蛮人", "level": 2}, "favorChange": 5, "time": 8_500},
                    {"type": "mystery", "data": {}, "favorChange": 1, "time": 8_600}
                 ]},
                {"id": 12, "favor": -30}
            ]
        }));
        let config = GameConfig::default();
        assert_eq!(state.neighbors.len(), 12.max(config.initial_neighbors as usize));
        let third = neighbors::find(&state.neighbors, 3).unwrap();
        assert_eq!(third.favor, 100);
        assert!(third.allied);
        assert_eq!(third.last_aid_at, Some(9_000));
        assert_eq!(third.gift_history.len(), 2);
        assert_eq!(
            third.gift_history[0].gift,
            GiftKind::Resource {
                resource: ResourceKind::Gems,
                amount: 20
            }
        );
        assert_eq!(neighbors::find(&state.neighbors, 12).unwrap().favor, -30);
    }

    #[test]
    fn test_battle_record_with_unknown_log_keeps_outcome() {
        let state = migrate_json(json!({
            "battleHistory": [
                {"id": 5, "type": "attack", "target": "Farmer", "victory": true,
                 "playerPower": 40, "enemyPower": 30, "loot": {"gold": 120, "elixir": 80, "dark": 0},
                 "battleLog": [{"phase": "old format"}], "time": 7_000}
            ]
        }));
        assert_eq!(state.battle_history.len(), 1);
        assert_eq!(state.next_battle_id, 5);
        assert!(state.battle_history.latest().unwrap().battle_log.is_empty());
    }
}
