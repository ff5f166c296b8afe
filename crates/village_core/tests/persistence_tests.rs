//! Persistence tests: save, reload, corrupt saves and catch-up after a gap.

use rand::rngs::mock::StepRng;
use village_core::config::GameConfig;
use village_core::economy::ResourceKind;
use village_core::engine::{Engine, EngineEvent};
use village_core::neighbors;
use village_core::obstacles::TreeKind;
use village_core::persistence::{MemoryStorage, StoragePort};
use village_core::state::ThemeMode;
use village_core::workers::UpgradeTarget;
use village_test_utils::determinism::{verify_snapshot_round_trip, SESSION_START};
use village_test_utils::fixtures::{pinned_engine, quiet_config};

const T0: u64 = 1_000;

fn reload(engine: &Engine<StepRng>, now: u64) -> Engine<StepRng> {
    let key = engine.config().save_key.clone();
    let raw = engine
        .persistence()
        .storage()
        .get(&key)
        .unwrap()
        .expect("a save was written");
    Engine::load(
        engine.config().clone(),
        Box::new(MemoryStorage::with_entry(&key, &raw)),
        StepRng::new(0, 0),
        now,
    )
}

// =============================================================================
// Save and Reload
// =============================================================================

#[test]
fn test_saved_village_reloads_identically() {
    let mut engine = pinned_engine(T0);
    engine.spend(ResourceKind::Gold, 123).unwrap();
    engine.start_upgrade(2, T0).unwrap();
    assert!(engine.save(T0).unwrap());

    let reloaded = reload(&engine, T0);
    assert_eq!(reloaded.state(), engine.state());
}

#[test]
fn test_upgrade_finishes_after_reload() {
    let mut engine = pinned_engine(T0);
    let started = engine.start_upgrade(2, T0).unwrap();
    engine.save(T0).unwrap();

    let mut reloaded = reload(&engine, T0 + 60_000);
    let events = reloaded.advance(T0 + 60_000);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::UpgradeCompleted { level: 2, .. })));
    assert!(started.end_at <= T0 + 60_000);
    assert_eq!(reloaded.state().workers.idle_count(), 1);
}

#[test]
fn test_corrupt_save_starts_fresh() {
    let config = quiet_config();
    let storage = MemoryStorage::with_entry(&config.save_key, "{ not json");
    let engine = Engine::load(config, Box::new(storage), StepRng::new(0, 0), T0);
    assert_eq!(engine.state().town_level, 1);
    assert_eq!(engine.state().resources.gold, 500);
    assert_eq!(engine.state().neighbors.len(), 10);
}

/// A save as written by the version-1 client.
const VERSION_ONE_SAVE: &str = r#"{
    "version": 1,
    "timestamp": 950,
    "townHallLevel": 2,
    "gold": 900000,
    "elixir": 10,
    "darkElixir": 0,
    "gems": 60,
    "trophies": 12,
    "trees": [{"id": 400, "type": "蘑菇", "grownAt": 300}],
    "lastTreeGrowTime": 600,
    "buildings": [
        {"id": 1, "type": "townhall", "name": "大本营", "level": 2, "maxLevel": 99, "count": 1},
        {"id": 2, "type": "goldmine", "name": "", "level": 3, "maxLevel": 9, "count": 2,
         "upgrading": true, "upgradeEndTime": 90000}
    ],
    "troops": [{"id": 1, "name": "野蛮人", "level": 1, "count": 4, "maxLevel": 9, "population": 1, "unlocked": true}],
    "builders": [
        {"id": 1, "busy": true, "task": "升级金矿", "endTime": 90000, "fatigue": 70},
        {"id": 2, "busy": true, "task": "升级储金罐", "endTime": 80000, "fatigue": 55}
    ],
    "upgradeQueue": [
        {"buildingId": 2, "buildingType": "goldmine", "buildingName": "金矿",
         "startTime": 500, "endTime": 90000, "targetLevel": 4}
    ],
    "trainingQueue": [],
    "lastCollectTime": 900,
    "starterPackClaimed": true,
    "currentResearch": null,
    "themeMode": "dark",
    "resourceMultiplier": 1,
    "heroUpgradeQueue": [],
    "lastFatigueCheckTime": 700,
    "npcInvasion": {"lastInvasionTime": 650, "invasionHistory": []},
    "clanCastle": {"level": 0, "troops": [], "spell": null, "lastRequestTime": null, "requestCooldown": 25000},
    "tutorialCompleted": true,
    "neighbors": [{"id": 2, "name": "Old name", "favor": 55, "allied": true, "lastAidTime": 640, "giftHistory": []}],
    "lastNeighborDriftTime": 777,
    "lastNeighborGrowTime": 800,
    "battleHistory": [],
    "donationRequests": []
}"#;

#[test]
fn test_version_one_save_is_migrated() {
    let config = quiet_config();
    let storage = MemoryStorage::with_entry(&config.save_key, VERSION_ONE_SAVE);
    let engine = Engine::load(config, Box::new(storage), StepRng::new(0, 0), T0);
    let state = engine.state();

    assert_eq!(state.town_level, 2);
    assert_eq!(state.structures[0].max_level, 9);
    assert_eq!(state.structures[1].name, "Gold Mine");
    assert_eq!(state.resources.gold, state.capacity().gold);
    assert_eq!((state.resources.elixir, state.resources.gems, state.resources.trophies), (10, 60, 12));
    assert_eq!(state.resources.last_collect_at, 900);
    assert_eq!(state.theme_mode, ThemeMode::Dark);
    assert_eq!(state.grove.trees.len(), 1);
    assert_eq!(state.grove.trees[0].kind, TreeKind::Mushroom);
    assert_eq!(state.units[0].count, 4);
    assert_eq!(state.invasions.last_npc_at, Some(650));

    assert_eq!(state.timers.drift_at, Some(777));
    assert_eq!(state.timers.fatigue_at, Some(700));
    assert_eq!(state.timers.neighbor_growth_at, Some(800));
    assert_eq!(state.timers.tree_growth_at, Some(600));

    // The builder holding the queued upgrade stays on it; the other one had
    // no queue entry and is released.
    let pool = &state.workers;
    assert_eq!(pool.workers.len(), 2);
    assert_eq!(pool.jobs.len(), 1);
    assert_eq!(pool.jobs[0].worker_id, Some(1));
    assert_eq!(pool.jobs[0].target, UpgradeTarget::Structure(2));
    assert!(pool.workers[0].busy);
    assert_eq!(pool.workers[0].fatigue, 70);
    assert!(!pool.workers[1].busy);
    assert!(state.structures[1].upgrading);

    assert_eq!(state.neighbors.len(), 10);
    let second = neighbors::find(&state.neighbors, 2).unwrap();
    assert_eq!(second.favor, 55);
    assert!(second.allied);
    assert_eq!(second.last_aid_at, Some(640));
}

#[test]
fn test_version_one_upgrade_completes_and_frees_builder() {
    let config = quiet_config();
    let storage = MemoryStorage::with_entry(&config.save_key, VERSION_ONE_SAVE);
    let mut engine = Engine::load(config, Box::new(storage), StepRng::new(0, 0), T0);

    let events = engine.advance(90_000);
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::UpgradeCompleted {
            target: UpgradeTarget::Structure(2),
            level: 4,
            ..
        }
    )));
    assert_eq!(engine.state().workers.idle_count(), 2);
}

#[test]
fn test_unversioned_save_reads_as_version_one() {
    let config = quiet_config();
    let raw = r#"{"gold": 321, "builders": [{"id": 1, "busy": false, "task": null, "endTime": null}]}"#;
    let storage = MemoryStorage::with_entry(&config.save_key, raw);
    let engine = Engine::load(config, Box::new(storage), StepRng::new(0, 0), T0);
    assert_eq!(engine.state().resources.gold, 321);
    assert_eq!(engine.state().workers.workers[0].fatigue, 100);
}

// =============================================================================
// Autosave
// =============================================================================

#[test]
fn test_autosave_is_debounced() {
    let mut engine = pinned_engine(T0);
    engine.spend(ResourceKind::Gold, 1).unwrap();
    engine.advance(T0 + 500);
    engine.spend(ResourceKind::Gold, 1).unwrap();
    assert_eq!(engine.persistence().writes(), 0);

    // The second mutation restarted the quiet interval.
    assert!(!engine.advance(T0 + 1_000).contains(&EngineEvent::Saved));
    let events = engine.advance(T0 + 1_500);
    assert!(events.contains(&EngineEvent::Saved));
    assert_eq!(engine.persistence().writes(), 1);
    assert!(!engine.advance(T0 + 5_000).contains(&EngineEvent::Saved));
}

#[test]
fn test_snapshot_round_trip_after_busy_session() {
    let config = GameConfig::default();
    for seed in [1, 2, 3] {
        assert!(verify_snapshot_round_trip(
            &config,
            seed,
            SESSION_START + 45 * 60_000
        ));
    }
}
