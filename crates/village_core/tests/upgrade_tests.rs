//! Upgrade tests: worker binding, completion, town level and clan castle.

use village_core::data::StructureKind;
use village_core::economy::ResourceKind;
use village_core::engine::EngineEvent;
use village_core::error::CommandError;
use village_core::workers::UpgradeTarget;
use village_test_utils::fixtures::{pinned_engine, set_balance};

const T0: u64 = 1_000;

fn idle_matches_flags(engine: &village_core::engine::Engine<rand::rngs::mock::StepRng>) -> bool {
    let pool = &engine.state().workers;
    let bound = pool.jobs.iter().filter(|j| j.worker_id.is_some()).count();
    pool.idle_count() == pool.workers.len() - bound
}

// =============================================================================
// Worker Binding
// =============================================================================

#[test]
fn test_single_worker_upgrade_scenario() {
    let mut engine = pinned_engine(T0);
    let gold_mine = engine
        .state()
        .structures
        .iter()
        .find(|s| s.kind == StructureKind::GoldMine)
        .map(|s| s.id)
        .unwrap();

    let started = engine.start_upgrade(gold_mine, T0).unwrap();
    assert_eq!(started.end_at, T0 + 10_000);
    assert_eq!(engine.start_upgrade(3, T0 + 1), Err(CommandError::NoIdleWorker));
    assert!(idle_matches_flags(&engine));
}

#[test]
fn test_upgrading_producer_stops_production() {
    let mut engine = pinned_engine(T0);
    engine.start_upgrade(2, T0).unwrap();
    assert_eq!(engine.state().production().gold, 0);

    engine.advance(T0 + 10_000);
    assert_eq!(engine.state().structures[1].level, 2);
    assert!(engine.state().production().gold > 20);
}

#[test]
fn test_completion_frees_exactly_the_bound_worker() {
    let mut engine = pinned_engine(T0);
    set_balance(engine.state_mut(), ResourceKind::Gems, 1_000);
    let second = engine.hire_worker().unwrap();
    assert_eq!(engine.state().workers.workers.len(), 2);

    let first = engine.start_upgrade(2, T0).unwrap();
    let other = engine.start_upgrade(3, T0).unwrap();
    assert_eq!(first.worker_id, 1);
    assert_eq!(other.worker_id, second);
    assert_eq!(engine.state().workers.idle_count(), 0);

    let events = engine.advance(first.end_at);
    assert!(events.contains(&EngineEvent::UpgradeCompleted {
        target: UpgradeTarget::Structure(2),
        level: 2,
    }));
    let pool = &engine.state().workers;
    assert!(!pool.worker(first.worker_id).unwrap().busy);
    assert_eq!(pool.worker(second).unwrap().busy, other.end_at > first.end_at);
    assert!(idle_matches_flags(&engine));
}

#[test]
fn test_hire_costs_gems_and_caps() {
    let mut engine = pinned_engine(T0);
    assert!(matches!(
        engine.hire_worker(),
        Err(CommandError::InsufficientResource { resource: ResourceKind::Gems, .. })
    ));

    set_balance(engine.state_mut(), ResourceKind::Gems, 1_000_000);
    for _ in 0..4 {
        engine.hire_worker().unwrap();
    }
    assert!(matches!(
        engine.hire_worker(),
        Err(CommandError::CapacityExceeded { .. })
    ));
    assert_eq!(engine.state().workers.workers.len(), 5);
}

#[test]
fn test_restore_fatigue_charges_gems() {
    let mut engine = pinned_engine(T0);
    engine.state_mut().workers.workers[0].fatigue = 40;
    let restored = engine.restore_worker_fatigue(Some(1), 30).unwrap();
    assert_eq!(restored.workers, 1);
    assert_eq!(engine.state().workers.workers[0].fatigue, 70);
    assert_eq!(engine.state().resources.gems, 50 - restored.gems_spent);

    assert!(matches!(
        engine.restore_worker_fatigue(Some(9), 10),
        Err(CommandError::NotFound { .. })
    ));
}

// =============================================================================
// Town Level and Storage Gates
// =============================================================================

#[test]
fn test_town_hall_completion_raises_town_level() {
    let mut engine = pinned_engine(T0);
    let started = engine.start_upgrade(1, T0).unwrap();
    let events = engine.advance(started.end_at);
    assert!(events.contains(&EngineEvent::TownLevelChanged(2)));
    assert_eq!(engine.state().town_level, 2);
}

#[test]
fn test_unknown_structure_is_not_found() {
    let mut engine = pinned_engine(T0);
    assert!(matches!(
        engine.start_upgrade(99, T0),
        Err(CommandError::NotFound { id: 99, .. })
    ));
    assert_eq!(engine.state().workers.idle_count(), 1);
}

// =============================================================================
// Clan Castle
// =============================================================================

#[test]
fn test_clan_castle_needs_town_level() {
    let mut engine = pinned_engine(T0);
    let gold = engine.state().resources.gold;
    assert!(matches!(
        engine.upgrade_clan_castle(T0),
        Err(CommandError::TownLevelTooLow { .. })
    ));
    assert_eq!(engine.state().resources.gold, gold);
}

#[test]
fn test_clan_castle_builds_through_worker_pool() {
    let mut engine = pinned_engine(T0);
    engine.state_mut().town_level = 5;
    set_balance(engine.state_mut(), ResourceKind::Gold, 100_000);

    let started = engine.upgrade_clan_castle(T0).unwrap();
    assert_eq!(started.target_level, 1);
    assert!(engine.state().resources.gold < 100_000);
    assert!(matches!(
        engine.upgrade_clan_castle(T0),
        Err(CommandError::AlreadyUpgrading)
    ));

    engine.advance(started.end_at);
    assert_eq!(engine.state().clan_castle.level, 1);
    assert_eq!(engine.state().workers.idle_count(), 1);
}
