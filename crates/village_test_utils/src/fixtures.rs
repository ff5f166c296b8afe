//! Test fixtures and helpers.
//!
//! Pre-built configurations, engines and states for consistent testing.

use rand::rngs::mock::StepRng;
use village_core::clock::Timestamp;
use village_core::config::GameConfig;
use village_core::economy::ResourceKind;
use village_core::engine::Engine;
use village_core::neighbors::{self, NeighborId};
use village_core::persistence::MemoryStorage;
use village_core::state::GameState;

/// Interval long enough that a periodic sweep never fires in a test.
pub const NEVER: u64 = u64::MAX / 4;

/// Default config with every periodic sweep disabled.
///
/// Collection, completions and scheduled events still run, so tests can
/// exercise one mechanic without drift or invasions interfering.
#[must_use]
pub fn quiet_config() -> GameConfig {
    GameConfig {
        drift_interval_ms: NEVER,
        fatigue_interval_ms: NEVER,
        neighbor_growth_interval_ms: NEVER,
        tree_growth_interval_ms: NEVER,
        ..GameConfig::default()
    }
}

/// A seeded engine with in-memory storage.
#[must_use]
pub fn seeded_engine(config: GameConfig, seed: u64, now: Timestamp) -> Engine {
    Engine::seeded(config, seed, now)
}

/// A quiet engine whose generator always returns zero.
///
/// Every chance succeeds, every range roll takes its low end, and every
/// pick takes the first element.
#[must_use]
pub fn pinned_engine(now: Timestamp) -> Engine<StepRng> {
    Engine::load(
        quiet_config(),
        Box::new(MemoryStorage::new()),
        StepRng::new(0, 0),
        now,
    )
}

/// A fresh state built with a zero generator.
#[must_use]
pub fn fresh_state(now: Timestamp) -> GameState {
    GameState::new(&GameConfig::default(), now, &mut StepRng::new(0, 0))
}

/// Set a neighbor's favor directly.
///
/// # Panics
///
/// Panics if the neighbor does not exist.
pub fn set_favor(state: &mut GameState, id: NeighborId, favor: i32) {
    let neighbor = neighbors::find_mut(&mut state.neighbors, id)
        .unwrap_or_else(|| panic!("fixture neighbor {id} missing"));
    neighbor.favor = favor;
}

/// Set a balance directly, bypassing capacity.
pub fn set_balance(state: &mut GameState, kind: ResourceKind, amount: u64) {
    let resources = &mut state.resources;
    match kind {
        ResourceKind::Gold => resources.gold = amount,
        ResourceKind::Elixir => resources.elixir = amount,
        ResourceKind::DarkElixir => resources.dark_elixir = amount,
        ResourceKind::Gems => resources.gems = amount,
    }
}

/// Set the owned count of a unit type.
///
/// # Panics
///
/// Panics if the unit does not exist.
pub fn set_units(state: &mut GameState, name: &str, count: u32) {
    let unit = state
        .units
        .iter_mut()
        .find(|u| u.name == name)
        .unwrap_or_else(|| panic!("fixture unit {name} missing"));
    unit.count = count;
}
