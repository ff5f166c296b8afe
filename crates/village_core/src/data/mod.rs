//! Static game data.
//!
//! Lookup tables keyed by structure type, unit name, or neighbor archetype.
//! This module holds no state and performs no IO.

mod neighbor_data;
mod structure_data;
mod unit_data;

pub use neighbor_data::{
    dialog, donation_recipe, garrison_recipe, invasion_loadout, Archetype, DonationRecipe,
    GarrisonLine, Personality,
};
pub use structure_data::{
    barracks_capacity, basic_production_rate, basic_storage_capacity, dark_barracks_capacity,
    dark_production_rate, dark_storage_capacity, storage_max_count, storage_max_level,
    town_base_capacity, StructureKind, DARK_ELIXIR_UNLOCK_TOWN_LEVEL, DEFAULT_UPGRADE_SECONDS,
    TOWN_DEFENSE_PER_LEVEL,
};
pub use unit_data::{
    power_deci_for, training_seconds_for, UnitKind, DEFAULT_POWER_DECI, DEFAULT_TRAINING_SECONDS,
};
