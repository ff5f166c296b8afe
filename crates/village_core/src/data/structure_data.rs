//! Static per-structure lookup tables.
//!
//! Every table is indexed by 1-based level. Lookups past the end of a table
//! fall back to the documented default for that table rather than panicking,
//! since saves from older builds may carry levels the tables no longer cover.

use serde::{Deserialize, Serialize};

/// Type of an upgradeable structure.
///
/// Serialized in lowercase (`"goldmine"`, `"darkelixirdrill"`) to match the
/// snapshot schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureKind {
    /// Town hall. Its level is the global town level.
    TownHall,
    /// Gold producer.
    GoldMine,
    /// Elixir producer.
    ElixirCollector,
    /// Gold storage.
    GoldStorage,
    /// Elixir storage.
    ElixirStorage,
    /// Army capacity.
    Barracks,
    /// Dark army capacity.
    DarkBarracks,
    /// Basic defense.
    Cannon,
    /// Ranged defense.
    ArcherTower,
    /// Splash defense.
    Mortar,
    /// Anti-air defense.
    AirDefense,
    /// Splash magic defense.
    WizardTower,
    /// Heavy crossbow.
    XBow,
    /// Research building.
    Laboratory,
    /// Dark elixir producer.
    DarkElixirDrill,
    /// Dark elixir storage.
    DarkStorage,
}

impl StructureKind {
    /// Every structure kind, in declaration order.
    pub const ALL: [StructureKind; 16] = [
        Self::TownHall,
        Self::GoldMine,
        Self::ElixirCollector,
        Self::GoldStorage,
        Self::ElixirStorage,
        Self::Barracks,
        Self::DarkBarracks,
        Self::Cannon,
        Self::ArcherTower,
        Self::Mortar,
        Self::AirDefense,
        Self::WizardTower,
        Self::XBow,
        Self::Laboratory,
        Self::DarkElixirDrill,
        Self::DarkStorage,
    ];

    /// Display name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::TownHall => "Town Hall",
            Self::GoldMine => "Gold Mine",
            Self::ElixirCollector => "Elixir Collector",
            Self::GoldStorage => "Gold Storage",
            Self::ElixirStorage => "Elixir Storage",
            Self::Barracks => "Barracks",
            Self::DarkBarracks => "Dark Barracks",
            Self::Cannon => "Cannon",
            Self::ArcherTower => "Archer Tower",
            Self::Mortar => "Mortar",
            Self::AirDefense => "Air Defense",
            Self::WizardTower => "Wizard Tower",
            Self::XBow => "X-Bow",
            Self::Laboratory => "Laboratory",
            Self::DarkElixirDrill => "Dark Elixir Drill",
            Self::DarkStorage => "Dark Elixir Storage",
        }
    }

    /// Canonical maximum level. Save repair overwrites stored values with this.
    #[must_use]
    pub const fn max_level(self) -> u32 {
        match self {
            Self::TownHall
            | Self::GoldMine
            | Self::ElixirCollector
            | Self::GoldStorage
            | Self::ElixirStorage
            | Self::Cannon => 9,
            Self::Barracks | Self::ArcherTower => 8,
            Self::Mortar | Self::Laboratory => 5,
            Self::AirDefense | Self::WizardTower => 4,
            Self::DarkBarracks | Self::DarkElixirDrill | Self::DarkStorage => 3,
            Self::XBow => 2,
        }
    }

    /// Upgrade durations in seconds, indexed by `current_level - 1`.
    #[must_use]
    pub const fn upgrade_seconds(self) -> &'static [u64] {
        match self {
            Self::TownHall => &[10, 10, 450, 900, 1800, 2700, 3600, 7200],
            Self::GoldMine | Self::ElixirCollector | Self::GoldStorage | Self::ElixirStorage => {
                &[10, 30, 150, 300, 600, 900, 1200, 1500]
            }
            Self::Barracks => &[30, 150, 300, 600, 900, 1200, 1800],
            Self::Cannon => &[30, 150, 300, 600, 900, 1200, 1500, 1800],
            Self::ArcherTower => &[150, 300, 600, 900, 1200, 1500, 1800],
            Self::Mortar => &[600, 900, 1200, 1500],
            Self::Laboratory => &[900, 1800, 2700, 3600],
            Self::DarkElixirDrill | Self::DarkStorage => &[900, 1800],
            Self::DarkBarracks => &[1800, 2700],
            Self::AirDefense | Self::WizardTower => &[900, 1200, 1500],
            Self::XBow => &[3600],
        }
    }

    /// Upgrade duration for a structure at `current_level`.
    ///
    /// Levels beyond the table reuse its last entry.
    #[must_use]
    pub fn upgrade_duration_secs(self, current_level: u32) -> u64 {
        let table = self.upgrade_seconds();
        let index = current_level.saturating_sub(1) as usize;
        table
            .get(index)
            .or_else(|| table.last())
            .copied()
            .unwrap_or(DEFAULT_UPGRADE_SECONDS)
    }

    /// Base defense contributed per level per copy.
    #[must_use]
    pub const fn base_defense(self) -> Option<u64> {
        match self {
            Self::Cannon => Some(10),
            Self::ArcherTower => Some(12),
            Self::Mortar => Some(15),
            Self::AirDefense => Some(20),
            Self::WizardTower => Some(25),
            _ => None,
        }
    }

    /// Whether this structure is a gold or elixir storage.
    #[must_use]
    pub const fn is_basic_storage(self) -> bool {
        matches!(self, Self::GoldStorage | Self::ElixirStorage)
    }
}

impl std::fmt::Display for StructureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Fallback upgrade duration for an empty table.
pub const DEFAULT_UPGRADE_SECONDS: u64 = 60;

/// Gold/elixir storage capacity per copy by level.
const BASIC_STORAGE_CAPACITY: [u64; 9] = [
    1_000, 2_500, 3_334, 12_500, 20_000, 50_000, 100_000, 250_000, 400_000,
];

/// Dark elixir storage capacity per copy by level.
const DARK_STORAGE_CAPACITY: [u64; 3] = [5_000, 7_500, 10_000];

/// Gold/elixir/dark base capacity supplied by the town hall itself.
const TOWN_BASE_CAPACITY: [(u64, u64, u64); 9] = [
    (1_000, 1_000, 0),
    (2_000, 2_000, 0),
    (3_000, 3_000, 0),
    (5_000, 5_000, 0),
    (10_000, 10_000, 0),
    (20_000, 20_000, 0),
    (30_000, 30_000, 1_000),
    (50_000, 50_000, 2_000),
    (80_000, 80_000, 5_000),
];

/// Gold/elixir production per minute per copy by level.
const BASIC_PRODUCTION: [u64; 9] = [10, 15, 20, 30, 40, 50, 60, 70, 80];

/// Dark elixir production per minute per copy by level.
const DARK_PRODUCTION: [u64; 3] = [5, 8, 10];

/// Army capacity per barracks by level.
const BARRACKS_CAPACITY: [u64; 8] = [15, 20, 25, 30, 35, 40, 45, 50];

/// Army capacity per dark barracks by level.
const DARK_BARRACKS_CAPACITY: [u64; 3] = [10, 15, 20];

/// Highest level gold/elixir storages may reach at each town level.
const STORAGE_MAX_LEVEL_BY_TOWN: [u32; 9] = [2, 4, 5, 6, 9, 9, 9, 9, 9];

/// Most gold/elixir storages allowed at each town level.
const STORAGE_MAX_COUNT_BY_TOWN: [u32; 9] = [2, 3, 4, 5, 6, 8, 8, 8, 8];

fn level_lookup<T: Copy>(table: &[T], level: u32) -> Option<T> {
    level
        .checked_sub(1)
        .and_then(|i| table.get(i as usize))
        .copied()
}

/// Capacity of one gold or elixir storage at `level`.
#[must_use]
pub fn basic_storage_capacity(level: u32) -> u64 {
    level_lookup(&BASIC_STORAGE_CAPACITY, level).unwrap_or(1_000)
}

/// Capacity of one dark elixir storage at `level`.
#[must_use]
pub fn dark_storage_capacity(level: u32) -> u64 {
    level_lookup(&DARK_STORAGE_CAPACITY, level).unwrap_or(2_500)
}

/// Town hall base capacity `(gold, elixir, dark)` at `town_level`.
#[must_use]
pub fn town_base_capacity(town_level: u32) -> (u64, u64, u64) {
    level_lookup(&TOWN_BASE_CAPACITY, town_level).unwrap_or((1_000, 1_000, 0))
}

/// Production per minute of one gold mine or elixir collector at `level`.
#[must_use]
pub fn basic_production_rate(level: u32) -> u64 {
    level_lookup(&BASIC_PRODUCTION, level).unwrap_or(10)
}

/// Production per minute of one dark elixir drill at `level`.
#[must_use]
pub fn dark_production_rate(level: u32) -> u64 {
    level_lookup(&DARK_PRODUCTION, level).unwrap_or(5)
}

/// Army capacity of one barracks at `level`.
#[must_use]
pub fn barracks_capacity(level: u32) -> u64 {
    level_lookup(&BARRACKS_CAPACITY, level).unwrap_or(15)
}

/// Army capacity of one dark barracks at `level`.
#[must_use]
pub fn dark_barracks_capacity(level: u32) -> u64 {
    level_lookup(&DARK_BARRACKS_CAPACITY, level).unwrap_or(10)
}

/// Highest level a gold/elixir storage may reach at `town_level`.
#[must_use]
pub fn storage_max_level(town_level: u32) -> u32 {
    level_lookup(&STORAGE_MAX_LEVEL_BY_TOWN, town_level).unwrap_or(1)
}

/// Number of gold/elixir storages allowed at `town_level`.
#[must_use]
pub fn storage_max_count(town_level: u32) -> u32 {
    level_lookup(&STORAGE_MAX_COUNT_BY_TOWN, town_level).unwrap_or(1)
}

/// Town level at which dark elixir production and storage unlock.
pub const DARK_ELIXIR_UNLOCK_TOWN_LEVEL: u32 = 7;

/// Flat defense bonus per town level.
pub const TOWN_DEFENSE_PER_LEVEL: u64 = 20;
