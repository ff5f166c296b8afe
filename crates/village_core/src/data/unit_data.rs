//! Per-unit combat and training data.

use serde::{Deserialize, Serialize};

/// Every troop type the simulation knows about.
///
/// Player units are stored by display name so that saves stay readable;
/// [`UnitKind::from_name`] maps them back for table lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitKind {
    /// Cheap melee.
    Barbarian,
    /// Cheap ranged.
    Archer,
    /// Tank.
    Giant,
    /// Resource raider.
    Goblin,
    /// Wall demolition.
    WallBreaker,
    /// Air bomber.
    Balloon,
    /// Splash caster.
    Wizard,
    /// Air support.
    Healer,
    /// Air heavy.
    Dragon,
    /// Armored heavy.
    Pekka,
    /// Small air splash.
    BabyDragon,
    /// Spinning melee.
    Valkyrie,
    /// Rock tank.
    Golem,
    /// Skeleton summoner.
    Witch,
    /// Dark air.
    Minion,
    /// Fast defense hunter.
    HogRider,
    /// Air tank.
    LavaHound,
    /// Summoned fodder.
    Skeleton,
}

/// Training time for names missing from the table.
pub const DEFAULT_TRAINING_SECONDS: u64 = 5;

/// Deci-power for names missing from the table.
pub const DEFAULT_POWER_DECI: u64 = 10;

impl UnitKind {
    /// Every unit kind.
    pub const ALL: [UnitKind; 18] = [
        Self::Barbarian,
        Self::Archer,
        Self::Giant,
        Self::Goblin,
        Self::WallBreaker,
        Self::Balloon,
        Self::Wizard,
        Self::Healer,
        Self::Dragon,
        Self::Pekka,
        Self::BabyDragon,
        Self::Valkyrie,
        Self::Golem,
        Self::Witch,
        Self::Minion,
        Self::HogRider,
        Self::LavaHound,
        Self::Skeleton,
    ];

    /// Player-facing name, also the storage key for player units.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Barbarian => "Barbarian",
            Self::Archer => "Archer",
            Self::Giant => "Giant",
            Self::Goblin => "Goblin",
            Self::WallBreaker => "Wall Breaker",
            Self::Balloon => "Balloon",
            Self::Wizard => "Wizard",
            Self::Healer => "Healer",
            Self::Dragon => "Dragon",
            Self::Pekka => "P.E.K.K.A",
            Self::BabyDragon => "Baby Dragon",
            Self::Valkyrie => "Valkyrie",
            Self::Golem => "Golem",
            Self::Witch => "Witch",
            Self::Minion => "Minion",
            Self::HogRider => "Hog Rider",
            Self::LavaHound => "Lava Hound",
            Self::Skeleton => "Skeleton",
        }
    }

    /// Resolve a display name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Combat power per unit per level, in tenths.
    ///
    /// Tenths keep fractional units like skeletons exact without floats.
    #[must_use]
    pub const fn power_deci(self) -> u64 {
        match self {
            Self::Skeleton => 3,
            Self::Goblin => 5,
            Self::Barbarian | Self::Archer | Self::Minion => 10,
            Self::WallBreaker => 20,
            Self::Balloon | Self::Wizard => 40,
            Self::Giant | Self::HogRider => 50,
            Self::BabyDragon | Self::Valkyrie => 60,
            Self::Dragon | Self::Witch => 80,
            Self::Healer | Self::Pekka => 100,
            Self::LavaHound => 120,
            Self::Golem => 150,
        }
    }

    /// Seconds to train one unit.
    #[must_use]
    pub const fn training_seconds(self) -> u64 {
        match self {
            Self::Barbarian | Self::Archer | Self::Goblin => 1,
            Self::Minion => 2,
            Self::Giant | Self::WallBreaker | Self::HogRider | Self::Skeleton => 5,
            Self::Wizard => 10,
            Self::Balloon | Self::Dragon => 30,
            Self::BabyDragon | Self::Valkyrie => 45,
            Self::Healer | Self::Pekka | Self::Golem | Self::Witch | Self::LavaHound => 60,
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Deci-power for a unit stored by name.
#[must_use]
pub fn power_deci_for(name: &str) -> u64 {
    UnitKind::from_name(name).map_or(DEFAULT_POWER_DECI, UnitKind::power_deci)
}

/// Training seconds for a unit stored by name.
#[must_use]
pub fn training_seconds_for(name: &str) -> u64 {
    UnitKind::from_name(name).map_or(DEFAULT_TRAINING_SECONDS, UnitKind::training_seconds)
}
