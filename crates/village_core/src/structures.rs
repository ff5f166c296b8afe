//! Structure registry.
//!
//! Structures are created once from a fixed template and never deleted. A
//! single record may stand for several identical buildings via `count`.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::data::{
    barracks_capacity, dark_barracks_capacity, storage_max_level, StructureKind,
    TOWN_DEFENSE_PER_LEVEL,
};
use crate::error::{CommandError, CommandResult, Target};

/// Structure identifier.
pub type StructureId = u32;

/// An upgradeable building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Structure {
    /// Identifier, unique within the registry.
    pub id: StructureId,
    /// Building type.
    #[serde(rename = "type")]
    pub kind: StructureKind,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Current level, in `[1, max_level]`.
    #[serde(default = "default_level")]
    pub level: u32,
    /// Level cap. Overwritten with the canonical value on load.
    #[serde(default = "default_level")]
    pub max_level: u32,
    /// Number of identical copies.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Whether an upgrade is in flight.
    #[serde(default)]
    pub upgrading: bool,
    /// End of the in-flight upgrade. Present iff `upgrading`.
    #[serde(default, alias = "upgradeEndTime")]
    pub upgrade_end_at: Option<Timestamp>,
}

const fn default_level() -> u32 {
    1
}

const fn default_count() -> u32 {
    1
}

impl Structure {
    /// A level-1 structure with the canonical cap.
    #[must_use]
    pub fn new(id: StructureId, kind: StructureKind, count: u32) -> Self {
        Self {
            id,
            kind,
            name: kind.display_name().to_string(),
            level: 1,
            max_level: kind.max_level(),
            count,
            upgrading: false,
            upgrade_end_at: None,
        }
    }

    /// Whether the structure is at its cap.
    #[must_use]
    pub const fn is_max_level(&self) -> bool {
        self.level >= self.max_level
    }

    /// Label a worker carries while upgrading this structure.
    #[must_use]
    pub fn task_label(&self) -> String {
        format!("Upgrade {}", self.name)
    }
}

/// The starting village.
#[must_use]
pub fn default_structures() -> Vec<Structure> {
    vec![
        Structure::new(1, StructureKind::TownHall, 1),
        Structure::new(2, StructureKind::GoldMine, 2),
        Structure::new(3, StructureKind::ElixirCollector, 2),
        Structure::new(4, StructureKind::GoldStorage, 1),
        Structure::new(5, StructureKind::ElixirStorage, 1),
        Structure::new(6, StructureKind::Barracks, 1),
        Structure::new(7, StructureKind::Cannon, 1),
    ]
}

/// Look up a structure by id.
#[must_use]
pub fn find(structures: &[Structure], id: StructureId) -> Option<&Structure> {
    structures.iter().find(|s| s.id == id)
}

/// Look up a structure by id, mutably.
pub fn find_mut(structures: &mut [Structure], id: StructureId) -> Option<&mut Structure> {
    structures.iter_mut().find(|s| s.id == id)
}

/// Check every precondition for upgrading `id` except worker availability.
///
/// # Errors
///
/// Not found, already upgrading, max level, or a storage already at the
/// town-level storage cap.
pub fn check_upgradeable(
    structures: &[Structure],
    id: StructureId,
    town_level: u32,
) -> CommandResult<&Structure> {
    let structure =
        find(structures, id).ok_or_else(|| CommandError::not_found(Target::Structure, id))?;
    if structure.upgrading {
        return Err(CommandError::AlreadyUpgrading);
    }
    if structure.is_max_level() {
        return Err(CommandError::MaxLevel {
            max_level: structure.max_level,
        });
    }
    if structure.kind.is_basic_storage() {
        let cap = storage_max_level(town_level);
        if structure.level >= cap {
            return Err(CommandError::TownLevelTooLow {
                required: town_level + 1,
            });
        }
    }
    Ok(structure)
}

/// Mark a structure as upgrading until `end_at`.
pub fn begin_upgrade(structures: &mut [Structure], id: StructureId, end_at: Timestamp) {
    if let Some(s) = find_mut(structures, id) {
        s.upgrading = true;
        s.upgrade_end_at = Some(end_at);
    }
}

/// Apply a finished upgrade. Returns the structure's kind and new level.
pub fn finish_upgrade(
    structures: &mut [Structure],
    id: StructureId,
) -> Option<(StructureKind, u32)> {
    let s = find_mut(structures, id)?;
    s.level = (s.level + 1).min(s.max_level.max(1));
    s.upgrading = false;
    s.upgrade_end_at = None;
    Some((s.kind, s.level))
}

/// Army capacity from barracks and dark barracks.
#[must_use]
pub fn army_capacity(structures: &[Structure]) -> u64 {
    structures
        .iter()
        .map(|s| match s.kind {
            StructureKind::Barracks => barracks_capacity(s.level) * u64::from(s.count),
            StructureKind::DarkBarracks => dark_barracks_capacity(s.level) * u64::from(s.count),
            _ => 0,
        })
        .sum()
}

/// Whole defense power: `Σ base × level × count + town_level × 20`.
#[must_use]
pub fn defense_power(structures: &[Structure], town_level: u32) -> u64 {
    let buildings: u64 = structures
        .iter()
        .filter_map(|s| {
            s.kind
                .base_defense()
                .map(|base| base * u64::from(s.level) * u64::from(s.count))
        })
        .sum();
    buildings + u64::from(town_level) * TOWN_DEFENSE_PER_LEVEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template() {
        let s = default_structures();
        assert_eq!(s.len(), 7);
        assert!(s.iter().all(|s| s.level == 1 && !s.upgrading));
        assert_eq!(find(&s, 6).unwrap().max_level, 8);
    }

    #[test]
    fn test_upgrade_preconditions() {
        let mut s = default_structures();
        assert!(check_upgradeable(&s, 2, 1).is_ok());
        assert!(matches!(
            check_upgradeable(&s, 99, 1),
            Err(CommandError::NotFound { .. })
        ));

        begin_upgrade(&mut s, 2, 10_000);
        assert_eq!(check_upgradeable(&s, 2, 1), Err(CommandError::AlreadyUpgrading));

        find_mut(&mut s, 7).unwrap().level = 9;
        assert_eq!(
            check_upgradeable(&s, 7, 9),
            Err(CommandError::MaxLevel { max_level: 9 })
        );
    }

    #[test]
    fn test_storage_capped_by_town_level() {
        let mut s = default_structures();
        find_mut(&mut s, 4).unwrap().level = 2;
        assert_eq!(
            check_upgradeable(&s, 4, 1),
            Err(CommandError::TownLevelTooLow { required: 2 })
        );
        assert!(check_upgradeable(&s, 4, 2).is_ok());
    }

    #[test]
    fn test_finish_upgrade_clears_flags() {
        let mut s = default_structures();
        begin_upgrade(&mut s, 1, 5);
        assert_eq!(finish_upgrade(&mut s, 1), Some((StructureKind::TownHall, 2)));
        let th = find(&s, 1).unwrap();
        assert!(!th.upgrading);
        assert_eq!(th.upgrade_end_at, None);
    }

    #[test]
    fn test_army_and_defense() {
        let s = default_structures();
        assert_eq!(army_capacity(&s), 15);
        // One level-1 cannon plus town level 1.
        assert_eq!(defense_power(&s, 1), 30);
    }
}
