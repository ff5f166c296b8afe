//! Obstacles that grow around the village.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::error::{CommandError, CommandResult, Target};
use crate::math::{chance, pct, pick, roll_inclusive};

/// Elixir charged to clear an obstacle.
pub const REMOVAL_COST_ELIXIR: u64 = 100;

/// Obstacle kind. Cosmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeKind {
    /// Oak.
    Oak,
    /// Pine.
    Pine,
    /// Bush.
    Bush,
    /// Mushroom.
    Mushroom,
    /// Rock.
    Rock,
    /// Treasure tree.
    TreasureTree,
}

impl TreeKind {
    pub(crate) const ALL: [TreeKind; 6] = [
        Self::Oak,
        Self::Pine,
        Self::Bush,
        Self::Mushroom,
        Self::Rock,
        Self::TreasureTree,
    ];
}

/// A removable obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tree {
    /// Identifier.
    pub id: u64,
    /// Kind.
    #[serde(rename = "type")]
    pub kind: TreeKind,
    /// When it appeared.
    pub grown_at: Timestamp,
}

/// Obstacles on the map.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Grove {
    /// Current obstacles.
    pub trees: Vec<Tree>,
    /// Next obstacle id.
    pub next_id: u64,
}

impl Grove {
    /// Half the time, grow one obstacle if below `max`.
    pub fn try_grow<R: RngCore + ?Sized>(&mut self, now: Timestamp, max: u32, rng: &mut R) -> Option<&Tree> {
        if !chance(rng, pct(50)) || self.trees.len() >= max as usize {
            return None;
        }
        let kind = pick(rng, &TreeKind::ALL).copied().unwrap_or(TreeKind::Oak);
        self.next_id += 1;
        self.trees.push(Tree {
            id: self.next_id,
            kind,
            grown_at: now,
        });
        self.trees.last()
    }

    /// Remove an obstacle.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotFound`] for an unknown id.
    pub fn remove(&mut self, id: u64) -> CommandResult<Tree> {
        let index = self
            .trees
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| CommandError::not_found(Target::Tree, id))?;
        Ok(self.trees.remove(index))
    }
}

/// Gems found under a cleared obstacle: 1 to 50 half the time, else none.
pub fn roll_gems<R: RngCore + ?Sized>(rng: &mut R) -> u64 {
    if chance(rng, pct(50)) {
        u64::from(roll_inclusive(rng, 1, 50))
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn test_growth_capped() {
        let mut grove = Grove::default();
        let mut rng = StepRng::new(0, 0);
        for t in 0..15 {
            grove.try_grow(t, 10, &mut rng);
        }
        assert_eq!(grove.trees.len(), 10);
        assert_eq!(grove.trees[0].kind, TreeKind::Oak);
    }

    #[test]
    fn test_growth_can_miss() {
        let mut grove = Grove::default();
        assert!(grove.try_grow(0, 10, &mut StepRng::new(u64::MAX, 0)).is_none());
    }

    #[test]
    fn test_remove_and_gems() {
        let mut grove = Grove::default();
        let id = grove.try_grow(0, 10, &mut StepRng::new(0, 0)).unwrap().id;
        assert_eq!(grove.remove(id).unwrap().id, id);
        assert!(grove.remove(id).is_err());
        assert_eq!(roll_gems(&mut StepRng::new(0, 0)), 1);
        assert_eq!(roll_gems(&mut StepRng::new(u64::MAX, 0)), 0);
    }
}
