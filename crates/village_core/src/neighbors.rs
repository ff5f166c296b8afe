//! Neighbor population.
//!
//! Neighbors are generated from their ordinal id: the archetype is
//! `id % 10`, baseline strength grows with `√(id / 5)`, and linkage to
//! neighbors `id − 10` (ally) and `id − 5` (rival) is fixed at creation.
//! Everything random (starting favor, stockpile roll) is drawn from the
//! engine's injected generator.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Timestamp, MS_PER_HOUR};
use crate::combat::{stacks_power_deci, TroopStack};
use crate::data::{garrison_recipe, Archetype, Personality};
use crate::economy::ResourceKind;
use crate::math::{pct, roll_below, roll_inclusive, scale, unit_interval, Fixed};

/// Neighbor identifier, starting at 1.
pub type NeighborId = u32;

/// Highest strength level.
pub const MAX_STRENGTH: u32 = 9;

/// Strength levels a neighbor gains with age.
pub const MAX_AGE_BONUS: u32 = 2;

/// Ids between a neighbor and its ally link.
pub const ALLY_LINK_GAP: u32 = 10;

/// Ids between a neighbor and its rival link.
pub const RIVAL_LINK_GAP: u32 = 5;

/// Relationship between two neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Shares in the favor the player earns with its partner.
    Ally,
    /// Resents the player's dealings with its partner.
    Rival,
}

/// A link to another neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborLink {
    /// Linked neighbor.
    pub id: NeighborId,
    /// Link kind.
    #[serde(rename = "type")]
    pub kind: LinkKind,
}

/// Lootable stock held by a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Stockpile {
    /// Gold.
    pub gold: u64,
    /// Elixir.
    pub elixir: u64,
    /// Dark elixir.
    pub dark: u64,
}

/// What was given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GiftKind {
    /// Currency.
    Resource {
        /// Currency given.
        resource: ResourceKind,
        /// Amount given.
        amount: u64,
    },
    /// One unit from the player's army.
    Troop {
        /// Unit name.
        name: String,
        /// Unit level.
        level: u32,
    },
}

/// One entry of a neighbor's gift history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftRecord {
    /// What was given.
    pub gift: GiftKind,
    /// Favor change it caused.
    pub favor_change: i32,
    /// When.
    #[serde(alias = "time")]
    pub at: Timestamp,
}

/// An autonomous village next door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighbor {
    /// Ordinal id.
    pub id: NeighborId,
    /// Label shown to the player, e.g. "12 Merchant".
    #[serde(alias = "name")]
    pub display_name: String,
    /// Template. Re-derived from the id on load.
    #[serde(default = "placeholder_archetype")]
    pub archetype: Archetype,
    /// Behavioral family of the template.
    #[serde(default = "placeholder_personality")]
    pub personality: Personality,
    /// Favor toward the player, `[-100, 100]`.
    #[serde(default)]
    pub favor: i32,
    /// Whether allied with the player.
    #[serde(default)]
    pub allied: bool,
    /// Garrison.
    #[serde(default)]
    pub troops: Vec<TroopStack>,
    /// Lootable stock.
    #[serde(default)]
    pub resources: Stockpile,
    /// Fortification power, whole units.
    #[serde(default, alias = "defenseStrength")]
    pub defense_rating: u64,
    /// Strength level, `[1, 9]`. Never decreases.
    #[serde(default = "one", alias = "strengthLevel")]
    pub strength: u32,
    /// Creation time.
    #[serde(default)]
    pub created_at: Timestamp,
    /// Last aid granted.
    #[serde(default, alias = "lastAidTime")]
    pub last_aid_at: Option<Timestamp>,
    /// Gifts received.
    #[serde(default)]
    pub gift_history: Vec<GiftRecord>,
    /// Links to other neighbors.
    #[serde(default)]
    pub linked_neighbors: Vec<NeighborLink>,
}

const fn one() -> u32 {
    1
}

const fn placeholder_archetype() -> Archetype {
    Archetype::Warrior
}

const fn placeholder_personality() -> Personality {
    Personality::Aggressive
}

fn isqrt(n: u32) -> u32 {
    let mut root = 0u32;
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    root
}

/// Baseline strength from the ordinal id: `min(9, 1 + ⌊√(id / 5)⌋)`.
#[must_use]
pub fn base_strength(id: NeighborId) -> u32 {
    (1 + isqrt(id / 5)).min(MAX_STRENGTH)
}

/// Strength from id plus one level per hour of age, capped at [`MAX_AGE_BONUS`].
#[must_use]
pub fn strength_at(id: NeighborId, created_at: Timestamp, now: Timestamp) -> u32 {
    let age_hours = now.saturating_sub(created_at) / MS_PER_HOUR;
    let bonus = age_hours.min(u64::from(MAX_AGE_BONUS)) as u32;
    (base_strength(id) + bonus).min(MAX_STRENGTH)
}

/// Garrison for a personality at a strength level.
#[must_use]
pub fn garrison(personality: Personality, strength: u32) -> Vec<TroopStack> {
    let level = strength.clamp(1, MAX_STRENGTH);
    garrison_recipe(personality)
        .iter()
        .filter(|line| strength >= line.min_strength)
        .map(|line| (line, line.base + strength * line.per_level))
        .filter(|(_, count)| *count > 0)
        .map(|(line, count)| TroopStack::new(line.unit.name(), level, count))
        .collect()
}

/// `50 + 50 × strength + 2 × id`.
#[must_use]
pub fn defense_rating(id: NeighborId, strength: u32) -> u64 {
    50 + 50 * u64::from(strength) + 2 * u64::from(id)
}

fn roll_stockpile<R: RngCore + ?Sized>(id: NeighborId, strength: u32, rng: &mut R) -> Stockpile {
    let base = 1_000 + 1_000 * u64::from(strength) + 50 * u64::from(id);
    let multiplier = Fixed::ONE + unit_interval(rng) * pct(50);
    let gold = scale(base, multiplier);
    Stockpile {
        gold,
        elixir: gold * 4 / 5,
        dark: if strength >= 5 { base / 10 } else { 0 },
    }
}

impl Neighbor {
    /// Generate neighbor `id`, created at `created_at`.
    pub fn generate<R: RngCore + ?Sized>(
        id: NeighborId,
        created_at: Timestamp,
        now: Timestamp,
        rng: &mut R,
    ) -> Self {
        let archetype = Archetype::for_id(id);
        let personality = archetype.personality();
        let favor = roll_inclusive(rng, 0, 40) as i32 - 20;
        let strength = strength_at(id, created_at, now);
        let resources = roll_stockpile(id, strength, rng);
        Self {
            id,
            display_name: format!("{id} {}", archetype.title()),
            archetype,
            personality,
            favor,
            allied: false,
            troops: garrison(personality, strength),
            resources,
            defense_rating: defense_rating(id, strength),
            strength,
            created_at,
            last_aid_at: None,
            gift_history: Vec::new(),
            linked_neighbors: Vec::new(),
        }
    }

    /// Fortification plus garrison, in tenths.
    #[must_use]
    pub fn power_deci(&self) -> u64 {
        self.defense_rating * 10 + stacks_power_deci(&self.troops)
    }

    /// Links of one kind.
    pub fn links(&self, kind: LinkKind) -> impl Iterator<Item = NeighborId> + '_ {
        self.linked_neighbors
            .iter()
            .filter(move |l| l.kind == kind)
            .map(|l| l.id)
    }

    fn add_link(&mut self, id: NeighborId, kind: LinkKind) {
        let link = NeighborLink { id, kind };
        if !self.linked_neighbors.contains(&link) {
            self.linked_neighbors.push(link);
        }
    }

    /// Re-derive template fields from the id. Used on load.
    pub fn rederive_template(&mut self) {
        self.archetype = Archetype::for_id(self.id);
        self.personality = self.archetype.personality();
    }
}

/// Look up a neighbor.
#[must_use]
pub fn find(neighbors: &[Neighbor], id: NeighborId) -> Option<&Neighbor> {
    neighbors.iter().find(|n| n.id == id)
}

/// Look up a neighbor mutably.
pub fn find_mut(neighbors: &mut [Neighbor], id: NeighborId) -> Option<&mut Neighbor> {
    neighbors.iter_mut().find(|n| n.id == id)
}

/// Append neighbor `len + 1` and wire its reciprocal links. Returns the new id.
pub fn spawn<R: RngCore + ?Sized>(
    neighbors: &mut Vec<Neighbor>,
    created_at: Timestamp,
    now: Timestamp,
    rng: &mut R,
) -> NeighborId {
    let id = neighbors.len() as NeighborId + 1;
    let mut neighbor = Neighbor::generate(id, created_at, now, rng);
    for (gap, kind) in [(ALLY_LINK_GAP, LinkKind::Ally), (RIVAL_LINK_GAP, LinkKind::Rival)] {
        let Some(other) = id.checked_sub(gap).filter(|o| *o > 0) else {
            continue;
        };
        if let Some(partner) = find_mut(neighbors, other) {
            partner.add_link(id, kind);
            neighbor.add_link(other, kind);
        }
    }
    neighbors.push(neighbor);
    id
}

/// The starting cohort. Each neighbor gets a random age of 0 to 29 minutes.
pub fn initial_cohort<R: RngCore + ?Sized>(count: u32, now: Timestamp, rng: &mut R) -> Vec<Neighbor> {
    let mut neighbors = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let age = u64::from(roll_below(rng, 30)) * crate::clock::MS_PER_MINUTE;
        spawn(&mut neighbors, now.saturating_sub(age), now, rng);
    }
    neighbors
}

/// Raise strength for every neighbor that has aged into a higher level.
///
/// A stronger neighbor gets a fresh garrison and fortification, and its
/// stockpile is topped up to at least a fresh roll. Returns how many changed.
pub fn update_strength<R: RngCore + ?Sized>(
    neighbors: &mut [Neighbor],
    now: Timestamp,
    rng: &mut R,
) -> usize {
    let mut changed = 0;
    for neighbor in neighbors.iter_mut() {
        let strength = strength_at(neighbor.id, neighbor.created_at, now);
        if strength <= neighbor.strength {
            continue;
        }
        neighbor.strength = strength;
        neighbor.troops = garrison(neighbor.personality, strength);
        neighbor.defense_rating = neighbor
            .defense_rating
            .max(defense_rating(neighbor.id, strength));
        let fresh = roll_stockpile(neighbor.id, strength, rng);
        neighbor.resources.gold = neighbor.resources.gold.max(fresh.gold);
        neighbor.resources.elixir = neighbor.resources.elixir.max(fresh.elixir);
        neighbor.resources.dark = neighbor.resources.dark.max(fresh.dark);
        debug!(neighbor = neighbor.id, strength, "Neighbor grew stronger");
        changed += 1;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MS_PER_MINUTE;
    use rand::rngs::mock::StepRng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_base_strength_grows_with_id() {
        assert_eq!(base_strength(1), 1);
        assert_eq!(base_strength(4), 1);
        assert_eq!(base_strength(5), 2);
        assert_eq!(base_strength(20), 3);
        assert_eq!(base_strength(45), 4);
        assert_eq!(base_strength(1_024), 9);
    }

    #[test]
    fn test_age_bonus_capped() {
        assert_eq!(strength_at(1, 0, MS_PER_HOUR - 1), 1);
        assert_eq!(strength_at(1, 0, MS_PER_HOUR), 2);
        assert_eq!(strength_at(1, 0, 10 * MS_PER_HOUR), 3);
    }

    #[test]
    fn test_generate_is_template_driven() {
        let n = Neighbor::generate(12, 0, 0, &mut StepRng::new(0, 0));
        assert_eq!(n.archetype, Archetype::for_id(12));
        assert_eq!(n.personality, n.archetype.personality());
        assert_eq!(n.favor, -20);
        assert_eq!(n.strength, 2);
        assert_eq!(n.defense_rating, 50 + 100 + 24);
        // Base stock 1000 + 2000 + 600, multiplier 1.
        assert_eq!(n.resources.gold, 3_600);
        assert_eq!(n.resources.elixir, 2_880);
        assert_eq!(n.resources.dark, 0);
        assert!(n.display_name.starts_with("12 "));
    }

    #[test]
    fn test_garrison_skips_gated_lines() {
        let low = garrison(Personality::Aggressive, 1);
        assert_eq!(low.len(), 2);
        assert_eq!(low[0], TroopStack::new("Barbarian", 1, 15));
        let high = garrison(Personality::Aggressive, 7);
        assert_eq!(high.len(), 4);
        assert!(high.iter().all(|t| t.level == 7));
    }

    #[test]
    fn test_links_are_reciprocal() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let neighbors = initial_cohort(11, 10 * MS_PER_MINUTE, &mut rng);
        let n1 = find(&neighbors, 1).unwrap();
        let n6 = find(&neighbors, 6).unwrap();
        let n11 = find(&neighbors, 11).unwrap();
        assert_eq!(n11.links(LinkKind::Ally).collect::<Vec<_>>(), vec![1]);
        assert_eq!(n11.links(LinkKind::Rival).collect::<Vec<_>>(), vec![6]);
        assert!(n1.links(LinkKind::Ally).any(|id| id == 11));
        assert!(n6.links(LinkKind::Rival).any(|id| id == 11));
        assert!(n1.links(LinkKind::Rival).any(|id| id == 6));
    }

    #[test]
    fn test_strength_never_decreases() {
        let mut rng = StepRng::new(0, 0);
        let mut neighbors = vec![Neighbor::generate(1, 0, 0, &mut rng)];
        neighbors[0].strength = 5;
        assert_eq!(update_strength(&mut neighbors, 3 * MS_PER_HOUR, &mut rng), 0);
        assert_eq!(neighbors[0].strength, 5);

        neighbors[0].strength = 1;
        let gold = neighbors[0].resources.gold;
        assert_eq!(update_strength(&mut neighbors, 3 * MS_PER_HOUR, &mut rng), 1);
        assert_eq!(neighbors[0].strength, 3);
        assert!(neighbors[0].resources.gold >= gold);
    }

    #[test]
    fn test_power_counts_fortification() {
        let mut n = Neighbor::generate(1, 0, 0, &mut StepRng::new(0, 0));
        n.troops.clear();
        assert_eq!(n.power_deci(), n.defense_rating * 10);
    }
}
