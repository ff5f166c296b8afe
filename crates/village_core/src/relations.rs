//! Favor between the player and each neighbor.
//!
//! Favor is a single scalar in `[-100, 100]`. Every path that touches it goes
//! through [`shift_favor`], which clamps. Linked neighbors receive a share of
//! changes caused by gifts, alliances, and raids.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::clock::{remaining_secs, Timestamp};
use crate::data::{dialog, Personality, DARK_ELIXIR_UNLOCK_TOWN_LEVEL};
use crate::economy::ResourceKind;
use crate::error::{CommandError, CommandResult, Target};
use crate::math::{chance, pct, roll_below};
use crate::neighbors::{find_mut, GiftKind, GiftRecord, LinkKind, Neighbor, NeighborId, NeighborLink};

/// Lowest favor.
pub const MIN_FAVOR: i32 = -100;
/// Highest favor.
pub const MAX_FAVOR: i32 = 100;
/// Favor needed to propose an alliance.
pub const ALLIANCE_FAVOR: i32 = 50;
/// Favor gained by forming an alliance.
pub const ALLIANCE_BONUS: i32 = 30;
/// Favor a rival loses when its partner allies with the player.
pub const RIVAL_PENALTY: i32 = 30;
/// Favor needed to request aid.
pub const AID_FAVOR: i32 = 61;
/// Below this favor a neighbor is hostile enough to decay and invade.
pub const HOSTILE_FAVOR: i32 = -20;
/// Above this favor drift stops.
pub const STABLE_FAVOR: i32 = 20;

/// Named favor range.
///
/// Edges are inclusive on the upper band: exactly 50 is ally-eligible,
/// exactly 20 friendly, exactly -20 hostile, exactly -60 hateful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FavorBand {
    /// `≤ -60`.
    Hateful,
    /// `-59..=-20`.
    Hostile,
    /// `-19..=19`.
    Neutral,
    /// `20..=49`.
    Friendly,
    /// `≥ 50`.
    AllyEligible,
}

impl FavorBand {
    /// Band containing `favor`.
    #[must_use]
    pub const fn from_favor(favor: i32) -> Self {
        if favor >= ALLIANCE_FAVOR {
            Self::AllyEligible
        } else if favor >= STABLE_FAVOR {
            Self::Friendly
        } else if favor > HOSTILE_FAVOR {
            Self::Neutral
        } else if favor > -60 {
            Self::Hostile
        } else {
            Self::Hateful
        }
    }

    /// Favor lost by a neighbor in this band when raided successfully.
    #[must_use]
    pub const fn raid_penalty(self) -> i32 {
        match self {
            Self::AllyEligible => 50,
            Self::Friendly => 40,
            Self::Neutral => 30,
            Self::Hostile => 25,
            Self::Hateful => 20,
        }
    }
}

/// Clamp to `[MIN_FAVOR, MAX_FAVOR]`.
#[must_use]
pub const fn clamp_favor(favor: i32) -> i32 {
    if favor < MIN_FAVOR {
        MIN_FAVOR
    } else if favor > MAX_FAVOR {
        MAX_FAVOR
    } else {
        favor
    }
}

/// Move favor by `delta`, clamped. Returns the change actually applied.
pub fn shift_favor(neighbor: &mut Neighbor, delta: i32) -> i32 {
    let before = neighbor.favor;
    neighbor.favor = clamp_favor(before.saturating_add(delta));
    neighbor.favor - before
}

/// Greeting for the neighbor's current band.
#[must_use]
pub fn greeting(neighbor: &Neighbor) -> &'static str {
    dialog(neighbor.personality, FavorBand::from_favor(neighbor.favor))
}

fn neighbor_mut(neighbors: &mut [Neighbor], id: NeighborId) -> CommandResult<&mut Neighbor> {
    find_mut(neighbors, id).ok_or_else(|| CommandError::not_found(Target::Neighbor, id))
}

fn propagate(neighbors: &mut [Neighbor], links: &[NeighborLink], delta_for: impl Fn(LinkKind) -> i32) {
    for link in links {
        let delta = delta_for(link.kind);
        if delta == 0 {
            continue;
        }
        if let Some(other) = find_mut(neighbors, link.id) {
            shift_favor(other, delta);
        }
    }
}

/// One drift step for every neighbor.
///
/// Below -20 favor decays (twice as fast for volatile personalities); from
/// -20 to 20 it takes an unweighted ±1 step; above 20 it holds.
pub fn drift<R: RngCore + ?Sized>(neighbors: &mut [Neighbor], rng: &mut R) {
    for neighbor in neighbors.iter_mut() {
        let delta = if neighbor.favor < HOSTILE_FAVOR {
            if neighbor.personality.is_volatile() {
                -2
            } else {
                -1
            }
        } else if neighbor.favor <= STABLE_FAVOR {
            if chance(rng, pct(50)) {
                -1
            } else {
                1
            }
        } else {
            0
        };
        shift_favor(neighbor, delta);
    }
}

/// Base favor for a currency gift, 50 % more for a preferred currency.
#[must_use]
pub fn resource_gift_favor(neighbor: &Neighbor, resource: ResourceKind) -> i32 {
    let base = match resource {
        ResourceKind::Gold | ResourceKind::Elixir => 3,
        ResourceKind::DarkElixir => 8,
        ResourceKind::Gems => 15,
    };
    if neighbor.archetype.preferred_resources().contains(&resource) {
        base * 3 / 2
    } else {
        base
    }
}

/// Favor for a troop gift.
///
/// Strong units (level ≥ 5 or housing ≥ 10) earn `25 + 2 × level`. A favorite
/// unit adds 15. Weak units (level ≤ 2 and housing ≤ 2) that are not a
/// favorite cost favor instead, heavily with volatile personalities.
#[must_use]
pub fn troop_gift_favor(neighbor: &Neighbor, name: &str, level: u32, population_cost: u32) -> i32 {
    let mut change = if level >= 5 || population_cost >= 10 {
        25 + 2 * level as i32
    } else {
        5
    };
    let favorite = neighbor
        .archetype
        .favorite_units()
        .iter()
        .any(|u| u.name() == name);
    if favorite {
        change += 15;
    } else if level <= 2 && population_cost <= 2 {
        change = if neighbor.personality.is_volatile() { -25 } else { -5 };
    }
    change
}

/// Apply a gift's favor change, record it, and propagate to linked neighbors.
/// Returns the change applied to the recipient.
///
/// Allied links share 30 % of a positive change. Rivals lose 30 favor when
/// the recipient is allied with the player.
///
/// # Errors
///
/// [`CommandError::NotFound`] for an unknown neighbor.
pub fn apply_gift(
    neighbors: &mut [Neighbor],
    id: NeighborId,
    gift: GiftKind,
    favor_change: i32,
    now: Timestamp,
) -> CommandResult<i32> {
    let neighbor = neighbor_mut(neighbors, id)?;
    let applied = shift_favor(neighbor, favor_change);
    neighbor.gift_history.push(GiftRecord {
        gift,
        favor_change,
        at: now,
    });
    let allied = neighbor.allied;
    let links = neighbor.linked_neighbors.clone();
    propagate(neighbors, &links, |kind| match kind {
        LinkKind::Ally if favor_change > 0 => favor_change * 3 / 10,
        LinkKind::Rival if allied => -RIVAL_PENALTY,
        _ => 0,
    });
    Ok(applied)
}

/// Form an alliance. Returns the neighbor's ally greeting.
///
/// # Errors
///
/// Unknown neighbor, favor below [`ALLIANCE_FAVOR`], or already allied.
pub fn propose_alliance(neighbors: &mut [Neighbor], id: NeighborId) -> CommandResult<&'static str> {
    let neighbor = neighbor_mut(neighbors, id)?;
    if neighbor.allied {
        return Err(CommandError::AlreadyAllied);
    }
    if neighbor.favor < ALLIANCE_FAVOR {
        return Err(CommandError::FavorTooLow {
            required: ALLIANCE_FAVOR,
            current: neighbor.favor,
        });
    }
    neighbor.allied = true;
    shift_favor(neighbor, ALLIANCE_BONUS);
    let line = dialog(neighbor.personality, FavorBand::AllyEligible);
    let links = neighbor.linked_neighbors.clone();
    propagate(neighbors, &links, |kind| match kind {
        LinkKind::Rival => -RIVAL_PENALTY,
        LinkKind::Ally => 0,
    });
    Ok(line)
}

/// Currency granted by an aid request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AidGrant {
    /// Currency.
    pub resource: ResourceKind,
    /// Amount before the player's storage clamp.
    pub amount: u64,
}

/// Ask an allied-minded neighbor for aid.
///
/// Grants 3000 to 5999 gold or elixir by personality. Possessive neighbors
/// send a tenth of that in dark elixir once the player can store it.
///
/// # Errors
///
/// Unknown neighbor, favor below [`AID_FAVOR`], or the cooldown since the
/// last aid has not elapsed.
pub fn request_aid<R: RngCore + ?Sized>(
    neighbors: &mut [Neighbor],
    id: NeighborId,
    town_level: u32,
    now: Timestamp,
    cooldown_ms: u64,
    rng: &mut R,
) -> CommandResult<AidGrant> {
    let neighbor = neighbor_mut(neighbors, id)?;
    if neighbor.favor < AID_FAVOR {
        return Err(CommandError::FavorTooLow {
            required: AID_FAVOR,
            current: neighbor.favor,
        });
    }
    if let Some(last) = neighbor.last_aid_at {
        let ready_at = last + cooldown_ms;
        if now < ready_at {
            return Err(CommandError::Cooldown {
                remaining_secs: remaining_secs(ready_at, now),
            });
        }
    }
    neighbor.last_aid_at = Some(now);
    let amount = 3_000 + u64::from(roll_below(rng, 3_000));
    let grant = match neighbor.personality {
        Personality::Peaceful | Personality::Symbiotic => AidGrant {
            resource: ResourceKind::Elixir,
            amount,
        },
        Personality::Possessive if town_level >= DARK_ELIXIR_UNLOCK_TOWN_LEVEL => AidGrant {
            resource: ResourceKind::DarkElixir,
            amount: amount / 10,
        },
        _ => AidGrant {
            resource: ResourceKind::Gold,
            amount,
        },
    };
    Ok(grant)
}

/// Favor consequences of a raid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidFallout {
    /// Favor removed from the target.
    pub favor_lost: i32,
    /// Whether an alliance was broken.
    pub alliance_broken: bool,
}

/// Apply raid consequences to the target and its links.
///
/// The penalty comes from the target's band before the raid; a failed raid
/// costs 70 % of it. Allied links lose half the penalty and rivals gain a
/// fifth. Raiding always ends an alliance.
///
/// # Errors
///
/// [`CommandError::NotFound`] for an unknown neighbor.
pub fn apply_raid(neighbors: &mut [Neighbor], id: NeighborId, victory: bool) -> CommandResult<RaidFallout> {
    let neighbor = neighbor_mut(neighbors, id)?;
    let band_penalty = FavorBand::from_favor(neighbor.favor).raid_penalty();
    let penalty = if victory {
        band_penalty
    } else {
        band_penalty * 7 / 10
    };
    shift_favor(neighbor, -penalty);
    let alliance_broken = neighbor.allied;
    neighbor.allied = false;
    let links = neighbor.linked_neighbors.clone();
    propagate(neighbors, &links, |kind| match kind {
        LinkKind::Ally => -(penalty / 2),
        LinkKind::Rival => penalty / 5,
    });
    Ok(RaidFallout {
        favor_lost: penalty,
        alliance_broken,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Archetype;
    use crate::neighbors::initial_cohort;
    use rand::rngs::mock::StepRng;

    fn cohort(n: u32) -> Vec<Neighbor> {
        initial_cohort(n, 0, &mut StepRng::new(0, 0))
    }

    fn of(neighbors: &[Neighbor], id: NeighborId) -> &Neighbor {
        neighbors.iter().find(|n| n.id == id).unwrap()
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(FavorBand::from_favor(50), FavorBand::AllyEligible);
        assert_eq!(FavorBand::from_favor(49), FavorBand::Friendly);
        assert_eq!(FavorBand::from_favor(20), FavorBand::Friendly);
        assert_eq!(FavorBand::from_favor(19), FavorBand::Neutral);
        assert_eq!(FavorBand::from_favor(-19), FavorBand::Neutral);
        assert_eq!(FavorBand::from_favor(-20), FavorBand::Hostile);
        assert_eq!(FavorBand::from_favor(-59), FavorBand::Hostile);
        assert_eq!(FavorBand::from_favor(-60), FavorBand::Hateful);
    }

    #[test]
    fn test_shift_clamps() {
        let mut neighbors = cohort(1);
        neighbors[0].favor = 95;
        assert_eq!(shift_favor(&mut neighbors[0], 30), 5);
        assert_eq!(neighbors[0].favor, MAX_FAVOR);
        assert_eq!(shift_favor(&mut neighbors[0], -500), -200);
        assert_eq!(neighbors[0].favor, MIN_FAVOR);
    }

    #[test]
    fn test_drift_rules() {
        let mut neighbors = cohort(5);
        // Neighbor 5 is a circus (theatrical), 2 a hermit (peaceful).
        neighbors[4].favor = -30;
        neighbors[1].favor = -30;
        neighbors[2].favor = 21;
        assert!(neighbors[4].personality.is_volatile());
        assert!(!neighbors[1].personality.is_volatile());
        drift(&mut neighbors, &mut StepRng::new(0, 0));
        assert_eq!(neighbors[4].favor, -32);
        assert_eq!(neighbors[1].favor, -31);
        assert_eq!(neighbors[2].favor, 21);

        neighbors[4].favor = -20;
        drift(&mut neighbors, &mut StepRng::new(u64::MAX, 0));
        assert_eq!(neighbors[4].favor, -19);
    }

    #[test]
    fn test_resource_gift_preference_bonus() {
        let neighbors = cohort(1);
        let merchant = &neighbors[0];
        assert_eq!(merchant.archetype, Archetype::Merchant);
        assert_eq!(resource_gift_favor(merchant, ResourceKind::Gems), 22);
        assert_eq!(resource_gift_favor(merchant, ResourceKind::Gold), 4);
        assert_eq!(resource_gift_favor(merchant, ResourceKind::Elixir), 3);
        assert_eq!(resource_gift_favor(merchant, ResourceKind::DarkElixir), 8);
    }

    #[test]
    fn test_troop_gift_favor() {
        let neighbors = cohort(10);
        let warrior = of(&neighbors, 10);
        let hermit = of(&neighbors, 2);
        assert_eq!(warrior.archetype, Archetype::Warrior);
        let favorite = warrior.archetype.favorite_units()[0];
        assert_eq!(troop_gift_favor(warrior, favorite.name(), 1, 1), 20);
        assert_eq!(troop_gift_favor(warrior, "Barbarian", 1, 1), -25);
        assert_eq!(troop_gift_favor(hermit, "Barbarian", 1, 1), -5);
        assert_eq!(troop_gift_favor(hermit, "Barbarian", 3, 1), 5);
        assert_eq!(troop_gift_favor(warrior, "Golem", 5, 30), 35);
    }

    #[test]
    fn test_gift_propagates_to_ally_link() {
        let mut neighbors = cohort(11);
        for n in &mut neighbors {
            n.favor = 0;
        }
        let applied = apply_gift(
            &mut neighbors,
            11,
            GiftKind::Resource {
                resource: ResourceKind::Gems,
                amount: 10,
            },
            20,
            5,
        )
        .unwrap();
        assert_eq!(applied, 20);
        assert_eq!(of(&neighbors, 1).favor, 6);
        assert_eq!(of(&neighbors, 6).favor, 0);
        assert_eq!(of(&neighbors, 11).gift_history.len(), 1);
    }

    #[test]
    fn test_alliance_hits_rivals() {
        let mut neighbors = cohort(11);
        for n in &mut neighbors {
            n.favor = 0;
        }
        assert!(matches!(
            propose_alliance(&mut neighbors, 11),
            Err(CommandError::FavorTooLow { required: 50, current: 0 })
        ));
        neighbors[10].favor = 50;
        propose_alliance(&mut neighbors, 11).unwrap();
        assert!(of(&neighbors, 11).allied);
        assert_eq!(of(&neighbors, 11).favor, 80);
        assert_eq!(of(&neighbors, 6).favor, -30);
        assert_eq!(propose_alliance(&mut neighbors, 11), Err(CommandError::AlreadyAllied));
    }

    #[test]
    fn test_aid_cooldown() {
        let mut neighbors = cohort(2);
        neighbors[1].favor = 61;
        let mut rng = StepRng::new(0, 0);
        let grant = request_aid(&mut neighbors, 2, 1, 1_000, 3_600_000, &mut rng).unwrap();
        assert_eq!(grant.amount, 3_000);
        assert_eq!(
            request_aid(&mut neighbors, 2, 1, 1_000 + 3_540_000, 3_600_000, &mut rng),
            Err(CommandError::Cooldown { remaining_secs: 60 })
        );
        assert!(request_aid(&mut neighbors, 2, 1, 3_601_000, 3_600_000, &mut rng).is_ok());

        neighbors[0].favor = 60;
        assert!(matches!(
            request_aid(&mut neighbors, 1, 1, 0, 3_600_000, &mut rng),
            Err(CommandError::FavorTooLow { required: 61, .. })
        ));
    }

    #[test]
    fn test_raid_breaks_alliance_and_links() {
        let mut neighbors = cohort(11);
        for n in &mut neighbors {
            n.favor = 0;
        }
        neighbors[10].favor = 60;
        neighbors[10].allied = true;
        let fallout = apply_raid(&mut neighbors, 11, true).unwrap();
        assert_eq!(fallout.favor_lost, 50);
        assert!(fallout.alliance_broken);
        assert!(!of(&neighbors, 11).allied);
        assert_eq!(of(&neighbors, 11).favor, 10);
        assert_eq!(of(&neighbors, 1).favor, -25);
        assert_eq!(of(&neighbors, 6).favor, 10);

        // Failed raid on a neutral: 70 % of 30.
        let fallout = apply_raid(&mut neighbors, 11, false).unwrap();
        assert_eq!(fallout.favor_lost, 21);
        assert!(!fallout.alliance_broken);
    }
}
