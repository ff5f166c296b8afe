//! Neighbor archetype templates.
//!
//! A neighbor's archetype is a pure function of its id (`id % 10`), so none of
//! this data needs to be persisted. Saves store the archetype only for
//! readability and the repair pass re-derives it.

use serde::{Deserialize, Serialize};

use super::unit_data::UnitKind;
use crate::economy::ResourceKind;
use crate::relations::FavorBand;

/// Behavioral family shared by several archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    /// Quick to anger, fast drift, heavy garrisons.
    Aggressive,
    /// Trades favors for gold.
    Greedy,
    /// Slow to anger.
    Peaceful,
    /// Holds grudges over stolen goods.
    Possessive,
    /// Gentle, elixir-minded.
    Symbiotic,
    /// Unpredictable, dramatic grudges.
    Theatrical,
}

impl Personality {
    /// Whether favor decays at the fast rate and troop gifts of weak units
    /// are taken as an insult.
    #[must_use]
    pub const fn is_volatile(self) -> bool {
        matches!(self, Self::Aggressive | Self::Theatrical)
    }
}

/// One of the ten neighbor templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Archetype {
    /// Aggressive dark-elixir lover.
    Warrior,
    /// Greedy trader.
    Merchant,
    /// Peaceful recluse.
    Hermit,
    /// Possessive collector.
    Spider,
    /// Symbiotic grower.
    Mushroom,
    /// Theatrical troupe.
    Circus,
    /// Peaceful grower.
    Farmer,
    /// Greedy digger.
    Miner,
    /// Aggressive tracker.
    Hunter,
    /// Peaceful scholar.
    Wizard,
}

impl Archetype {
    /// Templates in id order.
    pub const ALL: [Archetype; 10] = [
        Self::Warrior,
        Self::Merchant,
        Self::Hermit,
        Self::Spider,
        Self::Mushroom,
        Self::Circus,
        Self::Farmer,
        Self::Miner,
        Self::Hunter,
        Self::Wizard,
    ];

    /// Template for neighbor `id`.
    #[must_use]
    pub const fn for_id(id: u32) -> Self {
        Self::ALL[(id % 10) as usize]
    }

    /// Title shown beside the neighbor's name.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Warrior => "Warmonger",
            Self::Merchant => "Merchant",
            Self::Hermit => "Hermit",
            Self::Spider => "Web Village",
            Self::Mushroom => "Mushroom Village",
            Self::Circus => "Circus Village",
            Self::Farmer => "Farmer",
            Self::Miner => "Miner",
            Self::Hunter => "Hunter",
            Self::Wizard => "Wizard",
        }
    }

    /// Behavioral family.
    #[must_use]
    pub const fn personality(self) -> Personality {
        match self {
            Self::Warrior | Self::Hunter => Personality::Aggressive,
            Self::Merchant | Self::Miner => Personality::Greedy,
            Self::Hermit | Self::Farmer | Self::Wizard => Personality::Peaceful,
            Self::Spider => Personality::Possessive,
            Self::Mushroom => Personality::Symbiotic,
            Self::Circus => Personality::Theatrical,
        }
    }

    /// Resources this neighbor values more as gifts.
    #[must_use]
    pub const fn preferred_resources(self) -> &'static [ResourceKind] {
        use ResourceKind::{DarkElixir, Elixir, Gems, Gold};
        match self {
            Self::Warrior => &[DarkElixir, Elixir],
            Self::Merchant => &[Gold, Gems],
            Self::Hermit | Self::Mushroom | Self::Hunter => &[Elixir],
            Self::Spider => &[DarkElixir, Gems],
            Self::Circus => &[Gold, DarkElixir],
            Self::Farmer => &[Elixir, Gold],
            Self::Miner => &[Gold, DarkElixir],
            Self::Wizard => &[Elixir, Gems],
        }
    }

    /// Troop types this neighbor is especially pleased to receive.
    #[must_use]
    pub const fn favorite_units(self) -> [UnitKind; 2] {
        use UnitKind::{
            Archer, Balloon, Dragon, Giant, Goblin, Golem, Healer, HogRider, LavaHound, Minion,
            Pekka, WallBreaker, Witch, Wizard,
        };
        match self {
            Self::Warrior => [HogRider, Pekka],
            Self::Merchant => [Balloon, Golem],
            Self::Hermit => [Healer, LavaHound],
            Self::Spider => [Dragon, Pekka],
            Self::Mushroom => [Minion, LavaHound],
            Self::Circus => [Golem, Balloon],
            Self::Farmer => [Giant, Archer],
            Self::Miner => [Goblin, WallBreaker],
            Self::Hunter => [Archer, Dragon],
            Self::Wizard => [Wizard, Witch],
        }
    }
}

/// One line of a garrison recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GarrisonLine {
    /// Unit stationed.
    pub unit: UnitKind,
    /// Count at strength zero.
    pub base: u32,
    /// Extra count per strength level.
    pub per_level: u32,
    /// Line is skipped below this strength.
    pub min_strength: u32,
}

const fn line(unit: UnitKind, base: u32, per_level: u32, min_strength: u32) -> GarrisonLine {
    GarrisonLine {
        unit,
        base,
        per_level,
        min_strength,
    }
}

/// Garrison composition for a personality.
#[must_use]
pub const fn garrison_recipe(personality: Personality) -> [GarrisonLine; 4] {
    use UnitKind::{
        Archer, BabyDragon, Balloon, Barbarian, Dragon, Giant, Goblin, Golem, Healer, HogRider,
        LavaHound, Minion, Pekka, Skeleton, Valkyrie, WallBreaker, Witch, Wizard,
    };
    match personality {
        Personality::Aggressive => [
            line(Barbarian, 10, 5, 0),
            line(Giant, 2, 2, 0),
            line(HogRider, 0, 3, 4),
            line(Pekka, 0, 1, 7),
        ],
        Personality::Greedy => [
            line(Goblin, 15, 8, 0),
            line(Archer, 8, 4, 0),
            line(WallBreaker, 2, 2, 0),
            line(Wizard, 0, 2, 5),
        ],
        Personality::Peaceful => [
            line(Archer, 10, 5, 0),
            line(Giant, 1, 2, 0),
            line(Healer, 0, 1, 5),
            line(Dragon, 0, 1, 7),
        ],
        Personality::Possessive => [
            line(Wizard, 3, 3, 0),
            line(Archer, 10, 5, 0),
            line(Dragon, 0, 2, 6),
            line(Witch, 0, 1, 8),
        ],
        Personality::Symbiotic => [
            line(Minion, 8, 4, 0),
            line(Barbarian, 10, 5, 0),
            line(Valkyrie, 0, 2, 5),
            line(LavaHound, 0, 1, 7),
        ],
        Personality::Theatrical => [
            line(Balloon, 3, 2, 0),
            line(Golem, 0, 1, 5),
            line(Skeleton, 15, 10, 0),
            line(BabyDragon, 0, 2, 6),
        ],
    }
}

/// Troops a hostile neighbor commits to an invasion: `(unit, level, count)`.
#[must_use]
pub const fn invasion_loadout(personality: Personality) -> [(UnitKind, u32, u32); 2] {
    use UnitKind::{Archer, Balloon, Barbarian, Giant, Goblin, Skeleton, WallBreaker, Wizard};
    match personality {
        Personality::Aggressive => [(Giant, 5, 5), (Archer, 5, 20)],
        Personality::Theatrical => [(Skeleton, 8, 20), (Balloon, 5, 5)],
        Personality::Possessive => [(Goblin, 6, 15), (Wizard, 5, 5)],
        Personality::Greedy => [(Goblin, 5, 25), (WallBreaker, 4, 5)],
        Personality::Peaceful => [(Archer, 4, 15), (Giant, 3, 3)],
        Personality::Symbiotic => [(Barbarian, 5, 20), (Archer, 4, 10)],
    }
}

/// What a neighbor asks for when it opens a donation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DonationRecipe {
    /// Currency requested.
    pub resource: ResourceKind,
    /// Amount requested.
    pub amount: u64,
    /// Favor granted on fulfillment.
    pub reward_favor: i32,
    /// Line shown with the request.
    pub plea: &'static str,
}

/// Donation request template for a personality.
#[must_use]
pub const fn donation_recipe(personality: Personality) -> DonationRecipe {
    let (resource, amount, reward_favor, plea) = match personality {
        Personality::Greedy => (
            ResourceKind::Gold,
            2_000,
            8,
            "Business is slow. Spare some gold? I'll remember it.",
        ),
        Personality::Aggressive => (
            ResourceKind::Elixir,
            1_500,
            6,
            "My troops need elixir for the next fight!",
        ),
        Personality::Peaceful => (
            ResourceKind::Elixir,
            1_000,
            5,
            "The village is short on elixir. Could you help?",
        ),
        Personality::Possessive => (
            ResourceKind::Gold,
            1_500,
            6,
            "I want your gold... just a little.",
        ),
        Personality::Symbiotic => (
            ResourceKind::Elixir,
            800,
            4,
            "Our gardens wilt without elixir.",
        ),
        Personality::Theatrical => (
            ResourceKind::Gold,
            1_200,
            5,
            "The show needs funding! Gold, please!",
        ),
    };
    DonationRecipe {
        resource,
        amount,
        reward_favor,
        plea,
    }
}

/// Greeting line for a personality at a favor band.
#[must_use]
pub const fn dialog(personality: Personality, band: FavorBand) -> &'static str {
    use FavorBand::{AllyEligible, Friendly, Hateful, Hostile, Neutral};
    match (personality, band) {
        (Personality::Aggressive, Hateful) => "Coward! You dare show your face here?",
        (Personality::Aggressive, Hostile) => "You again? Make it quick.",
        (Personality::Aggressive, Neutral) => "You look like you can hold a sword...",
        (Personality::Aggressive, Friendly) => "Not bad! Come spar sometime!",
        (Personality::Aggressive, AllyEligible) => "Brother! Your enemies are mine!",
        (Personality::Greedy, Hateful) => "Thief! I'll see you bankrupt!",
        (Personality::Greedy, Hostile) => "Hmph. I don't trade at a loss.",
        (Personality::Greedy, Neutral) => "Care to browse the wares?",
        (Personality::Greedy, Friendly) => "Old friend! I saved the good stock for you!",
        (Personality::Greedy, AllyEligible) => "Partner! My trade routes are yours!",
        (Personality::Peaceful, Hateful) => "Why such greed? Please leave...",
        (Personality::Peaceful, Hostile) => "Violence solves nothing.",
        (Personality::Peaceful, Neutral) => "Traveler, do you need rest?",
        (Personality::Peaceful, Friendly) => "Kind soul, come have some tea.",
        (Personality::Peaceful, AllyEligible) => "My wisdom walks with you.",
        (Personality::Possessive, Hateful) => "Steal from me? You'll regret it!",
        (Personality::Possessive, Hostile) => "You... displease me.",
        (Personality::Possessive, Neutral) => "A curious visitor... come in?",
        (Personality::Possessive, Friendly) => "Darling, you came~",
        (Personality::Possessive, AllyEligible) => "You are mine... forever.",
        (Personality::Symbiotic, Hateful) => "You ruined our home!",
        (Personality::Symbiotic, Hostile) => "Your presence... unsettles us.",
        (Personality::Symbiotic, Neutral) => "A strange lifeform... hello.",
        (Personality::Symbiotic, Friendly) => "Friend! Come feel the warmth!",
        (Personality::Symbiotic, AllyEligible) => "We are one... we thrive together.",
        (Personality::Theatrical, Hateful) => "What a show! The next one will be better!",
        (Personality::Theatrical, Hostile) => "Boring audience... get lost.",
        (Personality::Theatrical, Neutral) => "Hey! Want to see a show?",
        (Personality::Theatrical, Friendly) => "Great crowd! Come see the new act!",
        (Personality::Theatrical, AllyEligible) => "Partner! Let's put on a show together!",
    }
}
