//! Resource ledger.
//!
//! Balances are stored, capacities and production rates are not: both are
//! derived on demand from the structure list and town level, so they can
//! never drift out of sync with the buildings that produce them.
//!
//! All calculations use integer math. Collection credits
//! `rate * elapsed_ms / 60_000` per currency, floored.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Timestamp, MS_PER_MINUTE};
use crate::data::{
    basic_production_rate, basic_storage_capacity, dark_production_rate, dark_storage_capacity,
    town_base_capacity, StructureKind, DARK_ELIXIR_UNLOCK_TOWN_LEVEL,
};
use crate::error::{CommandError, CommandResult};
use crate::structures::Structure;

/// Ceiling for the special currency.
pub const GEMS_CAPACITY: u64 = 999_999_999;

/// Starting gold.
pub const STARTING_GOLD: u64 = 500;
/// Starting elixir.
pub const STARTING_ELIXIR: u64 = 500;
/// Starting gems.
pub const STARTING_GEMS: u64 = 50;

/// The four currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Primary currency.
    Gold,
    /// Secondary currency.
    Elixir,
    /// Premium-tier currency, unlocked at town level 7.
    #[serde(rename = "dark")]
    DarkElixir,
    /// Special currency.
    Gems,
}

impl ResourceKind {
    /// Every currency.
    pub const ALL: [ResourceKind; 4] = [Self::Gold, Self::Elixir, Self::DarkElixir, Self::Gems];
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Gold => "gold",
            Self::Elixir => "elixir",
            Self::DarkElixir => "dark elixir",
            Self::Gems => "gems",
        })
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gold" => Ok(Self::Gold),
            "elixir" => Ok(Self::Elixir),
            "dark" | "darkelixir" | "dark_elixir" | "dark elixir" => Ok(Self::DarkElixir),
            "gems" | "gem" => Ok(Self::Gems),
            _ => Err(CommandError::InvalidValue("unknown resource kind")),
        }
    }
}

/// Derived per-currency ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capacity {
    /// Gold ceiling.
    pub gold: u64,
    /// Elixir ceiling.
    pub elixir: u64,
    /// Dark elixir ceiling.
    pub dark_elixir: u64,
    /// Gems ceiling.
    pub gems: u64,
}

impl Capacity {
    /// Compute ceilings from the structure list.
    ///
    /// `Σ(storage capacity at level × count) + town base capacity`. Dark elixir
    /// capacity is zero below the unlock town level.
    #[must_use]
    pub fn derive(structures: &[Structure], town_level: u32) -> Self {
        let (mut gold, mut elixir, mut dark) = town_base_capacity(town_level);
        for s in structures {
            let count = u64::from(s.count);
            match s.kind {
                StructureKind::GoldStorage => gold += basic_storage_capacity(s.level) * count,
                StructureKind::ElixirStorage => elixir += basic_storage_capacity(s.level) * count,
                StructureKind::DarkStorage => dark += dark_storage_capacity(s.level) * count,
                _ => {}
            }
        }
        if town_level < DARK_ELIXIR_UNLOCK_TOWN_LEVEL {
            dark = 0;
        }
        Self {
            gold,
            elixir,
            dark_elixir: dark,
            gems: GEMS_CAPACITY,
        }
    }

    /// Ceiling for one currency.
    #[must_use]
    pub const fn of(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Gold => self.gold,
            ResourceKind::Elixir => self.elixir,
            ResourceKind::DarkElixir => self.dark_elixir,
            ResourceKind::Gems => self.gems,
        }
    }
}

/// Derived production per minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Production {
    /// Gold per minute.
    pub gold: u64,
    /// Elixir per minute.
    pub elixir: u64,
    /// Dark elixir per minute.
    pub dark_elixir: u64,
}

impl Production {
    /// Compute production rates from the structure list.
    ///
    /// Producers under upgrade do not count. Dark elixir production is zero
    /// below the unlock town level.
    #[must_use]
    pub fn derive(structures: &[Structure], town_level: u32, multiplier: u32) -> Self {
        let mut rates = Self::default();
        for s in structures.iter().filter(|s| !s.upgrading) {
            let count = u64::from(s.count);
            match s.kind {
                StructureKind::GoldMine => rates.gold += basic_production_rate(s.level) * count,
                StructureKind::ElixirCollector => {
                    rates.elixir += basic_production_rate(s.level) * count;
                }
                StructureKind::DarkElixirDrill => {
                    rates.dark_elixir += dark_production_rate(s.level) * count;
                }
                _ => {}
            }
        }
        if town_level < DARK_ELIXIR_UNLOCK_TOWN_LEVEL {
            rates.dark_elixir = 0;
        }
        let m = u64::from(multiplier);
        Self {
            gold: rates.gold * m,
            elixir: rates.elixir * m,
            dark_elixir: rates.dark_elixir * m,
        }
    }
}

/// Amounts credited by one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collected {
    /// Gold credited.
    pub gold: u64,
    /// Elixir credited.
    pub elixir: u64,
    /// Dark elixir credited.
    pub dark_elixir: u64,
}

/// Current balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceState {
    /// Gold balance.
    pub gold: u64,
    /// Elixir balance.
    pub elixir: u64,
    /// Dark elixir balance.
    pub dark_elixir: u64,
    /// Gem balance.
    pub gems: u64,
    /// Unbounded score.
    pub trophies: u64,
    /// Last committed collection time.
    pub last_collect_at: Timestamp,
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ResourceState {
    /// Starting balances, with collection anchored at `now`.
    #[must_use]
    pub const fn new(now: Timestamp) -> Self {
        Self {
            gold: STARTING_GOLD,
            elixir: STARTING_ELIXIR,
            dark_elixir: 0,
            gems: STARTING_GEMS,
            trophies: 0,
            last_collect_at: now,
        }
    }

    /// Balance of one currency.
    #[must_use]
    pub const fn balance(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Gold => self.gold,
            ResourceKind::Elixir => self.elixir,
            ResourceKind::DarkElixir => self.dark_elixir,
            ResourceKind::Gems => self.gems,
        }
    }

    fn balance_mut(&mut self, kind: ResourceKind) -> &mut u64 {
        match kind {
            ResourceKind::Gold => &mut self.gold,
            ResourceKind::Elixir => &mut self.elixir,
            ResourceKind::DarkElixir => &mut self.dark_elixir,
            ResourceKind::Gems => &mut self.gems,
        }
    }

    /// Add to a balance, clamped to its ceiling.
    ///
    /// Returns the amount actually credited.
    pub fn credit(&mut self, kind: ResourceKind, amount: u64, capacity: &Capacity) -> u64 {
        let cap = capacity.of(kind);
        let balance = self.balance_mut(kind);
        let before = (*balance).min(cap);
        *balance = before.saturating_add(amount).min(cap);
        balance.saturating_sub(before)
    }

    /// Subtract from a balance.
    ///
    /// # Errors
    ///
    /// [`CommandError::InsufficientResource`] if the balance is short; the
    /// balance is left untouched.
    pub fn debit(&mut self, kind: ResourceKind, amount: u64) -> CommandResult<()> {
        let balance = self.balance_mut(kind);
        if *balance < amount {
            return Err(CommandError::InsufficientResource {
                resource: kind,
                required: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        Ok(())
    }

    /// Whether a balance covers `amount`.
    #[must_use]
    pub const fn can_afford(&self, kind: ResourceKind, amount: u64) -> bool {
        self.balance(kind) >= amount
    }

    /// Remove up to `amount`, returning what was actually taken.
    pub fn drain(&mut self, kind: ResourceKind, amount: u64) -> u64 {
        let balance = self.balance_mut(kind);
        let taken = amount.min(*balance);
        *balance -= taken;
        taken
    }

    /// Pull every balance down to its ceiling.
    ///
    /// Needed after a capacity drop (storage under upgrade does not shrink
    /// capacity, but a repaired save may carry over-full balances).
    pub fn clamp_to(&mut self, capacity: &Capacity) {
        for kind in ResourceKind::ALL {
            let cap = capacity.of(kind);
            let balance = self.balance_mut(kind);
            *balance = (*balance).min(cap);
        }
    }

    /// Credit production accrued since the last collection.
    ///
    /// Commits only when at least `threshold_ms` has elapsed; below that the
    /// call is a no-op and `last_collect_at` is not moved, so repeated polling
    /// never loses fractional progress.
    pub fn collect(
        &mut self,
        now: Timestamp,
        threshold_ms: u64,
        production: &Production,
        capacity: &Capacity,
    ) -> Option<Collected> {
        let elapsed = now.saturating_sub(self.last_collect_at);
        if elapsed < threshold_ms {
            return None;
        }
        let accrued = |rate: u64| {
            u64::try_from(u128::from(rate) * u128::from(elapsed) / u128::from(MS_PER_MINUTE))
                .unwrap_or(u64::MAX)
        };
        let collected = Collected {
            gold: self.credit(ResourceKind::Gold, accrued(production.gold), capacity),
            elixir: self.credit(ResourceKind::Elixir, accrued(production.elixir), capacity),
            dark_elixir: self.credit(
                ResourceKind::DarkElixir,
                accrued(production.dark_elixir),
                capacity,
            ),
        };
        self.last_collect_at = now;
        debug!(
            elapsed_ms = elapsed,
            gold = collected.gold,
            elixir = collected.elixir,
            dark = collected.dark_elixir,
            "Collected resources"
        );
        Some(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::default_structures;

    fn starting_caps() -> Capacity {
        Capacity::derive(&default_structures(), 1)
    }

    #[test]
    fn test_starting_production() {
        let p = Production::derive(&default_structures(), 1, 1);
        assert_eq!(p.gold, 20);
        assert_eq!(p.elixir, 20);
        assert_eq!(p.dark_elixir, 0);

        let doubled = Production::derive(&default_structures(), 1, 2);
        assert_eq!(doubled.gold, 40);
    }

    #[test]
    fn test_upgrading_producers_do_not_produce() {
        let mut structures = default_structures();
        for s in &mut structures {
            if s.kind == StructureKind::GoldMine {
                s.upgrading = true;
                s.upgrade_end_at = Some(1);
            }
        }
        assert_eq!(Production::derive(&structures, 1, 1).gold, 0);
    }

    #[test]
    fn test_starting_capacity() {
        let caps = starting_caps();
        // Town base 1000 plus one level-1 storage.
        assert_eq!(caps.gold, 2_000);
        assert_eq!(caps.elixir, 2_000);
        assert_eq!(caps.dark_elixir, 0);
        assert_eq!(caps.gems, GEMS_CAPACITY);
    }

    #[test]
    fn test_credit_clamps() {
        let caps = starting_caps();
        let mut r = ResourceState::new(0);
        assert_eq!(r.credit(ResourceKind::Gold, 10_000, &caps), 1_500);
        assert_eq!(r.gold, 2_000);
        assert_eq!(r.credit(ResourceKind::DarkElixir, 50, &caps), 0);
        assert_eq!(r.dark_elixir, 0);
    }

    #[test]
    fn test_debit_leaves_balance_on_failure() {
        let mut r = ResourceState::new(0);
        let err = r.debit(ResourceKind::Gold, 501).unwrap_err();
        assert!(matches!(err, CommandError::InsufficientResource { available: 500, .. }));
        assert_eq!(r.gold, 500);
        r.debit(ResourceKind::Gold, 500).unwrap();
        assert_eq!(r.gold, 0);
    }

    #[test]
    fn test_collect_after_one_minute() {
        let structures = default_structures();
        let caps = Capacity::derive(&structures, 1);
        let prod = Production::derive(&structures, 1, 1);
        let mut r = ResourceState::new(0);
        let got = r.collect(60_000, 6_000, &prod, &caps).unwrap();
        assert_eq!(got.gold, 20);
        assert_eq!(r.gold, 520);
    }

    #[test]
    fn test_collect_below_threshold_is_noop() {
        let structures = default_structures();
        let caps = Capacity::derive(&structures, 1);
        let prod = Production::derive(&structures, 1, 1);
        let mut r = ResourceState::new(0);
        assert!(r.collect(5_999, 6_000, &prod, &caps).is_none());
        assert_eq!(r.last_collect_at, 0);
        assert!(r.collect(6_000, 6_000, &prod, &caps).is_some());
        assert!(r.collect(6_000, 6_000, &prod, &caps).is_none());
    }

    #[test]
    fn test_resource_kind_parse() {
        assert_eq!("Dark".parse::<ResourceKind>().unwrap(), ResourceKind::DarkElixir);
        assert!("wood".parse::<ResourceKind>().is_err());
        assert_eq!(
            serde_json::to_string(&ResourceKind::DarkElixir).unwrap(),
            "\"dark\""
        );
    }
}
