//! Donation requests from neighbors.
//!
//! Requests are ephemeral: a neighbor asks for currency, the player fulfills
//! or rejects it, or it expires after a fixed window with a favor penalty.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Timestamp;
use crate::data::{donation_recipe, Personality};
use crate::economy::ResourceKind;
use crate::error::{CommandError, CommandResult, Target};
use crate::math::{chance, pct, pick};
use crate::neighbors::{find_mut, Neighbor, NeighborId};
use crate::relations::shift_favor;

/// Lowest favor at which a neighbor asks for donations.
pub const MIN_ASKING_FAVOR: i32 = -10;
/// Highest favor at which a neighbor asks for donations.
pub const MAX_ASKING_FAVOR: i32 = 70;

/// Favor lost when a request expires unanswered.
#[must_use]
pub const fn expiry_penalty(personality: Personality) -> i32 {
    match personality {
        Personality::Greedy => -8,
        _ => -5,
    }
}

/// Favor lost when a request is rejected.
#[must_use]
pub const fn rejection_penalty(personality: Personality) -> i32 {
    match personality {
        Personality::Greedy => -10,
        Personality::Possessive => -12,
        _ => -6,
    }
}

/// An open request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRequest {
    /// Request id.
    pub id: u64,
    /// Asking neighbor.
    pub neighbor_id: NeighborId,
    /// Personality at the time of asking.
    pub personality: Personality,
    /// Currency asked for.
    #[serde(alias = "resourceType")]
    pub resource: ResourceKind,
    /// Amount asked for.
    pub amount: u64,
    /// Favor on fulfillment.
    #[serde(alias = "reward")]
    pub reward_favor: i32,
    /// Creation time.
    #[serde(alias = "time")]
    pub created_at: Timestamp,
    /// Whether it has been fulfilled.
    #[serde(default)]
    pub fulfilled: bool,
}

/// Expired request with the penalty applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    /// Request id.
    pub request_id: u64,
    /// Neighbor that asked.
    pub neighbor_id: NeighborId,
    /// Penalty applied.
    pub penalty: i32,
}

/// Open requests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DonationBoard {
    /// Requests, oldest first.
    pub requests: Vec<DonationRequest>,
    /// Next request id.
    pub next_id: u64,
}

impl DonationBoard {
    /// Look up a request.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&DonationRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    /// Whether a neighbor already has an open request.
    #[must_use]
    pub fn has_open(&self, neighbor_id: NeighborId) -> bool {
        self.requests.iter().any(|r| r.neighbor_id == neighbor_id)
    }

    /// Drop requests older than `expiry_ms`, penalizing unfulfilled ones.
    ///
    /// A request is expired once strictly more than `expiry_ms` has passed.
    pub fn expire(&mut self, neighbors: &mut [Neighbor], now: Timestamp, expiry_ms: u64) -> Vec<Expired> {
        let mut expired = Vec::new();
        self.requests.retain(|req| {
            if now.saturating_sub(req.created_at) <= expiry_ms {
                return true;
            }
            if !req.fulfilled {
                if let Some(neighbor) = find_mut(neighbors, req.neighbor_id) {
                    let penalty = expiry_penalty(req.personality);
                    shift_favor(neighbor, penalty);
                    expired.push(Expired {
                        request_id: req.id,
                        neighbor_id: req.neighbor_id,
                        penalty,
                    });
                }
            }
            false
        });
        expired
    }

    /// Roll for a new request and open it if one fires.
    ///
    /// Eligible neighbors have favor in `[-10, 70]` and no open request.
    pub fn maybe_open<R: RngCore + ?Sized>(
        &mut self,
        neighbors: &[Neighbor],
        now: Timestamp,
        chance_pct: u32,
        rng: &mut R,
    ) -> Option<&DonationRequest> {
        if !chance(rng, pct(chance_pct as i32)) {
            return None;
        }
        let eligible: Vec<&Neighbor> = neighbors
            .iter()
            .filter(|n| (MIN_ASKING_FAVOR..=MAX_ASKING_FAVOR).contains(&n.favor))
            .filter(|n| !self.has_open(n.id))
            .collect();
        let neighbor = *pick(rng, &eligible)?;
        let recipe = donation_recipe(neighbor.personality);
        self.next_id += 1;
        self.requests.push(DonationRequest {
            id: self.next_id,
            neighbor_id: neighbor.id,
            personality: neighbor.personality,
            resource: recipe.resource,
            amount: recipe.amount,
            reward_favor: recipe.reward_favor,
            created_at: now,
            fulfilled: false,
        });
        debug!(neighbor = neighbor.id, request = self.next_id, "Donation requested");
        self.requests.last()
    }

    /// Remove a request so it can be fulfilled.
    ///
    /// # Errors
    ///
    /// Unknown request or already fulfilled.
    pub fn take_for_fulfillment(&mut self, id: u64) -> CommandResult<DonationRequest> {
        let index = self
            .requests
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| CommandError::not_found(Target::DonationRequest, id))?;
        if self.requests[index].fulfilled {
            return Err(CommandError::AlreadyFulfilled);
        }
        let mut request = self.requests.remove(index);
        request.fulfilled = true;
        Ok(request)
    }

    /// Reject a request. Returns the penalty applied.
    ///
    /// # Errors
    ///
    /// Unknown request.
    pub fn reject(&mut self, neighbors: &mut [Neighbor], id: u64) -> CommandResult<i32> {
        let index = self
            .requests
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| CommandError::not_found(Target::DonationRequest, id))?;
        let request = self.requests.remove(index);
        let penalty = rejection_penalty(request.personality);
        if let Some(neighbor) = find_mut(neighbors, request.neighbor_id) {
            shift_favor(neighbor, penalty);
        }
        Ok(penalty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::initial_cohort;
    use rand::rngs::mock::StepRng;

    fn neutral_cohort() -> Vec<Neighbor> {
        let mut neighbors = initial_cohort(3, 0, &mut StepRng::new(0, 0));
        for n in &mut neighbors {
            n.favor = 0;
        }
        neighbors
    }

    #[test]
    fn test_open_and_expire() {
        let mut neighbors = neutral_cohort();
        let mut board = DonationBoard::default();
        let request = board
            .maybe_open(&neighbors, 1_000, 30, &mut StepRng::new(0, 0))
            .cloned()
            .unwrap();
        // Neighbor 1 is a merchant: greedy asks for 2000 gold.
        assert_eq!(request.neighbor_id, 1);
        assert_eq!((request.resource, request.amount, request.reward_favor), (ResourceKind::Gold, 2_000, 8));

        assert!(board.expire(&mut neighbors, 181_000, 180_000).is_empty());
        let expired = board.expire(&mut neighbors, 181_001, 180_000);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].penalty, -8);
        assert_eq!(neighbors[0].favor, -8);
        assert!(board.requests.is_empty());
    }

    #[test]
    fn test_roll_can_miss() {
        let neighbors = neutral_cohort();
        let mut board = DonationBoard::default();
        assert!(board
            .maybe_open(&neighbors, 0, 30, &mut StepRng::new(u64::MAX, 0))
            .is_none());
    }

    #[test]
    fn test_one_request_per_neighbor() {
        let mut neighbors = neutral_cohort();
        neighbors[1].favor = 71;
        neighbors[2].favor = -11;
        let mut board = DonationBoard::default();
        let mut rng = StepRng::new(0, 0);
        assert!(board.maybe_open(&neighbors, 0, 100, &mut rng).is_some());
        assert!(board.maybe_open(&neighbors, 0, 100, &mut rng).is_none());
        assert_eq!(board.requests.len(), 1);
    }

    #[test]
    fn test_fulfill_and_reject() {
        let mut neighbors = neutral_cohort();
        let mut board = DonationBoard::default();
        let mut rng = StepRng::new(0, 0);
        let first = board.maybe_open(&neighbors, 0, 100, &mut rng).unwrap().id;
        let second = board.maybe_open(&neighbors, 0, 100, &mut rng).unwrap().id;

        let taken = board.take_for_fulfillment(first).unwrap();
        assert!(taken.fulfilled);
        assert!(matches!(
            board.take_for_fulfillment(first),
            Err(CommandError::NotFound { .. })
        ));

        // Neighbor 2 is a hermit: peaceful rejection costs 6.
        assert_eq!(board.reject(&mut neighbors, second), Ok(-6));
        assert_eq!(neighbors[1].favor, -6);
        assert!(board.requests.is_empty());
    }
}
