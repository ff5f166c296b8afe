//! Unit roster and training queue.
//!
//! Training is independent of the worker pool. Jobs are appended
//! unconditionally and complete purely by time; population capacity is only
//! enforced by the discrete [`train_one`] command.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Timestamp, MS_PER_SECOND};
use crate::data::training_seconds_for;
use crate::error::{CommandError, CommandResult, Target};

/// Unit identifier.
pub type UnitId = u32;

/// A troop type owned by the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    /// Identifier.
    pub id: UnitId,
    /// Display name; also the key into the unit tables.
    pub name: String,
    /// Current level.
    #[serde(default = "one")]
    pub level: u32,
    /// Number owned.
    #[serde(default)]
    pub count: u32,
    /// Level cap.
    #[serde(default = "one")]
    pub max_level: u32,
    /// Housing space per unit.
    #[serde(default = "one", alias = "population")]
    pub population_cost: u32,
    /// Whether the unit may be trained and deployed.
    #[serde(default = "yes")]
    pub unlocked: bool,
}

const fn one() -> u32 {
    1
}

const fn yes() -> bool {
    true
}

impl Unit {
    fn starter(id: UnitId, name: &str, max_level: u32, population_cost: u32) -> Self {
        Self {
            id,
            name: name.to_string(),
            level: 1,
            count: 0,
            max_level,
            population_cost,
            unlocked: true,
        }
    }
}

/// The three units every village starts with.
#[must_use]
pub fn default_units() -> Vec<Unit> {
    vec![
        Unit::starter(1, "Barbarian", 9, 1),
        Unit::starter(2, "Archer", 9, 1),
        Unit::starter(3, "Giant", 8, 5),
    ]
}

/// `Σ count × population_cost`.
#[must_use]
pub fn army_population(units: &[Unit]) -> u64 {
    units
        .iter()
        .map(|u| u64::from(u.count) * u64::from(u.population_cost))
        .sum()
}

/// Add one unit immediately if it fits in `capacity`.
///
/// # Errors
///
/// Unknown or locked unit, or [`CommandError::CapacityExceeded`]; the count
/// is unchanged on failure.
pub fn train_one(units: &mut [Unit], id: UnitId, capacity: u64) -> CommandResult<u32> {
    let used = army_population(units);
    let unit = units
        .iter_mut()
        .find(|u| u.id == id)
        .ok_or_else(|| CommandError::not_found(Target::Unit, id))?;
    if !unit.unlocked {
        return Err(CommandError::Locked("unit not unlocked"));
    }
    let cost = u64::from(unit.population_cost);
    if used + cost > capacity {
        return Err(CommandError::CapacityExceeded {
            used,
            requested: cost,
            capacity,
        });
    }
    unit.count += 1;
    Ok(unit.count)
}

/// One queued training job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingJob {
    /// Unit being trained.
    #[serde(alias = "troopId")]
    pub unit_id: UnitId,
    /// Name used if the unit record must be created.
    #[serde(alias = "troopName")]
    pub unit_name: String,
    /// Housing space of the trained unit.
    #[serde(default = "one", alias = "population")]
    pub population_cost: u32,
    /// When the job was queued.
    #[serde(default, alias = "startTime")]
    pub started_at: Timestamp,
    /// When the unit is ready.
    #[serde(alias = "endTime")]
    pub end_at: Timestamp,
}

/// A unit that finished training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingCompleted {
    /// Unit id.
    pub unit_id: UnitId,
    /// Unit name.
    pub unit_name: String,
    /// New count.
    pub count: u32,
}

/// FIFO training queue.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainingQueue {
    jobs: Vec<TrainingJob>,
}

impl From<Vec<TrainingJob>> for TrainingQueue {
    fn from(jobs: Vec<TrainingJob>) -> Self {
        Self { jobs }
    }
}

impl TrainingQueue {
    /// Queued jobs, oldest first.
    #[must_use]
    pub fn jobs(&self) -> &[TrainingJob] {
        &self.jobs
    }

    /// Number of queued jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Housing space of everything still in the queue.
    #[must_use]
    pub fn population(&self) -> u64 {
        self.jobs.iter().map(|j| u64::from(j.population_cost)).sum()
    }

    /// Append a job. Never fails.
    pub fn enqueue(
        &mut self,
        unit_id: UnitId,
        unit_name: &str,
        population_cost: u32,
        now: Timestamp,
    ) -> &TrainingJob {
        let end_at = now + training_seconds_for(unit_name) * MS_PER_SECOND;
        self.jobs.push(TrainingJob {
            unit_id,
            unit_name: unit_name.to_string(),
            population_cost,
            started_at: now,
            end_at,
        });
        &self.jobs[self.jobs.len() - 1]
    }

    /// Complete every job due at `now`, in queue order.
    ///
    /// Completion bumps the unit count or creates the unit at level 1.
    pub fn tick(&mut self, units: &mut Vec<Unit>, now: Timestamp) -> Vec<TrainingCompleted> {
        let (due, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.jobs).into_iter().partition(|j| j.end_at <= now);
        self.jobs = pending;

        let mut completed = Vec::with_capacity(due.len());
        for job in due {
            let count = match units.iter_mut().find(|u| u.id == job.unit_id) {
                Some(unit) => {
                    unit.count += 1;
                    unit.count
                }
                None => {
                    units.push(Unit {
                        id: job.unit_id,
                        name: job.unit_name.clone(),
                        level: 1,
                        count: 1,
                        max_level: 1,
                        population_cost: job.population_cost,
                        unlocked: true,
                    });
                    1
                }
            };
            debug!(unit = %job.unit_name, count, "Training complete");
            completed.push(TrainingCompleted {
                unit_id: job.unit_id,
                unit_name: job.unit_name,
                count,
            });
        }
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_one_respects_capacity() {
        let mut units = default_units();
        units[0].count = 10;
        assert_eq!(army_population(&units), 10);

        // Giant costs 5: 10 + 5 = 15 fits exactly.
        assert_eq!(train_one(&mut units, 3, 15), Ok(1));
        assert_eq!(
            train_one(&mut units, 1, 15),
            Err(CommandError::CapacityExceeded {
                used: 15,
                requested: 1,
                capacity: 15
            })
        );
        assert_eq!(units[0].count, 10);
    }

    #[test]
    fn test_locked_and_unknown_units() {
        let mut units = default_units();
        units[1].unlocked = false;
        assert!(matches!(
            train_one(&mut units, 2, 100),
            Err(CommandError::Locked(_))
        ));
        assert!(matches!(
            train_one(&mut units, 42, 100),
            Err(CommandError::NotFound { .. })
        ));
    }

    #[test]
    fn test_queue_completes_in_time_order() {
        let mut units = default_units();
        let mut queue = TrainingQueue::default();
        assert_eq!(queue.enqueue(1, "Barbarian", 1, 0).end_at, 1_000);
        assert_eq!(queue.enqueue(3, "Giant", 5, 0).end_at, 5_000);
        assert_eq!(queue.population(), 6);

        let done = queue.tick(&mut units, 1_000);
        assert_eq!(done.len(), 1);
        assert_eq!(units[0].count, 1);
        assert_eq!(queue.len(), 1);

        assert!(queue.tick(&mut units, 4_999).is_empty());
        assert_eq!(queue.tick(&mut units, 5_000).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_completion_creates_missing_unit() {
        let mut units = default_units();
        let mut queue = TrainingQueue::default();
        queue.enqueue(9, "Dragon", 20, 0);
        queue.tick(&mut units, 30_000);
        let dragon = units.iter().find(|u| u.id == 9).unwrap();
        assert_eq!((dragon.level, dragon.count, dragon.population_cost), (1, 1, 20));
    }

    #[test]
    fn test_queue_ignores_capacity() {
        let mut units = default_units();
        let mut queue = TrainingQueue::default();
        for _ in 0..50 {
            queue.enqueue(3, "Giant", 5, 0);
        }
        queue.tick(&mut units, 10_000);
        assert_eq!(units[2].count, 50);
    }
}
