//! Worker pool scheduler.
//!
//! Workers serialize structure and clan castle upgrades: each worker holds at
//! most one task, and every in-flight [`UpgradeJob`] records the id of the
//! worker it is bound to. Completion frees exactly that worker.
//!
//! Fatigue is tracked per worker. It drops while a worker is busy, recovers
//! while idle, and never blocks scheduling; it only feeds the invasion model.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Timestamp;
use crate::error::{CommandError, CommandResult, Target};
use crate::math::roll_inclusive;
use crate::structures::StructureId;

/// Worker identifier.
pub type WorkerId = u32;

/// Full-rest fatigue value.
pub const MAX_FATIGUE: u32 = 100;

/// Fatigue recovered per idle tick.
pub const IDLE_RECOVERY: u32 = 5;

/// Gem cost of the 2nd, 3rd, 4th and 5th worker.
pub const HIRE_COSTS: [u64; 4] = [250, 500, 1_000, 2_000];

/// Largest pool size.
pub const MAX_WORKERS: usize = HIRE_COSTS.len() + 1;

/// Fatigue points restored per gem.
pub const FATIGUE_PER_GEM: u32 = 10;

const fn full_fatigue() -> u32 {
    MAX_FATIGUE
}

/// One builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    /// Identifier.
    pub id: WorkerId,
    /// Whether a task is held.
    #[serde(default)]
    pub busy: bool,
    /// Human-readable task, e.g. "Upgrade Gold Mine".
    #[serde(default, alias = "task")]
    pub task_label: Option<String>,
    /// End of the held task.
    #[serde(default, alias = "endTime")]
    pub task_end_at: Option<Timestamp>,
    /// Energy in `[0, 100]`.
    #[serde(default = "full_fatigue")]
    pub fatigue: u32,
}

impl Worker {
    /// A rested, idle worker.
    #[must_use]
    pub const fn new(id: WorkerId) -> Self {
        Self {
            id,
            busy: false,
            task_label: None,
            task_end_at: None,
            fatigue: MAX_FATIGUE,
        }
    }

    fn free(&mut self) {
        self.busy = false;
        self.task_label = None;
        self.task_end_at = None;
    }
}

/// Sentinel marker serialized as the string `"clancastle"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClanCastleTag {
    /// The only value.
    #[serde(rename = "clancastle")]
    ClanCastle,
}

/// What an upgrade job is working on.
///
/// Structures are keyed by numeric id; the clan castle lives outside the
/// registry and uses a string sentinel instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpgradeTarget {
    /// A structure in the registry.
    Structure(StructureId),
    /// The singleton clan castle.
    ClanCastle(ClanCastleTag),
}

impl UpgradeTarget {
    /// The clan castle target.
    pub const CLAN_CASTLE: Self = Self::ClanCastle(ClanCastleTag::ClanCastle);
}

/// One in-flight upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeJob {
    /// Target being upgraded. At most one job per target.
    #[serde(alias = "buildingId")]
    pub target: UpgradeTarget,
    /// Level reached on completion.
    #[serde(default)]
    pub target_level: u32,
    /// When the job started.
    #[serde(default, alias = "startTime")]
    pub started_at: Timestamp,
    /// When the job completes.
    #[serde(alias = "endTime")]
    pub end_at: Timestamp,
    /// Worker bound to the job. Older saves lack it and fall back to the
    /// task label.
    #[serde(default)]
    pub worker_id: Option<WorkerId>,
    /// Label the bound worker carries.
    #[serde(default)]
    pub label: String,
}

/// Workers plus the jobs they are bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerPool {
    /// Every worker, in id order.
    pub workers: Vec<Worker>,
    /// In-flight upgrades.
    pub jobs: Vec<UpgradeJob>,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self {
            workers: vec![Worker::new(1)],
            jobs: Vec::new(),
        }
    }
}

impl WorkerPool {
    /// Number of idle workers.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.workers.iter().filter(|w| !w.busy).count()
    }

    /// Average fatigue, rounded to nearest. An empty pool reads as rested.
    #[must_use]
    pub fn average_fatigue(&self) -> u32 {
        if self.workers.is_empty() {
            return MAX_FATIGUE;
        }
        let n = self.workers.len() as u32;
        let total: u32 = self.workers.iter().map(|w| w.fatigue).sum();
        (total + n / 2) / n
    }

    /// Look up a worker.
    #[must_use]
    pub fn worker(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.iter().find(|w| w.id == id)
    }

    /// Job for a target, if one is in flight.
    #[must_use]
    pub fn job_for(&self, target: UpgradeTarget) -> Option<&UpgradeJob> {
        self.jobs.iter().find(|j| j.target == target)
    }

    /// The idle worker to hand the next task to: most rested first, lowest id
    /// on ties.
    #[must_use]
    pub fn next_idle(&self) -> Option<WorkerId> {
        self.workers
            .iter()
            .filter(|w| !w.busy)
            .min_by_key(|w| (std::cmp::Reverse(w.fatigue), w.id))
            .map(|w| w.id)
    }

    /// Bind an idle worker to a new job.
    ///
    /// # Errors
    ///
    /// [`CommandError::AlreadyUpgrading`] if the target already has a job,
    /// [`CommandError::NoIdleWorker`] if every worker is busy.
    pub fn assign(
        &mut self,
        target: UpgradeTarget,
        label: String,
        target_level: u32,
        now: Timestamp,
        end_at: Timestamp,
    ) -> CommandResult<WorkerId> {
        if self.job_for(target).is_some() {
            return Err(CommandError::AlreadyUpgrading);
        }
        let id = self.next_idle().ok_or(CommandError::NoIdleWorker)?;
        if let Some(worker) = self.workers.iter_mut().find(|w| w.id == id) {
            worker.busy = true;
            worker.task_label = Some(label.clone());
            worker.task_end_at = Some(end_at);
        }
        self.jobs.push(UpgradeJob {
            target,
            target_level,
            started_at: now,
            end_at,
            worker_id: Some(id),
            label,
        });
        debug!(worker = id, ?target, end_at, "Worker assigned");
        Ok(id)
    }

    /// Targets whose jobs are due at `now`, earliest first.
    #[must_use]
    pub fn due_targets(&self, now: Timestamp) -> Vec<UpgradeTarget> {
        let mut due: Vec<_> = self
            .jobs
            .iter()
            .filter(|j| j.end_at <= now)
            .map(|j| (j.end_at, j.target))
            .collect();
        due.sort_unstable();
        due.into_iter().map(|(_, t)| t).collect()
    }

    /// Remove the job for `target` and free the worker bound to it.
    ///
    /// Returns the removed job and the id of the freed worker, if any.
    pub fn complete(&mut self, target: UpgradeTarget) -> Option<(UpgradeJob, Option<WorkerId>)> {
        let index = self.jobs.iter().position(|j| j.target == target)?;
        let job = self.jobs.remove(index);
        let worker = match job.worker_id {
            Some(id) => self.workers.iter_mut().find(|w| w.id == id && w.busy),
            None => self
                .workers
                .iter_mut()
                .find(|w| w.busy && w.task_label.as_deref() == Some(job.label.as_str())),
        };
        let freed = worker.map(|w| {
            w.free();
            w.id
        });
        Some((job, freed))
    }

    /// Free every worker whose task end has passed, job or not.
    ///
    /// Returns how many were freed.
    pub fn release_expired(&mut self, now: Timestamp) -> usize {
        let bound: Vec<WorkerId> = self.jobs.iter().filter_map(|j| j.worker_id).collect();
        let mut freed = 0;
        for w in &mut self.workers {
            let expired = w.busy && w.task_end_at.map_or(true, |end| end <= now);
            if expired && !bound.contains(&w.id) {
                w.free();
                freed += 1;
            }
        }
        freed
    }

    /// One fatigue step: busy workers lose 3..=5, idle ones gain 5.
    pub fn tick_fatigue<R: rand::RngCore + ?Sized>(&mut self, rng: &mut R) {
        for w in &mut self.workers {
            if w.busy {
                let loss = roll_inclusive(rng, 3, 5);
                w.fatigue = w.fatigue.saturating_sub(loss);
            } else {
                w.fatigue = (w.fatigue + IDLE_RECOVERY).min(MAX_FATIGUE);
            }
        }
    }

    /// Gem cost of restoring `amount` fatigue to one worker, or to all
    /// workers when `id` is `None`.
    #[must_use]
    pub fn restore_cost(&self, id: Option<WorkerId>, amount: u32) -> u64 {
        let per_worker = u64::from(amount.div_ceil(FATIGUE_PER_GEM));
        match id {
            Some(_) => per_worker,
            None => per_worker * self.workers.len() as u64,
        }
    }

    /// Add `amount` fatigue to one worker or all workers, clamped.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotFound`] for an unknown worker id.
    pub fn restore(&mut self, id: Option<WorkerId>, amount: u32) -> CommandResult<usize> {
        let mut touched = 0;
        for w in &mut self.workers {
            if id.map_or(true, |id| id == w.id) {
                w.fatigue = w.fatigue.saturating_add(amount).min(MAX_FATIGUE);
                touched += 1;
            }
        }
        match (id, touched) {
            (Some(id), 0) => Err(CommandError::not_found(Target::Worker, id)),
            _ => Ok(touched),
        }
    }

    /// Gem cost of the next hire, or `None` at the pool cap.
    #[must_use]
    pub fn next_hire_cost(&self) -> Option<u64> {
        self.workers
            .len()
            .checked_sub(1)
            .and_then(|i| HIRE_COSTS.get(i))
            .copied()
    }

    /// Add a rested worker. Caller is responsible for charging the cost.
    pub fn hire(&mut self) -> WorkerId {
        let id = self.workers.iter().map(|w| w.id).max().unwrap_or(0) + 1;
        self.workers.push(Worker::new(id));
        id
    }

    /// Make workers and jobs agree again after a load.
    ///
    /// Every job ends up bound to a distinct existing worker when one can be
    /// found, bound workers are marked busy with the job's label and end, and
    /// busy workers holding no job are freed. Returns how many workers were
    /// freed.
    pub fn reconcile(&mut self) -> usize {
        let mut bound: Vec<WorkerId> = Vec::with_capacity(self.jobs.len());
        for job in &mut self.jobs {
            match job.worker_id {
                Some(id) if self.workers.iter().any(|w| w.id == id) && !bound.contains(&id) => {
                    bound.push(id);
                }
                _ => job.worker_id = None,
            }
        }

        for job in self.jobs.iter_mut().filter(|j| j.worker_id.is_none()) {
            let holder = self
                .workers
                .iter()
                .filter(|w| w.busy && !bound.contains(&w.id))
                .find(|w| {
                    w.task_end_at == Some(job.end_at)
                        || (!job.label.is_empty() && w.task_label.as_deref() == Some(job.label.as_str()))
                })
                .or_else(|| {
                    self.workers
                        .iter()
                        .filter(|w| !w.busy && !bound.contains(&w.id))
                        .min_by_key(|w| (std::cmp::Reverse(w.fatigue), w.id))
                })
                .map(|w| w.id);
            if let Some(id) = holder {
                job.worker_id = Some(id);
                bound.push(id);
            }
        }

        let mut freed = 0;
        for w in &mut self.workers {
            w.fatigue = w.fatigue.min(MAX_FATIGUE);
            if let Some(job) = self.jobs.iter().find(|j| j.worker_id == Some(w.id)) {
                w.busy = true;
                w.task_end_at = Some(job.end_at);
                if !job.label.is_empty() {
                    w.task_label = Some(job.label.clone());
                }
            } else if w.busy {
                w.free();
                freed += 1;
            } else {
                w.task_label = None;
                w.task_end_at = None;
            }
        }
        if freed > 0 {
            debug!(freed, "Released workers holding no job");
        }
        freed
    }
}
