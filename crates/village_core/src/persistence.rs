//! Snapshot persistence.
//!
//! The whole [`GameState`] is stored as one versioned JSON document under a
//! single key of a [`StoragePort`]. Loading tolerates missing fields (every
//! field has a default) and runs a repair pass over the result. Documents
//! from before version 2 are first lifted by [`crate::migration`]. A corrupt or
//! unreadable snapshot is reported on the diagnostic channel and replaced by
//! a fresh village; it never reaches the caller as an error.
//!
//! Writes are debounced by [`PersistenceCoordinator`]: each mutation pushes
//! the write out by the quiet interval, and nothing is written until the
//! coordinator has been marked initialized.

use std::collections::HashMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::clock::Timestamp;
use crate::config::GameConfig;
use crate::data::StructureKind;
use crate::error::{GameError, Result};
use crate::migration;
use crate::neighbors::initial_cohort;
use crate::relations::clamp_favor;
use crate::state::{GameState, SweepTimers};
use crate::workers::{UpgradeTarget, WorkerPool};

/// Schema version written by this build.
pub const SNAPSHOT_VERSION: u32 = 2;

const fn legacy_version() -> u32 {
    1
}

/// Key-value storage the snapshot lives in.
pub trait StoragePort {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Backend failure. A missing key is `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Backend failure.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Backend failure.
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-memory storage for tests and headless runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    /// Empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-loaded with one entry.
    #[must_use]
    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut storage = Self::default();
        storage.entries.insert(key.to_string(), value.to_string());
        storage
    }
}

impl StoragePort for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// The stored document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Schema version. Saves without one predate versioning.
    #[serde(default = "legacy_version")]
    pub version: u32,
    /// When the snapshot was taken.
    #[serde(default)]
    pub timestamp: Timestamp,
    /// The state itself, inlined at the top level.
    #[serde(flatten)]
    pub state: GameState,
}

impl Snapshot {
    /// Capture `state` at `now`.
    #[must_use]
    pub fn capture(state: &GameState, now: Timestamp) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            timestamp: now,
            state: state.clone(),
        }
    }

    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// [`GameError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| GameError::Serialization(e.to_string()))
    }

    /// Decode and version-check a stored document in the current schema.
    ///
    /// # Errors
    ///
    /// [`GameError::SnapshotParse`] for malformed JSON,
    /// [`GameError::UnsupportedVersion`] for a newer schema.
    pub fn parse(raw: &str) -> Result<Self> {
        let document: Value =
            serde_json::from_str(raw).map_err(|e| GameError::SnapshotParse(e.to_string()))?;
        Self::from_document(document)
    }

    fn from_document(document: Value) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_value(document).map_err(|e| GameError::SnapshotParse(e.to_string()))?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(GameError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }
}

/// Schema version a document claims. Documents without one predate
/// versioning.
fn document_version(document: &Value) -> u32 {
    document
        .get("version")
        .and_then(Value::as_u64)
        .map_or(legacy_version(), |v| u32::try_from(v).unwrap_or(u32::MAX))
}

/// What the repair pass changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepairReport {
    /// Structures whose level cap or upgrade flags were corrected.
    pub structures: usize,
    /// Neighbors whose template or favor was corrected.
    pub neighbors: usize,
    /// Whether the neighbor population had to be regenerated.
    pub regenerated_neighbors: bool,
    /// Upgrade jobs dropped because their structure was gone or idle.
    pub orphaned_jobs: usize,
    /// Busy workers freed because they held no job.
    pub released_workers: usize,
}

impl RepairReport {
    /// Whether anything changed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Bring a loaded state back within its invariants.
///
/// Level caps are overwritten with the canonical per-type values, missing
/// timestamps are anchored at `now`, logs are trimmed to capacity, and the
/// worker pool is reconciled with its jobs.
pub fn repair<R: RngCore + ?Sized>(
    state: &mut GameState,
    config: &GameConfig,
    now: Timestamp,
    rng: &mut R,
) -> RepairReport {
    let mut report = RepairReport::default();

    for s in &mut state.structures {
        let before = s.clone();
        s.max_level = s.kind.max_level();
        s.level = s.level.clamp(1, s.max_level);
        if s.name.is_empty() {
            s.name = s.kind.display_name().to_string();
        }
        if s.upgrading != s.upgrade_end_at.is_some() {
            s.upgrading = false;
            s.upgrade_end_at = None;
        }
        if *s != before {
            report.structures += 1;
        }
    }
    if let Some(hall) = state
        .structures
        .iter()
        .find(|s| s.kind == StructureKind::TownHall)
    {
        state.town_level = hall.level;
    }
    state.town_level = state.town_level.max(1);
    state.multiplier = state.multiplier.max(1);

    if state.neighbors.is_empty() {
        state.neighbors = initial_cohort(config.initial_neighbors, now, rng);
        report.regenerated_neighbors = true;
    }
    for n in &mut state.neighbors {
        let before = (n.archetype, n.personality, n.favor);
        n.rederive_template();
        n.favor = clamp_favor(n.favor);
        if (n.archetype, n.personality, n.favor) != before {
            report.neighbors += 1;
        }
    }

    report.orphaned_jobs = drop_orphaned_jobs(state);
    for s in &mut state.structures {
        let has_job = state.workers.job_for(UpgradeTarget::Structure(s.id)).is_some();
        if s.upgrading && !has_job {
            s.upgrading = false;
            s.upgrade_end_at = None;
            report.structures += 1;
        }
    }
    if state.workers.workers.is_empty() {
        state.workers.workers = WorkerPool::default().workers;
    }
    report.released_workers = state.workers.reconcile();

    if state.resources.last_collect_at == 0 {
        state.resources.last_collect_at = now;
    }
    let capacity = state.capacity();
    state.resources.clamp_to(&capacity);

    let SweepTimers {
        drift_at,
        fatigue_at,
        neighbor_growth_at,
        tree_growth_at,
    } = &mut state.timers;
    for timer in [drift_at, fatigue_at, neighbor_growth_at, tree_growth_at] {
        timer.get_or_insert(now);
    }

    state.battle_history.enforce_capacity();
    state.messages.messages.enforce_capacity();
    state.invasions.history.enforce_capacity();

    report
}

/// Drop jobs for missing or idle structures and repeated targets. Returns
/// how many were dropped.
fn drop_orphaned_jobs(state: &mut GameState) -> usize {
    let structures = &state.structures;
    let mut seen = Vec::new();
    let before = state.workers.jobs.len();
    state.workers.jobs.retain(|job| {
        let live = match job.target {
            UpgradeTarget::Structure(id) => structures.iter().any(|s| s.id == id && s.upgrading),
            UpgradeTarget::ClanCastle(_) => true,
        };
        if !live || seen.contains(&job.target) {
            return false;
        }
        seen.push(job.target);
        true
    });
    before - state.workers.jobs.len()
}

/// Parse, version-check and repair a stored document.
///
/// Documents older than [`SNAPSHOT_VERSION`] go through
/// [`migration::migrate`] first.
///
/// # Errors
///
/// Any [`Snapshot::parse`] or [`migration::migrate`] error.
pub fn restore<R: RngCore + ?Sized>(
    raw: &str,
    config: &GameConfig,
    now: Timestamp,
    rng: &mut R,
) -> Result<GameState> {
    let document: Value =
        serde_json::from_str(raw).map_err(|e| GameError::SnapshotParse(e.to_string()))?;
    let version = document_version(&document);
    let mut state = if version < SNAPSHOT_VERSION {
        migration::migrate(document, config, now, rng)?
    } else {
        Snapshot::from_document(document)?.state
    };
    let report = repair(&mut state, config, now, rng);
    if !report.is_clean() || version < SNAPSHOT_VERSION {
        info!(
            version,
            structures = report.structures,
            neighbors = report.neighbors,
            regenerated = report.regenerated_neighbors,
            orphaned_jobs = report.orphaned_jobs,
            released_workers = report.released_workers,
            "Repaired loaded save"
        );
    }
    Ok(state)
}

/// Owns the storage port, the debounce timer and the initialized gate.
pub struct PersistenceCoordinator {
    storage: Box<dyn StoragePort>,
    key: String,
    quiet_ms: u64,
    dirty_at: Option<Timestamp>,
    initialized: bool,
    writes: u64,
}

impl std::fmt::Debug for PersistenceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceCoordinator")
            .field("key", &self.key)
            .field("quiet_ms", &self.quiet_ms)
            .field("dirty_at", &self.dirty_at)
            .field("initialized", &self.initialized)
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}

impl PersistenceCoordinator {
    /// Coordinator over `storage` using the key and quiet interval from
    /// `config`. Writes stay suppressed until [`Self::mark_initialized`].
    #[must_use]
    pub fn new(storage: Box<dyn StoragePort>, config: &GameConfig) -> Self {
        Self {
            storage,
            key: config.save_key.clone(),
            quiet_ms: config.autosave_quiet_ms,
            dirty_at: None,
            initialized: false,
            writes: 0,
        }
    }

    /// Load the stored village, or build a fresh one if there is none or it
    /// cannot be read.
    pub fn load_or_fresh<R: RngCore + ?Sized>(
        &self,
        config: &GameConfig,
        now: Timestamp,
        rng: &mut R,
    ) -> GameState {
        match self.storage.get(&self.key) {
            Ok(Some(raw)) => match restore(&raw, config, now, rng) {
                Ok(state) => {
                    info!(key = %self.key, "Loaded save");
                    state
                }
                Err(e) => {
                    error!(key = %self.key, error = %e, "Discarding unreadable save");
                    GameState::new(config, now, rng)
                }
            },
            Ok(None) => {
                debug!(key = %self.key, "No save found, starting fresh");
                GameState::new(config, now, rng)
            }
            Err(e) => {
                error!(key = %self.key, error = %e, "Storage read failed, starting fresh");
                GameState::new(config, now, rng)
            }
        }
    }

    /// Allow writes from now on.
    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// Whether writes are allowed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Record a mutation at `now`, restarting the quiet interval.
    pub fn mark_dirty(&mut self, now: Timestamp) {
        self.dirty_at = Some(now);
    }

    /// Whether a write is pending.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty_at.is_some()
    }

    /// Snapshots written so far.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// The underlying storage.
    #[must_use]
    pub fn storage(&self) -> &dyn StoragePort {
        self.storage.as_ref()
    }

    /// Write if a mutation is pending and the quiet interval has passed.
    ///
    /// Returns whether a snapshot was written. A failed write is reported
    /// and stays pending.
    pub fn flush_if_due(&mut self, state: &GameState, now: Timestamp) -> bool {
        let Some(dirty_at) = self.dirty_at else {
            return false;
        };
        if !self.initialized || now < dirty_at + self.quiet_ms {
            return false;
        }
        match self.write(state, now) {
            Ok(()) => true,
            Err(e) => {
                error!(key = %self.key, error = %e, "Autosave failed");
                false
            }
        }
    }

    /// Write immediately, ignoring the quiet interval.
    ///
    /// Does nothing before initialization.
    ///
    /// # Errors
    ///
    /// Serialization or storage failure.
    pub fn flush(&mut self, state: &GameState, now: Timestamp) -> Result<bool> {
        if !self.initialized {
            warn!(key = %self.key, "Save requested before initialization, skipped");
            return Ok(false);
        }
        self.write(state, now)?;
        Ok(true)
    }

    /// Delete the stored snapshot.
    ///
    /// # Errors
    ///
    /// Storage failure.
    pub fn clear(&mut self) -> Result<()> {
        self.dirty_at = None;
        self.storage.remove(&self.key)
    }

    fn write(&mut self, state: &GameState, now: Timestamp) -> Result<()> {
        let json = Snapshot::capture(state, now).to_json()?;
        self.storage.set(&self.key, &json)?;
        self.dirty_at = None;
        self.writes += 1;
        info!(key = %self.key, bytes = json.len(), "Saved");
        Ok(())
    }
}
