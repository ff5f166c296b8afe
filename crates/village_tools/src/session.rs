//! A village kept on disk between CLI invocations.
//!
//! Besides the engine's own snapshot, the save directory holds a small meta
//! entry with the session seed and a manual clock. Time only moves when the
//! `advance` command moves it, so a scripted sequence of invocations replays
//! identically.

use std::path::Path;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use village_core::clock::{Clock, ManualClock, Timestamp};
use village_core::config::GameConfig;
use village_core::economy::{Capacity, Production, ResourceState};
use village_core::engine::{Engine, EngineEvent};
use village_core::error::{GameError, Result};
use village_core::persistence::StoragePort;

use crate::file_storage::FileStorage;

/// Storage key of the session meta entry.
pub const META_KEY: &str = "village-cli-meta";

/// Seed and clock persisted next to the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Base seed chosen at creation.
    pub seed: u64,
    /// Manual clock reading.
    pub now: Timestamp,
    /// Completed invocations; mixed into the per-run seed.
    pub invocations: u64,
}

impl SessionMeta {
    fn run_seed(&self) -> u64 {
        self.seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(self.invocations)
    }
}

/// Summary printed by `status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Manual clock reading.
    pub now: Timestamp,
    /// Town level.
    pub town_level: u32,
    /// Balances.
    pub resources: ResourceState,
    /// Storage ceilings.
    pub capacity: Capacity,
    /// Production per minute.
    pub production: Production,
    /// `(idle, total)` workers.
    pub workers: (usize, usize),
    /// Structures currently upgrading, as `(id, name, end_at)`.
    pub upgrading: Vec<(u32, String, Timestamp)>,
    /// `(used, capacity)` army housing.
    pub army: (u64, u64),
    /// Known neighbors.
    pub neighbors: usize,
    /// Allied neighbors.
    pub allies: usize,
    /// Open donation requests.
    pub donation_requests: usize,
    /// Unread inbox messages.
    pub unread_messages: u32,
}

/// An engine bound to a save directory.
pub struct Session {
    engine: Engine,
    clock: ManualClock,
    meta: SessionMeta,
    storage: FileStorage,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("root", &self.storage.root())
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a new village in `root`, replacing any village already there.
    ///
    /// # Errors
    ///
    /// The directory cannot be written.
    pub fn create(root: &Path, config: GameConfig, seed: u64, start: Timestamp) -> Result<Self> {
        let mut storage = FileStorage::new(root);
        storage.remove(&config.save_key)?;
        let meta = SessionMeta {
            seed,
            now: start,
            invocations: 0,
        };
        tracing::info!(root = %root.display(), seed, start, "Creating village");
        Ok(Self::build(storage, config, meta))
    }

    /// Reopen the village in `root`.
    ///
    /// # Errors
    ///
    /// [`GameError::Storage`] if no session exists there or its meta entry
    /// is unreadable.
    pub fn open(root: &Path, config: GameConfig) -> Result<Self> {
        let storage = FileStorage::new(root);
        let raw = storage.get(META_KEY)?.ok_or_else(|| {
            GameError::Storage(format!(
                "no village in {}; run `village-cli new` first",
                root.display()
            ))
        })?;
        let meta: SessionMeta =
            serde_json::from_str(&raw).map_err(|e| GameError::Storage(format!("{META_KEY}: {e}")))?;
        Ok(Self::build(storage, config, meta))
    }

    fn build(storage: FileStorage, config: GameConfig, meta: SessionMeta) -> Self {
        let clock = ManualClock::new(meta.now);
        let rng = ChaCha8Rng::seed_from_u64(meta.run_seed());
        let engine = Engine::load(config, Box::new(storage.clone()), rng, clock.now());
        Self {
            engine,
            clock,
            meta,
            storage,
        }
    }

    /// Current clock reading.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// The engine.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The engine, for issuing commands.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Move the clock forward and let the engine catch up.
    pub fn advance_by(&mut self, ms: u64) -> Vec<EngineEvent> {
        self.clock.advance(ms);
        let events = self.engine.advance(self.clock.now());
        for event in &events {
            tracing::debug!(?event, "Engine event");
        }
        events
    }

    /// Snapshot of the headline numbers.
    #[must_use]
    pub fn status(&self) -> StatusReport {
        let state = self.engine.state();
        StatusReport {
            now: self.now(),
            town_level: state.town_level,
            resources: state.resources.clone(),
            capacity: state.capacity(),
            production: state.production(),
            workers: (state.workers.idle_count(), state.workers.workers.len()),
            upgrading: state
                .structures
                .iter()
                .filter_map(|s| s.upgrade_end_at.map(|end| (s.id, s.name.clone(), end)))
                .collect(),
            army: (state.army_population(), state.army_capacity()),
            neighbors: state.neighbors.len(),
            allies: state.neighbors.iter().filter(|n| n.allied).count(),
            donation_requests: state.donations.requests.len(),
            unread_messages: state.messages.unread,
        }
    }

    /// Save the village and the session meta.
    ///
    /// # Errors
    ///
    /// Serialization or storage failure.
    pub fn close(mut self) -> Result<SessionMeta> {
        let now = self.now();
        self.engine.save(now)?;
        let meta = SessionMeta {
            now,
            invocations: self.meta.invocations + 1,
            ..self.meta
        };
        let json = serde_json::to_string(&meta).map_err(|e| GameError::Serialization(e.to_string()))?;
        self.storage.set(META_KEY, &json)?;
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_without_village_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Session::open(dir.path(), GameConfig::default()).unwrap_err();
        assert!(matches!(err, GameError::Storage(_)));
    }

    #[test]
    fn test_clock_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::create(dir.path(), GameConfig::default(), 9, 1_000).unwrap();
        session.advance_by(120_000);
        let meta = session.close().unwrap();
        assert_eq!(meta.now, 121_000);
        assert_eq!(meta.invocations, 1);

        let reopened = Session::open(dir.path(), GameConfig::default()).unwrap();
        assert_eq!(reopened.now(), 121_000);
        assert_eq!(reopened.engine().state().resources.last_collect_at, 121_000);
    }

    #[test]
    fn test_status_of_fresh_village() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::create(dir.path(), GameConfig::default(), 1, 1_000).unwrap();
        let status = session.status();
        assert_eq!(status.town_level, 1);
        assert_eq!(status.workers, (1, 1));
        assert_eq!(status.neighbors, 10);
        assert!(status.upgrading.is_empty());
    }
}
