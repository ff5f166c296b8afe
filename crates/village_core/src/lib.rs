//! # Village Core
//!
//! Simulation core for a single-player village builder.
//!
//! This crate contains **only** simulation logic:
//! - No rendering
//! - No wall-clock reads (time is passed in)
//! - No ambient randomness (the generator is injected)
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Offline catch-up after any pause
//! - Seeded, reproducible sessions
//! - Host-agnostic persistence through [`persistence::StoragePort`]
//!
//! ## Crate Structure
//!
//! - [`economy`] - Resource ledger, capacities and production
//! - [`structures`] / [`workers`] - Structure registry and upgrade jobs
//! - [`training`] / [`heroes`] / [`clan_castle`] - Army
//! - [`combat`] / [`invasion`] / [`battle_log`] - Battle resolution
//! - [`neighbors`] / [`relations`] / [`donations`] - Neighbor villages
//! - [`history`] - Notifications and battle history
//! - [`persistence`] / [`migration`] - Snapshots, version-1 saves, repair and
//!   debounced saves
//! - [`engine`] - The advance loop and player commands

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod battle_log;
pub mod campaign;
pub mod clan_castle;
pub mod clock;
pub mod combat;
pub mod config;
pub mod data;
pub mod donations;
pub mod economy;
pub mod engine;
pub mod error;
pub mod heroes;
pub mod history;
pub mod invasion;
pub mod math;
pub mod migration;
pub mod neighbors;
pub mod obstacles;
pub mod persistence;
pub mod relations;
pub mod response;
pub mod scheduler;
pub mod state;
pub mod structures;
pub mod training;
pub mod workers;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock, Timestamp};
    pub use crate::config::GameConfig;
    pub use crate::data::{Personality, StructureKind};
    pub use crate::economy::{ResourceKind, ResourceState};
    pub use crate::engine::{Engine, EngineEvent};
    pub use crate::error::{CommandError, CommandResult, GameError, Result};
    pub use crate::math::Fixed;
    pub use crate::neighbors::{Neighbor, NeighborId};
    pub use crate::persistence::{MemoryStorage, PersistenceCoordinator, StoragePort};
    pub use crate::response::CommandResponse;
    pub use crate::state::GameState;
    pub use crate::workers::UpgradeTarget;
}
