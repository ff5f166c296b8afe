//! Error types for the village simulation.
//!
//! Two families live here:
//! - [`CommandError`] - precondition failures of player commands. These are
//!   ordinary outcomes, surfaced to the UI as `{success: false, message}`.
//! - [`GameError`] - faults at the persistence/config boundary. The engine
//!   converts these into diagnostics and a fresh-state fallback.

use thiserror::Error;

use crate::economy::ResourceKind;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Result type returned by every player command.
pub type CommandResult<T> = std::result::Result<T, CommandError>;

/// Errors raised while loading or saving state and configuration.
#[derive(Debug, Error)]
pub enum GameError {
    /// Stored snapshot could not be parsed.
    #[error("Failed to parse snapshot: {0}")]
    SnapshotParse(String),

    /// Stored snapshot was written by a newer schema.
    #[error("Unsupported snapshot version {found} (newest supported: {supported})")]
    UnsupportedVersion {
        /// Version found in storage.
        found: u32,
        /// Newest version this build understands.
        supported: u32,
    },

    /// Configuration file could not be parsed.
    #[error("Failed to parse config '{path}': {message}")]
    ConfigParse {
        /// Path or label of the config source.
        path: String,
        /// Error message.
        message: String,
    },

    /// State could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// What kind of thing a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A structure in the registry.
    Structure,
    /// A worker.
    Worker,
    /// A unit type owned by the player.
    Unit,
    /// A hero.
    Hero,
    /// A neighbor village.
    Neighbor,
    /// A pending donation request.
    DonationRequest,
    /// A tree or other obstacle.
    Tree,
    /// A clan castle reinforcement stack.
    Reinforcement,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Structure => "Structure",
            Self::Worker => "Worker",
            Self::Unit => "Unit",
            Self::Hero => "Hero",
            Self::Neighbor => "Neighbor",
            Self::DonationRequest => "Donation request",
            Self::Tree => "Tree",
            Self::Reinforcement => "Reinforcement",
        };
        f.write_str(name)
    }
}

/// Precondition failures for player commands.
///
/// None of these are fatal; the `Display` text is the player-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Not enough of a currency.
    #[error("Insufficient {resource}: need {required}, have {available}")]
    InsufficientResource {
        /// Currency that ran short.
        resource: ResourceKind,
        /// Amount required.
        required: u64,
        /// Amount available.
        available: u64,
    },

    /// Every worker already holds a task.
    #[error("No idle worker available")]
    NoIdleWorker,

    /// Lookup by id failed.
    #[error("{target} {id} not found")]
    NotFound {
        /// Kind of entity looked up.
        target: Target,
        /// Identifier that failed to resolve.
        id: u64,
    },

    /// Action is on cooldown.
    #[error("On cooldown, {remaining_secs}s remaining")]
    Cooldown {
        /// Seconds until the action becomes available.
        remaining_secs: u64,
    },

    /// Capacity (army, reinforcements, workers, obstacles) would be exceeded.
    #[error("Capacity exceeded: {used} + {requested} > {capacity}")]
    CapacityExceeded {
        /// Amount already in use.
        used: u64,
        /// Amount requested.
        requested: u64,
        /// Total capacity.
        capacity: u64,
    },

    /// Neighbor favor is below the threshold the action needs.
    #[error("Favor {current} is below the required {required}")]
    FavorTooLow {
        /// Required favor.
        required: i32,
        /// Current favor.
        current: i32,
    },

    /// Neighbor is already an ally.
    #[error("Already allied")]
    AlreadyAllied,

    /// Target is already upgrading.
    #[error("Already upgrading")]
    AlreadyUpgrading,

    /// Target is at its maximum level.
    #[error("Already at max level {max_level}")]
    MaxLevel {
        /// The level cap that was hit.
        max_level: u32,
    },

    /// Town level gate not met.
    #[error("Requires town level {required}")]
    TownLevelTooLow {
        /// Town level required.
        required: u32,
    },

    /// Donation request already fulfilled.
    #[error("Already fulfilled")]
    AlreadyFulfilled,

    /// Feature not yet available (e.g. clan castle not built).
    #[error("Locked: {0}")]
    Locked(&'static str),

    /// Argument outside the accepted range.
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),
}

impl CommandError {
    /// Shorthand for [`CommandError::NotFound`].
    #[must_use]
    pub fn not_found(target: Target, id: impl Into<u64>) -> Self {
        Self::NotFound {
            target,
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display() {
        let err = CommandError::InsufficientResource {
            resource: ResourceKind::Gold,
            required: 100,
            available: 40,
        };
        assert_eq!(err.to_string(), "Insufficient gold: need 100, have 40");

        let err = CommandError::not_found(Target::Neighbor, 7u32);
        assert_eq!(err.to_string(), "Neighbor 7 not found");

        assert_eq!(
            CommandError::Cooldown { remaining_secs: 12 }.to_string(),
            "On cooldown, 12s remaining"
        );
    }

    #[test]
    fn test_game_error_display() {
        let err = GameError::UnsupportedVersion {
            found: 9,
            supported: 2,
        };
        assert!(err.to_string().contains("version 9"));
    }
}
