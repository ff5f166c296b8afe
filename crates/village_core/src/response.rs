//! The `{success, message, ...}` envelope commands answer the UI with.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{CommandResult, GameError, Result};

/// A command outcome in UI form.
///
/// Object outcomes are merged into the envelope; anything else lands under
/// `"value"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    /// Whether the command succeeded.
    pub success: bool,
    /// Player-facing message.
    pub message: String,
    /// Outcome fields.
    #[serde(flatten)]
    pub outcome: Map<String, Value>,
}

impl CommandResponse {
    /// A success carrying `outcome`.
    #[must_use]
    pub fn ok<T: Serialize>(message: impl Into<String>, outcome: &T) -> Self {
        let outcome = match serde_json::to_value(outcome) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => Map::new(),
            Ok(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
            Err(e) => {
                tracing::warn!(error = %e, "Command outcome could not be encoded");
                Map::new()
            }
        };
        Self {
            success: true,
            message: message.into(),
            outcome,
        }
    }

    /// A failure with `message`.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            outcome: Map::new(),
        }
    }

    /// Convert a command result. Failures use the error's display text.
    #[must_use]
    pub fn from_result<T: Serialize>(result: &CommandResult<T>, success_message: &str) -> Self {
        match result {
            Ok(outcome) => Self::ok(success_message, outcome),
            Err(e) => Self::failure(e.to_string()),
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
}
