//! Error types for the grouped relation and its binding codec.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the relation and the replicated binding codec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum RelationError {
    /// Caller broke the contract of an operation
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the argument
        message: String,
    },

    /// A checked insert would break the one-group-per-value rule
    #[error("Value {value} is bound to group {existing:?}, cannot rebind to {requested:?}")]
    GroupConflict {
        /// Display form of the contested value
        value: String,
        /// Group currently recorded for the value (`None` when ungrouped)
        existing: Option<String>,
        /// Group requested by the rejected insert
        requested: Option<String>,
    },

    /// A checked insert names a group that is already bound to other values
    #[error("Group {group:?} is already bound to a different value set")]
    GroupMismatch {
        /// The group whose value set would diverge
        group: String,
    },

    /// A replicated binding string could not be decoded
    #[error("Malformed binding {binding:?}: {message}")]
    MalformedBinding {
        /// The offending binding as read from the replica
        binding: String,
        /// Parser or decoder message
        message: String,
    },

    /// Encoding a binding failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Encoder message
        message: String,
    },
}

impl RelationError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a malformed binding error
    pub fn malformed(binding: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedBinding {
            binding: binding.into(),
            message: message.into(),
        }
    }

    /// Stable error code for logs and metrics
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "relation.invalid_argument",
            Self::GroupConflict { .. } => "relation.group_conflict",
            Self::GroupMismatch { .. } => "relation.group_mismatch",
            Self::MalformedBinding { .. } => "relation.malformed_binding",
            Self::Serialization { .. } => "relation.serialization",
        }
    }
}

impl From<serde_json::Error> for RelationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type for relation operations
pub type RelationResult<T> = std::result::Result<T, RelationError>;
