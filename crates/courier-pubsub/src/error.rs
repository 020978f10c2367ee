//! Error types for the subscription layer.

use courier_relation::RelationError;
use thiserror::Error;

/// Pub/sub error types
#[derive(Debug, Error)]
pub enum PubSubError {
    /// Relation or binding codec failure
    #[error(transparent)]
    Relation(#[from] RelationError),

    /// The replicated multimap rejected a read or write
    #[error("Replication failed: {message}")]
    Replication {
        /// Replica-provided reason
        message: String,
    },

    /// A declaration of acknowledgement labels clashes with existing ones
    #[error("Acknowledgement labels of {subscriber} conflict: {source}")]
    AckLabelConflict {
        /// Subscriber whose declaration was refused
        subscriber: String,
        /// The violated relation rule
        source: RelationError,
    },

    /// A subscriber would exceed its topic limit
    #[error("Subscriber has {count} topics, limit is {limit}")]
    TooManyTopics {
        /// Topics after the rejected subscribe
        count: usize,
        /// Configured maximum
        limit: usize,
    },

    /// An encoded binding would exceed the replicated size limit
    #[error("Binding of {size} bytes exceeds limit of {limit}")]
    BindingTooLarge {
        /// Encoded binding length
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong
        message: String,
    },
}

impl PubSubError {
    /// Create a replication error
    pub fn replication(message: impl Into<String>) -> Self {
        Self::Replication {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Stable error code for logs and metrics
    pub fn code(&self) -> &'static str {
        match self {
            Self::Relation(inner) => inner.code(),
            Self::Replication { .. } => "pubsub.replication",
            Self::AckLabelConflict { .. } => "pubsub.ack_label_conflict",
            Self::TooManyTopics { .. } => "pubsub.too_many_topics",
            Self::BindingTooLarge { .. } => "pubsub.binding_too_large",
            Self::Config { .. } => "pubsub.config",
        }
    }
}

/// Result type for pub/sub operations
pub type Result<T> = std::result::Result<T, PubSubError>;
