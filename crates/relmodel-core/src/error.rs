//! Error types for RelModel.
//!
//! Configuration, usage, transport and transaction faults are surfaced as
//! [`Error`]. Data faults (a value failing coercion or a required check) are
//! never raised here; they accumulate in a [`ValidationLog`](crate::ValidationLog).

use crate::dialect::Dialect;
use thiserror::Error as ThisError;

/// The primary error type for all RelModel operations.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Malformed configuration or override document, or an inconsistent model.
    #[error("configuration error: {0}")]
    Config(String),

    /// An entity name that does not exist in the model.
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    /// A field reference that does not resolve against the model.
    #[error("unknown field '{field}' in entity '{entity}'")]
    UnknownField { entity: String, field: String },

    /// A relation id that does not exist for the entity.
    #[error("unknown relation '{relation}' in entity '{entity}'")]
    UnknownRelation { entity: String, relation: String },

    /// A statement references a parameter with no bound value.
    #[error("missing value for parameter '{0}'")]
    MissingParameter(String),

    /// A value store field was read before being set.
    #[error("value for field '{field}' of entity '{entity}' is undefined")]
    UndefinedValue { entity: String, field: String },

    /// Any other caller bug (e.g. committing without a transaction).
    #[error("usage error: {0}")]
    Usage(String),

    /// Failure reported by the underlying database driver.
    #[error("{dialect} transport error{}: {message}", entity_suffix(.entity))]
    Transport {
        dialect: Dialect,
        entity: Option<String>,
        message: String,
    },

    /// A batch failed and was rolled back.
    #[error("transaction rolled back after statement {statement}: {source}")]
    Transaction {
        statement: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn entity_suffix(entity: &Option<String>) -> String {
    entity
        .as_deref()
        .map(|e| format!(" on '{e}'"))
        .unwrap_or_default()
}

impl Error {
    /// Build a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a usage error.
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Build a transport error without entity context.
    pub fn transport(dialect: Dialect, message: impl Into<String>) -> Self {
        Self::Transport {
            dialect,
            entity: None,
            message: message.into(),
        }
    }

    /// Build an unknown-field error.
    pub fn unknown_field(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            entity: entity.into(),
            field: field.into(),
        }
    }

    /// Attach an entity name to a transport error that has none.
    pub fn with_entity(self, name: &str) -> Self {
        match self {
            Self::Transport {
                dialect,
                entity: None,
                message,
            } => Self::Transport {
                dialect,
                entity: Some(name.to_string()),
                message,
            },
            other => other,
        }
    }

    /// Caller bugs: undefined fields, parameters or values.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::UnknownEntity(_)
                | Self::UnknownField { .. }
                | Self::UnknownRelation { .. }
                | Self::MissingParameter(_)
                | Self::UndefinedValue { .. }
                | Self::Usage(_)
        )
    }

    /// Driver failures, including the cause of a rolled back batch.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Transaction { source, .. } => source.is_transport(),
            _ => false,
        }
    }
}

/// Result type alias for RelModel operations.
pub type Result<T> = std::result::Result<T, Error>;
