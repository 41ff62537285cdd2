use thiserror::Error;

/// Errors that can occur when interacting with the order and payment stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A record with the same key already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// A compare-and-set found a different status than expected.
    /// Another writer changed the record first.
    #[error("Status conflict for {entity} {id}: expected {expected}, found {actual}")]
    StatusConflict {
        entity: &'static str,
        id: String,
        expected: String,
        actual: String,
    },

    /// A stored value could not be mapped back to the domain.
    #[error("Corrupt row for {entity} {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: String,
        reason: String,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if the error is a lost compare-and-set race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::StatusConflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
