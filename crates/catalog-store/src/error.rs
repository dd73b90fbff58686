use thiserror::Error;

/// Errors that can occur when interacting with the catalog store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same primary key already exists.
    #[error("Duplicate {entity} with id {id}")]
    Duplicate { entity: &'static str, id: i64 },

    /// A write referenced a row that does not exist.
    #[error("Foreign key violation: {0}")]
    ForeignKey(String),

    /// A stored row could not be mapped to a model.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The store refused to commit a unit of work.
    #[error("Commit failed: {0}")]
    Commit(String),
}

/// Result type for catalog store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
