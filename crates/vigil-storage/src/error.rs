/// Errors surfaced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found.
    #[error("storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint was violated (duplicate monitor name).
    #[error("storage: {entity} already exists (name={name})")]
    Conflict { entity: &'static str, name: String },

    /// The caller handed over a row that cannot be persisted as-is.
    #[error("storage: validation failed: {0}")]
    Validation(String),

    /// An underlying SQLite error.
    #[error("storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON (de)serialization failure on a JSON column.
    #[error("storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything not covered by the variants above.
    #[error("storage: {0}")]
    Other(String),
}

impl StorageError {
    /// True when the error should map to a 404 at the API boundary.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Convenience alias used throughout the storage crate and its callers.
pub type Result<T> = std::result::Result<T, StorageError>;
