//! Store Errors
//!
//! Error types for account/transaction persistence.

/// Errors that can occur in the stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Optimistic concurrency conflict on an account
    #[error("Version conflict for account {account_id}: expected version {expected}")]
    VersionConflict { account_id: i64, expected: i64 },

    /// The USE being reversed was canceled by someone else first
    #[error("Transaction already marked canceled: {0}")]
    CancelConflict(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back to the domain
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Check if this error was caused by a concurrent writer
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(
            self,
            StoreError::VersionConflict { .. } | StoreError::CancelConflict(_)
        )
    }

    /// Map a sqlx error, recognising unique violations
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.message().to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
