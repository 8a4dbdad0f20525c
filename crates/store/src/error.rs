use common::VariantId;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row the operation depends on does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A conditional stock decrement found fewer units than requested.
    #[error(
        "Insufficient stock for variant {variant_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        variant_id: VariantId,
        requested: u32,
        available: u32,
    },

    /// A guarded write lost a race against a concurrent writer.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored value could not be decoded into its domain type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// SQLSTATE codes Postgres uses when it aborts one side of a lock race.
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let lost_race = match &err {
            sqlx::Error::Database(db) => matches!(
                db.code().as_deref(),
                Some(DEADLOCK_DETECTED | SERIALIZATION_FAILURE)
            ),
            _ => false,
        };

        if lost_race {
            StoreError::Conflict(format!("transaction aborted by a concurrent writer: {err}"))
        } else {
            StoreError::Database(err)
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
