use serde::Serialize;
use uuid::Uuid;

/// Unified error type for engine services.
///
/// Only `ConflictingLots` aborts a confirmation before any state is mutated;
/// per-lot failures during reconciliation are logged and surfaced through
/// the events channel instead of failing the whole pass.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Lots already committed to other confirmed orders: {}", .lots.join(", "))]
    ConflictingLots { lots: Vec<String> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Constructor for store-reported failures.
    pub fn storage_error(message: impl Into<String>) -> Self {
        ServiceError::StorageError(message.into())
    }

    pub fn not_found(entity: &str, id: Uuid) -> Self {
        ServiceError::NotFound(format!("{} {} not found", entity, id))
    }

    /// True when retrying the same call cannot succeed without user action.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            ServiceError::ConflictingLots { .. }
                | ServiceError::ValidationError(_)
                | ServiceError::InvalidOperation(_)
        )
    }
}
