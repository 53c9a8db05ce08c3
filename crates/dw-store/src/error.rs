use dw_core::DomainError;

/// Errors raised by the persistent store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The base schema could not be created; the store is unusable.
    #[error("schema initialization failed: {0}")]
    Schema(#[source] rusqlite::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// A stored value could not be decoded into a domain type.
    #[error("corrupt {what}: {reason}")]
    Corrupt { what: String, reason: String },
    #[error("duplicate {kind} '{key}' in replacement list")]
    Duplicate { kind: &'static str, key: String },
    #[error("week '{0}' is the current week and cannot be dropped")]
    CurrentWeekMissing(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("background task failed: {0}")]
    Join(String),
}

impl StoreError {
    pub(crate) fn corrupt(what: impl Into<String>, reason: impl ToString) -> Self {
        StoreError::Corrupt {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
