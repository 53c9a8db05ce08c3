use dw_core::DomainError;
use dw_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no demand with id '{0}'")]
    UnknownDemand(String),
    #[error("no client named '{0}'")]
    UnknownClient(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The in-memory change was applied but the durable write failed.
    #[error("changes may not have saved: {0}")]
    NotPersisted(#[source] StoreError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Outcome of a mutating command.
///
/// The in-memory state already reflects the change. `persist_error` is set
/// when the store rejected the write; the working copy is not rolled back.
#[derive(Debug)]
#[must_use = "a failed durable write is only reported through `persist_error`"]
pub struct Applied<T> {
    pub value: T,
    pub persist_error: Option<StoreError>,
}

impl<T> Applied<T> {
    pub(crate) fn new(value: T, persist_error: Option<StoreError>) -> Self {
        Self {
            value,
            persist_error,
        }
    }

    /// A change that needed no write (the state was already as requested).
    pub(crate) fn unchanged(value: T) -> Self {
        Self::new(value, None)
    }

    pub fn is_persisted(&self) -> bool {
        self.persist_error.is_none()
    }

    /// Treat a failed write as an error.
    pub fn into_result(self) -> SessionResult<T> {
        match self.persist_error {
            None => Ok(self.value),
            Some(err) => Err(SessionError::NotPersisted(err)),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Applied<U> {
        Applied {
            value: f(self.value),
            persist_error: self.persist_error,
        }
    }
}
