use potluck_common::UnknownReaction;
use potluck_store::StoreError;

/// Outcomes returned to the immediate caller. Nothing here is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl Error {
    /// User-facing outcomes. Only store failures are worth an operator's attention.
    pub fn is_expected(&self) -> bool {
        !matches!(self, Error::Store(_))
    }
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(path) => Error::NotFound(path),
            other => Error::Store(other),
        }
    }
}

impl From<UnknownReaction> for Error {
    fn from(error: UnknownReaction) -> Self {
        Error::InvalidOperation(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
