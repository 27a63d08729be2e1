use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("live query failed: {0}")]
    Feed(Arc<StoreError>),
}

pub type Result<T> = std::result::Result<T, StoreError>;
