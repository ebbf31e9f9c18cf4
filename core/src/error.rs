use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("A scan is already in progress")]
    ScanInProgress,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type DetectResult<T> = Result<T, DetectError>;
