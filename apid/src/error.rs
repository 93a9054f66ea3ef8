use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] pool_store::StoreError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External API error: {0}")]
    Api(String),

    #[error("Fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Fatal errors terminate the process instead of degrading to cached
    /// values (e.g. an empty user directory on the very first run).
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Fatal(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
