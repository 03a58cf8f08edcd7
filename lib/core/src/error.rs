use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A record or row id lookup missed, or a shadow table is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    /// Missing or invalid dimensionality, malformed vector field set.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Bad search input or a vector that does not fit its column.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Operation timed out")]
    Timeout,

    /// Failure inside the shadow index storage engine.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether the error is caused by the caller's input rather than by the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::CollectionNotFound(_)
                | Error::CollectionExists(_)
                | Error::Schema(_)
                | Error::Validation(_)
                | Error::InvalidDimension { .. }
                | Error::Forbidden(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
