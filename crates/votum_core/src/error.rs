use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store lock poisoned")]
    Poisoned,

    #[error("store transaction rolled back")]
    Aborted,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("measure {0} not found")]
    NotFound(String),

    #[error("remote backend unreachable: {0}")]
    Unreachable(String),

    #[error("remote request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response from remote backend: {0}")]
    InvalidResponse(String),

    #[error("operation not supported by the {0} backend")]
    Unsupported(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl BackendError {
    /// Remote trouble the caller can ride out on cached or local data.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Unreachable(_)
                | BackendError::RequestFailed(_)
                | BackendError::InvalidResponse(_)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("external document has no id")]
    MissingId,

    #[error("external document {id} has an unparseable date: {value}")]
    InvalidDate { id: String, value: String },
}

/// Field-level rejection of user input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}
