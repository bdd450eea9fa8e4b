use parley_types::api::{ErrorBody, ErrorKind};
use thiserror::Error;

pub type Result<T, E = ChatError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Wire form of this error. Storage details are replaced with a generic
    /// message; log the original before converting.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            Self::Storage(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            kind: self.kind(),
            message,
        }
    }
}
