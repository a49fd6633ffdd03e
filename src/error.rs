use thiserror::Error;

/// Errors surfaced at the service boundary.
///
/// Every admin or check operation resolves to one of these kinds; the API
/// layer maps them onto HTTP statuses.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("missing reference: {0}")]
    ReferenceMissing(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn exists(msg: impl Into<String>) -> Self {
        Error::AlreadyExists(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn reference(msg: impl Into<String>) -> Self {
        Error::ReferenceMissing(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
