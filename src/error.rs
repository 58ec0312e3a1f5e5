use sled::transaction::TransactionError;

/// Coarse classification of a [`MarketError`], for callers that map failures
/// onto transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidOperation,
    Conflict,
    Validation,
    Unauthenticated,
    Internal,
}

#[derive(thiserror::Error, Debug)]
pub enum MarketError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("no authenticated user")]
    Unauthenticated,
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type MarketResult<T> = Result<T, MarketError>;

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::NotFound(_) => ErrorKind::NotFound,
            MarketError::Forbidden(_) => ErrorKind::Forbidden,
            MarketError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            MarketError::Conflict(_) => ErrorKind::Conflict,
            MarketError::Validation(_) => ErrorKind::Validation,
            MarketError::Unauthenticated => ErrorKind::Unauthenticated,
            MarketError::Storage(_)
            | MarketError::Encode(_)
            | MarketError::Decode(_)
            | MarketError::Other(_) => ErrorKind::Internal,
        }
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for MarketError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        MarketError::Encode(value.to_string())
    }
}

// An aborted transaction carries the domain error that aborted it.
impl From<TransactionError<MarketError>> for MarketError {
    fn from(value: TransactionError<MarketError>) -> Self {
        match value {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => MarketError::Storage(err),
        }
    }
}
