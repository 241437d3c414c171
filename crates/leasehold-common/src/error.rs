//! Error taxonomy for lock operations
//!
//! An owner mismatch on release/extend is not an error: those operations
//! return `Ok(false)`.

/// Lock-specific error types
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Precondition violated; raised before any store call
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// Executing an atomic operation against the store failed
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LockError {
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument(message.into())
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    pub fn is_illegal_argument(&self) -> bool {
        matches!(self, Self::IllegalArgument(_))
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
