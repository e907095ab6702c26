//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache operations.
///
/// `EmptyKey`, `NotFound` and `Expired` are ordinary outcomes of a lookup and
/// are meant to be matched on by callers.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The empty string was supplied as a key
    #[error("Empty key")]
    EmptyKey,

    /// Key not present in the cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key present but past its expiration time
    #[error("Key expired: {0}")]
    Expired(String),

    /// A background sweep was requested outside of a Tokio runtime
    #[error("Background sweep needs a Tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

impl CacheError {
    /// Returns true for the `NotFound` outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }

    /// Returns true for the `Expired` outcome.
    pub fn is_expired(&self) -> bool {
        matches!(self, CacheError::Expired(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
