//! Error types for the balancer control-core.

use thiserror::Error;

/// Result alias used throughout the core crate.
pub type BalancerResult<T> = Result<T, BalancerError>;

/// Errors a manager or the registry can raise. See spec section 7.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BalancerError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0} already exists")]
    Duplicate(String),

    #[error("session table overflow")]
    SessionTableOverflow,

    #[error("no reals available for vs {0}")]
    NoRealsAvailable(String),

    #[error("resize already in progress")]
    ResizeInProgress,

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl BalancerError {
    /// Fast-path errors are counted in stats and never propagate to a caller.
    pub fn is_fast_path(&self) -> bool {
        matches!(
            self,
            BalancerError::SessionTableOverflow | BalancerError::NoRealsAvailable(_)
        )
    }

    /// Errors that should abort the current refresh tick loudly.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BalancerError::Internal(_))
    }
}
