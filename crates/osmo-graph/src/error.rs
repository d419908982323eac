//! Error taxonomy shared across the osmo workspace

use thiserror::Error;

/// Errors raised by graph operations and the membrane layers built on them
#[derive(Debug, Error)]
pub enum GraphError {
    /// Registry invariant violated: two domains claim inconsistent
    /// representations of the same value
    #[error("IdentityConflict: {0}")]
    IdentityConflict(String),

    /// A trap's observable result contradicts the shadow target's
    /// structural state
    #[error("InvariantViolation: {0}")]
    InvariantViolation(String),

    /// A populate/seal callback failed; the construction queue was discarded
    #[error("ConstructionFailure: {0}")]
    ConstructionFailure(#[source] Box<GraphError>),

    /// Operation attempted on a revoked wrapper
    #[error("RevocationError: cannot perform '{0}' on a revoked wrapper")]
    Revoked(String),

    /// Structural misuse (e.g., a property operation on a primitive)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// A membrane operation named a domain that was never registered
    #[error("unknown domain '{0}'")]
    UnknownDomain(String),
}

impl GraphError {
    /// Shorthand for a `TypeError`
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Shorthand for an `InvariantViolation`
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Shorthand for an `IdentityConflict`
    pub fn identity_conflict(msg: impl Into<String>) -> Self {
        Self::IdentityConflict(msg.into())
    }
}

/// Result alias used throughout the workspace
pub type GraphResult<T> = Result<T, GraphError>;
