//! # Errors
//!
//! Error kinds surfaced by the reconcilers.
//!
//! Every component returns the first error it encounters, annotated with the
//! operation that failed. Only two conditions are swallowed by design of the
//! callers: a connection secret that does not exist yet while harvesting, and
//! a not-found result while deleting.

use crate::composition::PatchError;
use crate::provider::ProviderError;
use crate::store::StoreError;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The provider could not be resolved or its credentials are unusable.
    /// Fatal for this tick; the next trigger retries the whole reconciliation.
    #[error("cannot connect to provider: {0}")]
    Connection(String),

    /// A referenced object does not exist
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// Ownership or identity mismatch on apply or secret write
    #[error("conflict: {0}")]
    Conflict(String),

    /// The patch at `index` could not be applied
    #[error("cannot apply the patch at index {index}: {source}")]
    Patch {
        index: usize,
        #[source]
        source: PatchError,
    },

    /// Any provider failure other than the not-found sentinel
    #[error("cannot {operation} external resource: {source}")]
    Provider {
        operation: &'static str,
        #[source]
        source: ProviderError,
    },

    /// Object store failure
    #[error("cannot {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    /// A composed template is unusable (e.g. base is not an object)
    #[error("invalid composed template: {0}")]
    InvalidTemplate(String),

    /// A managed resource spec is missing something the external API requires
    #[error("invalid managed resource: {0}")]
    InvalidResource(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a store error with the operation that produced it.
    /// Ownership conflicts detected by the store surface as `Error::Conflict`.
    pub fn store(operation: &'static str, source: StoreError) -> Self {
        match source {
            StoreError::OwnershipConflict(message) => Error::Conflict(message),
            source => Error::Store { operation, source },
        }
    }

    /// Wrap a provider error with the operation that produced it
    pub fn provider(operation: &'static str, source: ProviderError) -> Self {
        Error::Provider { operation, source }
    }

    /// True if this error means the object is gone
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Store { source, .. } => source.is_not_found(),
            Error::Provider { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True if this error is an ownership/identity conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Short machine-readable reason used in status conditions and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Connection(_) => "ConnectionError",
            Error::NotFound { .. } => "NotFound",
            Error::Conflict(_) => "ConflictError",
            Error::Patch { .. } => "PatchError",
            Error::Provider { .. } => "TransientProviderError",
            Error::Store { .. } => "StoreError",
            Error::InvalidTemplate(_) => "InvalidTemplate",
            Error::InvalidResource(_) => "InvalidResource",
            Error::Serialization(_) => "SerializationError",
        }
    }
}
