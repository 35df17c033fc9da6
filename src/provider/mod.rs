//! # Provider Adapters
//!
//! Per-resource-kind clients for a remote provider API.
//!
//! An adapter exposes the four calls the external lifecycle needs and returns
//! provider-native objects. A missing external resource is reported as
//! `ProviderError::NotFound`; every other failure is passed through.
//!
//! - `gcp` - GCP Compute networks and Service Networking connections

pub mod gcp;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The external resource does not exist (HTTP 404)
    #[error("external resource not found")]
    NotFound,

    #[error("GCP API error: {message} (code: {code}, status: {status})")]
    Api {
        code: u16,
        status: String,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("cannot decode provider response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound)
    }
}

/// Client for one kind of external resource
///
/// `project` scopes every call; `id` is the external identifier of the
/// resource within that scope.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Desired state sent on insert and patch
    type Desired: Send + Sync;
    /// Provider-native observed state
    type Observed: Send + Sync;

    async fn get(&self, project: &str, id: &str) -> Result<Self::Observed, ProviderError>;

    async fn insert(&self, project: &str, desired: &Self::Desired) -> Result<(), ProviderError>;

    async fn patch(
        &self,
        project: &str,
        id: &str,
        desired: &Self::Desired,
    ) -> Result<(), ProviderError>;

    async fn delete(&self, project: &str, id: &str) -> Result<(), ProviderError>;
}
