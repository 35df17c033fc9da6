//! # Provider
//!
//! A `Provider` scopes managed resources to a GCP project and points at the
//! credentials used to reach it. Without credentials the controller's own
//! Workload Identity is used.

use super::common::SecretKeySelector;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// GCP Provider
///
/// # Example
///
/// ```yaml
/// apiVersion: gcp.octopilot.io/v1alpha1
/// kind: Provider
/// metadata:
///   name: gcp-provider
///   namespace: default
/// spec:
///   projectId: my-gcp-project
///   credentialsSecretRef:
///     name: gcp-credentials
///     key: credentials.json
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Provider",
    group = "gcp.octopilot.io",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    /// GCP project ID that external resources are created in
    pub project_id: String,
    /// Secret key holding service account credentials (JSON)
    ///
    /// When omitted the controller's own Workload Identity is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret_ref: Option<SecretKeySelector>,
}
