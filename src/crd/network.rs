//! # Network
//!
//! Managed resource for a GCP Compute VPC network.

use super::common::{ProviderReference, SecretReference};
use super::condition::{set_conditions, Condition};
use crate::resource::{Conditioned, ConnectionSecretWriter, ProviderReferencer};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// GCP VPC Network
///
/// # Example
///
/// ```yaml
/// apiVersion: compute.gcp.octopilot.io/v1alpha1
/// kind: Network
/// metadata:
///   name: my-network
///   namespace: default
/// spec:
///   providerRef:
///     name: gcp-provider
///   forProvider:
///     autoCreateSubnetworks: false
///     routingConfig:
///       routingMode: REGIONAL
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Network",
    group = "compute.gcp.octopilot.io",
    version = "v1alpha1",
    namespaced,
    status = "NetworkStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Provider that scopes this network to a project
    #[serde(default)]
    pub provider_ref: Option<ProviderReference>,
    /// Secret that receives connection details
    #[serde(default)]
    pub write_connection_secret_to_ref: Option<SecretReference>,
    /// Desired state of the external network
    #[serde(default)]
    pub for_provider: NetworkParameters,
}

/// Desired state of a GCP network
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkParameters {
    /// External name of the network
    /// Assigned by the controller when omitted
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Create one subnetwork per region automatically
    #[serde(default)]
    pub auto_create_subnetworks: Option<bool>,
    #[serde(default)]
    pub routing_config: Option<RoutingConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    /// REGIONAL or GLOBAL
    pub routing_mode: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed state of the external network
    #[serde(default)]
    pub at_provider: Option<NetworkObservation>,
}

/// Observed state of a GCP network
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkObservation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub self_link: Option<String>,
    #[serde(default)]
    pub creation_timestamp: Option<String>,
    #[serde(default)]
    pub gateway_ipv4: Option<String>,
    #[serde(default)]
    pub subnetworks: Vec<String>,
    #[serde(default)]
    pub peerings: Vec<NetworkPeering>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPeering {
    pub name: String,
    pub network: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub state_details: Option<String>,
    #[serde(default)]
    pub exchange_subnet_routes: Option<bool>,
}

impl Conditioned for Network {
    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        let status = self.status.get_or_insert_with(NetworkStatus::default);
        set_conditions(&mut status.conditions, conditions);
    }
}

impl ProviderReferencer for Network {
    fn provider_ref(&self) -> Option<&ProviderReference> {
        self.spec.provider_ref.as_ref()
    }
}

impl ConnectionSecretWriter for Network {
    fn write_connection_secret_to_ref(&self) -> Option<&SecretReference> {
        self.spec.write_connection_secret_to_ref.as_ref()
    }
}
