//! # Connection
//!
//! Managed resource for a Service Networking private services connection,
//! which peers a VPC network with a Google-managed service producer network.

use super::common::{ProviderReference, SecretReference};
use super::condition::{set_conditions, Condition};
use crate::resource::{Conditioned, ConnectionSecretWriter, ProviderReferencer};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Service producer that owns every private services connection
pub const SERVICE_NETWORKING_PARENT: &str = "services/servicenetworking.googleapis.com";

/// Service Networking Connection
///
/// # Example
///
/// ```yaml
/// apiVersion: servicenetworking.gcp.octopilot.io/v1alpha1
/// kind: Connection
/// metadata:
///   name: my-connection
///   namespace: default
/// spec:
///   providerRef:
///     name: gcp-provider
///   forProvider:
///     network: projects/my-gcp-project/global/networks/my-network
///     reservedPeeringRanges:
///       - my-reserved-range
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Connection",
    group = "servicenetworking.gcp.octopilot.io",
    version = "v1alpha1",
    namespaced,
    status = "ConnectionStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Peering", "type":"string", "jsonPath":".status.atProvider.peering"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSpec {
    #[serde(default)]
    pub provider_ref: Option<ProviderReference>,
    #[serde(default)]
    pub write_connection_secret_to_ref: Option<SecretReference>,
    #[serde(default)]
    pub for_provider: ConnectionParameters,
}

/// Desired state of a private services connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParameters {
    /// Service producer, e.g. `services/servicenetworking.googleapis.com`
    #[serde(default = "default_parent")]
    pub parent: String,
    /// Consumer network, `projects/{project}/global/networks/{name}`
    #[serde(default)]
    pub network: String,
    /// Names of allocated IP ranges reserved for the service producer
    #[serde(default)]
    pub reserved_peering_ranges: Vec<String>,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            parent: default_parent(),
            network: String::new(),
            reserved_peering_ranges: Vec::new(),
        }
    }
}

fn default_parent() -> String {
    SERVICE_NETWORKING_PARENT.to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub at_provider: Option<ConnectionObservation>,
}

/// Observed state of a private services connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionObservation {
    /// Name of the VPC peering created for this connection
    #[serde(default)]
    pub peering: Option<String>,
    /// Service producer of this connection
    #[serde(default)]
    pub service: Option<String>,
}

impl Conditioned for Connection {
    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        let status = self.status.get_or_insert_with(ConnectionStatus::default);
        set_conditions(&mut status.conditions, conditions);
    }
}

impl ProviderReferencer for Connection {
    fn provider_ref(&self) -> Option<&ProviderReference> {
        self.spec.provider_ref.as_ref()
    }
}

impl ConnectionSecretWriter for Connection {
    fn write_connection_secret_to_ref(&self) -> Option<&SecretReference> {
        self.spec.write_connection_secret_to_ref.as_ref()
    }
}
