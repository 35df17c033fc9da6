//! # Composite
//!
//! A `Composite` declares a set of composed resource templates. The composite
//! controller instantiates each template as a child object owned by the
//! composite and aggregates the children's connection details into one secret.

use super::common::{preserve_unknown_fields, SecretReference};
use super::condition::{set_conditions, Condition};
use crate::composition::ComposedTemplate;
use crate::resource::{Conditioned, ConnectionSecretWriter};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Composite resource
///
/// # Example
///
/// ```yaml
/// apiVersion: compose.octopilot.io/v1alpha1
/// kind: Composite
/// metadata:
///   name: private-network
///   namespace: default
/// spec:
///   parameters:
///     region: europe-west1
///   writeConnectionSecretToRef:
///     name: private-network-conn
///   resources:
///     - base:
///         apiVersion: compute.gcp.octopilot.io/v1alpha1
///         kind: Network
///         spec:
///           providerRef:
///             name: gcp-provider
///       patches:
///         - fromFieldPath: metadata.labels
///       connectionDetails:
///         - fromConnectionSecretKey: networkName
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Composite",
    group = "compose.octopilot.io",
    version = "v1alpha1",
    namespaced,
    status = "CompositeStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CompositeSpec {
    /// Free-form values that patches copy into composed resources
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub parameters: serde_json::Value,
    /// Templates for the composed resources
    #[serde(default)]
    pub resources: Vec<ComposedTemplate>,
    /// References to the composed resources, one per template (by index)
    #[serde(default)]
    pub resource_refs: Vec<ComposedReference>,
    /// Secret that receives the aggregated connection details
    #[serde(default)]
    pub write_connection_secret_to_ref: Option<SecretReference>,
}

/// Reference to a composed resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComposedReference {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
}

impl ComposedReference {
    pub fn is_empty(&self) -> bool {
        self.name.as_deref().unwrap_or_default().is_empty()
    }
}

impl From<&ComposedReference> for ObjectReference {
    fn from(r: &ComposedReference) -> Self {
        ObjectReference {
            api_version: r.api_version.clone(),
            kind: r.kind.clone(),
            name: r.name.clone(),
            namespace: r.namespace.clone(),
            uid: r.uid.clone(),
            ..Default::default()
        }
    }
}

impl From<ObjectReference> for ComposedReference {
    fn from(r: ObjectReference) -> Self {
        ComposedReference {
            api_version: r.api_version,
            kind: r.kind,
            name: r.name,
            namespace: r.namespace,
            uid: r.uid,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompositeStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Number of composed resources that reported Ready=True
    #[serde(default)]
    pub ready_resources: usize,
}

impl Conditioned for Composite {
    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        let status = self.status.get_or_insert_with(CompositeStatus::default);
        set_conditions(&mut status.conditions, conditions);
    }
}

impl ConnectionSecretWriter for Composite {
    fn write_connection_secret_to_ref(&self) -> Option<&SecretReference> {
        self.spec.write_connection_secret_to_ref.as_ref()
    }
}
