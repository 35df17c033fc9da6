//! # Shared Spec Types
//!
//! References shared by every managed resource kind.

use serde::{Deserialize, Serialize};

/// Reference to a `Provider` resource holding project scope and credentials
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderReference {
    /// Name of the Provider
    pub name: String,
    /// Namespace of the Provider
    /// Defaults to the namespace of the referencing resource
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Reference to a Secret that receives connection details
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the Secret
    pub name: String,
    /// Namespace of the Secret
    /// Defaults to the namespace of the writing resource
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Reference to one key of a Secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    /// Name of the Secret
    pub name: String,
    /// Namespace of the Secret
    #[serde(default)]
    pub namespace: Option<String>,
    /// Key within the Secret
    #[serde(default = "default_credentials_key")]
    pub key: String,
}

fn default_credentials_key() -> String {
    "credentials.json".to_string()
}

/// Schema for free-form JSON objects carried through the API server untouched
pub fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
