//! # Composed Templates
//!
//! A template describes one composed resource: a base object, the patches
//! that copy composite values into it and the connection secret keys exposed
//! to the composite.

use super::patch::Patch;
use crate::crd::preserve_unknown_fields;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComposedTemplate {
    /// Object the composed resource starts from
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub base: serde_json::Value,
    #[serde(default)]
    pub patches: Vec<Patch>,
    /// Keys of the composed resource's connection secret exposed to the composite
    #[serde(default)]
    pub connection_details: Vec<ConnectionDetail>,
}

/// Selects one key of a composed resource's connection secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetail {
    /// Key in the composed resource's connection secret
    pub from_connection_secret_key: String,
    /// Key under which the value is exposed; defaults to the source key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ConnectionDetail {
    pub fn target_key(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.from_connection_secret_key)
    }
}
