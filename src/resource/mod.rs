//! # Resource Capabilities
//!
//! The reconciliation core is generic over a small capability set rather than
//! over concrete resource types. Every managed kind implements these traits.

pub mod meta;

use crate::crd::{Condition, ProviderReference, SecretReference};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::core::DynamicObject;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// A resource that exposes status conditions
pub trait Conditioned {
    fn conditions(&self) -> &[Condition];

    /// Set conditions, replacing any existing condition of the same type
    fn set_conditions(&mut self, conditions: Vec<Condition>);
}

/// A resource that references a provider (credentials + project scope)
pub trait ProviderReferencer {
    fn provider_ref(&self) -> Option<&ProviderReference>;
}

/// A resource that may write connection details to a secret
pub trait ConnectionSecretWriter {
    fn write_connection_secret_to_ref(&self) -> Option<&SecretReference>;
}

/// A managed resource: a typed, namespaced CR bound to an external resource
pub trait Managed:
    Resource<DynamicType = ()>
    + Conditioned
    + ProviderReferencer
    + ConnectionSecretWriter
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// UID assigned by the object store
    fn owner_uid(&self) -> Option<&str> {
        self.meta().uid.as_deref()
    }
}

impl<T> Managed for T where
    T: Resource<DynamicType = ()>
        + Conditioned
        + ProviderReferencer
        + ConnectionSecretWriter
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Address of an object in the store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace,
            name: name.into(),
        }
    }

    /// Key of a core/v1 Secret
    pub fn secret(namespace: Option<String>, name: impl Into<String>) -> Self {
        Self::new("v1", "Secret", namespace, name)
    }

    /// Key of a dynamic object; `None` if it has no type information or name
    pub fn for_object(obj: &DynamicObject) -> Option<Self> {
        let types = obj.types.as_ref()?;
        let name = obj.metadata.name.clone().filter(|n| !n.is_empty())?;
        Some(Self::new(
            types.api_version.clone(),
            types.kind.clone(),
            obj.metadata.namespace.clone(),
            name,
        ))
    }

    /// Key of a typed resource
    pub fn for_resource<K: Resource<DynamicType = ()>>(obj: &K) -> Self {
        Self::new(
            K::api_version(&()).into_owned(),
            K::kind(&()).into_owned(),
            obj.meta().namespace.clone(),
            obj.meta().name.clone().unwrap_or_default(),
        )
    }

    /// Key from an object reference; `None` if the reference is incomplete
    pub fn from_reference(reference: &ObjectReference) -> Option<Self> {
        Some(Self::new(
            reference.api_version.clone()?,
            reference.kind.clone()?,
            reference.namespace.clone(),
            reference.name.clone().filter(|n| !n.is_empty())?,
        ))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} {}/{}", self.api_version, self.kind, ns, self.name),
            None => write!(f, "{}/{} {}", self.api_version, self.kind, self.name),
        }
    }
}
