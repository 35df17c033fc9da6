//! # Kubernetes Store
//!
//! Object store backed by the Kubernetes API server. Every call resolves an
//! `Api<DynamicObject>` from the key's apiVersion/kind.

use super::{ObjectStore, StoreError};
use crate::constants::FIELD_MANAGER;
use crate::resource::meta::split_api_version;
use crate::resource::ObjectKey;
use async_trait::async_trait;
use kube::{
    api::{Api, ApiResource, DeleteParams, Patch, PatchParams, PostParams},
    core::{DynamicObject, GroupVersionKind},
    Client,
};
use serde_json::json;
use std::fmt;
use tracing::debug;

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, key: &ObjectKey) -> Api<DynamicObject> {
        let (group, version) = split_api_version(&key.api_version);
        let gvk = GroupVersionKind {
            group: group.to_string(),
            version: version.to_string(),
            kind: key.kind.clone(),
        };
        let ar = ApiResource::from_gvk(&gvk);
        match &key.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }

    /// Key used to resolve the API; the name may still be empty for generateName
    fn api_key(obj: &DynamicObject) -> Result<ObjectKey, StoreError> {
        let types = obj
            .types
            .as_ref()
            .ok_or_else(|| StoreError::Invalid("object has no apiVersion/kind".to_string()))?;
        Ok(ObjectKey::new(
            types.api_version.clone(),
            types.kind.clone(),
            obj.metadata.namespace.clone(),
            obj.metadata.name.clone().unwrap_or_default(),
        ))
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject, StoreError> {
        match self.api(key).get(&key.name).await {
            Ok(obj) => Ok(obj),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = Self::api_key(obj)?;
        debug!("Creating {}", key);
        Ok(self.api(&key).create(&Self::post_params(), obj).await?)
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = Self::api_key(obj)?;
        match self.api(&key).replace(&key.name, &Self::post_params(), obj).await {
            Ok(obj) => Ok(obj),
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => {
                Err(StoreError::Conflict(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_status(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = Self::api_key(obj)?;
        let mut patch = json!({"status": obj.data.get("status").cloned().unwrap_or_default()});
        if let Some(version) = &obj.metadata.resource_version {
            patch["metadata"] = json!({"resourceVersion": version});
        }
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        match self
            .api(&key)
            .patch_status(&key.name, &params, &Patch::Merge(patch))
            .await
        {
            Ok(obj) => Ok(obj),
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => {
                Err(StoreError::Conflict(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        match self.api(key).delete(&key.name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
