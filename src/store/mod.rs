//! # Object Store
//!
//! CRUD access to the declarative object store, expressed over
//! `DynamicObject` so composites and composed children can be handled without
//! knowing their schema.
//!
//! - `kube.rs` - API server backed store (kube-rs `Api<DynamicObject>`)
//! - `memory.rs` - In-process store with optimistic concurrency, finalizers
//!   and owner-reference cascade
//!
//! On top of the raw CRUD trait this module provides `apply` (upsert with
//! ownership constraints) and `create_or_update` (find-or-create, then mutate).

mod kube;
mod memory;

pub use self::kube::KubeStore;
pub use self::memory::MemoryStore;

use crate::resource::meta::controller_of;
use crate::resource::ObjectKey;
use async_trait::async_trait;
use ::kube::core::DynamicObject;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// Optimistic concurrency failure or name collision
    #[error("conflict on {0}")]
    Conflict(String),

    /// The existing object violates an apply ownership constraint
    #[error("{0}")]
    OwnershipConflict(String),

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("Kubernetes API error: {0}")]
    Api(#[from] ::kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound(_) => true,
            StoreError::Api(::kube::Error::Api(api_err)) => api_err.code == 404,
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::Conflict(_) => true,
            StoreError::Api(::kube::Error::Api(api_err)) => api_err.code == 409,
            _ => false,
        }
    }
}

/// CRUD operations against the object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject, StoreError>;

    /// Create an object; `metadata.generateName` is honored when no name is set
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    /// Replace an object; fails with `Conflict` if `resourceVersion` is stale
    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    /// Replace only the `status` of an object
    async fn update_status(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;
}

/// Constraint checked against the existing object before `apply` updates it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOption {
    /// The existing object must already be controlled by this UID
    MustBeControlledBy(String),
    /// The existing object must be uncontrolled or controlled by this UID
    MustBeControllableBy(String),
    /// The existing object must not have a controller
    MustNotHaveOwner,
}

impl ApplyOption {
    fn check(&self, current: &DynamicObject) -> Result<(), StoreError> {
        let controller = controller_of(&current.metadata);
        let name = current.metadata.name.as_deref().unwrap_or_default();
        match (self, controller) {
            (ApplyOption::MustBeControlledBy(uid), Some(c)) if &c.uid == uid => Ok(()),
            (ApplyOption::MustBeControlledBy(uid), _) => Err(StoreError::OwnershipConflict(
                format!("existing object {name} is not controlled by UID {uid}"),
            )),
            (ApplyOption::MustBeControllableBy(uid), Some(c)) if &c.uid != uid => {
                Err(StoreError::OwnershipConflict(format!(
                    "existing object {name} is controlled by {} {} (UID {}), not UID {uid}",
                    c.kind, c.name, c.uid
                )))
            }
            (ApplyOption::MustBeControllableBy(_), _) => Ok(()),
            (ApplyOption::MustNotHaveOwner, Some(c)) => Err(StoreError::OwnershipConflict(
                format!("existing object {name} is controlled by {} {}", c.kind, c.name),
            )),
            (ApplyOption::MustNotHaveOwner, None) => Ok(()),
        }
    }
}

/// Create `desired`, or merge it onto the existing object of the same key.
///
/// Objects without a name (only `generateName`) are always created. For an
/// existing object every option is checked first; a violation leaves the
/// stored object untouched. An update is only issued when the merge changes
/// something.
pub async fn apply(
    store: &dyn ObjectStore,
    desired: &DynamicObject,
    options: &[ApplyOption],
) -> Result<DynamicObject, StoreError> {
    let Some(key) = ObjectKey::for_object(desired) else {
        return store.create(desired).await;
    };

    let current = match store.get(&key).await {
        Ok(current) => current,
        Err(e) if e.is_not_found() => return store.create(desired).await,
        Err(e) => return Err(e),
    };

    for option in options {
        option.check(&current)?;
    }

    let mut merged = serde_json::to_value(&current)?;
    json_patch::merge(&mut merged, &serde_json::to_value(desired)?);
    let mut merged: DynamicObject = serde_json::from_value(merged)?;
    merged.metadata.resource_version = current.metadata.resource_version.clone();

    if merged == current {
        debug!("Apply of {} is a no-op", key);
        return Ok(current);
    }
    store.update(&merged).await
}

/// What `create_or_update` did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Unchanged,
}

impl WriteOutcome {
    pub fn wrote(self) -> bool {
        self != WriteOutcome::Unchanged
    }
}

/// Fetch the object with `obj`'s key (creating it from `obj` if absent),
/// run `mutate` on it and persist the result if it changed.
pub async fn create_or_update<F>(
    store: &dyn ObjectStore,
    obj: DynamicObject,
    mutate: F,
) -> Result<(DynamicObject, WriteOutcome), StoreError>
where
    F: FnOnce(&mut DynamicObject) -> Result<(), StoreError> + Send,
{
    let key = ObjectKey::for_object(&obj)
        .ok_or_else(|| StoreError::Invalid("object has no type or name".to_string()))?;

    match store.get(&key).await {
        Ok(existing) => {
            let mut updated = existing.clone();
            mutate(&mut updated)?;
            if updated == existing {
                debug!("{} is up to date", key);
                return Ok((existing, WriteOutcome::Unchanged));
            }
            let updated = store.update(&updated).await?;
            Ok((updated, WriteOutcome::Updated))
        }
        Err(e) if e.is_not_found() => {
            let mut created = obj;
            mutate(&mut created)?;
            let created = store.create(&created).await?;
            Ok((created, WriteOutcome::Created))
        }
        Err(e) => Err(e),
    }
}

/// Convert a typed resource into a `DynamicObject`
pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Convert a `DynamicObject` into a typed resource
pub fn from_dynamic<K: DeserializeOwned>(obj: DynamicObject) -> Result<K, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Fetch and decode a typed resource
pub async fn get_typed<K: DeserializeOwned>(
    store: &dyn ObjectStore,
    key: &ObjectKey,
) -> Result<K, StoreError> {
    from_dynamic(store.get(key).await?)
}
