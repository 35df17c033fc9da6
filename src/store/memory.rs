//! # In-Memory Store
//!
//! Object store kept in process memory. It follows the API server semantics
//! the reconcilers depend on:
//!
//! - `resourceVersion` is bumped on every write and checked on update
//! - `generateName` gets a random suffix on create
//! - deleting an object with finalizers only marks it deleted; it is removed
//!   once an update clears the last finalizer
//! - removing an object deletes every object it controls or owns
//! - `update` never touches `status`, `update_status` touches nothing else

use super::{ObjectStore, StoreError};
use crate::resource::ObjectKey;
use async_trait::async_trait;
use kube::core::DynamicObject;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<ObjectKey, DynamicObject>>,
    version: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored object
    pub fn objects(&self) -> Vec<DynamicObject> {
        self.lock().values().cloned().collect()
    }

    /// Snapshot of every stored object of one kind
    pub fn objects_of_kind(&self, kind: &str) -> Vec<DynamicObject> {
        self.lock()
            .iter()
            .filter(|(k, _)| k.kind == kind)
            .map(|(_, o)| o.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ObjectKey, DynamicObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn key_of(obj: &DynamicObject) -> Result<ObjectKey, StoreError> {
        ObjectKey::for_object(obj)
            .ok_or_else(|| StoreError::Invalid("object has no type or name".to_string()))
    }

    fn check_version(key: &ObjectKey, obj: &DynamicObject, stored: &DynamicObject) -> Result<(), StoreError> {
        match &obj.metadata.resource_version {
            Some(v) if Some(v) != stored.metadata.resource_version.as_ref() => {
                Err(StoreError::Conflict(format!(
                    "{key}: resourceVersion {v} is stale"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Mark an object deleted, or remove it when nothing holds it back
    fn delete_locked(
        &self,
        objects: &mut BTreeMap<ObjectKey, DynamicObject>,
        key: &ObjectKey,
    ) -> Result<(), StoreError> {
        let Some(stored) = objects.get_mut(key) else {
            return Err(StoreError::NotFound(key.to_string()));
        };

        if stored.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty()) {
            if stored.metadata.deletion_timestamp.is_none() {
                mark_deleted(stored)?;
                stored.metadata.resource_version = Some(self.next_version());
                debug!("Marked {} for deletion", key);
            }
            return Ok(());
        }

        self.remove_locked(objects, key);
        Ok(())
    }

    fn remove_locked(&self, objects: &mut BTreeMap<ObjectKey, DynamicObject>, key: &ObjectKey) {
        let Some(removed) = objects.remove(key) else {
            return;
        };
        debug!("Removed {}", key);

        let Some(uid) = removed.metadata.uid else {
            return;
        };
        let dependents: Vec<ObjectKey> = objects
            .iter()
            .filter(|(_, o)| {
                o.metadata
                    .owner_references
                    .as_ref()
                    .is_some_and(|refs| refs.iter().any(|r| r.uid == uid))
            })
            .map(|(k, _)| k.clone())
            .collect();
        for dependent in dependents {
            // Already gone dependents are not an error for garbage collection
            let _ = self.delete_locked(objects, &dependent);
        }
    }
}

/// Set `metadata.deletionTimestamp` to now
fn mark_deleted(obj: &mut DynamicObject) -> Result<(), StoreError> {
    let mut meta = serde_json::to_value(&obj.metadata)?;
    meta["deletionTimestamp"] = serde_json::Value::String(
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    );
    obj.metadata = serde_json::from_value(meta)?;
    Ok(())
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject, StoreError> {
        self.lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let mut obj = obj.clone();
        if obj.metadata.name.as_deref().unwrap_or_default().is_empty() {
            let prefix = obj
                .metadata
                .generate_name
                .clone()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| StoreError::Invalid("name or generateName is required".to_string()))?;
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            obj.metadata.name = Some(format!("{prefix}{}", &suffix[..5]));
        }
        let key = Self::key_of(&obj)?;

        let mut objects = self.lock();
        if objects.contains_key(&key) {
            return Err(StoreError::Conflict(format!("{key} already exists")));
        }
        obj.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        obj.metadata.resource_version = Some(self.next_version());
        obj.metadata.deletion_timestamp = None;
        objects.insert(key.clone(), obj.clone());
        debug!("Created {}", key);
        Ok(obj)
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = Self::key_of(obj)?;
        let mut objects = self.lock();
        let stored = objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Self::check_version(&key, obj, stored)?;

        let mut updated = obj.clone();
        updated.metadata.uid = stored.metadata.uid.clone();
        updated.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        match stored.data.get("status") {
            Some(status) => updated.data["status"] = status.clone(),
            None => {
                if let Some(data) = updated.data.as_object_mut() {
                    data.remove("status");
                }
            }
        }
        updated.metadata.resource_version = Some(self.next_version());

        let released = updated.metadata.deletion_timestamp.is_some()
            && updated.metadata.finalizers.as_ref().is_none_or(|f| f.is_empty());
        objects.insert(key.clone(), updated.clone());
        if released {
            self.remove_locked(&mut objects, &key);
        }
        Ok(updated)
    }

    async fn update_status(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = Self::key_of(obj)?;
        let mut objects = self.lock();
        let version = self.next_version();
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Self::check_version(&key, obj, stored)?;

        stored.data["status"] = obj.data.get("status").cloned().unwrap_or_default();
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let mut objects = self.lock();
        self.delete_locked(&mut objects, key)
    }
}
