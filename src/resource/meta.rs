//! # Object Metadata Helpers
//!
//! Owner references, finalizers and object references.

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::core::{DynamicObject, TypeMeta};

/// Returns the controller owner reference of an object, if any
pub fn controller_of(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true))
}

/// True if the object is controlled by the owner with the supplied UID
pub fn is_controlled_by(meta: &ObjectMeta, uid: &str) -> bool {
    controller_of(meta).is_some_and(|c| c.uid == uid)
}

/// Build a controller owner reference pointing at `owner`
pub fn as_controller(types: &TypeMeta, owner: &ObjectMeta) -> OwnerReference {
    OwnerReference {
        api_version: types.api_version.clone(),
        kind: types.kind.clone(),
        name: owner.name.clone().unwrap_or_default(),
        uid: owner.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Add `owner` as the controller of `meta`
///
/// Fails if the object is already controlled by a different owner. An existing
/// reference to the same owner is replaced rather than duplicated.
pub fn add_controller_reference(meta: &mut ObjectMeta, owner: OwnerReference) -> Result<(), String> {
    if let Some(existing) = controller_of(meta) {
        if existing.uid != owner.uid {
            return Err(format!(
                "object is already controlled by {} {} (uid {})",
                existing.kind, existing.name, existing.uid
            ));
        }
    }

    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    refs.retain(|r| r.uid != owner.uid);
    refs.push(owner);
    Ok(())
}

/// True if deletion of the object has been requested
pub fn was_deleted(meta: &ObjectMeta) -> bool {
    meta.deletion_timestamp.is_some()
}

pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Add a finalizer; returns true if the metadata changed
pub fn add_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    if has_finalizer(meta, finalizer) {
        return false;
    }
    meta.finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    true
}

/// Remove a finalizer; returns true if the metadata changed
pub fn remove_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    before != finalizers.len()
}

/// Build an object reference to a dynamic object
pub fn reference_to(obj: &DynamicObject) -> ObjectReference {
    ObjectReference {
        api_version: obj.types.as_ref().map(|t| t.api_version.clone()),
        kind: obj.types.as_ref().map(|t| t.kind.clone()),
        name: obj.metadata.name.clone(),
        namespace: obj.metadata.namespace.clone(),
        uid: obj.metadata.uid.clone(),
        resource_version: obj.metadata.resource_version.clone(),
        field_path: None,
    }
}

/// True if the reference does not point at anything yet
pub fn is_empty_reference(reference: &ObjectReference) -> bool {
    reference.name.as_deref().unwrap_or_default().is_empty()
}

/// Split an `apiVersion` into group and version
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}
