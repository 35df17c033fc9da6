//! # Composed Resource Reconciler
//!
//! Drives one composed resource of a composite toward its template:
//!
//! 1. A composite being deleted deletes the composed resource it references
//! 2. An empty reference instantiates the template base; otherwise the
//!    referenced object is fetched
//! 3. Patches are applied in order, then the composite is stamped as controller
//! 4. The result is applied; an existing object must already be controlled by
//!    the composite
//! 5. Selected keys of the composed resource's connection secret are harvested

use super::patch::{apply_patches, Patch};
use super::template::{ComposedTemplate, ConnectionDetail};
use crate::connection::{secret_data, ConnectionDetails};
use crate::crd::SecretReference;
use crate::error::{Error, Result};
use crate::resource::meta::{add_controller_reference, as_controller, reference_to, was_deleted};
use crate::resource::ObjectKey;
use crate::store::{self, ApplyOption, ObjectStore};
use k8s_openapi::api::core::v1::{ObjectReference, Secret};
use kube::core::DynamicObject;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of reconciling one composed resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub reference: ObjectReference,
    pub connection_details: ConnectionDetails,
}

#[derive(Clone)]
pub struct ComposedReconciler {
    store: Arc<dyn ObjectStore>,
}

impl fmt::Debug for ComposedReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedReconciler").finish_non_exhaustive()
    }
}

impl ComposedReconciler {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Bring the composed resource referenced by `composed_ref` into the state
    /// described by `template`, creating it when the reference is empty.
    pub async fn reconcile(
        &self,
        cr: &DynamicObject,
        composed_ref: &ObjectReference,
        template: &ComposedTemplate,
    ) -> Result<Observation> {
        if was_deleted(&cr.metadata) {
            self.delete(cr, composed_ref).await?;
            return Ok(Observation::default());
        }

        let mut composed = if is_empty(composed_ref) {
            configure(cr, template)?
        } else {
            let key = key_for(cr, composed_ref)?;
            self.store
                .get(&key)
                .await
                .map_err(|e| Error::store("get composed resource", e))?
        };

        overlay(cr, &mut composed, &template.patches)?;

        let uid = cr.metadata.uid.clone().unwrap_or_default();
        let applied = store::apply(
            self.store.as_ref(),
            &composed,
            &[ApplyOption::MustBeControlledBy(uid)],
        )
        .await
        .map_err(|e| Error::store("apply composed resource", e))?;
        let reference = reference_to(&applied);
        debug!(
            "Applied composed resource {}",
            reference.name.as_deref().unwrap_or_default()
        );

        let connection_details = self
            .connection_details(&applied, &template.connection_details)
            .await?;

        Ok(Observation {
            reference,
            connection_details,
        })
    }

    async fn delete(&self, cr: &DynamicObject, composed_ref: &ObjectReference) -> Result<()> {
        if is_empty(composed_ref) {
            return Ok(());
        }
        let key = key_for(cr, composed_ref)?;
        match self.store.delete(&key).await {
            Ok(()) => {
                info!("🗑️  Deleted composed resource {}", key);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(Error::store("delete composed resource", e)),
        }
    }

    /// Harvest the selected keys of `composed`'s connection secret.
    ///
    /// A composed resource without a connection secret reference, or whose
    /// secret has not been published yet, yields no details.
    pub async fn connection_details(
        &self,
        composed: &DynamicObject,
        filter: &[ConnectionDetail],
    ) -> Result<ConnectionDetails> {
        let Some(secret_ref) = connection_secret_ref(composed)? else {
            return Ok(ConnectionDetails::new());
        };
        let namespace = secret_ref
            .namespace
            .or_else(|| composed.metadata.namespace.clone());
        let key = ObjectKey::secret(namespace, secret_ref.name);

        let secret: Secret = match store::get_typed(self.store.as_ref(), &key).await {
            Ok(secret) => secret,
            Err(e) if e.is_not_found() => {
                debug!("Connection secret {} is not published yet", key);
                return Ok(ConnectionDetails::new());
            }
            Err(e) => return Err(Error::store("get connection secret", e)),
        };

        Ok(filter_connection_details(&secret_data(&secret), filter))
    }
}

/// Instantiate a composed resource from the template base
pub fn configure(cr: &DynamicObject, template: &ComposedTemplate) -> Result<DynamicObject> {
    if !template.base.is_object() {
        return Err(Error::InvalidTemplate("base must be an object".to_string()));
    }
    let mut base = Value::Object(Map::new());
    json_patch::merge(&mut base, &template.base);
    if let Some(obj) = base.as_object_mut() {
        obj.entry("metadata").or_insert_with(|| Value::Object(Map::new()));
    }

    let mut composed: DynamicObject = serde_json::from_value(base)?;
    if composed.types.is_none() {
        return Err(Error::InvalidTemplate(
            "base must set apiVersion and kind".to_string(),
        ));
    }

    composed.metadata.generate_name = Some(format!(
        "{}-",
        cr.metadata.name.as_deref().unwrap_or_default()
    ));
    if composed.metadata.namespace.is_none() {
        composed.metadata.namespace = cr.metadata.namespace.clone();
    }
    Ok(composed)
}

/// Apply `patches` from the composite and stamp it as controller
pub fn overlay(cr: &DynamicObject, composed: &mut DynamicObject, patches: &[Patch]) -> Result<()> {
    let from = serde_json::to_value(cr)?;
    let mut to = serde_json::to_value(&*composed)?;
    apply_patches(patches, &from, &mut to)?;
    *composed = serde_json::from_value(to)?;

    let types = cr
        .types
        .as_ref()
        .ok_or_else(|| Error::InvalidResource("composite has no apiVersion/kind".to_string()))?;
    add_controller_reference(&mut composed.metadata, as_controller(types, &cr.metadata))
        .map_err(Error::Conflict)
}

/// Select and rename connection detail keys; keys absent from `data` are skipped
pub fn filter_connection_details(
    data: &ConnectionDetails,
    filter: &[ConnectionDetail],
) -> ConnectionDetails {
    filter
        .iter()
        .filter_map(|pair| {
            data.get(&pair.from_connection_secret_key)
                .map(|value| (pair.target_key().to_string(), value.clone()))
        })
        .collect()
}

fn is_empty(reference: &ObjectReference) -> bool {
    crate::resource::meta::is_empty_reference(reference)
}

fn key_for(cr: &DynamicObject, reference: &ObjectReference) -> Result<ObjectKey> {
    let mut key = ObjectKey::from_reference(reference).ok_or_else(|| {
        Error::InvalidResource(format!(
            "composed reference {} has no apiVersion/kind",
            reference.name.as_deref().unwrap_or_default()
        ))
    })?;
    if key.namespace.is_none() {
        key.namespace = cr.metadata.namespace.clone();
    }
    Ok(key)
}

fn connection_secret_ref(composed: &DynamicObject) -> Result<Option<SecretReference>> {
    match composed
        .data
        .get("spec")
        .and_then(|spec| spec.get("writeConnectionSecretToRef"))
    {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}
