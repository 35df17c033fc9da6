//! # Composite Reconciler
//!
//! One reconciliation tick for a `Composite`:
//!
//! - every template is reconciled through the `ComposedReconciler`; a
//!   reference is recorded (and persisted at once) only where the slot was
//!   empty, so a retried tick never instantiates a second child
//! - connection details harvested from the children are merged and
//!   published through the publisher chain
//! - `Ready` is `Available` once every composed resource reports Ready=True
//!
//! On deletion the children are deleted, then the connection secret, then the
//! finalizer is released.

use crate::composition::ComposedReconciler;
use crate::connection::{ConnectionDetails, ConnectionPublisher, ConnectionSecretOwner};
use crate::constants::COMPOSITE_FINALIZER;
use crate::crd::{get_condition, ComposedReference, Composite, Condition, TYPE_READY};
use crate::error::{Error, Result};
use crate::managed::ReconcileTiming;
use crate::observability::metrics;
use crate::resource::meta::{add_finalizer, has_finalizer, remove_finalizer, was_deleted};
use crate::resource::{Conditioned, ObjectKey};
use crate::store::{self, ObjectStore};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Resource;
use kube_runtime::controller::Action;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Readiness of one composed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Ready,
    /// Not observed yet, or still being created
    Pending,
    NotReady,
}

impl Readiness {
    fn of(condition: Option<&Condition>) -> Self {
        match condition {
            Some(c) if c.status == "True" => Readiness::Ready,
            None => Readiness::Pending,
            Some(c) if c.reason.as_deref() == Some("Creating") => Readiness::Pending,
            Some(_) => Readiness::NotReady,
        }
    }
}

pub struct CompositeReconciler {
    store: Arc<dyn ObjectStore>,
    composed: ComposedReconciler,
    publisher: Arc<dyn ConnectionPublisher>,
    timing: ReconcileTiming,
}

impl fmt::Debug for CompositeReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeReconciler")
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl CompositeReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        publisher: Arc<dyn ConnectionPublisher>,
        timing: ReconcileTiming,
    ) -> Self {
        Self {
            composed: ComposedReconciler::new(Arc::clone(&store)),
            store,
            publisher,
            timing,
        }
    }

    pub async fn reconcile_key(&self, key: &ObjectKey) -> Result<Action> {
        match store::get_typed::<Composite>(self.store.as_ref(), key).await {
            Ok(xr) => self.reconcile(xr).await,
            Err(e) if e.is_not_found() => {
                debug!("{} no longer exists", key);
                Ok(Action::await_change())
            }
            Err(e) => Err(Error::store("get composite", e)),
        }
    }

    pub async fn reconcile(&self, mut xr: Composite) -> Result<Action> {
        let kind = Composite::kind(&());
        let span = info_span!(
            "reconcile",
            resource.kind = %kind,
            resource.name = xr.meta().name.as_deref().unwrap_or_default(),
            resource.namespace = xr.meta().namespace.as_deref().unwrap_or_default(),
        );

        metrics::increment_reconciliations(&kind);
        let start = Instant::now();

        let result = self.tick(&mut xr).instrument(span.clone()).await;
        metrics::observe_reconciliation_duration(&kind, start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            metrics::increment_reconciliation_errors(&kind, e.reason());
            async {
                warn!(
                    "Reconciliation of composite {} failed: {}",
                    xr.meta().name.as_deref().unwrap_or_default(),
                    e
                );
                xr.set_conditions(vec![Condition::reconcile_error(e)]);
                if let Err(e) = self.persist_status(&mut xr).await {
                    debug!("Cannot record reconcile error: {}", e);
                }
            }
            .instrument(span)
            .await;
        }
        result
    }

    async fn tick(&self, xr: &mut Composite) -> Result<Action> {
        let deleting = was_deleted(xr.meta());

        if deleting && !has_finalizer(xr.meta(), COMPOSITE_FINALIZER) {
            return Ok(Action::await_change());
        }
        if !deleting && add_finalizer(xr.meta_mut(), COMPOSITE_FINALIZER) {
            self.persist(xr).await?;
        }

        let owner = ConnectionSecretOwner::for_resource(&*xr);
        let templates = xr.spec.resources.clone();
        let mut refs = xr.spec.resource_refs.clone();
        refs.resize(refs.len().max(templates.len()), ComposedReference::default());

        if deleting {
            let cr = store::to_dynamic(&*xr).map_err(|e| Error::store("encode composite", e))?;
            for (template, composed_ref) in templates.iter().zip(&refs) {
                self.composed
                    .reconcile(&cr, &ObjectReference::from(composed_ref), template)
                    .await?;
            }
            self.publisher.delete_connection(&owner).await?;
            if remove_finalizer(xr.meta_mut(), COMPOSITE_FINALIZER) {
                self.persist(xr).await?;
            }
            info!(
                "🗑️  Deleted composite {} and its composed resources",
                xr.meta().name.as_deref().unwrap_or_default()
            );
            return Ok(Action::await_change());
        }

        let mut details = ConnectionDetails::new();
        let mut ready = 0;
        let mut unavailable = false;
        for (i, template) in templates.iter().enumerate() {
            let cr = store::to_dynamic(&*xr).map_err(|e| Error::store("encode composite", e))?;
            let composed_ref = ObjectReference::from(&refs[i]);
            let observation = self.composed.reconcile(&cr, &composed_ref, template).await?;

            if refs[i].is_empty() {
                refs[i] = ComposedReference::from(observation.reference.clone());
                xr.spec.resource_refs = refs.clone();
                self.persist(xr).await?;
                info!(
                    "✅ Composed {} {}",
                    refs[i].kind.as_deref().unwrap_or_default(),
                    refs[i].name.as_deref().unwrap_or_default()
                );
            }

            match self.readiness(&cr, &observation.reference).await? {
                Readiness::Ready => ready += 1,
                Readiness::Pending => {}
                Readiness::NotReady => unavailable = true,
            }
            details.extend(observation.connection_details);
        }
        metrics::increment_composed_resources_applied(templates.len());

        self.publisher.apply_connection(&owner, &details).await?;

        let status = xr.status.get_or_insert_with(Default::default);
        status.ready_resources = ready;
        let availability = if ready == templates.len() {
            Condition::available()
        } else if unavailable {
            Condition::unavailable()
        } else {
            Condition::creating()
        };
        xr.set_conditions(vec![availability, Condition::reconcile_success()]);
        self.persist_status(xr).await?;

        Ok(Action::requeue(self.timing.poll_interval))
    }

    /// Readiness reported by the composed resource at `reference`
    async fn readiness(
        &self,
        cr: &kube::core::DynamicObject,
        reference: &ObjectReference,
    ) -> Result<Readiness> {
        let Some(mut key) = ObjectKey::from_reference(reference) else {
            return Ok(Readiness::Pending);
        };
        if key.namespace.is_none() {
            key.namespace = cr.metadata.namespace.clone();
        }
        let composed = match self.store.get(&key).await {
            Ok(composed) => composed,
            Err(e) if e.is_not_found() => return Ok(Readiness::Pending),
            Err(e) => return Err(Error::store("get composed resource", e)),
        };
        let conditions: Vec<Condition> = composed
            .data
            .get("status")
            .and_then(|status| status.get("conditions"))
            .map(|c| serde_json::from_value(c.clone()))
            .transpose()?
            .unwrap_or_default();
        Ok(Readiness::of(get_condition(&conditions, TYPE_READY)))
    }

    async fn persist(&self, xr: &mut Composite) -> Result<()> {
        let obj = store::to_dynamic(&*xr).map_err(|e| Error::store("encode composite", e))?;
        let updated = self
            .store
            .update(&obj)
            .await
            .map_err(|e| Error::store("update composite", e))?;
        xr.meta_mut().resource_version = updated.metadata.resource_version;
        Ok(())
    }

    async fn persist_status(&self, xr: &mut Composite) -> Result<()> {
        let obj = store::to_dynamic(&*xr).map_err(|e| Error::store("encode composite", e))?;
        let updated = self
            .store
            .update_status(&obj)
            .await
            .map_err(|e| Error::store("update composite status", e))?;
        xr.meta_mut().resource_version = updated.metadata.resource_version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_of_child_conditions() {
        assert_eq!(Readiness::of(None), Readiness::Pending);
        assert_eq!(Readiness::of(Some(&Condition::available())), Readiness::Ready);
        assert_eq!(Readiness::of(Some(&Condition::creating())), Readiness::Pending);
        assert_eq!(Readiness::of(Some(&Condition::unavailable())), Readiness::NotReady);
        assert_eq!(Readiness::of(Some(&Condition::deleting())), Readiness::NotReady);
    }
}
