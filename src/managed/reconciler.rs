//! # Managed Reconciler
//!
//! One reconciliation tick for a managed resource:
//!
//! 1. Ensure the finalizer before any external mutation
//! 2. Connect to the provider and observe the external resource
//! 3. Delete, create, update or do nothing
//! 4. Publish connection details and write `Ready`/`Synced` conditions
//!
//! Spec changes (finalizer, synthesized external name) are persisted before
//! the external call that depends on them. A create requeues after a short
//! interval; the next observation reports whether it completed.

use super::{ExternalConnecter, ExternalKind};
use crate::config::ControllerConfig;
use crate::connection::{ConnectionPublisher, ConnectionSecretOwner};
use crate::constants::MANAGED_FINALIZER;
use crate::crd::Condition;
use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::resource::meta::{add_finalizer, has_finalizer, remove_finalizer, was_deleted};
use crate::resource::ObjectKey;
use crate::store::{self, ObjectStore};
use kube_runtime::controller::Action;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// Requeue intervals after a successful tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileTiming {
    /// After a tick that left the resource in sync
    pub poll_interval: Duration,
    /// After a create or delete request, to observe its outcome
    pub short_wait: Duration,
}

impl Default for ReconcileTiming {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

impl From<&ControllerConfig> for ReconcileTiming {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            poll_interval: config.reconcile_poll_interval(),
            short_wait: config.create_requeue_interval(),
        }
    }
}

pub struct ManagedReconciler<K> {
    store: Arc<dyn ObjectStore>,
    connecter: Arc<dyn ExternalConnecter<K>>,
    publisher: Arc<dyn ConnectionPublisher>,
    timing: ReconcileTiming,
}

impl<K: ExternalKind> fmt::Debug for ManagedReconciler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedReconciler")
            .field("kind", &K::kind(&()))
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl<K: ExternalKind> ManagedReconciler<K> {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        connecter: Arc<dyn ExternalConnecter<K>>,
        publisher: Arc<dyn ConnectionPublisher>,
        timing: ReconcileTiming,
    ) -> Self {
        Self {
            store,
            connecter,
            publisher,
            timing,
        }
    }

    /// Fetch the resource at `key` and reconcile it; a missing resource needs
    /// no work
    pub async fn reconcile_key(&self, key: &ObjectKey) -> Result<Action> {
        match store::get_typed::<K>(self.store.as_ref(), key).await {
            Ok(mg) => self.reconcile(mg).await,
            Err(e) if e.is_not_found() => {
                debug!("{} no longer exists", key);
                Ok(Action::await_change())
            }
            Err(e) => Err(Error::store("get managed resource", e)),
        }
    }

    /// Run one tick. On failure the error is also recorded as a `Synced`
    /// condition on the resource.
    pub async fn reconcile(&self, mut mg: K) -> Result<Action> {
        let kind = K::kind(&());
        let span = info_span!(
            "reconcile",
            resource.kind = %kind,
            resource.name = mg.meta().name.as_deref().unwrap_or_default(),
            resource.namespace = mg.meta().namespace.as_deref().unwrap_or_default(),
        );

        metrics::increment_reconciliations(&kind);
        let start = Instant::now();

        let result = self.tick(&mut mg).instrument(span.clone()).await;
        metrics::observe_reconciliation_duration(&kind, start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            metrics::increment_reconciliation_errors(&kind, e.reason());
            self.record_error(&mut mg, e).instrument(span).await;
        }
        result
    }

    async fn tick(&self, mg: &mut K) -> Result<Action> {
        let deleting = was_deleted(mg.meta());

        if deleting && !has_finalizer(mg.meta(), MANAGED_FINALIZER) {
            return Ok(Action::await_change());
        }
        if !deleting && add_finalizer(mg.meta_mut(), MANAGED_FINALIZER) {
            self.persist(mg).await?;
        }

        let client = self.connecter.connect(mg).await?;
        let observation = client.observe(mg).await?;
        let owner = ConnectionSecretOwner::for_resource(&*mg);

        if deleting {
            if observation.resource_exists {
                client.delete(mg).await?;
                mg.set_conditions(vec![Condition::reconcile_success()]);
                self.persist_status(mg).await?;
                metrics::increment_requeues("deleting");
                return Ok(Action::requeue(self.timing.short_wait));
            }

            self.publisher.delete_connection(&owner).await?;
            if remove_finalizer(mg.meta_mut(), MANAGED_FINALIZER) {
                self.persist(mg).await?;
            }
            info!(
                "🗑️  External resource for {} {} is gone, released finalizer",
                K::kind(&()),
                mg.meta().name.as_deref().unwrap_or_default()
            );
            return Ok(Action::await_change());
        }

        self.publisher
            .apply_connection(&owner, &observation.connection_details)
            .await?;

        if !observation.resource_exists {
            if mg.external_name().is_none() {
                if let Some(name) = mg.synthesize_external_name() {
                    mg.set_external_name(name);
                    self.persist(mg).await?;
                }
            }

            let creation = client.create(mg).await?;
            self.publisher
                .apply_connection(&owner, &creation.connection_details)
                .await?;
            mg.set_conditions(vec![Condition::reconcile_success()]);
            self.persist_status(mg).await?;
            metrics::increment_requeues("created");
            return Ok(Action::requeue(self.timing.short_wait));
        }

        if !observation.resource_up_to_date {
            let update = client.update(mg).await?;
            self.publisher
                .apply_connection(&owner, &update.connection_details)
                .await?;
        }

        mg.set_conditions(vec![Condition::reconcile_success()]);
        self.persist_status(mg).await?;
        Ok(Action::requeue(self.timing.poll_interval))
    }

    /// Write metadata and spec, keeping the new resourceVersion
    async fn persist(&self, mg: &mut K) -> Result<()> {
        let obj = store::to_dynamic(mg).map_err(|e| Error::store("encode managed resource", e))?;
        let updated = self
            .store
            .update(&obj)
            .await
            .map_err(|e| Error::store("update managed resource", e))?;
        mg.meta_mut().resource_version = updated.metadata.resource_version;
        Ok(())
    }

    async fn persist_status(&self, mg: &mut K) -> Result<()> {
        let obj = store::to_dynamic(mg).map_err(|e| Error::store("encode managed resource", e))?;
        let updated = self
            .store
            .update_status(&obj)
            .await
            .map_err(|e| Error::store("update managed resource status", e))?;
        mg.meta_mut().resource_version = updated.metadata.resource_version;
        Ok(())
    }

    async fn record_error(&self, mg: &mut K, err: &Error) {
        warn!(
            "Reconciliation of {} {} failed: {}",
            K::kind(&()),
            mg.meta().name.as_deref().unwrap_or_default(),
            err
        );
        mg.set_conditions(vec![Condition::reconcile_error(err)]);
        if let Err(e) = self.persist_status(mg).await {
            debug!("Cannot record reconcile error: {}", e);
        }
    }
}
