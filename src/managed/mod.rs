//! # Managed Resources
//!
//! External lifecycle of a managed resource: Connect, Observe, then Create,
//! Update, Delete or nothing.
//!
//! - `ExternalConnecter` resolves a resource's provider and credentials into
//!   an `ExternalClient`
//! - `ExternalClient` observes and mutates the external resource
//! - `AdapterClient` implements `ExternalClient` for any `ExternalKind` on top
//!   of a `ProviderAdapter`
//! - `reconciler.rs` drives one tick against the object store

pub mod reconciler;

pub use reconciler::{ManagedReconciler, ReconcileTiming};

use crate::connection::ConnectionDetails;
use crate::crd::Condition;
use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::provider::ProviderAdapter;
use crate::resource::Managed;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Result of observing an external resource. Never cached across ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalObservation {
    pub resource_exists: bool,
    pub resource_up_to_date: bool,
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalCreation {
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalUpdate {
    pub connection_details: ConnectionDetails,
}

/// Produces an `ExternalClient` for a managed resource
#[async_trait]
pub trait ExternalConnecter<K>: Send + Sync {
    /// Fails with `Error::Connection` if the provider cannot be resolved or
    /// its credentials are unusable
    async fn connect(&self, mg: &K) -> Result<Box<dyn ExternalClient<K>>>;
}

/// Observes and mutates the external resource bound to a managed resource
#[async_trait]
pub trait ExternalClient<K>: Send + Sync {
    async fn observe(&self, mg: &mut K) -> Result<ExternalObservation>;
    async fn create(&self, mg: &mut K) -> Result<ExternalCreation>;
    async fn update(&self, mg: &K) -> Result<ExternalUpdate>;
    async fn delete(&self, mg: &mut K) -> Result<()>;
}

/// Binds a managed resource kind to the provider-native shapes of its adapter
pub trait ExternalKind: Managed {
    type Desired: Send + Sync + 'static;
    type Observed: Send + Sync + 'static;

    /// Prefix of synthesized external identifiers
    const NAME_PREFIX: &'static str;

    /// Identifier of the external resource, if one is assigned
    fn external_name(&self) -> Option<&str>;

    fn set_external_name(&mut self, name: String);

    /// Deterministic identifier derived from the resource's UID, so a retried
    /// create reuses the identifier of the first attempt
    fn synthesize_external_name(&self) -> Option<String> {
        self.owner_uid()
            .filter(|uid| !uid.is_empty())
            .map(|uid| format!("{}-{}", Self::NAME_PREFIX, uid))
    }

    /// Desired provider-native state built from `spec.forProvider`
    fn desired(&self) -> Result<Self::Desired>;

    /// Copy provider-observed fields into `status.atProvider`
    fn update_status_from(&mut self, observed: &Self::Observed);

    /// Drift check between `spec.forProvider` and the observed state
    fn is_up_to_date(&self, observed: &Self::Observed) -> bool;

    fn connection_details(&self, _observed: &Self::Observed) -> ConnectionDetails {
        ConnectionDetails::new()
    }
}

pub type SharedAdapter<K> = Arc<
    dyn ProviderAdapter<
        Desired = <K as ExternalKind>::Desired,
        Observed = <K as ExternalKind>::Observed,
    >,
>;

/// `ExternalClient` backed by a provider adapter scoped to one project
pub struct AdapterClient<K: ExternalKind> {
    adapter: SharedAdapter<K>,
    project: String,
}

impl<K: ExternalKind> fmt::Debug for AdapterClient<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterClient")
            .field("kind", &K::kind(&()))
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

impl<K: ExternalKind> AdapterClient<K> {
    pub fn new(adapter: SharedAdapter<K>, project: impl Into<String>) -> Self {
        Self {
            adapter,
            project: project.into(),
        }
    }
}

#[async_trait]
impl<K: ExternalKind> ExternalClient<K> for AdapterClient<K> {
    async fn observe(&self, mg: &mut K) -> Result<ExternalObservation> {
        let Some(id) = mg.external_name().map(str::to_string) else {
            return Ok(ExternalObservation::default());
        };

        let observed = match self.adapter.get(&self.project, &id).await {
            Ok(observed) => observed,
            Err(e) if e.is_not_found() => return Ok(ExternalObservation::default()),
            Err(e) => return Err(Error::provider("observe", e)),
        };

        mg.update_status_from(&observed);
        mg.set_conditions(vec![Condition::available()]);
        Ok(ExternalObservation {
            resource_exists: true,
            resource_up_to_date: mg.is_up_to_date(&observed),
            connection_details: mg.connection_details(&observed),
        })
    }

    async fn create(&self, mg: &mut K) -> Result<ExternalCreation> {
        if mg.external_name().is_none() {
            if let Some(name) = mg.synthesize_external_name() {
                mg.set_external_name(name);
            }
        }
        let desired = mg.desired()?;

        mg.set_conditions(vec![Condition::creating()]);
        self.adapter
            .insert(&self.project, &desired)
            .await
            .map_err(|e| Error::provider("create", e))?;

        metrics::increment_external_operations(&K::kind(&()), "create");
        info!(
            "✅ Requested creation of {} {}",
            K::kind(&()),
            mg.external_name().unwrap_or_default()
        );
        Ok(ExternalCreation::default())
    }

    async fn update(&self, mg: &K) -> Result<ExternalUpdate> {
        let id = mg.external_name().ok_or_else(|| {
            Error::InvalidResource(format!("{} has no external name to update", K::kind(&())))
        })?;
        let desired = mg.desired()?;

        self.adapter
            .patch(&self.project, id, &desired)
            .await
            .map_err(|e| Error::provider("update", e))?;

        metrics::increment_external_operations(&K::kind(&()), "update");
        info!("🔄 Requested update of {} {}", K::kind(&()), id);
        Ok(ExternalUpdate::default())
    }

    async fn delete(&self, mg: &mut K) -> Result<()> {
        mg.set_conditions(vec![Condition::deleting()]);
        let Some(id) = mg.external_name().map(str::to_string) else {
            return Ok(());
        };

        match self.adapter.delete(&self.project, &id).await {
            Ok(()) => {
                metrics::increment_external_operations(&K::kind(&()), "delete");
                info!("🗑️  Requested deletion of {} {}", K::kind(&()), id);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(Error::provider("delete", e)),
        }
    }
}
