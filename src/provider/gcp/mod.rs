//! # GCP Provider
//!
//! Adapters for GCP Compute networks and Service Networking connections.
//!
//! Connecting a managed resource resolves its `Provider` and obtains an
//! access token for it. A Provider naming a credentials Secret is scoped to
//! that service account; a keyless Provider runs as the controller's
//! Workload Identity. Emulator mode uses a dummy token so the adapters can
//! run against a local mock.
//!
//! References:
//! - [Compute networks](https://cloud.google.com/compute/docs/reference/rest/v1/networks)
//! - [Service Networking connections](https://cloud.google.com/service-infrastructure/docs/service-networking/reference/rest/v1/services.connections)

pub mod auth;
pub mod client;
pub mod connection;
pub mod network;

pub use auth::ServiceAccountKey;
pub use client::GcpRestClient;
pub use connection::ConnectionAdapter;
pub use network::NetworkAdapter;

use crate::config::GcpClientConfig;
use crate::crd::{Provider, SecretKeySelector};
use crate::error::{Error, Result};
use crate::managed::{AdapterClient, ExternalClient, ExternalConnecter, ExternalKind, SharedAdapter};
use crate::resource::ObjectKey;
use crate::store::{self, ObjectStore};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::Resource;
use reqwest::Client;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// REST clients for one project
#[derive(Debug, Clone)]
pub struct GcpSession {
    pub project: String,
    pub compute: GcpRestClient,
    pub servicenetworking: GcpRestClient,
}

impl GcpSession {
    pub fn new(http: Client, config: &GcpClientConfig, project: impl Into<String>, token: &str) -> Self {
        Self {
            project: project.into(),
            compute: GcpRestClient::new(http.clone(), &config.compute_endpoint, token),
            servicenetworking: GcpRestClient::new(http, &config.servicenetworking_endpoint, token),
        }
    }
}

/// A managed kind served by a GCP adapter
pub trait GcpKind: ExternalKind {
    /// Adapter for `mg`, scoped to the session's project
    fn adapter(session: &GcpSession, mg: &Self) -> SharedAdapter<Self>;
}

/// Connects managed resources of kind `K` to GCP
pub struct GcpConnecter<K> {
    store: Arc<dyn ObjectStore>,
    http: Client,
    config: GcpClientConfig,
    _kind: PhantomData<fn() -> K>,
}

impl<K> fmt::Debug for GcpConnecter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpConnecter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K> GcpConnecter<K> {
    pub fn new(store: Arc<dyn ObjectStore>, http: Client, config: GcpClientConfig) -> Self {
        Self {
            store,
            http,
            config,
            _kind: PhantomData,
        }
    }

    async fn service_account_key(
        &self,
        provider: &Provider,
        selector: &SecretKeySelector,
    ) -> Result<ServiceAccountKey> {
        let secret_key = ObjectKey::secret(
            selector
                .namespace
                .clone()
                .or_else(|| provider.metadata.namespace.clone()),
            selector.name.clone(),
        );
        let secret: Secret = store::get_typed(self.store.as_ref(), &secret_key)
            .await
            .map_err(|e| {
                Error::Connection(format!("cannot get credentials secret {secret_key}: {e}"))
            })?;
        let raw = secret
            .data
            .as_ref()
            .and_then(|data| data.get(&selector.key))
            .ok_or_else(|| {
                Error::Connection(format!(
                    "credentials secret {secret_key} has no key {}",
                    selector.key
                ))
            })?;
        ServiceAccountKey::parse(&raw.0)
    }

    /// Access token for `provider`'s identity
    async fn access_token(&self, provider: &Provider) -> Result<String> {
        let key = match &provider.spec.credentials_secret_ref {
            Some(selector) => Some(self.service_account_key(provider, selector).await?),
            None => None,
        };

        if self.config.emulator_mode {
            debug!("Emulator mode: using dummy access token");
            return Ok("test-token".to_string());
        }

        let token = match &key {
            Some(key) => auth::service_account_token(&self.http, key).await,
            None => auth::metadata_token(&self.http).await,
        };
        token.map_err(|e| Error::Connection(format!("cannot get access token: {e}")))
    }
}

#[async_trait]
impl<K: GcpKind> ExternalConnecter<K> for GcpConnecter<K> {
    async fn connect(&self, mg: &K) -> Result<Box<dyn ExternalClient<K>>> {
        let provider_ref = mg.provider_ref().ok_or_else(|| {
            Error::Connection(format!(
                "{} {} has no providerRef",
                K::kind(&()),
                mg.meta().name.as_deref().unwrap_or_default()
            ))
        })?;

        let provider_key = ObjectKey::new(
            Provider::api_version(&()),
            Provider::kind(&()),
            provider_ref
                .namespace
                .clone()
                .or_else(|| mg.meta().namespace.clone()),
            provider_ref.name.clone(),
        );
        let provider: Provider = store::get_typed(self.store.as_ref(), &provider_key)
            .await
            .map_err(|e| Error::Connection(format!("cannot get provider {provider_key}: {e}")))?;

        let token = self.access_token(&provider).await?;

        let project = provider.spec.project_id;
        debug!(
            "Connected {} {} to project {}",
            K::kind(&()),
            mg.meta().name.as_deref().unwrap_or_default(),
            project
        );
        let session = GcpSession::new(self.http.clone(), &self.config, project.clone(), &token);
        Ok(Box::new(AdapterClient::<K>::new(K::adapter(&session, mg), project)))
    }
}
