//! Shared fixtures for the reconciliation tests
//!
//! Reconcilers run against a `MemoryStore` and a fake Compute API that keeps
//! networks in memory and records every call it receives.

#![allow(dead_code, reason = "each test binary uses a subset of the fixtures")]

use async_trait::async_trait;
use composition_controller::connection::{ConnectionPublisher, SecretPublisher};
use composition_controller::crd::{
    get_condition, Condition, Network, NetworkParameters, NetworkSpec, ProviderReference,
    SecretReference,
};
use composition_controller::managed::{
    AdapterClient, ExternalClient, ExternalConnecter, ManagedReconciler, ReconcileTiming,
    SharedAdapter,
};
use composition_controller::provider::gcp::network::GcpNetwork;
use composition_controller::provider::{ProviderAdapter, ProviderError};
use composition_controller::resource::{Conditioned, ObjectKey};
use composition_controller::store::{self, MemoryStore, ObjectStore};
use composition_controller::{Error, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "default";
pub const PROJECT: &str = "test-project";

pub fn timing() -> ReconcileTiming {
    ReconcileTiming {
        poll_interval: Duration::from_secs(60),
        short_wait: Duration::from_secs(5),
    }
}

/// In-memory stand-in for the Compute networks API
#[derive(Debug, Default)]
pub struct FakeNetworkApi {
    networks: Mutex<BTreeMap<String, GcpNetwork>>,
    calls: Mutex<Vec<String>>,
    fail_next_insert: AtomicBool,
}

impl FakeNetworkApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls of one operation (`get`, `insert`, `patch`, `delete`)
    pub fn count(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(':').next() == Some(op))
            .count()
    }

    pub fn network(&self, name: &str) -> Option<GcpNetwork> {
        self.networks.lock().unwrap().get(name).cloned()
    }

    pub fn network_names(&self) -> Vec<String> {
        self.networks.lock().unwrap().keys().cloned().collect()
    }

    /// Change a network behind the controller's back
    pub fn drift(&self, name: &str, change: impl FnOnce(&mut GcpNetwork)) {
        if let Some(network) = self.networks.lock().unwrap().get_mut(name) {
            change(network);
        }
    }

    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProviderAdapter for FakeNetworkApi {
    type Desired = GcpNetwork;
    type Observed = GcpNetwork;

    async fn get(&self, _project: &str, id: &str) -> Result<GcpNetwork, ProviderError> {
        self.record(format!("get:{id}"));
        self.network(id).ok_or(ProviderError::NotFound)
    }

    async fn insert(&self, project: &str, desired: &GcpNetwork) -> Result<(), ProviderError> {
        self.record(format!("insert:{}", desired.name));
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(ProviderError::Api {
                code: 503,
                status: "UNAVAILABLE".to_string(),
                message: "backend unavailable".to_string(),
            });
        }
        let mut network = desired.clone();
        network.id = Some("4242".to_string());
        network.self_link = Some(format!(
            "https://www.googleapis.com/compute/v1/projects/{project}/global/networks/{}",
            desired.name
        ));
        self.networks
            .lock()
            .unwrap()
            .insert(desired.name.clone(), network);
        Ok(())
    }

    async fn patch(&self, _project: &str, id: &str, desired: &GcpNetwork) -> Result<(), ProviderError> {
        self.record(format!("patch:{id}"));
        let mut networks = self.networks.lock().unwrap();
        let network = networks.get_mut(id).ok_or(ProviderError::NotFound)?;
        network.description = desired.description.clone();
        network.auto_create_subnetworks = desired.auto_create_subnetworks;
        network.routing_config = desired.routing_config.clone();
        Ok(())
    }

    async fn delete(&self, _project: &str, id: &str) -> Result<(), ProviderError> {
        self.record(format!("delete:{id}"));
        self.networks
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or(ProviderError::NotFound)
    }
}

/// Connects every network to the fake API
#[derive(Debug)]
pub struct FakeConnecter {
    pub api: Arc<FakeNetworkApi>,
}

#[async_trait]
impl ExternalConnecter<Network> for FakeConnecter {
    async fn connect(&self, _mg: &Network) -> Result<Box<dyn ExternalClient<Network>>> {
        let api: Arc<FakeNetworkApi> = Arc::clone(&self.api);
        let adapter: SharedAdapter<Network> = api;
        Ok(Box::new(AdapterClient::<Network>::new(adapter, PROJECT)))
    }
}

/// Fails to connect, as with a missing provider
#[derive(Debug)]
pub struct FailingConnecter;

#[async_trait]
impl ExternalConnecter<Network> for FailingConnecter {
    async fn connect(&self, mg: &Network) -> Result<Box<dyn ExternalClient<Network>>> {
        Err(Error::Connection(format!(
            "provider of {} not found",
            mg.metadata.name.as_deref().unwrap_or_default()
        )))
    }
}

pub fn object_store(store: &Arc<MemoryStore>) -> Arc<dyn ObjectStore> {
    let store: Arc<MemoryStore> = Arc::clone(store);
    store
}

pub fn secret_publisher(store: &Arc<MemoryStore>) -> Arc<dyn ConnectionPublisher> {
    Arc::new(SecretPublisher::new(object_store(store)))
}

pub fn network_reconciler(
    store: &Arc<MemoryStore>,
    connecter: Arc<dyn ExternalConnecter<Network>>,
) -> ManagedReconciler<Network> {
    ManagedReconciler::new(
        object_store(store),
        connecter,
        secret_publisher(store),
        timing(),
    )
}

pub fn network(name: &str, params: NetworkParameters) -> Network {
    let mut network = Network::new(
        name,
        NetworkSpec {
            provider_ref: Some(ProviderReference {
                name: "gcp-provider".to_string(),
                namespace: None,
            }),
            write_connection_secret_to_ref: None,
            for_provider: params,
        },
    );
    network.metadata.namespace = Some(NAMESPACE.to_string());
    network
}

pub fn secret_ref(name: &str) -> Option<SecretReference> {
    Some(SecretReference {
        name: name.to_string(),
        namespace: None,
    })
}

/// Create `network` in the store and return its key
pub async fn seed_network(store: &MemoryStore, network: &Network) -> ObjectKey {
    let created = store
        .create(&store::to_dynamic(network).unwrap())
        .await
        .unwrap();
    ObjectKey::for_object(&created).unwrap()
}

pub async fn get_network(store: &MemoryStore, key: &ObjectKey) -> Network {
    store::get_typed(store, key).await.unwrap()
}

pub async fn secret_value(store: &MemoryStore, name: &str, key: &str) -> Option<String> {
    let secret: k8s_openapi::api::core::v1::Secret =
        store::get_typed(store, &ObjectKey::secret(Some(NAMESPACE.to_string()), name))
            .await
            .ok()?;
    let value = secret.data?.get(key)?.0.clone();
    String::from_utf8(value).ok()
}

/// Condition of `type` on `obj`, as `(status, reason)`
pub fn condition<T: Conditioned>(obj: &T, r#type: &str) -> Option<(String, String)> {
    get_condition(obj.conditions(), r#type)
        .map(|c: &Condition| (c.status.clone(), c.reason.clone().unwrap_or_default()))
}
