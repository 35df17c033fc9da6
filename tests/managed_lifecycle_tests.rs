//! # Managed Resource Lifecycle Tests
//!
//! Drives `ManagedReconciler<Network>` through create, observe, drift,
//! delete and failure paths against a `MemoryStore` and a fake Compute API.

mod common;

use common::*;
use composition_controller::constants::MANAGED_FINALIZER;
use composition_controller::crd::{
    Network, NetworkParameters, RoutingConfig, TYPE_READY, TYPE_SYNCED,
};
use composition_controller::managed::{ExternalKind, ManagedReconciler};
use composition_controller::resource::meta::has_finalizer;
use composition_controller::resource::ObjectKey;
use composition_controller::store::{MemoryStore, ObjectStore};
use composition_controller::Result;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

fn described(description: &str) -> NetworkParameters {
    NetworkParameters {
        description: Some(description.to_string()),
        auto_create_subnetworks: Some(false),
        routing_config: Some(RoutingConfig {
            routing_mode: "REGIONAL".to_string(),
        }),
        ..Default::default()
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    api: Arc<FakeNetworkApi>,
    key: ObjectKey,
}

impl Fixture {
    async fn new(params: NetworkParameters) -> Self {
        let store = Arc::new(MemoryStore::new());
        let key = seed_network(&store, &network("net", params)).await;
        Self {
            store,
            api: FakeNetworkApi::new(),
            key,
        }
    }

    fn reconciler(&self) -> ManagedReconciler<Network> {
        network_reconciler(
            &self.store,
            Arc::new(FakeConnecter {
                api: Arc::clone(&self.api),
            }),
        )
    }

    async fn reconcile(&self) -> Result<Action> {
        self.reconciler().reconcile_key(&self.key).await
    }
}

#[tokio::test]
async fn test_create_persists_finalizer_and_external_name() {
    let fx = Fixture::new(described("primary vpc")).await;

    let action = fx.reconcile().await.unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(5)));

    let net = get_network(&fx.store, &fx.key).await;
    let uid = net.metadata.uid.clone().unwrap();
    assert!(has_finalizer(&net.metadata, MANAGED_FINALIZER));
    assert_eq!(net.external_name(), Some(format!("vpc-{uid}").as_str()));

    assert_eq!(fx.api.count("insert"), 1);
    let created = fx.api.network(&format!("vpc-{uid}")).unwrap();
    assert_eq!(created.description.as_deref(), Some("primary vpc"));

    assert_eq!(
        condition(&net, TYPE_READY),
        Some(("False".to_string(), "Creating".to_string()))
    );
    assert_eq!(
        condition(&net, TYPE_SYNCED),
        Some(("True".to_string(), "ReconcileSuccess".to_string()))
    );
}

#[tokio::test]
async fn test_explicit_name_is_used_verbatim() {
    let fx = Fixture::new(NetworkParameters {
        name: Some("shared-vpc".to_string()),
        ..Default::default()
    })
    .await;

    fx.reconcile().await.unwrap();

    assert_eq!(fx.api.network_names(), vec!["shared-vpc".to_string()]);
    let net = get_network(&fx.store, &fx.key).await;
    assert_eq!(net.external_name(), Some("shared-vpc"));
}

#[tokio::test]
async fn test_next_tick_observes_created_resource_without_inserting() {
    let fx = Fixture::new(described("primary vpc")).await;

    fx.reconcile().await.unwrap();
    let action = fx.reconcile().await.unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(60)));

    assert_eq!(fx.api.count("insert"), 1);
    assert_eq!(fx.api.network_names().len(), 1);

    let net = get_network(&fx.store, &fx.key).await;
    assert_eq!(
        condition(&net, TYPE_READY),
        Some(("True".to_string(), "Available".to_string()))
    );
    let at_provider = net.status.unwrap().at_provider.unwrap();
    assert_eq!(at_provider.id.as_deref(), Some("4242"));
}

#[tokio::test]
async fn test_failed_create_retries_with_the_same_name() {
    let fx = Fixture::new(described("primary vpc")).await;
    fx.api.fail_next_insert();

    let err = fx.reconcile().await.unwrap_err();
    assert_eq!(err.reason(), "TransientProviderError");

    let name_after_failure = get_network(&fx.store, &fx.key)
        .await
        .external_name()
        .map(str::to_string)
        .unwrap();

    fx.reconcile().await.unwrap();

    let inserts: Vec<String> = fx
        .api
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("insert:"))
        .collect();
    assert_eq!(
        inserts,
        vec![
            format!("insert:{name_after_failure}"),
            format!("insert:{name_after_failure}")
        ]
    );
    assert_eq!(fx.api.network_names(), vec![name_after_failure]);
}

#[tokio::test]
async fn test_failure_is_recorded_as_synced_condition() {
    let fx = Fixture::new(described("primary vpc")).await;
    fx.api.fail_next_insert();

    fx.reconcile().await.unwrap_err();

    let net = get_network(&fx.store, &fx.key).await;
    assert_eq!(
        condition(&net, TYPE_SYNCED),
        Some(("False".to_string(), "TransientProviderError".to_string()))
    );
}

#[tokio::test]
async fn test_up_to_date_resource_is_not_patched() {
    let fx = Fixture::new(described("primary vpc")).await;

    for _ in 0..3 {
        fx.reconcile().await.unwrap();
    }

    assert_eq!(fx.api.count("patch"), 0);
    assert_eq!(fx.api.count("insert"), 1);
}

#[tokio::test]
async fn test_drift_triggers_exactly_one_patch() {
    let fx = Fixture::new(described("primary vpc")).await;
    fx.reconcile().await.unwrap();
    fx.reconcile().await.unwrap();

    let name = get_network(&fx.store, &fx.key)
        .await
        .external_name()
        .map(str::to_string)
        .unwrap();
    fx.api
        .drift(&name, |n| n.description = Some("edited in console".to_string()));

    fx.reconcile().await.unwrap();
    assert_eq!(fx.api.count("patch"), 1);
    assert_eq!(
        fx.api.network(&name).unwrap().description.as_deref(),
        Some("primary vpc")
    );

    fx.reconcile().await.unwrap();
    assert_eq!(fx.api.count("patch"), 1);
}

#[tokio::test]
async fn test_provider_defaulted_fields_do_not_drift() {
    let fx = Fixture::new(NetworkParameters::default()).await;
    fx.reconcile().await.unwrap();

    let name = fx.api.network_names().pop().unwrap();
    fx.api.drift(&name, |n| {
        n.auto_create_subnetworks = Some(true);
        n.description = Some("set by provider".to_string());
    });

    fx.reconcile().await.unwrap();
    assert_eq!(fx.api.count("patch"), 0);
}

#[tokio::test]
async fn test_connection_details_are_published() {
    let fx = Fixture::new(described("primary vpc")).await;
    fx.reconcile().await.unwrap();
    fx.reconcile().await.unwrap();

    let name = fx.api.network_names().pop().unwrap();
    assert_eq!(
        secret_value(&fx.store, "net-network-connection", "networkName").await,
        Some(name.clone())
    );
    assert!(secret_value(&fx.store, "net-network-connection", "selfLink")
        .await
        .unwrap()
        .ends_with(&format!("/global/networks/{name}")));
}

#[tokio::test]
async fn test_delete_removes_external_resource_then_releases_finalizer() {
    let fx = Fixture::new(described("primary vpc")).await;
    fx.reconcile().await.unwrap();
    fx.reconcile().await.unwrap();
    let name = fx.api.network_names().pop().unwrap();

    fx.store.delete(&fx.key).await.unwrap();

    // First tick asks the provider to delete and waits for it to be gone
    let action = fx.reconcile().await.unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(5)));
    assert_eq!(fx.api.calls().last(), Some(&format!("delete:{name}")));
    let net = get_network(&fx.store, &fx.key).await;
    assert!(has_finalizer(&net.metadata, MANAGED_FINALIZER));
    assert_eq!(
        condition(&net, TYPE_READY),
        Some(("False".to_string(), "Deleting".to_string()))
    );

    let action = fx.reconcile().await.unwrap();
    assert_eq!(action, Action::await_change());
    assert!(fx.store.get(&fx.key).await.unwrap_err().is_not_found());
    assert_eq!(secret_value(&fx.store, "net-network-connection", "networkName").await, None);
    assert_eq!(fx.api.count("delete"), 1);
}

#[tokio::test]
async fn test_delete_of_already_gone_resource_makes_no_provider_call() {
    let store = Arc::new(MemoryStore::new());
    let mut net = network(
        "orphan",
        NetworkParameters {
            name: Some("vpc-gone".to_string()),
            ..Default::default()
        },
    );
    net.metadata.finalizers = Some(vec![MANAGED_FINALIZER.to_string()]);
    let key = seed_network(&store, &net).await;
    store.delete(&key).await.unwrap();

    let api = FakeNetworkApi::new();
    let reconciler = network_reconciler(
        &store,
        Arc::new(FakeConnecter {
            api: Arc::clone(&api),
        }),
    );

    let action = reconciler.reconcile_key(&key).await.unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(api.count("delete"), 0);
    assert!(store.get(&key).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_deleted_resource_without_finalizer_is_left_alone() {
    let store = Arc::new(MemoryStore::new());
    let mut net = network("foreign", described("primary vpc"));
    net.metadata.finalizers = Some(vec!["example.com/other".to_string()]);
    let key = seed_network(&store, &net).await;
    store.delete(&key).await.unwrap();

    // Connecting would fail, so success proves no connection was attempted
    let reconciler = network_reconciler(&store, Arc::new(FailingConnecter));
    let action = reconciler.reconcile_key(&key).await.unwrap();
    assert_eq!(action, Action::await_change());
}

#[tokio::test]
async fn test_connection_error_is_reported() {
    let store = Arc::new(MemoryStore::new());
    let key = seed_network(&store, &network("net", described("primary vpc"))).await;

    let reconciler = network_reconciler(&store, Arc::new(FailingConnecter));
    let err = reconciler.reconcile_key(&key).await.unwrap_err();
    assert_eq!(err.reason(), "ConnectionError");

    let net = get_network(&store, &key).await;
    assert_eq!(
        condition(&net, TYPE_SYNCED),
        Some(("False".to_string(), "ConnectionError".to_string()))
    );
    // The finalizer precedes any provider interaction
    assert!(has_finalizer(&net.metadata, MANAGED_FINALIZER));
}

#[tokio::test]
async fn test_missing_resource_needs_no_work() {
    let store = Arc::new(MemoryStore::new());
    let reconciler = network_reconciler(&store, Arc::new(FailingConnecter));
    let key = ObjectKey::new(
        "compute.gcp.octopilot.io/v1alpha1",
        "Network",
        Some(NAMESPACE.to_string()),
        "missing",
    );

    let action = reconciler.reconcile_key(&key).await.unwrap();
    assert_eq!(action, Action::await_change());
}
