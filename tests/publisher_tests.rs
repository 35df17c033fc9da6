//! # Connection Publisher Tests
//!
//! `SecretPublisher` against a `MemoryStore`, and `PublisherChain` ordering.

mod common;

use async_trait::async_trait;
use common::*;
use composition_controller::connection::{
    ConnectionDetails, ConnectionPublisher, ConnectionSecretOwner, PublisherChain,
};
use composition_controller::crd::NetworkParameters;
use composition_controller::resource::ObjectKey;
use composition_controller::store::{self, MemoryStore, ObjectStore};
use composition_controller::{Error, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

fn details(pairs: &[(&str, &str)]) -> ConnectionDetails {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
        .collect()
}

/// Owner backed by a stored network, so the secret can be garbage collected
async fn owner(store: &MemoryStore) -> ConnectionSecretOwner {
    let mut net = network("net", NetworkParameters::default());
    net.spec.write_connection_secret_to_ref = secret_ref("net-conn");
    let key = seed_network(store, &net).await;
    ConnectionSecretOwner::for_resource(&get_network(store, &key).await)
}

async fn stored_secret(store: &MemoryStore, name: &str) -> Secret {
    store::get_typed(store, &ObjectKey::secret(Some(NAMESPACE.to_string()), name))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_publish_creates_owned_secret() {
    let store = Arc::new(MemoryStore::new());
    let owner = owner(&store).await;

    secret_publisher(&store)
        .apply_connection(&owner, &details(&[("networkName", "vpc-1")]))
        .await
        .unwrap();

    let secret = stored_secret(&store, "net-conn").await;
    let refs = secret.metadata.owner_references.unwrap();
    assert_eq!(refs[0].uid, owner.owner.uid);
    assert_eq!(refs[0].controller, Some(true));
    assert_eq!(secret_value(&store, "net-conn", "networkName").await.as_deref(), Some("vpc-1"));
}

#[tokio::test]
async fn test_publish_is_additive() {
    let store = Arc::new(MemoryStore::new());
    let owner = owner(&store).await;
    let publisher = secret_publisher(&store);

    publisher
        .apply_connection(&owner, &details(&[("networkName", "vpc-1"), ("selfLink", "old")]))
        .await
        .unwrap();
    publisher
        .apply_connection(&owner, &details(&[("selfLink", "new")]))
        .await
        .unwrap();

    assert_eq!(secret_value(&store, "net-conn", "networkName").await.as_deref(), Some("vpc-1"));
    assert_eq!(secret_value(&store, "net-conn", "selfLink").await.as_deref(), Some("new"));
}

#[tokio::test]
async fn test_unchanged_publish_does_not_write() {
    let store = Arc::new(MemoryStore::new());
    let owner = owner(&store).await;
    let publisher = secret_publisher(&store);
    let published = details(&[("networkName", "vpc-1")]);

    publisher.apply_connection(&owner, &published).await.unwrap();
    let before = stored_secret(&store, "net-conn").await.metadata.resource_version;

    publisher.apply_connection(&owner, &published).await.unwrap();
    publisher
        .apply_connection(&owner, &ConnectionDetails::new())
        .await
        .unwrap();
    let after = stored_secret(&store, "net-conn").await.metadata.resource_version;

    assert_eq!(before, after);
}

#[tokio::test]
async fn test_secret_owned_by_someone_else_is_a_conflict() {
    let store = Arc::new(MemoryStore::new());
    let owner = owner(&store).await;
    let foreign = Secret {
        metadata: ObjectMeta {
            name: Some("net-conn".to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "password".to_string(),
            ByteString(b"hunter2".to_vec()),
        )])),
        ..Default::default()
    };
    let created = store
        .create(&store::to_dynamic(&foreign).unwrap())
        .await
        .unwrap();

    let err = secret_publisher(&store)
        .apply_connection(&owner, &details(&[("networkName", "vpc-1")]))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let secret = stored_secret(&store, "net-conn").await;
    assert_eq!(secret.metadata.resource_version, created.metadata.resource_version);
    assert_eq!(secret_value(&store, "net-conn", "networkName").await, None);
}

#[tokio::test]
async fn test_delete_connection_tolerates_missing_secret() {
    let store = Arc::new(MemoryStore::new());
    let owner = owner(&store).await;
    let publisher = secret_publisher(&store);

    publisher.delete_connection(&owner).await.unwrap();

    publisher
        .apply_connection(&owner, &details(&[("networkName", "vpc-1")]))
        .await
        .unwrap();
    publisher.delete_connection(&owner).await.unwrap();
    assert_eq!(secret_value(&store, "net-conn", "networkName").await, None);
}

#[derive(Debug)]
struct Recording {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

#[async_trait]
impl ConnectionPublisher for Recording {
    async fn apply_connection(
        &self,
        _owner: &ConnectionSecretOwner,
        _details: &ConnectionDetails,
    ) -> Result<()> {
        self.log.lock().unwrap().push(format!("apply:{}", self.name));
        if self.fail {
            return Err(Error::Conflict(format!("{} refused", self.name)));
        }
        Ok(())
    }

    async fn delete_connection(&self, _owner: &ConnectionSecretOwner) -> Result<()> {
        self.log.lock().unwrap().push(format!("delete:{}", self.name));
        Ok(())
    }
}

fn recording(name: &'static str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<dyn ConnectionPublisher> {
    Arc::new(Recording {
        name,
        log: Arc::clone(log),
        fail,
    })
}

#[tokio::test]
async fn test_chain_runs_publishers_in_order_and_stops_at_first_error() {
    let store = Arc::new(MemoryStore::new());
    let owner = owner(&store).await;
    let log = Arc::new(Mutex::new(Vec::new()));

    let chain = PublisherChain::new(vec![
        recording("first", &log, false),
        recording("second", &log, true),
        recording("third", &log, false),
    ]);

    let err = chain
        .apply_connection(&owner, &ConnectionDetails::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("second refused"));

    chain.delete_connection(&owner).await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "apply:first".to_string(),
            "apply:second".to_string(),
            "delete:first".to_string(),
            "delete:second".to_string(),
            "delete:third".to_string(),
        ]
    );
}
