//! # Connection Publishing
//!
//! Connection details are the outputs a ready resource exposes to consumers
//! (endpoints, names, credentials). Publishers write them to, and remove them
//! from, a Secret owned by the resource.
//!
//! Publishing is additive: keys already in the Secret that are not part of
//! the published details are kept, and a publish that changes nothing does not
//! write.

use crate::crd::SecretReference;
use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::resource::meta::is_controlled_by;
use crate::resource::{ConnectionSecretWriter, ObjectKey};
use crate::store::{self, ObjectStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use kube::Resource;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Connection detail key to raw value
pub type ConnectionDetails = BTreeMap<String, Vec<u8>>;

/// Identity of the resource whose connection secret is published
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSecretOwner {
    /// Controller reference stamped on the secret
    pub owner: OwnerReference,
    pub namespace: Option<String>,
    pub secret_ref: Option<SecretReference>,
}

impl ConnectionSecretOwner {
    pub fn for_resource<K>(obj: &K) -> Self
    where
        K: Resource<DynamicType = ()> + ConnectionSecretWriter,
    {
        let meta = obj.meta();
        Self {
            owner: OwnerReference {
                api_version: K::api_version(&()).into_owned(),
                kind: K::kind(&()).into_owned(),
                name: meta.name.clone().unwrap_or_default(),
                uid: meta.uid.clone().unwrap_or_default(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            },
            namespace: meta.namespace.clone(),
            secret_ref: obj.write_connection_secret_to_ref().cloned(),
        }
    }

    /// Secret named by the declared reference, or `{name}-{kind}-connection`
    /// in the owner's namespace when none is declared
    pub fn secret_key(&self) -> ObjectKey {
        match &self.secret_ref {
            Some(r) => ObjectKey::secret(
                r.namespace.clone().or_else(|| self.namespace.clone()),
                r.name.clone(),
            ),
            None => ObjectKey::secret(
                self.namespace.clone(),
                format!(
                    "{}-{}-connection",
                    self.owner.name,
                    self.owner.kind.to_lowercase()
                ),
            ),
        }
    }

    fn secret(&self) -> Secret {
        let key = self.secret_key();
        Secret {
            metadata: ObjectMeta {
                name: Some(key.name),
                namespace: key.namespace,
                owner_references: Some(vec![self.owner.clone()]),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Publishes connection details for a resource
#[async_trait]
pub trait ConnectionPublisher: Send + Sync {
    async fn apply_connection(
        &self,
        owner: &ConnectionSecretOwner,
        details: &ConnectionDetails,
    ) -> Result<()>;

    async fn delete_connection(&self, owner: &ConnectionSecretOwner) -> Result<()>;
}

/// Runs publishers serially, stopping at the first error
#[derive(Clone, Default)]
pub struct PublisherChain(Vec<Arc<dyn ConnectionPublisher>>);

impl fmt::Debug for PublisherChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherChain")
            .field("publishers", &self.0.len())
            .finish()
    }
}

impl PublisherChain {
    pub fn new(publishers: Vec<Arc<dyn ConnectionPublisher>>) -> Self {
        Self(publishers)
    }
}

#[async_trait]
impl ConnectionPublisher for PublisherChain {
    async fn apply_connection(
        &self,
        owner: &ConnectionSecretOwner,
        details: &ConnectionDetails,
    ) -> Result<()> {
        for publisher in &self.0 {
            publisher.apply_connection(owner, details).await?;
        }
        Ok(())
    }

    async fn delete_connection(&self, owner: &ConnectionSecretOwner) -> Result<()> {
        for publisher in &self.0 {
            publisher.delete_connection(owner).await?;
        }
        Ok(())
    }
}

/// Publishes connection details to a Secret in the object store
#[derive(Clone)]
pub struct SecretPublisher {
    store: Arc<dyn ObjectStore>,
}

impl fmt::Debug for SecretPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretPublisher").finish_non_exhaustive()
    }
}

impl SecretPublisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ConnectionPublisher for SecretPublisher {
    async fn apply_connection(
        &self,
        owner: &ConnectionSecretOwner,
        details: &ConnectionDetails,
    ) -> Result<()> {
        let desired = store::to_dynamic(&owner.secret())
            .map_err(|e| Error::store("build connection secret", e))?;
        let uid = owner.owner.uid.clone();

        let (written, outcome) = store::create_or_update(self.store.as_ref(), desired, |obj| {
            if !is_controlled_by(&obj.metadata, &uid) {
                return Err(StoreError::OwnershipConflict(format!(
                    "connection secret {} exists and is not controlled by {} {}",
                    obj.metadata.name.as_deref().unwrap_or_default(),
                    owner.owner.kind,
                    owner.owner.name
                )));
            }
            let mut secret: Secret = store::from_dynamic(obj.clone())?;
            let mut data = secret_data(&secret);
            if merge_connection_details(&mut data, details) {
                set_secret_data(&mut secret, data);
                *obj = store::to_dynamic(&secret)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::store("create or update connection secret", e))?;

        debug!(
            "Connection secret {} at resourceVersion {} ({:?})",
            owner.secret_key(),
            written.metadata.resource_version.as_deref().unwrap_or_default(),
            outcome
        );
        if outcome.wrote() {
            metrics::increment_connection_secrets_published();
        }
        Ok(())
    }

    async fn delete_connection(&self, owner: &ConnectionSecretOwner) -> Result<()> {
        let key = owner.secret_key();
        match self.store.delete(&key).await {
            Ok(()) => {
                info!("🗑️  Deleted connection secret {}", key);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(Error::store("delete connection secret", e)),
        }
    }
}

/// Merge `details` into `existing`; returns true if anything changed
pub fn merge_connection_details(
    existing: &mut ConnectionDetails,
    details: &ConnectionDetails,
) -> bool {
    let mut changed = false;
    for (key, value) in details {
        if existing.get(key) != Some(value) {
            existing.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

/// Raw data of a Secret
pub fn secret_data(secret: &Secret) -> ConnectionDetails {
    secret
        .data
        .as_ref()
        .map(|data| data.iter().map(|(k, v)| (k.clone(), v.0.clone())).collect())
        .unwrap_or_default()
}

fn set_secret_data(secret: &mut Secret, data: ConnectionDetails) {
    secret.data = Some(
        data.into_iter()
            .map(|(k, v)| (k, ByteString(v)))
            .collect(),
    );
}
