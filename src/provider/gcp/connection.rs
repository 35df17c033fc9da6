//! # Connection Adapter
//!
//! Service Networking private services connections. A connection is
//! identified by its consumer network; the service producer (`parent`) comes
//! from the managed resource the adapter was built for.
//!
//! Removing a connection is done on the Compute side, by removing the VPC
//! peering the service producer created on the consumer network.

use super::{GcpKind, GcpRestClient, GcpSession};
use crate::crd::{Connection, ConnectionObservation};
use crate::error::{Error, Result};
use crate::managed::{ExternalKind, SharedAdapter};
use crate::provider::{ProviderAdapter, ProviderError};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Name of the peering Service Networking creates on the consumer network
pub const SERVICE_NETWORKING_PEERING: &str = "servicenetworking-googleapis-com";

/// Connection resource as sent to and returned by the Service Networking API
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpConnection {
    pub network: String,
    /// Always sent, so an empty list clears the ranges
    #[serde(default)]
    pub reserved_peering_ranges: Vec<String>,
    #[serde(default, skip_serializing)]
    pub peering: Option<String>,
    #[serde(default, skip_serializing)]
    pub service: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListConnectionsResponse {
    #[serde(default)]
    connections: Vec<GcpConnection>,
}

#[derive(Debug, Clone)]
pub struct ConnectionAdapter {
    servicenetworking: GcpRestClient,
    compute: GcpRestClient,
    parent: String,
}

impl ConnectionAdapter {
    pub fn new(servicenetworking: GcpRestClient, compute: GcpRestClient, parent: impl Into<String>) -> Self {
        Self {
            servicenetworking,
            compute,
            parent: parent.into(),
        }
    }

    fn collection(&self) -> String {
        format!("v1/{}/connections", self.parent)
    }
}

/// Fully qualified network path; bare names are scoped to `project`
pub fn network_path(project: &str, network: &str) -> String {
    if network.starts_with("projects/") {
        network.to_string()
    } else {
        format!("projects/{project}/global/networks/{network}")
    }
}

#[async_trait]
impl ProviderAdapter for ConnectionAdapter {
    type Desired = GcpConnection;
    type Observed = GcpConnection;

    async fn get(&self, project: &str, id: &str) -> Result<GcpConnection, ProviderError> {
        let path = format!("{}?network={}", self.collection(), network_path(project, id));
        let list: ListConnectionsResponse = self.servicenetworking.get_json("connections.list", &path).await?;
        list.connections
            .into_iter()
            .next()
            .ok_or(ProviderError::NotFound)
    }

    async fn insert(&self, project: &str, desired: &GcpConnection) -> Result<(), ProviderError> {
        let body = serde_json::to_value(GcpConnection {
            network: network_path(project, &desired.network),
            ..desired.clone()
        })?;
        self.servicenetworking
            .send("connections.create", Method::POST, &self.collection(), Some(&body))
            .await?;
        Ok(())
    }

    async fn patch(&self, project: &str, id: &str, desired: &GcpConnection) -> Result<(), ProviderError> {
        let body = serde_json::to_value(GcpConnection {
            network: network_path(project, id),
            ..desired.clone()
        })?;
        let path = format!(
            "{}/-?updateMask=reservedPeeringRanges&force=true",
            self.collection()
        );
        self.servicenetworking
            .send("connections.patch", Method::PATCH, &path, Some(&body))
            .await?;
        Ok(())
    }

    async fn delete(&self, project: &str, id: &str) -> Result<(), ProviderError> {
        let path = format!("compute/v1/{}/removePeering", network_path(project, id));
        let body = json!({ "name": SERVICE_NETWORKING_PEERING });
        self.compute
            .send("networks.removePeering", Method::POST, &path, Some(&body))
            .await?;
        Ok(())
    }
}

/// Multiset equality of reserved peering ranges; order is not significant
pub fn ranges_match(desired: &[String], observed: &[String]) -> bool {
    if desired.len() != observed.len() {
        return false;
    }
    let mut desired = desired.to_vec();
    let mut observed = observed.to_vec();
    desired.sort();
    observed.sort();
    desired == observed
}

impl ExternalKind for Connection {
    type Desired = GcpConnection;
    type Observed = GcpConnection;

    const NAME_PREFIX: &'static str = "connection";

    fn external_name(&self) -> Option<&str> {
        Some(self.spec.for_provider.network.as_str()).filter(|n| !n.is_empty())
    }

    fn set_external_name(&mut self, name: String) {
        self.spec.for_provider.network = name;
    }

    /// A connection is named by the network it peers; nothing to synthesize
    fn synthesize_external_name(&self) -> Option<String> {
        None
    }

    fn desired(&self) -> Result<GcpConnection> {
        let network = self
            .external_name()
            .ok_or_else(|| Error::InvalidResource("connection has no network".to_string()))?;
        Ok(GcpConnection {
            network: network.to_string(),
            reserved_peering_ranges: self.spec.for_provider.reserved_peering_ranges.clone(),
            ..Default::default()
        })
    }

    fn update_status_from(&mut self, observed: &GcpConnection) {
        let status = self.status.get_or_insert_with(Default::default);
        status.at_provider = Some(ConnectionObservation {
            peering: observed.peering.clone(),
            service: observed.service.clone(),
        });
    }

    fn is_up_to_date(&self, observed: &GcpConnection) -> bool {
        ranges_match(
            &self.spec.for_provider.reserved_peering_ranges,
            &observed.reserved_peering_ranges,
        )
    }
}

impl GcpKind for Connection {
    fn adapter(session: &GcpSession, mg: &Self) -> SharedAdapter<Self> {
        Arc::new(ConnectionAdapter::new(
            session.servicenetworking.clone(),
            session.compute.clone(),
            mg.spec.for_provider.parent.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ConnectionParameters, ConnectionSpec, SERVICE_NETWORKING_PARENT};
    use reqwest::Client;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> ConnectionAdapter {
        ConnectionAdapter::new(
            GcpRestClient::new(Client::new(), server.uri(), "t"),
            GcpRestClient::new(Client::new(), server.uri(), "t"),
            SERVICE_NETWORKING_PARENT,
        )
    }

    fn connection(ranges: &[&str]) -> Connection {
        Connection::new(
            "conn",
            ConnectionSpec {
                for_provider: ConnectionParameters {
                    network: "projects/p/global/networks/vpc-1".to_string(),
                    reserved_peering_ranges: ranges.iter().map(|r| r.to_string()).collect(),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_ranges_compare_as_sets() {
        let mg = connection(&["a", "b"]);
        let observed = GcpConnection {
            reserved_peering_ranges: vec!["b".to_string(), "a".to_string()],
            ..Default::default()
        };
        assert!(mg.is_up_to_date(&observed));

        let observed = GcpConnection {
            reserved_peering_ranges: vec!["a".to_string()],
            ..Default::default()
        };
        assert!(!mg.is_up_to_date(&observed));
    }

    #[test]
    fn test_network_path() {
        assert_eq!(network_path("p", "vpc-1"), "projects/p/global/networks/vpc-1");
        assert_eq!(
            network_path("p", "projects/q/global/networks/vpc-1"),
            "projects/q/global/networks/vpc-1"
        );
    }

    #[test]
    fn test_no_synthesized_name() {
        let mut mg = connection(&[]);
        mg.spec.for_provider.network.clear();
        assert!(mg.synthesize_external_name().is_none());
        assert!(matches!(mg.desired(), Err(Error::InvalidResource(_))));
    }

    #[tokio::test]
    async fn test_get_empty_list_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/services/servicenetworking.googleapis.com/connections"))
            .and(query_param("network", "projects/p/global/networks/vpc-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = adapter(&server).get("p", "vpc-1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_returns_first_connection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/services/servicenetworking.googleapis.com/connections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "connections": [{
                    "network": "projects/p/global/networks/vpc-1",
                    "reservedPeeringRanges": ["range-a"],
                    "peering": "servicenetworking-googleapis-com",
                    "service": "services/servicenetworking.googleapis.com"
                }]
            })))
            .mount(&server)
            .await;

        let observed = adapter(&server).get("p", "vpc-1").await.unwrap();
        assert_eq!(observed.peering.as_deref(), Some(SERVICE_NETWORKING_PEERING));
        assert_eq!(observed.reserved_peering_ranges, vec!["range-a".to_string()]);

        let mut mg = connection(&["range-a"]);
        mg.update_status_from(&observed);
        let at_provider = mg.status.unwrap().at_provider.unwrap();
        assert_eq!(at_provider.service.as_deref(), Some(SERVICE_NETWORKING_PARENT));
    }

    #[tokio::test]
    async fn test_patch_forces_reserved_ranges() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/services/servicenetworking.googleapis.com/connections/-"))
            .and(query_param("updateMask", "reservedPeeringRanges"))
            .and(query_param("force", "true"))
            .and(body_json(json!({
                "network": "projects/p/global/networks/vpc-1",
                "reservedPeeringRanges": []
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "operations/1"})))
            .expect(1)
            .mount(&server)
            .await;

        let desired = GcpConnection {
            network: "vpc-1".to_string(),
            ..Default::default()
        };
        adapter(&server).patch("p", "vpc-1", &desired).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_peering() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compute/v1/projects/p/global/networks/vpc-1/removePeering"))
            .and(body_json(json!({"name": SERVICE_NETWORKING_PEERING})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "compute#operation"})))
            .expect(1)
            .mount(&server)
            .await;

        adapter(&server)
            .delete("p", "projects/p/global/networks/vpc-1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_uses_project_of_qualified_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compute/v1/projects/host-project/global/networks/shared/removePeering"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "compute#operation"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/compute/v1/projects/p/global/networks/vpc-2/removePeering"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "compute#operation"})))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter(&server);
        adapter
            .delete("p", "projects/host-project/global/networks/shared")
            .await
            .unwrap();
        adapter.delete("p", "vpc-2").await.unwrap();
    }
}
