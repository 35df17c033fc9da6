//! # Network Adapter
//!
//! GCP Compute VPC networks, `compute/v1/projects/{project}/global/networks`.

use super::{GcpKind, GcpRestClient, GcpSession};
use crate::connection::ConnectionDetails;
use crate::crd::{Network, NetworkObservation, NetworkPeering, RoutingConfig};
use crate::error::{Error, Result};
use crate::managed::{ExternalKind, SharedAdapter};
use crate::provider::{ProviderAdapter, ProviderError};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Network resource as sent to and returned by the Compute API
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpNetwork {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_create_subnetworks: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_config: Option<GcpRoutingConfig>,
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing)]
    pub self_link: Option<String>,
    #[serde(default, skip_serializing)]
    pub creation_timestamp: Option<String>,
    #[serde(rename = "gatewayIPv4", default, skip_serializing)]
    pub gateway_ipv4: Option<String>,
    #[serde(default, skip_serializing)]
    pub subnetworks: Vec<String>,
    #[serde(default, skip_serializing)]
    pub peerings: Vec<GcpNetworkPeering>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpRoutingConfig {
    pub routing_mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpNetworkPeering {
    pub name: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub state_details: Option<String>,
    #[serde(default)]
    pub exchange_subnet_routes: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NetworkAdapter {
    client: GcpRestClient,
}

impl NetworkAdapter {
    pub fn new(client: GcpRestClient) -> Self {
        Self { client }
    }

    fn collection(project: &str) -> String {
        format!("compute/v1/projects/{project}/global/networks")
    }
}

#[async_trait]
impl ProviderAdapter for NetworkAdapter {
    type Desired = GcpNetwork;
    type Observed = GcpNetwork;

    async fn get(&self, project: &str, id: &str) -> Result<GcpNetwork, ProviderError> {
        self.client
            .get_json("networks.get", &format!("{}/{id}", Self::collection(project)))
            .await
    }

    async fn insert(&self, project: &str, desired: &GcpNetwork) -> Result<(), ProviderError> {
        let body = serde_json::to_value(desired)?;
        self.client
            .send("networks.insert", Method::POST, &Self::collection(project), Some(&body))
            .await?;
        Ok(())
    }

    async fn patch(&self, project: &str, id: &str, desired: &GcpNetwork) -> Result<(), ProviderError> {
        let body = serde_json::to_value(desired)?;
        self.client
            .send(
                "networks.patch",
                Method::PATCH,
                &format!("{}/{id}", Self::collection(project)),
                Some(&body),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, project: &str, id: &str) -> Result<(), ProviderError> {
        self.client
            .send(
                "networks.delete",
                Method::DELETE,
                &format!("{}/{id}", Self::collection(project)),
                None,
            )
            .await?;
        Ok(())
    }
}

impl ExternalKind for Network {
    type Desired = GcpNetwork;
    type Observed = GcpNetwork;

    const NAME_PREFIX: &'static str = "vpc";

    fn external_name(&self) -> Option<&str> {
        self.spec.for_provider.name.as_deref().filter(|n| !n.is_empty())
    }

    fn set_external_name(&mut self, name: String) {
        self.spec.for_provider.name = Some(name);
    }

    fn desired(&self) -> Result<GcpNetwork> {
        let params = &self.spec.for_provider;
        let name = self
            .external_name()
            .ok_or_else(|| Error::InvalidResource("network has no name".to_string()))?;
        Ok(GcpNetwork {
            name: name.to_string(),
            description: params.description.clone(),
            auto_create_subnetworks: params.auto_create_subnetworks,
            routing_config: params.routing_config.as_ref().map(|rc| GcpRoutingConfig {
                routing_mode: rc.routing_mode.clone(),
            }),
            ..Default::default()
        })
    }

    fn update_status_from(&mut self, observed: &GcpNetwork) {
        let status = self.status.get_or_insert_with(Default::default);
        status.at_provider = Some(NetworkObservation {
            id: observed.id.clone(),
            self_link: observed.self_link.clone(),
            creation_timestamp: observed.creation_timestamp.clone(),
            gateway_ipv4: observed.gateway_ipv4.clone(),
            subnetworks: observed.subnetworks.clone(),
            peerings: observed
                .peerings
                .iter()
                .map(|p| NetworkPeering {
                    name: p.name.clone(),
                    network: p.network.clone(),
                    state: p.state.clone(),
                    state_details: p.state_details.clone(),
                    exchange_subnet_routes: p.exchange_subnet_routes,
                })
                .collect(),
        });
    }

    /// Fields left unset in `spec.forProvider` are provider-defaulted and never drift
    fn is_up_to_date(&self, observed: &GcpNetwork) -> bool {
        let params = &self.spec.for_provider;
        let description_matches = params
            .description
            .as_ref()
            .is_none_or(|d| observed.description.as_ref() == Some(d));
        let auto_create_matches = params
            .auto_create_subnetworks
            .is_none_or(|a| observed.auto_create_subnetworks == Some(a));
        let routing_matches = params.routing_config.as_ref().is_none_or(|RoutingConfig { routing_mode }| {
            observed
                .routing_config
                .as_ref()
                .is_some_and(|rc| &rc.routing_mode == routing_mode)
        });
        description_matches && auto_create_matches && routing_matches
    }

    fn connection_details(&self, observed: &GcpNetwork) -> ConnectionDetails {
        let mut details = ConnectionDetails::new();
        details.insert("networkName".to_string(), observed.name.clone().into_bytes());
        if let Some(self_link) = &observed.self_link {
            details.insert("selfLink".to_string(), self_link.clone().into_bytes());
        }
        details
    }
}

impl GcpKind for Network {
    fn adapter(session: &GcpSession, _mg: &Self) -> SharedAdapter<Self> {
        Arc::new(NetworkAdapter::new(session.compute.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{NetworkParameters, NetworkSpec};
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn network(params: NetworkParameters) -> Network {
        Network::new(
            "net",
            NetworkSpec {
                for_provider: params,
                ..Default::default()
            },
        )
    }

    fn observed() -> GcpNetwork {
        serde_json::from_value(json!({
            "name": "vpc-1",
            "id": "123",
            "selfLink": "https://compute.googleapis.com/compute/v1/projects/p/global/networks/vpc-1",
            "autoCreateSubnetworks": false,
            "routingConfig": {"routingMode": "REGIONAL"},
            "gatewayIPv4": "10.0.0.1",
            "peerings": [{"name": "servicenetworking-googleapis-com", "network": "x", "state": "ACTIVE"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_up_to_date_ignores_unset_fields() {
        let mg = network(NetworkParameters {
            name: Some("vpc-1".to_string()),
            ..Default::default()
        });
        assert!(mg.is_up_to_date(&observed()));
    }

    #[test]
    fn test_routing_mode_drift() {
        let mg = network(NetworkParameters {
            name: Some("vpc-1".to_string()),
            routing_config: Some(RoutingConfig {
                routing_mode: "GLOBAL".to_string(),
            }),
            ..Default::default()
        });
        assert!(!mg.is_up_to_date(&observed()));
    }

    #[test]
    fn test_status_and_connection_details_from_observation() {
        let mut mg = network(NetworkParameters::default());
        let obs = observed();
        mg.update_status_from(&obs);

        let at_provider = mg.status.as_ref().and_then(|s| s.at_provider.clone()).unwrap();
        assert_eq!(at_provider.id.as_deref(), Some("123"));
        assert_eq!(at_provider.gateway_ipv4.as_deref(), Some("10.0.0.1"));
        assert_eq!(at_provider.peerings[0].state.as_deref(), Some("ACTIVE"));

        let details = mg.connection_details(&obs);
        assert_eq!(details["networkName"], b"vpc-1".to_vec());
        assert!(details.contains_key("selfLink"));
    }

    #[test]
    fn test_desired_requires_name() {
        assert!(network(NetworkParameters::default()).desired().is_err());
    }

    #[tokio::test]
    async fn test_insert_sends_only_desired_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compute/v1/projects/p/global/networks"))
            .and(body_json(json!({
                "name": "vpc-1",
                "autoCreateSubnetworks": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "compute#operation"})))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = NetworkAdapter::new(GcpRestClient::new(Client::new(), server.uri(), "t"));
        let desired = GcpNetwork {
            name: "vpc-1".to_string(),
            auto_create_subnetworks: Some(false),
            ..Default::default()
        };
        adapter.insert("p", &desired).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_missing_network_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/p/global/networks/vpc-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let adapter = NetworkAdapter::new(GcpRestClient::new(Client::new(), server.uri(), "t"));
        assert!(adapter.get("p", "vpc-1").await.unwrap_err().is_not_found());
    }
}
