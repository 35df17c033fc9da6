//! GCP REST Client
//!
//! Thin reqwest wrapper shared by the GCP adapters. It adds the bearer token,
//! maps HTTP 404 to `ProviderError::NotFound`, decodes GCP error bodies and
//! records per-operation metrics.
//!
//! Mutating calls return long-running operations; the adapters do not wait for
//! them. The next observation reports the outcome.
//!
//! References:
//! - [GCP API errors](https://cloud.google.com/apis/design/errors)

use crate::observability::metrics;
use crate::provider::ProviderError;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info_span, Instrument};

/// GCP API error response wrapper
#[derive(Debug, Deserialize)]
struct GcpErrorResponse {
    error: GcpError,
}

#[derive(Debug, Deserialize)]
struct GcpError {
    /// HTTP status code (e.g., 404, 403, 500)
    code: u16,
    message: String,
    /// Error status string (e.g., "NOT_FOUND", "PERMISSION_DENIED")
    #[serde(default)]
    status: String,
}

#[derive(Clone)]
pub struct GcpRestClient {
    http_client: Client,
    base_url: String,
    access_token: String,
}

impl std::fmt::Debug for GcpRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpRestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GcpRestClient {
    pub fn new(http_client: Client, base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// Build HTTP request with authentication headers
    fn make_request(&self, method: Method, path: &str, body: Option<&Value>) -> RequestBuilder {
        let url = if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        };

        // Format authorization header: add "Bearer " prefix if not already present
        let auth_header = if self.access_token.starts_with("Bearer ") {
            self.access_token.clone()
        } else {
            format!("Bearer {}", self.access_token)
        };

        let mut request = self
            .http_client
            .request(method, &url)
            .header("Authorization", auth_header)
            .header("Content-Type", "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        request
    }

    /// Handle GCP API error responses
    fn handle_error_response(status: StatusCode, error_text: &str) -> ProviderError {
        match serde_json::from_str::<GcpErrorResponse>(error_text) {
            Ok(error_response) => ProviderError::Api {
                code: error_response.error.code,
                status: error_response.error.status,
                message: error_response.error.message,
            },
            Err(_) => ProviderError::Api {
                code: status.as_u16(),
                status: status.to_string(),
                message: error_text.to_string(),
            },
        }
    }

    /// Send a request and return the decoded body, if any
    pub async fn send(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, ProviderError> {
        let span = info_span!("gcp.request", gcp.operation = operation, gcp.path = path);
        let start = Instant::now();

        let result = async {
            let response = self.make_request(method, path, body).send().await?;
            let status = response.status();
            let text = response.text().await?;

            if status == StatusCode::NOT_FOUND {
                debug!("{} returned 404", path);
                return Err(ProviderError::NotFound);
            }
            if !status.is_success() {
                return Err(Self::handle_error_response(status, &text));
            }
            if text.trim().is_empty() {
                return Ok(None);
            }
            Ok(Some(serde_json::from_str(&text)?))
        }
        .instrument(span)
        .await;

        match &result {
            Ok(_) | Err(ProviderError::NotFound) => {
                metrics::record_provider_operation(operation, start.elapsed().as_secs_f64());
            }
            Err(_) => metrics::increment_provider_operation_errors(operation),
        }
        result
    }

    /// GET and decode a JSON resource
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
    ) -> Result<T, ProviderError> {
        match self.send(operation, Method::GET, path, None).await? {
            Some(body) => Ok(serde_json::from_value(body)?),
            None => Ok(serde_json::from_value(Value::Object(Default::default()))?),
        }
    }
}
