//! # GCP Authentication
//!
//! Access tokens for the GCP REST adapters.
//!
//! A Provider with a service account key gets a token minted from that key:
//! an RS256-signed JWT assertion exchanged at the key's `token_uri`
//! (OAuth2 JWT bearer grant). A keyless Provider runs as the controller's
//! Workload Identity through the metadata server.
//!
//! References:
//! - [Service account authorization without OAuth](https://developers.google.com/identity/protocols/oauth2/service-account)

use crate::constants::{
    GCP_ASSERTION_LIFETIME_SECS, GCP_CLOUD_PLATFORM_SCOPE, GCP_METADATA_TOKEN_URL,
    GCP_OAUTH_TOKEN_URL,
};
use crate::error::{Error, Result};
use crate::provider::ProviderError;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Service account key file, as stored in the credentials Secret
#[derive(Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let key: Self = serde_json::from_slice(raw)
            .map_err(|e| Error::Connection(format!("malformed service account key: {e}")))?;
        if let Some(key_type) = key.key_type.as_deref() {
            if key_type != "service_account" {
                return Err(Error::Connection(format!(
                    "unsupported credentials type {key_type}"
                )));
            }
        }
        if key.client_email.is_empty() || key.private_key.is_empty() {
            return Err(Error::Connection(
                "service account key has no client_email or private_key".to_string(),
            ));
        }
        Ok(key)
    }

    /// Token endpoint the assertion is exchanged at
    pub fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(GCP_OAUTH_TOKEN_URL)
    }

    /// Signed JWT assertion for the cloud-platform scope, valid from `now`
    pub fn assertion(&self, now: i64) -> Result<String, ProviderError> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: GCP_CLOUD_PLATFORM_SCOPE,
            aud: self.token_uri(),
            iat: now,
            exp: now + GCP_ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let signing_key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| ProviderError::Auth(format!("invalid private key: {e}")))?;
        jsonwebtoken::encode(&header, &claims, &signing_key)
            .map_err(|e| ProviderError::Auth(format!("cannot sign assertion: {e}")))
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// OAuth2 access token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

async fn read_token(response: reqwest::Response, source: &str) -> Result<String, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Auth(format!(
            "{source} returned {status}: {body}"
        )));
    }
    let token: TokenResponse = response.json().await?;
    Ok(token.access_token)
}

/// Exchange a signed assertion for an access token scoped to `key`
pub async fn service_account_token(
    http: &Client,
    key: &ServiceAccountKey,
) -> Result<String, ProviderError> {
    let assertion = key.assertion(chrono::Utc::now().timestamp())?;
    let response = http
        .post(key.token_uri())
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
        .send()
        .await?;
    let token = read_token(response, "token endpoint").await?;
    debug!("Retrieved access token for {}", key.client_email);
    Ok(token)
}

/// Access token of the controller's Workload Identity
pub async fn metadata_token(http: &Client) -> Result<String, ProviderError> {
    let response = http
        .get(GCP_METADATA_TOKEN_URL)
        .header("Metadata-Flavor", "Google")
        .send()
        .await?;
    let token = read_token(response, "metadata server").await?;
    debug!("Retrieved access token from metadata server");
    Ok(token)
}
