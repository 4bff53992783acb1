//! Webhook DNS provider
//!
//! Manages TXT records through a small REST API:
//!
//! ```text
//! POST {create_url}
//! {"type": "TXT", "name": "_acme-challenge.example.com", "content": "<digest>"}
//!   -> 200 {"id": "record-identifier"}
//!
//! DELETE {delete_url with {record_id} replaced}
//!   -> 2xx, or 404 if already gone
//! ```

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use certflow_config::WebhookConfig;

use super::{DnsProvider, DnsRecord};
use crate::credentials::CredentialStore;
use crate::error::SolverError;

/// Environment variable holding the webhook token when ambient credentials
/// are allowed
pub const AMBIENT_TOKEN_ENV: &str = "CERTFLOW_DNS_WEBHOOK_TOKEN";

/// DNS provider backed by HTTP webhooks.
pub struct WebhookDnsProvider {
    client: reqwest::Client,
    create_url: String,
    delete_url: String,
    headers: HeaderMap,
}

impl WebhookDnsProvider {
    /// Create a provider; `bearer_token` is sent as `Authorization: Bearer`.
    pub fn new(config: &WebhookConfig, bearer_token: Option<String>) -> Result<Self, SolverError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SolverError::Config(format!("failed to build webhook client: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (key, value) in &config.headers {
            let name = HeaderName::try_from(key.as_str())
                .map_err(|e| SolverError::Config(format!("invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                SolverError::Config(format!("invalid header value for '{key}': {e}"))
            })?;
            headers.insert(name, value);
        }
        if let Some(token) = bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| SolverError::Credential("webhook token is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(Self {
            client,
            create_url: config.create_url.clone(),
            delete_url: config.delete_url.clone(),
            headers,
        })
    }
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

#[async_trait]
impl DnsProvider for WebhookDnsProvider {
    async fn create_txt_record(
        &self,
        name: &str,
        content: &str,
    ) -> Result<DnsRecord, SolverError> {
        debug!(name = %name, url = %self.create_url, "Creating TXT record via webhook");

        let response = self
            .client
            .post(&self.create_url)
            .headers(self.headers.clone())
            .json(&CreateRequest {
                record_type: "TXT",
                name,
                content,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(SolverError::Provider(format!(
                "create returned {status}: {body}"
            )));
        }

        let body: CreateResponse = response
            .json()
            .await
            .map_err(|e| SolverError::Provider(format!("failed to parse create response: {e}")))?;

        Ok(DnsRecord {
            record_id: body.id,
            name: name.to_string(),
        })
    }

    async fn delete_txt_record(&self, record: &DnsRecord) -> Result<(), SolverError> {
        let url = self.delete_url.replace("{record_id}", &record.record_id);
        debug!(record_id = %record.record_id, url = %url, "Deleting TXT record via webhook");

        let response = self
            .client
            .delete(&url)
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(record_id = %record.record_id, "Record already deleted");
            return Ok(());
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(status = %status, body = %body, "Webhook delete returned non-success status");
            return Err(SolverError::Provider(format!(
                "delete returned {status}: {body}"
            )));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Resolve the bearer token for the webhook provider.
///
/// An explicit `tokenRef` is read from the credential store in `scope`.
/// Without one, the token comes from [`AMBIENT_TOKEN_ENV`] if ambient
/// credentials are allowed; otherwise no token is sent.
pub async fn resolve_webhook_token(
    store: &dyn CredentialStore,
    scope: &str,
    config: &WebhookConfig,
    ambient_allowed: bool,
) -> Result<Option<String>, SolverError> {
    if let Some(selector) = &config.token_ref {
        let slot = selector.key_or_default();
        info!(scope = %scope, name = %selector.name, slot = %slot, "Resolving DNS webhook token");

        let credential = store
            .get(scope, &selector.name)
            .await
            .map_err(|e| SolverError::Credential(e.to_string()))?
            .ok_or_else(|| {
                SolverError::Credential(format!("credential {scope}/{} not found", selector.name))
            })?;
        let bytes = credential.get(slot).ok_or_else(|| {
            SolverError::Credential(format!(
                "credential {scope}/{} has no key {slot:?}",
                selector.name
            ))
        })?;
        let token = std::str::from_utf8(bytes)
            .map_err(|_| SolverError::Credential("webhook token is not UTF-8".to_string()))?;
        return Ok(Some(token.trim().to_string()));
    }

    if ambient_allowed {
        if let Ok(token) = std::env::var(AMBIENT_TOKEN_ENV) {
            debug!(env = AMBIENT_TOKEN_ENV, "Using ambient DNS webhook token");
            return Ok(Some(token));
        }
    }

    Ok(None)
}
