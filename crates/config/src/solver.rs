//! Solver, polling, and controller settings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::issuer::SecretKeySelector;

/// Settings shared by the challenge solvers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverConfig {
    /// HTTP-01 solver settings
    #[serde(default)]
    pub http01: Http01Config,

    /// DNS-01 solver settings
    #[serde(default)]
    pub dns01: Dns01Config,
}

/// HTTP-01 solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Http01Config {
    /// Timeout for a single self-check request
    #[serde(default = "default_self_check_timeout_secs")]
    pub self_check_timeout_secs: u64,

    /// Port the self-check connects to
    #[serde(default = "default_self_check_port")]
    pub self_check_port: u16,
}

fn default_self_check_timeout_secs() -> u64 {
    5
}

fn default_self_check_port() -> u16 {
    80
}

impl Default for Http01Config {
    fn default() -> Self {
        Self {
            self_check_timeout_secs: default_self_check_timeout_secs(),
            self_check_port: default_self_check_port(),
        }
    }
}

impl Http01Config {
    pub fn self_check_timeout(&self) -> Duration {
        Duration::from_secs(self.self_check_timeout_secs)
    }
}

/// DNS-01 solver settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dns01Config {
    /// Webhook used to publish and remove TXT records
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

/// Generic DNS webhook provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// URL to POST new TXT records to
    pub create_url: String,

    /// URL template to DELETE records; `{record_id}` is substituted
    pub delete_url: String,

    /// Credential slot holding a bearer token for the webhook
    #[serde(default)]
    pub token_ref: Option<SecretKeySelector>,

    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request timeout
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout_secs() -> u64 {
    30
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// How the orchestrator polls solver checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingConfig {
    /// Delay between two checks of the same challenge
    #[serde(default = "default_interval_millis")]
    pub interval_millis: u64,

    /// Give up on a challenge after this long
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Budget for clean-up once the caller has cancelled
    #[serde(default = "default_cleanup_grace_secs")]
    pub cleanup_grace_secs: u64,
}

fn default_interval_millis() -> u64 {
    2_000
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_cleanup_grace_secs() -> u64 {
    5
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_millis: default_interval_millis(),
            timeout_secs: default_timeout_secs(),
            cleanup_grace_secs: default_cleanup_grace_secs(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_millis)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_secs(self.cleanup_grace_secs)
    }
}

/// Process-wide controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Scope used for supplemental resources of cluster issuers
    #[serde(default = "default_cluster_resource_scope")]
    pub cluster_resource_scope: String,

    /// Whether namespaced issuers may use ambient credentials
    #[serde(default)]
    pub issuer_ambient_credentials: bool,

    /// Whether cluster issuers may use ambient credentials
    #[serde(default = "default_cluster_ambient_credentials")]
    pub cluster_issuer_ambient_credentials: bool,

    /// Root directory of the file credential store
    #[serde(default = "default_credentials_root")]
    pub credentials_root: PathBuf,
}

fn default_cluster_resource_scope() -> String {
    "certflow".to_string()
}

fn default_cluster_ambient_credentials() -> bool {
    true
}

fn default_credentials_root() -> PathBuf {
    PathBuf::from("/var/lib/certflow/credentials")
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cluster_resource_scope: default_cluster_resource_scope(),
            issuer_ambient_credentials: false,
            cluster_issuer_ambient_credentials: default_cluster_ambient_credentials(),
            credentials_root: default_credentials_root(),
        }
    }
}
