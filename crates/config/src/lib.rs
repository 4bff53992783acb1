//! Certflow configuration
//!
//! Configuration types, TOML loading, and validation for the certflow ACME
//! issuer.
//!
//! # Example
//!
//! ```toml
//! [issuer]
//! name = "letsencrypt"
//! scope = "cert-system"
//!
//! [issuer.acme]
//! server = "https://acme-v02.api.letsencrypt.org/directory"
//! email = "ops@example.com"
//! privateKeyRef = { name = "acme-account" }
//! dns01Nameservers = ["8.8.8.8:53"]
//!
//! [solvers.dns01.webhook]
//! createUrl = "https://dns.internal/records"
//! deleteUrl = "https://dns.internal/records/{record_id}"
//!
//! [polling]
//! intervalMillis = 2000
//! timeoutSecs = 300
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod env_expand;
pub mod error;
pub mod issuer;
pub mod solver;
pub mod validate;

// ============================================================================
// Public API Re-exports
// ============================================================================

pub use error::ConfigError;
pub use issuer::{AcmeIssuerConfig, IssuerConfig, IssuerKind, SecretKeySelector, DEFAULT_SECRET_KEY};
pub use solver::{
    ControllerConfig, Dns01Config, Http01Config, PollingConfig, SolverConfig, WebhookConfig,
};
pub use validate::{parse_nameserver, validate_issuer, validate_polling};

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use env_expand::expand_env_vars;

/// Root of a certflow configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertflowConfig {
    /// The issuer to drive
    #[serde(default)]
    pub issuer: IssuerConfig,

    /// Process-wide controller settings
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Challenge solver settings
    #[serde(default)]
    pub solvers: SolverConfig,

    /// Challenge polling behaviour
    #[serde(default)]
    pub polling: PollingConfig,
}

impl CertflowConfig {
    /// Load configuration from a TOML file and expand environment variables
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text and expand environment variables
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: CertflowConfig = toml::from_str(content)?;
        config.expand_env()?;

        debug!(
            issuer = %config.issuer.name,
            has_acme = config.issuer.acme.is_some(),
            has_dns_webhook = config.solvers.dns01.webhook.is_some(),
            "Parsed configuration"
        );

        Ok(config)
    }

    /// Scope holding supplemental resources for the configured issuer
    pub fn resource_scope(&self) -> &str {
        self.issuer
            .resource_scope(&self.controller.cluster_resource_scope)
    }

    /// Whether the configured issuer may use ambient credentials
    ///
    /// Both the issuer and the controller policy for its kind must allow it.
    pub fn ambient_credentials_allowed(&self) -> bool {
        let permitted = match self.issuer.kind {
            IssuerKind::Namespaced => self.controller.issuer_ambient_credentials,
            IssuerKind::Cluster => self.controller.cluster_issuer_ambient_credentials,
        };
        let requested = self
            .issuer
            .acme
            .as_ref()
            .is_some_and(|acme| acme.ambient_credentials);
        permitted && requested
    }

    fn expand_env(&mut self) -> Result<(), ConfigError> {
        if let Some(acme) = self.issuer.acme.as_mut() {
            acme.server = expand_env_vars(&acme.server)?;
            acme.email = expand_env_vars(&acme.email)?;
        }

        if let Some(webhook) = self.solvers.dns01.webhook.as_mut() {
            webhook.create_url = expand_env_vars(&webhook.create_url)?;
            webhook.delete_url = expand_env_vars(&webhook.delete_url)?;
            for value in webhook.headers.values_mut() {
                *value = expand_env_vars(value)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [issuer]
        name = "letsencrypt"
        scope = "team-a"

        [issuer.acme]
        server = "https://ca.example/directory"
        email = "a@b.com"
        ambientCredentials = true
        privateKeyRef = { name = "acct-key" }

        [solvers.dns01.webhook]
        createUrl = "https://dns.internal/records"
        deleteUrl = "https://dns.internal/records/{record_id}"

        [polling]
        intervalMillis = 500
    "#;

    #[test]
    fn test_parse_sample() {
        let config = CertflowConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.issuer.name, "letsencrypt");
        assert_eq!(config.resource_scope(), "team-a");
        assert_eq!(config.polling.interval_millis, 500);
        assert_eq!(config.polling.timeout_secs, 300);
        assert!(config.solvers.dns01.webhook.is_some());
        assert!(validate_issuer(&config.issuer, config.resource_scope()).is_ok());
    }

    #[test]
    fn test_ambient_credentials_need_controller_permission() {
        let mut config = CertflowConfig::from_toml(SAMPLE).unwrap();
        assert!(!config.ambient_credentials_allowed());

        config.issuer.kind = IssuerKind::Cluster;
        assert!(config.ambient_credentials_allowed());

        if let Some(acme) = config.issuer.acme.as_mut() {
            acme.ambient_credentials = false;
        }
        assert!(!config.ambient_credentials_allowed());
    }

    #[test]
    fn test_webhook_urls_are_expanded() {
        let toml = r#"
            [solvers.dns01.webhook]
            createUrl = "${CERTFLOW_TEST_UNSET_HOST:-https://fallback}/records"
            deleteUrl = "https://fallback/records/{record_id}"
        "#;
        let config = CertflowConfig::from_toml(toml).unwrap();
        let webhook = config.solvers.dns01.webhook.unwrap();
        assert_eq!(webhook.create_url, "https://fallback/records");
        assert_eq!(webhook.delete_url, "https://fallback/records/{record_id}");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = CertflowConfig::from_file(file.path()).unwrap();
        assert_eq!(config.issuer.name, "letsencrypt");
    }

    #[test]
    fn test_from_missing_file() {
        let err = CertflowConfig::from_file("/nonexistent/certflow.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let toml = r#"
            somethingElse = 1
            [issuer]
            name = "x"
            color = "blue"
        "#;
        assert!(CertflowConfig::from_toml(toml).is_ok());
    }
}
