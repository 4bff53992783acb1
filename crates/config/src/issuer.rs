//! Issuer configuration types.

use serde::{Deserialize, Serialize};

/// Credential slot used when a key selector leaves `key` empty.
pub const DEFAULT_SECRET_KEY: &str = "tls.key";

/// Whether an issuer is scoped to one namespace or serves the whole cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuerKind {
    /// Issuer bound to a single resource scope
    #[default]
    Namespaced,
    /// Cluster-wide issuer; supplemental resources live in the cluster scope
    Cluster,
}

/// A certificate issuer definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerConfig {
    /// Issuer name, used in logs and events
    #[serde(default)]
    pub name: String,

    /// Issuer kind
    #[serde(default)]
    pub kind: IssuerKind,

    /// Scope (namespace) of a namespaced issuer
    #[serde(default)]
    pub scope: String,

    /// ACME settings; an issuer without them cannot be used by this crate
    #[serde(default)]
    pub acme: Option<AcmeIssuerConfig>,
}

impl IssuerConfig {
    /// Resolve the scope that holds supplemental resources for this issuer.
    ///
    /// Namespaced issuers use their own scope. Cluster issuers, and any
    /// issuer without a scope, use `cluster_scope`.
    pub fn resource_scope<'a>(&'a self, cluster_scope: &'a str) -> &'a str {
        match self.kind {
            IssuerKind::Namespaced if !self.scope.is_empty() => &self.scope,
            _ => cluster_scope,
        }
    }
}

/// ACME issuer settings.
///
/// These are the only keys recognised by the issuer; anything else in the
/// block is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcmeIssuerConfig {
    /// ACME directory URL
    #[serde(default)]
    pub server: String,

    /// Account contact email
    #[serde(default)]
    pub email: String,

    /// Credential holding the ACME account key
    #[serde(default)]
    pub private_key_ref: SecretKeySelector,

    /// Disable TLS verification for the ACME server connection only
    #[serde(default, rename = "skipTLSVerify")]
    pub skip_tls_verify: bool,

    /// Allow solvers to draw credentials from the environment
    #[serde(default)]
    pub ambient_credentials: bool,

    /// Recursive resolvers used for DNS-01 propagation checks
    #[serde(default)]
    pub dns01_nameservers: Vec<String>,
}

/// Reference to one slot of a named credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    /// Credential name
    #[serde(default)]
    pub name: String,

    /// Slot within the credential; empty means [`DEFAULT_SECRET_KEY`]
    #[serde(default)]
    pub key: String,
}

impl SecretKeySelector {
    /// Create a selector for `name` using the default slot.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: String::new(),
        }
    }

    /// Create a selector with an explicit slot.
    pub fn with_key(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
        }
    }

    /// Slot to read, falling back to [`DEFAULT_SECRET_KEY`].
    pub fn key_or_default(&self) -> &str {
        if self.key.is_empty() {
            DEFAULT_SECRET_KEY
        } else {
            &self.key
        }
    }
}
