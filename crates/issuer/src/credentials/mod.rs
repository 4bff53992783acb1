//! Credential store access and account key resolution.

mod file;
mod memory;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rustls::crypto::aws_lc_rs::sign::any_ecdsa_type;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::SignatureScheme;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use certflow_config::SecretKeySelector;

use crate::error::{IssuerError, IssuerResult};

/// Errors from credential store backends.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid credential path component {0:?}")]
    InvalidName(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read access to named credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch the credential `name` in `scope`, or `None` if it does not exist.
    async fn get(&self, scope: &str, name: &str) -> Result<Option<Credential>, CredentialError>;
}

/// A named credential: a set of keyed byte slots.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    data: BTreeMap<String, Vec<u8>>,
}

impl Credential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.data.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }
}

// Values are secret material.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// An ACME account key in instant-acme's credentials format.
///
/// The credential slot holds the JSON document instant-acme produces when an
/// account is created: `{"id": ..., "key_pkcs8": ..., "directory": ...}`,
/// with the key as base64url PKCS#8 DER.
#[derive(Clone)]
pub struct AccountKey {
    account_url: String,
    key_pkcs8: String,
    directory: Option<String>,
}

#[derive(Deserialize)]
struct StoredAccount {
    id: String,
    key_pkcs8: String,
    #[serde(default)]
    directory: Option<String>,
}

impl AccountKey {
    /// Decode and validate stored account credentials.
    pub fn from_json(bytes: &[u8]) -> Result<Self, String> {
        let stored: StoredAccount =
            serde_json::from_slice(bytes).map_err(|e| format!("not account credentials JSON: {e}"))?;

        if stored.id.trim().is_empty() {
            return Err("account id is empty".to_string());
        }

        let der = URL_SAFE_NO_PAD
            .decode(stored.key_pkcs8.trim_end_matches('='))
            .map_err(|e| format!("key_pkcs8 is not base64url: {e}"))?;
        check_account_key(&der)?;

        Ok(Self {
            account_url: stored.id,
            key_pkcs8: URL_SAFE_NO_PAD.encode(&der),
            directory: stored.directory,
        })
    }

    /// Account URL assigned by the ACME server
    pub fn account_url(&self) -> &str {
        &self.account_url
    }

    /// Directory URL the account was registered against, if recorded
    pub fn directory(&self) -> Option<&str> {
        self.directory.as_deref()
    }

    /// Credentials JSON bound to `directory`
    pub fn to_credentials_json(&self, directory: &str) -> serde_json::Value {
        serde_json::json!({
            "id": self.account_url,
            "key_pkcs8": self.key_pkcs8,
            "directory": directory,
        })
    }
}

/// ACME accounts sign with ECDSA P-256; anything else fails on first use.
fn check_account_key(der: &[u8]) -> Result<(), String> {
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der.to_vec()));
    let signer = any_ecdsa_type(&key)
        .map_err(|e| format!("key_pkcs8 is not a PKCS#8 ECDSA private key: {e}"))?;
    if signer
        .choose_scheme(&[SignatureScheme::ECDSA_NISTP256_SHA256])
        .is_none()
    {
        return Err("key_pkcs8 is an ECDSA key but not on curve P-256".to_string());
    }
    Ok(())
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("account_url", &self.account_url)
            .field("directory", &self.directory)
            .field("key_pkcs8", &"<redacted>")
            .finish()
    }
}

/// Resolve the account key referenced by `selector` in `scope`.
///
/// An empty selector key reads the `tls.key` slot.
pub async fn resolve_account_key(
    store: &dyn CredentialStore,
    scope: &str,
    selector: &SecretKeySelector,
) -> IssuerResult<AccountKey> {
    let slot = selector.key_or_default();
    info!(
        scope = %scope,
        name = %selector.name,
        slot = %slot,
        "Resolving ACME account key"
    );

    let not_found = || IssuerError::CredentialNotFound {
        scope: scope.to_string(),
        name: selector.name.clone(),
        key: slot.to_string(),
    };

    let credential = store
        .get(scope, &selector.name)
        .await
        .map_err(|e| IssuerError::CredentialStore(e.to_string()))?
        .ok_or_else(not_found)?;

    let bytes = credential.get(slot).ok_or_else(not_found)?;

    let key = AccountKey::from_json(bytes).map_err(|reason| IssuerError::CredentialMalformed {
        scope: scope.to_string(),
        name: selector.name.clone(),
        key: slot.to_string(),
        reason,
    })?;

    debug!(account = %key.account_url(), "Account key decoded");
    Ok(key)
}
