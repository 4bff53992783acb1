//! DNS-01 challenge solver
//!
//! The solver publishes a TXT record at `_acme-challenge.<domain>` through a
//! [`DnsProvider`] and considers the challenge ready once every configured
//! nameserver returns the expected digest. Without configured nameservers
//! the system resolver is asked instead.
//!
//! # Challenge Flow
//!
//! 1. Digest is `base64url(sha256(key_authorization))`
//! 2. `present` creates the TXT record via the provider
//! 3. `check` queries the record at each configured nameserver in turn
//! 4. `clean_up` deletes the record that `present` created

mod webhook;

pub use webhook::{resolve_webhook_token, WebhookDnsProvider, AMBIENT_TOKEN_ENV};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use hickory_resolver::config::{
    NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts,
};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::Solver;
use crate::certificate::Certificate;
use crate::error::SolverError;
use crate::order::Challenge;

/// A TXT record created by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    /// Provider-specific identifier used for deletion
    pub record_id: String,
    /// Fully qualified record name
    pub name: String,
}

/// Backend that can create and delete TXT records.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn create_txt_record(&self, name: &str, content: &str)
        -> Result<DnsRecord, SolverError>;

    /// Delete a record. Deleting a record that no longer exists succeeds.
    async fn delete_txt_record(&self, record: &DnsRecord) -> Result<(), SolverError>;

    fn name(&self) -> &'static str;
}

/// Compute the DNS-01 TXT record value for a key authorization
pub fn compute_dns01_digest(key_authorization: &str) -> String {
    let hash = Sha256::digest(key_authorization.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Record name for a domain's DNS-01 challenge
///
/// Wildcard identifiers are validated at their base domain.
pub fn challenge_record_name(domain: &str) -> String {
    let domain = domain.strip_prefix("*.").unwrap_or(domain);
    format!("_acme-challenge.{}", domain.trim_end_matches('.'))
}

/// Solves DNS-01 challenges through a [`DnsProvider`].
pub struct Dns01Solver {
    provider: Option<Arc<dyn DnsProvider>>,
    /// One resolver per configured nameserver, or the system resolver
    resolvers: Vec<Resolver>,
    /// Records created by `present`, keyed by (owner, token)
    records: DashMap<(String, String), DnsRecord>,
}

impl Dns01Solver {
    /// Create a solver querying `nameservers`, or the system resolver when
    /// the list is empty.
    ///
    /// Without a provider `present` fails; this is how a deployment that
    /// only uses HTTP-01 is represented.
    pub fn new(provider: Option<Arc<dyn DnsProvider>>, nameservers: &[SocketAddr]) -> Self {
        Self {
            provider,
            resolvers: build_resolvers(nameservers),
            records: DashMap::new(),
        }
    }

    fn provider(&self) -> Result<&Arc<dyn DnsProvider>, SolverError> {
        self.provider
            .as_ref()
            .ok_or_else(|| SolverError::Config("no DNS-01 provider configured".to_string()))
    }

    /// Number of records currently owned by this solver
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

struct Resolver {
    /// Nameserver address, or "system"
    label: String,
    inner: TokioAsyncResolver,
}

fn build_resolvers(nameservers: &[SocketAddr]) -> Vec<Resolver> {
    let mut opts = ResolverOpts::default();
    // Propagation checks must see fresh answers
    opts.cache_size = 0;

    if nameservers.is_empty() {
        let inner = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!(error = %e, "Failed to read system resolver config, using defaults");
                TokioAsyncResolver::tokio(ResolverConfig::default(), opts)
            }
        };
        return vec![Resolver {
            label: "system".to_string(),
            inner,
        }];
    }

    nameservers
        .iter()
        .map(|addr| {
            let servers = NameServerConfigGroup::from(vec![
                NameServerConfig::new(*addr, Protocol::Udp),
                NameServerConfig::new(*addr, Protocol::Tcp),
            ]);
            let config = ResolverConfig::from_parts(None, vec![], servers);
            Resolver {
                label: addr.to_string(),
                inner: TokioAsyncResolver::tokio(config, opts.clone()),
            }
        })
        .collect()
}

impl Resolver {
    /// Whether this nameserver answers `name` with `expected`.
    async fn sees_digest(&self, name: &str, expected: &str) -> Result<bool, SolverError> {
        let lookup = match self.inner.txt_lookup(name).await {
            Ok(lookup) => lookup,
            Err(e) => {
                return match e.kind() {
                    ResolveErrorKind::NoRecordsFound { .. } | ResolveErrorKind::Timeout => {
                        debug!(
                            record = %name,
                            nameserver = %self.label,
                            error = %e,
                            "DNS-01 record not visible yet"
                        );
                        Ok(false)
                    }
                    _ => Err(SolverError::Check(format!(
                        "TXT lookup for {name} at {} failed: {e}",
                        self.label
                    ))),
                };
            }
        };

        let found = lookup.iter().any(|txt| {
            let value: String = txt
                .txt_data()
                .iter()
                .map(|part| String::from_utf8_lossy(part))
                .collect();
            value == expected
        });
        if !found {
            debug!(
                record = %name,
                nameserver = %self.label,
                "DNS-01 record present but digest not propagated"
            );
        }
        Ok(found)
    }
}

#[async_trait]
impl Solver for Dns01Solver {
    async fn present(
        &self,
        certificate: &Certificate,
        challenge: &Challenge,
    ) -> Result<(), SolverError> {
        let provider = self.provider()?;
        let name = challenge_record_name(&challenge.domain);
        let digest = compute_dns01_digest(&challenge.key_authorization);

        let record = provider.create_txt_record(&name, &digest).await?;
        info!(
            provider = provider.name(),
            record = %record.name,
            record_id = %record.record_id,
            certificate = %certificate.key(),
            "Presented DNS-01 challenge record"
        );
        self.records
            .insert((certificate.key(), challenge.token.clone()), record);
        Ok(())
    }

    async fn check(&self, challenge: &Challenge) -> Result<bool, SolverError> {
        let name = format!("{}.", challenge_record_name(&challenge.domain));
        let expected = compute_dns01_digest(&challenge.key_authorization);

        for resolver in &self.resolvers {
            if !resolver.sees_digest(&name, &expected).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn clean_up(
        &self,
        certificate: &Certificate,
        challenge: &Challenge,
    ) -> Result<(), SolverError> {
        let key = (certificate.key(), challenge.token.clone());
        let Some((_, record)) = self.records.remove(&key) else {
            debug!(domain = %challenge.domain, "No DNS-01 record to clean up");
            return Ok(());
        };

        let provider = self.provider()?;
        if let Err(e) = provider.delete_txt_record(&record).await {
            // Keep the record so a later clean-up can retry
            self.records.insert(key, record);
            return Err(e);
        }

        debug!(record = %record.name, "Cleaned up DNS-01 challenge record");
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.provider.is_some()
    }
}
