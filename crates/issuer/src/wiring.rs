//! Builds an [`AcmeIssuer`] and its solvers from a loaded configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

use certflow_config::{parse_nameserver, validate_issuer, CertflowConfig};

use crate::client::ClientFactory;
use crate::credentials::CredentialStore;
use crate::error::{IssuerError, IssuerResult};
use crate::events::EventRecorder;
use crate::issuer::{AcmeIssuer, IssuerDeps};
use crate::solver::dns01::{resolve_webhook_token, DnsProvider};
use crate::solver::{ChallengeResponder, Dns01Solver, Http01Solver, SolverRegistry, WebhookDnsProvider};

/// An issuer together with the HTTP-01 responder its solver publishes to.
pub struct BuiltIssuer {
    pub issuer: AcmeIssuer,
    /// Serve this (or embed it in a front end) for HTTP-01 to succeed
    pub responder: ChallengeResponder,
}

/// Build an issuer from configuration.
///
/// The configuration is validated before any credential is read. Ambient
/// credentials are only used for DNS-01, and only when both the issuer and
/// the controller policy for the issuer's kind allow them.
pub async fn build_issuer(
    config: &CertflowConfig,
    credentials: Arc<dyn CredentialStore>,
    recorder: Arc<dyn EventRecorder>,
    client_factory: Arc<dyn ClientFactory>,
) -> IssuerResult<BuiltIssuer> {
    let scope = config.resource_scope().to_string();
    let acme = validate_issuer(&config.issuer, &scope)?;

    let nameservers: Vec<SocketAddr> = acme
        .dns01_nameservers
        .iter()
        .filter_map(|ns| parse_nameserver(ns))
        .collect();

    let responder = ChallengeResponder::new();
    let http01 = Http01Solver::new(responder.clone(), &config.solvers.http01)
        .map_err(IssuerError::SolverSetup)?;

    let ambient = config.ambient_credentials_allowed();
    let provider: Option<Arc<dyn DnsProvider>> = match &config.solvers.dns01.webhook {
        Some(webhook) => {
            let token = resolve_webhook_token(credentials.as_ref(), &scope, webhook, ambient)
                .await
                .map_err(IssuerError::SolverSetup)?;
            let provider =
                WebhookDnsProvider::new(webhook, token).map_err(IssuerError::SolverSetup)?;
            Some(Arc::new(provider))
        }
        None => {
            debug!("No DNS-01 provider configured");
            None
        }
    };
    let dns01 = Dns01Solver::new(provider, &nameservers);

    info!(
        issuer = %config.issuer.name,
        scope = %scope,
        ambient_credentials = ambient,
        nameservers = nameservers.len(),
        "Wiring ACME issuer"
    );

    let issuer = AcmeIssuer::new(IssuerDeps {
        issuer: config.issuer.clone(),
        resource_scope: scope,
        polling: config.polling.clone(),
        credentials,
        client_factory,
        recorder,
        solvers: SolverRegistry::new(Arc::new(http01), Arc::new(dns01)),
    })?;

    Ok(BuiltIssuer { issuer, responder })
}
