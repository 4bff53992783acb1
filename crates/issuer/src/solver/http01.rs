//! HTTP-01 challenge solver
//!
//! Pending challenges are held by a [`ChallengeResponder`], which answers
//! `/.well-known/acme-challenge/<token>` either through its own listener
//! ([`ChallengeResponder::serve`]) or through whatever front end embeds it
//! ([`ChallengeResponder::respond`]). Readiness is checked by fetching the
//! token URL the same way the CA will.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use certflow_config::Http01Config;

use super::Solver;
use crate::certificate::Certificate;
use crate::error::SolverError;
use crate::order::Challenge;

/// HTTP-01 challenge path prefix
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Time allowed to serve one connection
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct PendingChallenge {
    key_authorization: String,
    /// `scope/name` of the certificate that presented this token
    owner: String,
}

/// Token -> key authorization map for pending HTTP-01 challenges.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct ChallengeResponder {
    challenges: Arc<DashMap<String, PendingChallenge>>,
}

impl ChallengeResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending challenge owned by `owner`
    pub fn add_challenge(&self, token: &str, key_authorization: &str, owner: &str) {
        debug!(token = %token, owner = %owner, "Registering ACME HTTP-01 challenge");
        self.challenges.insert(
            token.to_string(),
            PendingChallenge {
                key_authorization: key_authorization.to_string(),
                owner: owner.to_string(),
            },
        );
    }

    /// Remove a challenge if `owner` presented it.
    ///
    /// Returns whether an entry was removed.
    pub fn remove_challenge(&self, token: &str, owner: &str) -> bool {
        let removed = self
            .challenges
            .remove_if(token, |_, pending| pending.owner == owner)
            .is_some();
        if removed {
            debug!(token = %token, owner = %owner, "Removed ACME challenge");
        } else if let Some(pending) = self.challenges.get(token) {
            warn!(
                token = %token,
                owner = %owner,
                actual_owner = %pending.owner,
                "Not removing ACME challenge owned by another certificate"
            );
        }
        removed
    }

    /// Key authorization for a token, if pending
    pub fn get_response(&self, token: &str) -> Option<String> {
        let result = self
            .challenges
            .get(token)
            .map(|p| p.key_authorization.clone());
        trace!(token = %token, found = result.is_some(), "ACME challenge lookup");
        result
    }

    /// Token from a challenge request path
    pub fn extract_token(path: &str) -> Option<&str> {
        path.strip_prefix(ACME_CHALLENGE_PREFIX)
            .filter(|token| !token.is_empty() && !token.contains('/'))
    }

    /// Response body for a request path, if it names a pending challenge
    pub fn respond(&self, path: &str) -> Option<String> {
        Self::extract_token(path).and_then(|token| self.get_response(token))
    }

    pub fn pending_count(&self) -> usize {
        self.challenges.len()
    }

    /// Serve challenge responses on `listener` until `cancel` fires.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "HTTP-01 challenge responder listening");
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("HTTP-01 challenge responder shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Error accepting connection");
                            continue;
                        }
                    };

                    let responder = self.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let responder = responder.clone();
                            async move { Ok::<_, hyper::Error>(responder.handle(req, remote)) }
                        });
                        let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
                        match tokio::time::timeout(CONNECTION_TIMEOUT, conn).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => debug!(remote = %remote, error = %e, "Error serving connection"),
                            Err(_) => debug!(remote = %remote, "Connection timed out"),
                        }
                    });
                }
            }
        }
    }

    fn handle<B>(&self, req: Request<B>, remote: SocketAddr) -> Response<Full<Bytes>> {
        if req.method() != Method::GET {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
        }

        let path = req.uri().path();
        match self.respond(path) {
            Some(key_authorization) => {
                info!(path = %path, remote = %remote, "Serving ACME challenge response");
                text_response(StatusCode::OK, key_authorization)
            }
            None => {
                debug!(path = %path, remote = %remote, "Unknown ACME challenge path");
                text_response(StatusCode::NOT_FOUND, "Not found")
            }
        }
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Solves HTTP-01 challenges through a [`ChallengeResponder`].
pub struct Http01Solver {
    responder: ChallengeResponder,
    client: reqwest::Client,
    self_check_port: u16,
}

impl Http01Solver {
    pub fn new(responder: ChallengeResponder, config: &Http01Config) -> Result<Self, SolverError> {
        let client = reqwest::Client::builder()
            .timeout(config.self_check_timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| SolverError::Config(format!("failed to build self-check client: {e}")))?;

        Ok(Self {
            responder,
            client,
            self_check_port: config.self_check_port,
        })
    }

    pub fn responder(&self) -> &ChallengeResponder {
        &self.responder
    }

    fn self_check_url(&self, challenge: &Challenge) -> String {
        if self.self_check_port == 80 {
            format!("http://{}{}{}", challenge.domain, ACME_CHALLENGE_PREFIX, challenge.token)
        } else {
            format!(
                "http://{}:{}{}{}",
                challenge.domain, self.self_check_port, ACME_CHALLENGE_PREFIX, challenge.token
            )
        }
    }
}

#[async_trait]
impl Solver for Http01Solver {
    async fn present(
        &self,
        certificate: &Certificate,
        challenge: &Challenge,
    ) -> Result<(), SolverError> {
        self.responder.add_challenge(
            &challenge.token,
            &challenge.key_authorization,
            &certificate.key(),
        );
        Ok(())
    }

    async fn check(&self, challenge: &Challenge) -> Result<bool, SolverError> {
        let url = self.self_check_url(challenge);
        let url = reqwest::Url::parse(&url)
            .map_err(|e| SolverError::Check(format!("invalid self-check URL {url}: {e}")))?;

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %url, error = %e, "HTTP-01 self-check not reachable yet");
                return Ok(false);
            }
        };

        if !response.status().is_success() {
            debug!(url = %url, status = %response.status(), "HTTP-01 self-check pending");
            return Ok(false);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(url = %url, error = %e, "HTTP-01 self-check body unreadable");
                return Ok(false);
            }
        };

        let ready = body.trim() == challenge.key_authorization;
        if !ready {
            debug!(url = %url, "HTTP-01 self-check returned unexpected content");
        }
        Ok(ready)
    }

    async fn clean_up(
        &self,
        certificate: &Certificate,
        challenge: &Challenge,
    ) -> Result<(), SolverError> {
        self.responder
            .remove_challenge(&challenge.token, &certificate.key());
        Ok(())
    }
}
