//! ACME protocol client abstraction.
//!
//! The orchestrator talks to the CA through [`AcmeClient`] and obtains one
//! through an injected [`ClientFactory`]. The production implementation is
//! [`InstantClientFactory`], backed by instant-acme.

mod acme;
mod logging;
mod transport;

pub use acme::{AcmeHttpClient, InstantClientFactory};
pub use logging::LoggingClient;
pub use transport::{
    TransportSettings, DIAL_TIMEOUT, IDLE_TIMEOUT, MAX_IDLE_PER_HOST, REQUEST_TIMEOUT,
    TLS_HANDSHAKE_TIMEOUT,
};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use certflow_config::AcmeIssuerConfig;

use crate::credentials::AccountKey;
use crate::order::{Order, OrderStatus};

/// Errors from the protocol client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The CA answered with an error or an unexpected response
    #[error("ACME protocol error: {0}")]
    Protocol(String),

    /// The account could not be loaded from its credentials
    #[error("ACME account error: {0}")]
    Account(String),

    /// TLS configuration could not be built
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

impl From<instant_acme::Error> for ClientError {
    fn from(err: instant_acme::Error) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

/// ACME protocol operations used by the orchestrator.
#[async_trait]
pub trait AcmeClient: Send + Sync {
    /// Create an order for the given DNS identifiers and fetch its
    /// authorizations.
    async fn create_order(&self, identifiers: &[String]) -> Result<Order, ClientError>;

    /// Tell the CA a challenge is ready for validation.
    async fn set_challenge_ready(&self, order_url: &str, challenge_url: &str)
        -> Result<(), ClientError>;

    /// Refresh and return the status of an order created by this client.
    async fn order_status(&self, order_url: &str) -> Result<OrderStatus, ClientError>;

    /// Drop any state held for an order. Unknown orders are ignored.
    async fn forget_order(&self, _order_url: &str) {}
}

/// Builds a protocol client bound to an account key.
///
/// Implementations must not perform network I/O; the first request happens
/// on first use of the returned client.
pub trait ClientFactory: Send + Sync {
    fn build(
        &self,
        key: &AccountKey,
        config: &AcmeIssuerConfig,
    ) -> Result<Arc<dyn AcmeClient>, ClientError>;
}
