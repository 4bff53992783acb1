//! Diagnostic wrapper for protocol clients.

use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, warn};

use super::{AcmeClient, ClientError};
use crate::order::{Order, OrderStatus};

/// Logs every ACME operation and its outcome, passing results through
/// untouched.
pub struct LoggingClient<C> {
    inner: C,
}

impl<C> LoggingClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: AcmeClient> AcmeClient for LoggingClient<C> {
    async fn create_order(&self, identifiers: &[String]) -> Result<Order, ClientError> {
        debug!(identifiers = ?identifiers, "ACME request: new-order");
        let start = Instant::now();

        let result = self.inner.create_order(identifiers).await;
        match &result {
            Ok(order) => debug!(
                order = %order.url,
                authorizations = order.authorizations.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "ACME response: new-order"
            ),
            Err(e) => warn!(
                error = %e,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "ACME request failed: new-order"
            ),
        }
        result
    }

    async fn set_challenge_ready(
        &self,
        order_url: &str,
        challenge_url: &str,
    ) -> Result<(), ClientError> {
        debug!(order = %order_url, challenge = %challenge_url, "ACME request: challenge ready");

        let result = self.inner.set_challenge_ready(order_url, challenge_url).await;
        if let Err(e) = &result {
            warn!(
                challenge = %challenge_url,
                error = %e,
                "ACME request failed: challenge ready"
            );
        }
        result
    }

    async fn order_status(&self, order_url: &str) -> Result<OrderStatus, ClientError> {
        let result = self.inner.order_status(order_url).await;
        match &result {
            Ok(status) => debug!(order = %order_url, status = ?status, "ACME response: order"),
            Err(e) => warn!(order = %order_url, error = %e, "ACME request failed: order"),
        }
        result
    }

    async fn forget_order(&self, order_url: &str) {
        debug!(order = %order_url, "Forgetting ACME order");
        self.inner.forget_order(order_url).await;
    }
}
