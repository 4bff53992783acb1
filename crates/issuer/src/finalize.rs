//! Hand-off point once every challenge of an order is ready.
//!
//! The orchestrator calls [`OrderFinalizer::finalize`] after all challenges
//! pass their checks and before any clean-up, so the finalizer can let the CA
//! validate while the proofs are still in place.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::client::AcmeClient;
use crate::error::{IssuerError, IssuerResult};
use crate::order::{Challenge, Order, OrderStatus};

/// Caller-supplied step run while challenge proofs are live.
#[async_trait]
pub trait OrderFinalizer: Send + Sync {
    async fn finalize(
        &self,
        client: &dyn AcmeClient,
        order: &Order,
        ready: &[Challenge],
    ) -> IssuerResult<()>;
}

/// Does nothing; the caller finalizes the order some other way.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFinalizer;

#[async_trait]
impl OrderFinalizer for NoopFinalizer {
    async fn finalize(&self, _: &dyn AcmeClient, _: &Order, _: &[Challenge]) -> IssuerResult<()> {
        Ok(())
    }
}

/// Marks each challenge ready at the CA and waits for the order to leave
/// `pending`.
#[derive(Debug, Clone, Copy)]
pub struct ReadyNotifier {
    interval: Duration,
    timeout: Duration,
}

impl ReadyNotifier {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

#[async_trait]
impl OrderFinalizer for ReadyNotifier {
    async fn finalize(
        &self,
        client: &dyn AcmeClient,
        order: &Order,
        ready: &[Challenge],
    ) -> IssuerResult<()> {
        for challenge in ready {
            client
                .set_challenge_ready(&order.url, &challenge.url)
                .await
                .map_err(|e| IssuerError::Finalize(e.to_string()))?;
            debug!(domain = %challenge.domain, "Challenge marked ready");
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            let status = client
                .order_status(&order.url)
                .await
                .map_err(|e| IssuerError::Finalize(e.to_string()))?;

            match status {
                OrderStatus::Invalid => {
                    return Err(IssuerError::Finalize(format!(
                        "order {} became invalid",
                        order.url
                    )))
                }
                s if s.is_settled() => {
                    info!(order = %order.url, status = ?s, "Order validated");
                    return Ok(());
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(IssuerError::Finalize(format!(
                    "order {} still pending after {:?}",
                    order.url, self.timeout
                )));
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
