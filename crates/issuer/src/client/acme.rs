//! instant-acme backed protocol client.

use async_trait::async_trait;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus as AcmeAuthorizationStatus,
    ChallengeType as AcmeChallengeType, Identifier, NewOrder, OrderStatus as AcmeOrderStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tracing::{debug, info};

use certflow_config::AcmeIssuerConfig;

use super::transport::{build_http_client, TimeoutHttpClient, TransportSettings};
use super::{AcmeClient, ClientError, ClientFactory, LoggingClient};
use crate::credentials::AccountKey;
use crate::order::{Authorization, AuthorizationStatus, Challenge, Order, OrderStatus};

/// Protocol client talking to an ACME server through instant-acme.
///
/// The account is loaded on first use, so construction never touches the
/// network. Orders created through this client are kept so that challenges
/// can later be marked ready; they are dropped once the order reaches a
/// final status or is forgotten by the caller.
pub struct AcmeHttpClient {
    server: String,
    credentials: serde_json::Value,
    http: TimeoutHttpClient,
    account: OnceCell<Account>,
    orders: OrderTable<instant_acme::Order>,
}

/// Live orders keyed by order URL.
struct OrderTable<T> {
    entries: Mutex<HashMap<String, T>>,
}

impl<T> OrderTable<T> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn insert(&self, url: String, order: T) {
        self.entries.lock().await.insert(url, order);
    }

    async fn remove(&self, url: &str) -> bool {
        self.entries.lock().await.remove(url).is_some()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn lock(&self) -> MutexGuard<'_, HashMap<String, T>> {
        self.entries.lock().await
    }

    /// Drops the order once `status` can no longer change.
    async fn settle(&self, url: &str, status: OrderStatus) -> bool {
        status.is_final() && self.remove(url).await
    }
}

impl AcmeHttpClient {
    pub(crate) fn new(
        key: &AccountKey,
        server: &str,
        settings: &TransportSettings,
    ) -> Result<Self, ClientError> {
        let credentials = key.to_credentials_json(server);
        // Fail here rather than on first request if instant-acme rejects the key
        parse_credentials(&credentials)?;

        Ok(Self {
            server: server.to_string(),
            credentials,
            http: build_http_client(settings)?,
            account: OnceCell::new(),
            orders: OrderTable::new(),
        })
    }

    /// Directory URL this client is bound to
    pub fn server(&self) -> &str {
        &self.server
    }

    async fn account(&self) -> Result<&Account, ClientError> {
        self.account
            .get_or_try_init(|| async {
                let credentials = parse_credentials(&self.credentials)?;
                info!(server = %self.server, "Loading ACME account");
                Account::from_credentials_and_http(credentials, Box::new(self.http.clone()))
                    .await
                    .map_err(|e| ClientError::Account(e.to_string()))
            })
            .await
    }
}

fn parse_credentials(json: &serde_json::Value) -> Result<AccountCredentials, ClientError> {
    serde_json::from_value(json.clone()).map_err(|e| ClientError::Account(e.to_string()))
}

#[async_trait]
impl AcmeClient for AcmeHttpClient {
    async fn create_order(&self, identifiers: &[String]) -> Result<Order, ClientError> {
        let account = self.account().await?;

        let ids: Vec<Identifier> = identifiers
            .iter()
            .map(|d| Identifier::Dns(d.clone()))
            .collect();
        let mut order = account.new_order(&NewOrder { identifiers: &ids }).await?;
        let url = order.url().to_string();

        let mut authorizations = Vec::new();
        for authz in order.authorizations().await? {
            let Identifier::Dns(domain) = &authz.identifier;
            let challenges = authz
                .challenges
                .iter()
                .map(|ch| Challenge {
                    challenge_type: challenge_tag(&ch.r#type),
                    url: ch.url.clone(),
                    token: ch.token.clone(),
                    key_authorization: order.key_authorization(ch).as_str().to_string(),
                    domain: domain.clone(),
                })
                .collect();

            authorizations.push(Authorization {
                identifier: domain.clone(),
                status: authorization_status(&authz.status),
                challenges,
            });
        }

        debug!(order = %url, authorizations = authorizations.len(), "Fetched authorizations");
        self.orders.insert(url.clone(), order).await;

        Ok(Order {
            url,
            identifiers: identifiers.to_vec(),
            authorizations,
        })
    }

    async fn set_challenge_ready(
        &self,
        order_url: &str,
        challenge_url: &str,
    ) -> Result<(), ClientError> {
        let mut orders = self.orders.lock().await;
        let order = orders.get_mut(order_url).ok_or_else(|| unknown_order(order_url))?;
        order.set_challenge_ready(challenge_url).await?;
        Ok(())
    }

    async fn order_status(&self, order_url: &str) -> Result<OrderStatus, ClientError> {
        let status = {
            let mut orders = self.orders.lock().await;
            let order = orders.get_mut(order_url).ok_or_else(|| unknown_order(order_url))?;
            order.refresh().await?;
            order_status(&order.state().status)
        };
        if self.orders.settle(order_url, status).await {
            debug!(order = %order_url, status = ?status, "Dropped settled order");
        }
        Ok(status)
    }

    async fn forget_order(&self, order_url: &str) {
        if self.orders.remove(order_url).await {
            debug!(order = %order_url, "Dropped order");
        }
    }
}

fn unknown_order(url: &str) -> ClientError {
    ClientError::Protocol(format!("unknown order {url}"))
}

fn order_status(status: &AcmeOrderStatus) -> OrderStatus {
    match status {
        AcmeOrderStatus::Pending => OrderStatus::Pending,
        AcmeOrderStatus::Ready => OrderStatus::Ready,
        AcmeOrderStatus::Processing => OrderStatus::Processing,
        AcmeOrderStatus::Valid => OrderStatus::Valid,
        AcmeOrderStatus::Invalid => OrderStatus::Invalid,
    }
}

fn challenge_tag(challenge_type: &AcmeChallengeType) -> String {
    match challenge_type {
        AcmeChallengeType::Http01 => "http-01".to_string(),
        AcmeChallengeType::Dns01 => "dns-01".to_string(),
        AcmeChallengeType::TlsAlpn01 => "tls-alpn-01".to_string(),
        #[allow(unreachable_patterns)]
        other => format!("{other:?}").to_ascii_lowercase(),
    }
}

fn authorization_status(status: &AcmeAuthorizationStatus) -> AuthorizationStatus {
    match status {
        AcmeAuthorizationStatus::Pending => AuthorizationStatus::Pending,
        AcmeAuthorizationStatus::Valid => AuthorizationStatus::Valid,
        AcmeAuthorizationStatus::Invalid => AuthorizationStatus::Invalid,
        _ => AuthorizationStatus::Other,
    }
}

/// Builds [`AcmeHttpClient`]s wrapped in [`LoggingClient`].
#[derive(Debug, Clone, Default)]
pub struct InstantClientFactory {
    settings: TransportSettings,
}

impl InstantClientFactory {
    pub fn new(settings: TransportSettings) -> Self {
        Self { settings }
    }
}

impl ClientFactory for InstantClientFactory {
    fn build(
        &self,
        key: &AccountKey,
        config: &AcmeIssuerConfig,
    ) -> Result<Arc<dyn AcmeClient>, ClientError> {
        let settings = self.settings.with_skip_tls_verify(config.skip_tls_verify);
        let client = AcmeHttpClient::new(key, &config.server, &settings)?;
        debug!(server = %config.server, "Built ACME protocol client");
        Ok(Arc::new(LoggingClient::new(client)))
    }
}
