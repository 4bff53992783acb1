//! End-to-end tests for the issuance orchestrator with in-memory doubles.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use certflow_config::{
    AcmeIssuerConfig, ConfigError, IssuerConfig, PollingConfig, SecretKeySelector,
};
use certflow_issuer::{
    AccountKey, AcmeClient, AcmeIssuer, Authorization, AuthorizationStatus, Certificate,
    Challenge, ChallengeType, ClientError, ClientFactory, Credential, IssuerDeps, IssuerError,
    MemoryCredentialStore, MemoryRecorder, NoopFinalizer, Order, OrderFinalizer, OrderStatus,
    Severity, Solver, SolverError, SolverPhase, SolverRegistry,
};

// ============================================================================
// Doubles
// ============================================================================

struct FakeClient {
    fail: bool,
    calls: Mutex<Vec<Vec<String>>>,
    forgotten: Mutex<Vec<String>>,
}

#[async_trait]
impl AcmeClient for FakeClient {
    async fn create_order(&self, identifiers: &[String]) -> Result<Order, ClientError> {
        self.calls.lock().push(identifiers.to_vec());
        if self.fail {
            return Err(ClientError::Protocol("rateLimited".to_string()));
        }

        let authorizations = identifiers
            .iter()
            .map(|domain| Authorization {
                identifier: domain.clone(),
                status: AuthorizationStatus::Pending,
                challenges: ["http-01", "dns-01"]
                    .iter()
                    .map(|tag| Challenge {
                        challenge_type: tag.to_string(),
                        url: format!("https://ca.example/chall/{domain}/{tag}"),
                        token: format!("{domain}-{tag}"),
                        key_authorization: format!("{domain}-{tag}.thumbprint"),
                        domain: domain.clone(),
                    })
                    .collect(),
            })
            .collect();

        Ok(Order {
            url: "https://ca.example/acme/order/1".to_string(),
            identifiers: identifiers.to_vec(),
            authorizations,
        })
    }

    async fn set_challenge_ready(&self, _: &str, _: &str) -> Result<(), ClientError> {
        Ok(())
    }

    async fn order_status(&self, _: &str) -> Result<OrderStatus, ClientError> {
        Ok(OrderStatus::Ready)
    }

    async fn forget_order(&self, order_url: &str) {
        self.forgotten.lock().push(order_url.to_string());
    }
}

#[derive(Default)]
struct FakeFactory {
    fail_orders: bool,
    builds: AtomicUsize,
    accounts: Mutex<Vec<String>>,
    client: Mutex<Option<Arc<FakeClient>>>,
}

impl FakeFactory {
    fn order_calls(&self) -> Vec<Vec<String>> {
        self.client
            .lock()
            .as_ref()
            .map(|c| c.calls.lock().clone())
            .unwrap_or_default()
    }

    fn forgotten_orders(&self) -> Vec<String> {
        self.client
            .lock()
            .as_ref()
            .map(|c| c.forgotten.lock().clone())
            .unwrap_or_default()
    }
}

impl ClientFactory for FakeFactory {
    fn build(
        &self,
        key: &AccountKey,
        _config: &AcmeIssuerConfig,
    ) -> Result<Arc<dyn AcmeClient>, ClientError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.accounts.lock().push(key.account_url().to_string());
        let client = Arc::new(FakeClient {
            fail: self.fail_orders,
            calls: Mutex::new(vec![]),
            forgotten: Mutex::new(vec![]),
        });
        *self.client.lock() = Some(client.clone());
        Ok(client)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CheckBehavior {
    Ready,
    NeverReady,
    Error,
}

struct FakeSolver {
    check: CheckBehavior,
    fail_present_for: Option<String>,
    presents: Mutex<Vec<String>>,
    checks: AtomicUsize,
    clean_ups: Mutex<HashMap<String, usize>>,
}

impl FakeSolver {
    fn new(check: CheckBehavior) -> Self {
        Self {
            check,
            fail_present_for: None,
            presents: Mutex::new(vec![]),
            checks: AtomicUsize::new(0),
            clean_ups: Mutex::new(HashMap::new()),
        }
    }

    fn failing_present(mut self, domain: &str) -> Self {
        self.fail_present_for = Some(domain.to_string());
        self
    }

    fn presented(&self) -> Vec<String> {
        self.presents.lock().clone()
    }

    fn clean_ups(&self) -> HashMap<String, usize> {
        self.clean_ups.lock().clone()
    }
}

#[async_trait]
impl Solver for FakeSolver {
    async fn present(&self, _: &Certificate, challenge: &Challenge) -> Result<(), SolverError> {
        self.presents.lock().push(challenge.domain.clone());
        if self.fail_present_for.as_deref() == Some(challenge.domain.as_str()) {
            return Err(SolverError::Provider("zone not found".to_string()));
        }
        Ok(())
    }

    async fn check(&self, _: &Challenge) -> Result<bool, SolverError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        match self.check {
            CheckBehavior::Ready => Ok(true),
            CheckBehavior::NeverReady => Ok(false),
            CheckBehavior::Error => Err(SolverError::Check("resolver unreachable".to_string())),
        }
    }

    async fn clean_up(&self, _: &Certificate, challenge: &Challenge) -> Result<(), SolverError> {
        *self
            .clean_ups
            .lock()
            .entry(challenge.domain.clone())
            .or_default() += 1;
        Ok(())
    }
}

struct FailingFinalizer;

#[async_trait]
impl OrderFinalizer for FailingFinalizer {
    async fn finalize(
        &self,
        _: &dyn AcmeClient,
        _: &Order,
        _: &[Challenge],
    ) -> Result<(), IssuerError> {
        Err(IssuerError::Finalize("csr rejected".to_string()))
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Throwaway ECDSA P-256 account key, PKCS#8 DER in base64url
const P256_PKCS8: &str = "MIGHAgEAMBMGByqGSM49AgEGCCqGSM49AwEHBG0wawIBAQQgNgigBahG7kBmiMfQDJ_Qk6plEYJbh-ENB-n7brzaZFuhRANCAAQYad3lxbFuHOiqhMI8gnQULyLdAmZ_HBn1gSL41eI2cvYViDxN7iO5SraOBJEfcrXBJ-B3qhAm39hdkmem__hL";

/// Throwaway RSA key, which ACME accounts here cannot sign with
const RSA_PKCS8: &str = "MIICdgIBADANBgkqhkiG9w0BAQEFAASCAmAwggJcAgEAAoGBALGTHBaeEuvunMMSWA7VfqJF2yq12SRSbcvgQJEtzrcuTkzCsVkzWgurNs5p-J7ATfZQCevQ4rGoh2ekAqx_jg2WcFuwkc4B7h-nXpE5KI5UH7WyYqDuiE00wq8VYFcGLeBkFktS7OQ1NNvLIyyvcKzQJXrB8cWbG5K-phPr_v4pAgMBAAECgYB4vgCxWFahWiP5eDWsEHsEt98okXHOgsXphNgiXzVZ1QCkrRWOA57MpGSlweStfTEFtLKqR-R8zI0Vaa3vwOPDM32GVMsgh01lWwvo5kKRYRNMLjSFfdHQULNqdpqFJ40sW0m3TsNGpU4vCWwqj7UpPalNEMO7aHeah9QKH-fPAQJBANYdWA_7uFBv0fzYuebnV0dvcegQBx4Xh8zhBP1Z9bFcGOtrQ0ctklJHAy2_UA-94eFevkYRV7tlbc6KnqR9-FkCQQDUT-DnY2thYHMYwiONzAXpGfBj3aNq5jqHJXJJ6DucS1_POAo81s7bB-z0JCbqltsjzDlgJc1ui2WvZP3s8XpRAkEAkW_1NUYieGC8HieIfxN88YT9tkfMzd_l2oCuRvkoLoUEWETPujV2QnUB770XwNmV6OPWEvoMwbmv0K_P-qOmYQJATx7BepmDP9O4sMZQh5w7q6W9_wlux_yqXQjocYB5DoLMXqXMsuV-SwPGGymJ0yyK1-lYjGsqBoMuTtG9C1rmMQJACIKPDHyWM58tTEdcdT7yvLqRuARLdGbLntDN11XAMikg9BqHlERl55ZvXBE-8OiCcQ8sYA0oRDtsyyq9OrRiWg";

fn account_json_with_key(key_pkcs8: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": "https://ca.example/acme/acct/42",
        "key_pkcs8": key_pkcs8,
    }))
    .unwrap()
}

fn account_json() -> Vec<u8> {
    account_json_with_key(P256_PKCS8)
}

fn scenario_issuer_config() -> IssuerConfig {
    IssuerConfig {
        name: "letsencrypt".to_string(),
        scope: "default".to_string(),
        acme: Some(AcmeIssuerConfig {
            server: "https://ca.example/directory".to_string(),
            email: "a@b.com".to_string(),
            private_key_ref: SecretKeySelector::new("acct-key"),
            ..Default::default()
        }),
        ..Default::default()
    }
}

struct Harness {
    issuer: AcmeIssuer,
    factory: Arc<FakeFactory>,
    recorder: Arc<MemoryRecorder>,
    http01: Arc<FakeSolver>,
    dns01: Arc<FakeSolver>,
}

fn harness_with(
    config: IssuerConfig,
    factory: FakeFactory,
    http01: FakeSolver,
    dns01: FakeSolver,
    store: MemoryCredentialStore,
) -> Result<Harness, IssuerError> {
    let factory = Arc::new(factory);
    let recorder = Arc::new(MemoryRecorder::new());
    let http01 = Arc::new(http01);
    let dns01 = Arc::new(dns01);

    let issuer = AcmeIssuer::new(IssuerDeps {
        issuer: config,
        resource_scope: "default".to_string(),
        polling: PollingConfig {
            interval_millis: 2000,
            timeout_secs: 60,
            cleanup_grace_secs: 5,
        },
        credentials: Arc::new(store),
        client_factory: factory.clone(),
        recorder: recorder.clone(),
        solvers: SolverRegistry::new(http01.clone(), dns01.clone()),
    })?;

    Ok(Harness {
        issuer,
        factory,
        recorder,
        http01,
        dns01,
    })
}

fn store_with_key(slot: &str) -> MemoryCredentialStore {
    let store = MemoryCredentialStore::new();
    store.insert("default", "acct-key", Credential::new().with(slot, account_json()));
    store
}

fn harness(http01: FakeSolver, dns01: FakeSolver) -> Harness {
    harness_with(
        scenario_issuer_config(),
        FakeFactory::default(),
        http01,
        dns01,
        store_with_key("tls.key"),
    )
    .unwrap()
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_missing_required_fields_fail_construction() {
    for field in ["server", "email", "privateKeyRef.name"] {
        let mut config = scenario_issuer_config();
        let acme = config.acme.as_mut().unwrap();
        match field {
            "server" => acme.server.clear(),
            "email" => acme.email.clear(),
            _ => acme.private_key_ref.name.clear(),
        }

        let factory = FakeFactory::default();
        let result = harness_with(
            config,
            factory,
            FakeSolver::new(CheckBehavior::Ready),
            FakeSolver::new(CheckBehavior::Ready),
            store_with_key("tls.key"),
        );

        match result {
            Err(IssuerError::Config(ConfigError::MissingFields { fields })) => {
                assert_eq!(fields, vec![field]);
            }
            Err(other) => panic!("unexpected error for {field}: {other}"),
            Ok(_) => panic!("construction succeeded without {field}"),
        }
    }
}

#[test]
fn test_missing_acme_block_is_fatal() {
    let mut config = scenario_issuer_config();
    config.acme = None;
    let err = harness_with(
        config,
        FakeFactory::default(),
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
        MemoryCredentialStore::new(),
    )
    .err()
    .unwrap();
    assert!(err.is_fatal());
    assert!(!err.is_retryable());
}

// ============================================================================
// Account key and client
// ============================================================================

#[test]
fn test_zero_polling_interval_fails_construction() {
    let factory = Arc::new(FakeFactory::default());
    let err = AcmeIssuer::new(IssuerDeps {
        issuer: scenario_issuer_config(),
        resource_scope: "default".to_string(),
        polling: PollingConfig {
            interval_millis: 0,
            ..Default::default()
        },
        credentials: Arc::new(store_with_key("tls.key")),
        client_factory: factory.clone(),
        recorder: Arc::new(MemoryRecorder::new()),
        solvers: SolverRegistry::new(
            Arc::new(FakeSolver::new(CheckBehavior::Ready)),
            Arc::new(FakeSolver::new(CheckBehavior::Ready)),
        ),
    })
    .err()
    .unwrap();

    assert!(matches!(err, IssuerError::Config(ConfigError::Invalid(_))));
    assert!(err.is_fatal());
    assert!(err.to_string().contains("intervalMillis"));
    assert_eq!(factory.builds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_explicit_key_slot_overrides_default() {
    let mut config = scenario_issuer_config();
    config.acme.as_mut().unwrap().private_key_ref =
        SecretKeySelector::with_key("acct-key", "account.json");

    let h = harness_with(
        config,
        FakeFactory::default(),
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
        store_with_key("account.json"),
    )
    .unwrap();

    let cancel = CancellationToken::new();
    h.issuer.client(&cancel).await.unwrap();
    assert_eq!(
        *h.factory.accounts.lock(),
        vec!["https://ca.example/acme/acct/42"]
    );
}

#[tokio::test]
async fn test_missing_key_fails_without_building_client() {
    let h = harness_with(
        scenario_issuer_config(),
        FakeFactory::default(),
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
        store_with_key("account.json"),
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let mut crt = Certificate::new("default", "web", ["example.com"]);
    let err = h.issuer.create_order(&cancel, &mut crt).await.unwrap_err();

    assert!(matches!(err, IssuerError::CredentialNotFound { ref key, .. } if key == "tls.key"));
    assert_eq!(h.factory.builds.load(Ordering::SeqCst), 0);
    assert_eq!(crt.order_url(), None);
    assert!(h.recorder.is_empty());
}

#[tokio::test]
async fn test_unusable_account_key_is_a_credential_error() {
    let store = MemoryCredentialStore::new();
    store.insert(
        "default",
        "acct-key",
        Credential::new().with("tls.key", account_json_with_key(RSA_PKCS8)),
    );
    let h = harness_with(
        scenario_issuer_config(),
        FakeFactory::default(),
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
        store,
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let mut crt = Certificate::new("default", "web", ["example.com"]);
    let err = h.issuer.create_order(&cancel, &mut crt).await.unwrap_err();

    assert!(matches!(err, IssuerError::CredentialMalformed { .. }));
    assert!(err.is_fatal());
    assert_eq!(h.factory.builds.load(Ordering::SeqCst), 0);
    assert_eq!(crt.order_url(), None);
    assert!(h.recorder.is_empty());
}

#[tokio::test]
async fn test_client_is_built_once_and_reused() {
    let h = harness(
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
    );
    let cancel = CancellationToken::new();

    for name in ["a", "b", "c"] {
        let mut crt = Certificate::new("default", name, ["example.com"]);
        h.issuer.create_order(&cancel, &mut crt).await.unwrap();
    }

    assert_eq!(h.factory.builds.load(Ordering::SeqCst), 1);
    assert_eq!(h.factory.order_calls().len(), 3);
}

// ============================================================================
// Orders
// ============================================================================

#[tokio::test]
async fn test_scenario_order_sets_status() {
    let h = harness(
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
    );
    let cancel = CancellationToken::new();
    let mut crt = Certificate::new("default", "web", ["example.com"]);

    let order = h.issuer.create_order(&cancel, &mut crt).await.unwrap();

    assert_eq!(order.identifiers, vec!["example.com"]);
    assert_eq!(crt.order_url(), Some(order.url.as_str()));
    assert_eq!(crt.order_url(), Some("https://ca.example/acme/order/1"));
    assert!(h.recorder.is_empty());
}

#[tokio::test]
async fn test_order_identifiers_are_deduplicated() {
    let h = harness(
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
    );
    let cancel = CancellationToken::new();
    let mut crt = Certificate::new(
        "default",
        "web",
        ["www.example.com", "example.com", "WWW.example.com"],
    );

    h.issuer.create_order(&cancel, &mut crt).await.unwrap();
    assert_eq!(
        h.factory.order_calls(),
        vec![vec!["www.example.com".to_string(), "example.com".to_string()]]
    );
}

#[tokio::test]
async fn test_failed_order_emits_one_warning() {
    let h = harness_with(
        scenario_issuer_config(),
        FakeFactory {
            fail_orders: true,
            ..Default::default()
        },
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
        store_with_key("tls.key"),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    let mut crt = Certificate::new("default", "web", ["example.com"]);

    let err = h.issuer.create_order(&cancel, &mut crt).await.unwrap_err();

    assert!(matches!(err, IssuerError::OrderCreation { .. }));
    assert!(err.is_retryable());
    assert!(!err.is_fatal());
    assert_eq!(crt.order_url(), None);

    let events = h.recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Warning);
    assert_eq!(events[0].reason, "ErrCreateOrder");
    assert_eq!(events[0].subject, crt.object_ref());
    assert!(events[0].message.starts_with("Error creating order: "));
}

#[tokio::test]
async fn test_empty_domain_list() {
    let h = harness(
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
    );
    let cancel = CancellationToken::new();
    let mut crt = Certificate::new("default", "web", Vec::<String>::new());

    let err = h.issuer.create_order(&cancel, &mut crt).await.unwrap_err();
    assert!(matches!(err, IssuerError::EmptyDomainList(_)));
    assert_eq!(h.factory.builds.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Solver registry
// ============================================================================

#[test]
fn test_solver_lookup() {
    let h = harness(
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
    );

    let http_a = h.issuer.solver_for("http-01").unwrap();
    let http_b = h.issuer.solver_for("http-01").unwrap();
    let dns_a = h.issuer.solver_for("dns-01").unwrap();
    let dns_b = h.issuer.solver_for("dns-01").unwrap();

    assert!(Arc::ptr_eq(&http_a, &http_b));
    assert!(Arc::ptr_eq(&dns_a, &dns_b));
    assert!(!Arc::ptr_eq(&http_a, &dns_a));

    let err = h.issuer.solver_for("tls-alpn-01").err().unwrap();
    assert!(matches!(err, IssuerError::UnsupportedChallengeType(_)));
    assert!(err.is_fatal());
}

// ============================================================================
// Challenge solving
// ============================================================================

async fn order_for(h: &Harness, crt: &mut Certificate) -> Order {
    h.issuer
        .create_order(&CancellationToken::new(), crt)
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_solve_success_cleans_up_each_challenge_once() {
    let h = harness(
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
    );
    let mut crt = Certificate::new("default", "web", ["a.example.com", "b.example.com"])
        .with_preference(ChallengeType::Dns01, ["b.example.com"]);
    let order = order_for(&h, &mut crt).await;

    h.issuer
        .solve_challenges(&CancellationToken::new(), &crt, &order, &NoopFinalizer)
        .await
        .unwrap();

    // First offered challenge is http-01; b.example.com asks for dns-01
    assert_eq!(h.http01.presented(), vec!["a.example.com"]);
    assert_eq!(h.dns01.presented(), vec!["b.example.com"]);
    assert_eq!(h.http01.clean_ups(), HashMap::from([("a.example.com".to_string(), 1)]));
    assert_eq!(h.dns01.clean_ups(), HashMap::from([("b.example.com".to_string(), 1)]));
    assert_eq!(h.factory.forgotten_orders(), vec![order.url.clone()]);
}

#[tokio::test(start_paused = true)]
async fn test_never_ready_keeps_waiting_then_times_out() {
    let h = harness(
        FakeSolver::new(CheckBehavior::NeverReady),
        FakeSolver::new(CheckBehavior::Ready),
    );
    let mut crt = Certificate::new("default", "web", ["example.com"]);
    let order = order_for(&h, &mut crt).await;

    let err = h
        .issuer
        .solve_challenges(&CancellationToken::new(), &crt, &order, &NoopFinalizer)
        .await
        .unwrap_err();

    assert!(matches!(err, IssuerError::ChallengeTimeout { .. }));
    assert!(err.is_retryable());
    // 60s timeout at a 2s interval: polled many times, not treated as failure
    assert!(h.http01.checks.load(Ordering::SeqCst) > 20);
    assert_eq!(h.http01.clean_ups(), HashMap::from([("example.com".to_string(), 1)]));
    assert_eq!(h.factory.forgotten_orders(), vec![order.url.clone()]);
}

#[tokio::test(start_paused = true)]
async fn test_present_failure_cleans_up_attempted_challenges() {
    let h = harness(
        FakeSolver::new(CheckBehavior::Ready).failing_present("b.example.com"),
        FakeSolver::new(CheckBehavior::Ready),
    );
    let mut crt = Certificate::new(
        "default",
        "web",
        ["a.example.com", "b.example.com", "c.example.com"],
    );
    let order = order_for(&h, &mut crt).await;

    let err = h
        .issuer
        .solve_challenges(&CancellationToken::new(), &crt, &order, &NoopFinalizer)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IssuerError::Solver { phase: SolverPhase::Present, ref domain, .. } if domain == "b.example.com"
    ));
    // c.example.com was never presented, so it is not cleaned up
    assert_eq!(h.http01.presented(), vec!["a.example.com", "b.example.com"]);
    assert_eq!(
        h.http01.clean_ups(),
        HashMap::from([
            ("a.example.com".to_string(), 1),
            ("b.example.com".to_string(), 1),
        ])
    );
    assert_eq!(h.http01.checks.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_check_error_aborts_and_cleans_up() {
    let h = harness(
        FakeSolver::new(CheckBehavior::Error),
        FakeSolver::new(CheckBehavior::Ready),
    );
    let mut crt = Certificate::new("default", "web", ["example.com"]);
    let order = order_for(&h, &mut crt).await;

    let err = h
        .issuer
        .solve_challenges(&CancellationToken::new(), &crt, &order, &NoopFinalizer)
        .await
        .unwrap_err();

    assert!(matches!(err, IssuerError::Solver { phase: SolverPhase::Check, .. }));
    assert_eq!(h.http01.clean_ups(), HashMap::from([("example.com".to_string(), 1)]));
}

#[tokio::test(start_paused = true)]
async fn test_finalizer_failure_still_cleans_up() {
    let h = harness(
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
    );
    let mut crt = Certificate::new("default", "web", ["example.com"]);
    let order = order_for(&h, &mut crt).await;

    let err = h
        .issuer
        .solve_challenges(&CancellationToken::new(), &crt, &order, &FailingFinalizer)
        .await
        .unwrap_err();

    assert!(matches!(err, IssuerError::Finalize(_)));
    assert_eq!(h.http01.clean_ups(), HashMap::from([("example.com".to_string(), 1)]));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_surfaces_and_cleans_up() {
    let h = harness(
        FakeSolver::new(CheckBehavior::NeverReady),
        FakeSolver::new(CheckBehavior::Ready),
    );
    let mut crt = Certificate::new("default", "web", ["example.com"]);
    let order = order_for(&h, &mut crt).await;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            cancel.cancel();
        });
    }

    let err = h
        .issuer
        .solve_challenges(&cancel, &crt, &order, &NoopFinalizer)
        .await
        .unwrap_err();

    assert!(matches!(err, IssuerError::Cancelled));
    assert!(!err.is_retryable());
    assert_eq!(h.http01.clean_ups(), HashMap::from([("example.com".to_string(), 1)]));
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_challenge_fails_before_present() {
    let h = harness(
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
    );
    let crt = Certificate::new("default", "web", ["example.com"]);
    let order = Order {
        url: "https://ca.example/acme/order/9".to_string(),
        identifiers: vec!["example.com".to_string()],
        authorizations: vec![Authorization {
            identifier: "example.com".to_string(),
            status: AuthorizationStatus::Pending,
            challenges: vec![Challenge {
                challenge_type: "tls-alpn-01".to_string(),
                url: "https://ca.example/chall/x".to_string(),
                token: "x".to_string(),
                key_authorization: "x.k".to_string(),
                domain: "example.com".to_string(),
            }],
        }],
    };

    let err = h
        .issuer
        .solve_challenges(&CancellationToken::new(), &crt, &order, &NoopFinalizer)
        .await
        .unwrap_err();

    assert!(matches!(err, IssuerError::UnsupportedChallengeType(ref t) if t == "tls-alpn-01"));
    assert!(h.http01.presented().is_empty());
    assert!(h.http01.clean_ups().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_valid_authorizations_are_skipped() {
    let h = harness(
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
    );
    let mut crt = Certificate::new("default", "web", ["example.com"]);
    let mut order = order_for(&h, &mut crt).await;
    order.authorizations[0].status = AuthorizationStatus::Valid;

    h.issuer
        .solve_challenges(&CancellationToken::new(), &crt, &order, &NoopFinalizer)
        .await
        .unwrap();
    assert!(h.http01.presented().is_empty());
    assert!(h.http01.clean_ups().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_issue_end_to_end() {
    let h = harness(
        FakeSolver::new(CheckBehavior::Ready),
        FakeSolver::new(CheckBehavior::Ready),
    );
    let mut crt = Certificate::new("default", "web", ["example.com"]);

    let order = h
        .issuer
        .issue(&CancellationToken::new(), &mut crt, &NoopFinalizer)
        .await
        .unwrap();

    assert_eq!(order.identifiers, vec!["example.com"]);
    assert_eq!(crt.order_url(), Some("https://ca.example/acme/order/1"));
    assert_eq!(h.http01.clean_ups(), HashMap::from([("example.com".to_string(), 1)]));
    assert!(h.recorder.is_empty());
}
