//! ACME issuance orchestrator
//!
//! [`AcmeIssuer`] validates its configuration at construction, builds the
//! protocol client on first use and caches it, creates orders for
//! certificates and drives each order's challenges through the solvers.
//!
//! # Challenge Flow
//!
//! ```text
//! select challenge + solver for every authorization   (fatal errors here)
//!   -> present each challenge
//!   -> poll check until all ready or polling timeout
//!   -> finalizer
//!   -> clean up every challenge that had present attempted
//! ```

use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use certflow_config::{
    validate_issuer, validate_polling, AcmeIssuerConfig, IssuerConfig, PollingConfig,
    SecretKeySelector,
};

use crate::certificate::Certificate;
use crate::client::{AcmeClient, ClientFactory};
use crate::credentials::{resolve_account_key, CredentialStore};
use crate::error::{IssuerError, IssuerResult, SolverPhase};
use crate::events::{EventRecorder, Severity};
use crate::finalize::OrderFinalizer;
use crate::order::{order_identifiers, Authorization, Challenge, Order};
use crate::solver::{ChallengeState, ChallengeType, Solver, SolverRegistry};

/// Event reason for a failed new-order request
pub const REASON_CREATE_ORDER: &str = "ErrCreateOrder";

/// Everything an [`AcmeIssuer`] needs, injected by the caller.
pub struct IssuerDeps {
    pub issuer: IssuerConfig,
    /// Scope holding the issuer's credentials
    pub resource_scope: String,
    pub polling: PollingConfig,
    pub credentials: Arc<dyn CredentialStore>,
    pub client_factory: Arc<dyn ClientFactory>,
    pub recorder: Arc<dyn EventRecorder>,
    pub solvers: SolverRegistry,
}

/// Orchestrates ACME issuance for one issuer.
///
/// Owned by a single reconcile worker; concurrent certificates should use
/// separate instances.
pub struct AcmeIssuer {
    name: String,
    acme: AcmeIssuerConfig,
    resource_scope: String,
    polling: PollingConfig,
    credentials: Arc<dyn CredentialStore>,
    client_factory: Arc<dyn ClientFactory>,
    recorder: Arc<dyn EventRecorder>,
    solvers: SolverRegistry,
    client: OnceCell<Arc<dyn AcmeClient>>,
}

/// One challenge being driven through its solver
struct ChallengeWork {
    challenge: Challenge,
    solver: Arc<dyn Solver>,
    state: ChallengeState,
}

impl AcmeIssuer {
    /// Validate the issuer configuration and build the orchestrator.
    ///
    /// Performs no credential access and no network I/O.
    pub fn new(deps: IssuerDeps) -> IssuerResult<Self> {
        let acme = validate_issuer(&deps.issuer, &deps.resource_scope)?.clone();
        validate_polling(&deps.polling).into_result()?;

        info!(
            issuer = %deps.issuer.name,
            server = %acme.server,
            scope = %deps.resource_scope,
            "Configured ACME issuer"
        );

        Ok(Self {
            name: deps.issuer.name,
            acme,
            resource_scope: deps.resource_scope,
            polling: deps.polling,
            credentials: deps.credentials,
            client_factory: deps.client_factory,
            recorder: deps.recorder,
            solvers: deps.solvers,
            client: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &AcmeIssuerConfig {
        &self.acme
    }

    /// Scope and selector of the account key credential
    pub fn account_key_ref(&self) -> (&str, &SecretKeySelector) {
        (&self.resource_scope, &self.acme.private_key_ref)
    }

    /// The protocol client, built on first call and reused afterwards.
    pub async fn client(&self, cancel: &CancellationToken) -> IssuerResult<Arc<dyn AcmeClient>> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let key = cancellable(
                    cancel,
                    resolve_account_key(
                        self.credentials.as_ref(),
                        &self.resource_scope,
                        &self.acme.private_key_ref,
                    ),
                )
                .await??;

                let client = self
                    .client_factory
                    .build(&key, &self.acme)
                    .map_err(IssuerError::ClientConstruction)?;
                info!(issuer = %self.name, server = %self.acme.server, "ACME client ready");
                Ok::<_, IssuerError>(client)
            })
            .await?;
        Ok(Arc::clone(client))
    }

    /// Create an order for the certificate's domains and record its URL on
    /// the certificate's status.
    ///
    /// A failed request emits one warning event and leaves the status
    /// untouched. There is no retry here.
    pub async fn create_order(
        &self,
        cancel: &CancellationToken,
        certificate: &mut Certificate,
    ) -> IssuerResult<Order> {
        let identifiers = order_identifiers(&certificate.domains);
        if identifiers.is_empty() {
            return Err(IssuerError::EmptyDomainList(certificate.key()));
        }

        let client = self.client(cancel).await?;

        match cancellable(cancel, client.create_order(&identifiers)).await? {
            Ok(order) => {
                info!(
                    certificate = %certificate.key(),
                    identifiers = ?identifiers,
                    order = %order.url,
                    "Created ACME order"
                );
                certificate.set_order_url(&order.url);
                Ok(order)
            }
            Err(source) => {
                self.recorder.emit(
                    &certificate.object_ref(),
                    Severity::Warning,
                    REASON_CREATE_ORDER,
                    &format!("Error creating order: {source}"),
                );
                Err(IssuerError::OrderCreation {
                    certificate: certificate.key(),
                    source,
                })
            }
        }
    }

    /// Solver for a challenge type tag
    pub fn solver_for(&self, challenge_type: &str) -> IssuerResult<Arc<dyn Solver>> {
        self.solvers.solver_for(challenge_type)
    }

    /// Prove control of every identifier in `order`.
    ///
    /// Every challenge that had `present` attempted is cleaned up exactly
    /// once before this returns, whatever the outcome. After cancellation,
    /// clean-up is bounded by the polling clean-up grace period. The client
    /// forgets the order afterwards.
    pub async fn solve_challenges(
        &self,
        cancel: &CancellationToken,
        certificate: &Certificate,
        order: &Order,
        finalizer: &dyn OrderFinalizer,
    ) -> IssuerResult<()> {
        let result = self
            .solve_order(cancel, certificate, order, finalizer)
            .await;
        if let Some(client) = self.client.get() {
            client.forget_order(&order.url).await;
        }
        result
    }

    async fn solve_order(
        &self,
        cancel: &CancellationToken,
        certificate: &Certificate,
        order: &Order,
        finalizer: &dyn OrderFinalizer,
    ) -> IssuerResult<()> {
        let mut work = Vec::new();
        for authz in order.authorizations.iter().filter(|a| a.needs_solving()) {
            let challenge = select_challenge(certificate, authz, &self.solvers)?;
            let solver = self.solver_for(&challenge.challenge_type)?;
            work.push(ChallengeWork {
                challenge: challenge.clone(),
                solver,
                state: ChallengeState::Pending,
            });
        }

        if work.is_empty() {
            debug!(order = %order.url, "All authorizations already valid");
        }

        let result = self
            .drive(cancel, certificate, order, &mut work, finalizer)
            .await;
        let cleanup = self.clean_up(cancel, certificate, &mut work).await;

        match (result, cleanup) {
            (Err(e), _) => Err(e),
            (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// Create an order and solve its challenges.
    pub async fn issue(
        &self,
        cancel: &CancellationToken,
        certificate: &mut Certificate,
        finalizer: &dyn OrderFinalizer,
    ) -> IssuerResult<Order> {
        let order = self.create_order(cancel, certificate).await?;
        self.solve_challenges(cancel, certificate, &order, finalizer)
            .await?;
        Ok(order)
    }

    async fn drive(
        &self,
        cancel: &CancellationToken,
        certificate: &Certificate,
        order: &Order,
        work: &mut [ChallengeWork],
        finalizer: &dyn OrderFinalizer,
    ) -> IssuerResult<()> {
        for item in work.iter_mut() {
            // Attempted from here on, so clean-up is owed even if present
            // fails or is cancelled
            item.state = ChallengeState::PresentFailed;
            let presented = cancellable(cancel, item.solver.present(certificate, &item.challenge)).await?;
            if let Err(source) = presented {
                warn!(
                    domain = %item.challenge.domain,
                    challenge_type = %item.challenge.challenge_type,
                    error = %source,
                    "Failed to present challenge"
                );
                return Err(IssuerError::Solver {
                    phase: SolverPhase::Present,
                    domain: item.challenge.domain.clone(),
                    source,
                });
            }
            item.state = ChallengeState::Presented;
            info!(
                domain = %item.challenge.domain,
                challenge_type = %item.challenge.challenge_type,
                "Presented challenge"
            );
        }

        self.wait_until_ready(cancel, work).await?;

        let ready: Vec<Challenge> = work.iter().map(|w| w.challenge.clone()).collect();
        let client = self.client(cancel).await?;
        info!(order = %order.url, challenges = ready.len(), "All challenges ready");
        cancellable(cancel, finalizer.finalize(client.as_ref(), order, &ready)).await?
    }

    async fn wait_until_ready(
        &self,
        cancel: &CancellationToken,
        work: &mut [ChallengeWork],
    ) -> IssuerResult<()> {
        let started = Instant::now();
        let deadline = started + self.polling.timeout();

        loop {
            let mut pending = 0;
            for item in work.iter_mut().filter(|w| w.state == ChallengeState::Presented) {
                let checked = cancellable(cancel, item.solver.check(&item.challenge)).await?;
                match checked {
                    Ok(true) => {
                        item.state = ChallengeState::Ready;
                        info!(domain = %item.challenge.domain, "Challenge ready");
                    }
                    Ok(false) => pending += 1,
                    Err(source) => {
                        return Err(IssuerError::Solver {
                            phase: SolverPhase::Check,
                            domain: item.challenge.domain.clone(),
                            source,
                        })
                    }
                }
            }

            if pending == 0 {
                return Ok(());
            }

            if Instant::now() >= deadline {
                let mut timed_out = Vec::new();
                for item in work.iter_mut().filter(|w| w.state == ChallengeState::Presented) {
                    item.state = ChallengeState::TimedOut;
                    timed_out.push(item.challenge.domain.clone());
                }
                warn!(domains = ?timed_out, "Challenges not ready before polling timeout");
                return Err(IssuerError::ChallengeTimeout {
                    domain: timed_out.join(", "),
                    waited: started.elapsed(),
                });
            }

            debug!(pending, "Waiting for challenges to become ready");
            cancellable(cancel, tokio::time::sleep(self.polling.interval())).await?;
        }
    }

    async fn clean_up(
        &self,
        cancel: &CancellationToken,
        certificate: &Certificate,
        work: &mut [ChallengeWork],
    ) -> IssuerResult<()> {
        let grace = self.polling.cleanup_grace();
        let mut deadline: Option<Instant> = None;
        let mut first_error = None;

        for item in work.iter_mut().filter(|w| w.state.needs_clean_up()) {
            let domain = item.challenge.domain.clone();
            let clean_up = item.solver.clean_up(certificate, &item.challenge);

            let outcome = if cancel.is_cancelled() {
                let deadline = *deadline.get_or_insert_with(|| Instant::now() + grace);
                let remaining = deadline.saturating_duration_since(Instant::now());
                tokio::time::timeout(remaining, clean_up).await.ok()
            } else {
                Some(clean_up.await)
            };
            item.state = ChallengeState::CleanedUp;

            match outcome {
                Some(Ok(())) => debug!(domain = %domain, "Cleaned up challenge"),
                Some(Err(source)) => {
                    warn!(domain = %domain, error = %source, "Failed to clean up challenge");
                    first_error.get_or_insert(IssuerError::Solver {
                        phase: SolverPhase::CleanUp,
                        domain,
                        source,
                    });
                }
                None => warn!(
                    domain = %domain,
                    grace = ?grace,
                    "Clean-up abandoned after cancellation grace period"
                ),
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Pick the challenge to solve for an authorization.
///
/// A per-domain preference on the certificate must be offered by the
/// authorization. Without one the first offered challenge that has a usable
/// solver is taken; if none has, the first offered type is reported as
/// unsupported.
fn select_challenge<'a>(
    certificate: &Certificate,
    authz: &'a Authorization,
    solvers: &SolverRegistry,
) -> IssuerResult<&'a Challenge> {
    if let Some(wanted) = certificate.preferred_challenge(&authz.identifier) {
        return authz
            .challenges
            .iter()
            .find(|c| ChallengeType::parse(&c.challenge_type) == Some(wanted))
            .ok_or_else(|| IssuerError::NoMatchingChallenge {
                domain: authz.identifier.clone(),
                wanted: wanted.to_string(),
            });
    }

    if let Some(challenge) = authz
        .challenges
        .iter()
        .find(|c| solvers.can_solve(&c.challenge_type))
    {
        return Ok(challenge);
    }

    match authz
        .challenges
        .iter()
        .find(|c| ChallengeType::parse(&c.challenge_type).is_some())
        .or_else(|| authz.challenges.first())
    {
        Some(challenge) => Ok(challenge),
        None => Err(IssuerError::NoMatchingChallenge {
            domain: authz.identifier.clone(),
            wanted: "usable".to_string(),
        }),
    }
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> IssuerResult<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(IssuerError::Cancelled),
        output = fut => Ok(output),
    }
}
