//! Error types for the ACME issuer.
//!
//! Errors are split by who has to act on them: [`IssuerError::is_fatal`]
//! means an operator must fix configuration or credentials,
//! [`IssuerError::is_retryable`] means the reconcile loop may try again on
//! its normal schedule.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use certflow_config::ConfigError;

use crate::client::ClientError;

/// Result type for issuer operations.
pub type IssuerResult<T> = Result<T, IssuerError>;

/// Errors returned by the issuance orchestrator.
#[derive(Debug, Error)]
pub enum IssuerError {
    /// Issuer configuration is incomplete or invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The account key credential does not exist
    #[error("credential {scope}/{name} has no entry for key {key:?}")]
    CredentialNotFound {
        scope: String,
        name: String,
        key: String,
    },

    /// The account key credential exists but cannot be decoded
    #[error("credential {scope}/{name} key {key:?} is not a valid account key: {reason}")]
    CredentialMalformed {
        scope: String,
        name: String,
        key: String,
        reason: String,
    },

    /// The credential store itself failed
    #[error("credential store error: {0}")]
    CredentialStore(String),

    /// The protocol client could not be built
    #[error("failed to build ACME client: {0}")]
    ClientConstruction(#[source] ClientError),

    /// The certificate lists no domains to order
    #[error("certificate {0} has no domains")]
    EmptyDomainList(String),

    /// The ACME server rejected or failed the new-order request
    #[error("error creating order for certificate {certificate}: {source}")]
    OrderCreation {
        certificate: String,
        #[source]
        source: ClientError,
    },

    /// No solver is implemented for the challenge type
    #[error("no solver for {0:?} implemented")]
    UnsupportedChallengeType(String),

    /// The authorization does not offer the challenge the certificate asks for
    #[error("authorization for {domain} offers no {wanted} challenge")]
    NoMatchingChallenge { domain: String, wanted: String },

    /// A solver could not be set up from configuration
    #[error("failed to set up solver: {0}")]
    SolverSetup(#[source] SolverError),

    /// A solver phase failed
    #[error("{phase} failed for {domain}: {source}")]
    Solver {
        phase: SolverPhase,
        domain: String,
        #[source]
        source: SolverError,
    },

    /// A challenge never reported ready
    #[error("challenge for {domain} not ready after {waited:?}")]
    ChallengeTimeout { domain: String, waited: Duration },

    /// The caller's finalizer failed
    #[error("order finalization failed: {0}")]
    Finalize(String),

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,
}

impl IssuerError {
    /// True when the error requires an operator to change configuration or
    /// credentials before a retry can succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IssuerError::Config(_)
                | IssuerError::CredentialNotFound { .. }
                | IssuerError::CredentialMalformed { .. }
                | IssuerError::SolverSetup(_)
                | IssuerError::EmptyDomainList(_)
                | IssuerError::UnsupportedChallengeType(_)
                | IssuerError::NoMatchingChallenge { .. }
        )
    }

    /// True when the caller may retry on its normal reconcile cadence.
    ///
    /// Credential and solver setup errors are both fatal and retryable: the
    /// credential may be created later without any change to the issuer.
    pub fn is_retryable(&self) -> bool {
        match self {
            IssuerError::CredentialNotFound { .. }
            | IssuerError::CredentialMalformed { .. }
            | IssuerError::CredentialStore(_)
            | IssuerError::SolverSetup(_)
            | IssuerError::ClientConstruction(_)
            | IssuerError::OrderCreation { .. }
            | IssuerError::Solver { .. }
            | IssuerError::ChallengeTimeout { .. }
            | IssuerError::Finalize(_) => true,
            IssuerError::Config(_)
            | IssuerError::EmptyDomainList(_)
            | IssuerError::UnsupportedChallengeType(_)
            | IssuerError::NoMatchingChallenge { .. }
            | IssuerError::Cancelled => false,
        }
    }

    /// Short machine-readable reason, used for events and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            IssuerError::Config(_) => "ErrConfig",
            IssuerError::CredentialNotFound { .. } => "ErrCredentialNotFound",
            IssuerError::CredentialMalformed { .. } => "ErrCredentialMalformed",
            IssuerError::CredentialStore(_) => "ErrCredentialStore",
            IssuerError::ClientConstruction(_) => "ErrClient",
            IssuerError::EmptyDomainList(_) => "ErrNoDomains",
            IssuerError::OrderCreation { .. } => "ErrCreateOrder",
            IssuerError::UnsupportedChallengeType(_) => "ErrUnsupportedChallenge",
            IssuerError::NoMatchingChallenge { .. } => "ErrNoMatchingChallenge",
            IssuerError::SolverSetup(_) => "ErrSolverSetup",
            IssuerError::Solver { phase, .. } => phase.reason(),
            IssuerError::ChallengeTimeout { .. } => "ErrChallengeTimeout",
            IssuerError::Finalize(_) => "ErrFinalize",
            IssuerError::Cancelled => "Cancelled",
        }
    }
}

/// Solver phase a [`SolverError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverPhase {
    Present,
    Check,
    CleanUp,
}

impl SolverPhase {
    fn reason(&self) -> &'static str {
        match self {
            SolverPhase::Present => "ErrPresentChallenge",
            SolverPhase::Check => "ErrCheckChallenge",
            SolverPhase::CleanUp => "ErrCleanUpChallenge",
        }
    }
}

impl fmt::Display for SolverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverPhase::Present => write!(f, "present"),
            SolverPhase::Check => write!(f, "check"),
            SolverPhase::CleanUp => write!(f, "clean-up"),
        }
    }
}

/// Errors returned by solver implementations.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The provisioning backend (DNS API, responder) failed
    #[error("provider error: {0}")]
    Provider(String),

    /// The readiness check could not be performed at all
    #[error("check could not be performed: {0}")]
    Check(String),

    /// The solver is not configured for this challenge
    #[error("solver configuration error: {0}")]
    Config(String),

    /// A credential the solver needs is missing or unreadable
    #[error("solver credential error: {0}")]
    Credential(String),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}
