//! Challenge solvers and the registry that selects them.
//!
//! A solver proves control of a domain in three phases:
//!
//! 1. [`Solver::present`] provisions the proof (a served token, a TXT record)
//! 2. [`Solver::check`] checks once whether the proof is visible yet
//! 3. [`Solver::clean_up`] removes whatever `present` created
//!
//! Per challenge the orchestrator walks the [`ChallengeState`] machine:
//!
//! ```text
//! Pending -> Presented -> { Ready | TimedOut | PresentFailed } -> CleanedUp
//! ```

pub mod dns01;
pub mod http01;

pub use dns01::{Dns01Solver, DnsProvider, WebhookDnsProvider};
pub use http01::{ChallengeResponder, Http01Solver};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::certificate::Certificate;
use crate::error::{IssuerError, IssuerResult, SolverError};
use crate::order::Challenge;

/// Challenge types with a solver implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeType {
    #[serde(rename = "http-01")]
    Http01,
    #[serde(rename = "dns-01")]
    Dns01,
}

impl ChallengeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeType::Http01 => "http-01",
            ChallengeType::Dns01 => "dns-01",
        }
    }

    /// Parse a challenge type tag; `None` for types without a solver
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "http-01" => Some(ChallengeType::Http01),
            "dns-01" => Some(ChallengeType::Dns01),
            _ => None,
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-phase challenge solving contract.
#[async_trait]
pub trait Solver: Send + Sync {
    /// Provision the proof for `challenge`. Resources created here belong to
    /// `certificate`.
    async fn present(&self, certificate: &Certificate, challenge: &Challenge)
        -> Result<(), SolverError>;

    /// Check once whether the proof is visible to the CA.
    ///
    /// `Ok(false)` means not yet; `Err` means the check itself could not run.
    async fn check(&self, challenge: &Challenge) -> Result<bool, SolverError>;

    /// Remove what `present` created. Must tolerate a partial or failed
    /// `present`.
    async fn clean_up(&self, certificate: &Certificate, challenge: &Challenge)
        -> Result<(), SolverError>;

    /// Whether this solver can present at all with its configuration
    fn is_available(&self) -> bool {
        true
    }
}

/// Lookup from challenge type to solver.
///
/// Holds one instance per supported type for the lifetime of an issuer.
#[derive(Clone)]
pub struct SolverRegistry {
    http01: Arc<dyn Solver>,
    dns01: Arc<dyn Solver>,
}

impl SolverRegistry {
    pub fn new(http01: Arc<dyn Solver>, dns01: Arc<dyn Solver>) -> Self {
        Self { http01, dns01 }
    }

    /// Solver for a supported challenge type
    pub fn get(&self, challenge_type: ChallengeType) -> &Arc<dyn Solver> {
        match challenge_type {
            ChallengeType::Http01 => &self.http01,
            ChallengeType::Dns01 => &self.dns01,
        }
    }

    /// Whether `tag` names a supported type whose solver can present
    pub fn can_solve(&self, tag: &str) -> bool {
        ChallengeType::parse(tag).is_some_and(|t| self.get(t).is_available())
    }

    /// Solver for a raw challenge type tag
    pub fn solver_for(&self, tag: &str) -> IssuerResult<Arc<dyn Solver>> {
        ChallengeType::parse(tag)
            .map(|t| Arc::clone(self.get(t)))
            .ok_or_else(|| IssuerError::UnsupportedChallengeType(tag.to_string()))
    }
}

impl fmt::Debug for SolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverRegistry")
            .field("types", &[ChallengeType::Http01, ChallengeType::Dns01])
            .finish()
    }
}

/// Lifecycle of one challenge during [`crate::AcmeIssuer::solve_challenges`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    Pending,
    Presented,
    Ready,
    TimedOut,
    PresentFailed,
    CleanedUp,
}

impl ChallengeState {
    /// Whether `present` was attempted, so `clean_up` is owed
    pub fn needs_clean_up(&self) -> bool {
        matches!(
            self,
            ChallengeState::Presented
                | ChallengeState::Ready
                | ChallengeState::TimedOut
                | ChallengeState::PresentFailed
        )
    }
}
