//! Managed certificate resource
//!
//! The orchestrator reads a certificate's domains and challenge preferences
//! and writes exactly one thing back: the order URL on its status.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::solver::ChallengeType;

/// Reference to the resource a notification is about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub kind: &'static str,
    pub scope: String,
    pub name: String,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.scope, self.name)
    }
}

/// A certificate that needs a new or renewed credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub name: String,

    /// Scope (namespace) the certificate lives in
    pub scope: String,

    /// Domain identifiers to request, in order
    pub domains: Vec<String>,

    /// Per-domain challenge type preferences
    #[serde(default)]
    pub solver_preferences: Vec<SolverPreference>,

    #[serde(default)]
    pub status: CertificateStatus,
}

/// Challenge type to use for a group of domains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverPreference {
    pub domains: Vec<String>,
    pub challenge_type: ChallengeType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateStatus {
    #[serde(default)]
    pub acme: AcmeCertificateStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcmeCertificateStatus {
    #[serde(default)]
    pub order: OrderReference,
}

/// Server-assigned order reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReference {
    pub url: Option<String>,
}

impl Certificate {
    pub fn new(
        scope: impl Into<String>,
        name: impl Into<String>,
        domains: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
            domains: domains.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Prefer `challenge_type` for the given domains
    pub fn with_preference(
        mut self,
        challenge_type: ChallengeType,
        domains: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.solver_preferences.push(SolverPreference {
            domains: domains.into_iter().map(Into::into).collect(),
            challenge_type,
        });
        self
    }

    /// Preferred challenge type for a domain, if the certificate states one
    ///
    /// The first matching preference wins. Domains compare case-insensitively.
    pub fn preferred_challenge(&self, domain: &str) -> Option<ChallengeType> {
        self.solver_preferences
            .iter()
            .find(|p| p.domains.iter().any(|d| d.eq_ignore_ascii_case(domain)))
            .map(|p| p.challenge_type)
    }

    /// Order URL recorded on the status
    pub fn order_url(&self) -> Option<&str> {
        self.status.acme.order.url.as_deref()
    }

    pub(crate) fn set_order_url(&mut self, url: impl Into<String>) {
        self.status.acme.order.url = Some(url.into());
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            kind: "Certificate",
            scope: self.scope.clone(),
            name: self.name.clone(),
        }
    }

    /// `scope/name`, used in log fields and error messages
    pub fn key(&self) -> String {
        format!("{}/{}", self.scope, self.name)
    }
}
