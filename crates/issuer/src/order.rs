//! Orders, authorizations and challenges as the orchestrator sees them
//!
//! These are protocol-client independent: [`crate::client::AcmeHttpClient`]
//! converts instant-acme's types into these, and test doubles build them
//! directly.

use std::collections::HashSet;

/// An ACME order for a certificate's identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Server-assigned order URL
    pub url: String,

    /// Identifiers the order was created for
    pub identifiers: Vec<String>,

    /// One authorization per identifier
    pub authorizations: Vec<Authorization>,
}

/// Proof-of-control requirement for one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub identifier: String,
    pub status: AuthorizationStatus,
    /// Challenges offered by the server, in server order
    pub challenges: Vec<Challenge>,
}

/// Order status as last reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

impl OrderStatus {
    /// Whether the CA has finished validating the order's authorizations
    pub fn is_settled(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Whether the order can no longer change
    pub fn is_final(&self) -> bool {
        matches!(self, OrderStatus::Valid | OrderStatus::Invalid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Other,
}

/// A single challenge the server offers for an identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Raw type tag, e.g. `http-01`
    pub challenge_type: String,

    /// Challenge URL, used to signal readiness to the server
    pub url: String,

    pub token: String,

    /// `token.thumbprint` for this account
    pub key_authorization: String,

    /// Identifier this challenge proves control of
    pub domain: String,
}

impl Authorization {
    /// Whether this authorization still needs a challenge solved
    pub fn needs_solving(&self) -> bool {
        self.status != AuthorizationStatus::Valid
    }
}

/// Normalise a certificate's domains into order identifiers
///
/// Domains are trimmed and lowercased; empty entries are dropped and
/// duplicates keep their first position.
pub fn order_identifiers<S: AsRef<str>>(domains: &[S]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(domains.len());
    domains
        .iter()
        .map(|d| d.as_ref().trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .filter(|d| seen.insert(d.clone()))
        .collect()
}
