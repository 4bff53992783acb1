//! Certflow ACME issuer
//!
//! Drives ACME certificate issuance for a managed certificate: validates the
//! issuer configuration, resolves the account key, builds a cached protocol
//! client, creates an order for the certificate's domains and proves control
//! of each domain through an HTTP-01 or DNS-01 solver.
//!
//! Collaborators are injected as traits ([`CredentialStore`],
//! [`ClientFactory`], [`EventRecorder`], [`Solver`], [`OrderFinalizer`]);
//! [`wiring::build_issuer`] assembles the production implementations.

// ============================================================================
// Module Declarations
// ============================================================================

pub mod certificate;
pub mod client;
pub mod credentials;
pub mod error;
pub mod events;
pub mod finalize;
pub mod issuer;
pub mod order;
pub mod solver;
pub mod wiring;

// ============================================================================
// Public API Re-exports
// ============================================================================

pub use certificate::{Certificate, ObjectRef};
pub use client::{AcmeClient, ClientError, ClientFactory, InstantClientFactory, LoggingClient};
pub use credentials::{
    resolve_account_key, AccountKey, Credential, CredentialStore, FileCredentialStore,
    MemoryCredentialStore,
};
pub use error::{IssuerError, IssuerResult, SolverError, SolverPhase};
pub use events::{EventRecorder, MemoryRecorder, Severity, TracingRecorder};
pub use finalize::{NoopFinalizer, OrderFinalizer, ReadyNotifier};
pub use issuer::{AcmeIssuer, IssuerDeps};
pub use order::{Authorization, AuthorizationStatus, Challenge, Order, OrderStatus};
pub use solver::{ChallengeType, Solver, SolverRegistry};
pub use wiring::{build_issuer, BuiltIssuer};
