//! Configuration linting
//!
//! Flags settings that are legal but risky in production.

use super::{ValidationResult, ValidationWarning};
use crate::issuer::AcmeIssuerConfig;

/// Lint an ACME block
pub fn lint_acme(acme: &AcmeIssuerConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    if acme.skip_tls_verify {
        result.add_warning(ValidationWarning::new(format!(
            "TLS verification is disabled for ACME server '{}' (only use against test CAs)",
            acme.server
        )));
    }

    if !acme.email.is_empty() && !acme.email.contains('@') {
        result.add_warning(ValidationWarning::new(format!(
            "Account email '{}' does not look like an email address",
            acme.email
        )));
    }

    if acme.server.starts_with("http://") {
        result.add_warning(ValidationWarning::new(format!(
            "ACME server '{}' is not using https",
            acme.server
        )));
    }

    result
}
