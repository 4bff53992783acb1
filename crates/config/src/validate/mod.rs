//! Issuer configuration validation
//!
//! Validation runs before any credential or network access. Errors are
//! collected per category so a single pass reports everything wrong with an
//! issuer; warnings are logged and never fail validation.

mod acme;
mod lint;
mod network;
mod polling;

pub use acme::validate_acme;
pub use lint::lint_acme;
pub use network::{parse_nameserver, validate_nameservers, DEFAULT_DNS_PORT};
pub use polling::validate_polling;

use std::fmt;
use tracing::warn;

use crate::error::ConfigError;
use crate::issuer::{AcmeIssuerConfig, IssuerConfig};

/// Category of a validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A required field is empty
    Required,
    /// ACME server settings
    Acme,
    /// Resolver addresses
    Network,
    /// Challenge polling settings
    Polling,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Required => write!(f, "required"),
            ErrorCategory::Acme => write!(f, "acme"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Polling => write!(f, "polling"),
        }
    }
}

/// A single validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
    /// Field name for `Required` errors
    pub field: Option<&'static str>,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            field: None,
        }
    }

    pub fn missing(field: &'static str) -> Self {
        Self {
            category: ErrorCategory::Required,
            message: format!("{} is required", field),
            field: Some(field),
        }
    }
}

/// A validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Accumulated validation outcome
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert into a [`ConfigError`]
    ///
    /// Missing required fields take precedence over other errors so the
    /// caller sees exactly which fields to fill in.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        if self.errors.is_empty() {
            return Ok(self.warnings);
        }

        let fields: Vec<&'static str> = self.errors.iter().filter_map(|e| e.field).collect();
        if !fields.is_empty() {
            return Err(ConfigError::MissingFields { fields });
        }

        Err(ConfigError::Invalid(
            self.errors
                .into_iter()
                .map(|e| format!("{}: {}", e.category, e.message))
                .collect(),
        ))
    }
}

/// Validate an issuer before it is used for anything else.
///
/// Returns the ACME block on success. Fails when the block is absent, when
/// any of `server`, `email`, `privateKeyRef.name` or `resource_scope` is
/// empty (all of them named in one error), or when a present value cannot
/// be parsed.
pub fn validate_issuer<'a>(
    issuer: &'a IssuerConfig,
    resource_scope: &str,
) -> Result<&'a AcmeIssuerConfig, ConfigError> {
    let acme = issuer.acme.as_ref().ok_or(ConfigError::MissingAcme)?;

    let mut result = validate_acme(acme);
    if resource_scope.is_empty() {
        result.add_error(ValidationError::missing("resourceScope"));
    }
    result.merge(validate_nameservers(&acme.dns01_nameservers));
    result.merge(lint_acme(acme));

    let warnings = result.into_result()?;
    for warning in warnings {
        warn!(issuer = %issuer.name, "{}", warning.message);
    }

    Ok(acme)
}
