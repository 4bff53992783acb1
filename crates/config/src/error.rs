//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::env_expand::EnvExpandError;

/// Errors raised while loading or validating issuer configuration.
///
/// Every variant is fatal: retrying without changing the configuration
/// produces the same result.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The issuer has no `acme` block at all
    #[error("acme config may not be empty")]
    MissingAcme,

    /// One or more required fields are empty: the ACME server, email and
    /// key reference, or the scope for supplemental resources
    #[error("required fields are empty: {}", .fields.join(", "))]
    MissingFields { fields: Vec<&'static str> },

    /// A field is present but its value is unusable
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// Environment variable expansion failed
    #[error("failed to expand environment variable: {0}")]
    EnvExpand(#[from] EnvExpandError),

    /// Configuration file could not be read
    #[error("failed to read configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for this schema
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Names of the missing required fields, if this is a missing-field error.
    pub fn missing_fields(&self) -> &[&'static str] {
        match self {
            ConfigError::MissingFields { fields } => fields,
            _ => &[],
        }
    }
}
