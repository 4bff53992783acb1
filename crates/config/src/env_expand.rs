//! Environment variable expansion for configuration strings
//!
//! Recognised forms:
//! - `${VAR}` - required, error when unset or empty
//! - `${VAR:-default}` - falls back to `default` when unset or empty
//! - `$$` - a literal `$`

use regex::{Captures, Regex};
use std::sync::LazyLock;
use thiserror::Error;

/// Upper bound on the size of an expanded value (64 KB)
const MAX_EXPANDED_SIZE: usize = 64 * 1024;

/// Errors that can occur during expansion
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvExpandError {
    #[error("environment variable '{name}' is not set")]
    MissingVariable { name: String },

    #[error("environment variable '{name}' is empty")]
    EmptyVariable { name: String },

    #[error("expanded value exceeds maximum size of {MAX_EXPANDED_SIZE} bytes")]
    SizeExceeded,
}

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("environment variable pattern is valid")
});

/// Returns true if the string contains anything [`expand_env_vars`] would rewrite.
pub fn contains_env_vars(input: &str) -> bool {
    VAR_PATTERN.is_match(input)
}

/// Expand `${VAR}` references in `input` using the process environment.
pub fn expand_env_vars(input: &str) -> Result<String, EnvExpandError> {
    if !contains_env_vars(input) {
        return Ok(input.to_string());
    }
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expand references using a caller-supplied lookup.
pub fn expand_with<F>(input: &str, lookup: F) -> Result<String, EnvExpandError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut error = None;

    let expanded = VAR_PATTERN.replace_all(input, |caps: &Captures<'_>| {
        let Some(name) = caps.get(1).map(|m| m.as_str()) else {
            return "$".to_string();
        };
        let default = caps.get(2).map(|m| m.as_str());

        match (lookup(name), default) {
            (Some(value), _) if !value.is_empty() => value,
            (_, Some(default)) => default.to_string(),
            (Some(_), None) => {
                error.get_or_insert(EnvExpandError::EmptyVariable {
                    name: name.to_string(),
                });
                String::new()
            }
            (None, None) => {
                error.get_or_insert(EnvExpandError::MissingVariable {
                    name: name.to_string(),
                });
                String::new()
            }
        }
    });

    if let Some(err) = error {
        return Err(err);
    }
    if expanded.len() > MAX_EXPANDED_SIZE {
        return Err(EnvExpandError::SizeExceeded);
    }

    Ok(expanded.into_owned())
}
