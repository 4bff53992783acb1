//! Required ACME fields and server URL validation

use url::Url;

use super::{ErrorCategory, ValidationError, ValidationResult};
use crate::issuer::AcmeIssuerConfig;

/// Validate the ACME block of an issuer
pub fn validate_acme(acme: &AcmeIssuerConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    if acme.server.trim().is_empty() {
        result.add_error(ValidationError::missing("server"));
    } else if let Err(message) = check_server_url(&acme.server) {
        result.add_error(ValidationError::new(ErrorCategory::Acme, message));
    }

    if acme.email.trim().is_empty() {
        result.add_error(ValidationError::missing("email"));
    }

    if acme.private_key_ref.name.trim().is_empty() {
        result.add_error(ValidationError::missing("privateKeyRef.name"));
    }

    result
}

fn check_server_url(server: &str) -> Result<(), String> {
    let url = Url::parse(server).map_err(|e| format!("invalid server URL '{}': {}", server, e))?;

    match url.scheme() {
        "https" | "http" => {}
        other => {
            return Err(format!(
                "server URL '{}' must use https (got scheme '{}')",
                server, other
            ))
        }
    }

    if url.host_str().is_none() {
        return Err(format!("server URL '{}' has no host", server));
    }

    Ok(())
}
