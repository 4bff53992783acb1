//! Challenge polling validation

use super::{ErrorCategory, ValidationError, ValidationResult};
use crate::solver::PollingConfig;

/// Validate challenge polling settings
///
/// A zero interval would re-run checks back to back; a zero timeout gives
/// up before the first check.
pub fn validate_polling(polling: &PollingConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    if polling.interval_millis == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Polling,
            "intervalMillis must be greater than zero",
        ));
    }
    if polling.timeout_secs == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Polling,
            "timeoutSecs must be greater than zero",
        ));
    }

    result
}
