//! # Error Types
//!
//! Validation errors raised by the pure helpers of confluence-core.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  confluence-core (this file)                                           │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  confluence-sync (separate crate)                                      │
//! │  └── SyncError        - Config, transport and pipeline failures        │
//! │                                                                         │
//! │  Flow: ValidationError → SyncError::InvalidConfig → structured log     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Input validation errors.
///
/// These errors occur when tenant configuration does not meet requirements.
/// Used for early validation before any tenant is started.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid tenant name, invalid URL).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidFormat {
            field: "tenant name".into(),
            reason: "must not start with a dash".into(),
        };
        assert_eq!(
            err.to_string(),
            "tenant name has invalid format: must not start with a dash"
        );
        assert_eq!(
            ValidationError::Required {
                field: "base_url".into()
            }
            .to_string(),
            "base_url is required"
        );
    }
}
