//! # Validation Module
//!
//! Rules applied to tenant configuration before any tenant starts.
//!
//! ## Tenant Name Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Tenant names come from config file names:                             │
//! │                                                                         │
//! │     acme-tenant-config.toml      → "acme"        ✅                     │
//! │     acme-eu-tenant-config.toml   → "acme-eu"     ✅                     │
//! │     Acme-tenant-config.toml      → "Acme"        ❌ uppercase           │
//! │     -acme-tenant-config.toml     → "-acme"       ❌ leading dash        │
//! │     acme--eu-tenant-config.toml  → "acme--eu"    ❌ double dash         │
//! │                                                                         │
//! │  Pattern: ^[a-z0-9]+(-[a-z0-9]+)*$                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a tenant name.
///
/// ## Example
/// ```rust
/// use confluence_core::validation::validate_tenant_name;
///
/// assert!(validate_tenant_name("acme-eu").is_ok());
/// assert!(validate_tenant_name("acme--eu").is_err());
/// ```
pub fn validate_tenant_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "tenant name".to_string(),
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid_tenant_name(
            name,
            "must contain only lowercase letters, digits, and dashes",
        ));
    }

    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid_tenant_name(name, "must not start or end with a dash"));
    }

    if name.contains("--") {
        return Err(invalid_tenant_name(name, "must not contain consecutive dashes"));
    }

    Ok(())
}

fn invalid_tenant_name(name: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidFormat {
        field: "tenant name".to_string(),
        reason: format!("'{}' {}", name, reason),
    }
}

/// Validates an absolute http(s) base URL without a trailing slash.
pub fn validate_base_url(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    let parsed = url::Url::parse(value).map_err(|e| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: e.to_string(),
    })?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    if value.ends_with('/') {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not end with a trailing slash".to_string(),
        });
    }

    Ok(())
}

/// Validates that a string field is present.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a positive count (rate limits, concurrency, timeouts).
pub fn validate_positive(field: &str, value: u64) -> ValidationResult<()> {
    if value == 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tenant_names() {
        for name in ["acme", "acme-eu", "a1-b2-c3", "0"] {
            assert!(validate_tenant_name(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_tenant_names() {
        for name in ["", "Acme", "-acme", "acme-", "acme--eu", "acme_eu", "acme eu"] {
            assert!(validate_tenant_name(name).is_err(), "{} should be invalid", name);
        }
    }

    #[test]
    fn test_validate_base_url() {
        assert!(validate_base_url("base_url", "https://acme.atlassian.net").is_ok());
        assert!(validate_base_url("base_url", "https://acme.atlassian.net/").is_err());
        assert!(validate_base_url("base_url", "ftp://acme").is_err());
        assert!(validate_base_url("base_url", "").is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive("concurrency", 1).is_ok());
        assert!(validate_positive("concurrency", 0).is_err());
    }
}
