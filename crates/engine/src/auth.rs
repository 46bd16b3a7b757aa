//! Shared-secret bearer checks
//!
//! Used by the trigger endpoints and by processors receiving dispatches.

use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Receiver has no secret configured
    #[error("shared secret is not configured")]
    NotConfigured,
    /// Header absent or not a bearer token
    #[error("unauthorized")]
    Missing,
    /// Token does not match
    #[error("forbidden")]
    Forbidden,
}

impl AuthError {
    /// HTTP status for this failure
    pub fn status(&self) -> u16 {
        match self {
            AuthError::NotConfigured => 500,
            AuthError::Missing => 401,
            AuthError::Forbidden => 403,
        }
    }
}

/// Check an `Authorization` header value against the expected secret
pub fn verify_bearer(header: Option<&str>, expected: Option<&str>) -> Result<(), AuthError> {
    let expected = expected
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::NotConfigured)?;
    let token = header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AuthError::Missing)?;

    if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}
