//! Bearer-token authentication for state-mutating endpoints.
//!
//! Authentication is optional. When `TIMIFY_API_TOKEN` is configured, callers
//! of `POST /tracking-started` must send `Authorization: Bearer <token>`.
//! Tokens are compared in constant time.
//!
//! # Example
//!
//! ```rust
//! use timify_server::auth::{validate_token, AuthError};
//!
//! assert!(validate_token("secret", "secret").is_ok());
//! assert_eq!(validate_token("guess", "secret"), Err(AuthError::InvalidToken));
//! ```

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Authentication scheme expected in the `Authorization` header.
const BEARER_SCHEME: &str = "Bearer";

/// Errors that can occur during request authentication.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer token was supplied.
    #[error("missing bearer token")]
    MissingToken,

    /// The supplied token does not match.
    #[error("invalid token")]
    InvalidToken,
}

/// Compares `provided` against `expected` in constant time.
///
/// # Errors
///
/// Returns [`AuthError::InvalidToken`] if the tokens differ.
pub fn validate_token(provided: &str, expected: &str) -> Result<(), AuthError> {
    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(AuthError::InvalidToken)
    }
}

/// Extracts the bearer token from request headers.
///
/// The scheme is matched case-insensitively. Returns `None` if the header is
/// absent, not UTF-8, uses another scheme, or carries an empty token.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return None;
    }
    Some(token.trim()).filter(|token| !token.is_empty())
}

/// Checks the request against an optional expected token.
///
/// Always succeeds when `expected` is `None`.
///
/// # Errors
///
/// - [`AuthError::MissingToken`] - a token is required but none was sent
/// - [`AuthError::InvalidToken`] - the token does not match
pub fn authorize(headers: &HeaderMap, expected: Option<&str>) -> Result<(), AuthError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = bearer_token(headers).ok_or(AuthError::MissingToken)?;
    validate_token(provided, expected)
}
