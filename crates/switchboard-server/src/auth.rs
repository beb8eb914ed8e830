//! Request authentication.
//!
//! The server does not validate credentials itself. It sits behind a gateway
//! that does, and reads the authenticated user from a request header.

use axum::http::{HeaderMap, HeaderName};
use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The request carries no usable user id.
    #[error("Missing user id")]
    MissingUser,

    /// The configured header name is not a valid HTTP header name.
    #[error("Invalid header name: {0}")]
    InvalidHeader(String),
}

/// Maps an upgrade request to a user id.
pub trait Authenticator: Send + Sync {
    /// Identify the user making the request.
    fn authenticate(&self, headers: &HeaderMap) -> Result<String, AuthError>;
}

/// Trusts a user id header set by an upstream gateway.
#[derive(Debug, Clone)]
pub struct HeaderAuthenticator {
    header: HeaderName,
}

impl HeaderAuthenticator {
    /// Read the user id from `header`.
    ///
    /// # Errors
    ///
    /// Returns an error if `header` is not a valid header name.
    pub fn new(header: &str) -> Result<Self, AuthError> {
        let header = HeaderName::try_from(header)
            .map_err(|_| AuthError::InvalidHeader(header.to_string()))?;
        Ok(Self { header })
    }
}

impl Authenticator for HeaderAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let user_id = headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AuthError::MissingUser)?;

        Ok(user_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_present() {
        let auth = HeaderAuthenticator::new("x-user-id").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static(" alice "));

        assert_eq!(auth.authenticate(&headers).unwrap(), "alice");
    }

    #[test]
    fn test_header_missing_or_blank() {
        let auth = HeaderAuthenticator::new("x-user-id").unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(auth.authenticate(&headers), Err(AuthError::MissingUser));

        headers.insert("x-user-id", HeaderValue::from_static(""));
        assert_eq!(auth.authenticate(&headers), Err(AuthError::MissingUser));
    }

    #[test]
    fn test_header_name_is_case_insensitive() {
        let auth = HeaderAuthenticator::new("X-Forwarded-User").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-user", HeaderValue::from_static("bob"));

        assert_eq!(auth.authenticate(&headers).unwrap(), "bob");
    }

    #[test]
    fn test_invalid_header_name() {
        assert!(matches!(
            HeaderAuthenticator::new("bad header"),
            Err(AuthError::InvalidHeader(_))
        ));
    }
}
