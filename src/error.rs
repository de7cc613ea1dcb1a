// Error handling module
// Defines the failures surfaced by the token lifecycle

use thiserror::Error;

/// Errors that can occur while acquiring or refreshing tokens
///
/// Re-authentication is not represented here: an expired refresh token is a
/// normal outcome reported through [`crate::auth::BearerCredential::ReauthRequired`].
#[derive(Error, Debug)]
pub enum AuthError {
    /// Network failure, timeout or non-success status from the token endpoint
    #[error("Token exchange failed: {message}")]
    TokenExchangeFailed {
        status: Option<u16>,
        message: String,
    },

    /// Redirect URI without a usable `code=` parameter
    #[error("Malformed authorization redirect: {0}")]
    MalformedAuthorizationRedirect(String),

    /// Token endpoint answered, but not with the fields we need
    #[error("Malformed token response: {0}")]
    MalformedTokenResponse(String),

    /// Failure reading or writing the token store
    #[error("Token store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl AuthError {
    /// HTTP status of a failed exchange, if the endpoint answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::TokenExchangeFailed { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection_failed"
        } else if e.is_body() || e.is_decode() {
            "body_error"
        } else {
            "request_error"
        };

        AuthError::TokenExchangeFailed {
            status: e.status().map(|s| s.as_u16()),
            message: format!("{} (kind: {})", e, kind),
        }
    }
}

/// Result type alias for token operations
pub type Result<T> = std::result::Result<T, AuthError>;
