// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;

/// Access tokens are assumed valid for 29 minutes after issue
pub const ACCESS_TOKEN_TTL_SECS: i64 = 29 * 60;

/// Refresh tokens are assumed valid for 90 days after issue
pub const REFRESH_TOKEN_TTL_SECS: i64 = 90 * 24 * 60 * 60;

/// Persisted token pair with the instants each half was issued
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenState {
    pub access_token: Option<String>,
    pub access_issued_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub refresh_issued_at: Option<DateTime<Utc>>,
}

impl TokenState {
    /// Access token usable at `now` (strictly inside its window)
    pub fn access_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.access_issued_at) {
            (Some(_), Some(issued)) => now - issued < Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            _ => false,
        }
    }

    /// Refresh token past its window at `now`
    /// Exactly 90 days old is still refreshable
    pub fn refresh_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.refresh_issued_at {
            Some(issued) => now - issued > Duration::seconds(REFRESH_TOKEN_TTL_SECS),
            None => true,
        }
    }

    /// Classify this state at `now`
    pub fn status(&self, now: DateTime<Utc>) -> TokenStatus {
        if self.access_valid_at(now) {
            TokenStatus::AccessValid
        } else if self.refresh_token.is_none() || self.refresh_issued_at.is_none() {
            TokenStatus::NoTokens
        } else if self.refresh_expired_at(now) {
            TokenStatus::RefreshExpired
        } else {
            TokenStatus::AccessExpiredRefreshValid
        }
    }
}

/// Position of a token state in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Never authorized
    NoTokens,

    /// Cached access token can be used without a network call
    AccessValid,

    /// Access token stale, refresh token can mint a new one
    AccessExpiredRefreshValid,

    /// Only a new authorization-code exchange can recover
    RefreshExpired,
}

impl TokenStatus {
    /// Whether the user has to go through the consent flow again
    pub fn requires_reauth(self) -> bool {
        matches!(self, TokenStatus::NoTokens | TokenStatus::RefreshExpired)
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenStatus::NoTokens => "no tokens",
            TokenStatus::AccessValid => "access token valid",
            TokenStatus::AccessExpiredRefreshValid => "access token expired, refresh token valid",
            TokenStatus::RefreshExpired => "refresh token expired",
        };
        f.write_str(s)
    }
}

/// Outcome of asking for an Authorization header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BearerCredential {
    /// Full header value, `Bearer <access_token>`
    Bearer(String),

    /// Refresh token expired or missing; run the authorization-code flow
    ReauthRequired,
}

impl BearerCredential {
    pub fn from_access_token(access_token: &str) -> Self {
        BearerCredential::Bearer(format!("Bearer {}", access_token))
    }

    /// Header value, or `None` when re-authentication is required
    pub fn header_value(&self) -> Option<&str> {
        match self {
            BearerCredential::Bearer(value) => Some(value),
            BearerCredential::ReauthRequired => None,
        }
    }
}

/// Token endpoint response to a `refresh_token` grant
/// The provider only returns a refresh token when it rotates it
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Token endpoint response to an `authorization_code` grant
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationGrant {
    pub access_token: String,
    pub refresh_token: String,
}

/// Error body returned by the token endpoint on failure
#[derive(Debug, Deserialize)]
pub struct TokenErrorBody {
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn state(access_age: Duration, refresh_age: Duration) -> TokenState {
        let now = base();
        TokenState {
            access_token: Some("access".to_string()),
            access_issued_at: Some(now - access_age),
            refresh_token: Some("refresh".to_string()),
            refresh_issued_at: Some(now - refresh_age),
        }
    }

    #[test]
    fn test_default_state_has_no_tokens() {
        assert_eq!(TokenState::default().status(base()), TokenStatus::NoTokens);
    }

    #[test]
    fn test_access_window_boundary() {
        let just_inside = state(Duration::seconds(ACCESS_TOKEN_TTL_SECS - 1), Duration::days(1));
        assert_eq!(just_inside.status(base()), TokenStatus::AccessValid);

        // 29 minutes exactly is already stale
        let at_edge = state(Duration::minutes(29), Duration::days(1));
        assert_eq!(at_edge.status(base()), TokenStatus::AccessExpiredRefreshValid);
    }

    #[test]
    fn test_refresh_window_boundary() {
        let at_edge = state(Duration::hours(1), Duration::days(90));
        assert_eq!(at_edge.status(base()), TokenStatus::AccessExpiredRefreshValid);

        let past_edge = state(Duration::hours(1), Duration::days(90) + Duration::seconds(1));
        assert_eq!(past_edge.status(base()), TokenStatus::RefreshExpired);
    }

    #[test]
    fn test_access_without_timestamp_is_stale() {
        let mut s = state(Duration::minutes(1), Duration::days(1));
        s.access_issued_at = None;
        assert!(!s.access_valid_at(base()));
        assert_eq!(s.status(base()), TokenStatus::AccessExpiredRefreshValid);
    }

    #[test]
    fn test_missing_refresh_token_is_no_tokens() {
        let mut s = state(Duration::hours(1), Duration::days(1));
        s.refresh_token = None;
        assert_eq!(s.status(base()), TokenStatus::NoTokens);
    }

    #[test]
    fn test_valid_access_wins_over_expired_refresh() {
        let s = state(Duration::minutes(5), Duration::days(120));
        assert_eq!(s.status(base()), TokenStatus::AccessValid);
    }

    #[test]
    fn test_requires_reauth() {
        assert!(TokenStatus::NoTokens.requires_reauth());
        assert!(TokenStatus::RefreshExpired.requires_reauth());
        assert!(!TokenStatus::AccessValid.requires_reauth());
        assert!(!TokenStatus::AccessExpiredRefreshValid.requires_reauth());
    }

    #[test]
    fn test_bearer_credential() {
        let cred = BearerCredential::from_access_token("abc");
        assert_eq!(cred, BearerCredential::Bearer("Bearer abc".to_string()));
        assert_eq!(cred.header_value(), Some("Bearer abc"));
        assert_eq!(BearerCredential::ReauthRequired.header_value(), None);
    }

    #[test]
    fn test_refresh_grant_optional_refresh_token() {
        let grant: RefreshGrant = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(grant.access_token, "a");
        assert!(grant.refresh_token.is_none());
    }

    #[test]
    fn test_authorization_grant_requires_refresh_token() {
        let result = serde_json::from_str::<AuthorizationGrant>(r#"{"access_token":"a"}"#);
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn prop_fresh_access_is_valid(access_secs in 0i64..ACCESS_TOKEN_TTL_SECS, refresh_days in 0i64..400) {
            let s = state(Duration::seconds(access_secs), Duration::days(refresh_days));
            prop_assert_eq!(s.status(base()), TokenStatus::AccessValid);
        }

        #[test]
        fn prop_stale_access_with_live_refresh_needs_refresh(
            access_secs in ACCESS_TOKEN_TTL_SECS..REFRESH_TOKEN_TTL_SECS,
            refresh_secs in 0i64..=REFRESH_TOKEN_TTL_SECS,
        ) {
            let s = state(Duration::seconds(access_secs), Duration::seconds(refresh_secs));
            prop_assert_eq!(s.status(base()), TokenStatus::AccessExpiredRefreshValid);
        }

        #[test]
        fn prop_old_refresh_requires_reauth(
            access_secs in ACCESS_TOKEN_TTL_SECS..(2 * REFRESH_TOKEN_TTL_SECS),
            extra_secs in 1i64..(365 * 24 * 60 * 60),
        ) {
            let s = state(Duration::seconds(access_secs), Duration::seconds(REFRESH_TOKEN_TTL_SECS + extra_secs));
            prop_assert_eq!(s.status(base()), TokenStatus::RefreshExpired);
        }
    }
}
