use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::authorization::extract_authorization_code;
use super::clock::Clock;
use super::exchange::TokenClient;
use super::store::{self, TokenStore};
use super::types::{BearerCredential, TokenState, TokenStatus};
use crate::error::Result;

/// Token lifecycle manager
/// Hands out bearer credentials, refreshing or asking for re-authentication as needed
pub struct TokenManager {
    /// Persisted token record
    store: Arc<dyn TokenStore>,

    /// Time source for expiry checks
    clock: Arc<dyn Clock>,

    /// Token endpoint client
    client: TokenClient,

    /// Serialises read-check-refresh-write so one expiry causes one refresh
    lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>, client: TokenClient) -> Self {
        Self {
            store,
            clock,
            client,
            lock: Mutex::new(()),
        }
    }

    /// Get an Authorization header value, refreshing the access token if it is stale
    ///
    /// Returns [`BearerCredential::ReauthRequired`] without touching the network
    /// when no usable refresh token is stored.
    pub async fn get_bearer_credential(&self) -> Result<BearerCredential> {
        let _guard = self.lock.lock().await;

        let now = self.clock.now();
        let state = store::load_state(self.store.as_ref())?;

        match state.status(now) {
            TokenStatus::AccessValid => {
                let token = state.access_token.as_deref().unwrap_or_default();
                tracing::debug!("Using cached access token ({}...)", prefix(token));
                Ok(BearerCredential::from_access_token(token))
            }
            TokenStatus::NoTokens => {
                tracing::warn!("No refresh token stored, authorization required");
                Ok(BearerCredential::ReauthRequired)
            }
            TokenStatus::RefreshExpired => {
                tracing::warn!(
                    "Refresh token issued at {} has expired, re-authentication required",
                    state
                        .refresh_issued_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default()
                );
                Ok(BearerCredential::ReauthRequired)
            }
            TokenStatus::AccessExpiredRefreshValid => {
                let refresh_token = state.refresh_token.as_deref().unwrap_or_default();
                let refreshed = self.refresh_access_token(refresh_token).await?;
                let token = refreshed.access_token.as_deref().unwrap_or_default();
                Ok(BearerCredential::from_access_token(token))
            }
        }
    }

    /// Mint a new access token and persist it
    ///
    /// The caller is responsible for checking that `refresh_token` has not expired.
    /// The stored refresh token is only replaced when the provider rotates it.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenState> {
        let grant = self.client.refresh(refresh_token).await.map_err(|e| {
            tracing::error!("Token refresh failed: {}", e);
            e
        })?;

        let now = self.clock.now();
        store::save_tokens(
            self.store.as_ref(),
            &grant.access_token,
            grant.refresh_token.as_deref(),
            now,
        )?;

        tracing::info!(
            "Access token stored ({}...), valid until {}",
            prefix(&grant.access_token),
            access_expiry(now).to_rfc3339()
        );

        Ok(store::load_state(self.store.as_ref())?)
    }

    /// Finish the consent flow from the redirect URI the browser landed on
    pub async fn complete_authorization(&self, redirect_uri: &str) -> Result<TokenState> {
        let code = extract_authorization_code(redirect_uri)?;

        let _guard = self.lock.lock().await;

        let grant = self.client.exchange_code(&code).await.map_err(|e| {
            tracing::error!("Authorization code exchange failed: {}", e);
            e
        })?;

        let now = self.clock.now();
        store::save_tokens(
            self.store.as_ref(),
            &grant.access_token,
            Some(&grant.refresh_token),
            now,
        )?;

        tracing::info!("✅ Authorization complete, tokens stored");

        Ok(store::load_state(self.store.as_ref())?)
    }

    /// Currently persisted token record
    pub fn state(&self) -> Result<TokenState> {
        Ok(store::load_state(self.store.as_ref())?)
    }

    /// Where the persisted tokens sit in their lifecycle right now
    pub fn status(&self) -> Result<TokenStatus> {
        Ok(self.state()?.status(self.clock.now()))
    }
}

fn access_expiry(issued_at: DateTime<Utc>) -> DateTime<Utc> {
    issued_at + chrono::Duration::seconds(super::types::ACCESS_TOKEN_TTL_SECS)
}

/// Short, log-safe prefix of a token
fn prefix(token: &str) -> String {
    token.chars().take(8).collect()
}
