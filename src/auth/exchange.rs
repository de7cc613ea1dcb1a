// Token endpoint exchanges

use anyhow::Context;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::types::{AuthorizationGrant, RefreshGrant, TokenErrorBody};
use crate::error::{AuthError, Result};

/// HTTP client for the OAuth2 token endpoint
pub struct TokenClient {
    client: Client,
    token_url: String,
    api_key: String,
    redirect_uri: String,
}

impl TokenClient {
    /// Create a token client; every request is bounded by `timeout_secs`
    pub fn new(
        token_url: impl Into<String>,
        api_key: impl Into<String>,
        redirect_uri: impl Into<String>,
        timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            token_url: token_url.into(),
            api_key: api_key.into(),
            redirect_uri: redirect_uri.into(),
        })
    }

    /// Mint a new access token from a refresh token
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant> {
        tracing::info!("Refreshing access token...");

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.api_key.as_str()),
        ];

        let grant: RefreshGrant = self.post_form(&form).await?;
        ensure_access_token(&grant.access_token)?;

        tracing::info!(
            rotated_refresh_token = grant.refresh_token.is_some(),
            "Access token refreshed"
        );
        Ok(grant)
    }

    /// Trade an authorization code for the initial token pair
    pub async fn exchange_code(&self, code: &str) -> Result<AuthorizationGrant> {
        tracing::info!("Exchanging authorization code for tokens...");

        let form = [
            ("grant_type", "authorization_code"),
            ("access_type", "offline"),
            ("code", code),
            ("client_id", self.api_key.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let grant: AuthorizationGrant = self.post_form(&form).await?;
        ensure_access_token(&grant.access_token)?;
        if grant.refresh_token.is_empty() {
            return Err(AuthError::MalformedTokenResponse(
                "authorization response contains an empty refresh_token".to_string(),
            ));
        }

        tracing::info!("Authorization code exchanged");
        Ok(grant)
    }

    async fn post_form<T: DeserializeOwned>(&self, form: &[(&str, &str)]) -> Result<T> {
        tracing::debug!(url = %self.token_url, "Sending token request");

        let response = self
            .client
            .post(&self.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                "Token exchange failed: status={}, body={}",
                status,
                body
            );

            // Try to parse the OAuth error for more details
            if let Ok(TokenErrorBody {
                error: Some(error_code),
                error_description,
            }) = serde_json::from_str::<TokenErrorBody>(&body)
            {
                tracing::error!(
                    "Token endpoint error details: error={}, description={}",
                    error_code,
                    error_description.unwrap_or_default()
                );
            }

            return Err(AuthError::TokenExchangeFailed {
                status: Some(status.as_u16()),
                message: format!("{} - {}", status, body),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| AuthError::MalformedTokenResponse(format!("{}", e)))
    }
}

fn ensure_access_token(access_token: &str) -> Result<()> {
    if access_token.is_empty() {
        return Err(AuthError::MalformedTokenResponse(
            "response contains an empty access_token".to_string(),
        ));
    }
    Ok(())
}
