//! OAuth2 refresh-token grant.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::info;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{sanitize_error_body, UploadError};
use crate::model::{timestamp_now, OAuthCredential};

/// Token lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Builds the refreshed credential. Providers usually omit the refresh
    /// token on refresh, in which case the previous one is kept.
    ///
    /// Fails with [`UploadError::InvalidResponse`] when `expires_in` does not
    /// fit a timestamp.
    pub fn into_credential(
        self,
        previous_refresh: Option<&SecretString>,
        now: DateTime<Utc>,
    ) -> Result<OAuthCredential, UploadError> {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let expires_at = i64::try_from(expires_in)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                UploadError::InvalidResponse(format!("Token lifetime out of range: {}", expires_in))
            })?;

        Ok(OAuthCredential {
            access_token: SecretString::from(self.access_token),
            refresh_token: self
                .refresh_token
                .map(SecretString::from)
                .or_else(|| previous_refresh.cloned()),
            expires_at,
        })
    }
}

pub struct TokenRefresher {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl TokenRefresher {
    pub fn new(
        client: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret,
        }
    }

    pub async fn refresh_access_token(
        &self,
        refresh_token: &SecretString,
    ) -> Result<TokenResponse, UploadError> {
        info!("Refreshing access token");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("refresh_token", refresh_token.expose_secret()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| UploadError::Auth(format!("Token refresh failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Auth(format!(
                "Token refresh failed ({}): {}",
                status,
                sanitize_error_body(&body)
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Auth(format!("Failed to parse refresh response: {}", e)))?;

        info!("Successfully refreshed access token");
        Ok(token)
    }

    /// Refreshes `credential` and returns its replacement.
    pub async fn refresh(
        &self,
        credential: &OAuthCredential,
    ) -> Result<OAuthCredential, UploadError> {
        let refresh_token = credential
            .refresh_token
            .as_ref()
            .ok_or_else(|| UploadError::Auth("No refresh token available".to_string()))?;
        let token = self.refresh_access_token(refresh_token).await?;
        token.into_credential(Some(refresh_token), timestamp_now())
    }
}

/// HTTP client with the timeouts used for provider calls.
pub fn create_http_client(request_timeout: Duration) -> Result<Client, UploadError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(request_timeout)
        .build()
        .map_err(|e| UploadError::Client(format!("Failed to create HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_keeps_previous_refresh_token() {
        let now = timestamp_now();
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"new","expires_in":120,"token_type":"Bearer"}"#)
                .unwrap();
        let previous = SecretString::from("old-refresh");
        let credential = response.into_credential(Some(&previous), now).unwrap();

        assert_eq!(credential.access_token.expose_secret(), "new");
        assert_eq!(
            credential.refresh_token.as_ref().map(|t| t.expose_secret()),
            Some("old-refresh")
        );
        assert_eq!(credential.expires_at, now + chrono::Duration::seconds(120));
    }

    #[test]
    fn test_token_response_default_lifetime() {
        let now = timestamp_now();
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","refresh_token":"r2"}"#).unwrap();
        let credential = response.into_credential(None, now).unwrap();
        assert_eq!(credential.expires_at, now + chrono::Duration::seconds(3600));
        assert_eq!(
            credential.refresh_token.as_ref().map(|t| t.expose_secret()),
            Some("r2")
        );
    }

    #[test]
    fn test_token_response_lifetime_out_of_range() {
        let now = timestamp_now();
        for expires_in in [u64::MAX, 10_000_000_000_000_000, i64::MAX as u64] {
            let response = TokenResponse {
                access_token: "a".to_string(),
                refresh_token: None,
                expires_in: Some(expires_in),
                token_type: None,
            };
            let err = response.into_credential(None, now).unwrap_err();
            assert!(matches!(err, UploadError::InvalidResponse(_)), "{expires_in}");
        }
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let refresher = TokenRefresher::new(
            create_http_client(Duration::from_secs(1)).unwrap(),
            "http://127.0.0.1:9/token",
            "client",
            SecretString::from("secret"),
        );
        let credential = OAuthCredential {
            access_token: SecretString::from("a"),
            refresh_token: None,
            expires_at: timestamp_now(),
        };
        let err = refresher.refresh(&credential).await.unwrap_err();
        assert!(matches!(err, UploadError::Auth(_)));
    }
}
