//! Google Drive uploader.
//!
//! Sends one multipart/related request per file (metadata + content) and
//! returns the file's view link. OAuth credentials close to expiry are
//! refreshed first and written back to the store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use super::oauth::{create_http_client, TokenRefresher};
use super::{sanitize_error_body, UploadError, Uploader};
use crate::config::DriveConfig;
use crate::model::{Account, Credential};
use crate::secrets::resolve_secret_optional;
use crate::store::JobStore;

/// Access tokens expiring within this many seconds are refreshed before use.
const REFRESH_BUFFER_SECS: u64 = 60;

const CONTENT_MIMETYPE: &str = "application/epub+zip";

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

pub struct DriveUploader {
    client: Client,
    upload_url: String,
    refresher: Option<TokenRefresher>,
    store: Arc<dyn JobStore>,
}

impl DriveUploader {
    pub fn new(
        client: Client,
        upload_url: impl Into<String>,
        refresher: Option<TokenRefresher>,
        store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            client,
            upload_url: upload_url.into(),
            refresher,
            store,
        }
    }

    /// Builds the uploader from config. Without a client id and secret, OAuth
    /// accounts can only be used until their access token expires.
    pub fn from_config(config: &DriveConfig, store: Arc<dyn JobStore>) -> Result<Self, UploadError> {
        let client = create_http_client(Duration::from_secs(config.request_timeout_secs))?;

        let secret = resolve_secret_optional(
            config.client_secret.as_deref(),
            config.client_secret_file.as_deref(),
            config.client_secret_env.as_deref(),
        )
        .map_err(|e| UploadError::Auth(e.to_string()))?;

        let refresher = match (config.client_id.as_deref(), secret) {
            (Some(client_id), Some(secret)) if !client_id.is_empty() => Some(TokenRefresher::new(
                client.clone(),
                config.token_url.clone(),
                client_id,
                secret,
            )),
            _ => {
                log::warn!("Drive client id/secret not configured; OAuth tokens will not be refreshed");
                None
            }
        };

        Ok(Self::new(client, config.upload_url.clone(), refresher, store))
    }

    /// Returns a usable bearer token for `account`, refreshing it when needed.
    async fn access_token(&self, account: &Account) -> Result<SecretString, UploadError> {
        let oauth = match &account.credential {
            Credential::ServiceToken(token) => return Ok(token.clone()),
            Credential::OAuth(oauth) => oauth,
        };

        if !oauth.is_expired(REFRESH_BUFFER_SECS) {
            return Ok(oauth.access_token.clone());
        }

        let refresher = match (&self.refresher, oauth.can_refresh()) {
            (Some(refresher), true) => refresher,
            _ => {
                return Err(UploadError::Auth(
                    "access token expired and cannot be refreshed".to_string(),
                ))
            }
        };

        let refreshed = refresher.refresh(oauth).await?;
        let token = refreshed.access_token.clone();

        if let Err(e) = self
            .store
            .save_account_credential(account.id, &Credential::OAuth(refreshed))
        {
            log::warn!("Failed to persist refreshed token for account {}: {}", account.id, e);
        }

        Ok(token)
    }
}

#[async_trait]
impl Uploader for DriveUploader {
    async fn upload(
        &self,
        account: &Account,
        file: &Path,
        name: &str,
    ) -> Result<String, UploadError> {
        let token = self.access_token(account).await?;

        let content = tokio::fs::read(file)
            .await
            .map_err(|e| UploadError::ReadFile {
                path: file.to_path_buf(),
                source: e,
            })?;

        let boundary = format!("shelfsync-{}", uuid::Uuid::new_v4().simple());
        let metadata = json!({ "name": name, "parents": [account.folder_id] });
        let body = multipart_related_body(&boundary, &metadata, CONTENT_MIMETYPE, &content);

        let response = self
            .client
            .post(&self.upload_url)
            .query(&[
                ("uploadType", "multipart"),
                ("supportsAllDrives", "true"),
                ("fields", "id"),
            ])
            .bearer_auth(token.expose_secret())
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Status {
                status,
                body: sanitize_error_body(&body),
            });
        }

        let created: CreatedFile = response
            .json()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;

        log::info!("Uploaded {} to folder {}", name, account.folder_id);
        Ok(view_url(&created.id))
    }
}

pub fn view_url(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{}/view", file_id)
}

fn multipart_related_body(
    boundary: &str,
    metadata: &serde_json::Value,
    content_type: &str,
    content: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: {content_type}\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
