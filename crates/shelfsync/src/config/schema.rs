use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Shared directory for inbound uploads and per-job work directories.
    #[serde(default = "default_temp_directory")]
    pub temp_directory: PathBuf,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Temp entries older than this are swept.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_persist_attempts")]
    pub persist_attempts: u32,
    #[serde(default = "default_persist_backoff_ms")]
    pub persist_backoff_ms: u64,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub drive: DriveConfig,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./shelfsync.db")
}

fn default_temp_directory() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_cleanup_interval_secs() -> u64 {
    600
}

fn default_stale_after_secs() -> u64 {
    3600
}

fn default_persist_attempts() -> u32 {
    3
}

fn default_persist_backoff_ms() -> u64 {
    200
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            temp_directory: default_temp_directory(),
            poll_interval_secs: default_poll_interval_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            persist_attempts: default_persist_attempts(),
            persist_backoff_ms: default_persist_backoff_ms(),
            log_format: LogFormat::default(),
            drive: DriveConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn persist_backoff(&self) -> Duration {
        Duration::from_millis(self.persist_backoff_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Drive API client settings. The client secret follows the usual
/// direct / file / env resolution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_secret_file: Option<String>,
    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: Option<String>,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_client_secret_env() -> Option<String> {
    Some("GOOGLE_CLIENT_SECRET".to_string())
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_upload_url() -> String {
    "https://www.googleapis.com/upload/drive/v3/files".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            client_secret_file: None,
            client_secret_env: default_client_secret_env(),
            token_url: default_token_url(),
            upload_url: default_upload_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
