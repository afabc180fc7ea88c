pub mod drive;
pub mod oauth;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::model::Account;

pub use drive::DriveUploader;
pub use oauth::{TokenRefresher, TokenResponse};

/// Maximum length of a remote error body kept in logs and job errors.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Truncates remote error bodies, which may echo request details.
pub(crate) fn sanitize_error_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Pushes a finished file to an account's destination folder.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Uploads `file` under `name` and returns a shareable URL.
    async fn upload(&self, account: &Account, file: &Path, name: &str)
        -> Result<String, UploadError>;
}
