pub mod account;
pub mod job;

pub use account::{Account, AccountSummary, Credential, NewAccount, OAuthCredential};
pub use job::{timestamp_now, Job, JobStage, JobStatus};

use thiserror::Error;

/// A stored enum value that does not name a known variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
