//! Job record: one file's conversion-and-upload lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::ParseEnumError;

/// Coarse job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ParseEnumError::new("job status", other)),
        }
    }
}

/// Fine-grained step within a job's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    Starting,
    Converting,
    Uploading,
    Cleanup,
    Completed,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Queued => "queued",
            JobStage::Starting => "starting",
            JobStage::Converting => "converting",
            JobStage::Uploading => "uploading",
            JobStage::Cleanup => "cleanup",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        }
    }

    /// Human-readable description shown next to the progress bar.
    pub fn message(&self) -> &'static str {
        match self {
            JobStage::Queued => "Queued",
            JobStage::Starting => "Starting",
            JobStage::Converting => "Converting to kepub",
            JobStage::Uploading => "Uploading to Drive",
            JobStage::Cleanup => "Cleaning up",
            JobStage::Completed => "Completed",
            JobStage::Failed => "Failed",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStage {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStage::Queued),
            "starting" => Ok(JobStage::Starting),
            "converting" => Ok(JobStage::Converting),
            "uploading" => Ok(JobStage::Uploading),
            "cleanup" => Ok(JobStage::Cleanup),
            "completed" => Ok(JobStage::Completed),
            "failed" => Ok(JobStage::Failed),
            other => Err(ParseEnumError::new("job stage", other)),
        }
    }
}

/// A queued conversion-and-upload task.
///
/// Serializes to the record the status page polls for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier (UUID), stable for the job's lifetime.
    pub id: String,
    /// Owning account.
    pub account_id: i64,
    /// Filename as uploaded; also the inbound file's name in the temp directory.
    pub original_filename: String,
    /// Cleaned destination filename, set on success.
    pub processed_filename: Option<String>,
    pub status: JobStatus,
    /// Overall progress in [0, 100].
    pub progress: u8,
    pub stage: JobStage,
    /// Human-readable status message.
    pub message: Option<String>,
    /// Shareable link to the uploaded file, set on success.
    pub drive_url: Option<String>,
    /// Failure description, set when the job fails.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set if and only if `status` is `completed`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a job in the `queued` state.
    pub fn new(account_id: i64, original_filename: impl Into<String>) -> Self {
        let now = timestamp_now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id,
            original_filename: original_filename.into(),
            processed_filename: None,
            status: JobStatus::Queued,
            progress: 0,
            stage: JobStage::Queued,
            message: Some(JobStage::Queued.message().to_string()),
            drive_url: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Moves the job to a new stage and refreshes its message and timestamp.
    pub fn advance(&mut self, stage: JobStage, progress: u8) {
        self.stage = stage;
        self.progress = progress.min(100);
        self.message = Some(stage.message().to_string());
        self.touch();
    }

    /// Raises progress without ever lowering it.
    pub fn raise_progress(&mut self, progress: u8) -> bool {
        let progress = progress.min(100);
        if progress <= self.progress {
            return false;
        }
        self.progress = progress;
        self.touch();
        true
    }

    pub fn touch(&mut self) {
        self.updated_at = timestamp_now();
    }
}

/// Current time at the precision the store keeps (microseconds).
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
