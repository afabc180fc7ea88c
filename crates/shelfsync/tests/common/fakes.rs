//! Test doubles for the processor's collaborators.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use shelfsync::db::DatabaseError;
use shelfsync::model::{Account, Credential, Job, JobStage, JobStatus};
use shelfsync::upload::{UploadError, Uploader};
use shelfsync::{ConvertError, Converter, Database, JobStore, StoreError};

/// Converter that reports a fixed progress script, then copies the input.
#[derive(Default)]
pub struct ScriptedConverter {
    pub progress: Vec<u8>,
    pub fail_with: Option<String>,
    /// Runs after the progress script, before the output is written.
    pub hook: Option<Box<dyn Fn() + Send + Sync>>,
}

impl ScriptedConverter {
    pub fn with_progress(progress: &[u8]) -> Self {
        Self {
            progress: progress.to_vec(),
            ..Self::default()
        }
    }

    pub fn failing(progress: &[u8], message: &str) -> Self {
        Self {
            progress: progress.to_vec(),
            fail_with: Some(message.to_string()),
            hook: None,
        }
    }
}

impl Converter for ScriptedConverter {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<(), ConvertError> {
        for value in &self.progress {
            on_progress(*value);
        }
        if let Some(hook) = &self.hook {
            hook();
        }
        if let Some(message) = &self.fail_with {
            return Err(ConvertError::InvalidArchive(message.clone()));
        }
        std::fs::copy(input, output)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub account_id: i64,
    pub folder_id: String,
    pub file: PathBuf,
    pub name: String,
    pub file_existed: bool,
}

/// Uploader that records calls and answers with a view URL or a fixed error.
#[derive(Default)]
pub struct RecordingUploader {
    pub fail: bool,
    pub uploads: Mutex<Vec<RecordedUpload>>,
}

impl RecordingUploader {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(
        &self,
        account: &Account,
        file: &Path,
        name: &str,
    ) -> Result<String, UploadError> {
        self.uploads.lock().unwrap().push(RecordedUpload {
            account_id: account.id,
            folder_id: account.folder_id.clone(),
            file: file.to_path_buf(),
            name: name.to_string(),
            file_existed: file.is_file(),
        });
        if self.fail {
            return Err(UploadError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(format!("https://drive.google.com/file/d/{}/view", name))
    }
}

/// One `update_job` call as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedWrite {
    pub stage: JobStage,
    pub progress: u8,
}

/// Store wrapper that records job writes and can inject failures.
pub struct ObservedStore {
    pub inner: Database,
    pub writes: Mutex<Vec<ObservedWrite>>,
    pub update_attempts: AtomicUsize,
    /// Number of upcoming `update_job` calls that fail.
    pub fail_next_updates: AtomicUsize,
    pub fail_all_updates: AtomicBool,
    pub fail_get_account: AtomicBool,
}

impl ObservedStore {
    pub fn new(inner: Database) -> Self {
        Self {
            inner,
            writes: Mutex::new(Vec::new()),
            update_attempts: AtomicUsize::new(0),
            fail_next_updates: AtomicUsize::new(0),
            fail_all_updates: AtomicBool::new(false),
            fail_get_account: AtomicBool::new(false),
        }
    }

    pub fn writes(&self) -> Vec<ObservedWrite> {
        self.writes.lock().unwrap().clone()
    }

    fn injected_failure() -> StoreError {
        StoreError::Database(DatabaseError::LockPoisoned)
    }
}

impl JobStore for ObservedStore {
    fn next_queued_job(&self) -> Result<Option<Job>, StoreError> {
        self.inner.next_queued_job()
    }

    fn claim_job(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.claim_job(id)
    }

    fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        self.update_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_all_updates.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }
        let pending = self.fail_next_updates.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next_updates.store(pending - 1, Ordering::SeqCst);
            return Err(Self::injected_failure());
        }
        self.writes.lock().unwrap().push(ObservedWrite {
            stage: job.stage,
            progress: job.progress,
        });
        self.inner.update_job(job)
    }

    fn mark_job_completed(
        &self,
        id: &str,
        processed_filename: &str,
        url: &str,
    ) -> Result<(), StoreError> {
        self.inner.mark_job_completed(id, processed_filename, url)
    }

    fn mark_job_failed(&self, id: &str, message: &str) -> Result<(), StoreError> {
        self.inner.mark_job_failed(id, message)
    }

    fn get_account(&self, id: i64) -> Result<Account, StoreError> {
        if self.fail_get_account.load(Ordering::SeqCst) {
            return Err(StoreError::NotFound {
                entity: "account",
                id: id.to_string(),
            });
        }
        self.inner.get_account(id)
    }

    fn save_account_credential(
        &self,
        id: i64,
        credential: &Credential,
    ) -> Result<(), StoreError> {
        self.inner.save_account_credential(id, credential)
    }

    fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.create_job(job)
    }

    fn get_job(&self, id: &str) -> Result<Job, StoreError> {
        self.inner.get_job(id)
    }

    fn recent_jobs(&self, limit: u32) -> Result<Vec<Job>, StoreError> {
        self.inner.recent_jobs(limit)
    }

    fn count_by_status(&self, status: JobStatus) -> Result<u64, StoreError> {
        self.inner.count_by_status(status)
    }
}
