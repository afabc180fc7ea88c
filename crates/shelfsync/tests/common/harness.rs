//! Test harness for isolated processor and worker runs.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tempfile::TempDir;

use shelfsync::store::register_account;
use shelfsync::{
    Account, Converter, Credential, Database, Job, JobProcessor, JobStore, NewAccount,
    RetryPolicy, TempWorkspace, Uploader,
};

use super::fakes::{ObservedStore, RecordingUploader, ScriptedConverter};

/// Minimal bytes that pass as an EPUB for the scripted converter.
pub const FAKE_EPUB: &[u8] = b"PK\x03\x04 not really a book";

/// Isolated environment: temp workspace, in-memory database, one account.
pub struct TestHarness {
    /// Keeps the temp workspace alive for the harness' lifetime.
    pub temp_dir: TempDir,
    pub db: Database,
    pub store: Arc<ObservedStore>,
    pub workspace: TempWorkspace,
    pub account: Account,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::open_in_memory().expect("Failed to open database");
        let account = register_account(
            &db,
            &NewAccount {
                name: "reader".to_string(),
                folder_id: "folder-123".to_string(),
                credential: Credential::ServiceToken(SecretString::from("service-token")),
                user_email: Some("reader@example.com".to_string()),
            },
        )
        .expect("Failed to register account");

        let workspace = TempWorkspace::new(temp_dir.path());
        let store = Arc::new(ObservedStore::new(db.clone()));

        Self {
            temp_dir,
            db,
            store,
            workspace,
            account,
        }
    }

    /// Store handle as the processor and worker see it.
    pub fn job_store(&self) -> Arc<dyn JobStore> {
        self.store.clone()
    }

    /// Writes an inbound file at `<temp>/<name>`.
    pub fn stage_input(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, FAKE_EPUB).expect("Failed to stage input");
        path
    }

    /// Inserts a queued job without staging its input.
    pub fn queue_job(&self, name: &str) -> Job {
        let job = Job::new(self.account.id, name);
        self.db.create_job(&job).expect("Failed to create job");
        job
    }

    /// Stages the input and queues a job for it.
    pub fn queue_staged(&self, name: &str) -> Job {
        self.stage_input(name);
        self.queue_job(name)
    }

    pub fn reload(&self, job: &Job) -> Job {
        self.db.get_job(&job.id).expect("Failed to reload job")
    }

    pub fn processor(
        &self,
        converter: impl Converter + 'static,
        uploader: Arc<RecordingUploader>,
    ) -> JobProcessor {
        self.processor_with_retry(converter, uploader, RetryPolicy::new(3, Duration::ZERO))
    }

    pub fn processor_with_retry(
        &self,
        converter: impl Converter + 'static,
        uploader: Arc<RecordingUploader>,
        retry: RetryPolicy,
    ) -> JobProcessor {
        let uploader: Arc<dyn Uploader> = uploader;
        JobProcessor::new(
            self.job_store(),
            Arc::new(converter),
            uploader,
            self.workspace.clone(),
            retry,
        )
    }

    /// Processor with a converter that reports 0, 50, 100 and copies the input.
    pub fn default_processor(&self, uploader: Arc<RecordingUploader>) -> JobProcessor {
        self.processor(ScriptedConverter::with_progress(&[0, 50, 100]), uploader)
    }
}
