use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::convert::Converter;
use crate::model::{Job, JobStage, JobStatus};
use crate::sanitize;
use crate::store::JobStore;
use crate::upload::Uploader;
use crate::worker::TempWorkspace;

use super::error::PipelineError;
use super::retry::RetryPolicy;

/// Terminal result of one processor run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        processed_filename: String,
        url: String,
    },
    Failed {
        error: String,
    },
    /// The job was no longer queued when the claim was attempted.
    Skipped,
}

/// Maps a converter percentage onto the converting sub-range [25, 75].
pub fn map_progress(value: u8) -> u8 {
    let value = u16::from(value.min(100));
    (25 + value * 50 / 100) as u8
}

/// Runs a single job from `queued` to a terminal state.
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    converter: Arc<dyn Converter>,
    uploader: Arc<dyn Uploader>,
    workspace: TempWorkspace,
    retry: RetryPolicy,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        converter: Arc<dyn Converter>,
        uploader: Arc<dyn Uploader>,
        workspace: TempWorkspace,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            converter,
            uploader,
            workspace,
            retry,
        }
    }

    /// Claims and runs `job`. Every failure ends in a single `failed` write;
    /// nothing is retried at the job level.
    pub async fn run(&self, job: Job) -> JobOutcome {
        let span = info_span!("pipeline",
            job_id = %job.id,
            filename = %sanitize::redact_path(Path::new(&job.original_filename)),
        );
        self.run_claimed(job).instrument(span).await
    }

    async fn run_claimed(&self, mut job: Job) -> JobOutcome {
        // Step 1: claim
        match self.step_claim(&mut job).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Job {} is no longer queued, skipping", job.id);
                return JobOutcome::Skipped;
            }
            Err(e) => return self.fail_job(&job, e).await,
        }

        let _in_flight = self.workspace.begin(&job.id);
        match self.execute(&mut job).await {
            Ok(outcome) => outcome,
            Err(e) => self.fail_job(&job, e).await,
        }
    }

    async fn execute(&self, job: &mut Job) -> Result<JobOutcome, PipelineError> {
        // Step 2: locate the inbound file
        let inbound = self.step_resolve_input(job)?;

        // Step 3
        self.persist_stage(job, JobStage::Converting, 25).await?;

        // Step 4: per-job work directory
        let cleaned = sanitize::clean_filename(&job.original_filename);
        let (input, output) = {
            let _step = info_span!("prepare_output").entered();
            self.step_prepare_output(job, &inbound, &cleaned)?
        };

        // Step 5
        {
            let _step = info_span!("convert").entered();
            self.step_convert(job, &input, &output)?;
        }

        // Step 6
        self.persist_stage(job, JobStage::Uploading, 75).await?;

        // Step 7
        let account = self
            .store
            .get_account(job.account_id)
            .map_err(PipelineError::Account)?;

        // Step 8
        let url = self
            .uploader
            .upload(&account, &output, &cleaned)
            .instrument(info_span!("upload", account = %account.name))
            .await?;

        // Step 9
        self.persist_stage(job, JobStage::Cleanup, 90).await?;

        // Step 10
        {
            let _step = info_span!("cleanup").entered();
            self.step_cleanup(job, &input, &output);
        }

        // Step 11: the only terminal success write
        self.retry
            .run_async("mark completed", || {
                self.store.mark_job_completed(&job.id, &cleaned, &url)
            })
            .await
            .map_err(PipelineError::Persist)?;

        info!("Job {} completed: {}", job.id, cleaned);
        Ok(JobOutcome::Completed {
            processed_filename: cleaned,
            url,
        })
    }

    async fn step_claim(&self, job: &mut Job) -> Result<bool, PipelineError> {
        let claimed = self
            .retry
            .run_async("claim job", || self.store.claim_job(&job.id))
            .await
            .map_err(PipelineError::Persist)?;
        if claimed {
            job.status = JobStatus::Processing;
            job.advance(JobStage::Starting, 0);
        }
        Ok(claimed)
    }

    /// The inbound file sits at `<temp>/<original>` until the job starts.
    fn step_resolve_input(&self, job: &Job) -> Result<PathBuf, PipelineError> {
        self.workspace
            .inbound_path(&job.original_filename)
            .filter(|inbound| inbound.is_file())
            .ok_or(PipelineError::InputNotFound)
    }

    fn step_prepare_output(
        &self,
        job: &Job,
        inbound: &Path,
        cleaned: &str,
    ) -> Result<(PathBuf, PathBuf), PipelineError> {
        let job_dir = self.workspace.job_dir(&job.id);
        std::fs::create_dir_all(&job_dir).map_err(PipelineError::PrepareOutput)?;

        let input = job_dir.join(&job.original_filename);
        std::fs::rename(inbound, &input).map_err(PipelineError::PrepareOutput)?;

        let output = job_dir.join(cleaned);
        debug!(
            "Prepared {} -> {}",
            sanitize::redact_path(&input),
            sanitize::redact_path(&output)
        );
        Ok((input, output))
    }

    fn step_convert(&self, job: &mut Job, input: &Path, output: &Path) -> Result<(), PipelineError> {
        let store = &self.store;
        let retry = &self.retry;

        let mut on_progress = |value: u8| {
            if !job.raise_progress(map_progress(value)) {
                job.touch();
            }
            if let Err(e) = retry.run("progress update", || store.update_job(job)) {
                error!("Dropping progress update for job {}: {}", job.id, e);
            }
        };

        self.converter.convert(input, output, &mut on_progress)?;
        Ok(())
    }

    fn step_cleanup(&self, job: &Job, input: &Path, output: &Path) {
        for path in [input, output] {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(
                    "Failed to remove temp file {}: {}",
                    sanitize::redact_path(path),
                    e
                );
            }
        }
        let job_dir = self.workspace.job_dir(&job.id);
        if let Err(e) = std::fs::remove_dir(&job_dir) {
            warn!("Failed to remove job directory for {}: {}", job.id, e);
        }
    }

    async fn persist_stage(
        &self,
        job: &mut Job,
        stage: JobStage,
        progress: u8,
    ) -> Result<(), PipelineError> {
        job.advance(stage, progress);
        let job = &*job;
        self.retry
            .run_async("stage update", || self.store.update_job(job))
            .await
            .map_err(PipelineError::Persist)
    }

    async fn fail_job(&self, job: &Job, err: PipelineError) -> JobOutcome {
        let message = err.to_string();
        error!("Job {} failed: {}", job.id, message);

        if let Err(e) = self
            .retry
            .run_async("mark failed", || self.store.mark_job_failed(&job.id, &message))
            .await
        {
            error!("Could not record failure of job {}: {}", job.id, e);
        }

        JobOutcome::Failed { error: message }
    }
}
