//! Queue worker: one job per tick, oldest first.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::pipeline::{JobOutcome, JobProcessor};
use crate::store::{JobStore, StoreError};

use super::ticker::{IntervalTicker, Ticker};

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickResult {
    /// No queued job.
    Idle,
    Processed { job_id: String, outcome: JobOutcome },
}

pub struct QueueWorker {
    store: Arc<dyn JobStore>,
    processor: Arc<JobProcessor>,
}

impl QueueWorker {
    pub fn new(store: Arc<dyn JobStore>, processor: Arc<JobProcessor>) -> Self {
        Self { store, processor }
    }

    /// Fetches the oldest queued job and runs it to completion.
    pub async fn tick_once(&self) -> Result<TickResult, StoreError> {
        let Some(job) = self.store.next_queued_job()? else {
            return Ok(TickResult::Idle);
        };

        log::info!("Processing job {} ({})", job.id, job.original_filename);
        let job_id = job.id.clone();
        let outcome = self.processor.run(job).await;
        Ok(TickResult::Processed { job_id, outcome })
    }

    /// Processes one job per tick until the ticker is exhausted or `cancel`
    /// fires. A running job always finishes; cancellation only prevents the
    /// next one from starting.
    pub async fn run<T: Ticker>(&self, mut ticker: T, cancel: CancellationToken) {
        log::info!("Queue worker started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                more = ticker.tick() => {
                    if !more {
                        break;
                    }
                }
            }

            if let Err(e) = self.tick_once().await {
                log::warn!("Failed to fetch next queued job: {}", e);
            }
        }

        log::info!("Queue worker stopped");
    }

    /// Runs the loop on a dedicated thread with its own runtime.
    pub fn spawn(
        self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, WorkerError> {
        std::thread::Builder::new()
            .name("queue-worker".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        log::error!("Failed to start queue worker runtime: {}", e);
                        return;
                    }
                };
                rt.block_on(async {
                    let ticker = IntervalTicker::new(interval);
                    self.run(ticker, cancel).await;
                });
            })
            .map_err(|e| WorkerError::SpawnFailed {
                name: "queue-worker".to_string(),
                source: e,
            })
    }
}
