//! Periodic removal of stale temp entries.

use std::fs;
use std::path::Path;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::sanitize;

use super::ticker::{IntervalTicker, Ticker};
use super::workspace::TempWorkspace;

/// Counts from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub skipped_in_flight: usize,
    pub failures: usize,
}

pub struct CleanupSweeper {
    workspace: TempWorkspace,
    stale_after: Duration,
}

impl CleanupSweeper {
    pub fn new(workspace: TempWorkspace, stale_after: Duration) -> Self {
        Self {
            workspace,
            stale_after,
        }
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(SystemTime::now())
    }

    /// Removes top-level files last modified before `now - stale_after`, and
    /// stale job directories whose job is not in flight. Listing failures
    /// are logged and end the sweep early.
    pub fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();
        let Some(cutoff) = now.checked_sub(self.stale_after) else {
            return report;
        };

        let entries = match fs::read_dir(self.workspace.root()) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!(
                    "Cleanup sweep skipped, cannot list {}: {}",
                    self.workspace.root().display(),
                    e
                );
                return report;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Cleanup sweep aborted while listing: {}", e);
                    break;
                }
            };
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                let name = entry.file_name();
                let Some(job_id) = name.to_str().filter(|n| is_job_dir_name(n)) else {
                    continue;
                };
                if self.workspace.is_in_flight(job_id) {
                    report.skipped_in_flight += 1;
                    continue;
                }
                if is_stale(&path, cutoff) {
                    match fs::remove_dir_all(&path) {
                        Ok(()) => {
                            log::info!("Removed stale job directory {}", job_id);
                            report.dirs_removed += 1;
                        }
                        Err(e) => {
                            log::warn!("Failed to remove job directory {}: {}", job_id, e);
                            report.failures += 1;
                        }
                    }
                }
            } else if is_stale(&path, cutoff) {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        log::info!("Removed stale temp file {}", sanitize::redact_path(&path));
                        report.files_removed += 1;
                    }
                    Err(e) => {
                        log::warn!(
                            "Failed to remove temp file {}: {}",
                            sanitize::redact_path(&path),
                            e
                        );
                        report.failures += 1;
                    }
                }
            }
        }

        report
    }

    /// Sweeps once per tick until the ticker is exhausted or `cancel` fires.
    pub async fn run<T: Ticker>(&self, mut ticker: T, cancel: CancellationToken) {
        log::info!("Cleanup sweeper started");

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

            let report = self.sweep();
            if report != SweepReport::default() {
                log::debug!("Cleanup sweep: {:?}", report);
            }
        }

        log::info!("Cleanup sweeper stopped");
    }

    /// Runs the loop on a dedicated thread with its own runtime.
    pub fn spawn(
        self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, WorkerError> {
        std::thread::Builder::new()
            .name("cleanup-sweeper".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        log::error!("Failed to start cleanup sweeper runtime: {}", e);
                        return;
                    }
                };
                rt.block_on(async {
                    let ticker = IntervalTicker::new(interval);
                    self.run(ticker, cancel).await;
                });
            })
            .map_err(|e| WorkerError::SpawnFailed {
                name: "cleanup-sweeper".to_string(),
                source: e,
            })
    }
}

/// Job directories are named by job id (a UUID); other directories are left alone.
fn is_job_dir_name(name: &str) -> bool {
    uuid::Uuid::parse_str(name).is_ok()
}

fn is_stale(path: &Path, cutoff: SystemTime) -> bool {
    fs::symlink_metadata(path)
        .and_then(|m| m.modified())
        .map(|modified| modified < cutoff)
        .unwrap_or(false)
}
