//! Per-job processing pipeline.
//!
//! claim → locate input → convert → upload → clean up → mark completed.
//! Each step advances the job's stage and progress and persists it; the
//! first failing step ends the run with a single `failed` write.

pub mod error;
pub mod retry;
pub mod runner;

pub use error::PipelineError;
pub use retry::RetryPolicy;
pub use runner::{map_progress, JobOutcome, JobProcessor};
