pub mod config;
pub mod convert;
pub mod db;
pub mod error;
pub mod intake;
pub mod model;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod store;
pub mod telemetry;
pub mod upload;
pub mod worker;

pub use config::{load_config, AppConfig, LogFormat};
pub use convert::{ConvertError, Converter, EpubConverter};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, Result, ShelfsyncError, WorkerError};
pub use intake::{Intake, IntakeError};
pub use model::{Account, Credential, Job, JobStage, JobStatus, NewAccount, OAuthCredential};
pub use pipeline::{JobOutcome, JobProcessor, PipelineError, RetryPolicy};
pub use sanitize::clean_filename;
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use store::{JobStore, StoreError};
pub use upload::{DriveUploader, UploadError, Uploader};
pub use worker::{CleanupSweeper, ManualTicker, QueueWorker, TempWorkspace, Ticker};
