use thiserror::Error;

use crate::convert::ConvertError;
use crate::store::StoreError;
use crate::upload::UploadError;

/// A step failure. The `Display` text becomes the job's `error` field.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input file not found")]
    InputNotFound,

    #[error("Failed to prepare output path: {0}")]
    PrepareOutput(#[source] std::io::Error),

    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConvertError),

    #[error("Failed to get account: {0}")]
    Account(#[source] StoreError),

    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("Failed to persist job state: {0}")]
    Persist(#[source] StoreError),
}
