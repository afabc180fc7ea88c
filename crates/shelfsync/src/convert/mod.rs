pub mod epub;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use epub::EpubConverter;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Failed to read '{path}': {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid EPUB archive: {0}")]
    InvalidArchive(String),

    #[error("Missing mimetype entry")]
    MissingMimetype,

    #[error("Unexpected mimetype '{0}'")]
    WrongMimetype(String),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns an input book into the reader-ready output format.
///
/// `on_progress` receives percentages in [0, 100]. Callers must not rely on
/// them being monotonic.
pub trait Converter: Send + Sync {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<(), ConvertError>;
}
