//! Upload path: validates an EPUB, stages it in the temp workspace and
//! queues a job for it.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::db::{account_repo, Database};
use crate::model::Job;
use crate::store::{JobStore, StoreError};
use crate::worker::TempWorkspace;

/// Local file header signature shared by all ZIP archives.
const ZIP_MAGIC: &[u8; 2] = b"PK";

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid file name: {}", .0.display())]
    InvalidFilename(PathBuf),

    #[error("Not an EPUB file: {0}")]
    NotEpub(String),

    #[error("File is not a valid EPUB archive: {0}")]
    InvalidArchive(String),

    #[error("A file named '{0}' is already waiting to be processed")]
    AlreadyStaged(String),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Intake {
    db: Database,
    workspace: TempWorkspace,
}

impl Intake {
    pub fn new(db: Database, workspace: TempWorkspace) -> Self {
        Self { db, workspace }
    }

    /// Copies `source` into the temp workspace and creates a queued job for
    /// it under the named account.
    pub fn enqueue(&self, account_name: &str, source: &Path) -> Result<Job, IntakeError> {
        let account = account_repo::find_by_name(&self.db, account_name)
            .map_err(StoreError::from)?
            .ok_or_else(|| IntakeError::AccountNotFound(account_name.to_string()))?;

        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IntakeError::InvalidFilename(source.to_path_buf()))?;

        if Path::new(filename).extension().and_then(|e| e.to_str()) != Some("epub") {
            return Err(IntakeError::NotEpub(filename.to_string()));
        }

        self.workspace.ensure_root().map_err(|e| IntakeError::Io {
            path: self.workspace.root().to_path_buf(),
            source: e,
        })?;

        let staged = self
            .workspace
            .inbound_path(filename)
            .ok_or_else(|| IntakeError::InvalidFilename(source.to_path_buf()))?;
        if staged.exists() {
            return Err(IntakeError::AlreadyStaged(filename.to_string()));
        }

        std::fs::copy(source, &staged).map_err(|e| IntakeError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;

        let result = self.validate_and_queue(account.id, filename, &staged);
        if result.is_err() {
            remove_staged(&staged);
        }
        result
    }

    fn validate_and_queue(
        &self,
        account_id: i64,
        filename: &str,
        staged: &Path,
    ) -> Result<Job, IntakeError> {
        if !has_zip_magic(staged).map_err(|e| IntakeError::Io {
            path: staged.to_path_buf(),
            source: e,
        })? {
            return Err(IntakeError::InvalidArchive(filename.to_string()));
        }

        let job = Job::new(account_id, filename);
        self.db.create_job(&job)?;

        log::info!("Queued job {} for {}", job.id, filename);
        Ok(job)
    }

    /// Most recent jobs, newest first.
    pub fn recent_jobs(&self, limit: u32) -> Result<Vec<Job>, IntakeError> {
        Ok(self.db.recent_jobs(limit)?)
    }

    pub fn job(&self, id: &str) -> Result<Job, IntakeError> {
        Ok(self.db.get_job(id)?)
    }
}

fn has_zip_magic(path: &Path) -> std::io::Result<bool> {
    let mut magic = [0u8; 2];
    let mut file = File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == ZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn remove_staged(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("Failed to remove rejected upload: {}", e);
    }
}
