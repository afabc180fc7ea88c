//! Job store contract consumed by the processor, the queue worker and the
//! intake path, with its SQLite-backed implementation.

use thiserror::Error;

use crate::db::{account_repo, job_repo, Database, DatabaseError};
use crate::model::{timestamp_now, Account, Credential, Job, JobStatus, NewAccount};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueViolation(what) => StoreError::Conflict(what),
            other => StoreError::Database(other),
        }
    }
}

impl StoreError {
    fn job_not_found(id: &str) -> Self {
        StoreError::NotFound {
            entity: "job",
            id: id.to_string(),
        }
    }

    fn account_not_found(id: i64) -> Self {
        StoreError::NotFound {
            entity: "account",
            id: id.to_string(),
        }
    }
}

/// Persistence operations for jobs and accounts.
///
/// Implementations must be safe to share between the queue worker thread,
/// the sweeper and request handlers.
pub trait JobStore: Send + Sync {
    /// Oldest queued job by creation order, or `None`. Never mutates.
    fn next_queued_job(&self) -> Result<Option<Job>, StoreError>;

    /// Conditionally moves a queued job to `processing`. Returns `false` when
    /// the job was not queued anymore (another claimer won).
    fn claim_job(&self, id: &str) -> Result<bool, StoreError>;

    /// Persists the full current state of a job. Last write wins.
    fn update_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Sets status and stage `completed`, progress 100, the processed
    /// filename, the URL and the completion timestamp in one write.
    fn mark_job_completed(
        &self,
        id: &str,
        processed_filename: &str,
        url: &str,
    ) -> Result<(), StoreError>;

    /// Sets status and stage `failed` and the error text in one write.
    fn mark_job_failed(&self, id: &str, message: &str) -> Result<(), StoreError>;

    fn get_account(&self, id: i64) -> Result<Account, StoreError>;

    /// Replaces an account's credential after a token refresh.
    fn save_account_credential(&self, id: i64, credential: &Credential)
        -> Result<(), StoreError>;

    fn create_job(&self, job: &Job) -> Result<(), StoreError>;

    fn get_job(&self, id: &str) -> Result<Job, StoreError>;

    /// Most recent jobs, newest first.
    fn recent_jobs(&self, limit: u32) -> Result<Vec<Job>, StoreError>;

    fn count_by_status(&self, status: JobStatus) -> Result<u64, StoreError>;
}

impl JobStore for Database {
    fn next_queued_job(&self) -> Result<Option<Job>, StoreError> {
        Ok(job_repo::next_queued(self)?)
    }

    fn claim_job(&self, id: &str) -> Result<bool, StoreError> {
        Ok(job_repo::claim(self, id, &timestamp_now())?)
    }

    fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        Ok(job_repo::update(self, job)?)
    }

    fn mark_job_completed(
        &self,
        id: &str,
        processed_filename: &str,
        url: &str,
    ) -> Result<(), StoreError> {
        if job_repo::mark_completed(self, id, processed_filename, url, &timestamp_now())? {
            Ok(())
        } else {
            Err(StoreError::job_not_found(id))
        }
    }

    fn mark_job_failed(&self, id: &str, message: &str) -> Result<(), StoreError> {
        if job_repo::mark_failed(self, id, message, &timestamp_now())? {
            Ok(())
        } else {
            Err(StoreError::job_not_found(id))
        }
    }

    fn get_account(&self, id: i64) -> Result<Account, StoreError> {
        account_repo::find_by_id(self, id)?.ok_or_else(|| StoreError::account_not_found(id))
    }

    fn save_account_credential(
        &self,
        id: i64,
        credential: &Credential,
    ) -> Result<(), StoreError> {
        if account_repo::update_credential(self, id, credential, &timestamp_now())? {
            Ok(())
        } else {
            Err(StoreError::account_not_found(id))
        }
    }

    fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        Ok(job_repo::insert(self, job)?)
    }

    fn get_job(&self, id: &str) -> Result<Job, StoreError> {
        job_repo::find_by_id(self, id)?.ok_or_else(|| StoreError::job_not_found(id))
    }

    fn recent_jobs(&self, limit: u32) -> Result<Vec<Job>, StoreError> {
        Ok(job_repo::recent(self, limit)?)
    }

    fn count_by_status(&self, status: JobStatus) -> Result<u64, StoreError> {
        Ok(job_repo::count_by_status(self, status)?)
    }
}

/// Registers an account, mapping a duplicate name to [`StoreError::Conflict`].
pub fn register_account(db: &Database, account: &NewAccount) -> Result<Account, StoreError> {
    Ok(account_repo::insert(db, account)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStage;
    use secrecy::SecretString;

    fn setup() -> (Database, Account) {
        let db = Database::open_in_memory().unwrap();
        let account = register_account(
            &db,
            &NewAccount {
                name: "kobo".to_string(),
                folder_id: "folder".to_string(),
                credential: Credential::ServiceToken(SecretString::from("svc")),
                user_email: None,
            },
        )
        .unwrap();
        (db, account)
    }

    #[test]
    fn test_get_account_not_found() {
        let (db, _) = setup();
        let err = db.get_account(42).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "account", .. }));
        assert_eq!(err.to_string(), "account not found: 42");
    }

    #[test]
    fn test_duplicate_account_is_conflict() {
        let (db, _) = setup();
        let err = register_account(
            &db,
            &NewAccount {
                name: "kobo".to_string(),
                folder_id: "other".to_string(),
                credential: Credential::ServiceToken(SecretString::from("svc")),
                user_email: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_claim_only_queued_jobs() {
        let (db, account) = setup();
        let job = Job::new(account.id, "a.epub");
        db.create_job(&job).unwrap();

        assert!(db.claim_job(&job.id).unwrap());
        assert!(!db.claim_job(&job.id).unwrap());

        db.mark_job_failed(&job.id, "boom").unwrap();
        assert!(!db.claim_job(&job.id).unwrap());
        assert!(!db.claim_job("missing").unwrap());
    }

    #[test]
    fn test_mark_failed_keeps_progress() {
        let (db, account) = setup();
        let mut job = Job::new(account.id, "a.epub");
        db.create_job(&job).unwrap();
        db.claim_job(&job.id).unwrap();

        job.status = JobStatus::Processing;
        job.advance(JobStage::Uploading, 75);
        db.update_job(&job).unwrap();
        db.mark_job_failed(&job.id, "Upload failed: 503").unwrap();

        let stored = db.get_job(&job.id).unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.stage, JobStage::Failed);
        assert_eq!(stored.progress, 75);
        assert_eq!(stored.error.as_deref(), Some("Upload failed: 503"));
        assert!(stored.completed_at.is_none());
    }

    #[test]
    fn test_mark_completed_sets_terminal_fields() {
        let (db, account) = setup();
        let job = Job::new(account.id, "a.epub");
        db.create_job(&job).unwrap();

        db.mark_job_completed(&job.id, "a.kepub.epub", "https://drive.google.com/file/d/x/view")
            .unwrap();
        let stored = db.get_job(&job.id).unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.progress, 100);
        assert!(stored.completed_at.is_some());
        assert_eq!(db.count_by_status(JobStatus::Completed).unwrap(), 1);
    }

    #[test]
    fn test_terminal_writes_on_missing_job() {
        let (db, _) = setup();
        assert!(matches!(
            db.mark_job_completed("nope", "a", "b"),
            Err(StoreError::NotFound { entity: "job", .. })
        ));
        assert!(matches!(
            db.mark_job_failed("nope", "x"),
            Err(StoreError::NotFound { entity: "job", .. })
        ));
    }

    #[test]
    fn test_save_account_credential() {
        let (db, account) = setup();
        db.save_account_credential(account.id, &Credential::ServiceToken(SecretString::from("new")))
            .unwrap();
        assert!(db
            .save_account_credential(999, &Credential::ServiceToken(SecretString::from("x")))
            .is_err());
    }
}
