//! Job repository: CRUD operations for the `jobs` table.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::model::{Job, JobStage, JobStatus};

const JOB_COLUMNS: &str = "id, account_id, original_filename, processed_filename, status, \
     progress, stage, message, drive_url, error, created_at, updated_at, completed_at";

impl ToSql for JobStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for JobStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for JobStage {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for JobStage {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn job_from_row(row: &Row<'_>) -> Result<Job, rusqlite::Error> {
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;
    let completed_at: Option<String> = row.get(12)?;

    Ok(Job {
        id: row.get(0)?,
        account_id: row.get(1)?,
        original_filename: row.get(2)?,
        processed_filename: row.get(3)?,
        status: row.get(4)?,
        progress: row.get(5)?,
        stage: row.get(6)?,
        message: row.get(7)?,
        drive_url: row.get(8)?,
        error: row.get(9)?,
        created_at: parse_timestamp(10, &created_at)?,
        updated_at: parse_timestamp(11, &updated_at)?,
        completed_at: completed_at
            .map(|raw| parse_timestamp(12, &raw))
            .transpose()?,
    })
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &Job) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            &format!(
                "INSERT INTO jobs ({JOB_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                job.id,
                job.account_id,
                job.original_filename,
                job.processed_filename,
                job.status,
                job.progress,
                job.stage,
                job.message,
                job.drive_url,
                job.error,
                format_timestamp(&job.created_at),
                format_timestamp(&job.updated_at),
                job.completed_at.as_ref().map(format_timestamp),
            ],
        )
        .map_err(DatabaseError::from_write)?;
        Ok(())
    })
}

/// Overwrites every field of an existing job except `id`, `account_id` and
/// `created_at`. Last write wins.
pub fn update(db: &Database, job: &Job) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET original_filename=?2, processed_filename=?3, status=?4,
             progress=?5, stage=?6, message=?7, drive_url=?8, error=?9, updated_at=?10,
             completed_at=?11
             WHERE id=?1",
            params![
                job.id,
                job.original_filename,
                job.processed_filename,
                job.status,
                job.progress,
                job.stage,
                job.message,
                job.drive_url,
                job.error,
                format_timestamp(&job.updated_at),
                job.completed_at.as_ref().map(format_timestamp),
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let job = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    })
}

/// Returns the oldest queued job, if any. Read-only.
///
/// Ties on `created_at` fall back to insertion order.
pub fn next_queued(db: &Database) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let job = conn
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ?1
                     ORDER BY created_at ASC, rowid ASC LIMIT 1"
                ),
                params![JobStatus::Queued],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    })
}

/// Moves a job from `queued` to `processing` (stage `starting`, progress 0).
///
/// The status check and the write are one statement, so of two concurrent
/// claimers exactly one sees `true`.
pub fn claim(db: &Database, id: &str, now: &DateTime<Utc>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = ?2, stage = ?3, progress = 0, message = ?4, updated_at = ?5
             WHERE id = ?1 AND status = ?6",
            params![
                id,
                JobStatus::Processing,
                JobStage::Starting,
                JobStage::Starting.message(),
                format_timestamp(now),
                JobStatus::Queued,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Terminal success write. Returns `false` when no such job exists.
pub fn mark_completed(
    db: &Database,
    id: &str,
    processed_filename: &str,
    drive_url: &str,
    now: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let ts = format_timestamp(now);
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = ?2, stage = ?3, progress = 100, processed_filename = ?4,
             drive_url = ?5, message = ?6, updated_at = ?7, completed_at = ?7
             WHERE id = ?1",
            params![
                id,
                JobStatus::Completed,
                JobStage::Completed,
                processed_filename,
                drive_url,
                JobStage::Completed.message(),
                ts,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Terminal failure write. Progress and partial results are left as last
/// written. Returns `false` when no such job exists.
pub fn mark_failed(
    db: &Database,
    id: &str,
    error: &str,
    now: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = ?2, stage = ?3, error = ?4, message = ?5, updated_at = ?6,
             completed_at = NULL
             WHERE id = ?1",
            params![
                id,
                JobStatus::Failed,
                JobStage::Failed,
                error,
                JobStage::Failed.message(),
                format_timestamp(now),
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Lists the most recent jobs, newest first.
pub fn recent(db: &Database, limit: u32) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC, rowid DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::account_repo;
    use crate::model::{Credential, NewAccount};
    use chrono::Duration;
    use secrecy::SecretString;

    fn test_db() -> (Database, i64) {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let account = account_repo::insert(
            &db,
            &NewAccount {
                name: "shelf".to_string(),
                folder_id: "folder-1".to_string(),
                credential: Credential::ServiceToken(SecretString::from("token")),
                user_email: None,
            },
        )
        .unwrap();
        (db, account.id)
    }

    fn job_at(account_id: i64, name: &str, offset_ms: i64) -> Job {
        let mut job = Job::new(account_id, name);
        job.created_at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::milliseconds(offset_ms);
        job.updated_at = job.created_at;
        job
    }

    #[test]
    fn test_insert_and_find() {
        let (db, account_id) = test_db();
        let job = Job::new(account_id, "book.epub");
        insert(&db, &job).unwrap();

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found, job);
    }

    #[test]
    fn test_find_nonexistent() {
        let (db, _) = test_db();
        assert!(find_by_id(&db, "nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_insert_requires_existing_account() {
        let (db, account_id) = test_db();
        let job = Job::new(account_id + 100, "orphan.epub");
        assert!(insert(&db, &job).is_err());
    }

    #[test]
    fn test_update_overwrites_state() {
        let (db, account_id) = test_db();
        let mut job = Job::new(account_id, "book.epub");
        insert(&db, &job).unwrap();

        job.status = JobStatus::Processing;
        job.advance(JobStage::Converting, 25);
        update(&db, &job).unwrap();

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Processing);
        assert_eq!(found.stage, JobStage::Converting);
        assert_eq!(found.progress, 25);
        assert_eq!(found.message.as_deref(), Some("Converting to kepub"));
    }

    #[test]
    fn test_next_queued_is_fifo() {
        let (db, account_id) = test_db();
        let second = job_at(account_id, "second.epub", 10);
        let first = job_at(account_id, "first.epub", 0);
        insert(&db, &second).unwrap();
        insert(&db, &first).unwrap();

        let next = next_queued(&db).unwrap().unwrap();
        assert_eq!(next.id, first.id);
    }

    #[test]
    fn test_next_queued_breaks_ties_by_insertion() {
        let (db, account_id) = test_db();
        let a = job_at(account_id, "a.epub", 0);
        let b = job_at(account_id, "b.epub", 0);
        insert(&db, &a).unwrap();
        insert(&db, &b).unwrap();

        assert_eq!(next_queued(&db).unwrap().unwrap().id, a.id);
    }

    #[test]
    fn test_next_queued_has_no_side_effect() {
        let (db, account_id) = test_db();
        let job = Job::new(account_id, "book.epub");
        insert(&db, &job).unwrap();

        let first = next_queued(&db).unwrap().unwrap();
        let again = next_queued(&db).unwrap().unwrap();
        assert_eq!(first, again);
        assert_eq!(first.status, JobStatus::Queued);
    }

    #[test]
    fn test_next_queued_empty() {
        let (db, _) = test_db();
        assert!(next_queued(&db).unwrap().is_none());
    }

    #[test]
    fn test_claim_is_exclusive() {
        let (db, account_id) = test_db();
        let job = Job::new(account_id, "book.epub");
        insert(&db, &job).unwrap();

        let now = Utc::now();
        assert!(claim(&db, &job.id, &now).unwrap());
        assert!(!claim(&db, &job.id, &now).unwrap());

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Processing);
        assert_eq!(found.stage, JobStage::Starting);
        assert_eq!(found.progress, 0);
    }

    #[test]
    fn test_mark_completed() {
        let (db, account_id) = test_db();
        let job = Job::new(account_id, "book.epub");
        insert(&db, &job).unwrap();

        let now = Utc::now();
        assert!(mark_completed(&db, &job.id, "book.kepub.epub", "https://x/y", &now).unwrap());

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Completed);
        assert_eq!(found.stage, JobStage::Completed);
        assert_eq!(found.progress, 100);
        assert_eq!(found.processed_filename.as_deref(), Some("book.kepub.epub"));
        assert_eq!(found.drive_url.as_deref(), Some("https://x/y"));
        assert!(found.completed_at.is_some());
    }

    #[test]
    fn test_mark_failed_keeps_progress() {
        let (db, account_id) = test_db();
        let mut job = Job::new(account_id, "book.epub");
        insert(&db, &job).unwrap();
        job.status = JobStatus::Processing;
        job.advance(JobStage::Uploading, 75);
        update(&db, &job).unwrap();

        assert!(mark_failed(&db, &job.id, "Upload failed: boom", &Utc::now()).unwrap());

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Failed);
        assert_eq!(found.stage, JobStage::Failed);
        assert_eq!(found.progress, 75);
        assert_eq!(found.error.as_deref(), Some("Upload failed: boom"));
        assert!(found.completed_at.is_none());
    }

    #[test]
    fn test_terminal_writes_report_missing_job() {
        let (db, _) = test_db();
        let now = Utc::now();
        assert!(!mark_completed(&db, "missing", "a", "b", &now).unwrap());
        assert!(!mark_failed(&db, "missing", "err", &now).unwrap());
    }

    #[test]
    fn test_recent_newest_first() {
        let (db, account_id) = test_db();
        for i in 0..5 {
            insert(&db, &job_at(account_id, &format!("f{i}.epub"), i * 10)).unwrap();
        }

        let rows = recent(&db, 3).unwrap();
        let names: Vec<&str> = rows.iter().map(|j| j.original_filename.as_str()).collect();
        assert_eq!(names, vec!["f4.epub", "f3.epub", "f2.epub"]);
    }

    #[test]
    fn test_count_by_status() {
        let (db, account_id) = test_db();
        insert(&db, &Job::new(account_id, "a.epub")).unwrap();
        let b = Job::new(account_id, "b.epub");
        insert(&db, &b).unwrap();
        mark_failed(&db, &b.id, "err", &Utc::now()).unwrap();

        assert_eq!(count_by_status(&db, JobStatus::Queued).unwrap(), 1);
        assert_eq!(count_by_status(&db, JobStatus::Failed).unwrap(), 1);
        assert_eq!(count_by_status(&db, JobStatus::Completed).unwrap(), 0);
    }
}
