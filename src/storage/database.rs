//! SQLite job store
//!
//! One durable record per job. `transition` is the sole mutation primitive
//! and is atomic: it applies only when the stored status equals the expected
//! `from` status, which makes concurrent or duplicate executor runs for the
//! same job safe.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Job, JobStatus, PageMetadata, PageResult};

/// Fields applied together with a status transition
#[derive(Debug, Default)]
pub struct JobPatch {
    /// Page to append; must extend the committed prefix by exactly one
    pub append_page: Option<PageResult>,
    /// Aggregated text, written once at completion
    pub aggregated_text: Option<String>,
    /// Summary, written once at completion
    pub summary: Option<String>,
    /// Failure reason
    pub error: Option<String>,
    /// Remove all committed pages (failed jobs keep no partial results)
    pub drop_pages: bool,
}

impl JobPatch {
    /// Empty patch (pure status move)
    pub fn none() -> Self {
        Self::default()
    }

    /// Append one page during processing
    pub fn page(page: PageResult) -> Self {
        Self {
            append_page: Some(page),
            ..Self::default()
        }
    }

    /// Terminal completion payload
    pub fn completed(aggregated_text: String, summary: Option<String>) -> Self {
        Self {
            aggregated_text: Some(aggregated_text),
            summary,
            ..Self::default()
        }
    }

    /// Terminal failure payload; drops any partially committed pages
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            drop_pages: true,
            ..Self::default()
        }
    }
}

/// SQLite-backed job store
pub struct JobStore {
    conn: Arc<Mutex<Connection>>,
}

impl JobStore {
    /// Create or open the store at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::Internal(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory store (tests)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Internal(format!("Failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        // WAL mode for concurrent readers while the executor writes
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
        "#,
        )
        .map_err(|e| Error::Internal(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                source_name TEXT NOT NULL,
                language TEXT NOT NULL,
                status TEXT NOT NULL,
                want_summary INTEGER NOT NULL DEFAULT 0,
                aggregated_text TEXT,
                summary TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);

            CREATE TABLE IF NOT EXISTS job_pages (
                job_id TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL,
                FOREIGN KEY (job_id) REFERENCES jobs(id) ON DELETE CASCADE,
                UNIQUE(job_id, page_number)
            );

            CREATE INDEX IF NOT EXISTS idx_job_pages_job_id ON job_pages(job_id);
        "#,
        )
        .map_err(|e| Error::Internal(format!("Failed to run migrations: {}", e)))?;

        Ok(())
    }

    /// Insert a new job record. Job ids are generated with UUIDv4 and never
    /// reused; a collision here means a caller bug, reported as `DuplicateId`.
    pub fn create(&self, job: &Job) -> Result<()> {
        let conn = self.conn.lock();

        let result = conn.execute(
            r#"
            INSERT INTO jobs (id, source_name, language, status, want_summary,
                              aggregated_text, summary, error, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                job.id.to_string(),
                job.source_name,
                job.language,
                job.status.as_str(),
                job.want_summary,
                job.aggregated_text,
                job.summary,
                job.error,
                job.created_at,
                job.updated_at,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::DuplicateId(job.id))
            }
            Err(e) => Err(Error::Internal(format!("Failed to create job: {}", e))),
        }
    }

    /// Atomically move a job from `from` to `to`, applying `patch` in the same
    /// SQL transaction. Returns `Conflict` without applying the patch when the
    /// stored status differs from `from`.
    pub fn transition(&self, id: Uuid, from: JobStatus, to: JobStatus, patch: JobPatch) -> Result<()> {
        if !from.can_transition(to) {
            return Err(Error::Internal(format!(
                "Illegal status transition {} -> {} for job {}",
                from, to, id
            )));
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Internal(format!("Failed to begin transaction: {}", e)))?;

        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM jobs WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Internal(format!("Failed to read job status: {}", e)))?;

        match current.as_deref() {
            None => return Err(Error::NotFound(id)),
            Some(s) if s != from.as_str() => return Err(Error::Conflict(id)),
            Some(_) => {}
        }

        let updated = tx
            .execute(
                r#"
                UPDATE jobs
                SET status = ?1,
                    updated_at = ?2,
                    aggregated_text = COALESCE(?3, aggregated_text),
                    summary = COALESCE(?4, summary),
                    error = COALESCE(?5, error)
                WHERE id = ?6 AND status = ?7
                "#,
                params![
                    to.as_str(),
                    Utc::now(),
                    patch.aggregated_text,
                    patch.summary,
                    patch.error,
                    id.to_string(),
                    from.as_str(),
                ],
            )
            .map_err(|e| Error::Internal(format!("Failed to update job: {}", e)))?;

        if updated == 0 {
            return Err(Error::Conflict(id));
        }

        if let Some(page) = patch.append_page {
            let committed: u32 = tx
                .query_row(
                    "SELECT COALESCE(MAX(page_number), 0) FROM job_pages WHERE job_id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .map_err(|e| Error::Internal(format!("Failed to read page count: {}", e)))?;

            // The committed sequence must stay gap-free and ordered.
            if page.page_number != committed + 1 {
                return Err(Error::Internal(format!(
                    "Page {} for job {} would break the committed prefix (have {} pages)",
                    page.page_number, id, committed
                )));
            }

            tx.execute(
                "INSERT INTO job_pages (job_id, page_number, text, metadata) VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.to_string(),
                    page.page_number,
                    page.text,
                    serde_json::to_string(&page.metadata)?,
                ],
            )
            .map_err(|e| Error::Internal(format!("Failed to append page: {}", e)))?;
        }

        if patch.drop_pages {
            tx.execute(
                "DELETE FROM job_pages WHERE job_id = ?1",
                params![id.to_string()],
            )
            .map_err(|e| Error::Internal(format!("Failed to drop pages: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| Error::Internal(format!("Failed to commit transition: {}", e)))?;

        Ok(())
    }

    /// Read the latest committed state of a job
    pub fn get(&self, id: Uuid) -> Result<Option<Job>> {
        let conn = self.conn.lock();

        let job = conn
            .query_row(
                r#"
                SELECT id, source_name, language, status, want_summary,
                       aggregated_text, summary, error, created_at, updated_at
                FROM jobs WHERE id = ?1
                "#,
                params![id.to_string()],
                |row| {
                    Ok(RawJob {
                        id: row.get(0)?,
                        source_name: row.get(1)?,
                        language: row.get(2)?,
                        status: row.get(3)?,
                        want_summary: row.get(4)?,
                        aggregated_text: row.get(5)?,
                        summary: row.get(6)?,
                        error: row.get(7)?,
                        created_at: row.get(8)?,
                        updated_at: row.get(9)?,
                    })
                },
            )
            .optional()
            .map_err(|e| Error::Internal(format!("Failed to read job: {}", e)))?;

        let Some(raw) = job else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT page_number, text, metadata FROM job_pages \
                 WHERE job_id = ?1 ORDER BY page_number",
            )
            .map_err(|e| Error::Internal(format!("Failed to prepare page query: {}", e)))?;

        let pages = stmt
            .query_map(params![id.to_string()], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| Error::Internal(format!("Failed to read pages: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Internal(format!("Failed to read pages: {}", e)))?;

        let pages = pages
            .into_iter()
            .map(|(page_number, text, metadata)| {
                let metadata: PageMetadata = serde_json::from_str(&metadata)?;
                Ok(PageResult {
                    page_number,
                    text,
                    metadata,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(raw.into_job(pages)?))
    }

    /// Mark jobs left non-terminal by a previous process as failed.
    ///
    /// Input bytes are not persisted, so interrupted jobs cannot be resumed;
    /// failing them keeps the "no job stuck in processing" guarantee. Called
    /// once at startup, before the worker accepts new jobs.
    pub fn fail_interrupted(&self) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Internal(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "DELETE FROM job_pages WHERE job_id IN \
             (SELECT id FROM jobs WHERE status IN ('pending', 'processing'))",
            [],
        )
        .map_err(|e| Error::Internal(format!("Failed to drop stale pages: {}", e)))?;

        let count = tx
            .execute(
                "UPDATE jobs SET status = 'failed', \
                 error = 'interrupted by service restart', updated_at = ?1 \
                 WHERE status IN ('pending', 'processing')",
                params![Utc::now()],
            )
            .map_err(|e| Error::Internal(format!("Failed to fail stale jobs: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::Internal(format!("Failed to commit cleanup: {}", e)))?;

        Ok(count)
    }
}

/// Row shape before status/id parsing
struct RawJob {
    id: String,
    source_name: String,
    language: String,
    status: String,
    want_summary: bool,
    aggregated_text: Option<String>,
    summary: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RawJob {
    fn into_job(self, pages: Vec<PageResult>) -> Result<Job> {
        Ok(Job {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| Error::Internal(format!("Corrupt job id in store: {}", e)))?,
            source_name: self.source_name,
            language: self.language,
            status: JobStatus::parse(&self.status)
                .ok_or_else(|| Error::Internal(format!("Corrupt status in store: {}", self.status)))?,
            want_summary: self.want_summary,
            pages,
            aggregated_text: self.aggregated_text,
            summary: self.summary,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32, text: &str) -> PageResult {
        PageResult {
            page_number: n,
            text: text.to_string(),
            metadata: PageMetadata::default(),
        }
    }

    #[test]
    fn create_and_get() {
        let store = JobStore::in_memory().unwrap();
        let job = Job::new("scan.png".into(), "eng".into(), false);

        store.create(&job).unwrap();

        let loaded = store.get(job.id).unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.source_name, "scan.png");
        assert_eq!(loaded.status, JobStatus::Pending);
        assert!(loaded.pages.is_empty());
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let store = JobStore::in_memory().unwrap();
        let job = Job::new("a.pdf".into(), "eng".into(), false);

        store.create(&job).unwrap();
        let err = store.create(&job).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(id) if id == job.id));
    }

    #[test]
    fn get_unknown_returns_none() {
        let store = JobStore::in_memory().unwrap();
        assert!(store.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn full_transition_chain() {
        let store = JobStore::in_memory().unwrap();
        let job = Job::new("doc.pdf".into(), "eng".into(), false);
        store.create(&job).unwrap();

        store
            .transition(job.id, JobStatus::Pending, JobStatus::Processing, JobPatch::none())
            .unwrap();
        store
            .transition(
                job.id,
                JobStatus::Processing,
                JobStatus::Processing,
                JobPatch::page(page(1, "first")),
            )
            .unwrap();
        store
            .transition(
                job.id,
                JobStatus::Processing,
                JobStatus::Completed,
                JobPatch::completed("first".into(), None),
            )
            .unwrap();

        let loaded = store.get(job.id).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.pages.len(), 1);
        assert_eq!(loaded.aggregated_text.as_deref(), Some("first"));
        assert!(loaded.updated_at > loaded.created_at);
    }

    #[test]
    fn claim_is_exclusive() {
        let store = JobStore::in_memory().unwrap();
        let job = Job::new("doc.pdf".into(), "eng".into(), false);
        store.create(&job).unwrap();

        store
            .transition(job.id, JobStatus::Pending, JobStatus::Processing, JobPatch::none())
            .unwrap();

        // A second claim on the same edge loses the race.
        let err = store
            .transition(job.id, JobStatus::Pending, JobStatus::Processing, JobPatch::none())
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(id) if id == job.id));
    }

    #[test]
    fn conflict_does_not_apply_patch() {
        let store = JobStore::in_memory().unwrap();
        let job = Job::new("doc.pdf".into(), "eng".into(), false);
        store.create(&job).unwrap();

        let err = store
            .transition(
                job.id,
                JobStatus::Processing,
                JobStatus::Completed,
                JobPatch::completed("never".into(), None),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let loaded = store.get(job.id).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert!(loaded.aggregated_text.is_none());
    }

    #[test]
    fn illegal_edge_is_rejected() {
        let store = JobStore::in_memory().unwrap();
        let job = Job::new("doc.pdf".into(), "eng".into(), false);
        store.create(&job).unwrap();

        let err = store
            .transition(job.id, JobStatus::Pending, JobStatus::Completed, JobPatch::none())
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn transition_on_unknown_job_is_not_found() {
        let store = JobStore::in_memory().unwrap();
        let err = store
            .transition(
                Uuid::new_v4(),
                JobStatus::Pending,
                JobStatus::Processing,
                JobPatch::none(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn page_appends_must_be_gap_free() {
        let store = JobStore::in_memory().unwrap();
        let job = Job::new("doc.pdf".into(), "eng".into(), false);
        store.create(&job).unwrap();
        store
            .transition(job.id, JobStatus::Pending, JobStatus::Processing, JobPatch::none())
            .unwrap();

        // Page 2 before page 1 would leave a gap.
        let err = store
            .transition(
                job.id,
                JobStatus::Processing,
                JobStatus::Processing,
                JobPatch::page(page(2, "second")),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));

        // The rejected append left nothing behind.
        assert!(store.get(job.id).unwrap().unwrap().pages.is_empty());

        for n in 1..=3 {
            store
                .transition(
                    job.id,
                    JobStatus::Processing,
                    JobStatus::Processing,
                    JobPatch::page(page(n, "text")),
                )
                .unwrap();
        }
        let loaded = store.get(job.id).unwrap().unwrap();
        let numbers: Vec<u32> = loaded.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn failed_job_keeps_no_partial_pages() {
        let store = JobStore::in_memory().unwrap();
        let job = Job::new("doc.pdf".into(), "eng".into(), false);
        store.create(&job).unwrap();
        store
            .transition(job.id, JobStatus::Pending, JobStatus::Processing, JobPatch::none())
            .unwrap();
        store
            .transition(
                job.id,
                JobStatus::Processing,
                JobStatus::Processing,
                JobPatch::page(page(1, "partial")),
            )
            .unwrap();

        store
            .transition(
                job.id,
                JobStatus::Processing,
                JobStatus::Failed,
                JobPatch::failed("recognizer unavailable"),
            )
            .unwrap();

        let loaded = store.get(job.id).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert!(loaded.pages.is_empty());
        assert_eq!(loaded.error.as_deref(), Some("recognizer unavailable"));
    }

    #[test]
    fn terminal_states_admit_no_transition() {
        let store = JobStore::in_memory().unwrap();
        let job = Job::new("doc.pdf".into(), "eng".into(), false);
        store.create(&job).unwrap();
        store
            .transition(job.id, JobStatus::Pending, JobStatus::Processing, JobPatch::none())
            .unwrap();
        store
            .transition(
                job.id,
                JobStatus::Processing,
                JobStatus::Completed,
                JobPatch::completed("text".into(), None),
            )
            .unwrap();

        let err = store
            .transition(
                job.id,
                JobStatus::Processing,
                JobStatus::Failed,
                JobPatch::failed("late"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn fail_interrupted_clears_stale_jobs() {
        let store = JobStore::in_memory().unwrap();

        let stale = Job::new("stale.pdf".into(), "eng".into(), false);
        store.create(&stale).unwrap();
        store
            .transition(stale.id, JobStatus::Pending, JobStatus::Processing, JobPatch::none())
            .unwrap();
        store
            .transition(
                stale.id,
                JobStatus::Processing,
                JobStatus::Processing,
                JobPatch::page(page(1, "orphan")),
            )
            .unwrap();

        let mut done = Job::new("done.png".into(), "eng".into(), false);
        done.status = JobStatus::Completed;
        store.create(&done).unwrap();

        assert_eq!(store.fail_interrupted().unwrap(), 1);

        let stale = store.get(stale.id).unwrap().unwrap();
        assert_eq!(stale.status, JobStatus::Failed);
        assert!(stale.pages.is_empty());

        let done = store.get(done.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
    }
}
