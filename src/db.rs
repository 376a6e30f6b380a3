use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::debug;

use crate::error::{BoardError, Result};
use crate::models::{self, ApplicantRecord, ApplicantStatus, JobPosting, NewJobPosting, UserProfile};

/// Document store over one SQLite file: the `users` and `jobs` collections,
/// plus the identity tables used by [`crate::identity::LocalIdentity`].
pub struct Database {
    conn: Connection,
    path: PathBuf,
    profile_feeds: Mutex<HashMap<String, watch::Sender<Option<UserProfile>>>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self::with_connection(conn, path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::with_connection(conn, PathBuf::from(":memory:")))
    }

    fn with_connection(conn: Connection, path: PathBuf) -> Self {
        Self {
            conn,
            path,
            profile_feeds: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                uid TEXT PRIMARY KEY,
                email TEXT,
                username TEXT NOT NULL DEFAULT '',
                photo_url TEXT,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                salary INTEGER NOT NULL,
                job_type TEXT NOT NULL CHECK (job_type IN ('full-time', 'part-time')),
                keywords TEXT NOT NULL DEFAULT '[]',
                posted_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                applicants TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS accounts (
                uid TEXT PRIMARY KEY,
                email TEXT UNIQUE COLLATE NOCASE,
                password_hash TEXT,
                salt TEXT,
                display_name TEXT,
                photo_url TEXT,
                provider TEXT NOT NULL CHECK (provider IN ('password', 'google')),
                federated_subject TEXT UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                uid TEXT NOT NULL REFERENCES accounts(uid),
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS password_resets (
                token TEXT PRIMARY KEY,
                uid TEXT NOT NULL REFERENCES accounts(uid),
                expires_at TEXT NOT NULL,
                used INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_posted_by ON jobs(posted_by);
            CREATE INDEX IF NOT EXISTS idx_sessions_uid ON sessions(uid);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('jobs', 'users', 'accounts')",
            [],
            |row| row.get(0),
        )?;
        if tables < 3 {
            return Err(BoardError::NotInitialized);
        }
        Ok(())
    }

    // --- User profile operations ---

    /// Writes a fresh profile document, overwriting any existing one. New
    /// profiles are never admins.
    pub fn create_user(&self, uid: &str, email: Option<&str>, username: &str) -> Result<UserProfile> {
        self.conn.execute(
            "INSERT OR REPLACE INTO users (uid, email, username, photo_url, is_admin, created_at)
             VALUES (?1, ?2, ?3, NULL, 0, ?4)",
            params![uid, email, username, timestamp(&models::now())],
        )?;
        debug!(uid, "profile document written");
        self.publish_user(uid)?;
        self.get_user(uid)?
            .ok_or_else(|| BoardError::AccountNotFound(uid.to_string()))
    }

    /// Writes the profile document only if none exists yet.
    pub fn create_user_if_absent(&self, uid: &str, email: Option<&str>, username: &str) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO users (uid, email, username, photo_url, is_admin, created_at)
             VALUES (?1, ?2, ?3, NULL, 0, ?4)",
            params![uid, email, username, timestamp(&models::now())],
        )?;
        if inserted > 0 {
            debug!(uid, "profile document created");
            self.publish_user(uid)?;
        }
        Ok(inserted > 0)
    }

    pub fn get_user(&self, uid: &str) -> Result<Option<UserProfile>> {
        let user = self
            .conn
            .query_row(
                "SELECT uid, email, username, photo_url, is_admin, created_at FROM users WHERE uid = ?1",
                [uid],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserProfile>> {
        let user = self
            .conn
            .query_row(
                "SELECT uid, email, username, photo_url, is_admin, created_at
                 FROM users WHERE LOWER(email) = LOWER(?1)",
                [email],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<UserProfile>> {
        let mut stmt = self.conn.prepare(
            "SELECT uid, email, username, photo_url, is_admin, created_at FROM users ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], Self::row_to_user)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Profile-edit fields. Returns false when the document does not exist.
    pub fn update_user_profile(
        &self,
        uid: &str,
        username: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE users SET username = COALESCE(?2, username), photo_url = COALESCE(?3, photo_url)
             WHERE uid = ?1",
            params![uid, username, photo_url],
        )?;
        if updated > 0 {
            self.publish_user(uid)?;
        }
        Ok(updated > 0)
    }

    /// Operator-only: the user surface never changes the admin flag.
    pub fn set_admin(&self, uid: &str, is_admin: bool) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE users SET is_admin = ?2 WHERE uid = ?1",
            params![uid, is_admin],
        )?;
        if updated > 0 {
            self.publish_user(uid)?;
        }
        Ok(updated > 0)
    }

    /// Live subscription to one profile document. The receiver starts with
    /// the current document and sees every later write; dropping it
    /// unsubscribes.
    pub fn subscribe_user(&self, uid: &str) -> Result<watch::Receiver<Option<UserProfile>>> {
        let current = self.get_user(uid)?;
        let mut feeds = self.profile_feeds.lock();
        feeds.retain(|_, tx| tx.receiver_count() > 0);
        let rx = match feeds.get(uid) {
            Some(tx) => {
                tx.send_replace(current);
                tx.subscribe()
            }
            None => {
                let (tx, rx) = watch::channel(current);
                feeds.insert(uid.to_string(), tx);
                rx
            }
        };
        Ok(rx)
    }

    fn publish_user(&self, uid: &str) -> Result<()> {
        let feeds = self.profile_feeds.lock();
        if let Some(tx) = feeds.get(uid) {
            if tx.receiver_count() > 0 {
                tx.send_replace(self.get_user(uid)?);
            }
        }
        Ok(())
    }

    fn row_to_user(row: &Row) -> rusqlite::Result<UserProfile> {
        Ok(UserProfile {
            uid: row.get(0)?,
            email: row.get(1)?,
            username: row.get(2)?,
            photo_url: row.get(3)?,
            is_admin: row.get(4)?,
            created_at: time_column(row, 5)?,
        })
    }

    // --- Job operations ---

    pub fn add_job(&self, posting: &NewJobPosting, posted_by: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO jobs (title, description, salary, job_type, keywords, posted_by, created_at, applicants)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '[]')",
            params![
                posting.title,
                posting.description,
                posting.salary,
                posting.job_type.as_str(),
                serde_json::to_string(&posting.keywords)?,
                posted_by,
                timestamp(&models::now()),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(job_id = id, posted_by, "job posted");
        Ok(id)
    }

    pub fn list_jobs(&self) -> Result<Vec<JobPosting>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, description, salary, job_type, keywords, posted_by, created_at, applicants
             FROM jobs ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], Self::row_to_job)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_job(&self, id: i64) -> Result<Option<JobPosting>> {
        let job = self
            .conn
            .query_row(
                "SELECT id, title, description, salary, job_type, keywords, posted_by, created_at, applicants
                 FROM jobs WHERE id = ?1",
                [id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    pub fn delete_job(&self, id: i64) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        debug!(job_id = id, deleted, "job delete");
        Ok(deleted > 0)
    }

    /// Set-union insert: adds the record unless an equal one is already
    /// present. Records differing in any field (e.g. `appliedAt`) are
    /// distinct, so the same applicant can end up listed twice.
    pub fn array_union_applicant(&self, job_id: i64, record: &ApplicantRecord) -> Result<bool> {
        let added = self.modify_applicants(job_id, |applicants| {
            if applicants.contains(record) {
                false
            } else {
                applicants.push(record.clone());
                true
            }
        })?;
        debug!(job_id, applicant = %record.id, added, "applicants union");
        Ok(added)
    }

    /// Set-difference removal by full-value equality. A record that does not
    /// match exactly is left alone and nothing is reported.
    pub fn array_remove_applicant(&self, job_id: i64, record: &ApplicantRecord) -> Result<usize> {
        let removed = self.modify_applicants(job_id, |applicants| {
            let before = applicants.len();
            applicants.retain(|a| a != record);
            before - applicants.len()
        })?;
        if removed == 0 {
            debug!(job_id, applicant = %record.id, "applicants remove matched nothing");
        } else {
            debug!(job_id, applicant = %record.id, removed, "applicants remove");
        }
        Ok(removed)
    }

    /// Keyed upsert: every record of `applicant_id` on the job is replaced by
    /// one record with `status`, the earliest `appliedAt` and a fresh
    /// `updatedAt`. Returns `None` when the applicant has no record.
    pub fn upsert_applicant(
        &self,
        job_id: i64,
        applicant_id: &str,
        status: ApplicantStatus,
    ) -> Result<Option<ApplicantRecord>> {
        let replaced = self.modify_applicants(job_id, |applicants| {
            let applied_at = applicants
                .iter()
                .filter(|a| a.id == applicant_id)
                .map(|a| a.applied_at)
                .min()?;
            applicants.retain(|a| a.id != applicant_id);
            let record = ApplicantRecord {
                id: applicant_id.to_string(),
                status,
                applied_at,
                updated_at: Some(models::now()),
            };
            applicants.push(record.clone());
            Some(record)
        })?;
        debug!(job_id, applicant = applicant_id, %status, found = replaced.is_some(), "applicant upsert");
        Ok(replaced)
    }

    /// Read-modify-write of one posting's applicant array in a single
    /// transaction.
    fn modify_applicants<T>(
        &self,
        job_id: i64,
        f: impl FnOnce(&mut Vec<ApplicantRecord>) -> T,
    ) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let raw: Option<String> = tx
            .query_row("SELECT applicants FROM jobs WHERE id = ?1", [job_id], |row| row.get(0))
            .optional()?;
        let raw = raw.ok_or(BoardError::JobNotFound(job_id))?;
        let mut applicants: Vec<ApplicantRecord> = serde_json::from_str(&raw)?;
        let before = applicants.clone();
        let out = f(&mut applicants);
        if applicants != before {
            tx.execute(
                "UPDATE jobs SET applicants = ?2 WHERE id = ?1",
                params![job_id, serde_json::to_string(&applicants)?],
            )?;
        }
        tx.commit()?;
        Ok(out)
    }

    fn row_to_job(row: &Row) -> rusqlite::Result<JobPosting> {
        let job_type: String = row.get(4)?;
        Ok(JobPosting {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            salary: row.get(3)?,
            job_type: job_type
                .parse()
                .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?,
            keywords: json_column(row, 5)?,
            posted_by: row.get(6)?,
            created_at: time_column(row, 7)?,
            applicants: json_column(row, 8)?,
        })
    }
}

pub(crate) fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn time_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::JobType;

    pub(crate) fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    pub(crate) fn sample_posting(title: &str, description: &str, keywords: &[&str]) -> NewJobPosting {
        NewJobPosting {
            title: title.to_string(),
            description: description.to_string(),
            salary: 90_000,
            job_type: JobType::FullTime,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn test_uninitialized_database_is_reported() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.ensure_initialized(), Err(BoardError::NotInitialized)));
        db.init().unwrap();
        db.ensure_initialized().unwrap();
    }

    #[test]
    fn test_add_and_get_job() {
        let db = test_db();
        let id = db
            .add_job(&sample_posting("Rust Engineer", "Systems work", &["rust", "linux"]), "admin-1")
            .unwrap();
        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.title, "Rust Engineer");
        assert_eq!(job.keywords, vec!["rust", "linux"]);
        assert_eq!(job.posted_by, "admin-1");
        assert!(job.applicants.is_empty());
        assert!(db.get_job(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_union_keeps_records_differing_by_applied_at() {
        let db = test_db();
        let id = db.add_job(&sample_posting("A", "B", &[]), "admin").unwrap();
        let first = ApplicantRecord::pending("u1");
        let mut second = first.clone();
        second.applied_at = first.applied_at + chrono::Duration::seconds(5);

        assert!(db.array_union_applicant(id, &first).unwrap());
        assert!(!db.array_union_applicant(id, &first).unwrap());
        assert!(db.array_union_applicant(id, &second).unwrap());

        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.applicants.len(), 2);
        assert!(job.applicants.iter().all(|a| a.id == "u1"));
    }

    #[test]
    fn test_remove_with_stale_record_is_a_silent_no_op() {
        let db = test_db();
        let id = db.add_job(&sample_posting("A", "B", &[]), "admin").unwrap();
        let stored = ApplicantRecord::pending("u1");
        db.array_union_applicant(id, &stored).unwrap();

        let mut stale = stored.clone();
        stale.applied_at = stored.applied_at - chrono::Duration::minutes(1);
        assert_eq!(db.array_remove_applicant(id, &stale).unwrap(), 0);
        assert_eq!(db.get_job(id).unwrap().unwrap().applicants, vec![stored.clone()]);

        assert_eq!(db.array_remove_applicant(id, &stored).unwrap(), 1);
        assert!(db.get_job(id).unwrap().unwrap().applicants.is_empty());
    }

    #[test]
    fn test_array_ops_on_missing_job() {
        let db = test_db();
        let record = ApplicantRecord::pending("u1");
        assert!(matches!(
            db.array_union_applicant(42, &record),
            Err(BoardError::JobNotFound(42))
        ));
    }

    #[test]
    fn test_upsert_leaves_exactly_one_record() {
        let db = test_db();
        let id = db.add_job(&sample_posting("A", "B", &[]), "admin").unwrap();
        let first = ApplicantRecord::pending("u1");
        let mut dup = first.clone();
        dup.applied_at = first.applied_at + chrono::Duration::seconds(1);
        db.array_union_applicant(id, &first).unwrap();
        db.array_union_applicant(id, &dup).unwrap();
        db.array_union_applicant(id, &ApplicantRecord::pending("u2")).unwrap();

        let record = db
            .upsert_applicant(id, "u1", ApplicantStatus::Accepted)
            .unwrap()
            .unwrap();
        assert_eq!(record.applied_at, first.applied_at);
        assert!(record.updated_at.is_some());

        let job = db.get_job(id).unwrap().unwrap();
        let mine: Vec<_> = job.applicants.iter().filter(|a| a.id == "u1").collect();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].status, ApplicantStatus::Accepted);
        assert_eq!(job.applicants.len(), 2);

        assert!(db.upsert_applicant(id, "nobody", ApplicantStatus::Rejected).unwrap().is_none());
    }

    #[test]
    fn test_delete_job() {
        let db = test_db();
        let id = db.add_job(&sample_posting("A", "B", &[]), "admin").unwrap();
        assert!(db.delete_job(id).unwrap());
        assert!(!db.delete_job(id).unwrap());
        assert!(db.list_jobs().unwrap().is_empty());
    }

    #[test]
    fn test_create_user_if_absent_keeps_existing_document() {
        let db = test_db();
        db.create_user("u1", Some("a@x.com"), "alice").unwrap();
        db.set_admin("u1", true).unwrap();
        assert!(!db.create_user_if_absent("u1", Some("a@x.com"), "other").unwrap());
        let user = db.get_user("u1").unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert!(user.is_admin);
        assert!(db.create_user_if_absent("u2", None, "bob").unwrap());
        assert_eq!(db.list_users().unwrap().len(), 2);
    }

    #[test]
    fn test_profile_subscription_sees_writes() {
        let db = test_db();
        db.create_user("u1", Some("a@x.com"), "alice").unwrap();
        let mut rx = db.subscribe_user("u1").unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().username, "alice");
        assert!(!rx.has_changed().unwrap());

        db.update_user_profile("u1", Some("Alice A."), Some("https://img/a.png")).unwrap();
        assert!(rx.has_changed().unwrap());
        let user = rx.borrow_and_update().clone().unwrap();
        assert_eq!(user.username, "Alice A.");
        assert_eq!(user.photo_url.as_deref(), Some("https://img/a.png"));

        db.set_admin("u1", true).unwrap();
        assert!(rx.borrow_and_update().as_ref().unwrap().is_admin);
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let db = test_db();
        db.create_user("u1", None, "alice").unwrap();
        let rx = db.subscribe_user("u1").unwrap();
        drop(rx);
        db.update_user_profile("u1", Some("x"), None).unwrap();
        let _other = db.subscribe_user("u2").unwrap();
        assert!(!db.profile_feeds.lock().contains_key("u1"));
    }
}
