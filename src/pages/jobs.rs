use tracing::debug;

use crate::db::Database;
use crate::error::{BoardError, Result};
use crate::models::{ApplicantRecord, JobPosting};
use crate::pages::{refresh_posting, withdraw_target};
use crate::router::Route;
use crate::search::filter_jobs;
use crate::session::CurrentUser;

/// Job listings with a shareable search term.
#[derive(Debug, Clone)]
pub struct JobsPage {
    jobs: Vec<JobPosting>,
    search: String,
}

impl JobsPage {
    /// Fetches the whole collection once; filtering happens locally.
    pub fn load(db: &Database, search: Option<&str>) -> Result<Self> {
        Ok(Self::from_jobs(db.list_jobs()?, search))
    }

    pub fn from_jobs(jobs: Vec<JobPosting>, search: Option<&str>) -> Self {
        Self {
            jobs,
            search: search.unwrap_or_default().to_string(),
        }
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, term: &str) {
        self.search = term.to_string();
    }

    /// The route that reproduces this view, search term included.
    pub fn route(&self) -> Route {
        Route::Jobs {
            search: Some(self.search.clone()).filter(|s| !s.is_empty()),
        }
    }

    pub fn jobs(&self) -> &[JobPosting] {
        &self.jobs
    }

    pub fn visible(&self) -> Vec<&JobPosting> {
        filter_jobs(&self.jobs, &self.search)
    }

    pub fn job(&self, job_id: i64) -> Option<&JobPosting> {
        self.jobs.iter().find(|j| j.id == job_id)
    }

    /// Adds a pending application. Applying again is not refused: the new
    /// record differs by `appliedAt` and sits beside the old one.
    pub fn apply(&mut self, db: &Database, user: &CurrentUser, job_id: i64) -> Result<ApplicantRecord> {
        let record = ApplicantRecord::pending(&user.uid);
        db.array_union_applicant(job_id, &record)?;
        refresh_posting(db, &mut self.jobs, job_id)?;
        Ok(record)
    }

    /// Removes the caller's record as held locally. Returns whether the
    /// store changed: a stale local copy matches nothing and is a no-op.
    pub fn withdraw(&mut self, db: &Database, user: &CurrentUser, job_id: i64) -> Result<bool> {
        let job = self.job(job_id).ok_or(BoardError::JobNotFound(job_id))?;
        let record = withdraw_target(Some(job), job_id, &user.uid)?;
        let removed = db.array_remove_applicant(job_id, &record)?;
        refresh_posting(db, &mut self.jobs, job_id)?;
        Ok(removed > 0)
    }

    pub fn delete(&mut self, db: &Database, user: &CurrentUser, job_id: i64) -> Result<()> {
        if !user.is_admin() {
            return Err(BoardError::PermissionDenied("only admins can delete postings"));
        }
        if !db.delete_job(job_id)? {
            debug!(job_id, "delete of a posting that was already gone");
        }
        self.jobs.retain(|j| j.id != job_id);
        Ok(())
    }
}
