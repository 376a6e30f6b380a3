use crate::db::Database;
use crate::error::Result;
use crate::models::JobPosting;
use crate::pages::{refresh_posting, withdraw_target};
use crate::session::CurrentUser;

/// Postings the current user has applied to.
#[derive(Debug, Clone)]
pub struct AppliedJobsPage {
    uid: String,
    jobs: Vec<JobPosting>,
}

impl AppliedJobsPage {
    pub fn load(db: &Database, user: &CurrentUser) -> Result<Self> {
        let jobs = db
            .list_jobs()?
            .into_iter()
            .filter(|job| job.has_applicant(&user.uid))
            .collect();
        Ok(Self {
            uid: user.uid.clone(),
            jobs,
        })
    }

    pub fn jobs(&self) -> &[JobPosting] {
        &self.jobs
    }

    pub fn withdraw(&mut self, db: &Database, job_id: i64) -> Result<bool> {
        let job = self.jobs.iter().find(|j| j.id == job_id);
        let record = withdraw_target(job, job_id, &self.uid)?;
        let removed = db.array_remove_applicant(job_id, &record)?;
        refresh_posting(db, &mut self.jobs, job_id)?;
        let uid = &self.uid;
        self.jobs.retain(|j| j.has_applicant(uid));
        Ok(removed > 0)
    }
}
