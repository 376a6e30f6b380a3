//! Page state and actions. Each page loads its own data, keeps a local copy,
//! and re-reads the affected posting after every write.

pub mod admin;
pub mod applicants;
pub mod applied;
pub mod auth;
pub mod jobs;
pub mod profile;

use crate::db::Database;
use crate::error::{BoardError, Result};
use crate::models::{ApplicantRecord, JobPosting};

/// Replace (or drop, if it is gone) one posting in a page-local list.
pub(crate) fn refresh_posting(db: &Database, jobs: &mut Vec<JobPosting>, job_id: i64) -> Result<()> {
    match db.get_job(job_id)? {
        Some(fresh) => {
            if let Some(slot) = jobs.iter_mut().find(|j| j.id == job_id) {
                *slot = fresh;
            } else {
                jobs.push(fresh);
            }
        }
        None => jobs.retain(|j| j.id != job_id),
    }
    Ok(())
}

/// Picks the caller's pending record on `job`. Decided records alone are
/// not withdrawable; no record at all is not-found.
pub(crate) fn withdraw_target(job: Option<&JobPosting>, job_id: i64, uid: &str) -> Result<ApplicantRecord> {
    let not_found = || BoardError::ApplicationNotFound {
        job_id,
        applicant: uid.to_string(),
    };
    let job = job.ok_or_else(not_found)?;
    if let Some(record) = job.withdrawable_for(uid) {
        return Ok(record.clone());
    }
    match job.application_for(uid) {
        Some(decided) => Err(BoardError::NotWithdrawable(decided.status)),
        None => Err(not_found()),
    }
}
