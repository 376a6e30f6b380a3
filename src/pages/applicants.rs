use std::collections::HashMap;

use crate::db::Database;
use crate::error::{BoardError, Result};
use crate::models::{ApplicantRecord, ApplicantStatus, JobPosting};
use crate::pages::refresh_posting;
use crate::session::CurrentUser;

/// Admin review of every posting and its applicants.
#[derive(Debug, Clone)]
pub struct ApplicantsPage {
    jobs: Vec<JobPosting>,
    names: HashMap<String, String>,
}

fn require_admin(user: &CurrentUser) -> Result<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(BoardError::PermissionDenied("applicant review is for admins"))
    }
}

impl ApplicantsPage {
    pub fn load(db: &Database, user: &CurrentUser) -> Result<Self> {
        require_admin(user)?;
        let names = db
            .list_users()?
            .into_iter()
            .map(|u| (u.uid.clone(), u.label().to_string()))
            .collect();
        Ok(Self {
            jobs: db.list_jobs()?,
            names,
        })
    }

    pub fn jobs(&self) -> &[JobPosting] {
        &self.jobs
    }

    /// Username or email of the applicant, else the raw uid.
    pub fn display_name<'s>(&'s self, uid: &'s str) -> &'s str {
        self.names.get(uid).map(String::as_str).unwrap_or(uid)
    }

    /// Accept or reject. Leaves exactly one record for the applicant on the job.
    pub fn set_status(
        &mut self,
        db: &Database,
        user: &CurrentUser,
        job_id: i64,
        applicant_id: &str,
        status: ApplicantStatus,
    ) -> Result<ApplicantRecord> {
        require_admin(user)?;
        let record = db
            .upsert_applicant(job_id, applicant_id, status)?
            .ok_or_else(|| BoardError::ApplicationNotFound {
                job_id,
                applicant: applicant_id.to_string(),
            })?;
        refresh_posting(db, &mut self.jobs, job_id)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{sample_posting, test_db};
    use crate::models::Role;
    use crate::router::tests::user;

    #[test]
    fn test_load_requires_admin() {
        let db = test_db();
        let err = ApplicantsPage::load(&db, &user(Role::Standard)).unwrap_err();
        assert!(matches!(err, BoardError::PermissionDenied(_)));
    }

    #[test]
    fn test_display_name_falls_back() {
        let db = test_db();
        db.create_user("a", Some("a@x.com"), "alice").unwrap();
        db.create_user("b", Some("b@x.com"), "").unwrap();
        let page = ApplicantsPage::load(&db, &user(Role::Admin)).unwrap();
        assert_eq!(page.display_name("a"), "alice");
        assert_eq!(page.display_name("b"), "b@x.com");
        assert_eq!(page.display_name("ghost"), "ghost");
    }

    #[test]
    fn test_accept_collapses_duplicates_into_one_record() {
        let db = test_db();
        let job = db.add_job(&sample_posting("Engineer", "x", &[]), "admin").unwrap();
        let first = ApplicantRecord::pending("alice");
        let mut second = first.clone();
        second.applied_at = first.applied_at + chrono::Duration::seconds(10);
        db.array_union_applicant(job, &first).unwrap();
        db.array_union_applicant(job, &second).unwrap();
        db.array_union_applicant(job, &ApplicantRecord::pending("bob")).unwrap();

        let mut page = ApplicantsPage::load(&db, &user(Role::Admin)).unwrap();
        let record = page
            .set_status(&db, &user(Role::Admin), job, "alice", ApplicantStatus::Accepted)
            .unwrap();
        assert_eq!(record.status, ApplicantStatus::Accepted);
        assert_eq!(record.applied_at, first.applied_at);
        assert!(record.updated_at.is_some());

        let stored = db.get_job(job).unwrap().unwrap().applicants;
        let alice: Vec<_> = stored.iter().filter(|r| r.id == "alice").collect();
        assert_eq!(alice, vec![&record]);
        assert!(stored.iter().any(|r| r.id == "bob" && r.status == ApplicantStatus::Pending));
        assert_eq!(page.jobs()[0].applicants, stored);
    }

    #[test]
    fn test_reject_then_accept_keeps_single_record() {
        let db = test_db();
        let job = db.add_job(&sample_posting("Engineer", "x", &[]), "admin").unwrap();
        db.array_union_applicant(job, &ApplicantRecord::pending("alice")).unwrap();
        let admin = user(Role::Admin);
        let mut page = ApplicantsPage::load(&db, &admin).unwrap();
        page.set_status(&db, &admin, job, "alice", ApplicantStatus::Rejected).unwrap();
        page.set_status(&db, &admin, job, "alice", ApplicantStatus::Accepted).unwrap();

        let stored = db.get_job(job).unwrap().unwrap().applicants;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, ApplicantStatus::Accepted);
    }

    #[test]
    fn test_review_without_record_is_not_found() {
        let db = test_db();
        let job = db.add_job(&sample_posting("Engineer", "x", &[]), "admin").unwrap();
        let admin = user(Role::Admin);
        let mut page = ApplicantsPage::load(&db, &admin).unwrap();
        let err = page
            .set_status(&db, &admin, job, "nobody", ApplicantStatus::Accepted)
            .unwrap_err();
        assert!(matches!(err, BoardError::ApplicationNotFound { .. }));
        assert!(db.get_job(job).unwrap().unwrap().applicants.is_empty());
    }
}
