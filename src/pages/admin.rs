use tracing::warn;

use crate::db::Database;
use crate::error::{BoardError, FieldErrors, Result};
use crate::models::{JobType, NewJobPosting};
use crate::session::CurrentUser;

/// Raw form input for a new posting. Job type starts at full-time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobForm {
    pub title: String,
    pub description: String,
    pub salary: String,
    pub job_type: String,
    pub keywords: String,
}

impl Default for JobForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            salary: String::new(),
            job_type: JobType::default().as_str().to_string(),
            keywords: String::new(),
        }
    }
}

/// Comma separated, trimmed, lowercased, empties dropped.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

impl JobForm {
    pub fn validate(&self) -> std::result::Result<NewJobPosting, FieldErrors> {
        let mut errors = FieldErrors::new();
        let title = self.title.trim();
        let description = self.description.trim();
        if title.is_empty() {
            errors.add("title", "Title is required.");
        }
        if description.is_empty() {
            errors.add("description", "Description is required.");
        }
        let salary = match self.salary.trim() {
            "" => {
                errors.add("salary", "Salary is required.");
                None
            }
            raw => match raw.parse::<i64>() {
                Ok(n) if n >= 0 => Some(n),
                _ => {
                    errors.add("salary", "Salary must be a whole number of at least 0.");
                    None
                }
            },
        };
        let job_type = match self.job_type.trim() {
            "" => {
                errors.add("jobType", "Job type is required.");
                None
            }
            raw => match raw.parse::<JobType>() {
                Ok(t) => Some(t),
                Err(e) => {
                    errors.add("jobType", e);
                    None
                }
            },
        };
        match (salary, job_type) {
            (Some(salary), Some(job_type)) if errors.is_empty() => Ok(NewJobPosting {
                title: title.to_string(),
                description: description.to_string(),
                salary,
                job_type,
                keywords: parse_keywords(&self.keywords),
            }),
            _ => Err(errors),
        }
    }

    /// Posts the form as `user`. On success the form is cleared and the new id
    /// returned with the banner message; on failure the form is left as is.
    pub fn submit(&mut self, db: &Database, user: &CurrentUser) -> Result<(i64, String)> {
        if !user.is_admin() {
            return Err(BoardError::PermissionDenied("only admins can post jobs"));
        }
        let posting = self.validate().map_err(BoardError::Validation)?;
        match db.add_job(&posting, &user.uid) {
            Ok(id) => {
                *self = JobForm::default();
                Ok((id, "Job posted successfully!".to_string()))
            }
            Err(e) => {
                warn!(error = %e, "job post failed");
                Err(e)
            }
        }
    }
}

/// Banner text for a failed submit.
pub fn failure_message(err: &BoardError) -> String {
    format!("Failed to post job: {}", err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_db;
    use crate::models::Role;
    use crate::router::tests::user;

    fn filled() -> JobForm {
        JobForm {
            title: " Rust Engineer ".to_string(),
            description: "Build the board".to_string(),
            salary: "120000".to_string(),
            job_type: "part-time".to_string(),
            keywords: "Rust, , Backend ,SQL".to_string(),
        }
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse_keywords("React, TypeScript ,, node "), vec!["react", "typescript", "node"]);
        assert!(parse_keywords(" , ").is_empty());
    }

    #[test]
    fn test_default_job_type_is_full_time() {
        assert_eq!(JobForm::default().job_type, "full-time");
    }

    #[test]
    fn test_validate_reports_each_missing_field() {
        let form = JobForm {
            job_type: String::new(),
            ..JobForm::default()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("title"), Some("Title is required."));
        assert_eq!(errors.get("description"), Some("Description is required."));
        assert_eq!(errors.get("salary"), Some("Salary is required."));
        assert_eq!(errors.get("jobType"), Some("Job type is required."));
    }

    #[test]
    fn test_validate_rejects_bad_salary() {
        for salary in ["-5", "12.5", "lots"] {
            let form = JobForm { salary: salary.to_string(), ..filled() };
            let errors = form.validate().unwrap_err();
            assert!(errors.get("salary").is_some(), "salary {salary:?}");
        }
    }

    #[test]
    fn test_validate_builds_posting() {
        let posting = filled().validate().unwrap();
        assert_eq!(posting.title, "Rust Engineer");
        assert_eq!(posting.salary, 120_000);
        assert_eq!(posting.job_type, JobType::PartTime);
        assert_eq!(posting.keywords, vec!["rust", "backend", "sql"]);
    }

    #[test]
    fn test_submit_persists_and_clears() {
        let db = test_db();
        let admin = user(Role::Admin);
        let mut form = filled();
        let (id, message) = form.submit(&db, &admin).unwrap();
        assert_eq!(message, "Job posted successfully!");
        assert_eq!(form, JobForm::default());

        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.posted_by, admin.uid);
        assert!(job.applicants.is_empty());
    }

    #[test]
    fn test_invalid_submit_keeps_form_and_writes_nothing() {
        let db = test_db();
        let mut form = JobForm { title: String::new(), ..filled() };
        let err = form.submit(&db, &user(Role::Admin)).unwrap_err();
        assert!(matches!(err, BoardError::Validation(_)));
        assert_eq!(form.description, "Build the board");
        assert!(db.list_jobs().unwrap().is_empty());
    }

    #[test]
    fn test_standard_user_cannot_post() {
        let db = test_db();
        let mut form = filled();
        let err = form.submit(&db, &user(Role::Standard)).unwrap_err();
        assert!(matches!(err, BoardError::PermissionDenied(_)));
        assert_eq!(failure_message(&err), "Failed to post job: Permission denied: only admins can post jobs");
        assert!(db.list_jobs().unwrap().is_empty());
    }
}
