use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp with the millisecond precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Standard,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub email: Option<String>,
    pub username: String,
    pub photo_url: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn role(&self) -> Role {
        if self.is_admin { Role::Admin } else { Role::Standard }
    }

    /// Name shown to reviewers: username, then email, then uid.
    pub fn label(&self) -> &str {
        if !self.username.is_empty() {
            &self.username
        } else {
            self.email.as_deref().unwrap_or(&self.uid)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    #[default]
    FullTime,
    PartTime,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FullTime => "full-time",
            JobType::PartTime => "part-time",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full-time" | "fulltime" | "full" => Ok(JobType::FullTime),
            "part-time" | "parttime" | "part" => Ok(JobType::PartTime),
            other => Err(format!("Unknown job type '{}' (expected full-time or part-time)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicantStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ApplicantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicantStatus::Pending => "pending",
            ApplicantStatus::Accepted => "accepted",
            ApplicantStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApplicantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ApplicantStatus::Pending),
            "accept" | "accepted" => Ok(ApplicantStatus::Accepted),
            "reject" | "rejected" => Ok(ApplicantStatus::Rejected),
            other => Err(format!("Unknown status '{}' (expected accept or reject)", other)),
        }
    }
}

/// One user's application on one posting. Equality is full-value: the
/// store's array removal only matches records equal in every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantRecord {
    pub id: String,
    pub status: ApplicantStatus,
    pub applied_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ApplicantRecord {
    pub fn pending(applicant_id: &str) -> Self {
        Self {
            id: applicant_id.to_string(),
            status: ApplicantStatus::Pending,
            applied_at: now(),
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPosting {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub salary: i64,
    pub job_type: JobType,
    pub keywords: Vec<String>,
    pub posted_by: String,
    pub created_at: DateTime<Utc>,
    pub applicants: Vec<ApplicantRecord>,
}

impl JobPosting {
    /// First record held by `uid`, if any.
    pub fn application_for(&self, uid: &str) -> Option<&ApplicantRecord> {
        self.applicants.iter().find(|a| a.id == uid)
    }

    pub fn has_applicant(&self, uid: &str) -> bool {
        self.application_for(uid).is_some()
    }

    pub fn applications_for<'a>(&'a self, uid: &'a str) -> impl Iterator<Item = &'a ApplicantRecord> + 'a {
        self.applicants.iter().filter(move |a| a.id == uid)
    }

    /// The record a withdraw acts on: the holder's pending one, even when an
    /// earlier application of theirs was already decided.
    pub fn withdrawable_for<'a>(&'a self, uid: &'a str) -> Option<&'a ApplicantRecord> {
        self.applications_for(uid)
            .find(|a| a.status == ApplicantStatus::Pending)
    }
}

/// Validated input for a new posting; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJobPosting {
    pub title: String,
    pub description: String,
    pub salary: i64,
    pub job_type: JobType,
    pub keywords: Vec<String>,
}
