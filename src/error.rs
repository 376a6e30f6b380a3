use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::models::ApplicantStatus;

/// Per-field validation messages, reported before any store call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    errors: BTreeMap<&'static str, String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.errors.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// `Ok(())` when nothing was reported.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() { Ok(()) } else { Err(BoardError::Validation(self)) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("{0}")]
    Validation(FieldErrors),

    #[error("Database not initialized. Run 'hire init' first.")]
    NotInitialized,

    #[error("No user is signed in.")]
    NotSignedIn,

    #[error("Invalid email or password.")]
    InvalidCredentials,

    #[error("Email already in use: {0}")]
    EmailInUse(String),

    #[error("Password should be at least {0} characters.")]
    WeakPassword(usize),

    #[error("No account found for {0}")]
    AccountNotFound(String),

    #[error("Password reset link is invalid or has expired.")]
    InvalidResetToken,

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("No application from {applicant} on job {job_id}")]
    ApplicationNotFound { job_id: i64, applicant: String },

    #[error("Only pending applications can be withdrawn (current status: {0})")]
    NotWithdrawable(ApplicantStatus),

    #[error("Permission denied: {0}")]
    PermissionDenied(&'static str),

    #[error("Image upload failed: {0}")]
    Upload(String),

    #[error("Federated sign-in failed: {0}")]
    Federated(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BoardError>;
