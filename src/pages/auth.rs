use std::sync::LazyLock;

use regex::Regex;

use crate::error::{BoardError, FieldErrors, Result};
use crate::session::{CurrentUser, SessionContext};

const SIGNUP_MIN_PASSWORD: usize = 8;

static DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").expect("digit pattern"));

#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl SignupForm {
    pub fn validate(&self) -> std::result::Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.username.trim().is_empty() {
            errors.add("username", "Username is required.");
        }
        let email = self.email.trim();
        if !(email.contains('@') && email.contains('.')) {
            errors.add("email", "Please enter a valid email.");
        }
        if self.password.chars().count() < SIGNUP_MIN_PASSWORD || !DIGIT.is_match(&self.password) {
            errors.add("password", "Password must be at least 8 characters and contain a number.");
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Validates, then creates the account and its profile document.
    pub fn submit(&self, ctx: &mut SessionContext<'_>) -> Result<CurrentUser> {
        self.validate().map_err(BoardError::Validation)?;
        ctx.signup(self.email.trim(), &self.password, self.username.trim())
    }

    pub fn failure_message(err: &BoardError) -> String {
        match err {
            BoardError::Validation(errors) => errors.to_string(),
            other => format!("Failed to create account: {}", other),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub remember: bool,
}

impl LoginForm {
    pub fn validate(&self) -> std::result::Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.email.trim().is_empty() || self.password.is_empty() {
            errors.add("form", "Please enter both email and password.");
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    pub fn submit(&self, ctx: &mut SessionContext<'_>) -> Result<CurrentUser> {
        self.validate().map_err(BoardError::Validation)?;
        ctx.login(self.email.trim(), &self.password, self.remember)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::db::tests::test_db;
    use crate::identity::LocalIdentity;
    use crate::mailer::MemoryMailer;
    use crate::models::Role;

    fn context(db: &Database) -> SessionContext<'_> {
        let idp = LocalIdentity::new(db, None, Box::new(MemoryMailer::new())).unwrap();
        SessionContext::new(db, Box::new(idp)).unwrap()
    }

    fn alice() -> SignupForm {
        SignupForm {
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password: "pw123456".to_string(),
        }
    }

    #[test]
    fn test_signup_validation_messages() {
        let form = SignupForm {
            username: " ".to_string(),
            email: "alice".to_string(),
            password: "password".to_string(),
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("username"), Some("Username is required."));
        assert_eq!(errors.get("email"), Some("Please enter a valid email."));
        assert_eq!(
            errors.get("password"),
            Some("Password must be at least 8 characters and contain a number.")
        );

        let short = SignupForm { password: "pw1".to_string(), ..alice() };
        assert!(short.validate().unwrap_err().get("password").is_some());
        assert!(alice().validate().is_ok());
    }

    #[test]
    fn test_invalid_signup_never_reaches_provider() {
        let db = test_db();
        let mut ctx = context(&db);
        let form = SignupForm { email: "nope".to_string(), ..alice() };
        assert!(matches!(form.submit(&mut ctx), Err(BoardError::Validation(_))));
        assert!(db.list_users().unwrap().is_empty());
        assert!(ctx.user().is_none());
    }

    #[test]
    fn test_signup_creates_standard_profile() {
        let db = test_db();
        let mut ctx = context(&db);
        let user = alice().submit(&mut ctx).unwrap();
        assert_eq!(user.role, Role::Standard);
        let profile = db.get_user(&user.uid).unwrap().unwrap();
        assert_eq!(profile.username, "alice");
        assert!(!profile.is_admin);
    }

    #[test]
    fn test_duplicate_signup_reports_provider_message() {
        let db = test_db();
        let mut ctx = context(&db);
        alice().submit(&mut ctx).unwrap();
        ctx.logout().unwrap();
        let err = alice().submit(&mut ctx).unwrap_err();
        assert!(SignupForm::failure_message(&err).starts_with("Failed to create account: "));
    }

    #[test]
    fn test_login_requires_both_fields() {
        let db = test_db();
        let mut ctx = context(&db);
        let form = LoginForm {
            email: "alice@x.com".to_string(),
            ..LoginForm::default()
        };
        match form.submit(&mut ctx).unwrap_err() {
            BoardError::Validation(errors) => {
                assert_eq!(errors.get("form"), Some("Please enter both email and password."))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_login_after_signup() {
        let db = test_db();
        let mut ctx = context(&db);
        alice().submit(&mut ctx).unwrap();
        ctx.logout().unwrap();
        assert!(ctx.user().is_none());

        let form = LoginForm {
            email: "alice@x.com".to_string(),
            password: "pw123456".to_string(),
            remember: false,
        };
        assert_eq!(form.submit(&mut ctx).unwrap().name(), "alice");

        let wrong = LoginForm { password: "wrong999".to_string(), ..form };
        ctx.logout().unwrap();
        assert!(matches!(wrong.submit(&mut ctx), Err(BoardError::InvalidCredentials)));
    }
}
