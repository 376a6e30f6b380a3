//! Local identity provider: email/password and federated accounts, durable
//! or process-scoped sessions, and password-reset mail.

use chrono::Duration;
use rand::distributions::{Alphanumeric, DistString};
use rand::RngCore;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::db::{time_column, timestamp, Database};
use crate::error::{BoardError, Result};
use crate::mailer::{Mail, Mailer};
use crate::models;

pub const MIN_PASSWORD_LEN: usize = 6;
const HASH_ROUNDS: u32 = 10_000;
const UID_LEN: usize = 28;
const TOKEN_LEN: usize = 40;
const RESET_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInProvider {
    Password,
    Google,
}

impl SignInProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignInProvider::Password => "password",
            SignInProvider::Google => "google",
        }
    }

    fn from_column(s: &str) -> Self {
        match s {
            "google" => SignInProvider::Google,
            _ => SignInProvider::Password,
        }
    }
}

/// How long a sign-in lasts: across invocations, or only for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    Durable,
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub provider: SignInProvider,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Claims of a verified third-party identity token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedProfile {
    pub provider: SignInProvider,
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

pub trait IdentityProvider {
    fn current(&self) -> Option<Identity>;
    /// Session-change events; the receiver starts at the current state.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
    fn create_account(&mut self, email: &str, password: &str) -> Result<Identity>;
    fn sign_in(&mut self, email: &str, password: &str, persistence: Persistence) -> Result<Identity>;
    fn sign_in_federated(&mut self, profile: &FederatedProfile) -> Result<Identity>;
    fn sign_out(&mut self) -> Result<()>;
    fn update_profile(&mut self, update: &ProfileUpdate) -> Result<Identity>;
    fn send_password_reset(&mut self, email: &str) -> Result<()>;
    fn confirm_password_reset(&mut self, token: &str, new_password: &str) -> Result<()>;
}

pub struct LocalIdentity<'a> {
    db: &'a Database,
    session_file: Option<PathBuf>,
    mailer: Box<dyn Mailer + 'a>,
    state: watch::Sender<Option<Identity>>,
    token: Option<String>,
}

impl<'a> LocalIdentity<'a> {
    /// Restores a remembered session from `session_file` when one exists.
    pub fn new(
        db: &'a Database,
        session_file: Option<PathBuf>,
        mailer: Box<dyn Mailer + 'a>,
    ) -> Result<Self> {
        let (state, _) = watch::channel(None);
        let mut identity = Self {
            db,
            session_file,
            mailer,
            state,
            token: None,
        };
        identity.restore()?;
        Ok(identity)
    }

    fn restore(&mut self) -> Result<()> {
        let Some(path) = self.session_file.clone() else {
            return Ok(());
        };
        let token = match fs::read_to_string(&path) {
            Ok(t) => t.trim().to_string(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let uid: Option<String> = self
            .db
            .conn()
            .query_row("SELECT uid FROM sessions WHERE token = ?1", [&token], |row| row.get(0))
            .optional()?;
        let account = match uid {
            Some(uid) => self.load_account(&uid)?,
            None => None,
        };
        match account {
            Some(identity) => {
                info!(uid = %identity.uid, "restored remembered session");
                self.token = Some(token);
                self.state.send_replace(Some(identity));
            }
            None => {
                warn!(path = %path.display(), "discarding unknown session token");
                remove_session_file(&path)?;
            }
        }
        Ok(())
    }

    fn load_account(&self, uid: &str) -> Result<Option<Identity>> {
        let identity = self
            .db
            .conn()
            .query_row(
                "SELECT uid, email, display_name, photo_url, provider FROM accounts WHERE uid = ?1",
                [uid],
                |row| {
                    let provider: String = row.get(4)?;
                    Ok(Identity {
                        uid: row.get(0)?,
                        email: row.get(1)?,
                        display_name: row.get(2)?,
                        photo_url: row.get(3)?,
                        provider: SignInProvider::from_column(&provider),
                    })
                },
            )
            .optional()?;
        Ok(identity)
    }

    fn uid_for_email(&self, email: &str) -> Result<Option<String>> {
        let uid = self
            .db
            .conn()
            .query_row("SELECT uid FROM accounts WHERE email = ?1", [email], |row| row.get(0))
            .optional()?;
        Ok(uid)
    }

    fn start_session(&mut self, uid: &str, persistence: Persistence) -> Result<Identity> {
        self.end_durable_session()?;
        let identity = self
            .load_account(uid)?
            .ok_or_else(|| BoardError::AccountNotFound(uid.to_string()))?;

        if persistence == Persistence::Durable {
            let token = random_token(TOKEN_LEN);
            self.db.conn().execute(
                "INSERT INTO sessions (token, uid, created_at) VALUES (?1, ?2, ?3)",
                params![token, uid, timestamp(&models::now())],
            )?;
            if let Some(path) = &self.session_file {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, &token)?;
            }
            self.token = Some(token);
        }

        info!(uid, ?persistence, "signed in");
        self.state.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    fn end_durable_session(&mut self) -> Result<()> {
        if let Some(token) = self.token.take() {
            self.db.conn().execute("DELETE FROM sessions WHERE token = ?1", [&token])?;
            if let Some(path) = &self.session_file {
                remove_session_file(path)?;
            }
        }
        Ok(())
    }

    fn current_uid(&self) -> Result<String> {
        self.state
            .borrow()
            .as_ref()
            .map(|identity| identity.uid.clone())
            .ok_or(BoardError::NotSignedIn)
    }
}

impl IdentityProvider for LocalIdentity<'_> {
    fn current(&self) -> Option<Identity> {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }

    fn create_account(&mut self, email: &str, password: &str) -> Result<Identity> {
        let email = email.trim();
        check_password_strength(password)?;
        if self.uid_for_email(email)?.is_some() {
            return Err(BoardError::EmailInUse(email.to_string()));
        }

        let uid = random_token(UID_LEN);
        let salt = random_salt();
        self.db.conn().execute(
            "INSERT INTO accounts (uid, email, password_hash, salt, provider, created_at)
             VALUES (?1, ?2, ?3, ?4, 'password', ?5)",
            params![uid, email, hash_password(password, &salt), salt, timestamp(&models::now())],
        )?;
        info!(uid = %uid, "account created");
        self.start_session(&uid, Persistence::Durable)
    }

    fn sign_in(&mut self, email: &str, password: &str, persistence: Persistence) -> Result<Identity> {
        let row: Option<(String, Option<String>, Option<String>)> = self
            .db
            .conn()
            .query_row(
                "SELECT uid, password_hash, salt FROM accounts WHERE email = ?1",
                [email.trim()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let uid = match row {
            Some((uid, Some(hash), Some(salt))) if verify_password(password, &salt, &hash) => uid,
            _ => {
                warn!("rejected sign-in attempt");
                return Err(BoardError::InvalidCredentials);
            }
        };
        self.start_session(&uid, persistence)
    }

    fn sign_in_federated(&mut self, profile: &FederatedProfile) -> Result<Identity> {
        let subject = format!("{}:{}", profile.provider.as_str(), profile.subject);
        let existing: Option<String> = self
            .db
            .conn()
            .query_row(
                "SELECT uid FROM accounts WHERE federated_subject = ?1",
                [&subject],
                |row| row.get(0),
            )
            .optional()?;

        let uid = match existing {
            Some(uid) => uid,
            None => {
                if let Some(email) = &profile.email {
                    if self.uid_for_email(email)?.is_some() {
                        return Err(BoardError::EmailInUse(email.clone()));
                    }
                }
                let uid = random_token(UID_LEN);
                self.db.conn().execute(
                    "INSERT INTO accounts (uid, email, display_name, provider, federated_subject, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        uid,
                        profile.email,
                        profile.display_name,
                        profile.provider.as_str(),
                        subject,
                        timestamp(&models::now()),
                    ],
                )?;
                info!(uid = %uid, provider = profile.provider.as_str(), "federated account created");
                uid
            }
        };
        self.start_session(&uid, Persistence::Durable)
    }

    fn sign_out(&mut self) -> Result<()> {
        self.end_durable_session()?;
        if self.state.borrow().is_some() {
            info!("signed out");
        }
        self.state.send_replace(None);
        Ok(())
    }

    fn update_profile(&mut self, update: &ProfileUpdate) -> Result<Identity> {
        let uid = self.current_uid()?;
        self.db.conn().execute(
            "UPDATE accounts SET display_name = COALESCE(?2, display_name), photo_url = COALESCE(?3, photo_url)
             WHERE uid = ?1",
            params![uid, update.display_name, update.photo_url],
        )?;
        let identity = self
            .load_account(&uid)?
            .ok_or(BoardError::AccountNotFound(uid))?;
        self.state.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    fn send_password_reset(&mut self, email: &str) -> Result<()> {
        let email = email.trim();
        let uid = self
            .uid_for_email(email)?
            .ok_or_else(|| BoardError::AccountNotFound(email.to_string()))?;
        let token = random_token(TOKEN_LEN);
        let expires_at = models::now() + Duration::minutes(RESET_TTL_MINUTES);
        self.db.conn().execute(
            "INSERT INTO password_resets (token, uid, expires_at) VALUES (?1, ?2, ?3)",
            params![token, uid, timestamp(&expires_at)],
        )?;
        self.mailer.send(&Mail {
            to: email.to_string(),
            subject: "Reset your password".to_string(),
            body: format!(
                "Someone asked to reset the password for {}.\n\n\
                 Reset code: {}\n\n\
                 Run: hire confirm-reset {} <new-password>\n\n\
                 The code expires in {} minutes. If you did not ask for this, ignore this message.",
                email, token, token, RESET_TTL_MINUTES
            ),
        })?;
        info!(uid = %uid, "password reset mail sent");
        Ok(())
    }

    fn confirm_password_reset(&mut self, token: &str, new_password: &str) -> Result<()> {
        check_password_strength(new_password)?;
        let row = self
            .db
            .conn()
            .query_row(
                "SELECT uid, expires_at FROM password_resets WHERE token = ?1 AND used = 0",
                [token.trim()],
                |row| Ok((row.get::<_, String>(0)?, time_column(row, 1)?)),
            )
            .optional()?;
        let uid = match row {
            Some((uid, expires_at)) if expires_at > models::now() => uid,
            _ => return Err(BoardError::InvalidResetToken),
        };

        let tx = self.db.conn().unchecked_transaction()?;
        let salt = random_salt();
        tx.execute(
            "UPDATE accounts SET password_hash = ?2, salt = ?3 WHERE uid = ?1",
            params![uid, hash_password(new_password, &salt), salt],
        )?;
        tx.execute("UPDATE password_resets SET used = 1 WHERE token = ?1", [token.trim()])?;
        tx.execute("DELETE FROM sessions WHERE uid = ?1", [&uid])?;
        tx.commit()?;
        info!(uid = %uid, "password reset");
        Ok(())
    }
}

fn check_password_strength(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(BoardError::WeakPassword(MIN_PASSWORD_LEN));
    }
    Ok(())
}

fn password_digest(password: &str, salt: &str) -> Vec<u8> {
    let mut digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..HASH_ROUNDS {
        digest = Sha256::new().chain_update(salt.as_bytes()).chain_update(digest).finalize();
    }
    digest.to_vec()
}

fn hash_password(password: &str, salt: &str) -> String {
    hex::encode(password_digest(password, salt))
}

/// Constant-time check against a stored hex hash. A malformed hash never matches.
fn verify_password(password: &str, salt: &str, stored: &str) -> bool {
    match hex::decode(stored) {
        Ok(expected) => bool::from(password_digest(password, salt).as_slice().ct_eq(expected.as_slice())),
        Err(_) => false,
    }
}

fn remove_session_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn random_token(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), len)
}

fn random_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
