//! Current-user state: the signed-in identity merged with its live profile
//! document.

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{BoardError, Result};
use crate::federated::FederatedVerifier;
use crate::identity::{Identity, IdentityProvider, Persistence, ProfileUpdate};
use crate::models::{Role, UserProfile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub photo_url: Option<String>,
    pub role: Role,
    pub created_at: Option<DateTime<Utc>>,
}

impl CurrentUser {
    /// Profile fields win over identity fields when both are set.
    pub fn merge(identity: &Identity, profile: Option<&UserProfile>) -> Self {
        match profile {
            Some(profile) => Self {
                uid: identity.uid.clone(),
                email: profile.email.clone().or_else(|| identity.email.clone()),
                display_name: identity.display_name.clone(),
                username: Some(profile.username.clone()).filter(|u| !u.is_empty()),
                photo_url: profile.photo_url.clone().or_else(|| identity.photo_url.clone()),
                role: profile.role(),
                created_at: Some(profile.created_at),
            },
            None => Self {
                uid: identity.uid.clone(),
                email: identity.email.clone(),
                display_name: identity.display_name.clone(),
                username: None,
                photo_url: identity.photo_url.clone(),
                role: Role::Standard,
                created_at: None,
            },
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Best name to greet the user with.
    pub fn name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.display_name.as_deref())
            .filter(|n| !n.is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.uid)
    }
}

pub struct SessionContext<'a> {
    db: &'a Database,
    identity: Box<dyn IdentityProvider + 'a>,
    federated: Option<Box<dyn FederatedVerifier + 'a>>,
    identity_rx: watch::Receiver<Option<Identity>>,
    profile_rx: Option<watch::Receiver<Option<UserProfile>>>,
    current: Option<Identity>,
    user: Option<CurrentUser>,
}

impl<'a> SessionContext<'a> {
    /// Subscribes to session changes and resolves the initial user state.
    pub fn new(db: &'a Database, identity: Box<dyn IdentityProvider + 'a>) -> Result<Self> {
        let identity_rx = identity.subscribe();
        let mut ctx = Self {
            db,
            identity,
            federated: None,
            identity_rx,
            profile_rx: None,
            current: None,
            user: None,
        };
        let initial = ctx.identity_rx.borrow_and_update().clone();
        ctx.on_identity_change(initial)?;
        Ok(ctx)
    }

    pub fn with_federated(mut self, verifier: Box<dyn FederatedVerifier + 'a>) -> Self {
        self.federated = Some(verifier);
        self
    }

    pub fn user(&self) -> Option<&CurrentUser> {
        self.user.as_ref()
    }

    pub fn require_user(&self) -> Result<&CurrentUser> {
        self.user.as_ref().ok_or(BoardError::NotSignedIn)
    }

    /// Drains pending identity and profile events.
    pub fn sync(&mut self) -> Result<()> {
        if self.identity_rx.has_changed().unwrap_or(false) {
            let next = self.identity_rx.borrow_and_update().clone();
            self.on_identity_change(next)?;
        }
        let mut profile_changed = None;
        if let Some(rx) = self.profile_rx.as_mut() {
            if rx.has_changed().unwrap_or(false) {
                profile_changed = Some(rx.borrow_and_update().clone());
            }
        }
        if let (Some(profile), Some(identity)) = (profile_changed, self.current.as_ref()) {
            debug!(uid = %identity.uid, "profile document changed");
            self.user = Some(CurrentUser::merge(identity, profile.as_ref()));
        }
        Ok(())
    }

    fn on_identity_change(&mut self, next: Option<Identity>) -> Result<()> {
        let same_user = matches!(
            (&self.current, &next),
            (Some(a), Some(b)) if a.uid == b.uid
        );
        if !same_user {
            // tear down before attaching the next subscription
            self.profile_rx = None;
        }

        match next {
            Some(identity) => {
                if self.profile_rx.is_none() {
                    self.profile_rx = Some(self.db.subscribe_user(&identity.uid)?);
                    info!(uid = %identity.uid, "session started");
                }
                let profile = match self.profile_rx.as_mut() {
                    Some(rx) => rx.borrow_and_update().clone(),
                    None => None,
                };
                self.user = Some(CurrentUser::merge(&identity, profile.as_ref()));
                self.current = Some(identity);
            }
            None => {
                if self.current.is_some() {
                    info!("session ended");
                }
                self.current = None;
                self.user = None;
            }
        }
        Ok(())
    }

    /// Creates the account, names it, and writes a non-admin profile.
    pub fn signup(&mut self, email: &str, password: &str, display_name: &str) -> Result<CurrentUser> {
        let identity = self.identity.create_account(email, password)?;
        self.identity.update_profile(&ProfileUpdate {
            display_name: Some(display_name.to_string()),
            photo_url: None,
        })?;
        self.db
            .create_user(&identity.uid, identity.email.as_deref(), display_name)?;
        self.sync()?;
        self.require_user().cloned()
    }

    pub fn login(&mut self, email: &str, password: &str, remember: bool) -> Result<CurrentUser> {
        let persistence = if remember { Persistence::Durable } else { Persistence::Session };
        self.identity.sign_in(email, password, persistence)?;
        self.sync()?;
        self.require_user().cloned()
    }

    /// Federated sign-in; the profile document is only written the first time.
    pub fn sign_in_with_google(&mut self, id_token: &str) -> Result<CurrentUser> {
        let verifier = self
            .federated
            .as_ref()
            .ok_or_else(|| BoardError::Federated("no federated verifier configured".to_string()))?;
        let claims = verifier.verify(id_token)?;
        let identity = self.identity.sign_in_federated(&claims)?;
        let username = identity.display_name.clone().unwrap_or_default();
        self.db
            .create_user_if_absent(&identity.uid, identity.email.as_deref(), &username)?;
        self.sync()?;
        self.require_user().cloned()
    }

    pub fn logout(&mut self) -> Result<()> {
        self.identity.sign_out()?;
        self.sync()
    }

    pub fn reset_password(&mut self, email: &str) -> Result<()> {
        self.identity.send_password_reset(email)
    }

    pub fn confirm_password_reset(&mut self, token: &str, new_password: &str) -> Result<()> {
        self.identity.confirm_password_reset(token, new_password)
    }

    /// Updates the identity and the profile document; fails without a session.
    pub fn update_profile(&mut self, update: &ProfileUpdate) -> Result<CurrentUser> {
        if self.identity.current().is_none() {
            return Err(BoardError::NotSignedIn);
        }
        let identity = self.identity.update_profile(update)?;
        self.db.update_user_profile(
            &identity.uid,
            update.display_name.as_deref(),
            update.photo_url.as_deref(),
        )?;
        self.sync()?;
        self.require_user().cloned()
    }
}
