use serde::Deserialize;
use tracing::debug;

use crate::error::{BoardError, Result};
use crate::identity::{FederatedProfile, SignInProvider};

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Turns a third-party identity token into verified claims.
pub trait FederatedVerifier {
    fn verify(&self, id_token: &str) -> Result<FederatedProfile>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    sub: String,
    aud: Option<String>,
    email: Option<String>,
    email_verified: Option<String>,
    name: Option<String>,
}

/// Verifies Google ID tokens with Google's tokeninfo endpoint.
#[derive(Debug)]
pub struct GoogleTokenInfo {
    client_id: Option<String>,
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl GoogleTokenInfo {
    pub fn new(client_id: Option<String>) -> Self {
        Self::with_endpoint(client_id, GOOGLE_TOKENINFO_URL)
    }

    pub fn with_endpoint(client_id: Option<String>, endpoint: &str) -> Self {
        Self {
            client_id,
            endpoint: endpoint.to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn to_profile(&self, info: TokenInfo) -> Result<FederatedProfile> {
        if let Some(expected) = &self.client_id {
            if info.aud.as_deref() != Some(expected.as_str()) {
                return Err(BoardError::Federated("token was issued for another client".to_string()));
            }
        }
        // unverified addresses must not claim an existing account's email
        let email = match info.email_verified.as_deref() {
            Some("true") => info.email,
            _ => None,
        };
        Ok(FederatedProfile {
            provider: SignInProvider::Google,
            subject: info.sub,
            email,
            display_name: info.name,
        })
    }
}

impl FederatedVerifier for GoogleTokenInfo {
    fn verify(&self, id_token: &str) -> Result<FederatedProfile> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("id_token", id_token.trim())])
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(BoardError::Federated(format!(
                "token verification failed with status {}: {}",
                status, error_text
            )));
        }

        let info: TokenInfo = response.json()?;
        debug!(sub = %info.sub, "google token verified");
        self.to_profile(info)
    }
}
