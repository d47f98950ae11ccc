use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::error::Error;
use crate::provider::{ChangeFeed, IdentityProvider, SignUpOutcome};
use crate::session::{AuthChange, ChangeKind, Session};

// Endpoint paths under {base}/auth/v1
const TOKEN_PATH: &str = "token";
const SIGNUP_PATH: &str = "signup";
const LOGOUT_PATH: &str = "logout";

// Grant types accepted by the token endpoint
const PASSWORD_GRANT: &str = "password";
const REFRESH_TOKEN_GRANT: &str = "refresh_token";

// Response type for token requests (password and refresh grants)
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    user: UserPayload,
}

// User object embedded in provider responses
#[derive(Debug, Clone, Deserialize)]
struct UserPayload {
    id: String,
    email: Option<String>,
}

// Response type for sign-up. Auto-confirm deployments answer with the token
// fields filled in; confirmation-first deployments answer with a bare user
// object, so everything here is optional.
#[derive(Debug, Clone, Deserialize)]
struct SignUpResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    user: Option<UserPayload>,
    id: Option<String>,
    email: Option<String>,
}

// Error body from the provider. Current deployments use `msg`, older ones
// `error`/`error_description`.
#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorResponse {
    msg: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ErrorResponse {
    fn message(self) -> Option<String> {
        self.msg.or(self.error_description).or(self.error)
    }
}

/// Client for GoTrue-compatible identity providers (Supabase auth and
/// friends).
///
/// The provider holds at most one session at a time. Each successful
/// sign-in, sign-out, or refresh replaces it and emits one change on the
/// stream returned by `changes()`.
pub struct GoTrueProvider {
    /// HTTP client for provider requests
    client: Client,
    /// Project URL and publishable key
    config: ProviderConfig,
    /// Session issued by the most recent successful call, if any
    session: RwLock<Option<Session>>,
    /// Fan-out for auth-state changes
    changes: ChangeFeed,
}

impl GoTrueProvider {
    /// Create a provider client for the given project.
    pub fn new(config: ProviderConfig) -> Result<Self, Error> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::provider_init_with_source("failed to build HTTP client", e))?;

        info!(url = %config.url, "gotrue provider initialized");

        Ok(Self {
            client,
            config,
            session: RwLock::new(None),
            changes: ChangeFeed::new(),
        })
    }

    /// Read the project config from the environment and build a client.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(ProviderConfig::from_env()?)
    }

    /// POST to the token endpoint with the given grant type.
    async fn request_token(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<TokenResponse, Error> {
        let url = format!(
            "{}?grant_type={}",
            self.config.auth_endpoint(TOKEN_PATH),
            grant_type
        );

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::auth_with_source("failed to reach identity provider", e))?;

        Self::deserialize_or_reject(response).await
    }

    /// Turn a provider response into `T`, or into an `Error::Auth` carrying
    /// the provider's own message and HTTP status.
    async fn deserialize_or_reject<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, Error> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(ErrorResponse::message)
                .unwrap_or_else(|| format!("HTTP {}: {}", status, body.trim()));
            warn!(status = status.as_u16(), message = %message, "provider rejected request");
            return Err(Error::auth_with_status(message, status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::auth_with_source("failed to parse provider response", e))
    }

    /// Build the session carried by a token response.
    ///
    /// Falls back to the submitted email when the provider leaves the user's
    /// address blank.
    fn session_from_token(submitted_email: &str, token: TokenResponse) -> Session {
        let expires_at = token
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        let email = token
            .user
            .email
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| submitted_email.to_string());

        Session {
            user_id: token.user.id,
            email,
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            token_type: token.token_type,
            expires_at,
        }
    }

    /// Store the new session and notify subscribers.
    async fn install_session(&self, session: Session, kind: ChangeKind) {
        *self.session.write().await = Some(session.clone());
        self.changes.emit(AuthChange {
            kind,
            session: Some(session),
        });
    }
}

#[async_trait]
impl IdentityProvider for GoTrueProvider {
    fn name(&self) -> &str {
        "gotrue"
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, Error> {
        debug!("requesting password grant");

        let token = self
            .request_token(PASSWORD_GRANT, json!({ "email": email, "password": password }))
            .await?;
        let session = Self::session_from_token(email, token);
        self.install_session(session.clone(), ChangeKind::SignedIn)
            .await;

        info!(user_id = %session.user_id, "signed in");
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, Error> {
        let response = self
            .client
            .post(self.config.auth_endpoint(SIGNUP_PATH))
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| Error::auth_with_source("failed to reach identity provider", e))?;
        let payload: SignUpResponse = Self::deserialize_or_reject(response).await?;

        match payload.access_token {
            // Auto-confirm deployments hand back a full session immediately.
            Some(access_token) => {
                let expires_at = payload
                    .expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
                let (user_id, user_email) = match payload.user {
                    Some(user) => (user.id, user.email),
                    None => (payload.id.unwrap_or_default(), payload.email),
                };
                let session = Session {
                    user_id,
                    email: user_email
                        .filter(|e| !e.is_empty())
                        .unwrap_or_else(|| email.to_string()),
                    access_token,
                    refresh_token: payload.refresh_token,
                    token_type: payload.token_type.unwrap_or_else(|| "bearer".to_string()),
                    expires_at,
                };
                self.install_session(session.clone(), ChangeKind::SignedIn)
                    .await;
                info!(user_id = %session.user_id, "sign-up auto-confirmed");
                Ok(SignUpOutcome::SignedIn(session))
            }
            // Otherwise the provider queued a confirmation email and the
            // caller stays signed out. No change is emitted.
            None => {
                let email = payload
                    .email
                    .or_else(|| payload.user.and_then(|u| u.email))
                    .unwrap_or_else(|| email.to_string());
                info!(email = %email, "sign-up accepted, confirmation required");
                Ok(SignUpOutcome::ConfirmationRequired { email })
            }
        }
    }

    async fn sign_out(&self) -> Result<(), Error> {
        let previous = self.session.write().await.take();

        if let Some(session) = previous {
            // Best-effort server-side revocation. The local session is gone
            // either way, which is what sign-out promises.
            let response = self
                .client
                .post(self.config.auth_endpoint(LOGOUT_PATH))
                .header("apikey", &self.config.anon_key)
                .bearer_auth(&session.access_token)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    debug!("server-side session revoked");
                }
                Ok(response)
                    if response.status() == StatusCode::UNAUTHORIZED
                        || response.status() == StatusCode::NOT_FOUND =>
                {
                    // The token was already unusable server-side, which is
                    // the state sign-out wants anyway.
                    debug!(
                        status = response.status().as_u16(),
                        "session was already invalid server-side"
                    );
                }
                Ok(response) => {
                    warn!(
                        status = response.status().as_u16(),
                        "server-side sign-out failed, local session cleared anyway"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "could not reach provider for sign-out, local session cleared anyway");
                }
            }
        }

        self.changes.emit(AuthChange::signed_out());
        info!("signed out");
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Session, Error> {
        let (refresh_token, email) = {
            let held = self.session.read().await;
            match held.as_ref() {
                Some(session) => match &session.refresh_token {
                    Some(token) => (token.clone(), session.email.clone()),
                    None => return Err(Error::auth("held session has no refresh token")),
                },
                None => return Err(Error::auth("no session to refresh")),
            }
        };

        let token = self
            .request_token(REFRESH_TOKEN_GRANT, json!({ "refresh_token": refresh_token }))
            .await?;
        let session = Self::session_from_token(&email, token);
        self.install_session(session.clone(), ChangeKind::TokenRefreshed)
            .await;

        debug!(user_id = %session.user_id, "session refreshed");
        Ok(session)
    }

    fn changes(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }

    async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }
}
