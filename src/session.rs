use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated session as issued by the identity provider.
///
/// Tokens and expiry metadata are provider-owned: the crate stores and
/// forwards them but never mints or inspects them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Provider-assigned user id
    pub user_id: String,
    /// Email address the identity was registered with
    pub email: String,
    /// Bearer token for authenticated calls against the provider
    pub access_token: String,
    /// Token for obtaining a fresh session, when the provider issued one
    pub refresh_token: Option<String>,
    /// Token type as reported by the provider, normally `bearer`
    pub token_type: String,
    /// When the access token stops working, if the provider reported it
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// True once the expiry timestamp has passed.
    ///
    /// Sessions without expiry metadata never report as expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            None => false,
        }
    }

    /// True if the session expires within `window` from now.
    pub fn expires_within(&self, window: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + window >= expires_at,
            None => false,
        }
    }
}

/// What a signed-in/signed-out surface needs to render.
///
/// This is a pure projection of the current session: `signed_in` is true
/// exactly when a session is present, and `email` is populated exactly when
/// `signed_in` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUiState {
    pub signed_in: bool,
    pub email: Option<String>,
}

impl AuthUiState {
    /// The signed-out state.
    pub fn signed_out() -> Self {
        Self {
            signed_in: false,
            email: None,
        }
    }

    /// Project the UI state from the session currently held, if any.
    pub fn project(session: Option<&Session>) -> Self {
        match session {
            Some(session) => Self {
                signed_in: true,
                email: Some(session.email.clone()),
            },
            None => Self::signed_out(),
        }
    }
}

impl Default for AuthUiState {
    fn default() -> Self {
        Self::signed_out()
    }
}

/// The kinds of auth-state transition a provider reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

impl ChangeKind {
    /// Stable name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignedIn => "signed_in",
            Self::SignedOut => "signed_out",
            Self::TokenRefreshed => "token_refreshed",
        }
    }
}

/// One auth-state-change notification from the provider.
///
/// `session` carries the full replacement state: present for sign-in and
/// refresh, absent for sign-out. Consumers replace, never merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthChange {
    pub kind: ChangeKind,
    pub session: Option<Session>,
}

impl AuthChange {
    pub fn signed_in(session: Session) -> Self {
        Self {
            kind: ChangeKind::SignedIn,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: ChangeKind::SignedOut,
            session: None,
        }
    }

    pub fn token_refreshed(session: Session) -> Self {
        Self {
            kind: ChangeKind::TokenRefreshed,
            session: Some(session),
        }
    }
}
