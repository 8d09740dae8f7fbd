//! Session/auth controller: sign-up, sign-in (password and Google), sign-out,
//! identity resolution and the approval gate.
//!
//! DESIGN
//! ======
//! One `AuthController` is built at startup and shared through `AppState`.
//! It holds the backend handles, the activity tracker, the auth event stream
//! and the administrator allow-list. Identity is never cached here: each
//! request resolves its access token against the remote provider.
//!
//! State machine: `Anonymous` -> sign-in -> `Pending` (profile not approved
//! or missing) or `Approved`. Sign-out from any state returns to `Anonymous`
//! after the tracked session row is closed.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::events::{AuthEvent, AuthEvents, AuthStateChange};
use super::session;
use super::tracking::{ActivityTracker, ClientMeta};
use crate::backend::{AuthApi, AuthSession, BackendError, Identity, SignUp, TableApi};
use crate::config::AdminAllowList;

pub const GOOGLE_PROVIDER: &str = "google";
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The provider refused the request; the message is the provider's.
    #[error("{0}")]
    Rejected(String),
    #[error("invalid email")]
    InvalidEmail,
    #[error("password must be at least 6 characters")]
    WeakPassword,
    #[error("{0}")]
    Backend(BackendError),
}

impl From<BackendError> for AuthError {
    fn from(e: BackendError) -> Self {
        if e.is_client_error() { Self::Rejected(e.user_message()) } else { Self::Backend(e) }
    }
}

/// Where an identity stands with respect to the approval gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "user", rename_all = "snake_case")]
pub enum IdentityState {
    Anonymous,
    Pending(Identity),
    Approved(Identity),
}

impl IdentityState {
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Anonymous => None,
            Self::Pending(user) | Self::Approved(user) => Some(user),
        }
    }
}

/// Redirect target plus the PKCE verifier the callback must present.
#[derive(Debug, Clone)]
pub struct OAuthStart {
    pub url: String,
    pub code_verifier: String,
}

#[derive(Clone)]
pub struct AuthController {
    auth: Arc<dyn AuthApi>,
    tables: Arc<dyn TableApi>,
    tracker: ActivityTracker,
    events: AuthEvents,
    admins: AdminAllowList,
    oauth_redirect: String,
}

impl AuthController {
    #[must_use]
    pub fn new(
        auth: Arc<dyn AuthApi>,
        tables: Arc<dyn TableApi>,
        admins: AdminAllowList,
        oauth_redirect: String,
    ) -> Self {
        let tracker = ActivityTracker::new(tables.clone());
        Self { auth, tables, tracker, events: AuthEvents::new(), admins, oauth_redirect }
    }

    #[must_use]
    pub fn events(&self) -> &AuthEvents {
        &self.events
    }

    #[must_use]
    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    /// Create an identity. When the provider returns a session right away the
    /// identity is treated as signed in.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidEmail`] or [`AuthError::WeakPassword`] for
    /// input that cannot succeed, [`AuthError::Rejected`] when the provider
    /// refuses (e.g. duplicate email), and [`AuthError::Backend`] otherwise.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        meta: &ClientMeta,
    ) -> Result<SignUp, AuthError> {
        let email = normalize_email(email).ok_or(AuthError::InvalidEmail)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let signup = self
            .auth
            .sign_up(&email, password, full_name.trim())
            .await?;
        info!(user_id = %signup.user.id, "identity created");

        if let Some(session) = &signup.session {
            self.session_established(session, meta).await;
        }
        Ok(signup)
    }

    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Rejected`] for bad credentials and
    /// [`AuthError::Backend`] when the provider is unreachable.
    pub async fn sign_in(&self, email: &str, password: &str, meta: &ClientMeta) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email).ok_or(AuthError::InvalidEmail)?;
        let session = self
            .auth
            .sign_in_with_password(&email, password)
            .await?;
        self.session_established(&session, meta).await;
        Ok(session)
    }

    /// Start a Google sign-in. Completion arrives later through
    /// [`AuthController::complete_oauth_sign_in`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Backend`] if the authorize URL cannot be built.
    pub fn sign_in_with_google(&self) -> Result<OAuthStart, AuthError> {
        let code_verifier = session::generate_code_verifier();
        let challenge = session::code_challenge(&code_verifier);
        let url = self
            .auth
            .authorize_url(GOOGLE_PROVIDER, &self.oauth_redirect, &challenge)
            .map_err(AuthError::Backend)?;
        Ok(OAuthStart { url, code_verifier })
    }

    /// Finish a third-party sign-in from the provider callback.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Rejected`] if the code or verifier is refused.
    pub async fn complete_oauth_sign_in(
        &self,
        auth_code: &str,
        code_verifier: &str,
        meta: &ClientMeta,
    ) -> Result<AuthSession, AuthError> {
        let session = self
            .auth
            .exchange_code(auth_code, code_verifier)
            .await?;
        self.session_established(&session, meta).await;
        Ok(session)
    }

    async fn session_established(&self, session: &AuthSession, meta: &ClientMeta) {
        let token = session.access_token.as_str();
        let user_id = session.user.id.as_str();
        let session_id = self
            .tracker
            .open_session(token, user_id, session.expires_in, meta)
            .await;
        self.tracker
            .record_visit(Some(token), Some(user_id), "/login", meta)
            .await;
        info!(user_id, session_id = %session_id, "signed in");
        self.events.publish(AuthStateChange {
            event: AuthEvent::SignedIn,
            user_id: Some(user_id.to_owned()),
            session_id: Some(session_id),
        });
    }

    /// Close the tracked session row, then revoke the remote session. The
    /// row is closed and `SIGNED_OUT` published whether or not revocation
    /// succeeds; a revocation failure is still returned.
    ///
    /// # Errors
    ///
    /// Returns the revocation error from the provider.
    pub async fn sign_out(&self, token: &str, meta: &ClientMeta) -> Result<(), AuthError> {
        let closed = self.tracker.close_session(token).await;
        let user_id = match &closed {
            Some(open) => Some(open.user_id.clone()),
            None => self.current_user(token).await.map(|u| u.id),
        };
        self.tracker
            .record_visit(Some(token), user_id.as_deref(), "/logout", meta)
            .await;

        let revoked = self.auth.sign_out(token).await;
        if let Err(e) = &revoked {
            warn!(error = %e, "remote sign-out failed");
        }

        self.events.publish(AuthStateChange {
            event: AuthEvent::SignedOut,
            user_id,
            session_id: closed.map(|s| s.id),
        });
        revoked.map_err(AuthError::Backend)
    }

    /// Identity behind `token`, or `None` if the token is unknown, expired,
    /// or the provider cannot be reached.
    pub async fn current_user(&self, token: &str) -> Option<Identity> {
        match self.auth.get_user(token).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "identity lookup failed");
                None
            }
        }
    }

    #[must_use]
    pub fn is_admin(&self, identity: &Identity) -> bool {
        identity
            .email
            .as_deref()
            .is_some_and(|email| self.admins.contains(email))
    }

    /// Resolve an optional access token all the way to an [`IdentityState`].
    pub async fn resolve_state(&self, token: Option<&str>) -> IdentityState {
        let Some(token) = token else {
            return IdentityState::Anonymous;
        };
        match self.current_user(token).await {
            Some(user) => self.approval_state(token, user).await,
            None => IdentityState::Anonymous,
        }
    }

    /// Apply the approval gate to a known identity. A missing profile row or
    /// a failed lookup counts as pending.
    pub async fn approval_state(&self, token: &str, user: Identity) -> IdentityState {
        match self.tables.find_profile(Some(token), &user.id).await {
            Ok(Some(profile)) if profile.is_approved => IdentityState::Approved(user),
            Ok(_) => IdentityState::Pending(user),
            Err(e) => {
                warn!(error = %e, user_id = %user.id, "profile lookup failed");
                IdentityState::Pending(user)
            }
        }
    }
}

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(normalized)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
