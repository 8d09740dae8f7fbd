//! Hosted backend: managed auth plus the Postgres-backed table API.
//!
//! DESIGN
//! ======
//! Everything this server knows about users lives in the remote store. The
//! two traits below are the only seams: `AuthApi` for identity operations and
//! `TableApi` for the `profiles`, `user_sessions` and `site_analytics` tables.
//! `SupabaseClient` implements both over HTTP; tests substitute an in-memory
//! backend.

#[cfg(test)]
pub mod memory;
pub mod supabase;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub use supabase::SupabaseClient;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by backend calls.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("backend request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// A response body did not have the expected shape.
    #[error("backend response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl BackendError {
    /// Message suitable for showing to the person who triggered the call.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// True when the backend rejected the request itself (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Api { status: 400..=499, .. })
    }
}

// =============================================================================
// AUTH TYPES
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// A remote auth identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl Identity {
    /// Display name, falling back to the email local part.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = self.user_metadata.full_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_owned();
        }
        self.email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|local| !local.is_empty())
            .unwrap_or("user")
            .to_owned()
    }
}

/// Tokens issued for a signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: Identity,
}

/// Result of creating an identity. `session` is present only when the
/// provider signs the new identity in immediately (no email confirmation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUp {
    pub user: Identity,
    pub session: Option<AuthSession>,
}

// =============================================================================
// TABLE ROWS
// =============================================================================

/// Row of the `profiles` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Insert payload for the `user_sessions` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUserSession {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "session_start", with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Insert payload for the append-only `site_analytics` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageVisit {
    pub user_id: Option<String>,
    #[serde(rename = "page_visited")]
    pub page_path: String,
    pub session_id: Option<String>,
    pub referrer: Option<String>,
    pub ip_address: Option<String>,
}

// =============================================================================
// TRAITS
// =============================================================================

/// Remote identity operations.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// Create an identity carrying `full_name` as profile metadata.
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<SignUp, BackendError>;

    /// Exchange email + password for a session.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;

    /// Build the redirect URL that starts a third-party sign-in.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Parse`] if the URL cannot be assembled.
    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> Result<String, BackendError>;

    /// Exchange a third-party authorization code plus PKCE verifier for a session.
    async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> Result<AuthSession, BackendError>;

    /// Resolve an access token to its identity. `None` when the token is
    /// unknown or expired.
    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>, BackendError>;

    /// Revoke the session behind an access token.
    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;
}

/// Remote table operations. `bearer` is the caller's access token; `None`
/// means the call is made anonymously with the project key.
#[async_trait::async_trait]
pub trait TableApi: Send + Sync {
    async fn list_profiles(&self, bearer: Option<&str>) -> Result<Vec<Profile>, BackendError>;

    async fn find_profile(&self, bearer: Option<&str>, id: &str) -> Result<Option<Profile>, BackendError>;

    /// Set `is_approved = true` on exactly one profile.
    async fn approve_profile(&self, bearer: Option<&str>, id: &str) -> Result<(), BackendError>;

    /// Count profiles whose `last_login` is at or after `since`, without
    /// fetching rows.
    async fn count_profiles_active_since(
        &self,
        bearer: Option<&str>,
        since: OffsetDateTime,
    ) -> Result<u64, BackendError>;

    async fn insert_user_session(&self, bearer: Option<&str>, session: &NewUserSession) -> Result<(), BackendError>;

    async fn close_user_session(
        &self,
        bearer: Option<&str>,
        id: &str,
        ended_at: OffsetDateTime,
    ) -> Result<(), BackendError>;

    async fn insert_page_visit(&self, bearer: Option<&str>, visit: &PageVisit) -> Result<(), BackendError>;
}
