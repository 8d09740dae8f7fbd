//! Session bookkeeping: PKCE material for third-party sign-in and the
//! registry of open `user_sessions` rows.
//!
//! ARCHITECTURE
//! ============
//! The remote auth provider owns tokens. This server only remembers which
//! tracked session row belongs to which access token, so sign-out can close
//! it. At most one open row per access token. Entries carry the token's
//! expiry and are evicted once it passes, so abandoned sessions do not
//! accumulate.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::sync::RwLock;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a PKCE code verifier: 32 random bytes as 64 hex chars.
#[must_use]
pub fn generate_code_verifier() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// S256 challenge: base64url(SHA-256(verifier)), no padding.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// A tracked `user_sessions` row that has not been closed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSession {
    pub id: String,
    pub user_id: String,
    pub expires_at: OffsetDateTime,
}

impl OpenSession {
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Open tracked sessions keyed by access token.
#[derive(Clone, Default)]
pub struct OpenSessions {
    inner: Arc<RwLock<HashMap<String, OpenSession>>>,
}

impl OpenSessions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `session` for `token`, returning whatever it replaced.
    pub async fn insert(&self, token: &str, session: OpenSession) -> Option<OpenSession> {
        self.inner.write().await.insert(token.to_owned(), session)
    }

    /// Stop tracking the session for `token` and return it.
    pub async fn take(&self, token: &str) -> Option<OpenSession> {
        self.inner.write().await.remove(token)
    }

    pub async fn get(&self, token: &str) -> Option<OpenSession> {
        self.inner.read().await.get(token).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Drop every entry whose token expired at or before `now` and return
    /// them with their tokens.
    pub async fn evict_expired(&self, now: OffsetDateTime) -> Vec<(String, OpenSession)> {
        let mut map = self.inner.write().await;
        let expired: Vec<String> = map
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(token, _)| token.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|token| map.remove(&token).map(|s| (token, s)))
            .collect()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
