//! Activity tracking: `user_sessions` open/close and `site_analytics` page visits.
//!
//! ERROR HANDLING
//! ==============
//! Every write here is fire-and-forget: failures are logged and swallowed,
//! never surfaced to the user and never retried.

use std::sync::Arc;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::session::{OpenSession, OpenSessions};
use crate::backend::{NewUserSession, PageVisit, TableApi};

/// Lifetime assumed for a session whose provider reported no `expires_in`.
pub const DEFAULT_SESSION_TTL: Duration = Duration::hours(1);

/// How often the background sweep closes expired sessions.
pub const SESSION_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(300);

/// Request metadata recorded alongside sessions and visits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

#[derive(Clone)]
pub struct ActivityTracker {
    tables: Arc<dyn TableApi>,
    open: OpenSessions,
}

impl ActivityTracker {
    #[must_use]
    pub fn new(tables: Arc<dyn TableApi>) -> Self {
        Self { tables, open: OpenSessions::new() }
    }

    /// Insert a `user_sessions` row for a fresh sign-in and remember it
    /// under `token` until the token expires. A row already tracked for the
    /// same token is closed first, as is every row whose token has expired.
    /// Returns the new row id even if the insert failed, so the caller can
    /// still correlate events.
    pub async fn open_session(&self, token: &str, user_id: &str, expires_in: Option<u64>, meta: &ClientMeta) -> String {
        let now = OffsetDateTime::now_utc();
        let row = NewUserSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_owned(),
            started_at: now,
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
        };

        if let Err(e) = self.tables.insert_user_session(Some(token), &row).await {
            warn!(error = %e, user_id, "user session insert failed");
        }

        let ttl = expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map_or(DEFAULT_SESSION_TTL, Duration::seconds);
        let tracked = OpenSession { id: row.id.clone(), user_id: user_id.to_owned(), expires_at: now + ttl };
        if let Some(previous) = self.open.insert(token, tracked).await {
            self.end(token, &previous).await;
        }
        self.close_expired(now).await;

        let open = self.open.len().await;
        debug!(session_id = %row.id, user_id, open, "user session opened");
        row.id
    }

    /// Close every tracked row whose token expired at or before `now`.
    /// Returns how many were closed.
    pub async fn close_expired(&self, now: OffsetDateTime) -> usize {
        let expired = self.open.evict_expired(now).await;
        for (token, session) in &expired {
            self.end(token, session).await;
        }
        if !expired.is_empty() {
            debug!(closed = expired.len(), "expired user sessions closed");
        }
        expired.len()
    }

    /// Close the row tracked for `token`, if any. Local tracking ends even
    /// when the remote update fails.
    pub async fn close_session(&self, token: &str) -> Option<OpenSession> {
        let session = self.open.take(token).await?;
        self.end(token, &session).await;
        Some(session)
    }

    async fn end(&self, token: &str, session: &OpenSession) {
        let ended_at = OffsetDateTime::now_utc();
        match self
            .tables
            .close_user_session(Some(token), &session.id, ended_at)
            .await
        {
            Ok(()) => debug!(session_id = %session.id, "user session closed"),
            Err(e) => warn!(error = %e, session_id = %session.id, "user session close failed"),
        }
    }

    #[must_use]
    pub fn open_sessions(&self) -> &OpenSessions {
        &self.open
    }

    /// Append a `site_analytics` row. `token` is the visitor's access token
    /// when signed in; the open session (if any) is attached.
    pub async fn record_visit(&self, token: Option<&str>, user_id: Option<&str>, page_path: &str, meta: &ClientMeta) {
        let session_id = match token {
            Some(t) => self.open.get(t).await.map(|s| s.id),
            None => None,
        };
        let visit = PageVisit {
            user_id: user_id.map(str::to_owned),
            page_path: page_path.to_owned(),
            session_id,
            referrer: meta.referrer.clone(),
            ip_address: meta.ip_address.clone(),
        };
        if let Err(e) = self.tables.insert_page_visit(token, &visit).await {
            warn!(error = %e, page_path, "page visit insert failed");
        }
    }
}

/// Periodically close sessions whose tokens expired without a sign-out.
pub fn spawn_session_sweeper(tracker: ActivityTracker, every: std::time::Duration) -> JoinHandle<()> {
    info!(interval_secs = every.as_secs(), "session sweep configured");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            tracker.close_expired(OffsetDateTime::now_utc()).await;
        }
    })
}

#[cfg(test)]
#[path = "tracking_test.rs"]
mod tests;
