//! Admin dashboard reader: user list, approval, DAU/MAU counts.
//!
//! ERROR HANDLING
//! ==============
//! Only the admin gate and the approve mutation report errors to the
//! operator. List and count failures are logged; the page renders an empty
//! table or a placeholder instead of the count.

use std::sync::Arc;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use super::auth::AuthController;
use crate::backend::{BackendError, Identity, Profile, TableApi};

pub const DAILY_WINDOW: Duration = Duration::hours(24);
pub const MONTHLY_WINDOW: Duration = Duration::days(30);

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("Access Denied. You are not an administrator.")]
    AccessDenied,
}

/// Activity counts. `None` when the count query failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Analytics {
    pub dau: Option<u64>,
    pub mau: Option<u64>,
}

/// Everything the admin page shows.
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub admin: Identity,
    pub users: Vec<Profile>,
    pub analytics: Analytics,
    pub notice: Option<Notice>,
}

/// Operator-facing result of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Failure(String),
}

impl Notice {
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Success(m) | Self::Failure(m) => m,
        }
    }
}

/// Outcome of [`Dashboard::approve_user`]. `users` is the re-fetched list
/// after a successful write and `None` after a failed one.
#[derive(Debug, Clone)]
pub struct ApproveOutcome {
    pub notice: Notice,
    pub users: Option<Vec<Profile>>,
}

/// Lower bounds of the daily and monthly activity windows.
#[must_use]
pub fn activity_windows(now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
    (now - DAILY_WINDOW, now - MONTHLY_WINDOW)
}

#[derive(Clone)]
pub struct Dashboard {
    tables: Arc<dyn TableApi>,
}

impl Dashboard {
    #[must_use]
    pub fn new(tables: Arc<dyn TableApi>) -> Self {
        Self { tables }
    }

    /// Resolve `token` to an administrator identity.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::AccessDenied`] when there is no identity or
    /// it is not on the allow-list.
    pub async fn authorize(&self, auth: &AuthController, token: Option<&str>) -> Result<Identity, DashboardError> {
        let Some(token) = token else {
            return Err(DashboardError::AccessDenied);
        };
        match auth.current_user(token).await {
            Some(user) if auth.is_admin(&user) => Ok(user),
            Some(user) => {
                warn!(user_id = %user.id, "non-admin dashboard access denied");
                Err(DashboardError::AccessDenied)
            }
            None => Err(DashboardError::AccessDenied),
        }
    }

    /// Gate, then load users and analytics. Nothing is read from the tables
    /// when the gate fails.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::AccessDenied`] from the gate.
    pub async fn load(
        &self,
        auth: &AuthController,
        token: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<DashboardView, DashboardError> {
        let admin = self.authorize(auth, token).await?;
        let users = self.users_or_empty(token).await;
        let analytics = self.fetch_analytics(token, now).await;
        Ok(DashboardView { admin, users, analytics, notice: None })
    }

    /// All profile rows, unpaginated.
    ///
    /// # Errors
    ///
    /// Returns the backend error from the list query.
    pub async fn fetch_users(&self, bearer: Option<&str>) -> Result<Vec<Profile>, BackendError> {
        self.tables.list_profiles(bearer).await
    }

    /// [`Dashboard::fetch_users`], logging a failure and yielding no rows.
    pub async fn users_or_empty(&self, bearer: Option<&str>) -> Vec<Profile> {
        match self.fetch_users(bearer).await {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "error fetching users");
                Vec::new()
            }
        }
    }

    /// Approve one profile, then re-fetch the list exactly once. A failed
    /// write leaves the list untouched and skips the re-fetch.
    pub async fn approve_user(&self, bearer: Option<&str>, id: &str) -> ApproveOutcome {
        match self.tables.approve_profile(bearer, id).await {
            Ok(()) => {
                info!(user_id = id, "user approved");
                let users = self.users_or_empty(bearer).await;
                ApproveOutcome { notice: Notice::Success("User approved!".into()), users: Some(users) }
            }
            Err(e) => {
                warn!(error = %e, user_id = id, "user approval failed");
                ApproveOutcome {
                    notice: Notice::Failure(format!("Error approving user: {}", e.user_message())),
                    users: None,
                }
            }
        }
    }

    /// DAU and MAU relative to `now`, counted remotely without fetching rows.
    pub async fn fetch_analytics(&self, bearer: Option<&str>, now: OffsetDateTime) -> Analytics {
        let (daily_since, monthly_since) = activity_windows(now);
        let dau = self.count_since(bearer, daily_since, "dau").await;
        let mau = self.count_since(bearer, monthly_since, "mau").await;
        Analytics { dau, mau }
    }

    async fn count_since(&self, bearer: Option<&str>, since: OffsetDateTime, label: &'static str) -> Option<u64> {
        match self
            .tables
            .count_profiles_active_since(bearer, since)
            .await
        {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(error = %e, metric = label, "activity count failed");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "dashboard_test.rs"]
mod tests;
