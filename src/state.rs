//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the auth controller and the dashboard reader, both of which share
//! one backend client behind their trait objects.

use std::sync::Arc;

use crate::backend::{AuthApi, TableApi};
use crate::config::AppConfig;
use crate::services::auth::AuthController;
use crate::services::dashboard::Dashboard;

/// Clone is required by Axum; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthController,
    pub dashboard: Dashboard,
    /// Whether auth cookies carry the `Secure` attribute.
    pub cookie_secure: bool,
}

impl AppState {
    #[must_use]
    pub fn new(auth_api: Arc<dyn AuthApi>, tables: Arc<dyn TableApi>, config: &AppConfig) -> Self {
        let auth = AuthController::new(auth_api, tables.clone(), config.admins.clone(), config.oauth_callback_url());
        Self { auth, dashboard: Dashboard::new(tables), cookie_secure: config.cookie_secure }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
