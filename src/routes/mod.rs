//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Server-rendered pages and form posts under a single Axum router. Every
//! handler resolves identity from the access-token cookie on each request;
//! nothing about the signed-in user is cached between requests.

pub mod admin;
pub mod auth;
pub mod pages;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::root))
        .route("/login", get(pages::login).post(auth::login_submit))
        .route("/auth/google", get(auth::google_redirect))
        .route("/auth/callback", get(auth::oauth_callback))
        .route("/logout", post(auth::logout))
        .route("/app", get(pages::main_view))
        .route("/api/auth/me", get(auth::me))
        .route("/admin", get(admin::dashboard))
        .route("/admin/users/{id}/approve", post(admin::approve))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
