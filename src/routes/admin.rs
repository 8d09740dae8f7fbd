//! Admin routes. Every handler passes the dashboard gate before touching a
//! table; table calls carry the admin's own bearer token.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use time::OffsetDateTime;

use super::auth::SessionToken;
use crate::services::dashboard::{DashboardError, DashboardView};
use crate::services::tracking::ClientMeta;
use crate::state::AppState;
use crate::views;

fn denied(err: &DashboardError) -> Response {
    (StatusCode::FORBIDDEN, Html(views::render_access_denied(err))).into_response()
}

/// `GET /admin`
pub async fn dashboard(State(state): State<AppState>, SessionToken(token): SessionToken, meta: ClientMeta) -> Response {
    let token = token.as_deref();
    match state
        .dashboard
        .load(&state.auth, token, OffsetDateTime::now_utc())
        .await
    {
        Ok(view) => {
            state
                .auth
                .tracker()
                .record_visit(token, Some(view.admin.id.as_str()), "/admin", &meta)
                .await;
            Html(views::render_admin(&view)).into_response()
        }
        Err(e) => denied(&e),
    }
}

/// `POST /admin/users/{id}/approve`: approve, then render the page with the
/// outcome. On success the table is the post-approval re-fetch. On failure
/// nothing changed, so the table is redrawn from a plain read and shows the
/// same rows the operator was looking at.
pub async fn approve(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
    Path(id): Path<String>,
) -> Response {
    let token = token.as_deref();
    let admin = match state.dashboard.authorize(&state.auth, token).await {
        Ok(admin) => admin,
        Err(e) => return denied(&e),
    };

    let outcome = state.dashboard.approve_user(token, &id).await;
    let users = match outcome.users {
        Some(users) => users,
        None => state.dashboard.users_or_empty(token).await,
    };
    let analytics = state
        .dashboard
        .fetch_analytics(token, OffsetDateTime::now_utc())
        .await;
    let view = DashboardView {
        admin,
        users,
        analytics,
        notice: Some(outcome.notice),
    };
    Html(views::render_admin(&view)).into_response()
}

#[cfg(test)]
#[path = "admin_test.rs"]
mod tests;
