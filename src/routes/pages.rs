//! Page routes. Each load resolves identity, records a page visit, then
//! renders according to the approval state.

use axum::extract::State;
use axum::response::{Html, IntoResponse, Redirect, Response};

use super::auth::SessionToken;
use crate::services::auth::IdentityState;
use crate::services::tracking::ClientMeta;
use crate::state::AppState;
use crate::views;

async fn resolve_and_record(state: &AppState, token: Option<&str>, path: &str, meta: &ClientMeta) -> IdentityState {
    let resolved = state.auth.resolve_state(token).await;
    let user_id = resolved.identity().map(|u| u.id.as_str());
    // A token that did not resolve is not sent along as a bearer.
    let bearer = user_id.and(token);
    state
        .auth
        .tracker()
        .record_visit(bearer, user_id, path, meta)
        .await;
    resolved
}

/// `GET /`: route by state.
pub async fn root(State(state): State<AppState>, SessionToken(token): SessionToken, meta: ClientMeta) -> Response {
    match resolve_and_record(&state, token.as_deref(), "/", &meta).await {
        IdentityState::Anonymous => Redirect::to("/login").into_response(),
        IdentityState::Pending(user) => Html(views::render_pending(&user)).into_response(),
        IdentityState::Approved(_) => Redirect::to("/app").into_response(),
    }
}

/// `GET /login`
pub async fn login(State(state): State<AppState>, SessionToken(token): SessionToken, meta: ClientMeta) -> Response {
    match resolve_and_record(&state, token.as_deref(), "/login", &meta).await {
        IdentityState::Anonymous => Html(views::render_login(None, "")).into_response(),
        IdentityState::Pending(user) => Html(views::render_pending(&user)).into_response(),
        IdentityState::Approved(_) => Redirect::to("/app").into_response(),
    }
}

/// `GET /app`: the main view, approved identities only.
pub async fn main_view(State(state): State<AppState>, SessionToken(token): SessionToken, meta: ClientMeta) -> Response {
    match resolve_and_record(&state, token.as_deref(), "/app", &meta).await {
        IdentityState::Anonymous => Redirect::to("/login").into_response(),
        IdentityState::Pending(user) => Html(views::render_pending(&user)).into_response(),
        IdentityState::Approved(user) => {
            let is_admin = state.auth.is_admin(&user);
            Html(views::render_app(&user, is_admin)).into_response()
        }
    }
}

#[cfg(test)]
#[path = "pages_test.rs"]
mod tests;
