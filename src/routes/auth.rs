//! Auth routes: login form, Google PKCE flow, sign-out, identity lookup.

use std::convert::Infallible;

use axum::Form;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::StatusCode;
use axum::http::header::{REFERER, USER_AGENT};
use axum::http::request::Parts;
use axum::response::{Html, IntoResponse, Json, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;

use crate::backend::AuthSession;
use crate::services::auth::{AuthError, IdentityState};
use crate::services::tracking::ClientMeta;
use crate::state::AppState;
use crate::views;

pub(crate) const ACCESS_COOKIE: &str = "sb_access_token";
pub(crate) const PKCE_COOKIE: &str = "sb_code_verifier";
const PKCE_COOKIE_TTL: Duration = Duration::minutes(10);

pub(crate) const SIGN_UP_CONFIRM_MESSAGE: &str =
    "Sign up successful! Please check your email to confirm your account.";

// =============================================================================
// EXTRACTORS
// =============================================================================

/// Access token from the session cookie, if any. Never rejects; handlers
/// decide what an anonymous request gets.
pub struct SessionToken(pub Option<String>);

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(ACCESS_COOKIE)
            .map(Cookie::value)
            .filter(|v| !v.is_empty())
            .map(str::to_owned);
        Ok(Self(token))
    }
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };
        // First hop of X-Forwarded-For is the client.
        let ip_address = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|first| first.trim().to_owned()))
            .filter(|v| !v.is_empty())
            .or_else(|| header("x-real-ip"));
        Ok(Self { ip_address, user_agent: header(USER_AGENT.as_str()), referrer: header(REFERER.as_str()) })
    }
}

// =============================================================================
// COOKIES
// =============================================================================

fn access_cookie(token: String, expires_in: Option<u64>, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::build((ACCESS_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build();
    if let Some(secs) = expires_in {
        cookie.set_max_age(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)));
    }
    cookie
}

fn expired_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::ZERO)
        .build()
}

// =============================================================================
// RESPONSES
// =============================================================================

fn login_with_status(status: StatusCode, message: &str, email: &str) -> Response {
    (status, Html(views::render_login(Some(message), email))).into_response()
}

fn auth_error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Backend(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Set the access cookie, then redirect: approved identities go to the main
/// view, pending ones to `/`, which renders the approval panel.
async fn land(state: &AppState, jar: CookieJar, session: AuthSession) -> Response {
    let jar = jar.add(access_cookie(session.access_token.clone(), session.expires_in, state.cookie_secure));
    match state
        .auth
        .approval_state(&session.access_token, session.user)
        .await
    {
        IdentityState::Approved(_) => (jar, Redirect::to("/app")).into_response(),
        IdentityState::Pending(_) => (jar, Redirect::to("/")).into_response(),
        IdentityState::Anonymous => (jar, Redirect::to("/login")).into_response(),
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    SignIn,
    SignUp,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    intent: Intent,
}

/// `POST /login`: sign in or sign up depending on which button submitted.
pub async fn login_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    meta: ClientMeta,
    Form(form): Form<LoginForm>,
) -> Response {
    match form.intent {
        Intent::SignIn => match state
            .auth
            .sign_in(&form.email, &form.password, &meta)
            .await
        {
            Ok(session) => land(&state, jar, session).await,
            Err(e) => {
                tracing::info!(error = %e, "sign-in rejected");
                login_with_status(auth_error_status(&e), &format!("Error: {e}"), &form.email)
            }
        },
        Intent::SignUp => match state
            .auth
            .sign_up(&form.email, &form.password, &form.full_name, &meta)
            .await
        {
            Ok(outcome) => match outcome.session {
                Some(session) => land(&state, jar, session).await,
                None => {
                    tracing::info!(user_id = %outcome.user.id, "sign-up awaiting email confirmation");
                    login_with_status(StatusCode::OK, SIGN_UP_CONFIRM_MESSAGE, &form.email)
                }
            },
            Err(e) => {
                tracing::info!(error = %e, "sign-up rejected");
                login_with_status(auth_error_status(&e), &format!("Error: {e}"), &form.email)
            }
        },
    }
}

/// `GET /auth/google`: stash the PKCE verifier and redirect to the provider.
pub async fn google_redirect(State(state): State<AppState>, jar: CookieJar) -> Response {
    match state.auth.sign_in_with_google() {
        Ok(start) => {
            let cookie = Cookie::build((PKCE_COOKIE, start.code_verifier))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .secure(state.cookie_secure)
                .max_age(PKCE_COOKIE_TTL);
            (jar.add(cookie), Redirect::temporary(&start.url)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "google authorize url failed");
            login_with_status(StatusCode::BAD_GATEWAY, &format!("Error with Google login: {e}"), "")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// `GET /auth/callback`: exchange the code, then land exactly like a
/// password sign-in.
pub async fn oauth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    meta: ClientMeta,
    Query(params): Query<CallbackQuery>,
) -> Response {
    let verifier = jar
        .get(PKCE_COOKIE)
        .map(|c| c.value().to_owned())
        .unwrap_or_default();
    let jar = jar.add(expired_cookie(PKCE_COOKIE, state.cookie_secure));

    if let Some(error) = params.error {
        let message = params.error_description.unwrap_or(error);
        tracing::warn!(error = %message, "google sign-in refused by provider");
        let page = login_with_status(StatusCode::BAD_REQUEST, &format!("Error with Google login: {message}"), "");
        return (jar, page).into_response();
    }
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        let page = login_with_status(StatusCode::BAD_REQUEST, "Error with Google login: missing authorization code", "");
        return (jar, page).into_response();
    };
    if verifier.is_empty() {
        let page = login_with_status(StatusCode::BAD_REQUEST, "Error with Google login: sign-in session expired", "");
        return (jar, page).into_response();
    }

    match state
        .auth
        .complete_oauth_sign_in(&code, &verifier, &meta)
        .await
    {
        Ok(session) => land(&state, jar, session).await,
        Err(e) => {
            tracing::warn!(error = %e, "google code exchange failed");
            let page = login_with_status(auth_error_status(&e), &format!("Error with Google login: {e}"), "");
            (jar, page).into_response()
        }
    }
}

/// `POST /logout`: close the tracked session, revoke, clear the cookie.
/// Always ends on the login page.
pub async fn logout(State(state): State<AppState>, SessionToken(token): SessionToken, meta: ClientMeta) -> Response {
    if let Some(token) = token.as_deref() {
        if let Err(e) = state.auth.sign_out(token, &meta).await {
            tracing::warn!(error = %e, "sign-out finished without remote revoke");
        }
    }
    let jar = CookieJar::new().add(expired_cookie(ACCESS_COOKIE, state.cookie_secure));
    (jar, Redirect::to("/login")).into_response()
}

/// `GET /api/auth/me`: current identity state as JSON.
pub async fn me(State(state): State<AppState>, SessionToken(token): SessionToken) -> Json<IdentityState> {
    Json(state.auth.resolve_state(token.as_deref()).await)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
