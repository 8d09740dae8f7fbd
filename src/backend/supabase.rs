//! Supabase HTTP client: GoTrue auth under `/auth/v1`, PostgREST under `/rest/v1`.
//!
//! Thin wrapper: one method per remote call, pure parsing helpers below for
//! testability. Constructed once at startup and shared read-only.

use std::time::Duration;

use reqwest::header::{CONTENT_RANGE, HeaderMap};
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{AuthApi, AuthSession, BackendError, Identity, NewUserSession, PageVisit, Profile, SignUp, TableApi};
use crate::config::BackendConfig;

const PROFILES: &str = "profiles";
const USER_SESSIONS: &str = "user_sessions";
const SITE_ANALYTICS: &str = "site_analytics";
const PROFILE_COLUMNS: &str = "id,full_name,is_approved,last_login";

// =============================================================================
// CLIENT
// =============================================================================

pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

struct Reply {
    headers: HeaderMap,
    body: String,
}

impl SupabaseClient {
    /// # Errors
    ///
    /// Returns [`BackendError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.url.trim_end_matches('/').to_owned(), api_key: config.api_key.clone() })
    }

    fn auth_endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn table_endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    /// Every call carries the project key; the bearer is the caller's token
    /// when there is one.
    fn request(&self, method: Method, url: &str, bearer: Option<&str>) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer.unwrap_or(self.api_key.as_str()))
    }

    async fn send(request: RequestBuilder) -> Result<Reply, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        if !response_ok(status) {
            return Err(BackendError::Api { status, message: parse_error_message(status, &body) });
        }
        Ok(Reply { headers, body })
    }
}

fn response_ok(status: u16) -> bool {
    (200..300).contains(&status)
}

// =============================================================================
// AUTH
// =============================================================================

#[async_trait::async_trait]
impl AuthApi for SupabaseClient {
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<SignUp, BackendError> {
        let request = self
            .request(Method::POST, &self.auth_endpoint("signup"), None)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": { "full_name": full_name },
            }));
        let reply = Self::send(request).await?;
        parse_sign_up(&reply.body)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let request = self
            .request(Method::POST, &self.auth_endpoint("token"), None)
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({ "email": email, "password": password }));
        let reply = Self::send(request).await?;
        parse_json(&reply.body)
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> Result<String, BackendError> {
        Url::parse_with_params(
            &self.auth_endpoint("authorize"),
            &[
                ("provider", provider),
                ("redirect_to", redirect_to),
                ("code_challenge", code_challenge),
                ("code_challenge_method", "s256"),
            ],
        )
        .map(String::from)
        .map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> Result<AuthSession, BackendError> {
        let request = self
            .request(Method::POST, &self.auth_endpoint("token"), None)
            .query(&[("grant_type", "pkce")])
            .json(&serde_json::json!({ "auth_code": auth_code, "code_verifier": code_verifier }));
        let reply = Self::send(request).await?;
        parse_json(&reply.body)
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>, BackendError> {
        let request = self.request(Method::GET, &self.auth_endpoint("user"), Some(access_token));
        match Self::send(request).await {
            Ok(reply) => parse_json(&reply.body).map(Some),
            Err(BackendError::Api { status: 401 | 403, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let request = self.request(Method::POST, &self.auth_endpoint("logout"), Some(access_token));
        Self::send(request).await?;
        Ok(())
    }
}

// =============================================================================
// TABLES
// =============================================================================

#[async_trait::async_trait]
impl TableApi for SupabaseClient {
    async fn list_profiles(&self, bearer: Option<&str>) -> Result<Vec<Profile>, BackendError> {
        let request = self
            .request(Method::GET, &self.table_endpoint(PROFILES), bearer)
            .query(&[("select", PROFILE_COLUMNS)]);
        let reply = Self::send(request).await?;
        parse_json(&reply.body)
    }

    async fn find_profile(&self, bearer: Option<&str>, id: &str) -> Result<Option<Profile>, BackendError> {
        let id_filter = eq_filter(id);
        let request = self
            .request(Method::GET, &self.table_endpoint(PROFILES), bearer)
            .query(&[("select", PROFILE_COLUMNS), ("id", id_filter.as_str())]);
        let reply = Self::send(request).await?;
        let rows: Vec<Profile> = parse_json(&reply.body)?;
        Ok(rows.into_iter().next())
    }

    async fn approve_profile(&self, bearer: Option<&str>, id: &str) -> Result<(), BackendError> {
        let request = self
            .request(Method::PATCH, &self.table_endpoint(PROFILES), bearer)
            .query(&[("id", &eq_filter(id))])
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({ "is_approved": true }));
        let reply = Self::send(request).await?;
        let rows: Vec<serde_json::Value> = parse_json(&reply.body)?;
        if rows.is_empty() {
            return Err(BackendError::Api { status: 404, message: format!("no profile matched id {id}") });
        }
        Ok(())
    }

    async fn count_profiles_active_since(
        &self,
        bearer: Option<&str>,
        since: OffsetDateTime,
    ) -> Result<u64, BackendError> {
        let request = self
            .request(Method::HEAD, &self.table_endpoint(PROFILES), bearer)
            .query(&[("select", "*".to_owned()), ("last_login", gte_filter(since)?)])
            .header("Prefer", "count=exact");
        let reply = Self::send(request).await?;
        let header = reply
            .headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok());
        parse_content_range_count(header)
    }

    async fn insert_user_session(&self, bearer: Option<&str>, session: &NewUserSession) -> Result<(), BackendError> {
        let request = self
            .request(Method::POST, &self.table_endpoint(USER_SESSIONS), bearer)
            .header("Prefer", "return=minimal")
            .json(session);
        Self::send(request).await?;
        Ok(())
    }

    async fn close_user_session(
        &self,
        bearer: Option<&str>,
        id: &str,
        ended_at: OffsetDateTime,
    ) -> Result<(), BackendError> {
        let request = self
            .request(Method::PATCH, &self.table_endpoint(USER_SESSIONS), bearer)
            .query(&[("id", &eq_filter(id))])
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "session_end": format_timestamp(ended_at)? }));
        Self::send(request).await?;
        Ok(())
    }

    async fn insert_page_visit(&self, bearer: Option<&str>, visit: &PageVisit) -> Result<(), BackendError> {
        let request = self
            .request(Method::POST, &self.table_endpoint(SITE_ANALYTICS), bearer)
            .header("Prefer", "return=minimal")
            .json(visit);
        Self::send(request).await?;
        Ok(())
    }
}

// =============================================================================
// PARSING
// =============================================================================

pub(crate) fn eq_filter(value: &str) -> String {
    format!("eq.{value}")
}

pub(crate) fn gte_filter(since: OffsetDateTime) -> Result<String, BackendError> {
    Ok(format!("gte.{}", format_timestamp(since)?))
}

pub(crate) fn format_timestamp(ts: OffsetDateTime) -> Result<String, BackendError> {
    ts.format(&Rfc3339)
        .map_err(|e| BackendError::Parse(e.to_string()))
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, BackendError> {
    serde_json::from_str(body).map_err(|e| BackendError::Parse(e.to_string()))
}

/// Sign-up answers with a full session when the identity is confirmed
/// immediately, and with the bare identity when confirmation is pending.
pub(crate) fn parse_sign_up(body: &str) -> Result<SignUp, BackendError> {
    if let Ok(session) = serde_json::from_str::<AuthSession>(body) {
        return Ok(SignUp { user: session.user.clone(), session: Some(session) });
    }
    let user: Identity = parse_json(body)?;
    Ok(SignUp { user, session: None })
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/42`.
pub(crate) fn parse_content_range_count(header: Option<&str>) -> Result<u64, BackendError> {
    let header = header.ok_or_else(|| BackendError::Parse("missing content-range header".into()))?;
    let (_, total) = header
        .split_once('/')
        .ok_or_else(|| BackendError::Parse(format!("malformed content-range: {header}")))?;
    total
        .trim()
        .parse::<u64>()
        .map_err(|_| BackendError::Parse(format!("content-range has no exact count: {header}")))
}

/// Human-readable message from an error body. Auth and table endpoints use
/// different field names.
pub(crate) fn parse_error_message(status: u16, body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["msg", "error_description", "message", "error"] {
            if let Some(text) = map.get(key).and_then(serde_json::Value::as_str) {
                if !text.trim().is_empty() {
                    return text.to_owned();
                }
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() { format!("request failed with status {status}") } else { trimmed.to_owned() }
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
