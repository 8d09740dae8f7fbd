//! In-memory backend for tests. Implements both backend traits over plain
//! vectors, with switches to force failures and counters to observe calls.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use time::OffsetDateTime;

use super::{AuthApi, AuthSession, BackendError, Identity, NewUserSession, PageVisit, Profile, SignUp, TableApi, UserMetadata};

pub struct Account {
    pub identity: Identity,
    pub password: String,
}

pub struct StoredSession {
    pub row: NewUserSession,
    pub ended_at: Option<OffsetDateTime>,
}

#[derive(Default)]
pub struct MemoryState {
    pub accounts: Vec<Account>,
    /// access token -> identity id
    pub tokens: HashMap<String, String>,
    pub profiles: Vec<Profile>,
    pub sessions: Vec<StoredSession>,
    pub visits: Vec<PageVisit>,
    /// Ordered log of mutating calls, e.g. `close_session:s-1`, `sign_out`.
    pub calls: Vec<String>,
    pub list_profile_calls: usize,
    pub count_calls: usize,
    pub fail_sign_out: bool,
    pub fail_approve: bool,
    pub fail_counts: bool,
    pub fail_list: bool,
    pub fail_writes: bool,
    pub confirm_sign_ups: bool,
    next_token: usize,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory backend mutex should lock")
    }

    /// Register an identity with a matching profile row; returns the id.
    pub fn add_account(&self, email: &str, password: &str, full_name: &str, approved: bool) -> String {
        let mut state = self.lock();
        let id = format!("user-{}", state.accounts.len() + 1);
        state.accounts.push(Account {
            identity: Identity {
                id: id.clone(),
                email: Some(email.to_owned()),
                user_metadata: UserMetadata { full_name: Some(full_name.to_owned()) },
            },
            password: password.to_owned(),
        });
        state.profiles.push(Profile {
            id: id.clone(),
            full_name: Some(full_name.to_owned()),
            is_approved: approved,
            last_login: None,
            email: Some(email.to_owned()),
        });
        id
    }

    /// Add a bare profile row (no identity) with the given last login.
    pub fn add_profile(&self, id: &str, approved: bool, last_login: Option<OffsetDateTime>) {
        self.lock().profiles.push(Profile {
            id: id.to_owned(),
            full_name: Some(format!("Name {id}")),
            is_approved: approved,
            last_login,
            email: None,
        });
    }

    /// Issue a token for an existing account without going through sign-in.
    pub fn issue_token(&self, email: &str) -> String {
        let mut state = self.lock();
        let id = state
            .accounts
            .iter()
            .find(|a| a.identity.email.as_deref() == Some(email))
            .map(|a| a.identity.id.clone())
            .expect("account should exist");
        state.mint_token(&id)
    }

    #[must_use]
    pub fn profile(&self, id: &str) -> Option<Profile> {
        self.lock().profiles.iter().find(|p| p.id == id).cloned()
    }
}

impl MemoryState {
    fn mint_token(&mut self, user_id: &str) -> String {
        self.next_token += 1;
        let token = format!("token-{}", self.next_token);
        self.tokens.insert(token.clone(), user_id.to_owned());
        token
    }

    fn session_for(&mut self, user_id: &str) -> Result<AuthSession, BackendError> {
        let user = self
            .accounts
            .iter()
            .find(|a| a.identity.id == user_id)
            .map(|a| a.identity.clone())
            .ok_or_else(|| unavailable("unknown identity"))?;
        let access_token = self.mint_token(user_id);
        Ok(AuthSession { access_token, refresh_token: None, expires_in: Some(3600), user })
    }

    fn write_guard(&self) -> Result<(), BackendError> {
        if self.fail_writes { Err(unavailable("writes disabled")) } else { Ok(()) }
    }
}

fn rejected(message: &str) -> BackendError {
    BackendError::Api { status: 400, message: message.to_owned() }
}

fn unavailable(message: &str) -> BackendError {
    BackendError::Request(message.to_owned())
}

#[async_trait::async_trait]
impl AuthApi for MemoryBackend {
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<SignUp, BackendError> {
        if password.len() < 6 {
            return Err(rejected("Password should be at least 6 characters."));
        }
        if self
            .lock()
            .accounts
            .iter()
            .any(|a| a.identity.email.as_deref() == Some(email))
        {
            return Err(rejected("User already registered"));
        }
        let id = self.add_account(email, password, full_name, false);
        let mut state = self.lock();
        let user = state
            .accounts
            .iter()
            .find(|a| a.identity.id == id)
            .map(|a| a.identity.clone())
            .ok_or_else(|| unavailable("account vanished"))?;
        let session = if state.confirm_sign_ups { Some(state.session_for(&id)?) } else { None };
        Ok(SignUp { user, session })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let mut state = self.lock();
        let id = state
            .accounts
            .iter()
            .find(|a| a.identity.email.as_deref() == Some(email) && a.password == password)
            .map(|a| a.identity.id.clone())
            .ok_or_else(|| rejected("Invalid login credentials"))?;
        state.session_for(&id)
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> Result<String, BackendError> {
        Ok(format!(
            "https://auth.test/authorize?provider={provider}&redirect_to={redirect_to}&code_challenge={code_challenge}"
        ))
    }

    /// Codes take the form `code-for:<email>`.
    async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> Result<AuthSession, BackendError> {
        if code_verifier.is_empty() {
            return Err(rejected("code verifier required"));
        }
        let email = auth_code
            .strip_prefix("code-for:")
            .ok_or_else(|| rejected("invalid flow state"))?;
        let mut state = self.lock();
        let id = state
            .accounts
            .iter()
            .find(|a| a.identity.email.as_deref() == Some(email))
            .map(|a| a.identity.id.clone())
            .ok_or_else(|| rejected("invalid flow state"))?;
        state.session_for(&id)
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>, BackendError> {
        let state = self.lock();
        let Some(id) = state.tokens.get(access_token) else {
            return Ok(None);
        };
        Ok(state
            .accounts
            .iter()
            .find(|a| &a.identity.id == id)
            .map(|a| a.identity.clone()))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls.push("sign_out".into());
        if state.fail_sign_out {
            return Err(unavailable("logout endpoint unreachable"));
        }
        state.tokens.remove(access_token);
        Ok(())
    }
}

#[async_trait::async_trait]
impl TableApi for MemoryBackend {
    async fn list_profiles(&self, _bearer: Option<&str>) -> Result<Vec<Profile>, BackendError> {
        let mut state = self.lock();
        state.list_profile_calls += 1;
        if state.fail_list {
            return Err(unavailable("profiles unavailable"));
        }
        Ok(state.profiles.clone())
    }

    async fn find_profile(&self, _bearer: Option<&str>, id: &str) -> Result<Option<Profile>, BackendError> {
        Ok(self.profile(id))
    }

    async fn approve_profile(&self, _bearer: Option<&str>, id: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls.push(format!("approve:{id}"));
        if state.fail_approve {
            return Err(BackendError::Api { status: 403, message: "permission denied for table profiles".into() });
        }
        let profile = state
            .profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| BackendError::Api { status: 404, message: format!("no profile matched id {id}") })?;
        profile.is_approved = true;
        Ok(())
    }

    async fn count_profiles_active_since(
        &self,
        _bearer: Option<&str>,
        since: OffsetDateTime,
    ) -> Result<u64, BackendError> {
        let mut state = self.lock();
        state.count_calls += 1;
        if state.fail_counts {
            return Err(unavailable("count unavailable"));
        }
        let count = state
            .profiles
            .iter()
            .filter(|p| p.last_login.is_some_and(|at| at >= since))
            .count();
        Ok(count as u64)
    }

    async fn insert_user_session(&self, _bearer: Option<&str>, session: &NewUserSession) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls.push(format!("open_session:{}", session.id));
        state.write_guard()?;
        state
            .sessions
            .push(StoredSession { row: session.clone(), ended_at: None });
        Ok(())
    }

    async fn close_user_session(
        &self,
        _bearer: Option<&str>,
        id: &str,
        ended_at: OffsetDateTime,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls.push(format!("close_session:{id}"));
        state.write_guard()?;
        if let Some(stored) = state.sessions.iter_mut().find(|s| s.row.id == id) {
            stored.ended_at = Some(ended_at);
        }
        Ok(())
    }

    async fn insert_page_visit(&self, _bearer: Option<&str>, visit: &PageVisit) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.write_guard()?;
        state.visits.push(visit.clone());
        Ok(())
    }
}
