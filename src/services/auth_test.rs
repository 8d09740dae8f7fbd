use super::*;
use crate::backend::memory::MemoryBackend;

const ADMIN: &str = "admin@example.com";

fn controller() -> (Arc<MemoryBackend>, AuthController) {
    let backend = Arc::new(MemoryBackend::new());
    let controller = AuthController::new(
        backend.clone(),
        backend.clone(),
        AdminAllowList::parse(ADMIN),
        "http://localhost:3000/auth/callback".into(),
    );
    (backend, controller)
}

fn meta() -> ClientMeta {
    ClientMeta { ip_address: Some("198.51.100.7".into()), user_agent: Some("ua".into()), referrer: None }
}

// =============================================================================
// normalize_email
// =============================================================================

#[test]
fn normalize_email_accepts_basic_address() {
    assert_eq!(normalize_email("  USER@Example.com "), Some("user@example.com".to_owned()));
}

#[test]
fn normalize_email_rejects_invalid_values() {
    assert_eq!(normalize_email(""), None);
    assert_eq!(normalize_email("user"), None);
    assert_eq!(normalize_email("@example.com"), None);
    assert_eq!(normalize_email("user@"), None);
    assert_eq!(normalize_email("a@b@c"), None);
}

// =============================================================================
// AuthError
// =============================================================================

#[test]
fn client_errors_become_rejections_with_provider_message() {
    let err = AuthError::from(BackendError::Api { status: 422, message: "User already registered".into() });
    assert!(matches!(&err, AuthError::Rejected(m) if m == "User already registered"));
    assert_eq!(err.to_string(), "User already registered");
}

#[test]
fn server_and_network_errors_stay_backend_errors() {
    let err = AuthError::from(BackendError::Api { status: 503, message: "down".into() });
    assert!(matches!(err, AuthError::Backend(_)));
    let err = AuthError::from(BackendError::Request("timeout".into()));
    assert!(matches!(err, AuthError::Backend(_)));
}

// =============================================================================
// sign_up
// =============================================================================

#[tokio::test]
async fn sign_up_creates_identity_with_full_name() {
    let (backend, auth) = controller();
    let outcome = auth
        .sign_up("New@Example.com", "hunter22", "  Ada Lovelace ", &meta())
        .await
        .unwrap();
    assert_eq!(outcome.user.email.as_deref(), Some("new@example.com"));
    assert_eq!(outcome.user.user_metadata.full_name.as_deref(), Some("Ada Lovelace"));
    assert!(outcome.session.is_none());
    assert!(backend.lock().sessions.is_empty(), "unconfirmed sign-up opens no session");
}

#[tokio::test]
async fn sign_up_duplicate_email_is_rejected() {
    let (backend, auth) = controller();
    backend.add_account("taken@example.com", "secret1", "Taken", false);
    let err = auth
        .sign_up("taken@example.com", "secret1", "Other", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Rejected(m) if m.contains("already registered")));
}

#[tokio::test]
async fn sign_up_short_password_fails_locally() {
    let (backend, auth) = controller();
    let err = auth
        .sign_up("x@example.com", "123", "X", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::WeakPassword));
    assert!(backend.lock().accounts.is_empty());
}

#[tokio::test]
async fn sign_up_with_immediate_session_signs_in() {
    let (backend, auth) = controller();
    backend.lock().confirm_sign_ups = true;
    let mut sub = auth.events().subscribe();

    let outcome = auth
        .sign_up("fresh@example.com", "hunter22", "Fresh", &meta())
        .await
        .unwrap();
    assert!(outcome.session.is_some());
    assert_eq!(backend.lock().sessions.len(), 1);
    assert_eq!(sub.try_next().map(|c| c.event), Some(AuthEvent::SignedIn));
}

// =============================================================================
// sign_in
// =============================================================================

#[tokio::test]
async fn sign_in_opens_session_records_visit_and_publishes() {
    let (backend, auth) = controller();
    let user_id = backend.add_account("ada@example.com", "hunter22", "Ada", true);
    let mut sub = auth.events().subscribe();

    let session = auth
        .sign_in("ada@example.com", "hunter22", &meta())
        .await
        .unwrap();
    assert_eq!(session.user.id, user_id);

    let change = sub.try_next().expect("sign-in should publish");
    assert_eq!(change.event, AuthEvent::SignedIn);
    assert_eq!(change.user_id.as_deref(), Some(user_id.as_str()));

    let state = backend.lock();
    assert_eq!(state.sessions.len(), 1);
    assert_eq!(state.sessions[0].row.user_id, user_id);
    assert_eq!(change.session_id.as_deref(), Some(state.sessions[0].row.id.as_str()));
    assert_eq!(state.visits.len(), 1);
    assert_eq!(state.visits[0].page_path, "/login");
}

#[tokio::test]
async fn sign_in_bad_password_is_rejected_without_side_effects() {
    let (backend, auth) = controller();
    backend.add_account("ada@example.com", "hunter22", "Ada", true);
    let mut sub = auth.events().subscribe();

    let err = auth
        .sign_in("ada@example.com", "wrong", &meta())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid login credentials");
    assert!(sub.try_next().is_none());
    assert!(backend.lock().sessions.is_empty());
}

#[tokio::test]
async fn sign_in_invalid_email_short_circuits() {
    let (_backend, auth) = controller();
    let err = auth
        .sign_in("not-an-email", "whatever", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidEmail));
}

#[tokio::test]
async fn sign_in_survives_tracking_failures() {
    let (backend, auth) = controller();
    backend.add_account("ada@example.com", "hunter22", "Ada", true);
    backend.lock().fail_writes = true;

    let session = auth.sign_in("ada@example.com", "hunter22", &meta()).await;
    assert!(session.is_ok());
}

// =============================================================================
// Google
// =============================================================================

#[test]
fn google_sign_in_builds_pkce_redirect() {
    let (_backend, auth) = controller();
    let start = auth.sign_in_with_google().unwrap();
    assert_eq!(start.code_verifier.len(), 64);
    assert!(start.url.contains("provider=google"));
    assert!(start.url.contains("redirect_to=http://localhost:3000/auth/callback"));
    assert!(start
        .url
        .contains(&format!("code_challenge={}", session::code_challenge(&start.code_verifier))));
}

#[tokio::test]
async fn oauth_completion_behaves_like_sign_in() {
    let (backend, auth) = controller();
    let user_id = backend.add_account("g@example.com", "unused-pw", "Gee", false);
    let mut sub = auth.events().subscribe();

    let session = auth
        .complete_oauth_sign_in("code-for:g@example.com", "verifier", &meta())
        .await
        .unwrap();
    assert_eq!(session.user.id, user_id);
    assert_eq!(sub.try_next().map(|c| c.event), Some(AuthEvent::SignedIn));
    assert_eq!(backend.lock().sessions.len(), 1);
}

#[tokio::test]
async fn oauth_completion_with_bad_code_is_rejected() {
    let (_backend, auth) = controller();
    let err = auth
        .complete_oauth_sign_in("bogus", "verifier", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Rejected(_)));
}

// =============================================================================
// sign_out
// =============================================================================

#[tokio::test]
async fn sign_out_closes_session_before_revoking() {
    let (backend, auth) = controller();
    backend.add_account("ada@example.com", "hunter22", "Ada", true);
    let session = auth
        .sign_in("ada@example.com", "hunter22", &meta())
        .await
        .unwrap();
    let mut sub = auth.events().subscribe();

    auth.sign_out(&session.access_token, &meta())
        .await
        .unwrap();

    let change = sub.try_next().expect("sign-out should publish");
    assert_eq!(change.event, AuthEvent::SignedOut);
    assert_eq!(change.user_id.as_deref(), Some(session.user.id.as_str()));

    let state = backend.lock();
    assert!(state.sessions[0].ended_at.is_some());
    let close_at = state.calls.iter().position(|c| c.starts_with("close_session:"));
    let revoke_at = state.calls.iter().position(|c| c == "sign_out");
    assert!(close_at.unwrap() < revoke_at.unwrap());
    assert!(state.tokens.get(&session.access_token).is_none());
}

#[tokio::test]
async fn sign_out_closes_session_even_when_revoke_fails() {
    let (backend, auth) = controller();
    backend.add_account("ada@example.com", "hunter22", "Ada", true);
    let session = auth
        .sign_in("ada@example.com", "hunter22", &meta())
        .await
        .unwrap();
    backend.lock().fail_sign_out = true;
    let mut sub = auth.events().subscribe();

    let result = auth.sign_out(&session.access_token, &meta()).await;
    assert!(matches!(result, Err(AuthError::Backend(_))));

    assert_eq!(sub.try_next().map(|c| c.event), Some(AuthEvent::SignedOut));
    assert!(backend.lock().sessions[0].ended_at.is_some());
    assert_eq!(auth.tracker().open_sessions().len().await, 0);
}

#[tokio::test]
async fn sign_out_without_tracked_session_still_revokes() {
    let (backend, auth) = controller();
    backend.add_account("ada@example.com", "hunter22", "Ada", true);
    let token = backend.issue_token("ada@example.com");

    auth.sign_out(&token, &meta()).await.unwrap();
    assert!(backend.lock().calls.contains(&"sign_out".to_owned()));
    assert!(auth.current_user(&token).await.is_none());
}

// =============================================================================
// identity resolution
// =============================================================================

#[tokio::test]
async fn resolve_state_without_token_is_anonymous() {
    let (_backend, auth) = controller();
    assert_eq!(auth.resolve_state(None).await, IdentityState::Anonymous);
    assert_eq!(auth.resolve_state(Some("unknown")).await, IdentityState::Anonymous);
}

#[tokio::test]
async fn resolve_state_follows_approval_flag() {
    let (backend, auth) = controller();
    backend.add_account("ok@example.com", "pw1234", "Ok", true);
    backend.add_account("wait@example.com", "pw1234", "Wait", false);

    let approved = backend.issue_token("ok@example.com");
    let pending = backend.issue_token("wait@example.com");

    assert!(matches!(auth.resolve_state(Some(approved.as_str())).await, IdentityState::Approved(u) if u.email.as_deref() == Some("ok@example.com")));
    assert!(matches!(auth.resolve_state(Some(pending.as_str())).await, IdentityState::Pending(_)));
}

#[tokio::test]
async fn missing_profile_counts_as_pending() {
    let (backend, auth) = controller();
    let id = backend.add_account("ghost@example.com", "pw1234", "Ghost", true);
    backend.lock().profiles.retain(|p| p.id != id);
    let token = backend.issue_token("ghost@example.com");
    assert!(matches!(auth.resolve_state(Some(token.as_str())).await, IdentityState::Pending(_)));
}

#[tokio::test]
async fn pending_identity_stays_pending_until_approved_externally() {
    let (backend, auth) = controller();
    let id = backend.add_account("wait@example.com", "pw1234", "Wait", false);
    let token = backend.issue_token("wait@example.com");
    assert!(matches!(auth.resolve_state(Some(token.as_str())).await, IdentityState::Pending(_)));

    backend.approve_profile(None, &id).await.unwrap();
    assert!(matches!(auth.resolve_state(Some(token.as_str())).await, IdentityState::Approved(_)));
}

// =============================================================================
// is_admin
// =============================================================================

fn identity(email: Option<&str>) -> Identity {
    Identity { id: "u".into(), email: email.map(str::to_owned), user_metadata: Default::default() }
}

#[test]
fn is_admin_requires_allow_listed_email() {
    let (_backend, auth) = controller();
    assert!(auth.is_admin(&identity(Some(ADMIN))));
    assert!(auth.is_admin(&identity(Some("Admin@Example.com"))));
    assert!(!auth.is_admin(&identity(Some("someone@example.com"))));
    assert!(!auth.is_admin(&identity(None)));
}
