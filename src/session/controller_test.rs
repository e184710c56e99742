use super::*;
use crate::session::api::ApiError;
use crate::session::storage::{CURRENT_USER_KEY, KeyValueStore, MemoryStore, StorageError};
use crate::session::types::Role;
use std::sync::Mutex as StdMutex;

// =========================================================================
// MockApi
// =========================================================================

#[derive(Default)]
struct MockApi {
    verify: StdMutex<Vec<Result<User, ApiError>>>,
    login: StdMutex<Vec<Result<LoginGrant, ApiError>>>,
    logout_fails: bool,
    seen_tokens: StdMutex<Vec<String>>,
    seen_credentials: StdMutex<Vec<Credentials>>,
    logout_calls: StdMutex<usize>,
}

impl MockApi {
    fn verifying(result: Result<User, ApiError>) -> Self {
        Self { verify: StdMutex::new(vec![result]), ..Self::default() }
    }

    fn logging_in(result: Result<LoginGrant, ApiError>) -> Self {
        Self { login: StdMutex::new(vec![result]), ..Self::default() }
    }
}

#[async_trait::async_trait]
impl AuthApi for MockApi {
    async fn current_user(&self, token: &str) -> Result<User, ApiError> {
        self.seen_tokens.lock().unwrap().push(token.to_owned());
        let mut verify = self.verify.lock().unwrap();
        if verify.is_empty() { Err(ApiError::Transport("no scripted reply".into())) } else { verify.remove(0) }
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, ApiError> {
        self.seen_credentials.lock().unwrap().push(credentials.clone());
        let mut login = self.login.lock().unwrap();
        if login.is_empty() { Err(ApiError::Transport("no scripted reply".into())) } else { login.remove(0) }
    }

    async fn logout(&self, token: &str) -> Result<(), ApiError> {
        self.seen_tokens.lock().unwrap().push(token.to_owned());
        *self.logout_calls.lock().unwrap() += 1;
        if self.logout_fails { Err(ApiError::Transport("connection refused".into())) } else { Ok(()) }
    }
}

/// Durable store whose writes always fail.
struct ReadOnlyStore;

impl KeyValueStore for ReadOnlyStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied)))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

fn manager() -> User {
    User { id: "1".into(), name: "A".into(), email: "a@x.com".into(), role: Role::Manager, last_login: None }
}

fn cached_tech() -> User {
    User { id: "2".into(), name: "B".into(), email: "b@x.com".into(), role: Role::Technician, last_login: None }
}

fn controller(api: MockApi, storage: &ClientStorage) -> (SessionController, Arc<MockApi>) {
    let api = Arc::new(api);
    (SessionController::new(api.clone(), storage.clone()), api)
}

// =========================================================================
// Initial state
// =========================================================================

#[test]
fn initial_state_is_unresolved_and_loading() {
    let (ctl, _) = controller(MockApi::default(), &ClientStorage::in_memory());
    let state = ctl.state();
    assert_eq!(state.phase, SessionPhase::Unresolved);
    assert!(state.is_loading);
    assert!(!state.is_authenticated());
}

// =========================================================================
// restore
// =========================================================================

#[tokio::test]
async fn restore_with_valid_token_adopts_verified_user() {
    let storage = ClientStorage::in_memory();
    storage.set_token("abc").unwrap();
    let (ctl, api) = controller(MockApi::verifying(Ok(manager())), &storage);

    let state = ctl.restore().await;

    assert!(state.is_authenticated());
    assert_eq!(state.user, Some(manager()));
    assert_eq!(state.phase, SessionPhase::Authenticated);
    assert!(!state.is_loading);
    assert_eq!(storage.cached_user(), Some(manager()));
    assert_eq!(api.seen_tokens.lock().unwrap().as_slice(), ["abc"]);
}

#[tokio::test]
async fn restore_verified_user_overrides_stale_snapshot() {
    let storage = ClientStorage::in_memory();
    storage.set_token("abc").unwrap();
    storage.cache_user(&cached_tech()).unwrap();
    let (ctl, _) = controller(MockApi::verifying(Ok(manager())), &storage);

    let state = ctl.restore().await;

    assert_eq!(state.user, Some(manager()));
    assert_eq!(storage.cached_user(), Some(manager()));
}

#[tokio::test]
async fn restore_without_token_uses_snapshot() {
    let storage = ClientStorage::in_memory();
    storage.cache_user(&cached_tech()).unwrap();
    let (ctl, api) = controller(MockApi::default(), &storage);

    let state = ctl.restore().await;

    assert!(state.is_authenticated());
    assert_eq!(state.user, Some(cached_tech()));
    assert!(api.seen_tokens.lock().unwrap().is_empty());
}

#[tokio::test]
async fn restore_without_token_or_snapshot_is_unauthenticated() {
    let (ctl, _) = controller(MockApi::default(), &ClientStorage::in_memory());
    let state = ctl.restore().await;
    assert!(!state.is_authenticated());
    assert_eq!(state.phase, SessionPhase::Unauthenticated);
    assert!(!state.is_loading);
}

#[tokio::test]
async fn restore_failed_verification_falls_back_to_snapshot_and_clears_token() {
    let storage = ClientStorage::in_memory();
    storage.set_token("expired").unwrap();
    storage.cache_user(&cached_tech()).unwrap();
    let rejected = ApiError::Rejected { status: "fail".into(), message: Some("jwt expired".into()) };
    let (ctl, _) = controller(MockApi::verifying(Err(rejected)), &storage);

    let state = ctl.restore().await;

    assert_eq!(state.user, Some(cached_tech()));
    assert_eq!(state.phase, SessionPhase::Authenticated);
    assert_eq!(storage.token(), None);
}

#[tokio::test]
async fn restore_failed_verification_without_snapshot_is_unauthenticated() {
    let storage = ClientStorage::in_memory();
    storage.set_token("abc").unwrap();
    let (ctl, _) = controller(MockApi::verifying(Err(ApiError::Transport("refused".into()))), &storage);

    let state = ctl.restore().await;

    assert!(!state.is_authenticated());
    assert_eq!(state.phase, SessionPhase::Unauthenticated);
    assert_eq!(storage.token(), None);
}

#[tokio::test]
async fn restore_malformed_reply_degrades_like_any_failure() {
    let storage = ClientStorage::in_memory();
    storage.set_token("abc").unwrap();
    let (ctl, _) = controller(MockApi::verifying(Err(ApiError::Malformed("bad data".into()))), &storage);
    assert!(!ctl.restore().await.is_authenticated());
}

#[tokio::test]
async fn restore_corrupted_snapshot_is_unauthenticated() {
    let session = Arc::new(MemoryStore::new());
    session.set(CURRENT_USER_KEY, "{{{").unwrap();
    let storage = ClientStorage::new(Arc::new(MemoryStore::new()), session);
    let (ctl, _) = controller(MockApi::default(), &storage);

    assert!(!ctl.restore().await.is_authenticated());
}

#[tokio::test]
async fn restore_can_keep_token_when_policy_disabled() {
    let storage = ClientStorage::in_memory();
    storage.set_token("abc").unwrap();
    let api = Arc::new(MockApi::verifying(Err(ApiError::Transport("offline".into()))));
    let options = SessionOptions { clear_token_on_verify_failure: false };
    let ctl = SessionController::with_options(api, storage.clone(), options);

    ctl.restore().await;

    assert_eq!(storage.token().as_deref(), Some("abc"));
}

#[tokio::test]
async fn restore_runs_only_once() {
    let storage = ClientStorage::in_memory();
    storage.set_token("abc").unwrap();
    let api = MockApi {
        verify: StdMutex::new(vec![Ok(manager()), Ok(cached_tech())]),
        ..MockApi::default()
    };
    let (ctl, api) = controller(api, &storage);

    ctl.restore().await;
    let second = ctl.restore().await;

    assert_eq!(second.user, Some(manager()));
    assert_eq!(api.seen_tokens.lock().unwrap().len(), 1);
}

// =========================================================================
// login
// =========================================================================

#[tokio::test]
async fn login_success_persists_token_user_and_snapshot() {
    let storage = ClientStorage::in_memory();
    let grant = LoginGrant { token: "jwt".into(), user: manager() };
    let (ctl, api) = controller(MockApi::logging_in(Ok(grant)), &storage);

    assert!(ctl.login("  A@X.com ", "pw", Role::Manager).await);

    assert_eq!(storage.token().as_deref(), Some("jwt"));
    assert_eq!(storage.cached_user(), Some(manager()));
    assert_eq!(ctl.user(), Some(manager()));
    assert!(ctl.is_authenticated());
    assert!(!ctl.is_loading());
    assert_eq!(api.seen_credentials.lock().unwrap()[0].email(), "a@x.com");
}

#[tokio::test]
async fn login_rejected_returns_false_without_storage_writes() {
    let storage = ClientStorage::in_memory();
    let rejected = ApiError::Rejected { status: "fail".into(), message: None };
    let (ctl, _) = controller(MockApi::logging_in(Err(rejected)), &storage);

    assert!(!ctl.login("a@x.com", "wrong", Role::Manager).await);

    assert_eq!(storage.token(), None);
    assert_eq!(storage.cached_user(), None);
    assert!(!ctl.is_authenticated());
    assert!(!ctl.is_loading());
}

#[tokio::test]
async fn login_missing_token_never_touches_storage() {
    let storage = ClientStorage::in_memory();
    let (ctl, _) = controller(MockApi::logging_in(Err(ApiError::MissingField("token"))), &storage);

    assert!(!ctl.login("a@x.com", "pw", Role::Manager).await);
    assert_eq!(storage.token(), None);
    assert_eq!(storage.cached_user(), None);
}

#[tokio::test]
async fn login_transport_error_keeps_existing_session() {
    let storage = ClientStorage::in_memory();
    storage.cache_user(&cached_tech()).unwrap();
    let (ctl, _) = controller(MockApi::logging_in(Err(ApiError::Transport("timeout".into()))), &storage);
    ctl.restore().await;

    assert!(!ctl.login("a@x.com", "pw", Role::Manager).await);
    assert_eq!(ctl.user(), Some(cached_tech()));
}

#[tokio::test]
async fn login_token_write_failure_leaves_user_unset() {
    let storage = ClientStorage::new(Arc::new(ReadOnlyStore), Arc::new(MemoryStore::new()));
    let grant = LoginGrant { token: "jwt".into(), user: manager() };
    let (ctl, _) = controller(MockApi::logging_in(Ok(grant)), &storage);

    assert!(!ctl.login("a@x.com", "pw", Role::Manager).await);
    assert!(!ctl.is_authenticated());
    assert_eq!(storage.cached_user(), None);
}

#[tokio::test]
async fn login_after_restore_moves_to_authenticated() {
    let storage = ClientStorage::in_memory();
    let grant = LoginGrant { token: "jwt".into(), user: manager() };
    let (ctl, _) = controller(MockApi::logging_in(Ok(grant)), &storage);

    assert_eq!(ctl.restore().await.phase, SessionPhase::Unauthenticated);
    assert!(ctl.login("a@x.com", "pw", Role::Manager).await);
    assert_eq!(ctl.state().phase, SessionPhase::Authenticated);
}

// =========================================================================
// logout
// =========================================================================

#[tokio::test]
async fn logout_clears_everything_and_notifies_backend() {
    let storage = ClientStorage::in_memory();
    let grant = LoginGrant { token: "jwt".into(), user: manager() };
    let (ctl, api) = controller(MockApi::logging_in(Ok(grant)), &storage);
    ctl.login("a@x.com", "pw", Role::Manager).await;

    ctl.logout().await;

    assert!(!ctl.is_authenticated());
    assert_eq!(ctl.state().phase, SessionPhase::Unauthenticated);
    assert_eq!(storage.token(), None);
    assert_eq!(storage.cached_user(), None);
    assert_eq!(*api.logout_calls.lock().unwrap(), 1);
    assert_eq!(api.seen_tokens.lock().unwrap().as_slice(), ["jwt"]);
}

#[tokio::test]
async fn logout_clears_locally_when_backend_unreachable() {
    let storage = ClientStorage::in_memory();
    storage.set_token("abc").unwrap();
    let api = MockApi { verify: StdMutex::new(vec![Ok(manager())]), logout_fails: true, ..MockApi::default() };
    let (ctl, _) = controller(api, &storage);
    ctl.restore().await;

    ctl.logout().await;

    assert!(!ctl.is_authenticated());
    assert_eq!(storage.token(), None);
    assert_eq!(storage.cached_user(), None);
}

#[tokio::test]
async fn logout_without_token_skips_backend() {
    let storage = ClientStorage::in_memory();
    storage.cache_user(&cached_tech()).unwrap();
    let (ctl, api) = controller(MockApi::default(), &storage);
    ctl.restore().await;

    ctl.logout().await;

    assert_eq!(*api.logout_calls.lock().unwrap(), 0);
    assert_eq!(storage.cached_user(), None);
    assert!(!ctl.is_authenticated());
}

// =========================================================================
// update_user
// =========================================================================

#[tokio::test]
async fn update_user_unauthenticated_is_noop() {
    let storage = ClientStorage::in_memory();
    let (ctl, _) = controller(MockApi::default(), &storage);
    ctl.restore().await;

    let patch = UserPatch { name: Some("X".into()), ..UserPatch::default() };
    assert_eq!(ctl.update_user(&patch), None);
    assert!(!ctl.is_authenticated());
    assert_eq!(storage.cached_user(), None);
}

#[tokio::test]
async fn update_user_merges_and_snapshot_matches() {
    let storage = ClientStorage::in_memory();
    storage.set_token("abc").unwrap();
    let (ctl, _) = controller(MockApi::verifying(Ok(manager())), &storage);
    ctl.restore().await;

    let patch = UserPatch { name: Some("Alice".into()), last_login: Some("2024-06-01".into()), ..UserPatch::default() };
    let merged = ctl.update_user(&patch).unwrap();

    assert_eq!(merged.name, "Alice");
    assert_eq!(merged.email, "a@x.com");
    assert_eq!(ctl.user(), Some(merged.clone()));
    assert_eq!(storage.cached_user(), Some(merged));
    assert_eq!(storage.token().as_deref(), Some("abc"));
}

// =========================================================================
// subscribe
// =========================================================================

#[tokio::test]
async fn subscribers_observe_login() {
    let storage = ClientStorage::in_memory();
    let grant = LoginGrant { token: "jwt".into(), user: manager() };
    let (ctl, _) = controller(MockApi::logging_in(Ok(grant)), &storage);
    let mut rx = ctl.subscribe();

    ctl.login("a@x.com", "pw", Role::Manager).await;

    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().user, Some(manager()));
}

#[tokio::test]
async fn concurrent_logins_are_serialized() {
    let storage = ClientStorage::in_memory();
    let api = MockApi {
        login: StdMutex::new(vec![
            Ok(LoginGrant { token: "first".into(), user: manager() }),
            Ok(LoginGrant { token: "second".into(), user: cached_tech() }),
        ]),
        ..MockApi::default()
    };
    let (ctl, _) = controller(api, &storage);

    let (a, b) = tokio::join!(
        ctl.login("a@x.com", "pw", Role::Manager),
        ctl.login("b@x.com", "pw", Role::Technician)
    );

    assert!(a && b);
    // Whichever finished last owns both the token and the user.
    let user = ctl.user().unwrap();
    let expected_token = if user.id == "1" { "first" } else { "second" };
    assert_eq!(storage.token().as_deref(), Some(expected_token));
    assert_eq!(storage.cached_user(), Some(user));
}

#[tokio::test]
async fn update_user_then_logout_leaves_no_snapshot() {
    let storage = ClientStorage::in_memory();
    storage.set_token("abc").unwrap();
    let (ctl, _) = controller(MockApi::verifying(Ok(manager())), &storage);
    ctl.restore().await;

    ctl.update_user(&UserPatch { name: Some("Alice".into()), ..UserPatch::default() });
    ctl.logout().await;

    assert_eq!(storage.cached_user(), None);
    assert_eq!(ctl.update_user(&UserPatch { name: Some("Bob".into()), ..UserPatch::default() }), None);
    assert_eq!(storage.cached_user(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn update_user_racing_logout_never_resurrects_snapshot() {
    for round in 0..200 {
        let storage = ClientStorage::in_memory();
        storage.set_token("abc").unwrap();
        let (ctl, _) = controller(MockApi::verifying(Ok(manager())), &storage);
        ctl.restore().await;
        let ctl = Arc::new(ctl);

        let updater = {
            let ctl = ctl.clone();
            tokio::spawn(async move {
                for i in 0..20 {
                    ctl.update_user(&UserPatch { name: Some(format!("n{i}")), ..UserPatch::default() });
                    tokio::task::yield_now().await;
                }
            })
        };
        ctl.logout().await;
        updater.await.unwrap();

        assert!(!ctl.is_authenticated(), "round {round}");
        assert_eq!(storage.cached_user(), None, "round {round}");
    }
}
