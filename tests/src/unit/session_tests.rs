use crate::{auth_json, failure, ok, seeded_store, user_json, MockBackend, API};
use bloghub_core::routes::resolve_callback;
use bloghub_core::{ApiError, CredentialStore, ListParams, Navigation, Route};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn callback_with_good_code_signs_in_and_persists() {
    let backend = MockBackend::start().await;
    backend.mount_happy_path("good-code", "u1").await;
    let (context, _nav) = backend.context(CredentialStore::in_memory());

    let user = context
        .session()
        .complete_callback("good-code")
        .await
        .expect("signed in");

    assert_eq!(user.id, "u1");
    let state = context.session().state();
    assert!(state.is_authenticated());
    assert!(state.is_initialized);
    assert!(!state.is_loading);
    assert_eq!(context.store().access_token().as_deref(), Some("access-1"));
    assert_eq!(context.store().refresh_token().as_deref(), Some("refresh-1"));
    assert_eq!(context.store().get_user().map(|u| u.id), Some("u1".into()));
}

#[tokio::test]
async fn callback_with_bad_code_records_error() {
    let backend = MockBackend::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/auth/exchange")))
        .and(body_json(json!({ "auth_code": "bad-code" })))
        .respond_with(failure(400, "INVALID_CODE", "invalid code"))
        .mount(backend.server())
        .await;
    let (context, _nav) = backend.context(CredentialStore::in_memory());

    let err = context
        .session()
        .complete_callback("bad-code")
        .await
        .unwrap_err();

    assert_eq!(err.message(), "invalid code");
    let state = context.session().state();
    assert_eq!(state.error.as_deref(), Some("invalid code"));
    assert!(!state.is_authenticated());
    assert!(!state.is_loading);
    assert!(context.store().get().is_none());
}

#[tokio::test]
async fn logout_clears_local_state_even_when_backend_fails() {
    let backend = MockBackend::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/auth/logout")))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(backend.server())
        .await;
    let (context, _nav) = backend.context(seeded_store(
        "access-1",
        Some("refresh-1"),
        Some(user_json("u1", "Ada")),
    ));
    context
        .session()
        .update_user(context.store().get_user().expect("seeded user"))
        .expect("update user");

    context.session().logout().await;

    let state = context.session().state();
    assert!(!state.is_authenticated());
    assert!(state.is_initialized);
    assert!(!state.is_loading);
    assert!(context.store().get().is_none());
    assert!(context.store().get_user().is_none());
}

#[tokio::test]
async fn check_auth_runs_only_once() {
    let backend = MockBackend::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/auth/validate")))
        .respond_with(ok(json!({ "valid": true, "user_id": "u1" })))
        .expect(1)
        .mount(backend.server())
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/users/u1")))
        .respond_with(ok(user_json("u1", "Ada")))
        .mount(backend.server())
        .await;
    let (context, _nav) = backend.context(seeded_store(
        "access-1",
        Some("refresh-1"),
        Some(user_json("u1", "Ada")),
    ));

    tokio::join!(context.session().check_auth(), context.session().check_auth());
    context.session().check_auth().await;

    let state = context.session().state();
    assert!(state.is_authenticated());
    assert!(state.is_initialized);
}

#[tokio::test]
async fn check_auth_publishes_cached_user_before_validation() {
    let backend = MockBackend::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/auth/validate")))
        .respond_with(
            ok(json!({ "valid": true, "user_id": "u1" })).set_delay(Duration::from_millis(300)),
        )
        .mount(backend.server())
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/users/u1")))
        .respond_with(ok(user_json("u1", "Ada Lovelace")))
        .mount(backend.server())
        .await;
    let (context, _nav) = backend.context(seeded_store(
        "access-1",
        Some("refresh-1"),
        Some(user_json("u1", "Ada (cached)")),
    ));

    let mut changes = context.session().subscribe();
    let session = context.session().clone();
    let check = tokio::spawn(async move { session.check_auth().await });

    changes.changed().await.expect("state change");
    {
        let early = changes.borrow_and_update();
        assert_eq!(early.user.as_ref().map(|u| u.name.as_str()), Some("Ada (cached)"));
        assert!(!early.is_initialized);
    }

    check.await.expect("check_auth task");
    let settled = context.session().state();
    assert_eq!(settled.user.map(|u| u.name), Some("Ada Lovelace".into()));
    assert!(settled.is_initialized);
    assert_eq!(
        context.store().get_user().map(|u| u.name),
        Some("Ada Lovelace".into())
    );
}

#[tokio::test]
async fn invalid_token_on_startup_refreshes_session() {
    let backend = MockBackend::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/auth/validate")))
        .respond_with(ok(json!({ "valid": false })))
        .mount(backend.server())
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/auth/refresh")))
        .and(body_json(json!({ "refresh_token": "refresh-1" })))
        .respond_with(ok(auth_json("access-2", "refresh-2", user_json("u1", "Ada"))))
        .expect(1)
        .mount(backend.server())
        .await;
    let (context, _nav) = backend.context(seeded_store(
        "access-1",
        Some("refresh-1"),
        Some(user_json("u1", "Ada")),
    ));

    context.session().check_auth().await;

    let state = context.session().state();
    assert!(state.is_authenticated());
    assert!(state.is_initialized);
    assert_eq!(context.store().access_token().as_deref(), Some("access-2"));
    assert_eq!(context.store().refresh_token().as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn failed_refresh_on_startup_signs_out() {
    let backend = MockBackend::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/auth/validate")))
        .respond_with(failure(401, "TOKEN_EXPIRED", "token expired"))
        .mount(backend.server())
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/auth/refresh")))
        .respond_with(failure(401, "INVALID_REFRESH", "refresh token revoked"))
        .expect(1)
        .mount(backend.server())
        .await;
    let (context, mut nav) = backend.context(seeded_store(
        "access-1",
        Some("refresh-1"),
        Some(user_json("u1", "Ada")),
    ));

    context.session().check_auth().await;

    let state = context.session().state();
    assert!(!state.is_authenticated());
    assert!(state.is_initialized);
    assert!(context.store().get().is_none());
    assert_eq!(nav.try_recv().ok(), Some(Navigation::to(Route::login())));
}

#[tokio::test]
async fn login_navigates_to_identity_provider() {
    let backend = MockBackend::start().await;
    backend.mount_happy_path("unused", "u1").await;
    let (context, mut nav) = backend.context(CredentialStore::in_memory());

    context.session().login().await.expect("login");

    match nav.try_recv() {
        Ok(Navigation::External { url }) => {
            assert_eq!(url.host_str(), Some("accounts.google.com"));
        }
        other => panic!("expected external navigation, got {other:?}"),
    }
    let state = context.session().state();
    assert!(!state.is_loading);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn login_failure_is_recorded() {
    let backend = MockBackend::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/auth/google")))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(backend.server())
        .await;
    let (context, mut nav) = backend.context(CredentialStore::in_memory());

    let err = context.session().login().await.unwrap_err();

    assert_eq!(err.message(), "Failed to get Google auth URL");
    let state = context.session().state();
    assert_eq!(state.error.as_deref(), Some("Failed to get Google auth URL"));
    assert!(!state.is_loading);
    assert!(nav.try_recv().is_err());

    context.session().clear_error();
    assert!(context.session().state().error.is_none());
}

#[tokio::test]
async fn callback_page_resolution() {
    let backend = MockBackend::start().await;
    backend.mount_happy_path("good-code", "u1").await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/auth/exchange")))
        .and(body_json(json!({ "auth_code": "bad-code" })))
        .respond_with(failure(400, "INVALID_CODE", "invalid code"))
        .mount(backend.server())
        .await;
    let (context, _nav) = backend.context(CredentialStore::in_memory());
    let session = context.session();

    assert_eq!(
        resolve_callback(session, Some("good-code"), Some("access_denied")).await,
        Navigation::to(Route::login_error("access_denied"))
    );
    assert_eq!(
        resolve_callback(session, None, None).await,
        Navigation::to(Route::login_error("no_auth_code"))
    );
    assert_eq!(
        resolve_callback(session, Some("bad-code"), None).await,
        Navigation::to(Route::login_error("callback_failed"))
    );
    assert_eq!(
        resolve_callback(session, Some("good-code"), None).await,
        Navigation::to(Route::Dashboard)
    );
    assert!(session.state().is_authenticated());
}

#[tokio::test]
async fn session_survives_a_restart_with_file_storage() {
    let backend = MockBackend::start().await;
    backend.mount_happy_path("good-code", "u1").await;
    let dir = tempfile::tempdir().expect("tempdir");
    let mut settings = backend.settings();
    settings.storage_path = dir.path().join("session.json");

    {
        let (first, _nav) = bloghub_core::SessionContext::open(&settings).expect("first run");
        first
            .session()
            .complete_callback("good-code")
            .await
            .expect("signed in");
    }

    let (second, _nav) = bloghub_core::SessionContext::open(&settings).expect("second run");
    assert!(!second.session().state().is_authenticated());
    second.session().check_auth().await;

    let state = second.session().state();
    assert!(state.is_authenticated());
    assert_eq!(state.user.map(|u| u.name), Some("Smoke Tester".into()));
}

async fn mount_sign_in(backend: &MockBackend, code: &str) {
    Mock::given(method("POST"))
        .and(path(format!("{API}/auth/exchange")))
        .and(body_json(json!({ "auth_code": code })))
        .respond_with(ok(auth_json("access-1", "refresh-1", user_json("u1", "Ada"))))
        .mount(backend.server())
        .await;
}

async fn mount_revoked_refresh(backend: &MockBackend) {
    Mock::given(method("POST"))
        .and(path(format!("{API}/auth/refresh")))
        .respond_with(failure(401, "INVALID_REFRESH", "refresh token revoked"))
        .expect(1)
        .mount(backend.server())
        .await;
}

#[tokio::test]
async fn failed_refresh_during_a_request_signs_the_session_out() {
    let backend = MockBackend::start().await;
    mount_sign_in(&backend, "good-code").await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/public/posts")))
        .respond_with(failure(401, "TOKEN_EXPIRED", "token expired"))
        .mount(backend.server())
        .await;
    mount_revoked_refresh(&backend).await;
    let (context, mut nav) = backend.context(CredentialStore::in_memory());

    context
        .session()
        .complete_callback("good-code")
        .await
        .expect("signed in");
    assert!(context.session().state().is_authenticated());

    let mut changes = context.session().subscribe();
    let err = context
        .gateway()
        .list_posts(ListParams::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ApiError::RefreshFailed("refresh token revoked".into())
    );
    assert!(changes.has_changed().expect("controller alive"));
    let state = context.session().state();
    assert!(!state.is_authenticated());
    assert!(state.is_initialized);
    assert!(context.store().get().is_none());
    assert_eq!(nav.try_recv().ok(), Some(Navigation::to(Route::login())));
}

#[tokio::test]
async fn failed_refresh_while_fetching_profile_drops_cached_user() {
    let backend = MockBackend::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/auth/validate")))
        .respond_with(ok(json!({ "valid": true, "user_id": "u1" })))
        .mount(backend.server())
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/users/u1")))
        .respond_with(failure(401, "TOKEN_EXPIRED", "token expired"))
        .mount(backend.server())
        .await;
    mount_revoked_refresh(&backend).await;
    let (context, _nav) = backend.context(seeded_store(
        "access-1",
        Some("refresh-1"),
        Some(user_json("u1", "Ada")),
    ));

    context.session().check_auth().await;

    let state = context.session().state();
    assert!(!state.is_authenticated());
    assert!(state.is_initialized);
    assert!(context.store().get_user().is_none());
}
