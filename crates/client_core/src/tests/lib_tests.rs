use serde_json::json;
use shared::{domain::Role, error::FailureKind, protocol::ResponseConvention};
use storage::{keys, MemorySessionStore};

use super::*;
use crate::test_support::{alice, drain, status_code, success_flag, toasts, MockBackend};

fn settings(base: &str, product: Product, convention: ResponseConvention) -> Settings {
    Settings {
        api_base_url: base.to_string(),
        product,
        convention,
        request_timeout_secs: 5,
        ..Settings::default()
    }
}

fn login_payload() -> serde_json::Value {
    json!({
        "token": "tok123",
        "user": { "id": 1, "username": "alice", "role": "user" }
    })
}

async fn blog_backend() -> (MockBackend, String) {
    let backend = MockBackend::new();
    backend
        .reply_json("POST", "/auth/login", success_flag(login_payload()))
        .await;
    backend
        .reply_json("GET", "/articles", success_flag(json!([{ "id": 1, "title": "hello" }])))
        .await;
    backend
        .reply_json("GET", "/categories", success_flag(json!([])))
        .await;
    backend
        .reply_json("GET", "/tags", success_flag(json!([])))
        .await;
    let base = backend.spawn().await;
    (backend, base)
}

fn coordinator(settings: Settings) -> (Coordinator, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::new());
    let coordinator = Coordinator::new(settings, store.clone()).expect("coordinator");
    (coordinator, store)
}

#[tokio::test]
async fn login_authenticates_and_later_calls_carry_the_token() {
    let (backend, base) = blog_backend().await;
    let (coordinator, store) = coordinator(settings(&base, Product::Blog, ResponseConvention::Auto));
    let mut events = coordinator.subscribe_events();

    let response = coordinator.login("alice", "secret").await;

    assert!(response.is_success());
    let session = coordinator.session().snapshot().await;
    assert_eq!(session.token(), Some("tok123"));
    assert_eq!(session.user().map(|user| user.username.as_str()), Some("alice"));
    assert_eq!(
        store.get(keys::AUTH_TOKEN).await.expect("read").as_deref(),
        Some("tok123")
    );

    let login = backend.requests_to("/auth/login").await.remove(0);
    assert_eq!(login.authorization, None);
    let body: serde_json::Value = serde_json::from_str(&login.body).expect("login body");
    assert_eq!(body, json!({ "username": "alice", "password": "secret" }));

    // Login lands on the home page, which loads articles with the new token.
    match coordinator.router().state().await {
        ViewState::Rendered { path, view } => {
            assert_eq!(path, "/");
            assert_eq!(view.kind, "home");
        }
        other => panic!("unexpected state {other:?}"),
    }
    assert!(coordinator.gateway().get("/articles").await.is_success());
    let articles = backend.requests_to("/articles").await;
    assert!(!articles.is_empty());
    assert!(articles
        .iter()
        .all(|request| request.authorization.as_deref() == Some("Bearer tok123")));

    let events = drain(&mut events);
    assert!(events.iter().any(|event| matches!(
        event,
        ClientEvent::SessionChanged { authenticated: true, username: Some(name) } if name == "alice"
    )));
}

#[tokio::test]
async fn rejected_login_leaves_session_empty() {
    let backend = MockBackend::new();
    backend
        .reply_json(
            "POST",
            "/auth/login",
            json!({ "code": 400, "message": "wrong username or password" }),
        )
        .await;
    let base = backend.spawn().await;
    let (coordinator, _store) = coordinator(settings(&base, Product::Shop, ResponseConvention::Auto));
    let mut events = coordinator.subscribe_events();

    let response = coordinator.login("alice", "nope").await;

    assert_eq!(response.message(), Some("wrong username or password"));
    assert!(!coordinator.session().is_authenticated().await);
    assert_eq!(coordinator.router().state().await, ViewState::Idle);
    assert_eq!(
        toasts(&drain(&mut events)),
        vec!["wrong username or password".to_string()]
    );
}

#[tokio::test]
async fn login_without_token_is_rejected() {
    let backend = MockBackend::new();
    backend
        .reply_json("POST", "/auth/login", success_flag(json!({ "id": 1 })))
        .await;
    let base = backend.spawn().await;
    let (coordinator, _store) = coordinator(settings(&base, Product::Shop, ResponseConvention::Auto));

    let response = coordinator.login("alice", "secret").await;

    assert!(!response.is_success());
    assert!(!coordinator.session().is_authenticated().await);
}

#[tokio::test]
async fn status_code_unauthorized_clears_an_authenticated_session() {
    let backend = MockBackend::new();
    backend
        .reply_json("POST", "/auth/login", status_code(login_payload()))
        .await;
    backend
        .reply_json("GET", "/categories", status_code(json!([])))
        .await;
    backend
        .reply_json("GET", "/products/hot", status_code(json!([])))
        .await;
    backend
        .reply_json("GET", "/products/new", status_code(json!([])))
        .await;
    backend
        .reply_json("GET", "/cart", json!({ "code": 401, "message": "token expired" }))
        .await;
    let base = backend.spawn().await;
    let (coordinator, store) =
        coordinator(settings(&base, Product::Shop, ResponseConvention::StatusCode));

    assert!(coordinator.login("alice", "secret").await.is_success());
    assert!(coordinator.session().is_authenticated().await);

    // The cart page is protected; the backend rejects the token mid-render.
    let state = coordinator.navigate("/cart").await;

    assert!(!coordinator.session().is_authenticated().await);
    assert_eq!(coordinator.session().token().await, None);
    assert!(store.entries().await.expect("entries").is_empty());
    match state {
        ViewState::Rendered { path, view } => {
            assert_eq!(path, "/login");
            assert_eq!(view.kind, "login");
        }
        other => panic!("unexpected state {other:?}"),
    }
}

#[tokio::test]
async fn logout_clears_session_and_leaves_protected_page() {
    let backend = MockBackend::new();
    backend
        .reply_json("POST", "/logout", success_flag(json!(null)))
        .await;
    backend
        .reply_json("GET", "/orders", success_flag(json!([])))
        .await;
    for path in ["/categories", "/products/hot", "/products/new"] {
        backend
            .reply_json("GET", path, success_flag(json!([])))
            .await;
    }
    let base = backend.spawn().await;
    let (coordinator, store) = coordinator(settings(&base, Product::Shop, ResponseConvention::Auto));
    coordinator
        .session()
        .set_authenticated("tok123", alice(), None)
        .await;
    let orders = coordinator.navigate("/orders").await;
    assert!(matches!(orders, ViewState::Rendered { ref view, .. } if view.kind == "orders"));

    coordinator.logout().await;

    assert!(!coordinator.session().is_authenticated().await);
    assert!(store.entries().await.expect("entries").is_empty());
    let logout = backend.requests_to("/logout").await.remove(0);
    assert_eq!(logout.method, "POST");
    assert_eq!(logout.authorization.as_deref(), Some("Bearer tok123"));
    assert_eq!(coordinator.router().current_path().await.as_deref(), Some("/"));
}

#[tokio::test]
async fn logout_on_public_page_stays_put_and_tolerates_backend_failure() {
    let base = crate::test_support::closed_base_url().await;
    let (coordinator, _store) = coordinator(settings(&base, Product::Shop, ResponseConvention::Auto));
    coordinator
        .session()
        .set_authenticated("tok123", alice(), None)
        .await;
    coordinator.navigate("/login").await;

    coordinator.logout().await;

    assert!(!coordinator.session().is_authenticated().await);
    assert_eq!(coordinator.router().current_path().await.as_deref(), Some("/login"));
}

#[tokio::test]
async fn register_without_token_sends_user_to_login() {
    let backend = MockBackend::new();
    backend
        .reply_json("POST", "/auth/register", success_flag(json!({ "id": 2 })))
        .await;
    let base = backend.spawn().await;
    let (coordinator, _store) = coordinator(settings(&base, Product::Blog, ResponseConvention::Auto));

    let response = coordinator.register("bob", "bob@example.com", "pw").await;

    assert!(response.is_success());
    assert!(!coordinator.session().is_authenticated().await);
    assert_eq!(coordinator.router().current_path().await.as_deref(), Some("/login"));
    let body: serde_json::Value =
        serde_json::from_str(&backend.requests_to("/auth/register").await[0].body).expect("body");
    assert_eq!(body["email"], "bob@example.com");
}

#[tokio::test]
async fn register_with_token_logs_in_directly() {
    let backend = MockBackend::new();
    backend
        .reply_json("POST", "/auth/register", success_flag(login_payload()))
        .await;
    for path in ["/categories", "/products/hot", "/products/new"] {
        backend
            .reply_json("GET", path, success_flag(json!([])))
            .await;
    }
    let base = backend.spawn().await;
    let (coordinator, _store) = coordinator(settings(&base, Product::Shop, ResponseConvention::Auto));

    assert!(coordinator
        .register("alice", "alice@example.com", "pw")
        .await
        .is_success());

    assert_eq!(coordinator.session().token().await.as_deref(), Some("tok123"));
    assert_eq!(coordinator.router().current_path().await.as_deref(), Some("/"));
}

#[tokio::test]
async fn start_restores_persisted_session_and_refreshes_user() {
    let backend = MockBackend::new();
    backend
        .reply_json(
            "GET",
            "/auth/user",
            success_flag(json!({
                "user": { "id": 1, "username": "alice", "role": "seller" },
                "seller": { "id": 3, "shop_name": "attic" }
            })),
        )
        .await;
    backend
        .reply_json("GET", "/cart", success_flag(json!({ "items": [] })))
        .await;
    let base = backend.spawn().await;
    let store = Arc::new(MemorySessionStore::new());
    store
        .write_all(&[
            (keys::AUTH_TOKEN, Some("tok123".to_string())),
            (
                keys::CURRENT_USER,
                Some(serde_json::to_string(&alice()).expect("user json")),
            ),
        ])
        .await
        .expect("seed");
    let mut settings = settings(&base, Product::Shop, ResponseConvention::Auto);
    settings.restore_user_on_start = true;
    let coordinator = Coordinator::new(settings, store.clone()).expect("coordinator");

    let state = coordinator.start(Some("/cart")).await;

    let session = coordinator.session().snapshot().await;
    assert_eq!(session.user().map(|user| user.role.clone()), Some(Role::Seller));
    assert_eq!(
        session
            .seller_profile()
            .and_then(|profile| profile.shop_name.as_deref()),
        Some("attic")
    );
    assert!(matches!(state, ViewState::Rendered { ref view, .. } if view.kind == "cart"));
    assert_eq!(
        backend.requests_to("/auth/user").await[0].authorization.as_deref(),
        Some("Bearer tok123")
    );
}

#[tokio::test]
async fn refresh_with_expired_token_logs_out_quietly() {
    let backend = MockBackend::new();
    backend
        .reply("GET", "/auth/user", 401, json!({ "success": false }).to_string())
        .await;
    let base = backend.spawn().await;
    let (coordinator, _store) = coordinator(settings(&base, Product::Shop, ResponseConvention::Auto));
    coordinator
        .session()
        .set_authenticated("tok123", alice(), None)
        .await;

    assert!(!coordinator.refresh_current_user().await);
    assert!(!coordinator.session().is_authenticated().await);
    let failure = coordinator.gateway().get("/auth/user").await;
    assert_eq!(
        failure.failure().map(|failure| failure.kind),
        Some(FailureKind::Unauthorized)
    );
}

#[tokio::test]
async fn open_persists_session_across_restarts() {
    let (_backend, base) = blog_backend().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = format!("sqlite://{}", dir.path().join("session.db").display());
    let mut settings = settings(&base, Product::Blog, ResponseConvention::Auto);
    settings.database_url = database_url;

    {
        let coordinator = Coordinator::open(settings.clone()).await.expect("open");
        assert!(coordinator.login("alice", "secret").await.is_success());
    }

    let reopened = Coordinator::open(settings).await.expect("reopen");
    reopened.start(None).await;
    assert_eq!(reopened.session().token().await.as_deref(), Some("tok123"));
}

#[test]
fn rejects_invalid_base_url() {
    let store = Arc::new(MemorySessionStore::new());
    let result = Coordinator::new(
        settings("not a url", Product::Shop, ResponseConvention::Auto),
        store,
    );
    assert!(matches!(result, Err(ClientError::InvalidBaseUrl { .. })));
}
