use std::time::{Duration, Instant};

use super::*;
use crate::test_support::{alice, success_flag, Fixture, MockBackend};
use serde_json::json;
use shared::protocol::ResponseConvention;

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn context(gateway: Arc<ApiGateway>, params: &[(&str, &str)], query: &[(&str, &str)]) -> RouteContext {
    RouteContext {
        path: "/test".into(),
        params: to_map(params),
        query: to_map(query),
        session: Session::empty(),
        gateway,
    }
}

#[tokio::test]
async fn expand_template_prefers_params_and_encodes_values() {
    let fixture = Fixture::new();
    let gateway = fixture.gateway("http://127.0.0.1:9/api", ResponseConvention::Auto);
    let ctx = context(gateway, &[("id", "42")], &[("id", "7"), ("q", "rust & tokio")]);

    assert_eq!(
        expand_template("/product?id={id}", &ctx).expect("expand"),
        "/product?id=42"
    );
    assert_eq!(
        expand_template("/search?q={q}", &ctx).expect("expand"),
        "/search?q=rust+%26+tokio"
    );
    assert_eq!(expand_template("/tags", &ctx).expect("expand"), "/tags");
    assert!(matches!(
        expand_template("/articles/{missing}", &ctx),
        Err(ViewError::MissingParam(name)) if name == "missing"
    ));
}

#[tokio::test]
async fn static_view_echoes_params_and_query() {
    let fixture = Fixture::new();
    let gateway = fixture.gateway("http://127.0.0.1:9/api", ResponseConvention::Auto);
    let ctx = context(gateway, &[("page", "settings")], &[("tab", "2")]);

    let view = StaticView::new("admin", "Administration")
        .render(&ctx)
        .await
        .expect("render");

    assert_eq!(view.kind, "admin");
    assert_eq!(view.data, json!({ "page": "settings", "tab": "2" }));
}

#[tokio::test]
async fn fetch_view_joins_sources_concurrently() {
    let backend = MockBackend::new();
    let delay = Duration::from_millis(300);
    for (path, data) in [
        ("/categories", json!(["books"])),
        ("/products/hot", json!([{ "id": 1 }])),
        ("/products/new", json!([{ "id": 2 }])),
    ] {
        backend
            .reply_delayed("GET", path, success_flag(data), delay)
            .await;
    }
    let base = backend.spawn().await;
    let fixture = Fixture::new();
    let ctx = context(fixture.gateway(&base, ResponseConvention::Auto), &[], &[]);
    let view = FetchView::new("home", "Home")
        .source("categories", "/categories")
        .source("hot", "/products/hot?limit=8")
        .source("new", "/products/new?limit=8");

    let started = Instant::now();
    let rendered = view.render(&ctx).await.expect("render");

    assert!(started.elapsed() < delay * 3, "sources were fetched one by one");
    assert_eq!(
        rendered.data,
        json!({ "categories": ["books"], "hot": [{ "id": 1 }], "new": [{ "id": 2 }] })
    );
    let hot = backend.requests_to("/products/hot").await;
    assert_eq!(hot[0].query.as_deref(), Some("limit=8"));
}

#[tokio::test]
async fn fetch_view_fails_when_any_required_source_fails() {
    let backend = MockBackend::new();
    backend
        .reply_json("GET", "/categories", success_flag(json!(["books"])))
        .await;
    backend
        .reply_json("GET", "/products/hot", json!({ "success": false, "message": "db down" }))
        .await;
    let base = backend.spawn().await;
    let fixture = Fixture::new();
    let ctx = context(fixture.gateway(&base, ResponseConvention::Auto), &[], &[]);

    let result = FetchView::new("home", "Home")
        .source("categories", "/categories")
        .source("hot", "/products/hot")
        .render(&ctx)
        .await;

    match result {
        Err(ViewError::Api { kind, message, .. }) => {
            assert_eq!(kind, FailureKind::Application);
            assert_eq!(message, "db down");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn optional_source_failure_renders_null() {
    let backend = MockBackend::new();
    backend
        .reply_json("GET", "/product", success_flag(json!({ "id": 42 })))
        .await;
    backend
        .reply_json("GET", "/reviews", json!({ "code": 500, "message": "nope" }))
        .await;
    let base = backend.spawn().await;
    let fixture = Fixture::new();
    let ctx = context(fixture.gateway(&base, ResponseConvention::Auto), &[("id", "42")], &[]);

    let view = FetchView::new("product", "Product")
        .source("product", "/product?id={id}")
        .optional_source("reviews", "/reviews?product_id={id}")
        .render(&ctx)
        .await
        .expect("render");

    assert_eq!(view.data, json!({ "product": { "id": 42 }, "reviews": null }));
}

#[tokio::test]
async fn unauthorized_outranks_other_failures() {
    let backend = MockBackend::new();
    backend.reply("GET", "/cart", 500, "not json").await;
    backend
        .reply_json("GET", "/addresses", json!({ "code": 401, "message": "expired" }))
        .await;
    let base = backend.spawn().await;
    let fixture = Fixture::new();
    fixture
        .session
        .set_authenticated("tok123", alice(), None)
        .await;
    let ctx = context(fixture.gateway(&base, ResponseConvention::Auto), &[], &[]);

    let result = FetchView::new("checkout", "Checkout")
        .source("cart", "/cart")
        .source("addresses", "/addresses")
        .render(&ctx)
        .await;

    assert!(matches!(result, Err(ViewError::Unauthorized)));
    assert!(!fixture.session.is_authenticated().await);
}

#[tokio::test]
async fn not_found_view_names_the_path() {
    let fixture = Fixture::new();
    let ctx = context(fixture.gateway("http://127.0.0.1:9/api", ResponseConvention::Auto), &[], &[]);

    let view = NotFoundView.render(&ctx).await.expect("render");

    assert_eq!(view, View::not_found("/test"));
    assert_eq!(view.data["path"], "/test");
}
