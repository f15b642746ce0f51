//! API integration tests for derivative retrieval and error handling.
//!
//! Tests verify:
//! - Size resolution through the HTTP layer
//! - Response headers
//! - Error cases (missing image, store outage, corrupt payload)
//! - Health and catch-all routes

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use tower::ServiceExt;

use image_ladder::error::StoreError;
use image_ladder::ladder::ResolutionResolver;
use image_ladder::service::ImageService;
use image_ladder::store::DerivativeStore;
use image_ladder::{create_router, RouterConfig};

use super::test_utils::{tagged_set, test_ladder, TrackingStore};

async fn store_with_cat() -> Arc<TrackingStore> {
    let store = Arc::new(TrackingStore::new());
    store.put("cat", &tagged_set("cat")).await.unwrap();
    store
}

fn router(store: Arc<TrackingStore>, config: RouterConfig) -> Router {
    let service = ImageService::new(store, ResolutionResolver::new(test_ladder()));
    create_router(service, config)
}

async fn get(router: Router, uri: &str) -> axum::response::Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.oneshot(request).await.unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// =============================================================================
// Successful Retrieval
// =============================================================================

#[tokio::test]
async fn test_size_resolves_to_ceiling_tier() {
    let router = router(store_with_cat().await, RouterConfig::new());

    let response = get(router, "/cat?size=50").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/avif"
    );
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=3600"
    );
    assert_eq!(
        response.headers().get("x-image-resolution").unwrap(),
        "64x64"
    );
    assert_eq!(body_bytes(response).await, Bytes::from("cat-64"));
}

#[tokio::test]
async fn test_extension_is_ignored() {
    let router = router(store_with_cat().await, RouterConfig::new());

    let response = get(router, "/cat.png?size=32").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, Bytes::from("cat-32"));
}

#[tokio::test]
async fn test_no_size_serves_original() {
    let router = router(store_with_cat().await, RouterConfig::new());

    let response = get(router, "/cat").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-image-resolution").unwrap(),
        "original"
    );
    assert_eq!(body_bytes(response).await, Bytes::from("cat-orig"));
}

#[tokio::test]
async fn test_size_above_ladder_serves_original() {
    let router = router(store_with_cat().await, RouterConfig::new());

    let response = get(router, "/cat?size=100000").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, Bytes::from("cat-orig"));
}

#[tokio::test]
async fn test_unparseable_size_serves_original() {
    let store = store_with_cat().await;

    for uri in ["/cat?size=abc", "/cat?size=", "/cat?size=-3", "/cat?size=0"] {
        let response = get(router(Arc::clone(&store), RouterConfig::new()), uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert_eq!(body_bytes(response).await, Bytes::from("cat-orig"), "{}", uri);
    }
}

#[tokio::test]
async fn test_tier_larger_than_source_is_original() {
    let router = router(store_with_cat().await, RouterConfig::new());

    let response = get(router, "/cat?size=128").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-image-resolution").unwrap(),
        "128x128"
    );
    assert_eq!(body_bytes(response).await, Bytes::from("cat-orig"));
}

#[tokio::test]
async fn test_custom_cache_max_age() {
    let router = router(
        store_with_cat().await,
        RouterConfig::new().with_cache_max_age(60).with_tracing(false),
    );

    let response = get(router, "/cat").await;

    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=60"
    );
}

#[tokio::test]
async fn test_cors_allows_any_origin_by_default() {
    let router = router(store_with_cat().await, RouterConfig::new());

    let request = Request::builder()
        .uri("/cat")
        .header("origin", "https://example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test]
async fn test_missing_image_is_404() {
    let router = router(store_with_cat().await, RouterConfig::new());

    let response = get(router, "/missing.png").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error = body_json(response).await;
    assert_eq!(error["error"], "not_found");
    assert_eq!(error["status"], 404);
}

#[tokio::test]
async fn test_store_outage_is_404() {
    let store = store_with_cat().await;
    store.set_fail_reads(Some(StoreError::Connection("connection refused".into())));

    let response = get(router(store, RouterConfig::new()), "/cat").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_corrupt_payload_is_500_without_detail() {
    let store = store_with_cat().await;
    store.set_fail_reads(Some(StoreError::Payload {
        key: "image:cat".into(),
        field: "original".into(),
        message: "Invalid byte 33, offset 3.".into(),
    }));

    let response = get(router(store, RouterConfig::new()), "/cat").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = body_json(response).await;
    assert_eq!(error["error"], "internal_error");
    assert!(!error.to_string().contains("image:cat"));
}

#[tokio::test]
async fn test_nested_path_hits_fallback() {
    let router = router(store_with_cat().await, RouterConfig::new());

    let response = get(router, "/images/cat.png").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "error": "Not Found" })
    );
}

#[tokio::test]
async fn test_root_hits_fallback() {
    let router = router(store_with_cat().await, RouterConfig::new());

    let response = get(router, "/").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Not Found");
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_healthy() {
    let router = router(store_with_cat().await, RouterConfig::new());

    let response = get(router, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_health_degraded_when_store_down() {
    let store = store_with_cat().await;
    store.set_fail_reads(Some(StoreError::Connection("timed out".into())));

    let response = get(router(store, RouterConfig::new()), "/health").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "degraded");
}
