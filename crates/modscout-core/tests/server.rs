//! Tool endpoint tests through the axum router.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use modscout_config::policy::AccessPolicy;
use modscout_core::server::{AppState, ErrorResponse, router};
use modscout_test_utils::fixtures::{self, detail};
use modscout_test_utils::{StubRegistry, StubRepository, TestEngine};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

const VPC_PINNED: &str = "terraform-ibm-modules/vpc/ibm/8.4.0";

fn app(repository: StubRepository) -> axum::Router {
    let registry = StubRegistry::new().with_module(detail(
        VPC_PINNED,
        "https://github.com/terraform-ibm-modules/terraform-ibm-vpc",
    ));
    let t = TestEngine::new(registry, repository, AccessPolicy::default());
    router(AppState::new(t.engine))
}

async fn post(app: axum::Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_search_endpoint() {
    let (status, body) = post(
        app(StubRepository::new()),
        "/tools/search_modules",
        r#"{"query": "vpc"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "found");
    assert_eq!(
        body["modules"][0]["reference"],
        json!({"namespace": "terraform-ibm-modules", "name": "vpc", "target": "ibm", "version": "8.4.0"})
    );
}

#[tokio::test]
async fn test_details_endpoint() {
    let (status, body) = post(
        app(StubRepository::new()),
        "/tools/get_module_details",
        &json!({"module_id": "terraform-ibm-modules/vpc/ibm"}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reference"]["version"], "8.4.0");
    assert_eq!(body["inputs"][0]["type"], "string");
}

#[tokio::test]
async fn test_list_content_endpoint() {
    let repository = StubRepository::new().with_text_tree("v8.4.0", &fixtures::module_tree());
    let (status, body) = post(
        app(repository),
        "/tools/list_content",
        &json!({"module_id": VPC_PINNED}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["examples"][0]["name"], "basic");
    assert_eq!(body["submodules"][0]["kind"], "submodule");
    assert_eq!(body["repository"]["reference"], "v8.4.0");
}

#[tokio::test]
async fn test_get_content_endpoint() {
    let repository = StubRepository::new().with_text_tree("v8.4.0", &fixtures::module_tree());
    let (status, body) = post(
        app(repository),
        "/tools/get_content",
        &json!({
            "module_id": VPC_PINNED,
            "path": "examples/basic",
            "include_files": ["*.tf"]
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"], json!([{"path": "examples/basic/main.tf", "text": "module \"vpc\" {}\n"}]));
    assert_eq!(body["omitted"], json!([]));
}

#[tokio::test]
async fn test_error_statuses() {
    let cases = [
        (
            "/tools/get_module_details",
            json!({"module_id": "not-a-module"}),
            StatusCode::BAD_REQUEST,
            "invalid_reference",
        ),
        (
            "/tools/get_module_details",
            json!({"module_id": "someone-else/vpc/ibm"}),
            StatusCode::FORBIDDEN,
            "policy_denied",
        ),
        (
            "/tools/get_module_details",
            json!({"module_id": "terraform-ibm-modules/unknown/ibm/1.0.0"}),
            StatusCode::NOT_FOUND,
            "module_not_found",
        ),
        (
            "/tools/list_content",
            json!({"module_id": VPC_PINNED}),
            StatusCode::NOT_FOUND,
            "ref_not_found",
        ),
        (
            "/tools/search_modules",
            json!({"query": ""}),
            StatusCode::BAD_REQUEST,
            "invalid_request",
        ),
    ];
    for (uri, request, expected_status, expected_kind) in cases {
        let (status, body) = post(app(StubRepository::new()), uri, &request.to_string()).await;
        assert_eq!(status, expected_status, "{uri} {request}");
        let error: ErrorResponse = serde_json::from_value(body).unwrap();
        assert_eq!(error.kind, expected_kind, "{uri} {request}");
    }
}

#[tokio::test]
async fn test_malformed_body_is_invalid_request() {
    let (status, body) = post(
        app(StubRepository::new()),
        "/tools/get_content",
        r#"{"path": "examples"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");
}

#[tokio::test]
async fn test_health_is_ok_even_when_degraded() {
    let repository = StubRepository::new().with_rate_limit_delay(Duration::from_secs(30));
    let registry = StubRegistry::new();
    let t = TestEngine::new(registry, repository, AccessPolicy::default())
        .map_engine(|e| e.with_health_probe("vpc", Duration::from_millis(50), 10));

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = router(AppState::new(t.engine))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["overall"], "degraded");
    assert_eq!(body["dependencies"]["repository"]["status"], "unavailable");
    assert_eq!(body["dependencies"]["registry"]["status"], "healthy");
}
