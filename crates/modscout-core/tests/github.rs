//! GitHubContentClient against a local HTTP server standing in for the
//! GitHub API and raw content host.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use modscout_core::repository::{
    GitHubContentClient, OmissionReason, RateLimitSnapshot, RepositoryContentClient,
    RepositoryRef, TreeEntry,
};
use modscout_core::{EngineError, Stage};
use modscout_test_utils::tracing_setup::init_test_tracing;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::net::TcpListener;

#[derive(Default)]
struct MockHost {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn rate_headers(remaining: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", HeaderValue::from_static("60"));
    headers.insert(
        "x-ratelimit-remaining",
        HeaderValue::from_str(&remaining.to_string()).unwrap(),
    );
    headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000000"));
    headers
}

async fn tree(Path((owner, repo, reference)): Path<(String, String, String)>) -> Response {
    match (owner.as_str(), repo.as_str(), reference.as_str()) {
        ("org", "mod", "v1.0.0") => (
            rate_headers(41),
            Json(json!({
                "sha": "abc",
                "truncated": false,
                "tree": [
                    {"path": "main.tf", "type": "blob", "size": 20},
                    {"path": "examples", "type": "tree"},
                    {"path": "examples/basic", "type": "tree"},
                    {"path": "examples/basic/main.tf", "type": "blob", "size": 12}
                ]
            })),
        )
            .into_response(),
        ("org", "big", "v1.0.0") => (
            rate_headers(39),
            Json(json!({
                "sha": "def",
                "truncated": true,
                "tree": [
                    {"path": "main.tf", "type": "blob", "size": 5},
                    {"path": "modules", "type": "tree"}
                ]
            })),
        )
            .into_response(),
        ("org", "big", "v1.0.0:modules/deep") => (
            rate_headers(38),
            Json(json!({
                "sha": "456",
                "truncated": false,
                "tree": [
                    {"path": "main.tf", "type": "blob", "size": 7},
                    {"path": "nested", "type": "tree"}
                ]
            })),
        )
            .into_response(),
        ("org", "limited", _) => (StatusCode::FORBIDDEN, rate_headers(0)).into_response(),
        _ => (StatusCode::NOT_FOUND, rate_headers(40)).into_response(),
    }
}

async fn rate_limit() -> Json<serde_json::Value> {
    Json(json!({
        "resources": {"core": {"limit": 5000, "remaining": 4321, "reset": 1700000000}},
        "rate": {"limit": 5000, "remaining": 4321, "reset": 1700000000}
    }))
}

async fn raw(State(host): State<Arc<MockHost>>, Path(path): Path<String>) -> Response {
    let now = host.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    host.max_in_flight.fetch_max(now, Ordering::SeqCst);

    let file = path.strip_prefix("org/mod/v1.0.0/").unwrap_or("");
    // Earlier files answer later, so completion order is the reverse of request order.
    let delay = match file {
        "a.tf" => 120,
        "b.tf" => 80,
        "c.tf" => 40,
        _ => 20,
    };
    tokio::time::sleep(Duration::from_millis(delay)).await;

    let response = match file {
        "a.tf" | "b.tf" | "c.tf" | "d.tf" | "e.tf" | "f.tf" => format!("# {file}\n").into_response(),
        "logo.dat" => vec![0x89u8, b'P', b'N', b'G', 0, 0, 1].into_response(),
        "huge.tf" => "x".repeat(4096).into_response(),
        "broken.tf" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        // Streamed, so no Content-Length is sent.
        "chunked.tf" => Body::from_stream(futures::stream::iter(vec![
            Ok::<_, std::io::Error>(vec![b'x'; 600]),
            Ok(vec![b'x'; 600]),
        ]))
        .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    };
    host.in_flight.fetch_sub(1, Ordering::SeqCst);
    response
}

async fn spawn_host() -> (SocketAddr, Arc<MockHost>) {
    init_test_tracing();
    let host = Arc::new(MockHost::default());
    let app = axum::Router::new()
        .route("/api/repos/{owner}/{repo}/git/trees/{*reference}", get(tree))
        .route("/api/rate_limit", get(rate_limit))
        .route("/raw/{*path}", get(raw))
        .with_state(host.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, host)
}

fn client(addr: SocketAddr) -> GitHubContentClient {
    GitHubContentClient::new(
        &format!("http://{addr}/api"),
        &format!("http://{addr}/raw"),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn repo(name: &str) -> RepositoryRef {
    RepositoryRef {
        host: "github.com".to_string(),
        owner: "org".to_string(),
        repo: name.to_string(),
        reference: "v1.0.0".to_string(),
    }
}

fn paths(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_list_tree_records_rate_limit() {
    let (addr, _) = spawn_host().await;
    let client = client(addr);

    let entries = client.list_tree(&repo("mod"), "examples").await.unwrap();
    assert_eq!(
        entries,
        vec![
            TreeEntry::directory("examples"),
            TreeEntry::directory("examples/basic"),
            TreeEntry::file("examples/basic/main.tf", Some(12)),
        ]
    );
    assert_eq!(
        client.last_rate_limit(),
        Some(RateLimitSnapshot {
            limit: 60,
            remaining: 41,
            reset_epoch_secs: 1_700_000_000,
        })
    );
}

#[tokio::test]
async fn test_list_tree_missing_ref() {
    let (addr, _) = spawn_host().await;
    let err = client(addr)
        .list_tree(&repo("mod").at("v9.9.9"), "")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::RefNotFound {
            repository: "github.com/org/mod".to_string(),
            reference: "v9.9.9".to_string(),
        }
    );
}

#[tokio::test]
async fn test_list_tree_rate_limited() {
    let (addr, _) = spawn_host().await;
    let err = client(addr).list_tree(&repo("limited"), "").await.unwrap_err();
    assert_eq!(
        err,
        EngineError::repository_unavailable(
            Stage::ListTree,
            "rate limit exhausted, resets at epoch 1700000000",
        )
    );
}

#[tokio::test]
async fn test_get_files_preserves_request_order() {
    let (addr, _) = spawn_host().await;
    let client = client(addr).with_max_concurrent_fetches(3);

    let batch = client
        .get_files(&repo("mod"), &paths(&["a.tf", "b.tf", "c.tf"]))
        .await
        .unwrap();

    let fetched: Vec<&str> = batch.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(fetched, vec!["a.tf", "b.tf", "c.tf"]);
    assert_eq!(batch.files[0].text, "# a.tf\n");
    assert!(batch.omitted.is_empty());
}

#[tokio::test]
async fn test_get_files_reports_omissions() {
    let (addr, _) = spawn_host().await;
    let client = client(addr).with_max_file_bytes(1024);

    let batch = client
        .get_files(
            &repo("mod"),
            &paths(&["logo.dat", "a.tf", "huge.tf", "missing.tf"]),
        )
        .await
        .unwrap();

    assert_eq!(batch.files.len(), 1);
    assert_eq!(batch.files[0].path, "a.tf");
    let omitted: Vec<(&str, &OmissionReason)> = batch
        .omitted
        .iter()
        .map(|o| (o.path.as_str(), &o.reason))
        .collect();
    assert_eq!(
        omitted,
        vec![
            ("logo.dat", &OmissionReason::Binary),
            (
                "huge.tf",
                &OmissionReason::TooLarge {
                    size_bytes: 4096,
                    limit_bytes: 1024,
                }
            ),
            ("missing.tf", &OmissionReason::NotFound),
        ]
    );
}

#[tokio::test]
async fn test_get_files_bounds_concurrency() {
    let (addr, host) = spawn_host().await;
    let client = client(addr).with_max_concurrent_fetches(2);

    let batch = client
        .get_files(
            &repo("mod"),
            &paths(&["a.tf", "b.tf", "c.tf", "d.tf", "e.tf", "f.tf"]),
        )
        .await
        .unwrap();

    assert_eq!(batch.files.len(), 6);
    let peak = host.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency was {peak}");
}

#[tokio::test]
async fn test_list_tree_truncated_lists_subtree() {
    let (addr, _) = spawn_host().await;
    let client = client(addr);

    let entries = client.list_tree(&repo("big"), "modules/deep").await.unwrap();
    assert_eq!(
        entries,
        vec![
            TreeEntry::directory("modules/deep"),
            TreeEntry::file("modules/deep/main.tf", Some(7)),
            TreeEntry::directory("modules/deep/nested"),
        ]
    );
}

#[tokio::test]
async fn test_list_tree_truncated_file_path_uses_full_listing() {
    let (addr, _) = spawn_host().await;
    let entries = client(addr).list_tree(&repo("big"), "main.tf").await.unwrap();
    assert_eq!(entries, vec![TreeEntry::file("main.tf", Some(5))]);
}

#[tokio::test]
async fn test_get_files_failing_file_is_omitted() {
    let (addr, _) = spawn_host().await;

    let batch = client(addr)
        .get_files(&repo("mod"), &paths(&["broken.tf"]))
        .await
        .unwrap();

    assert!(batch.files.is_empty());
    assert_eq!(batch.omitted.len(), 1);
    assert_eq!(batch.omitted[0].path, "broken.tf");
    assert!(matches!(
        &batch.omitted[0].reason,
        OmissionReason::Unavailable { detail } if detail.contains("500")
    ));
}

#[tokio::test]
async fn test_get_files_host_down_omits_every_file() {
    // Bind then drop a listener so the port refuses connections.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let batch = client(addr)
        .get_files(&repo("mod"), &paths(&["a.tf", "b.tf"]))
        .await
        .unwrap();

    assert!(batch.files.is_empty());
    let omitted: Vec<&str> = batch.omitted.iter().map(|o| o.path.as_str()).collect();
    assert_eq!(omitted, vec!["a.tf", "b.tf"]);
    assert!(
        batch
            .omitted
            .iter()
            .all(|o| matches!(o.reason, OmissionReason::Unavailable { .. }))
    );
}

#[tokio::test]
async fn test_get_files_stops_reading_past_ceiling() {
    let (addr, _) = spawn_host().await;
    let client = client(addr).with_max_file_bytes(1024);

    let batch = client
        .get_files(&repo("mod"), &paths(&["chunked.tf"]))
        .await
        .unwrap();

    assert!(batch.files.is_empty());
    match &batch.omitted[0].reason {
        OmissionReason::TooLarge {
            size_bytes,
            limit_bytes,
        } => {
            assert_eq!(*limit_bytes, 1024);
            assert!(*size_bytes > 1024 && *size_bytes <= 1200, "read {size_bytes} bytes");
        }
        other => panic!("expected TooLarge, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limit_query() {
    let (addr, _) = spawn_host().await;
    let client = client(addr);

    let quota = client.rate_limit().await.unwrap();
    assert_eq!(quota.remaining, 4321);
    assert_eq!(client.last_rate_limit(), Some(quota));
}
