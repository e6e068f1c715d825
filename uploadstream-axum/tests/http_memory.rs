use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use uploadstream_axum::{AppState, HttpApp};
use uploadstream_blob::MemoryBlobStore;
use uploadstream_metadata::MemoryMetadataStore;
use uploadstream_service::{FileService, ListConfig, StaticCredentials, TransferConfig, TransferHandler};

const KEY: &str = "test-key";

fn app() -> (Router, MemoryBlobStore) {
    let blobs = MemoryBlobStore::new();
    let metadata = Arc::new(MemoryMetadataStore::new());
    let transfer = TransferHandler::new(
        Arc::new(blobs.clone()),
        metadata.clone(),
        TransferConfig::default().with_max_chunk_bytes(8),
    );
    let files = FileService::new(Arc::new(blobs.clone()), metadata, ListConfig::default());
    let state = AppState::new(
        Arc::new(transfer),
        Arc::new(files),
        Arc::new(StaticCredentials::new([KEY])),
    );
    (HttpApp::new(state).router, blobs)
}

fn upload_request(user: &str, name: &str, content_type: &str, size: usize, body: &'static [u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/files")
        .header("x-api-key", KEY)
        .header("x-user-id", user)
        .header("x-file-name", name)
        .header("content-type", content_type)
        .header("x-file-size", size.to_string())
        .body(Body::from(body))
        .unwrap()
}

fn authed(method: &str, uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", KEY)
        .header("x-user-id", user)
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(res: Response) -> Vec<u8> {
    res.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn json_body(res: Response) -> Value {
    serde_json::from_slice(&body_bytes(res).await).unwrap()
}

#[tokio::test]
async fn missing_api_key_is_unauthenticated() {
    let (router, _) = app();

    let res = router
        .oneshot(Request::builder().uri("/files").header("x-user-id", "alice").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(res.headers().get("x-request-id").is_some());
    let body = json_body(res).await;
    assert_eq!(body["name"], "NotAuthenticated");
    assert_eq!(body["code"], 401);
    assert_eq!(body["className"], "not-authenticated");
}

#[tokio::test]
async fn wrong_key_or_missing_user_is_rejected() {
    let (router, _) = app();

    let res = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/files")
                .header("x-api-key", "nope")
                .header("x-user-id", "alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = router
        .oneshot(Request::builder().uri("/files").header("x-api-key", KEY).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(res).await["message"], "missing user id");
}

#[tokio::test]
async fn bearer_token_is_accepted() {
    let (router, _) = app();

    let res = router
        .oneshot(
            Request::builder()
                .uri("/files")
                .header("authorization", format!("Bearer {KEY}"))
                .header("x-user-id", "alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["files"], Value::Array(Vec::new()));
    assert_eq!(body["next_page_token"], "");
}

#[tokio::test]
async fn request_id_is_preserved_when_provided() {
    let (router, _) = app();
    let provided = HeaderValue::from_static("req-test-123");

    let res = router
        .oneshot(
            Request::builder()
                .uri("/files")
                .header("x-request-id", provided.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.headers().get("x-request-id").unwrap(), &provided);
}

#[tokio::test]
async fn upload_then_download_round_trips() {
    let (router, blobs) = app();
    let payload: &'static [u8] = b"hello from uploadstream";

    let res = router
        .clone()
        .oneshot(upload_request("alice", "hello.txt", "text/plain", payload.len(), payload))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let receipt = json_body(res).await;
    assert_eq!(receipt["size"], 23);
    assert_eq!(receipt["job_status"], "pending");
    let id = receipt["id"].as_str().unwrap().to_string();
    assert_eq!(blobs.get(&id).unwrap(), payload);

    let res = router.clone().oneshot(authed("GET", &format!("/files/{id}"), "bob")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/plain");
    assert_eq!(res.headers()["content-length"], "23");
    assert_eq!(res.headers()["x-file-name"], "hello.txt");
    assert_eq!(body_bytes(res).await, payload);

    let res = router
        .clone()
        .oneshot(authed("GET", &format!("/files/{id}/metadata"), "alice"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let metadata = json_body(res).await;
    assert_eq!(metadata["display_name"], "hello.txt");
    assert_eq!(metadata["file_type"], "other");
    assert_eq!(metadata["job_status"], "pending");

    let res = router.clone().oneshot(authed("GET", "/files?page_size=10", "alice")).await.unwrap();
    let list = json_body(res).await;
    assert_eq!(list["files"].as_array().unwrap().len(), 1);
    assert_eq!(list["files"][0]["id"], id.as_str());
}

#[tokio::test]
async fn content_mismatch_is_a_bad_request() {
    let (router, blobs) = app();
    let png: &'static [u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    let res = router
        .oneshot(upload_request("alice", "fake.txt", "text/plain", png.len(), png))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = json_body(res).await;
    assert_eq!(body["name"], "BadRequest");
    assert_eq!(body["data"]["detected"], "image/png");
    assert!(blobs.is_empty());
}

#[tokio::test]
async fn declared_size_must_match_the_body() {
    let (router, blobs) = app();

    let res = router
        .clone()
        .oneshot(upload_request("alice", "short.txt", "text/plain", 100, b"only a few bytes"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(res).await["message"].as_str().unwrap().contains("size mismatch"));

    let res = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/files")
                .header("x-api-key", KEY)
                .header("x-user-id", "alice")
                .header("x-file-name", "a.txt")
                .header("content-type", "text/plain")
                .body(Body::from("abc"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(blobs.is_empty());
}

#[tokio::test]
async fn delete_is_owner_only() {
    let (router, blobs) = app();
    let res = router
        .clone()
        .oneshot(upload_request("alice", "a.txt", "text/plain", 3, b"abc"))
        .await
        .unwrap();
    let id = json_body(res).await["id"].as_str().unwrap().to_string();

    let res = router.clone().oneshot(authed("DELETE", &format!("/files/{id}"), "bob")).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(blobs.contains(&id));

    let res = router.clone().oneshot(authed("DELETE", &format!("/files/{id}"), "alice")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let outcome = json_body(res).await;
    assert_eq!(outcome["success"], true);
    assert!(!blobs.contains(&id));

    let res = router.oneshot(authed("GET", &format!("/files/{id}"), "alice")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(res).await["message"], format!("file not found: {id}"));
}
