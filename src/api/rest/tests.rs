use super::{create_router, AppState};
use crate::config::{ApiConfig, StorageConfig};
use crate::db::repositories::InMemoryDetectionStore;
use crate::detector::tests::street_scene;
use crate::services::pipeline::tests::{png_bytes, test_pipeline};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "people-counter-test-boundary";

fn test_router(root: &Path) -> Router {
    let pipeline = test_pipeline(root, street_scene(), Arc::new(InMemoryDetectionStore::new()));
    let storage = StorageConfig {
        upload_dir: root.join("uploads"),
        output_dir: root.join("outputs"),
        ..StorageConfig::default()
    };
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };
    create_router(state, &ApiConfig::default(), &storage)
}

fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        BOUNDARY, field, filename
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload/")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(field, filename, data)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_upload_then_history() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let (status, json) = send_json(&app, upload_request("file", "street.png", &png_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["personCount"], 3);
    let output_path = json["outputImagePath"].as_str().unwrap().to_string();
    assert!(output_path.ends_with("vis_street.png"));

    let (status, json) = send_json(&app, get("/history/?limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["records"].as_array().unwrap().len(), 1);
    assert!(json["total"].as_i64().unwrap() >= 1);
    assert_eq!(json["records"][0]["personCount"], 3);
    assert_eq!(json["records"][0]["outputImagePath"], output_path.as_str());
    assert!(json["records"][0]["id"].is_i64());
    assert!(json["records"][0]["timestamp"].is_string());
}

#[tokio::test]
async fn test_annotated_output_is_served() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let (status, _) = send_json(&app, upload_request("file", "lobby.png", &png_bytes())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/outputs/vis_lobby.png")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(image::load_from_memory(&body).is_ok());
}

#[tokio::test]
async fn test_upload_without_file_field_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let (status, json) = send_json(&app, upload_request("image", "street.png", &png_bytes())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("file"));
}

#[tokio::test]
async fn test_empty_upload_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let (status, _) = send_json(&app, upload_request("file", "empty.png", &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_multipart_upload_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let request = Request::builder()
        .method("POST")
        .uri("/upload/")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_undecodable_upload_is_bad_request_and_not_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let (status, json) = send_json(&app, upload_request("file", "notes.jpg", b"hello")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("Image load error"));

    let (_, json) = send_json(&app, get("/history/")).await;
    assert_eq!(json["total"], 0);
}

#[tokio::test]
async fn test_malformed_start_time_names_parameter() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let (status, json) = send_json(&app, get("/history/?startTime=not-a-date")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("startTime"));
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_inverted_time_range_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());
    send_json(&app, upload_request("file", "street.png", &png_bytes())).await;

    let (status, json) = send_json(
        &app,
        get("/history/?startTime=2030-01-02T00:00:00&endTime=2030-01-01T00:00:00"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 0);
    assert!(json["records"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_history_search_and_pagination() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());
    for name in ["gate_a.png", "gate_b.png", "hall.png"] {
        let (status, _) = send_json(&app, upload_request("file", name, &png_bytes())).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, json) = send_json(&app, get("/history/?search=gate&skip=1&limit=5")).await;
    assert_eq!(json["total"], 2);
    let records = json["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0]["outputImagePath"]
        .as_str()
        .unwrap()
        .ends_with("vis_gate_b.png"));

    let (_, json) = send_json(&app, get("/history")).await;
    assert_eq!(json["total"], 3);
}

#[tokio::test]
async fn test_non_numeric_limit_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let (status, _) = send_json(&app, get("/history/?limit=ten")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let (status, json) = send_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}
