//! Router tests for the catalog HTTP API

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use catalog_registry::{MemoryProvisioner, Registry};
use catalog_server::{AppState, ErrorResponse, create_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    router: Router,
    provisioner: Arc<MemoryProvisioner>,
}

async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let provisioner = Arc::new(MemoryProvisioner::new());
    let registry = Registry::open(dir.path().join("catalog.json"), provisioner.clone()).await;
    let router = create_router(AppState::new(Arc::new(registry)));
    TestApp {
        _dir: dir,
        router,
        provisioner,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn send_text(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, String::from_utf8(bytes).unwrap())
}

#[tokio::test]
async fn test_create_then_read_service() {
    let app = test_app().await;

    let (status, text) = send_text(
        &app.router,
        "POST",
        "/services",
        Some(json!({"ID": 1, "serviceName": "X"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Service with ID 1 has been added");

    let (status, body) = send_json(&app.router, "GET", "/services/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"]["ID"], json!(1));
    assert_eq!(body["service"]["serviceName"], json!("X"));
    assert!(body["service"]["last_update"].is_f64());

    let (status, body) = send_json(&app.router, "GET", "/services", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["services"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_requests_are_rejected() {
    let app = test_app().await;

    let (status, body) = send_json(&app.router, "GET", "/devices/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.code, "VALIDATION_ERROR");

    let (status, _) = send(
        &app.router,
        "POST",
        "/services",
        Some(json!({"serviceName": "no id"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/services")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app.router,
        "PUT",
        "/devices",
        Some(json!({"ID": 1, "patientID": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_records_and_owners_are_not_found() {
    let app = test_app().await;

    let (status, _) = send(&app.router, "GET", "/patients/5", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send_json(
        &app.router,
        "POST",
        "/devices",
        Some(json!({"ID": 10, "deviceType": "oximeter", "patientID": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("NOT_FOUND"));

    let (status, _) = send(&app.router, "DELETE", "/services/3", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_ids_conflict() {
    let app = test_app().await;
    let service = json!({"ID": 1, "serviceName": "bot"});

    let (status, _) = send(&app.router, "POST", "/services", Some(service.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(&app.router, "POST", "/services", Some(service)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], json!("CONFLICT"));
}

#[tokio::test]
async fn test_patient_lifecycle_with_devices() {
    let app = test_app().await;

    let (status, text) = send_text(
        &app.router,
        "POST",
        "/patients",
        Some(json!({"ID": 5, "name": "Ada", "surname": "Lovelace", "age": 36})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", text);

    let (status, text) = send_text(
        &app.router,
        "POST",
        "/devices",
        Some(json!({"ID": "10", "deviceType": "oximeter", "patientID": "5", "measureType": "spo2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Device with ID 10 has been added to patient with ID 5");

    let (_, body) = send_json(&app.router, "GET", "/patients/5", None).await;
    assert_eq!(body["patient"]["devices"], json!([10]));
    assert!(body["patient"]["thingspeak_info"]["write_api_key"].is_string());

    let (_, body) = send_json(&app.router, "GET", "/devices/10", None).await;
    assert_eq!(body["device"]["measureType"], json!("spo2"));

    let (status, _) = send(
        &app.router,
        "PUT",
        "/devices",
        Some(json!({"ID": 10, "deviceType": "oximeter", "patientID": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, text) = send_text(&app.router, "DELETE", "/patients/5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        text,
        "Patient with ID 5 has been removed along with 1 associated records"
    );

    let (status, _) = send(&app.router, "GET", "/devices/10", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_provisioning_leaves_no_patient() {
    let app = test_app().await;
    app.provisioner.set_failing(true);

    let (status, body) = send_json(
        &app.router,
        "POST",
        "/patients",
        Some(json!({"ID": 1, "name": "Ada", "surname": "Lovelace"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], json!("UPSTREAM_ERROR"));

    let (_, body) = send_json(&app.router, "GET", "/patients", None).await;
    assert_eq!(body["patients"], json!([]));
}

#[tokio::test]
async fn test_chats_and_full_catalog() {
    let app = test_app().await;

    let (status, _) = send(&app.router, "POST", "/chats", Some(json!({"ID": 123456789}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(&app.router, "GET", "/chats/123456789", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chat"]["ID"], json!("123456789"));

    let (status, body) = send_json(&app.router, "GET", "/all", None).await;
    assert_eq!(status, StatusCode::OK);
    for key in ["devices", "services", "patients", "medications", "chats"] {
        assert!(body[key].is_array(), "missing {}", key);
    }
    assert_eq!(body["chats"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app.router, "DELETE", "/chats/123456789", None).await;
    assert_eq!(status, StatusCode::OK);
}
