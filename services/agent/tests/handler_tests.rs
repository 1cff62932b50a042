#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the agent handlers
//!
//! Covers every path that does not require a physical token: status routes,
//! request validation, filename derivation, and the classified failure
//! surface reachable with a bad driver path or an unreachable upload server.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use dsc_agent::config::AgentConfig;
use dsc_agent::fetch::DocumentFetcher;
use dsc_agent::handlers::{self, AppState};
use dsc_agent::server;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

fn test_config() -> AgentConfig {
    AgentConfig {
        port: 0,
        pkcs11_library: "/nonexistent/path/libpkcs11.so".to_string(),
        // Port 9 (discard) refuses connections on loopback.
        document_base_url: "http://127.0.0.1:9/uploads/unsigned_docs/".to_string(),
        signed_docs_dir: std::env::temp_dir().join("dsc-agent-tests"),
        default_pin: "12345678".to_string(),
        auto_fetch: true,
    }
}

fn app_with_config(config: AgentConfig) -> Router {
    let state = Arc::new(AppState {
        device: Arc::new(dsc::TokenDevice::new(config.pkcs11_library.clone())),
        fetcher: DocumentFetcher::new(&config.document_base_url).unwrap(),
        config,
    });
    server::create_router(state)
}

fn test_app() -> Router {
    app_with_config(test_config())
}

fn inline_document_app() -> Router {
    let config = AgentConfig {
        auto_fetch: false,
        ..test_config()
    };
    app_with_config(config)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ==================== Status Routes ====================

#[tokio::test]
async fn test_index_serves_status_page() {
    let response = test_app()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("Digital Signature Agent is Running"));
}

#[tokio::test]
async fn test_status_reports_running() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "running");
    assert_eq!(json["os"], std::env::consts::OS);
}

// ==================== Sign Request Validation ====================

#[tokio::test]
async fn test_sign_without_pin_is_rejected() {
    let response = test_app()
        .oneshot(json_request(
            "/sign-pdf",
            serde_json::json!({ "pdf_filename": "doc.pdf" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "missing_pin");
    assert_eq!(json["error"], "PIN is required");
}

#[tokio::test]
async fn test_sign_without_filename_is_rejected() {
    let response = test_app()
        .oneshot(json_request(
            "/sign-pdf",
            serde_json::json!({ "pin": "12345678" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "missing_pdf_file");
}

#[tokio::test]
async fn test_sign_with_empty_body_is_rejected() {
    let response = test_app()
        .oneshot(json_request("/sign-pdf", serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "missing_pin");
}

#[tokio::test]
async fn test_sign_with_unreachable_upload_server_is_a_signing_failure() {
    let response = test_app()
        .oneshot(json_request(
            "/sign-pdf",
            serde_json::json!({ "pin": "12345678", "pdf_filename": "doc.pdf" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "signing_failed");
}

// ==================== Inline Document Path ====================

#[tokio::test]
async fn test_inline_sign_rejects_non_pdf_content() {
    use base64::Engine;

    let encoded = base64::engine::general_purpose::STANDARD.encode(b"plain text, not a pdf");
    let response = inline_document_app()
        .oneshot(json_request(
            "/sign-pdf",
            serde_json::json!({
                "pin": "12345678",
                "pdf_filename": "doc.pdf",
                "pdf_base64": encoded,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "missing_pdf_file");
}

#[tokio::test]
async fn test_inline_sign_with_valid_magic_reaches_the_device_layer() {
    use base64::Engine;

    let encoded = base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.4 minimal");
    let response = inline_document_app()
        .oneshot(json_request(
            "/sign-pdf",
            serde_json::json!({
                "pin": "12345678",
                "pdf_filename": "doc.pdf",
                "pdf_base64": encoded,
            }),
        ))
        .await
        .unwrap();

    // Validation passed; the failure is the driver path, not the request.
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "pkcs11_load_error");
}

// ==================== Classified Failure Surface ====================

#[tokio::test]
async fn test_cert_info_with_bad_driver_path_is_a_load_error() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/cert-info?pin=12345678")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "pkcs11_load_error");
}

#[tokio::test]
async fn test_cert_info_without_pin_uses_the_fallback_pin() {
    // No PIN anywhere in the request; the handler must still reach the
    // device layer (and fail on the driver path, not on validation).
    let response = test_app()
        .oneshot(json_request("/cert-info", serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "pkcs11_load_error");
}

// ==================== Output Filename Derivation ====================

#[test]
fn test_output_filename_strips_upload_prefix() {
    assert_eq!(
        handlers::derive_output_filename("unsingedDoc_contract42.pdf"),
        "signedDoc_contract42.pdf"
    );
}

#[test]
fn test_output_filename_without_prefix_is_kept() {
    assert_eq!(
        handlers::derive_output_filename("report.pdf"),
        "signedDoc_report.pdf"
    );
}

#[test]
fn test_output_filename_handles_missing_extension() {
    assert_eq!(
        handlers::derive_output_filename("unsingedDoc_lease"),
        "signedDoc_lease.pdf"
    );
}

#[test]
fn test_output_filename_never_collapses_to_empty() {
    assert_eq!(
        handlers::derive_output_filename("unsingedDoc_.pdf"),
        "signedDoc_document.pdf"
    );
}
