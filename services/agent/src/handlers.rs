//! Agent REST API handlers
//!
//! Every failure response carries `{error, error_type}` where `error_type` is
//! a stable machine tag; raw driver faults never reach the caller.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use base64::Engine;
use dsc::{CertificateRecord, DscError, ErrorKind, TokenDevice};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::AgentConfig;
use crate::fetch::{DocumentFetcher, FetchError};
use crate::stamp::{self, StampError};

/// Shared application state
pub struct AppState {
    pub device: Arc<TokenDevice>,
    pub fetcher: DocumentFetcher,
    pub config: AgentConfig,
}

// ==================== Request / Response Types ====================

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub os: &'static str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertInfoRequest {
    pub pin: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificateInfo {
    pub subject_cn: String,
    pub serial_number: String,
    pub issuer_cn: String,
    pub thumbprint: String,
    pub not_before: String,
    pub not_after: String,
}

impl From<&CertificateRecord> for CertificateInfo {
    fn from(record: &CertificateRecord) -> Self {
        Self {
            subject_cn: record.subject_cn.clone(),
            serial_number: record.serial_number.clone(),
            issuer_cn: record.issuer_cn.clone(),
            thumbprint: record.thumbprint.clone(),
            not_before: record.not_before.format("%Y-%m-%dT%H:%M:%S").to_string(),
            not_after: record.not_after.format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CertInfoResponse {
    pub status: &'static str,
    pub certificates: CertificateInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignPdfRequest {
    pub pin: Option<String>,
    pub pdf_filename: Option<String>,
    /// Inline document, used only when auto-fetch is disabled.
    pub pdf_base64: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignPdfResponse {
    pub status: &'static str,
    pub message: &'static str,
    /// Stamped document, base64 encoded.
    pub signed_pdf: String,
    pub original_filename: String,
    pub output_filename: String,
    pub saved_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_type: String,
}

// ==================== Error Handling ====================

pub struct ApiError(pub StatusCode, pub Json<ErrorBody>);

impl ApiError {
    pub fn bad_request(msg: impl Into<String>, error_type: &str) -> Self {
        ApiError(
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: msg.into(),
                error_type: error_type.to_string(),
            }),
        )
    }

    pub fn not_found(msg: impl Into<String>, error_type: &str) -> Self {
        ApiError(
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: msg.into(),
                error_type: error_type.to_string(),
            }),
        )
    }

    pub fn internal(msg: impl Into<String>, error_type: &str) -> Self {
        ApiError(
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: msg.into(),
                error_type: error_type.to_string(),
            }),
        )
    }
}

impl From<DscError> for ApiError {
    fn from(e: DscError) -> Self {
        let kind = e.kind();
        let status = match kind {
            ErrorKind::WrongPin
            | ErrorKind::DongleMissing
            | ErrorKind::TokenLocked
            | ErrorKind::NoCertificate
            | ErrorKind::NoPrivateKey => StatusCode::BAD_REQUEST,
            ErrorKind::Pkcs11LoadError
            | ErrorKind::SigningFailed
            | ErrorKind::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(
            status,
            Json(ErrorBody {
                error: e.to_string(),
                error_type: kind.as_str().to_string(),
            }),
        )
    }
}

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::NotFound(name) => ApiError::not_found(
                format!("PDF file not found on server: {name}"),
                "pdf_not_found",
            ),
            other => ApiError::internal(other.to_string(), "signing_failed"),
        }
    }
}

impl From<StampError> for ApiError {
    fn from(e: StampError) -> Self {
        ApiError::internal(e.to_string(), "signing_failed")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

// ==================== Handlers ====================

/// Minimal status page so a user can check the agent is alive in a browser.
pub async fn index() -> Html<&'static str> {
    Html(
        "<html>\
         <head><title>Digital Signature Agent</title></head>\
         <body>\
         <h1>Digital Signature Agent is Running</h1>\
         <p>Service is active</p>\
         <p>Close this window to stop the service</p>\
         </body>\
         </html>",
    )
}

pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running",
        os: std::env::consts::OS,
    })
}

/// Certificate identification via GET, PIN in the query string.
pub async fn cert_info_query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CertInfoRequest>,
) -> Result<Json<CertInfoResponse>, ApiError> {
    cert_info(&state, params.pin)
}

/// Certificate identification via POST, PIN in the JSON body. A missing or
/// malformed body is treated as an absent PIN.
pub async fn cert_info_json(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CertInfoRequest>>,
) -> Result<Json<CertInfoResponse>, ApiError> {
    cert_info(&state, body.and_then(|Json(b)| b.pin))
}

fn cert_info(
    state: &AppState,
    pin: Option<String>,
) -> Result<Json<CertInfoResponse>, ApiError> {
    let pin = match pin.filter(|p| !p.is_empty()) {
        Some(pin) => pin,
        None => state.config.default_pin.clone(),
    };
    info!("certificate info request received");

    let record = state.device.identify(&pin)?;
    Ok(Json(CertInfoResponse {
        status: "success",
        certificates: CertificateInfo::from(&record),
    }))
}

/// Sign a PDF: acquire the document, sign on the token, stamp the visible
/// overlay, persist the output, and return it base64 encoded.
pub async fn sign_pdf(
    State(state): State<Arc<AppState>>,
    body: Option<Json<SignPdfRequest>>,
) -> Result<Json<SignPdfResponse>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();

    let pin = request
        .pin
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("PIN is required", "missing_pin"))?;
    let filename = request
        .pdf_filename
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("PDF filename missing", "missing_pdf_file"))?;

    info!(%filename, "sign request received");

    let document = if state.config.auto_fetch {
        state.fetcher.fetch(&filename).await?
    } else {
        inline_document(request.pdf_base64)?
    };

    let result = state.device.sign_document(&pin, &document)?;
    let stamped = stamp::apply_visible_signature(&document, &result)?;

    let output_filename = derive_output_filename(&filename);
    let saved_path = state.config.signed_docs_dir.join(&output_filename);
    tokio::fs::write(&saved_path, &stamped).await.map_err(|e| {
        ApiError::internal(
            format!("Failed to save signed document: {e}"),
            "signing_failed",
        )
    })?;
    info!(path = %saved_path.display(), "signed document saved");

    Ok(Json(SignPdfResponse {
        status: "success",
        message: "PDF signed successfully",
        signed_pdf: base64::engine::general_purpose::STANDARD.encode(&stamped),
        original_filename: filename,
        output_filename,
        saved_path: saved_path.display().to_string(),
    }))
}

fn inline_document(encoded: Option<String>) -> Result<Vec<u8>, ApiError> {
    let encoded = encoded
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing PDF data", "missing_pdf_file"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| {
            ApiError::bad_request(format!("Invalid base64 PDF data: {e}"), "missing_pdf_file")
        })?;
    if !bytes.starts_with(b"%PDF") {
        return Err(ApiError::bad_request(
            "Uploaded content is not a valid PDF file",
            "missing_pdf_file",
        ));
    }
    Ok(bytes)
}

/// Derive the output name: drop the extension, strip the upload service's
/// literal `unsingedDoc_` prefix, and emit `signedDoc_<stem>.pdf`.
pub fn derive_output_filename(input: &str) -> String {
    let stem = std::path::Path::new(input)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(input);
    let cleaned = stem.replace("unsingedDoc_", "");
    let cleaned = if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    };
    format!("signedDoc_{cleaned}.pdf")
}
