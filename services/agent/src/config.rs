//! Environment-driven agent configuration

use std::env;
use std::path::PathBuf;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Port to bind on 127.0.0.1.
    pub port: u16,
    /// Path to the vendor PKCS#11 driver module.
    pub pkcs11_library: String,
    /// Base URL the unsigned documents are fetched from.
    pub document_base_url: String,
    /// Directory signed documents are written to.
    pub signed_docs_dir: PathBuf,
    /// PIN used by `/cert-info` when the request carries none. The deployed
    /// web front-end relies on this fallback; override or set empty handling
    /// via `AGENT_DEFAULT_PIN`.
    pub default_pin: String,
    /// Fetch documents by filename from `document_base_url` (default). When
    /// disabled, `/sign-pdf` requires the document inline as `pdf_base64`.
    pub auto_fetch: bool,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, String> {
        let port = env::var("AGENT_PORT")
            .unwrap_or_else(|_| "5001".to_string())
            .parse()
            .map_err(|e| format!("AGENT_PORT must be a valid number: {e}"))?;

        let pkcs11_library = env::var("PKCS11_LIBRARY")
            .unwrap_or_else(|_| default_library_path().to_string());

        let document_base_url = env::var("DOCUMENT_BASE_URL")
            .unwrap_or_else(|_| "http://10.10.1.13/uploads/unsigned_docs/".to_string());

        let signed_docs_dir: PathBuf = env::var("SIGNED_DOCS_DIR")
            .unwrap_or_else(|_| "signed_docs".to_string())
            .into();

        let default_pin =
            env::var("AGENT_DEFAULT_PIN").unwrap_or_else(|_| "12345678".to_string());

        let auto_fetch = env::var("AGENT_AUTO_FETCH")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        Ok(Self {
            port,
            pkcs11_library,
            document_base_url,
            signed_docs_dir,
            default_pin,
            auto_fetch,
        })
    }
}

#[cfg(windows)]
fn default_library_path() -> &'static str {
    r"C:\Windows\System32\Watchdata\PROXKey CSP India V3.0\wdpkcs.dll"
}

#[cfg(not(windows))]
fn default_library_path() -> &'static str {
    "/usr/lib/softhsm/libsofthsm2.so"
}
