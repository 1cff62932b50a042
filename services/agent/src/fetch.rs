//! Remote document fetcher
//!
//! Pulls unsigned PDFs by filename from the configured upload server. The
//! 30-second timeout is the boundary the rest of the system expects; hardware
//! calls have no timeout of their own.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("PDF file not found on server: {0}")]
    NotFound(String),

    #[error("Downloaded content is not a valid PDF file")]
    InvalidDocument,

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),
}

pub struct DocumentFetcher {
    client: Client,
    base_url: String,
}

impl DocumentFetcher {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let base_url = format!("{}/", base_url.trim_end_matches('/'));
        Ok(Self { client, base_url })
    }

    /// Fetch `filename` from the upload server, appending ".pdf" when the
    /// name carries no extension, and validate the PDF magic.
    pub async fn fetch(&self, filename: &str) -> Result<Vec<u8>, FetchError> {
        let mut name = filename.to_string();
        if !name.to_lowercase().ends_with(".pdf") {
            name.push_str(".pdf");
        }

        let url = format!("{}{}", self.base_url, name);
        info!(%url, "fetching document");

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(name));
        }
        let response = response.error_for_status()?;
        let bytes = response.bytes().await?;

        if !bytes.starts_with(b"%PDF") {
            return Err(FetchError::InvalidDocument);
        }

        info!(bytes = bytes.len(), "document fetched");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized_with_trailing_slash() {
        let fetcher = DocumentFetcher::new("http://example.invalid/uploads").unwrap();
        assert_eq!(fetcher.base_url, "http://example.invalid/uploads/");

        let fetcher = DocumentFetcher::new("http://example.invalid/uploads/").unwrap();
        assert_eq!(fetcher.base_url, "http://example.invalid/uploads/");
    }

    #[tokio::test]
    async fn test_fetch_against_unreachable_server_is_an_http_error() {
        // Port 9 (discard) refuses connections on loopback.
        let fetcher = DocumentFetcher::new("http://127.0.0.1:9/uploads/").unwrap();
        let err = fetcher.fetch("doc.pdf").await.unwrap_err();
        assert!(matches!(err, FetchError::Http(_)));
    }
}
