//! Per-device orchestration of identify and sign conversations
//!
//! One [`TokenDevice`] stands for one physical device path. The driver module
//! is loaded lazily, owned here for the process lifetime, and every
//! open-use-close conversation runs under the device mutex: the hardware
//! cannot service two overlapping sessions, and drivers fail in undefined
//! ways when raced.

use std::sync::Mutex;

use chrono::Local;
use tracing::info;

use crate::certificate::{self, CertificateRecord};
use crate::error::DscError;
use crate::objects;
use crate::session::TokenSession;
use crate::signer::{self, SignatureResult};
use crate::token::{self, Pkcs11Module};

pub struct TokenDevice {
    library_path: String,
    module: Mutex<Option<Pkcs11Module>>,
}

impl TokenDevice {
    pub fn new(library_path: impl Into<String>) -> Self {
        Self {
            library_path: library_path.into(),
            module: Mutex::new(None),
        }
    }

    pub fn library_path(&self) -> &str {
        &self.library_path
    }

    /// Run `operation` with the loaded module, holding the device lock for
    /// the whole conversation.
    fn with_module<T>(
        &self,
        operation: impl FnOnce(&Pkcs11Module) -> Result<T, DscError>,
    ) -> Result<T, DscError> {
        let mut guard = self
            .module
            .lock()
            .map_err(|_| DscError::Unknown("device lock poisoned".to_string()))?;

        if guard.is_none() {
            info!(path = %self.library_path, "loading PKCS#11 module");
            *guard = Some(Pkcs11Module::load(&self.library_path)?);
        }

        match guard.as_ref() {
            Some(module) => operation(module),
            None => Err(DscError::LibraryLoad(
                "module unavailable after load".to_string(),
            )),
        }
    }

    /// Read and parse the signing certificate. No key lookup, no signing.
    ///
    /// Tokens are discovered fresh on every call; the first one found is
    /// used. The session closes before this returns, on success and failure
    /// alike.
    pub fn identify(&self, pin: &str) -> Result<CertificateRecord, DscError> {
        self.with_module(|module| {
            let tokens = token::discover_tokens(module)?;
            let token = tokens.first().ok_or(DscError::TokenMissing)?;
            info!(token = %token.label, "identify request");

            let session = TokenSession::open(module, token, pin)?;
            let der = objects::find_certificate_der(&session)?;
            let record = certificate::parse_certificate(&der);
            // `session` drops here, releasing the device.
            Ok(record)
        })
    }

    /// Sign `document` with the token's private key.
    ///
    /// Locates the signing key and the certificate, parses the certificate
    /// (tolerantly), hashes the document, and requests the signature. The
    /// session closes before this returns on every path.
    pub fn sign_document(
        &self,
        pin: &str,
        document: &[u8],
    ) -> Result<SignatureResult, DscError> {
        self.with_module(|module| {
            let tokens = token::discover_tokens(module)?;
            let token = tokens.first().ok_or(DscError::TokenMissing)?;
            info!(token = %token.label, bytes = document.len(), "sign request");

            let session = TokenSession::open(module, token, pin)?;
            let key = objects::find_signing_key(&session)?;
            let der = objects::find_certificate_der(&session)?;
            let record = certificate::parse_certificate(&der);

            let digest = signer::document_digest(document);
            let signature = signer::sign_digest(&session, key, &digest)?;
            info!(bytes = signature.len(), "document signed");

            Ok(SignatureResult {
                signature,
                signed_at: Local::now().naive_local(),
                certificate: record,
                token_label: session.token_label().to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_identify_with_missing_library_reports_load_error() {
        let device = TokenDevice::new("/nonexistent/path/libpkcs11.so");
        let err = device.identify("0000").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Pkcs11LoadError);
    }

    #[test]
    fn test_sign_with_missing_library_reports_load_error() {
        let device = TokenDevice::new("/nonexistent/path/libpkcs11.so");
        let err = device.sign_document("0000", b"%PDF-1.4").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Pkcs11LoadError);
    }

    #[test]
    fn test_load_failure_is_reported_on_every_attempt() {
        let device = TokenDevice::new("/nonexistent/path/libpkcs11.so");
        for _ in 0..3 {
            let err = device.identify("0000").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Pkcs11LoadError);
        }
    }
}
