//! Hash-and-sign operation

use chrono::NaiveDateTime;
use cryptoki::mechanism::Mechanism;
use cryptoki::object::ObjectHandle;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::certificate::CertificateRecord;
use crate::error::DscError;
use crate::session::TokenSession;

/// The outcome of one sign operation over one document.
#[derive(Debug, Clone)]
pub struct SignatureResult {
    /// Raw signature bytes as produced by the token.
    pub signature: Vec<u8>,
    pub signed_at: NaiveDateTime,
    pub certificate: CertificateRecord,
    pub token_label: String,
}

/// SHA-256 over the full document content.
///
/// The token signs this fixed-size digest, not the raw document; hardware
/// signing primitives cannot stream arbitrarily large payloads.
pub fn document_digest(document: &[u8]) -> [u8; 32] {
    Sha256::digest(document).into()
}

/// Request a signature over `digest` from `key`, using SHA-256 with RSA
/// PKCS#1 v1.5 padding. The mechanism is fixed, not negotiated.
pub fn sign_digest(
    session: &TokenSession,
    key: ObjectHandle,
    digest: &[u8],
) -> Result<Vec<u8>, DscError> {
    debug!(bytes = digest.len(), "requesting signature");
    session
        .raw()?
        .sign(&Mechanism::Sha256RsaPkcs, key, digest)
        .map_err(|e| match DscError::from(e) {
            // A fault at the sign step that classifies as nothing more
            // specific is a signing failure, not an unknown error.
            DscError::Unknown(message) => DscError::SigningFailed(message),
            classified => classified,
        })
}
