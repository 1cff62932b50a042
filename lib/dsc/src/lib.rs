//! DSC token core
//!
//! Talks to a PKCS#11 USB signature token via cryptoki: slot/token discovery,
//! authenticated session lifecycle, certificate and signing-key lookup,
//! hash-and-sign, and classification of the driver's failure surface into a
//! closed error taxonomy.
//!
//! The session is the only resource with scoped-acquisition semantics here;
//! [`TokenSession`] releases it on every exit path, including unwinding.

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

pub mod certificate;
pub mod device;
pub mod error;
pub mod objects;
pub mod session;
pub mod signer;
pub mod token;

pub use certificate::{parse_certificate, CertificateRecord};
pub use device::TokenDevice;
pub use error::{DscError, ErrorKind};
pub use session::TokenSession;
pub use signer::SignatureResult;
pub use token::{discover_tokens, Pkcs11Module, TokenHandle};
