//! Error taxonomy and fault classification
//!
//! The PKCS#11 driver layer reports failures either as native `CKR_*` return
//! values or, through some vendor modules, as bare text. Both surfaces are
//! mapped onto one closed set of kinds; callers never see a raw driver fault.

use cryptoki::error::{Error as CryptokiError, RvError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DscError {
    #[error("Incorrect PIN")]
    WrongPin,

    #[error("USB token/dongle not detected")]
    TokenMissing,

    #[error("Token locked due to repeated wrong attempts")]
    TokenLocked,

    #[error("PKCS#11 module failed to load: {0}")]
    LibraryLoad(String),

    #[error("No certificates found in token")]
    NoCertificate,

    #[error("No private keys found in token")]
    NoPrivateKey,

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("{0}")]
    Unknown(String),
}

/// Stable machine-readable tag for each error kind, consumed by the
/// transport layer as the `error_type` field of failure responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    WrongPin,
    DongleMissing,
    TokenLocked,
    Pkcs11LoadError,
    NoCertificate,
    NoPrivateKey,
    SigningFailed,
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::WrongPin => "wrong_pin",
            ErrorKind::DongleMissing => "dongle_missing",
            ErrorKind::TokenLocked => "token_locked",
            ErrorKind::Pkcs11LoadError => "pkcs11_load_error",
            ErrorKind::NoCertificate => "no_certificate",
            ErrorKind::NoPrivateKey => "no_private_key",
            ErrorKind::SigningFailed => "signing_failed",
            ErrorKind::UnknownError => "unknown_error",
        }
    }
}

const WRONG_PIN_PATTERNS: &[&str] = &[
    "wrong pin",
    "incorrect pin",
    "ckr_pin_incorrect",
    "ckr_pin_invalid",
    "bad pin",
    "user pin",
    "invalid pin",
];

const TOKEN_MISSING_PATTERNS: &[&str] = &["token", "dongle", "slot", "not present"];

impl DscError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DscError::WrongPin => ErrorKind::WrongPin,
            DscError::TokenMissing => ErrorKind::DongleMissing,
            DscError::TokenLocked => ErrorKind::TokenLocked,
            DscError::LibraryLoad(_) => ErrorKind::Pkcs11LoadError,
            DscError::NoCertificate => ErrorKind::NoCertificate,
            DscError::NoPrivateKey => ErrorKind::NoPrivateKey,
            DscError::SigningFailed(_) => ErrorKind::SigningFailed,
            DscError::Unknown(_) => ErrorKind::UnknownError,
        }
    }

    /// Classify a free-text driver fault.
    ///
    /// First match wins; the ordering is a contract because messages can match
    /// several buckets (a message carrying both a PIN phrase and a lock phrase
    /// must classify as a PIN rejection). An empty message classifies as a PIN
    /// rejection: some vendor drivers report CKR_PIN_INCORRECT with no text at
    /// all.
    pub fn classify_message(message: &str) -> DscError {
        let normalized = message.trim().to_lowercase();

        if normalized.is_empty() {
            return DscError::WrongPin;
        }
        if WRONG_PIN_PATTERNS.iter().any(|p| normalized.contains(p)) {
            return DscError::WrongPin;
        }
        if TOKEN_MISSING_PATTERNS.iter().any(|p| normalized.contains(p)) {
            return DscError::TokenMissing;
        }
        if normalized.contains("locked") || normalized.contains("too many") {
            return DscError::TokenLocked;
        }
        if normalized.contains("pkcs11") || normalized.contains("pkcs") {
            return DscError::LibraryLoad(message.to_string());
        }

        DscError::Unknown(message.to_string())
    }
}

impl From<CryptokiError> for DscError {
    fn from(err: CryptokiError) -> Self {
        match err {
            // Structured path: cryptoki exposes the native return value, so
            // the common failure modes never go through text matching.
            CryptokiError::Pkcs11(rv, _) => match rv {
                RvError::PinIncorrect
                | RvError::PinInvalid
                | RvError::PinExpired
                | RvError::PinLenRange => DscError::WrongPin,
                RvError::PinLocked => DscError::TokenLocked,
                RvError::TokenNotPresent
                | RvError::TokenNotRecognized
                | RvError::SlotIdInvalid
                | RvError::DeviceRemoved => DscError::TokenMissing,
                other => DscError::classify_message(&other.to_string()),
            },
            CryptokiError::LibraryLoading(e) => DscError::LibraryLoad(e.to_string()),
            other => DscError::classify_message(&other.to_string()),
        }
    }
}
