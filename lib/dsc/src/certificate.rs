//! Display-safe certificate parsing
//!
//! `parse_certificate` is a total function: whatever the input, it returns a
//! record whose scalar fields are non-empty strings and whose validity bounds
//! are defined. Certificate metadata is supplementary display information and
//! must never abort an operation that already succeeded cryptographically, so
//! decoding failures degrade to placeholder values instead of errors.

use chrono::{DateTime, Local, NaiveDateTime};
use sha2::{Digest, Sha256};
use tracing::warn;
use x509_parser::prelude::*;

/// Parsed identity and validity fields of an X.509 certificate.
///
/// Validity bounds are naive UTC timestamps taken from the certificate; the
/// fallback value for an unreadable bound is the local clock at parse time,
/// which makes a certificate without a readable window compare as expired
/// under `not_after > now`.
#[derive(Debug, Clone)]
pub struct CertificateRecord {
    /// Raw DER bytes as read from the token.
    pub der: Vec<u8>,
    pub subject_cn: String,
    pub issuer_cn: String,
    /// Serial number rendered as a decimal string.
    pub serial_number: String,
    pub not_before: NaiveDateTime,
    pub not_after: NaiveDateTime,
    /// SHA-256 over the raw DER, hex-encoded. "N/A" only for empty input.
    pub thumbprint: String,
}

pub fn parse_certificate(der: &[u8]) -> CertificateRecord {
    let now = Local::now().naive_local();

    if der.is_empty() {
        return CertificateRecord {
            der: Vec::new(),
            subject_cn: "No Certificate Data".to_string(),
            issuer_cn: "N/A".to_string(),
            serial_number: "N/A".to_string(),
            not_before: now,
            not_after: now,
            thumbprint: "N/A".to_string(),
        };
    }

    // The thumbprint only needs the raw bytes, so it survives a failed parse.
    let thumbprint = hex::encode(Sha256::digest(der));

    match X509Certificate::from_der(der) {
        Ok((_, cert)) => {
            let subject_cn =
                common_name(cert.subject(), "No Common Name Found", "Error Converting CN");
            let issuer_cn = common_name(
                cert.issuer(),
                "No Issuer CN Found",
                "Error Converting Issuer CN",
            );
            let serial_number = cert.tbs_certificate.serial.to_string();
            let not_before = to_naive(&cert.validity().not_before).unwrap_or(now);
            let not_after = to_naive(&cert.validity().not_after).unwrap_or(now);

            CertificateRecord {
                der: der.to_vec(),
                subject_cn,
                issuer_cn,
                serial_number,
                not_before,
                not_after,
                thumbprint,
            }
        }
        Err(e) => {
            warn!("could not parse certificate: {e}");
            CertificateRecord {
                der: der.to_vec(),
                subject_cn: "Certificate Parse Error".to_string(),
                issuer_cn: "N/A".to_string(),
                serial_number: "N/A".to_string(),
                not_before: now,
                not_after: now,
                thumbprint,
            }
        }
    }
}

/// First common-name attribute of a subject/issuer, with distinct placeholders
/// for "absent" and "present but not convertible to text".
fn common_name(name: &X509Name<'_>, absent: &str, unconvertible: &str) -> String {
    match name.iter_common_name().next() {
        Some(attribute) => match attribute.as_str() {
            Ok(value) => value.to_string(),
            Err(_) => unconvertible.to_string(),
        },
        None => absent.to_string(),
    }
}

fn to_naive(time: &ASN1Time) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(time.timestamp(), 0).map(|dt| dt.naive_utc())
}
