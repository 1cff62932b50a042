//! Certificate and signing-key lookup within an open session

use cryptoki::object::{Attribute, AttributeType, ObjectClass, ObjectHandle};
use tracing::{debug, warn};

use crate::error::DscError;
use crate::session::TokenSession;

/// Locate the first certificate object and return its raw DER bytes.
///
/// Tokens carrying several certificates are not disambiguated; the first one
/// in enumeration order wins.
pub fn find_certificate_der(session: &TokenSession) -> Result<Vec<u8>, DscError> {
    let raw = session.raw()?;

    let certificates = raw.find_objects(&[Attribute::Class(ObjectClass::CERTIFICATE)])?;
    debug!(count = certificates.len(), "certificate objects found");

    let first = certificates
        .first()
        .copied()
        .ok_or(DscError::NoCertificate)?;

    let attributes = raw.get_attributes(first, &[AttributeType::Value])?;
    for attribute in attributes {
        if let Attribute::Value(der) = attribute {
            debug!(bytes = der.len(), "certificate value read");
            return Ok(der);
        }
    }

    Err(DscError::Unknown(
        "certificate object carries no value attribute".to_string(),
    ))
}

/// Locate a private key usable for signing.
///
/// Every private key's sign capability is read defensively: a key whose
/// attribute cannot be read is skipped rather than failing the search. When
/// no key verifiably advertises the capability, the first private key is used
/// anyway; some tokens withhold the attribute from keys that sign fine.
pub fn find_signing_key(session: &TokenSession) -> Result<ObjectHandle, DscError> {
    let raw = session.raw()?;

    let keys = raw.find_objects(&[Attribute::Class(ObjectClass::PRIVATE_KEY)])?;
    debug!(count = keys.len(), "private key objects found");

    if keys.is_empty() {
        return Err(DscError::NoPrivateKey);
    }

    for &key in &keys {
        match raw.get_attributes(key, &[AttributeType::Sign]) {
            Ok(attributes) => {
                if attributes
                    .iter()
                    .any(|a| matches!(a, Attribute::Sign(true)))
                {
                    debug!("signing-capable key selected");
                    return Ok(key);
                }
            }
            Err(e) => {
                debug!("could not read sign capability: {e}");
            }
        }
    }

    warn!("no key advertises signing capability, falling back to the first private key");
    Ok(keys[0])
}
