//! Driver module loading and token discovery

use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::error::{Error as CryptokiError, RvError};
use cryptoki::slot::Slot;
use tracing::debug;

use crate::error::DscError;

/// An owned, initialized PKCS#11 driver module.
///
/// Loaded once and reused for the lifetime of the process instead of being
/// re-loaded per request; vendor modules do not tolerate repeated
/// initialization from concurrent callers.
pub struct Pkcs11Module {
    inner: Pkcs11,
}

impl Pkcs11Module {
    /// Load and initialize the driver at `library_path`.
    ///
    /// Any load or initialization failure maps to [`DscError::LibraryLoad`],
    /// which is distinct from "no token inserted" so callers can tell a wrong
    /// path apart from an unplugged device.
    pub fn load(library_path: &str) -> Result<Self, DscError> {
        debug!(path = library_path, "loading PKCS#11 module");
        let inner =
            Pkcs11::new(library_path).map_err(|e| DscError::LibraryLoad(e.to_string()))?;

        match inner.initialize(CInitializeArgs::OsThreads) {
            Ok(()) => {}
            // Another component of this process already initialized the
            // module; it is usable as-is.
            Err(CryptokiError::Pkcs11(RvError::CryptokiAlreadyInitialized, _)) => {}
            Err(e) => return Err(DscError::LibraryLoad(e.to_string())),
        }

        Ok(Self { inner })
    }

    pub(crate) fn raw(&self) -> &Pkcs11 {
        &self.inner
    }
}

/// One inserted token, identified during discovery.
#[derive(Debug, Clone)]
pub struct TokenHandle {
    pub slot: Slot,
    pub slot_index: usize,
    pub label: String,
}

/// Enumerate all slots and return the tokens found, in slot order.
///
/// A slot whose token info cannot be read is treated as empty and skipped;
/// discovery never aborts on a single bad slot. Returns
/// [`DscError::TokenMissing`] when enumeration succeeds but no slot carries a
/// token. When several tokens are attached the caller is expected to use the
/// first entry; there is no selection mechanism.
pub fn discover_tokens(module: &Pkcs11Module) -> Result<Vec<TokenHandle>, DscError> {
    let slots = module.raw().get_all_slots()?;
    debug!(count = slots.len(), "enumerated slots");

    let mut tokens = Vec::new();
    for (slot_index, slot) in slots.into_iter().enumerate() {
        match module.raw().get_token_info(slot) {
            Ok(info) => {
                let label = info.label().trim_end().to_string();
                debug!(slot = slot_index, label = %label, "token present");
                tokens.push(TokenHandle {
                    slot,
                    slot_index,
                    label,
                });
            }
            Err(e) => {
                debug!(slot = slot_index, "no token in slot: {e}");
            }
        }
    }

    if tokens.is_empty() {
        return Err(DscError::TokenMissing);
    }
    Ok(tokens)
}
