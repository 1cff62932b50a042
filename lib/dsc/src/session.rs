//! Authenticated token session with guaranteed release
//!
//! A [`TokenSession`] owns the underlying cryptoki session for exactly one
//! request-scoped conversation. Release happens in `close` or, failing that,
//! in `Drop`, so every exit path, including panics and early `?` returns,
//! leaves zero open sessions on the device.

use cryptoki::session::{Session, UserType};
use cryptoki::types::AuthPin;
use tracing::debug;

use crate::error::DscError;
use crate::token::{Pkcs11Module, TokenHandle};

pub struct TokenSession {
    session: Option<Session>,
    token_label: String,
}

impl TokenSession {
    /// Open a session against `token` and authenticate with `pin`.
    ///
    /// Sessions are always opened read-write: several vendor tokens reject or
    /// misbehave on read-only sessions, so read operations use the same mode.
    /// On a login failure the half-open session is released before the error
    /// propagates.
    pub fn open(
        module: &Pkcs11Module,
        token: &TokenHandle,
        pin: &str,
    ) -> Result<Self, DscError> {
        debug!(token = %token.label, "opening session");
        let session = module.raw().open_rw_session(token.slot)?;

        if let Err(e) = session.login(UserType::User, Some(&AuthPin::new(pin.into()))) {
            // `session` drops here, closing the unauthenticated session.
            return Err(DscError::from(e));
        }
        debug!(token = %token.label, "session authenticated");

        Ok(Self {
            session: Some(session),
            token_label: token.label.clone(),
        })
    }

    pub fn token_label(&self) -> &str {
        &self.token_label
    }

    pub(crate) fn raw(&self) -> Result<&Session, DscError> {
        self.session
            .as_ref()
            .ok_or_else(|| DscError::Unknown("session already closed".to_string()))
    }

    /// Release the session. Idempotent; safe on a partially-used session.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.logout() {
                debug!("logout before close failed: {e}");
            }
            // Dropping the cryptoki session closes it on the device.
            drop(session);
            debug!(token = %self.token_label, "session closed");
        }
    }
}

impl Drop for TokenSession {
    fn drop(&mut self) {
        self.close();
    }
}
