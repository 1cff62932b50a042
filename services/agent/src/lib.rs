//! Digital Signature Agent
//!
//! Localhost HTTP service that bridges a browser application to a PKCS#11
//! USB signature token. Exposes certificate identification and PDF signing;
//! signed documents receive a visible stamp overlay and are written to a
//! local output directory.

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

pub mod config;
pub mod fetch;
pub mod handlers;
pub mod server;
pub mod stamp;

pub use config::AgentConfig;
pub use server::run;
