//! OpenID Connect session client
//!
//! This module provides the OIDC capability used by the auth facade:
//!
//! - [`discovery`] -- provider metadata from the well-known document
//! - [`pkce`] -- S256 challenges and random protocol values
//! - [`session`] -- session keys, user sessions and ID token claims
//! - [`store`] -- pending-login and session stores
//! - [`events`] -- lifecycle observers
//! - [`client`] -- the [`SessionClient`] trait and its provider-backed
//!   implementation
//! - [`fake`] -- scriptable test double

use std::time::Duration;

pub mod client;
pub mod discovery;
pub mod events;
pub mod fake;
pub mod pkce;
pub mod session;
pub mod store;

pub use client::{CallbackParams, OidcSessionClient, SessionClient};
pub use events::{SessionEvent, SessionEvents, SilentRenewFailure};
pub use session::{ClaimRow, SessionKey, UserSession};

/// Timeout applied to every provider request
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the HTTP client shared by discovery, token and userinfo calls.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client() -> crate::error::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("tokenview/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(crate::error::TokenviewError::Http)?;
    Ok(client)
}
