//! tokenview - OpenID Connect token viewer library
//!
//! This library provides the pieces of the token viewer: a session client
//! speaking the OIDC authorization code flow, an auth facade that tolerates a
//! disabled or misconfigured provider, and the web shell that guards the
//! token view and completes logins.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `oidc`: Session client, discovery, PKCE, ID token checks and session stores
//! - `auth`: Auth facade over an optional session client
//! - `web`: Router, route guard, callback handler, pages and assets
//! - `config`: Configuration loading, environment overrides and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: CLI command handlers
//!
//! # Example
//!
//! ```no_run
//! use tokenview::{AuthService, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let http = tokenview::oidc::build_http_client()?;
//!     let auth = AuthService::from_settings(&config.oidc, http)?;
//!     if let Some(url) = auth.login().await? {
//!         println!("Visit {url}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod oidc;
pub mod web;

// Re-export commonly used types
pub use auth::AuthService;
pub use config::Config;
pub use error::{Result, TokenviewError};
pub use oidc::{SessionClient, SessionKey, UserSession};
