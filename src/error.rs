//! Error types for tokenview
//!
//! This module defines the error kinds raised by the OIDC session lifecycle,
//! configuration loading, and the web shell, using `thiserror` for ergonomic
//! error handling.

use thiserror::Error;

/// Main error type for tokenview operations
///
/// Callers that need to react to a specific failure kind (for example the
/// callback handler distinguishing a provider rejection from a state
/// mismatch) downcast the `anyhow::Error` returned by [`Result`] to this
/// type.
#[derive(Error, Debug)]
pub enum TokenviewError {
    /// Configuration-related errors (missing or malformed settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider discovery document could not be fetched or parsed
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Building the authorization redirect failed
    #[error("Login error: {0}")]
    Login(String),

    /// Callback parameters are missing, stale, or do not match a pending login
    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    /// The provider redirected back with an OAuth error response
    #[error("Provider returned error: {error} ({})", .description.as_deref().unwrap_or("no description"))]
    ProviderRejected {
        /// The `error` code sent by the provider (e.g. `access_denied`)
        error: String,
        /// The optional `error_description` sent by the provider
        description: Option<String>,
    },

    /// Authorization code or refresh token exchange failed
    #[error("Token exchange error: {0}")]
    TokenExchange(String),

    /// Session lookup or monitoring failed
    #[error("Session error: {0}")]
    Session(String),

    /// Building the end-session redirect failed
    #[error("Logout error: {0}")]
    Logout(String),

    /// Page template registration or rendering failed
    #[error("Template error: {0}")]
    Template(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for tokenview operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
