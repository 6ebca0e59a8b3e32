//! `serve` command: composition root of the web server

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::auth::AuthService;
use crate::config::Config;
use crate::error::Result;
use crate::oidc;
use crate::web::{self, AppState, Diagnostics, WebOptions};

/// Builds the application from `config` and serves it until shutdown.
///
/// # Errors
///
/// Returns an error when OIDC is enabled with an invalid configuration, the
/// listen address cannot be bound, or the server fails.
pub async fn run_serve(config: Config) -> Result<()> {
    let state = build_state(&config)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        auth_enabled = state.auth.is_enabled(),
        "tokenview listening"
    );

    web::serve(listener, state).await
}

/// Wires the auth facade, pages and diagnostics into router state.
///
/// # Errors
///
/// Returns the facade's configuration error, or a template error.
pub fn build_state(config: &Config) -> Result<AppState> {
    let http = oidc::build_http_client()?;
    let auth = Arc::new(AuthService::from_settings(&config.oidc, http.clone())?);

    let resolved = config.oidc.resolve().ok().flatten();
    let diagnostics = Diagnostics {
        config: resolved.as_ref().map(|c| c.redacted()),
        authority: resolved.map(|c| c.authority),
        http,
    };

    Ok(AppState::new(auth, WebOptions::from(&config.server))?.with_diagnostics(diagnostics))
}
