//! Web shell: router, pages, cookies and assets
//!
//! The router serves the viewer pages and drives the auth facade:
//!
//! | Route       | Behavior                                             |
//! |-------------|------------------------------------------------------|
//! | `GET /`         | entry document                                   |
//! | `GET /login`    | redirect to the provider                         |
//! | `GET /callback` | complete login, then `/token` or `/`             |
//! | `GET /token`    | guarded claims and tokens view                   |
//! | `POST /logout`  | end session, redirect to provider or `/`         |
//! | `GET /debug`    | diagnostics when enabled                         |
//! | anything else   | embedded asset or the entry document             |

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use url::Url;

use crate::auth::AuthService;
use crate::config::ServerConfig;
use crate::error::Result;

pub mod assets;
pub mod callback;
pub mod cookies;
pub mod guard;
pub mod handlers;
pub mod pages;
pub mod routes;

pub use callback::{CallbackHandler, CallbackOutcome};
pub use guard::{GuardOutcome, ProtectedSession, RouteGuard};
pub use pages::Pages;
pub use routes::Route;

/// Body of every 500 response
pub const ERROR_PAGE: &str = "Error loading application";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Server options that affect responses
#[derive(Debug, Clone, Copy, Default)]
pub struct WebOptions {
    pub secure_cookies: bool,
    pub debug_page: bool,
}

impl From<&ServerConfig> for WebOptions {
    fn from(server: &ServerConfig) -> Self {
        Self {
            secure_cookies: server.secure_cookies,
            debug_page: server.debug_page,
        }
    }
}

/// What the debug page may show
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// Redacted effective OIDC configuration
    pub config: Option<serde_json::Value>,
    /// Authority to probe
    pub authority: Option<Url>,
    pub http: reqwest::Client,
}

/// Shared router state
#[derive(Debug, Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub pages: Arc<Pages>,
    pub options: WebOptions,
    pub diagnostics: Arc<Diagnostics>,
}

impl AppState {
    /// # Errors
    ///
    /// Returns an error if the page templates fail to compile.
    pub fn new(auth: Arc<AuthService>, options: WebOptions) -> Result<Self> {
        Ok(Self {
            auth,
            pages: Arc::new(Pages::new()?),
            options,
            diagnostics: Arc::new(Diagnostics::default()),
        })
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Arc::new(diagnostics);
        self
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Handler failure, answered with a generic 500 page
#[derive(Debug)]
pub struct WebError(anyhow::Error);

impl<E> From<E> for WebError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "Request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, ERROR_PAGE).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router and server
// ---------------------------------------------------------------------------

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(Route::Home.path(), get(handlers::home))
        .route(Route::Login.path(), get(handlers::login))
        .route(Route::Callback.path(), get(handlers::callback))
        .route(Route::Token.path(), get(handlers::token))
        .route(Route::Logout.path(), post(handlers::logout))
        .route(Route::Debug.path(), get(handlers::debug))
        .fallback(handlers::fallback)
        .with_state(state)
}

/// Serves the router on `listener` until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
