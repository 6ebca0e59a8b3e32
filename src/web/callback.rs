//! One-shot handling of the provider redirect

use std::sync::Arc;

use crate::auth::AuthService;
use crate::oidc::{CallbackParams, SessionKey, UserSession};
use crate::web::routes::Route;

/// Result of handling one callback request.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    /// The callback completed; `session` is `None` when auth is disabled.
    Authenticated { session: Option<UserSession> },
    /// The callback failed and was logged.
    Failed { message: String },
}

impl CallbackOutcome {
    /// The single navigation that follows the callback.
    pub fn next_route(&self) -> Route {
        match self {
            CallbackOutcome::Authenticated { .. } => Route::Token,
            CallbackOutcome::Failed { .. } => Route::Home,
        }
    }
}

/// Drives [`AuthService::handle_login_callback`] for the callback route.
#[derive(Debug, Clone)]
pub struct CallbackHandler {
    auth: Arc<AuthService>,
}

impl CallbackHandler {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self { auth }
    }

    /// Completes the login once and decides where to go next.
    ///
    /// `previous` is the session the browser held before this login. It is
    /// dropped once a new session replaces it, and kept if the login fails.
    pub async fn run(
        &self,
        params: &CallbackParams,
        previous: Option<&SessionKey>,
    ) -> CallbackOutcome {
        match self.auth.handle_login_callback(params).await {
            Ok(session) => {
                if let (Some(old), Some(new)) = (previous, &session) {
                    if *old != new.key {
                        self.auth.discard_session(old);
                    }
                }
                CallbackOutcome::Authenticated { session }
            }
            Err(e) => {
                tracing::error!(error = %e, "Error handling callback");
                CallbackOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }
}
