//! Route guard for protected pages
//!
//! Each request to a protected route is checked independently: the guard
//! asks the auth facade for the current user and resolves to a
//! [`GuardOutcome`]. While that future is pending nothing is rendered or
//! redirected. Nothing is cached between requests.
//!
//! In the router the guard runs as the [`ProtectedSession`] extractor. If
//! the client goes away while the check is pending, axum drops the handler
//! future and the late result is never applied.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Redirect;

use crate::auth::AuthService;
use crate::oidc::{SessionKey, UserSession};
use crate::web::cookies;
use crate::web::routes::Route;
use crate::web::AppState;

/// What the guarded route does once the check resolves.
#[derive(Debug, Clone)]
pub enum GuardOutcome {
    /// Render the protected content for this session
    Render(UserSession),
    /// Send the browser to this route, exactly once
    Redirect(Route),
}

/// Checks sessions against the auth facade.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    auth: Arc<AuthService>,
}

impl RouteGuard {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self { auth }
    }

    /// Runs one check.
    pub async fn check(&self, key: Option<&SessionKey>) -> GuardOutcome {
        let outcome = match self.auth.get_user(key).await {
            Some(session) => GuardOutcome::Render(session),
            None => GuardOutcome::Redirect(Route::Home),
        };
        tracing::debug!(
            authenticated = matches!(outcome, GuardOutcome::Render(_)),
            "Route guard resolved"
        );
        outcome
    }
}

/// Extractor that only succeeds for requests with a live session.
///
/// Rejects with a `303 See Other` to the home page.
#[derive(Debug, Clone)]
pub struct ProtectedSession(pub UserSession);

#[axum::async_trait]
impl FromRequestParts<AppState> for ProtectedSession {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = cookies::session_key(&parts.headers);
        let guard = RouteGuard::new(Arc::clone(&state.auth));

        match guard.check(key.as_ref()).await {
            GuardOutcome::Render(session) => Ok(ProtectedSession(session)),
            GuardOutcome::Redirect(route) => Err(Redirect::to(route.path())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oidc::fake::FakeSessionClient;

    #[tokio::test]
    async fn test_check_authenticated() {
        let fake = Arc::new(FakeSessionClient::new());
        let session = FakeSessionClient::sample_session();
        let key = session.key.clone();
        fake.insert_session(session);
        let guard = RouteGuard::new(Arc::new(AuthService::with_client(fake.clone())));

        let outcome = guard.check(Some(&key)).await;
        assert!(matches!(outcome, GuardOutcome::Render(ref s) if s.key == key));
        assert_eq!(fake.get_user_calls(), 1);
    }

    #[tokio::test]
    async fn test_check_without_session_redirects_home() {
        let fake = Arc::new(FakeSessionClient::new());
        let guard = RouteGuard::new(Arc::new(AuthService::with_client(fake)));
        assert!(matches!(
            guard.check(Some(&SessionKey::generate())).await,
            GuardOutcome::Redirect(Route::Home)
        ));
        assert!(matches!(
            guard.check(None).await,
            GuardOutcome::Redirect(Route::Home)
        ));
    }

    #[tokio::test]
    async fn test_check_lookup_error_redirects_home() {
        let fake = Arc::new(FakeSessionClient::new());
        fake.fail_get_user("provider unreachable");
        let guard = RouteGuard::new(Arc::new(AuthService::with_client(fake)));
        assert!(matches!(
            guard.check(Some(&SessionKey::generate())).await,
            GuardOutcome::Redirect(Route::Home)
        ));
    }

    #[tokio::test]
    async fn test_each_check_asks_again() {
        let fake = Arc::new(FakeSessionClient::new());
        let guard = RouteGuard::new(Arc::new(AuthService::with_client(fake.clone())));
        let key = SessionKey::generate();
        guard.check(Some(&key)).await;
        guard.check(Some(&key)).await;
        assert_eq!(fake.get_user_calls(), 2);
    }

    #[tokio::test]
    async fn test_dropped_check_never_resolves() {
        let fake = Arc::new(FakeSessionClient::new());
        fake.delay_get_user(std::time::Duration::from_secs(5));
        let guard = RouteGuard::new(Arc::new(AuthService::with_client(fake.clone())));
        let key = SessionKey::generate();

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(20), guard.check(Some(&key)))
                .await;
        assert!(result.is_err(), "check must still be pending when dropped");
        assert_eq!(fake.get_user_calls(), 1);
    }
}
