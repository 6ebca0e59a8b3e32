//! The authentication facade
//!
//! [`AuthService`] is the only entry point the web layer uses for login,
//! callback handling, logout and session lookup. It is constructed once in
//! the composition root and shared as `Arc<AuthService>`.
//!
//! A facade is either *Disabled* (OIDC intentionally unconfigured; every
//! operation is a logged no-op) or *Enabled* over a [`SessionClient`]. The
//! mode is fixed at construction. The facade keeps no session state of its
//! own; every lookup goes to the client.

use std::sync::{Arc, Weak};

use url::Url;

use crate::config::{OidcSettings, SessionConfig};
use crate::error::Result;
use crate::oidc::{CallbackParams, OidcSessionClient, SessionClient, SessionKey, UserSession};

// ---------------------------------------------------------------------------
// AuthService
// ---------------------------------------------------------------------------

enum Mode {
    Disabled,
    Enabled(Arc<dyn SessionClient>),
}

/// Single access point for the OIDC session lifecycle.
///
/// # Examples
///
/// ```
/// use tokenview::auth::AuthService;
///
/// # tokio_test::block_on(async {
/// let auth = AuthService::disabled();
/// assert!(!auth.is_enabled());
/// assert!(auth.login().await.unwrap().is_none());
/// assert!(auth.get_user(None).await.is_none());
/// # });
/// ```
pub struct AuthService {
    mode: Mode,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl AuthService {
    /// A facade with OIDC turned off.
    pub fn disabled() -> Self {
        Self {
            mode: Mode::Disabled,
        }
    }

    /// Builds the facade from raw settings with the provider-backed client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when OIDC is enabled but the settings
    /// are incomplete or malformed. No client is created in that case.
    pub fn from_settings(settings: &OidcSettings, http: reqwest::Client) -> Result<Self> {
        Self::build(settings, |config| {
            Ok(Arc::new(OidcSessionClient::new(config, http)) as Arc<dyn SessionClient>)
        })
    }

    /// Builds the facade from raw settings with a caller-supplied client
    /// factory. The factory runs only when the settings resolve to a valid
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns the resolution error, or the factory's error.
    pub fn build<F>(settings: &OidcSettings, factory: F) -> Result<Self>
    where
        F: FnOnce(SessionConfig) -> Result<Arc<dyn SessionClient>>,
    {
        let config = match settings.resolve() {
            Ok(Some(config)) => config,
            Ok(None) => {
                tracing::debug!("OIDC configuration intentionally absent, authentication disabled");
                return Ok(Self::disabled());
            }
            Err(e) => {
                tracing::error!(error = %e, "Invalid OIDC configuration");
                return Err(e);
            }
        };

        tracing::info!(config = %config.redacted(), "Initializing OIDC session client");
        let client = factory(config)?;
        Ok(Self::with_client(client))
    }

    /// An enabled facade over `client`, with the lifecycle observers
    /// registered on it.
    pub fn with_client(client: Arc<dyn SessionClient>) -> Self {
        register_observers(&client);
        Self {
            mode: Mode::Enabled(client),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.mode, Mode::Enabled(_))
    }

    /// Starts a login.
    ///
    /// Returns the provider URL to redirect to, or `None` when disabled.
    ///
    /// # Errors
    ///
    /// Propagates the client's failure after logging it.
    pub async fn login(&self) -> Result<Option<Url>> {
        let Mode::Enabled(client) = &self.mode else {
            tracing::warn!("Login requested but OIDC is disabled");
            return Ok(None);
        };

        tracing::debug!("Starting login redirect");
        match client.initiate_login().await {
            Ok(url) => Ok(Some(url)),
            Err(e) => {
                tracing::error!(error = %e, "Login redirect failed");
                Err(e)
            }
        }
    }

    /// Completes the login started by [`AuthService::login`].
    ///
    /// Returns the new session, or `None` when disabled.
    ///
    /// # Errors
    ///
    /// Propagates the client's failure after logging it.
    pub async fn handle_login_callback(
        &self,
        params: &CallbackParams,
    ) -> Result<Option<UserSession>> {
        let Mode::Enabled(client) = &self.mode else {
            tracing::warn!("Login callback received but OIDC is disabled");
            return Ok(None);
        };

        match client.complete_login_callback(params).await {
            Ok(session) => {
                tracing::info!(
                    subject = session.subject().unwrap_or("<none>"),
                    "Login callback completed"
                );
                Ok(Some(session))
            }
            Err(e) => {
                tracing::error!(error = %e, "Login callback failed");
                Err(e)
            }
        }
    }

    /// Ends the session and returns the provider end-session URL, or `None`
    /// when disabled.
    ///
    /// # Errors
    ///
    /// Propagates the client's failure after logging it.
    pub async fn logout(&self, key: Option<&SessionKey>) -> Result<Option<Url>> {
        let Mode::Enabled(client) = &self.mode else {
            tracing::warn!("Logout requested but OIDC is disabled");
            return Ok(None);
        };

        tracing::debug!(has_session = key.is_some(), "Starting logout redirect");
        match client.initiate_logout(key).await {
            Ok(url) => Ok(Some(url)),
            Err(e) => {
                tracing::error!(error = %e, "Logout redirect failed");
                Err(e)
            }
        }
    }

    /// Drops the local session for `key`, for example when a fresh login
    /// replaces it. No-op when disabled.
    pub fn discard_session(&self, key: &SessionKey) {
        let Mode::Enabled(client) = &self.mode else {
            return;
        };
        if client.discard_session(key) {
            tracing::debug!(session = %key, "Discarded local session");
        }
    }

    /// Looks up the current session. Never fails: lookup errors are logged
    /// and reported as no session.
    pub async fn get_user(&self, key: Option<&SessionKey>) -> Option<UserSession> {
        let Mode::Enabled(client) = &self.mode else {
            tracing::debug!("OIDC disabled, no user");
            return None;
        };
        let key = key?;

        match client.get_current_user(key).await {
            Ok(user) => user,
            Err(e) => {
                tracing::error!(error = %e, session = %key, "Session lookup failed");
                None
            }
        }
    }
}

fn register_observers(client: &Arc<dyn SessionClient>) {
    let events = client.events();

    events.add_user_loaded(|session| {
        tracing::info!(
            subject = session.subject().unwrap_or("<none>"),
            session = %session.key,
            "User loaded"
        );
    });

    events.add_silent_renew_error(|failure| {
        tracing::debug!(session = %failure.key, error = %failure.message, "Silent renewal failed");
    });

    // Weak: the client owns the registry that owns this closure.
    let weak: Weak<dyn SessionClient> = Arc::downgrade(client);
    events.add_user_signed_out(move |key| {
        if let Some(client) = weak.upgrade() {
            let purged = client.clear_stale_state();
            tracing::debug!(purged, "Cleared stale login state");
        }
        tracing::info!(session = %key, "User signed out at the provider");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TokenviewError;
    use crate::oidc::fake::FakeSessionClient;

    fn enabled() -> (Arc<FakeSessionClient>, AuthService) {
        let fake = Arc::new(FakeSessionClient::new());
        let auth = AuthService::with_client(fake.clone());
        (fake, auth)
    }

    fn complete_settings() -> OidcSettings {
        OidcSettings {
            authority: Some("https://idp.example.com".to_string()),
            client_id: Some("viewer".to_string()),
            redirect_uri: Some("http://localhost:3000/callback".to_string()),
            scope: Some("openid".to_string()),
            ..OidcSettings::default()
        }
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn test_build_disabled_settings_never_calls_factory() {
        let settings = OidcSettings {
            disabled: true,
            ..OidcSettings::default()
        };
        let auth = AuthService::build(&settings, |_| panic!("factory must not run")).unwrap();
        assert!(!auth.is_enabled());
    }

    #[test]
    fn test_build_missing_field_is_config_error_without_client() {
        let mut settings = complete_settings();
        settings.scope = None;
        let err = AuthService::build(&settings, |_| panic!("factory must not run")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TokenviewError>(),
            Some(TokenviewError::Config(_))
        ));
        assert!(err.to_string().contains("scope"));
    }

    #[test]
    fn test_build_complete_settings_uses_factory() {
        let fake = Arc::new(FakeSessionClient::new());
        let handed_out = fake.clone();
        let auth = AuthService::build(&complete_settings(), move |config| {
            assert_eq!(config.client_id, "viewer");
            Ok(handed_out as Arc<dyn SessionClient>)
        })
        .unwrap();
        assert!(auth.is_enabled());
        assert_eq!(fake.events().observer_count(), 3);
    }

    #[test]
    fn test_from_settings_enabled() {
        let auth = AuthService::from_settings(&complete_settings(), reqwest::Client::new()).unwrap();
        assert!(auth.is_enabled());
    }

    #[test]
    fn test_from_settings_rejects_zero_silent_timeout() {
        let settings = OidcSettings {
            silent_request_timeout_ms: 0,
            ..complete_settings()
        };
        let err = AuthService::from_settings(&settings, reqwest::Client::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TokenviewError>(),
            Some(TokenviewError::Config(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Disabled facade
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_disabled_operations_are_noops() {
        let auth = AuthService::disabled();
        assert!(auth.login().await.unwrap().is_none());
        assert!(auth
            .handle_login_callback(&CallbackParams::default())
            .await
            .unwrap()
            .is_none());
        assert!(auth.logout(None).await.unwrap().is_none());
        assert!(auth.get_user(Some(&SessionKey::generate())).await.is_none());
    }

    // -----------------------------------------------------------------------
    // Enabled facade
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_returns_provider_url() {
        let (fake, auth) = enabled();
        let url = auth.login().await.unwrap().unwrap();
        assert!(url.as_str().starts_with("https://idp.test/authorize"));
        assert_eq!(fake.login_calls(), 1);
    }

    #[tokio::test]
    async fn test_login_failure_propagates() {
        let (fake, auth) = enabled();
        fake.fail_login("discovery unavailable");
        assert!(auth.login().await.is_err());
    }

    #[tokio::test]
    async fn test_get_user_without_key_skips_client() {
        let (fake, auth) = enabled();
        assert!(auth.get_user(None).await.is_none());
        assert_eq!(fake.get_user_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_user_error_is_normalized_to_none() {
        let (fake, auth) = enabled();
        let session = FakeSessionClient::sample_session();
        let key = session.key.clone();
        fake.insert_session(session);
        fake.fail_get_user("monitor probe failed");
        assert!(auth.get_user(Some(&key)).await.is_none());
        assert_eq!(fake.get_user_calls(), 1);
    }

    #[tokio::test]
    async fn test_get_user_returns_stored_session() {
        let (fake, auth) = enabled();
        let session = FakeSessionClient::sample_session();
        let key = session.key.clone();
        fake.insert_session(session);
        let user = auth.get_user(Some(&key)).await.unwrap();
        assert_eq!(user.subject(), Some("alice"));
    }

    #[tokio::test]
    async fn test_logout_failure_propagates() {
        let (fake, auth) = enabled();
        fake.fail_logout("no end_session_endpoint");
        assert!(auth.logout(None).await.is_err());
        assert_eq!(fake.logout_calls(), 1);
    }

    #[tokio::test]
    async fn test_discard_session_removes_only_that_session() {
        let (fake, auth) = enabled();
        let kept = FakeSessionClient::sample_session();
        let dropped = FakeSessionClient::sample_session();
        let (kept_key, dropped_key) = (kept.key.clone(), dropped.key.clone());
        fake.insert_session(kept);
        fake.insert_session(dropped);

        auth.discard_session(&dropped_key);
        assert!(auth.get_user(Some(&dropped_key)).await.is_none());
        assert!(auth.get_user(Some(&kept_key)).await.is_some());

        AuthService::disabled().discard_session(&kept_key);
    }

    #[test]
    fn test_signed_out_observer_clears_stale_state() {
        let (fake, _auth) = enabled();
        fake.sign_out_remotely(&SessionKey::generate());
        assert_eq!(fake.clear_stale_calls(), 1);
    }
}
