//! In-process fake session client for tests
//!
//! [`FakeSessionClient`] implements [`SessionClient`] without a provider.
//! It behaves like a well-mannered provider by default and can be scripted
//! to fail each operation. Every operation is counted so tests can assert
//! whether (and how often) the facade reached the client.
//!
//! - `initiate_login` issues `fake-state-<n>` and returns
//!   `https://idp.test/authorize?state=fake-state-<n>`.
//! - `complete_login_callback` accepts each issued state once and stores a
//!   copy of the template session under a fresh key.
//! - `initiate_logout` forgets the session and returns
//!   `https://idp.test/logout`, with `id_token_hint` when a session existed.
//!
//! # Example
//!
//! ```
//! use tokenview::oidc::fake::FakeSessionClient;
//! use tokenview::oidc::{CallbackParams, SessionClient};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let fake = FakeSessionClient::new();
//! let url = fake.initiate_login().await.unwrap();
//! let state = url.query_pairs().find(|(k, _)| k == "state").unwrap().1.into_owned();
//!
//! let params = CallbackParams { code: Some("c".into()), state: Some(state), ..Default::default() };
//! let session = fake.complete_login_callback(&params).await.unwrap();
//! assert!(fake.get_current_user(&session.key).await.unwrap().is_some());
//! assert_eq!(fake.callback_calls(), 1);
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use url::Url;

use crate::error::{Result, TokenviewError};
use crate::oidc::client::{CallbackParams, SessionClient};
use crate::oidc::events::{SessionEvent, SessionEvents};
use crate::oidc::session::{SessionKey, UserSession};

/// Authorization endpoint the fake redirects to
pub const FAKE_AUTHORIZE_URL: &str = "https://idp.test/authorize";

/// End-session endpoint the fake redirects to
pub const FAKE_LOGOUT_URL: &str = "https://idp.test/logout";

/// Scriptable [`SessionClient`] test double.
#[derive(Debug, Default)]
pub struct FakeSessionClient {
    events: SessionEvents,
    template: Mutex<Option<UserSession>>,
    issued_states: Mutex<HashSet<String>>,
    sessions: Mutex<HashMap<SessionKey, UserSession>>,

    login_failure: Mutex<Option<String>>,
    callback_failure: Mutex<Option<String>>,
    user_failure: Mutex<Option<String>>,
    logout_failure: Mutex<Option<String>>,
    user_delay: Mutex<Option<Duration>>,

    login_calls: AtomicUsize,
    callback_calls: AtomicUsize,
    user_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    clear_stale_calls: AtomicUsize,
}

impl FakeSessionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session with a small, fixed profile.
    pub fn sample_session() -> UserSession {
        let profile = json!({
            "sub": "alice",
            "name": "Alice Example",
            "email": "alice@example.com",
            "groups": ["viewers", "admins"],
        });
        UserSession {
            key: SessionKey::generate(),
            profile: profile.as_object().cloned().unwrap_or_default(),
            id_token: "eyJhbGciOiJub25lIn0.eyJzdWIiOiJhbGljZSJ9.fake-id".to_string(),
            access_token: "fake-access-token".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: None,
            scope: Some("openid profile email".to_string()),
            expires_at: None,
        }
    }

    /// Session returned by successful callbacks (with a fresh key each time).
    pub fn with_template(self, session: UserSession) -> Self {
        *self.template.lock() = Some(session);
        self
    }

    pub fn fail_login(&self, message: impl Into<String>) {
        *self.login_failure.lock() = Some(message.into());
    }

    pub fn fail_callback(&self, message: impl Into<String>) {
        *self.callback_failure.lock() = Some(message.into());
    }

    pub fn fail_get_user(&self, message: impl Into<String>) {
        *self.user_failure.lock() = Some(message.into());
    }

    pub fn fail_logout(&self, message: impl Into<String>) {
        *self.logout_failure.lock() = Some(message.into());
    }

    /// Delays every `get_current_user` call.
    pub fn delay_get_user(&self, delay: Duration) {
        *self.user_delay.lock() = Some(delay);
    }

    /// Stores a session directly, as if a callback had completed.
    pub fn insert_session(&self, session: UserSession) {
        self.sessions.lock().insert(session.key.clone(), session);
    }

    pub fn has_session(&self, key: &SessionKey) -> bool {
        self.sessions.lock().contains_key(key)
    }

    /// Simulates the provider ending a session.
    pub fn sign_out_remotely(&self, key: &SessionKey) {
        self.sessions.lock().remove(key);
        self.events.raise(&SessionEvent::UserSignedOut(key.clone()));
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn callback_calls(&self) -> usize {
        self.callback_calls.load(Ordering::SeqCst)
    }

    pub fn get_user_calls(&self) -> usize {
        self.user_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn clear_stale_calls(&self) -> usize {
        self.clear_stale_calls.load(Ordering::SeqCst)
    }

    /// Total calls across every operation.
    pub fn total_calls(&self) -> usize {
        self.login_calls()
            + self.callback_calls()
            + self.get_user_calls()
            + self.logout_calls()
            + self.clear_stale_calls()
    }
}

fn fake_url(base: &str, pairs: &[(&str, &str)]) -> Result<Url> {
    let parsed = if pairs.is_empty() {
        Url::parse(base)
    } else {
        Url::parse_with_params(base, pairs)
    };
    parsed.map_err(|e| TokenviewError::Login(format!("fake URL: {e}")).into())
}

#[async_trait]
impl SessionClient for FakeSessionClient {
    async fn initiate_login(&self) -> Result<Url> {
        let n = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failure = self.login_failure.lock().clone();
        if let Some(msg) = failure {
            return Err(TokenviewError::Login(msg).into());
        }
        let state = format!("fake-state-{n}");
        self.issued_states.lock().insert(state.clone());
        fake_url(FAKE_AUTHORIZE_URL, &[("state", state.as_str())])
    }

    async fn complete_login_callback(&self, params: &CallbackParams) -> Result<UserSession> {
        self.callback_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.callback_failure.lock().clone();
        if let Some(msg) = failure {
            return Err(TokenviewError::InvalidCallback(msg).into());
        }
        if let Some(error) = &params.error {
            return Err(TokenviewError::ProviderRejected {
                error: error.clone(),
                description: params.error_description.clone(),
            }
            .into());
        }

        let state = params.state.as_deref().unwrap_or_default();
        if !self.issued_states.lock().remove(state) {
            return Err(TokenviewError::InvalidCallback(
                "No matching state found in storage".to_string(),
            )
            .into());
        }

        let mut session = self
            .template
            .lock()
            .clone()
            .unwrap_or_else(Self::sample_session);
        session.key = SessionKey::generate();
        self.insert_session(session.clone());
        self.events.raise(&SessionEvent::UserLoaded(session.clone()));
        Ok(session)
    }

    async fn get_current_user(&self, key: &SessionKey) -> Result<Option<UserSession>> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.user_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.user_failure.lock().clone();
        if let Some(msg) = failure {
            return Err(TokenviewError::Session(msg).into());
        }
        Ok(self.sessions.lock().get(key).cloned())
    }

    async fn initiate_logout(&self, key: Option<&SessionKey>) -> Result<Url> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let session = key.and_then(|k| self.sessions.lock().remove(k));
        let failure = self.logout_failure.lock().clone();
        if let Some(msg) = failure {
            return Err(TokenviewError::Logout(msg).into());
        }
        match session {
            Some(session) => fake_url(FAKE_LOGOUT_URL, &[("id_token_hint", session.id_token.as_str())]),
            None => fake_url(FAKE_LOGOUT_URL, &[]),
        }
    }

    fn clear_stale_state(&self) -> usize {
        self.clear_stale_calls.fetch_add(1, Ordering::SeqCst);
        0
    }

    fn discard_session(&self, key: &SessionKey) -> bool {
        self.sessions.lock().remove(key).is_some()
    }

    fn events(&self) -> &SessionEvents {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issued_state_is_accepted_once() {
        let fake = FakeSessionClient::new();
        let url = fake.initiate_login().await.unwrap();
        assert!(url.as_str().starts_with(FAKE_AUTHORIZE_URL));

        let params = CallbackParams {
            code: Some("c".to_string()),
            state: Some("fake-state-1".to_string()),
            ..CallbackParams::default()
        };
        assert!(fake.complete_login_callback(&params).await.is_ok());
        assert!(fake.complete_login_callback(&params).await.is_err());
        assert_eq!(fake.callback_calls(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let fake = FakeSessionClient::new();
        fake.fail_login("down");
        fake.fail_get_user("probe failed");
        assert!(fake.initiate_login().await.is_err());
        assert!(fake.get_current_user(&SessionKey::generate()).await.is_err());
        assert_eq!(fake.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_logout_carries_id_token_hint() {
        let fake = FakeSessionClient::new();
        let session = FakeSessionClient::sample_session();
        let key = session.key.clone();
        fake.insert_session(session);

        let url = fake.initiate_logout(Some(&key)).await.unwrap();
        assert!(url.query_pairs().any(|(k, _)| k == "id_token_hint"));
        assert!(!fake.has_session(&key));
    }
}
