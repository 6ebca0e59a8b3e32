//! The OIDC session client
//!
//! [`SessionClient`] is the capability the auth facade depends on.
//! [`OidcSessionClient`] implements it against a real provider with the
//! authorization code flow and PKCE S256:
//!
//! 1. [`SessionClient::initiate_login`] records a [`PendingLogin`] under a
//!    fresh `state` and returns the authorization URL.
//! 2. The provider redirects the browser back with `code` and `state`.
//! 3. [`SessionClient::complete_login_callback`] takes the pending login
//!    (once), exchanges the code, verifies the ID token against the
//!    provider keys, optionally merges user-info claims, and stores a
//!    [`UserSession`].
//! 4. [`SessionClient::get_current_user`] returns the stored session,
//!    renewing or probing it when configured to.
//! 5. [`SessionClient::initiate_logout`] drops the session and returns the
//!    provider's end-session URL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Header};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use url::Url;

use crate::config::SessionConfig;
use crate::error::{Result, TokenviewError};
use crate::oidc::discovery::{fetch_jwks, fetch_provider_metadata, ProviderMetadata};
use crate::oidc::events::{SessionEvent, SessionEvents, SilentRenewFailure};
use crate::oidc::pkce::{self, random_token, S256};
use crate::oidc::session::{
    filter_protocol_claims, id_token_header, validate_id_token, IdTokenExpectations, SessionKey,
    TokenResponse, UserSession,
};
use crate::oidc::store::{PendingLogin, StateStore, UserStore};

/// Sessions this close to expiry are renewed on lookup.
pub const RENEW_WINDOW: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// CallbackParams
// ---------------------------------------------------------------------------

/// Query parameters of the provider redirect back to the callback route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_uri: Option<String>,
    #[serde(default)]
    pub session_state: Option<String>,
    /// RFC 9207 issuer identification
    #[serde(default)]
    pub iss: Option<String>,
}

// ---------------------------------------------------------------------------
// SessionClient
// ---------------------------------------------------------------------------

/// OIDC session lifecycle operations.
///
/// Implementations own their pending-login and session stores; callers never
/// keep sessions of their own.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Starts a login and returns the provider authorization URL.
    async fn initiate_login(&self) -> Result<Url>;

    /// Validates a provider callback and establishes a session.
    ///
    /// Fails with [`TokenviewError::ProviderRejected`] when the provider sent
    /// an error response, [`TokenviewError::InvalidCallback`] when the
    /// parameters do not match a pending login, and
    /// [`TokenviewError::TokenExchange`] when the code exchange or token
    /// checks fail.
    async fn complete_login_callback(&self, params: &CallbackParams) -> Result<UserSession>;

    /// Returns the live session for `key`, or `None` when there is none.
    async fn get_current_user(&self, key: &SessionKey) -> Result<Option<UserSession>>;

    /// Ends the session for `key` locally and returns the provider
    /// end-session URL.
    async fn initiate_logout(&self, key: Option<&SessionKey>) -> Result<Url>;

    /// Discards stale pending logins, returning how many were removed.
    fn clear_stale_state(&self) -> usize;

    /// Forgets the session for `key` without contacting the provider.
    /// Returns whether there was one.
    fn discard_session(&self, key: &SessionKey) -> bool;

    /// Lifecycle observer registry.
    fn events(&self) -> &SessionEvents;
}

// ---------------------------------------------------------------------------
// OidcSessionClient
// ---------------------------------------------------------------------------

/// [`SessionClient`] backed by an OpenID Connect provider.
///
/// # Examples
///
/// ```no_run
/// use tokenview::config::OidcSettings;
/// use tokenview::oidc::{OidcSessionClient, SessionClient};
///
/// # async fn example() -> tokenview::error::Result<()> {
/// let settings = OidcSettings {
///     authority: Some("https://idp.example.com".to_string()),
///     client_id: Some("viewer".to_string()),
///     redirect_uri: Some("http://localhost:3000/callback".to_string()),
///     scope: Some("openid profile".to_string()),
///     ..OidcSettings::default()
/// };
/// let config = settings.resolve()?.expect("enabled");
/// let client = OidcSessionClient::new(config, reqwest::Client::new());
/// let url = client.initiate_login().await?;
/// println!("redirect to {url}");
/// # Ok(())
/// # }
/// ```
pub struct OidcSessionClient {
    http: reqwest::Client,
    config: SessionConfig,
    metadata: OnceCell<ProviderMetadata>,
    jwks: RwLock<Option<Arc<JwkSet>>>,
    pending: StateStore,
    users: UserStore,
    events: SessionEvents,
}

impl std::fmt::Debug for OidcSessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcSessionClient")
            .field("config", &self.config)
            .field("discovered", &self.metadata.initialized())
            .field("pending", &self.pending.len())
            .field("sessions", &self.users.len())
            .finish()
    }
}

impl OidcSessionClient {
    /// Creates a client. Discovery happens on first use.
    pub fn new(config: SessionConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            config,
            metadata: OnceCell::new(),
            jwks: RwLock::new(None),
            pending: StateStore::new(),
            users: UserStore::new(),
            events: SessionEvents::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Pending logins awaiting a callback.
    pub fn pending_logins(&self) -> &StateStore {
        &self.pending
    }

    /// Established sessions.
    pub fn sessions(&self) -> &UserStore {
        &self.users
    }

    /// Provider metadata, fetched once and cached.
    pub async fn metadata(&self) -> Result<&ProviderMetadata> {
        self.metadata
            .get_or_try_init(|| fetch_provider_metadata(&self.http, &self.config.authority))
            .await
    }

    /// Key that verifies an ID token with `header`.
    ///
    /// HMAC tokens are keyed with the client secret (OIDC Core 10.1).
    /// Everything else comes from the provider JWKS, which is fetched again
    /// once when the token names a key the cached set lacks.
    async fn id_token_key(
        &self,
        metadata: &ProviderMetadata,
        header: &Header,
    ) -> Result<DecodingKey> {
        if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            let secret = self.config.client_secret.as_deref().ok_or_else(|| {
                TokenviewError::TokenExchange(format!(
                    "ID token is signed with {:?} but no client_secret is configured",
                    header.alg
                ))
            })?;
            return Ok(DecodingKey::from_secret(secret.as_bytes()));
        }

        let jwks_uri = metadata.jwks_uri.as_deref().ok_or_else(|| {
            TokenviewError::TokenExchange("provider does not advertise a jwks_uri".to_string())
        })?;
        let kid = header.kid.as_deref();

        let cached = self.jwks.read().clone();
        let jwks = match cached {
            Some(set) if find_jwk(&set, kid).is_some() => set,
            _ => {
                let fresh = Arc::new(fetch_jwks(&self.http, jwks_uri).await?);
                *self.jwks.write() = Some(Arc::clone(&fresh));
                fresh
            }
        };

        let jwk = find_jwk(&jwks, kid).ok_or_else(|| {
            TokenviewError::TokenExchange(format!(
                "no signing key {} in the provider JWKS",
                kid.unwrap_or("(unnamed)")
            ))
        })?;
        DecodingKey::from_jwk(jwk).map_err(|e| {
            TokenviewError::TokenExchange(format!("unusable provider signing key: {e}")).into()
        })
    }

    fn build_authorization_url(
        &self,
        metadata: &ProviderMetadata,
        state: &str,
        nonce: &str,
        code_challenge: &str,
    ) -> Result<Url> {
        let mut url = Url::parse(&metadata.authorization_endpoint).map_err(|e| {
            TokenviewError::Login(format!("invalid authorization endpoint URL: {e}"))
        })?;

        url.query_pairs_mut()
            .append_pair("response_type", &self.config.response_type)
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &self.config.scope)
            .append_pair("state", state)
            .append_pair("nonce", nonce)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", S256);

        Ok(url)
    }

    async fn token_request<'a>(
        &'a self,
        metadata: &ProviderMetadata,
        mut params: HashMap<&'a str, &'a str>,
    ) -> Result<TokenResponse> {
        params.insert("client_id", &self.config.client_id);
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.insert("client_secret", secret);
        }

        let resp = self
            .http
            .post(&metadata.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| TokenviewError::TokenExchange(format!("token request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TokenviewError::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            ))
            .into());
        }

        let tokens: TokenResponse = resp.json().await.map_err(|e| {
            TokenviewError::TokenExchange(format!("failed to parse token response: {e}"))
        })?;
        Ok(tokens)
    }

    async fn exchange_code(
        &self,
        metadata: &ProviderMetadata,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", self.config.redirect_uri.as_str());
        params.insert("code_verifier", code_verifier);
        self.token_request(metadata, params).await
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenResponse> {
        let metadata = self.metadata().await?;
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        self.token_request(metadata, params).await
    }

    async fn fetch_user_info(
        &self,
        userinfo_endpoint: &str,
        access_token: &str,
    ) -> Result<Map<String, Value>> {
        let resp = self
            .http
            .get(userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| TokenviewError::TokenExchange(format!("userinfo request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(TokenviewError::TokenExchange(format!(
                "userinfo endpoint returned {}",
                resp.status()
            ))
            .into());
        }

        match resp.json::<Value>().await {
            Ok(Value::Object(claims)) => Ok(claims),
            Ok(_) => Err(TokenviewError::TokenExchange(
                "userinfo response is not a JSON object".to_string(),
            )
            .into()),
            Err(e) => Err(TokenviewError::TokenExchange(format!(
                "failed to parse userinfo response: {e}"
            ))
            .into()),
        }
    }

    /// Builds the profile from the ID token claims and, when enabled, the
    /// user-info claims.
    async fn build_profile(
        &self,
        metadata: &ProviderMetadata,
        mut claims: Map<String, Value>,
        access_token: &str,
    ) -> Result<Map<String, Value>> {
        if self.config.filter_protocol_claims {
            filter_protocol_claims(&mut claims);
        }

        let endpoint = match (&metadata.userinfo_endpoint, self.config.load_user_info) {
            (Some(endpoint), true) => endpoint,
            _ => return Ok(claims),
        };

        let user_info = self.fetch_user_info(endpoint, access_token).await?;
        if let Some(sub) = user_info.get("sub") {
            if claims.get("sub") != Some(sub) {
                return Err(TokenviewError::TokenExchange(
                    "userinfo subject does not match the ID token".to_string(),
                )
                .into());
            }
        }

        tracing::debug!(claims = user_info.len(), "Merging userinfo claims");
        claims.extend(user_info);
        Ok(claims)
    }

    /// Attempts a refresh token grant for a session near expiry.
    ///
    /// Failure is reported through the silent-renew observers; the session
    /// is returned unchanged so the caller's expiry check decides its fate.
    async fn silent_renew(&self, mut session: UserSession) -> UserSession {
        let Some(refresh_token) = session.refresh_token.clone() else {
            return session;
        };

        let outcome = tokio::time::timeout(
            self.config.silent_request_timeout,
            self.refresh_tokens(&refresh_token),
        )
        .await;

        match outcome {
            Ok(Ok(tokens)) => {
                session.apply_refresh(tokens);
                self.users.put(session.clone());
                tracing::debug!(session = %session.key, "Silent renewal succeeded");
                self.events.raise(&SessionEvent::UserLoaded(session.clone()));
            }
            Ok(Err(e)) => self.report_renew_failure(&session.key, e.to_string()),
            Err(_) => self.report_renew_failure(
                &session.key,
                format!(
                    "silent renewal timed out after {} ms",
                    self.config.silent_request_timeout.as_millis()
                ),
            ),
        }
        session
    }

    fn report_renew_failure(&self, key: &SessionKey, message: String) {
        self.events
            .raise(&SessionEvent::SilentRenewError(SilentRenewFailure {
                key: key.clone(),
                message,
            }));
    }

    /// Probes the user-info endpoint to learn whether the provider still
    /// considers the session active.
    async fn session_still_active(&self, session: &UserSession) -> Result<bool> {
        let metadata = self.metadata().await?;
        let Some(endpoint) = metadata.userinfo_endpoint.as_deref() else {
            return Ok(true);
        };

        let probe = self
            .http
            .get(endpoint)
            .bearer_auth(&session.access_token)
            .send();
        let resp = tokio::time::timeout(self.config.silent_request_timeout, probe)
            .await
            .map_err(|_| TokenviewError::Session("session check timed out".to_string()))?
            .map_err(|e| TokenviewError::Session(format!("session check failed: {e}")))?;

        match resp.status() {
            status if status.is_success() => Ok(true),
            status if status == reqwest::StatusCode::UNAUTHORIZED => Ok(false),
            status => Err(TokenviewError::Session(format!(
                "session check returned {status}"
            ))
            .into()),
        }
    }
}

#[async_trait]
impl SessionClient for OidcSessionClient {
    async fn initiate_login(&self) -> Result<Url> {
        let metadata = self.metadata().await?;
        pkce::verify_s256_support(metadata)?;

        let purged = self.clear_stale_state();
        if purged > 0 {
            tracing::debug!(purged, "Discarded stale login state");
        }

        let pkce = pkce::generate();
        let login = PendingLogin {
            state: random_token(16),
            nonce: random_token(16),
            code_verifier: pkce.verifier,
            created_at: Utc::now(),
        };

        let url = self.build_authorization_url(metadata, &login.state, &login.nonce, &pkce.challenge)?;
        if self.pending.insert(login).is_some() {
            tracing::warn!(
                pending = self.pending.len(),
                "Too many unanswered logins; evicted the oldest"
            );
        }

        tracing::debug!(pending = self.pending.len(), "Login redirect prepared");
        Ok(url)
    }

    async fn complete_login_callback(&self, params: &CallbackParams) -> Result<UserSession> {
        if let Some(error) = params.error.as_deref() {
            if let Some(state) = params.state.as_deref() {
                self.pending.take(state);
            }
            return Err(TokenviewError::ProviderRejected {
                error: error.to_string(),
                description: params.error_description.clone(),
            }
            .into());
        }

        let state = params
            .state
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TokenviewError::InvalidCallback("No state in response".to_string()))?;

        let login = self.pending.take(state).ok_or_else(|| {
            TokenviewError::InvalidCallback("No matching state found in storage".to_string())
        })?;

        if login.is_stale(self.config.stale_state_age, Utc::now()) {
            return Err(
                TokenviewError::InvalidCallback("Login state has expired".to_string()).into(),
            );
        }

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| TokenviewError::InvalidCallback("No code in response".to_string()))?;

        let metadata = self.metadata().await?;

        if let Some(iss) = params.iss.as_deref() {
            if iss != metadata.issuer {
                return Err(TokenviewError::InvalidCallback(format!(
                    "callback issuer {iss} does not match {}",
                    metadata.issuer
                ))
                .into());
            }
        }

        let tokens = self.exchange_code(metadata, code, &login.code_verifier).await?;

        let id_token = tokens.id_token.clone().ok_or_else(|| {
            TokenviewError::TokenExchange("token response has no id_token".to_string())
        })?;

        let header = id_token_header(&id_token)?;
        let key = self.id_token_key(metadata, &header).await?;
        let claims = validate_id_token(
            &id_token,
            &key,
            &IdTokenExpectations {
                issuer: &metadata.issuer,
                client_id: &self.config.client_id,
                nonce: &login.nonce,
                clock_skew: self.config.clock_skew,
            },
        )?;

        let profile = self
            .build_profile(metadata, claims, &tokens.access_token)
            .await?;

        let session = UserSession {
            key: SessionKey::generate(),
            profile,
            id_token,
            expires_at: tokens.expires_at(),
            access_token: tokens.access_token,
            token_type: tokens.token_type,
            refresh_token: tokens.refresh_token,
            scope: tokens.scope,
        };

        self.users.put(session.clone());
        self.events.raise(&SessionEvent::UserLoaded(session.clone()));
        Ok(session)
    }

    async fn get_current_user(&self, key: &SessionKey) -> Result<Option<UserSession>> {
        let Some(mut session) = self.users.get(key) else {
            return Ok(None);
        };

        if self.config.automatic_silent_renew
            && session.refresh_token.is_some()
            && session.expires_within(RENEW_WINDOW)
        {
            session = self.silent_renew(session).await;
        }

        if session.is_expired() {
            self.users.remove(key);
            tracing::debug!(session = %key, "Session expired");
            return Ok(None);
        }

        if self.config.monitor_session && !self.session_still_active(&session).await? {
            self.users.remove(key);
            self.events
                .raise(&SessionEvent::UserSignedOut(key.clone()));
            return Ok(None);
        }

        Ok(Some(session))
    }

    async fn initiate_logout(&self, key: Option<&SessionKey>) -> Result<Url> {
        let session = key.and_then(|k| self.users.remove(k));
        let metadata = self.metadata().await?;

        let endpoint = metadata.end_session_endpoint.as_deref().ok_or_else(|| {
            TokenviewError::Logout("provider does not advertise an end_session_endpoint".to_string())
        })?;

        let mut url = Url::parse(endpoint)
            .map_err(|e| TokenviewError::Logout(format!("invalid end_session_endpoint: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(session) = &session {
                query.append_pair("id_token_hint", &session.id_token);
            }
            query.append_pair("client_id", &self.config.client_id);
            if let Some(post_logout) = &self.config.post_logout_redirect_uri {
                query.append_pair("post_logout_redirect_uri", post_logout.as_str());
            }
        }
        Ok(url)
    }

    fn clear_stale_state(&self) -> usize {
        self.pending.clear_stale(self.config.stale_state_age)
    }

    fn discard_session(&self, key: &SessionKey) -> bool {
        self.users.remove(key).is_some()
    }

    fn events(&self) -> &SessionEvents {
        &self.events
    }
}

/// The key named `kid`, or the only key when the token names none.
fn find_jwk<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => jwks.find(kid),
        None if jwks.keys.len() == 1 => jwks.keys.first(),
        None => None,
    }
}
