//! Shared helpers for integration tests: a wiremock-backed OpenID provider
//! and ID tokens signed with a fixed RSA test key.

use std::fs;
use std::path::PathBuf;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tokenview::config::{OidcSettings, SessionConfig};

pub const CLIENT_ID: &str = "tokenview-test";
pub const REDIRECT_URI: &str = "http://localhost:3000/callback";
pub const POST_LOGOUT_URI: &str = "http://localhost:3000/";

/// `kid` of the provider signing key
#[allow(dead_code)]
pub const SIGNING_KID: &str = "tokenview-test-key";
#[allow(dead_code)]
const SIGNING_KEY_PEM: &[u8] = include_bytes!("../fixtures/signing_key.pem");
/// Modulus of `fixtures/signing_key.pem`, base64url
const SIGNING_KEY_N: &str = "v2cZjhERTFm7MwD8KViNRI3fQgMeNQxqFStfHYvah_krKhy4QcAgnW7mdSIYA8TOzUN6QKv22ea2LCnmMxPLHRYTfBitGhdagTNp9_sCoAKjJfdujE8WCbZDted8a2MonDdy_OrnolGpOFQCmQ7Lj2DczSVuDUY69n0daNqzO8gbOD-fytOAGpgbdLuZbFe0ZkO30X6PveZ376hBoOFza6lJJ94sDvTdqeO-Z0KI03SBC0QgXi0deHV9zygcoc34hRpHPE5X-jdrR-MazmOiE3zoBV0ziUYBtm8DIubwqnqYl90K4b5COsReoKt8OTkr-mZRcczBqjyLmtOrSJE9Lw";

/// A mock OpenID provider serving discovery, token, userinfo and logout.
#[allow(dead_code)]
pub struct TestProvider {
    pub server: MockServer,
}

#[allow(dead_code)]
impl TestProvider {
    /// Starts a provider advertising every endpoint.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let provider = Self { server };
        let metadata = provider.metadata();
        provider.mount_discovery(metadata).await;
        provider
    }

    /// Starts a provider whose discovery document is `edit` applied to the
    /// default metadata.
    pub async fn start_with(edit: impl FnOnce(&mut Value)) -> Self {
        let server = MockServer::start().await;
        let provider = Self { server };
        let mut metadata = provider.metadata();
        edit(&mut metadata);
        provider.mount_discovery(metadata).await;
        provider
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub fn metadata(&self) -> Value {
        let base = self.server.uri();
        json!({
            "issuer": base,
            "authorization_endpoint": format!("{base}/authorize"),
            "token_endpoint": format!("{base}/token"),
            "userinfo_endpoint": format!("{base}/userinfo"),
            "end_session_endpoint": format!("{base}/logout"),
            "jwks_uri": format!("{base}/jwks"),
            "scopes_supported": ["openid", "profile", "email"],
            "code_challenge_methods_supported": ["S256"],
        })
    }

    async fn mount_discovery(&self, metadata: Value) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks()))
            .mount(&self.server)
            .await;
    }

    /// Settings pointing at this provider.
    pub fn settings(&self) -> OidcSettings {
        settings_for(&self.issuer())
    }

    pub fn session_config(&self) -> SessionConfig {
        self.settings()
            .resolve()
            .expect("valid settings")
            .expect("enabled settings")
    }

    /// Answers the authorization code grant with `body`.
    pub async fn mount_code_exchange(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answers the refresh token grant with `response`.
    pub async fn mount_refresh(&self, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_userinfo(&self, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Bodies of every request received on `request_path`.
    pub async fn bodies_for(&self, request_path: &str) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect()
    }
}

/// Complete settings for a provider at `authority`.
#[allow(dead_code)]
pub fn settings_for(authority: &str) -> OidcSettings {
    OidcSettings {
        authority: Some(authority.to_string()),
        client_id: Some(CLIENT_ID.to_string()),
        redirect_uri: Some(REDIRECT_URI.to_string()),
        post_logout_redirect_uri: Some(POST_LOGOUT_URI.to_string()),
        scope: Some("openid profile email".to_string()),
        ..OidcSettings::default()
    }
}

/// Public half of the test signing key as a JWK set.
pub fn jwks() -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": SIGNING_KID,
            "n": SIGNING_KEY_N,
            "e": "AQAB",
        }]
    })
}

/// Signs `claims` as an RS256 ID token under `kid`.
#[allow(dead_code)]
pub fn sign_with_kid(claims: &Value, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(SIGNING_KEY_PEM).expect("valid test key");
    jsonwebtoken::encode(&header, claims, &key).expect("signable claims")
}

/// Signs `claims` with the provider's advertised key.
#[allow(dead_code)]
pub fn signed_id_token(claims: &Value) -> String {
    sign_with_kid(claims, SIGNING_KID)
}

/// ID token claims a well-behaved provider would issue for alice.
#[allow(dead_code)]
pub fn id_token_claims(issuer: &str, nonce: &str) -> Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "iss": issuer,
        "aud": CLIENT_ID,
        "sub": "alice",
        "email": "alice@example.com",
        "nonce": nonce,
        "iat": now,
        "exp": now + 3600,
        "auth_time": now,
        "at_hash": "x1y2z3",
        "sid": "provider-session-1",
    })
}

/// Token endpoint response carrying `id_token`.
#[allow(dead_code)]
pub fn token_body(id_token: &str, expires_in: i64) -> Value {
    json!({
        "access_token": "access-1",
        "token_type": "Bearer",
        "expires_in": expires_in,
        "refresh_token": "refresh-1",
        "scope": "openid profile email",
        "id_token": id_token,
    })
}

#[allow(dead_code)]
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
