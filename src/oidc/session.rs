//! User sessions, token responses and ID token claim handling

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TokenviewError};
use crate::oidc::pkce::random_token;

/// Claims that only carry protocol state and are dropped from the profile
/// when `filter_protocol_claims` is enabled.
pub const PROTOCOL_CLAIMS: [&str; 8] = [
    "nbf",
    "jti",
    "auth_time",
    "nonce",
    "acr",
    "amr",
    "azp",
    "at_hash",
];

// ---------------------------------------------------------------------------
// SessionKey
// ---------------------------------------------------------------------------

/// Opaque identifier of a browser session.
///
/// 32 random bytes in base64url without padding. The `Debug` and `Display`
/// forms only show a short prefix.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    const ENCODED_LEN: usize = 43;

    /// Generates a new random key.
    pub fn generate() -> Self {
        Self(random_token(32))
    }

    /// Accepts a value read back from a cookie.
    ///
    /// Returns `None` for anything that could not have been produced by
    /// [`SessionKey::generate`].
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == Self::ENCODED_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        well_formed.then(|| Self(raw.to_string()))
    }

    /// The full encoded key, for the cookie value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn prefix(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey({}...)", self.prefix())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}...", self.prefix())
    }
}

// ---------------------------------------------------------------------------
// UserSession
// ---------------------------------------------------------------------------

/// An authenticated session for one browser.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserSession {
    /// Key under which the session client stores this session.
    pub key: SessionKey,

    /// Identity claims shown to the user.
    pub profile: Map<String, Value>,

    /// Raw ID token as issued.
    pub id_token: String,

    /// Raw access token as issued.
    pub access_token: String,

    /// Token type, normally `Bearer`.
    pub token_type: String,

    /// Refresh token, when the provider issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Absolute expiry of the access token.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for UserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSession")
            .field("key", &self.key)
            .field("subject", &self.subject())
            .field("token_type", &self.token_type)
            .field("refresh_token", &self.refresh_token.is_some())
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl UserSession {
    /// The `sub` claim, when present.
    pub fn subject(&self) -> Option<&str> {
        self.profile.get("sub").and_then(Value::as_str)
    }

    /// Whether the access token has expired. Sessions without an expiry
    /// never expire.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// Whether the access token expires within `window` from now.
    pub fn expires_within(&self, window: Duration) -> bool {
        let limit = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| Utc::now().checked_add_signed(w));
        self.expires_at
            .is_some_and(|at| limit.map_or(true, |limit| limit >= at))
    }

    /// Profile claims as display rows, in claim-name order.
    ///
    /// Strings are shown as-is; objects, arrays and null are shown as
    /// compact JSON; numbers and booleans use their JSON text.
    pub fn claim_rows(&self) -> Vec<ClaimRow> {
        self.profile
            .iter()
            .map(|(name, value)| ClaimRow {
                name: name.clone(),
                value: display_claim_value(value),
            })
            .collect()
    }

    /// Replaces the tokens after a successful refresh.
    ///
    /// Values the refresh response omits (refresh token, scope, ID token)
    /// are kept from the previous grant.
    pub fn apply_refresh(&mut self, tokens: TokenResponse) {
        self.expires_at = tokens.expires_at();
        self.access_token = tokens.access_token;
        self.token_type = tokens.token_type;
        if let Some(refresh) = tokens.refresh_token {
            self.refresh_token = Some(refresh);
        }
        if let Some(scope) = tokens.scope {
            self.scope = Some(scope);
        }
        if let Some(id_token) = tokens.id_token {
            self.id_token = id_token;
        }
    }
}

/// One claim as displayed in the token view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimRow {
    pub name: String,
    pub value: String,
}

fn display_claim_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Token endpoint response
// ---------------------------------------------------------------------------

/// Raw JSON response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    /// `expires_in` converted to an absolute timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in.and_then(|secs| {
            let secs = i64::try_from(secs).ok()?;
            Utc::now().checked_add_signed(chrono::Duration::try_seconds(secs)?)
        })
    }
}

// ---------------------------------------------------------------------------
// ID token claims
// ---------------------------------------------------------------------------

/// Largest clock skew honoured when checking `exp` and `nbf`.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(24 * 60 * 60);

/// Values an ID token must match.
#[derive(Debug, Clone)]
pub struct IdTokenExpectations<'a> {
    pub issuer: &'a str,
    pub client_id: &'a str,
    pub nonce: &'a str,
    /// Leeway for `exp` and `nbf`, capped at [`MAX_CLOCK_SKEW`]
    pub clock_skew: Duration,
}

/// Reads the JOSE header of an ID token. Nothing is verified.
///
/// # Errors
///
/// Returns [`TokenviewError::TokenExchange`] when the header cannot be
/// decoded or names an unsupported algorithm.
pub fn id_token_header(id_token: &str) -> Result<Header> {
    jsonwebtoken::decode_header(id_token).map_err(|e| {
        TokenviewError::TokenExchange(format!("ID token header is invalid: {e}")).into()
    })
}

/// Verifies an ID token signature and its claims (OIDC Core 3.1.3.7).
///
/// Issuer, audience, `exp` and `nbf` are checked by `jsonwebtoken`; the
/// nonce is checked here against the pending login.
///
/// # Arguments
///
/// * `id_token` - Compact JWS from the token response
/// * `key` - Provider key matching the token header
/// * `expected` - Values the claims must carry
///
/// # Errors
///
/// Returns [`TokenviewError::TokenExchange`] naming the first failed check.
pub fn validate_id_token(
    id_token: &str,
    key: &DecodingKey,
    expected: &IdTokenExpectations<'_>,
) -> Result<Map<String, Value>> {
    let header = id_token_header(id_token)?;

    let mut validation = Validation::new(header.alg);
    validation.set_issuer(&[expected.issuer]);
    validation.set_audience(&[expected.client_id]);
    validation.set_required_spec_claims(&["exp", "iss", "aud"]);
    validation.validate_nbf = true;
    validation.leeway = expected.clock_skew.min(MAX_CLOCK_SKEW).as_secs();

    let claims = jsonwebtoken::decode::<Map<String, Value>>(id_token, key, &validation)
        .map_err(id_token_error)?
        .claims;

    if claims.get("nonce").and_then(Value::as_str) != Some(expected.nonce) {
        return Err(TokenviewError::TokenExchange(
            "ID token nonce does not match the login request".to_string(),
        )
        .into());
    }
    Ok(claims)
}

fn id_token_error(err: jsonwebtoken::errors::Error) -> anyhow::Error {
    let message = match err.kind() {
        ErrorKind::InvalidIssuer => "ID token issuer does not match the provider".to_string(),
        ErrorKind::InvalidAudience => "ID token audience does not include this client".to_string(),
        ErrorKind::ExpiredSignature => "ID token has expired".to_string(),
        ErrorKind::ImmatureSignature => "ID token is not valid yet".to_string(),
        ErrorKind::InvalidSignature => "ID token signature is invalid".to_string(),
        ErrorKind::MissingRequiredClaim(claim) => format!("ID token has no {claim} claim"),
        _ => format!("ID token rejected: {err}"),
    };
    TokenviewError::TokenExchange(message).into()
}

/// Removes [`PROTOCOL_CLAIMS`] from a profile.
pub fn filter_protocol_claims(profile: &mut Map<String, Value>) {
    for claim in PROTOCOL_CLAIMS {
        profile.remove(claim);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
