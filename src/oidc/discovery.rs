//! OpenID Connect provider discovery
//!
//! Fetches the provider metadata document from
//! `<authority>/.well-known/openid-configuration` (OpenID Connect Discovery
//! 1.0, section 4). The authority path is preserved, so an authority of
//! `https://idp.example.com/realms/demo` resolves to
//! `https://idp.example.com/realms/demo/.well-known/openid-configuration`.

use std::collections::HashMap;

use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, TokenviewError};

/// Well-known suffix appended to the authority
pub const WELL_KNOWN_PATH: &str = ".well-known/openid-configuration";

// ---------------------------------------------------------------------------
// ProviderMetadata
// ---------------------------------------------------------------------------

/// OpenID Provider metadata document.
///
/// Only the endpoints used by the session client are modelled; every other
/// field the provider publishes is preserved in [`Self::extra`].
///
/// # Examples
///
/// ```
/// use tokenview::oidc::discovery::ProviderMetadata;
///
/// let json = r#"{
///     "issuer": "https://idp.example.com",
///     "authorization_endpoint": "https://idp.example.com/authorize",
///     "token_endpoint": "https://idp.example.com/token",
///     "grant_types_supported": ["authorization_code"]
/// }"#;
///
/// let meta: ProviderMetadata = serde_json::from_str(json).unwrap();
/// assert_eq!(meta.issuer, "https://idp.example.com");
/// assert!(meta.end_session_endpoint.is_none());
/// assert!(meta.extra.contains_key("grant_types_supported"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer identifier; ID tokens must carry this value in `iss`.
    pub issuer: String,

    /// Authorization endpoint the browser is redirected to.
    pub authorization_endpoint: String,

    /// Token endpoint for the code and refresh token grants.
    pub token_endpoint: String,

    /// UserInfo endpoint, used for claim loading and session monitoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// RP-initiated logout endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    /// JSON Web Key Set location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// Scopes the provider advertises.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// PKCE methods the provider advertises.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Builds the discovery document URL for an authority.
///
/// Query and fragment components of the authority are dropped.
pub fn discovery_url(authority: &Url) -> Result<Url> {
    let mut base = authority.clone();
    base.set_query(None);
    base.set_fragment(None);
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(WELL_KNOWN_PATH).map_err(|e| {
        TokenviewError::Discovery(format!("cannot build discovery URL for {authority}: {e}"))
            .into()
    })
}

/// Fetches and parses the provider metadata document.
///
/// # Arguments
///
/// * `http` - Shared HTTP client
/// * `authority` - Issuer base URL of the provider
///
/// # Errors
///
/// Returns [`TokenviewError::Discovery`] when the request fails, the
/// provider answers with a non-success status, or the document lacks a
/// required field.
///
/// # Examples
///
/// ```no_run
/// use url::Url;
/// use tokenview::oidc::discovery::fetch_provider_metadata;
///
/// # async fn example() -> tokenview::error::Result<()> {
/// let http = reqwest::Client::new();
/// let authority = Url::parse("https://idp.example.com")?;
/// let meta = fetch_provider_metadata(&http, &authority).await?;
/// println!("token endpoint: {}", meta.token_endpoint);
/// # Ok(())
/// # }
/// ```
pub async fn fetch_provider_metadata(
    http: &reqwest::Client,
    authority: &Url,
) -> Result<ProviderMetadata> {
    let url = discovery_url(authority)?;
    tracing::debug!(url = %url, "Fetching provider metadata");

    let resp = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| TokenviewError::Discovery(format!("metadata fetch failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(TokenviewError::Discovery(format!(
            "{url} returned {}",
            resp.status()
        ))
        .into());
    }

    let meta: ProviderMetadata = resp
        .json()
        .await
        .map_err(|e| TokenviewError::Discovery(format!("failed to parse metadata: {e}")))?;

    tracing::debug!(
        issuer = %meta.issuer,
        userinfo = meta.userinfo_endpoint.is_some(),
        end_session = meta.end_session_endpoint.is_some(),
        "Provider metadata loaded"
    );
    Ok(meta)
}

/// Fetches the provider's JSON Web Key Set.
///
/// # Errors
///
/// Returns [`TokenviewError::Discovery`] when the request fails or the body
/// is not a key set.
pub async fn fetch_jwks(http: &reqwest::Client, jwks_uri: &str) -> Result<JwkSet> {
    tracing::debug!(url = %jwks_uri, "Fetching provider signing keys");

    let resp = http
        .get(jwks_uri)
        .send()
        .await
        .map_err(|e| TokenviewError::Discovery(format!("JWKS fetch failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(TokenviewError::Discovery(format!(
            "{jwks_uri} returned {}",
            resp.status()
        ))
        .into());
    }

    let jwks: JwkSet = resp
        .json()
        .await
        .map_err(|e| TokenviewError::Discovery(format!("failed to parse JWKS: {e}")))?;

    tracing::debug!(keys = jwks.keys.len(), "Provider signing keys loaded");
    Ok(jwks)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
