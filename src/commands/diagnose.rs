//! `check-config` and `discover` commands

use serde_json::json;
use url::Url;

use crate::config::Config;
use crate::error::{Result, TokenviewError};
use crate::oidc;
use crate::oidc::discovery::{discovery_url, fetch_provider_metadata};

/// Effective configuration as printed by `check-config`.
///
/// # Errors
///
/// Returns a configuration error when OIDC is enabled but incomplete or
/// malformed.
pub fn effective_config(config: &Config) -> Result<serde_json::Value> {
    let oidc = match config.oidc.resolve() {
        Ok(Some(resolved)) => json!({ "enabled": true, "settings": resolved.redacted() }),
        Ok(None) => json!({ "enabled": false }),
        Err(e) => {
            tracing::error!(error = %e, "Invalid OIDC configuration");
            return Err(e);
        }
    };

    Ok(json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port,
            "secure_cookies": config.server.secure_cookies,
            "debug_page": config.server.debug_page,
        },
        "oidc": oidc,
    }))
}

/// Validates the configuration and prints it with secrets redacted.
///
/// # Errors
///
/// See [`effective_config`].
pub fn check_config(config: &Config) -> Result<()> {
    let view = effective_config(config)?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Fetches the provider discovery document and prints its endpoints.
///
/// # Arguments
///
/// * `config` - Loaded configuration, for the configured authority
/// * `authority` - Authority to probe instead of the configured one
///
/// # Errors
///
/// Returns an error when no authority is available, it is not a URL, or
/// the discovery request fails.
pub async fn discover(config: &Config, authority: Option<String>) -> Result<()> {
    let raw = authority
        .or_else(|| config.oidc.authority.clone())
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| {
            TokenviewError::Config(
                "no authority configured; pass --authority or set oidc.authority".to_string(),
            )
        })?;
    let authority = Url::parse(raw.trim())
        .map_err(|e| TokenviewError::Config(format!("Invalid authority '{raw}': {e}")))?;

    let http = oidc::build_http_client()?;
    println!("Discovery document: {}", discovery_url(&authority)?);

    let meta = fetch_provider_metadata(&http, &authority).await?;
    println!("issuer:                 {}", meta.issuer);
    println!("authorization_endpoint: {}", meta.authorization_endpoint);
    println!("token_endpoint:         {}", meta.token_endpoint);
    for (name, value) in [
        ("userinfo_endpoint:     ", &meta.userinfo_endpoint),
        ("end_session_endpoint:  ", &meta.end_session_endpoint),
        ("jwks_uri:              ", &meta.jwks_uri),
    ] {
        println!("{} {}", name, value.as_deref().unwrap_or("(not advertised)"));
    }
    if let Some(methods) = &meta.code_challenge_methods_supported {
        println!("code_challenge_methods: {}", methods.join(", "));
    }
    Ok(())
}
