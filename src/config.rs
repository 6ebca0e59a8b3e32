//! Configuration management for tokenview
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! OIDC settings are kept in their raw, optional form ([`OidcSettings`])
//! until the auth facade resolves them into a validated [`SessionConfig`].
//! Resolution either yields `None` (OIDC intentionally disabled) or a
//! complete configuration; a half-filled configuration is a fatal error.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, TokenviewError};
use crate::oidc::session::MAX_CLOCK_SKEW;

/// Placeholder written in place of identifying values in log output
pub const REDACTED: &str = "***REDACTED***";

/// Main configuration structure for tokenview
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// OpenID Connect client settings
    #[serde(default)]
    pub oidc: OidcSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,

    /// Mark the session cookie `Secure` (enable behind HTTPS)
    #[serde(default)]
    pub secure_cookies: bool,

    /// Expose the `/debug` diagnostics page
    #[serde(default)]
    pub debug_page: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure_cookies: false,
            debug_page: false,
        }
    }
}

/// Raw OpenID Connect settings as read from file and environment
///
/// Every provider-specific field is optional here; [`OidcSettings::resolve`]
/// decides whether the set is disabled, complete, or invalid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcSettings {
    /// Turn OIDC off entirely; every auth operation becomes a no-op
    #[serde(default)]
    pub disabled: bool,

    /// Issuer base URL of the provider
    #[serde(default)]
    pub authority: Option<String>,

    /// Client identifier registered with the provider
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret for confidential clients
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Callback URL registered with the provider
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Where the provider sends the browser after end-session
    #[serde(default)]
    pub post_logout_redirect_uri: Option<String>,

    /// Space-separated scopes to request
    #[serde(default)]
    pub scope: Option<String>,

    /// OAuth response type; only `code` is supported
    #[serde(default = "default_response_type")]
    pub response_type: String,

    /// Merge claims from the userinfo endpoint into the profile
    #[serde(default = "default_true")]
    pub load_user_info: bool,

    /// Refresh tokens shortly before they expire
    #[serde(default)]
    pub automatic_silent_renew: bool,

    /// Probe the provider on each lookup to detect ended sessions
    #[serde(default)]
    pub monitor_session: bool,

    /// Drop protocol-only claims from the displayed profile
    #[serde(default = "default_true")]
    pub filter_protocol_claims: bool,

    /// Upper bound for silent renewal and monitoring requests (milliseconds)
    #[serde(default = "default_silent_request_timeout_ms")]
    pub silent_request_timeout_ms: u64,

    /// Tolerated clock difference when checking ID token times (seconds)
    #[serde(default = "default_clock_skew_seconds")]
    pub clock_skew_seconds: u64,

    /// Age after which an unanswered login attempt is discarded (seconds)
    #[serde(default = "default_stale_state_age_seconds")]
    pub stale_state_age_seconds: u64,
}

fn default_response_type() -> String {
    "code".to_string()
}

fn default_true() -> bool {
    true
}

fn default_silent_request_timeout_ms() -> u64 {
    1000
}

fn default_clock_skew_seconds() -> u64 {
    300
}

fn default_stale_state_age_seconds() -> u64 {
    3600
}

impl Default for OidcSettings {
    fn default() -> Self {
        Self {
            disabled: false,
            authority: None,
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            post_logout_redirect_uri: None,
            scope: None,
            response_type: default_response_type(),
            load_user_info: true,
            automatic_silent_renew: false,
            monitor_session: false,
            filter_protocol_claims: true,
            silent_request_timeout_ms: default_silent_request_timeout_ms(),
            clock_skew_seconds: default_clock_skew_seconds(),
            stale_state_age_seconds: default_stale_state_age_seconds(),
        }
    }
}

/// Validated OpenID Connect client configuration
///
/// Built only through [`SessionConfig::from_settings`] (or
/// [`OidcSettings::resolve`]), so every instance has all required fields and
/// well-formed URLs.
#[derive(Clone)]
pub struct SessionConfig {
    pub authority: Url,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: Url,
    pub post_logout_redirect_uri: Option<Url>,
    pub scope: String,
    pub response_type: String,
    pub load_user_info: bool,
    pub automatic_silent_renew: bool,
    pub monitor_session: bool,
    pub filter_protocol_claims: bool,
    pub silent_request_timeout: Duration,
    pub clock_skew: Duration,
    pub stale_state_age: Duration,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("authority", &self.authority.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| REDACTED))
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl SessionConfig {
    /// Names of the settings that must be present for OIDC to be enabled
    pub const REQUIRED_FIELDS: [&'static str; 4] =
        ["authority", "client_id", "redirect_uri", "scope"];

    /// Build a validated configuration from raw settings
    ///
    /// The `disabled` flag is not consulted here; see
    /// [`OidcSettings::resolve`].
    ///
    /// # Errors
    ///
    /// Returns [`TokenviewError::Config`] listing every missing required
    /// field, or describing the first malformed URL, unsupported response
    /// type or out-of-range duration.
    pub fn from_settings(settings: &OidcSettings) -> Result<Self> {
        let missing = settings.missing_required_fields();
        if !missing.is_empty() {
            return Err(TokenviewError::Config(format!(
                "Missing required OIDC configuration: {}",
                missing.join(", ")
            ))
            .into());
        }

        let authority = parse_url("authority", non_empty(&settings.authority))?;
        let redirect_uri = parse_url("redirect_uri", non_empty(&settings.redirect_uri))?;
        let post_logout_redirect_uri = match non_empty(&settings.post_logout_redirect_uri) {
            Some(raw) => Some(parse_url("post_logout_redirect_uri", Some(raw))?),
            None => None,
        };

        if settings.response_type != "code" {
            return Err(TokenviewError::Config(format!(
                "Unsupported response_type '{}': only the authorization code flow ('code') is supported",
                settings.response_type
            ))
            .into());
        }

        if settings.silent_request_timeout_ms == 0 {
            return Err(TokenviewError::Config(
                "oidc.silent_request_timeout_ms must be greater than 0".to_string(),
            )
            .into());
        }
        if settings.stale_state_age_seconds == 0 {
            return Err(TokenviewError::Config(
                "oidc.stale_state_age_seconds must be greater than 0".to_string(),
            )
            .into());
        }
        if settings.clock_skew_seconds > MAX_CLOCK_SKEW.as_secs() {
            return Err(TokenviewError::Config(format!(
                "oidc.clock_skew_seconds must be at most {}",
                MAX_CLOCK_SKEW.as_secs()
            ))
            .into());
        }

        Ok(Self {
            authority,
            client_id: non_empty(&settings.client_id)
                .unwrap_or_default()
                .to_string(),
            client_secret: non_empty(&settings.client_secret).map(str::to_string),
            redirect_uri,
            post_logout_redirect_uri,
            scope: non_empty(&settings.scope).unwrap_or_default().to_string(),
            response_type: settings.response_type.clone(),
            load_user_info: settings.load_user_info,
            automatic_silent_renew: settings.automatic_silent_renew,
            monitor_session: settings.monitor_session,
            filter_protocol_claims: settings.filter_protocol_claims,
            silent_request_timeout: Duration::from_millis(settings.silent_request_timeout_ms),
            clock_skew: Duration::from_secs(settings.clock_skew_seconds),
            stale_state_age: Duration::from_secs(settings.stale_state_age_seconds),
        })
    }

    /// JSON view of the configuration for logs and diagnostics
    ///
    /// The client id and authority are replaced by [`REDACTED`]; the client
    /// secret is reduced to a presence flag.
    pub fn redacted(&self) -> serde_json::Value {
        serde_json::json!({
            "authority": REDACTED,
            "client_id": REDACTED,
            "client_secret_set": self.client_secret.is_some(),
            "redirect_uri": self.redirect_uri.as_str(),
            "post_logout_redirect_uri": self.post_logout_redirect_uri.as_ref().map(Url::as_str),
            "scope": self.scope,
            "response_type": self.response_type,
            "load_user_info": self.load_user_info,
            "automatic_silent_renew": self.automatic_silent_renew,
            "monitor_session": self.monitor_session,
            "filter_protocol_claims": self.filter_protocol_claims,
            "silent_request_timeout_ms": self.silent_request_timeout.as_millis() as u64,
            "clock_skew_seconds": self.clock_skew.as_secs(),
            "stale_state_age_seconds": self.stale_state_age.as_secs(),
        })
    }
}

impl OidcSettings {
    /// Resolve raw settings into a validated configuration
    ///
    /// # Returns
    ///
    /// `Ok(None)` when OIDC is intentionally disabled, `Ok(Some(config))`
    /// when every required field is present and valid.
    ///
    /// # Errors
    ///
    /// Returns [`TokenviewError::Config`] when OIDC is enabled but the
    /// settings are incomplete or malformed.
    pub fn resolve(&self) -> Result<Option<SessionConfig>> {
        if self.disabled {
            tracing::debug!("OIDC disabled by configuration");
            return Ok(None);
        }
        SessionConfig::from_settings(self).map(Some)
    }

    /// Required fields that are absent or empty, in declaration order
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let values = [
            &self.authority,
            &self.client_id,
            &self.redirect_uri,
            &self.scope,
        ];
        SessionConfig::REQUIRED_FIELDS
            .iter()
            .zip(values)
            .filter(|(_, value)| non_empty(value).is_none())
            .map(|(name, _)| *name)
            .collect()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_url(field: &str, raw: Option<&str>) -> Result<Url> {
    let raw = raw.unwrap_or_default();
    Url::parse(raw).map_err(|e| {
        TokenviewError::Config(format!("Invalid URL for OIDC {field} '{raw}': {e}")).into()
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from file, environment, and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed command line, for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file {} not found, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    fn apply_env_vars(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply `TOKENVIEW_*` overrides using the given variable lookup
    ///
    /// Invalid numeric or boolean values are ignored with a warning.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("TOKENVIEW_HOST") {
            self.server.host = host;
        }

        // PORT is honored for platform compatibility; TOKENVIEW_PORT wins.
        for key in ["PORT", "TOKENVIEW_PORT"] {
            if let Some(port) = lookup(key) {
                match port.parse::<u16>() {
                    Ok(v) => {
                        self.server.port = v;
                        tracing::debug!(port = v, "Env override: {}", key);
                    }
                    Err(_) => tracing::warn!("Invalid value for {}: {}", key, port),
                }
            }
        }

        if let Some(value) = lookup("TOKENVIEW_SECURE_COOKIES") {
            match parse_bool(&value) {
                Some(v) => self.server.secure_cookies = v,
                None => tracing::warn!("Invalid value for TOKENVIEW_SECURE_COOKIES: {}", value),
            }
        }

        if let Some(value) = lookup("TOKENVIEW_DEBUG_PAGE") {
            match parse_bool(&value) {
                Some(v) => self.server.debug_page = v,
                None => tracing::warn!("Invalid value for TOKENVIEW_DEBUG_PAGE: {}", value),
            }
        }

        // ---------------------------------------------------------------------
        // OIDC settings
        // ---------------------------------------------------------------------
        let oidc = &mut self.oidc;

        let strings: [(&str, &mut Option<String>); 6] = [
            ("TOKENVIEW_OIDC_AUTHORITY", &mut oidc.authority),
            ("TOKENVIEW_OIDC_CLIENT_ID", &mut oidc.client_id),
            ("TOKENVIEW_OIDC_CLIENT_SECRET", &mut oidc.client_secret),
            ("TOKENVIEW_OIDC_REDIRECT_URI", &mut oidc.redirect_uri),
            (
                "TOKENVIEW_OIDC_POST_LOGOUT_REDIRECT_URI",
                &mut oidc.post_logout_redirect_uri,
            ),
            ("TOKENVIEW_OIDC_SCOPE", &mut oidc.scope),
        ];
        for (key, slot) in strings {
            if let Some(value) = lookup(key) {
                *slot = Some(value);
            }
        }

        if let Some(value) = lookup("TOKENVIEW_OIDC_RESPONSE_TYPE") {
            oidc.response_type = value;
        }

        let flags: [(&str, &mut bool); 5] = [
            ("TOKENVIEW_OIDC_DISABLED", &mut oidc.disabled),
            ("TOKENVIEW_OIDC_LOAD_USER_INFO", &mut oidc.load_user_info),
            (
                "TOKENVIEW_OIDC_AUTOMATIC_SILENT_RENEW",
                &mut oidc.automatic_silent_renew,
            ),
            ("TOKENVIEW_OIDC_MONITOR_SESSION", &mut oidc.monitor_session),
            (
                "TOKENVIEW_OIDC_FILTER_PROTOCOL_CLAIMS",
                &mut oidc.filter_protocol_claims,
            ),
        ];
        for (key, slot) in flags {
            if let Some(value) = lookup(key) {
                match parse_bool(&value) {
                    Some(v) => *slot = v,
                    None => tracing::warn!("Invalid value for {}: {}", key, value),
                }
            }
        }

        let numbers: [(&str, &mut u64); 3] = [
            (
                "TOKENVIEW_OIDC_SILENT_REQUEST_TIMEOUT_MS",
                &mut oidc.silent_request_timeout_ms,
            ),
            ("TOKENVIEW_OIDC_CLOCK_SKEW_SECONDS", &mut oidc.clock_skew_seconds),
            (
                "TOKENVIEW_OIDC_STALE_STATE_AGE_SECONDS",
                &mut oidc.stale_state_age_seconds,
            ),
        ];
        for (key, slot) in numbers {
            if let Some(value) = lookup(key) {
                match value.parse::<u64>() {
                    Ok(v) => *slot = v,
                    Err(_) => tracing::warn!("Invalid value for {}: {}", key, value),
                }
            }
        }

        // Build pipelines render pages without a provider.
        if lookup("TOKENVIEW_BUILD_TIME").is_some() {
            tracing::debug!("TOKENVIEW_BUILD_TIME set, disabling OIDC");
            oidc.disabled = true;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let crate::cli::Commands::Serve { host, port } = &cli.command {
            if let Some(host) = host {
                self.server.host = host.clone();
            }
            if let Some(port) = port {
                self.server.port = *port;
            }
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the server configuration
    ///
    /// OIDC settings are validated separately when the auth facade is
    /// constructed, since a disabled configuration is legitimately empty.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(TokenviewError::Config("server.host cannot be empty".to_string()).into());
        }

        if self.server.port == 0 {
            return Err(
                TokenviewError::Config("server.port must be greater than 0".to_string()).into(),
            );
        }

        Ok(())
    }
}
