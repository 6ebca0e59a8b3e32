//! HTML pages rendered with handlebars
//!
//! Templates are compiled into the binary. Handlebars escapes every
//! `{{value}}`, so claim values and raw tokens are safe to interpolate.

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;

use crate::error::{Result, TokenviewError};
use crate::oidc::UserSession;
use crate::web::routes::Route;

const LAYOUT_PARTIAL: &str = include_str!("../../templates/layout.hbs");
const HOME_TEMPLATE: &str = include_str!("../../templates/home.hbs");
const TOKEN_TEMPLATE: &str = include_str!("../../templates/token.hbs");
const DEBUG_TEMPLATE: &str = include_str!("../../templates/debug.hbs");

/// Result of probing the provider's discovery document
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub url: String,
    pub ok: bool,
    pub issuer: Option<String>,
    pub endpoints: Vec<Endpoint>,
    pub error: Option<String>,
}

/// A named provider endpoint
#[derive(Debug, Clone, Serialize)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
}

/// Compiled page templates.
#[derive(Debug)]
pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    /// Registers every template.
    ///
    /// # Errors
    ///
    /// Returns [`TokenviewError::Template`] if a template does not compile.
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);

        registry
            .register_partial("layout", LAYOUT_PARTIAL)
            .map_err(|e| TokenviewError::Template(format!("layout: {e}")))?;
        for (name, source) in [
            ("home", HOME_TEMPLATE),
            ("token", TOKEN_TEMPLATE),
            ("debug", DEBUG_TEMPLATE),
        ] {
            registry
                .register_template_string(name, source)
                .map_err(|e| TokenviewError::Template(format!("{name}: {e}")))?;
        }

        Ok(Self { registry })
    }

    fn render(&self, name: &str, data: &serde_json::Value) -> Result<String> {
        self.registry
            .render(name, data)
            .map_err(|e| TokenviewError::Template(format!("{name}: {e}")).into())
    }

    /// The entry document.
    pub fn home(&self, auth_enabled: bool) -> Result<String> {
        self.render(
            "home",
            &json!({
                "title": "OIDC Token Viewer",
                "auth_enabled": auth_enabled,
                "login_path": Route::Login.path(),
            }),
        )
    }

    /// Claims and raw tokens of an authenticated session.
    pub fn token(&self, session: &UserSession) -> Result<String> {
        self.render(
            "token",
            &json!({
                "title": "Token Information",
                "subject": session.subject(),
                "claims": session.claim_rows(),
                "id_token": session.id_token,
                "access_token": session.access_token,
                "token_type": session.token_type,
                "scope": session.scope,
                "expires_at": session.expires_at.map(|t| t.to_rfc3339()),
                "logout_path": Route::Logout.path(),
            }),
        )
    }

    /// Diagnostics: redacted settings and an optional connectivity probe.
    pub fn debug(
        &self,
        auth_enabled: bool,
        config: Option<&serde_json::Value>,
        probe: Option<&ProbeReport>,
    ) -> Result<String> {
        let config = config
            .map(serde_json::to_string_pretty)
            .transpose()?;
        self.render(
            "debug",
            &json!({
                "title": "OIDC Debug",
                "auth_enabled": auth_enabled,
                "config": config,
                "probe": probe,
                "debug_path": Route::Debug.path(),
                "home_path": Route::Home.path(),
            }),
        )
    }
}
