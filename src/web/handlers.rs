//! Route handlers

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::oidc::discovery::{discovery_url, fetch_provider_metadata};
use crate::oidc::CallbackParams;
use crate::web::callback::{CallbackHandler, CallbackOutcome};
use crate::web::guard::ProtectedSession;
use crate::web::pages::{Endpoint, ProbeReport};
use crate::web::routes::Route;
use crate::web::{assets, cookies, AppState, WebError};

pub async fn home(State(state): State<AppState>) -> Result<Html<String>, WebError> {
    Ok(Html(state.pages.home(state.auth.is_enabled())?))
}

pub async fn login(State(state): State<AppState>) -> Redirect {
    match state.auth.login().await {
        Ok(Some(url)) => Redirect::to(url.as_str()),
        Ok(None) => Redirect::to(Route::Home.path()),
        Err(e) => {
            tracing::warn!(error = %e, "Login failed, returning home");
            Redirect::to(Route::Home.path())
        }
    }
}

pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response, WebError> {
    let previous = cookies::session_key(&headers);
    let handler = CallbackHandler::new(state.auth.clone());
    let outcome = handler.run(&params, previous.as_ref()).await;
    let next = Redirect::to(outcome.next_route().path());

    match outcome {
        CallbackOutcome::Authenticated {
            session: Some(session),
        } => {
            let cookie = cookies::set_session_cookie(&session.key, state.options.secure_cookies)?;
            Ok(([(header::SET_COOKIE, cookie)], next).into_response())
        }
        _ => Ok(next.into_response()),
    }
}

pub async fn token(
    State(state): State<AppState>,
    ProtectedSession(session): ProtectedSession,
) -> Result<Html<String>, WebError> {
    Ok(Html(state.pages.token(&session)?))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let key = cookies::session_key(&headers);
    let target = match state.auth.logout(key.as_ref()).await {
        Ok(Some(url)) => Redirect::to(url.as_str()),
        Ok(None) => Redirect::to(Route::Home.path()),
        Err(e) => {
            tracing::warn!(error = %e, "Logout redirect unavailable, returning home");
            Redirect::to(Route::Home.path())
        }
    };

    let clear = cookies::clear_session_cookie(state.options.secure_cookies);
    ([(header::SET_COOKIE, clear)], target).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct DebugQuery {
    #[serde(default)]
    pub probe: bool,
}

pub async fn debug(
    State(state): State<AppState>,
    Query(query): Query<DebugQuery>,
) -> Result<Response, WebError> {
    if !state.options.debug_page {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }

    let diagnostics = &state.diagnostics;
    let probe = match (&diagnostics.authority, query.probe) {
        (Some(authority), true) => Some(probe_provider(&diagnostics.http, authority).await),
        _ => None,
    };

    let html = state.pages.debug(
        state.auth.is_enabled(),
        diagnostics.config.as_ref(),
        probe.as_ref(),
    )?;
    Ok(Html(html).into_response())
}

async fn probe_provider(http: &reqwest::Client, authority: &url::Url) -> ProbeReport {
    let url = discovery_url(authority)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| authority.to_string());

    match fetch_provider_metadata(http, authority).await {
        Ok(meta) => {
            let optional = [
                ("userinfo_endpoint", &meta.userinfo_endpoint),
                ("end_session_endpoint", &meta.end_session_endpoint),
                ("jwks_uri", &meta.jwks_uri),
            ];
            let mut endpoints = vec![
                Endpoint {
                    name: "authorization_endpoint".to_string(),
                    url: meta.authorization_endpoint.clone(),
                },
                Endpoint {
                    name: "token_endpoint".to_string(),
                    url: meta.token_endpoint.clone(),
                },
            ];
            endpoints.extend(optional.into_iter().filter_map(|(name, value)| {
                value.as_ref().map(|url| Endpoint {
                    name: name.to_string(),
                    url: url.clone(),
                })
            }));
            ProbeReport {
                url,
                ok: true,
                issuer: Some(meta.issuer.clone()),
                endpoints,
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Provider probe failed");
            ProbeReport {
                url,
                ok: false,
                issuer: None,
                endpoints: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}

/// Embedded asset when the path names one, otherwise the entry document.
pub async fn fallback(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::NOT_FOUND.into_response();
    }
    if let Some(asset) = assets::asset_response(uri.path()) {
        return asset;
    }
    match state.pages.home(state.auth.is_enabled()) {
        Ok(html) => Html(html).into_response(),
        Err(e) => WebError::from(e).into_response(),
    }
}
