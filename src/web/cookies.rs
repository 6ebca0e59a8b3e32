//! Session cookie handling

use axum::http::{header, HeaderMap, HeaderValue};

use crate::error::{Result, TokenviewError};
use crate::oidc::SessionKey;

/// Name of the cookie carrying the session key
pub const SESSION_COOKIE: &str = "tokenview_session";

const CLEAR_COOKIE: &str =
    "tokenview_session=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; HttpOnly; SameSite=Lax; Path=/";
const CLEAR_COOKIE_SECURE: &str =
    "tokenview_session=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; HttpOnly; Secure; SameSite=Lax; Path=/";

/// Returns the value of cookie `name` from the request headers.
pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

/// The session key carried by the request, if it is well formed.
pub fn session_key(headers: &HeaderMap) -> Option<SessionKey> {
    parse_cookie(headers, SESSION_COOKIE).and_then(|raw| SessionKey::parse(&raw))
}

/// `Set-Cookie` value establishing the session.
///
/// `SameSite=Lax` so the cookie is sent on the top-level navigation that
/// follows the provider redirect.
pub fn set_session_cookie(key: &SessionKey, secure: bool) -> Result<HeaderValue> {
    let secure = if secure { " Secure;" } else { "" };
    let value = format!(
        "{}={}; HttpOnly;{} SameSite=Lax; Path=/",
        SESSION_COOKIE,
        key.as_str(),
        secure
    );
    HeaderValue::from_str(&value)
        .map_err(|e| TokenviewError::Session(format!("invalid session cookie: {e}")).into())
}

/// `Set-Cookie` value removing the session cookie.
pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    HeaderValue::from_static(if secure {
        CLEAR_COOKIE_SECURE
    } else {
        CLEAR_COOKIE
    })
}
