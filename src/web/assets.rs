//! Static assets embedded at compile time
//!
//! Files under `assets/` are compiled into the binary and served from the
//! site root with a one hour cache lifetime.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use include_dir::{include_dir, Dir};

static ASSETS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/assets");

/// `Cache-Control` applied to every asset
pub const ASSET_CACHE_CONTROL: &str = "public, max-age=3600";

/// Content type for a file name, guessed from its extension.
pub fn content_type(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

/// The embedded file for a request path, as a response.
///
/// Returns `None` when no asset matches, including for directory paths and
/// paths trying to leave the asset root.
pub fn asset_response(request_path: &str) -> Option<Response> {
    let path = request_path.trim_start_matches('/');
    if path.is_empty() || path.split('/').any(|segment| segment == "..") {
        return None;
    }

    let file = ASSETS.get_file(path)?;
    let mime = HeaderValue::from_str(&content_type(path)).ok()?;
    tracing::trace!(path, bytes = file.contents().len(), "Serving embedded asset");

    Some(
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, mime),
                (
                    header::CACHE_CONTROL,
                    HeaderValue::from_static(ASSET_CACHE_CONTROL),
                ),
            ],
            file.contents(),
        )
            .into_response(),
    )
}
