//! Static-asset serving collaborator: a gzip-capable file service plus a
//! request-path validator that keeps the API surface (`/ws`,
//! `/api/settings/...`) out of the static router's reach.

use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum UiRequestError {
    NotFound,
    MethodNotAllowed,
}

impl IntoResponse for UiRequestError {
    fn into_response(self) -> Response {
        match self {
            UiRequestError::NotFound => StatusCode::NOT_FOUND.into_response(),
            UiRequestError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        }
    }
}

fn is_blocked_path(raw_path: &str, blocked_prefix: &str) -> bool {
    raw_path == blocked_prefix
        || raw_path
            .strip_prefix(blocked_prefix)
            .is_some_and(|suffix| suffix.starts_with('/'))
}

/// Rejects methods other than GET/HEAD and any path under a reserved
/// (API/websocket) prefix, before the request reaches the static file
/// service.
pub fn validate_ui_request<'a>(
    method: &Method,
    uri: &'a Uri,
    blocked_prefixes: &[&str],
) -> Result<&'a str, UiRequestError> {
    let raw_path = uri.path();

    if blocked_prefixes
        .iter()
        .any(|prefix| is_blocked_path(raw_path, prefix))
    {
        return Err(UiRequestError::NotFound);
    }

    if *method != Method::GET && *method != Method::HEAD {
        return Err(UiRequestError::MethodNotAllowed);
    }

    Ok(raw_path)
}

/// The paths this collaborator never serves statically; they belong to the
/// core's websocket/API surface.
pub const RESERVED_PREFIXES: &[&str] = &["/ws", "/api"];

/// A directory-backed static file service, falling back to `index.html`
/// for extensionless paths. Wrap with [`compression_layer`] at the router
/// level to gzip responses.
pub fn serve_dir(root: impl AsRef<std::path::Path>) -> ServeDir {
    ServeDir::new(root).append_index_html_on_directories(true)
}

pub fn compression_layer() -> CompressionLayer {
    CompressionLayer::new().gzip(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_ui_request_accepts_get_and_head() {
        let get_uri = Uri::from_static("/dashboard");
        let head_uri = Uri::from_static("/healthz");

        assert_eq!(
            validate_ui_request(&Method::GET, &get_uri, &[]).unwrap(),
            "/dashboard"
        );
        assert_eq!(
            validate_ui_request(&Method::HEAD, &head_uri, &[]).unwrap(),
            "/healthz"
        );
    }

    #[test]
    fn validate_ui_request_rejects_non_get_head_methods() {
        let uri = Uri::from_static("/dashboard");
        let err = validate_ui_request(&Method::POST, &uri, &[]).unwrap_err();
        assert!(matches!(err, UiRequestError::MethodNotAllowed));
    }

    #[test]
    fn validate_ui_request_rejects_reserved_prefixes() {
        let ws = Uri::from_static("/ws");
        let api = Uri::from_static("/api/settings/server-logs");
        let not_blocked = Uri::from_static("/wsx");

        assert!(matches!(
            validate_ui_request(&Method::GET, &ws, RESERVED_PREFIXES).unwrap_err(),
            UiRequestError::NotFound
        ));
        assert!(matches!(
            validate_ui_request(&Method::GET, &api, RESERVED_PREFIXES).unwrap_err(),
            UiRequestError::NotFound
        ));
        assert_eq!(
            validate_ui_request(&Method::GET, &not_blocked, RESERVED_PREFIXES).unwrap(),
            "/wsx"
        );
    }
}
