//! The axum HTTP surface: the `/ws` upgrade, the `/api/settings/server-logs`
//! toggle, and static file serving for `public/`.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;

use crate::hub::Hub;

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub log_sink: Arc<dyn radar_ui_log::LogSink>,
}

pub fn build_router(state: AppState, public_dir: Option<PathBuf>) -> Router {
    let mut router = Router::new()
        .route("/ws", get(ws_handler))
        .route(
            "/api/settings/server-logs",
            get(get_server_logs_setting).post(set_server_logs_setting),
        )
        .with_state(state);

    if let Some(dir) = public_dir.filter(|d| d.is_dir()) {
        // `validate_ui_request` is scoped to only this fallback service, not
        // the whole router: applied router-wide it would also reject the
        // already-registered `/ws` and `/api/...` routes above, both of
        // which match `RESERVED_PREFIXES`.
        let static_service = ServiceBuilder::new()
            .layer(middleware::from_fn(validate_static_request))
            .service(radar_ui_http::serve_dir(dir));
        router = router
            .fallback_service(static_service)
            .layer(radar_ui_http::compression_layer());
    } else {
        router = router.fallback(placeholder_page);
    }

    router
}

async fn validate_static_request(request: Request, next: Next) -> Response {
    match radar_ui_http::validate_ui_request(
        request.method(),
        request.uri(),
        radar_ui_http::RESERVED_PREFIXES,
    ) {
        Ok(_) => next.run(request).await,
        Err(rejection) => rejection.into_response(),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    // The capacity check and slot reservation happen here, before
    // `on_upgrade`, so a full hub can still answer with a real pre-upgrade
    // HTTP 503 instead of completing the handshake and only discovering
    // there was no room afterwards.
    let id = match state.hub.reserve_slot().await {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(%err, "rejected websocket upgrade");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };
    ws.on_upgrade(move |socket| async move {
        state.hub.attach_socket(id, socket, state.log_sink.clone()).await;
    })
}

#[derive(Debug, Serialize)]
struct ServerLogsSetting {
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct SetServerLogsSetting {
    enabled: bool,
}

async fn get_server_logs_setting(State(state): State<AppState>) -> Json<ServerLogsSetting> {
    Json(ServerLogsSetting {
        enabled: state.log_sink.is_enabled(),
    })
}

async fn set_server_logs_setting(
    State(state): State<AppState>,
    Json(body): Json<SetServerLogsSetting>,
) -> StatusCode {
    state.log_sink.set_enabled(body.enabled);
    StatusCode::OK
}

async fn placeholder_page() -> axum::response::Html<&'static str> {
    axum::response::Html(
        "<html><body><h1>radar</h1><p>No <code>public/</code> directory found; \
         static assets are not being served.</p></body></html>",
    )
}
