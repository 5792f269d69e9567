// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP server.
//!
//! This is a thin adapter that converts axum requests to [`isoroute::Request`],
//! calls [`App::handle`], and converts the [`isoroute::Response`] back. Streamed
//! documents are sent chunk by chunk.

use std::convert::Infallible;
use std::path::Path;
use std::sync::{Arc, RwLock};

use axum::{
    body::Body,
    extract::{Request, State, WebSocketUpgrade},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use isoroute::render::HOT_RELOAD_PATH;
use isoroute::{middleware, App, DocumentOptions};
use tower_http::trace::TraceLayer;

use super::assets::StaticDirs;
use super::livereload::{LiveReload, SCRIPT, SOCKET_PATH};
use crate::config::Config;

const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Shared server state.
pub struct ServerState {
    app: RwLock<Arc<App>>,
    reload: Option<LiveReload>,
}

impl ServerState {
    /// Wraps an app.
    pub fn new(app: App) -> Self {
        Self {
            app: RwLock::new(Arc::new(app)),
            reload: None,
        }
    }

    /// Enables the reload socket and script.
    pub fn with_live_reload(mut self, reload: LiveReload) -> Self {
        self.reload = Some(reload);
        self
    }

    /// The current app.
    pub fn app(&self) -> Arc<App> {
        match self.app.read() {
            Ok(app) => app.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Swaps in a rebuilt app. Requests already running keep the old one.
    pub fn replace(&self, app: App) {
        let app = Arc::new(app);
        match self.app.write() {
            Ok(mut current) => *current = app,
            Err(poisoned) => *poisoned.into_inner() = app,
        }
    }
}

/// Builds the app for the project at `root`.
///
/// A missing application directory yields an app without compiled routes.
pub fn build_app(config: &Config, root: &Path, dev: bool) -> anyhow::Result<App> {
    let app_dir = config.app_dir(root);
    let app = if app_dir.is_dir() {
        App::from_dir(&app_dir)?
    } else {
        tracing::warn!("Application directory {} not found", app_dir.display());
        App::new()
    };

    let mut assets = StaticDirs::new(config.asset_dirs(root));
    if dev {
        assets = assets.no_cache();
    }

    let mut app = app
        .document(DocumentOptions {
            version: config.project.version.clone(),
            dev,
        })
        .assets(assets);
    if dev {
        app = app.middleware(middleware::logger());
    }
    Ok(app)
}

/// Builds the axum router serving `state`.
pub fn router(state: Arc<ServerState>) -> Router {
    let mut router = Router::new();
    if state.reload.is_some() {
        router = router
            .route(SOCKET_PATH, get(livereload_handler))
            .route(HOT_RELOAD_PATH, get(hot_reload_script));
    }

    router
        .fallback(fallback_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves until the process stops.
pub async fn create_server(addr: &str, state: Arc<ServerState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn livereload_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> Response {
    match state.reload.clone() {
        Some(reload) => ws.on_upgrade(move |socket| async move { reload.serve(socket).await }),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn hot_reload_script() -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/javascript; charset=utf-8")], SCRIPT)
}

/// Hands every request not claimed above to the app.
async fn fallback_handler(State(state): State<Arc<ServerState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let body = if parts.method == Method::GET || parts.method == Method::HEAD {
        None
    } else {
        match axum::body::to_bytes(body, MAX_BODY_SIZE).await {
            Ok(bytes) if bytes.is_empty() => None,
            Ok(bytes) => Some(bytes.to_vec()),
            Err(_) => return (StatusCode::PAYLOAD_TOO_LARGE, "Body too large").into_response(),
        }
    };

    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut request = isoroute::Request::from_uri(parts.method.clone(), uri).with_headers(parts.headers);
    if let Some(body) = body {
        request = request.with_body(body);
    }

    let app = state.app();
    into_axum(app.handle(request).await)
}

/// Converts an app response into an axum response.
pub fn into_axum(response: isoroute::Response) -> Response {
    let body = match response.body {
        isoroute::Body::Empty => Body::empty(),
        isoroute::Body::Full(bytes) => Body::from(bytes),
        isoroute::Body::Chunks(chunks) => Body::from_stream(futures_util::stream::iter(
            chunks.into_iter().map(Ok::<_, Infallible>),
        )),
    };

    let mut out = Response::new(body);
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_into_axum_keeps_status_and_headers() {
        let mut response = isoroute::Response::text(StatusCode::CREATED, "made");
        response
            .headers
            .insert("x-extra", HeaderValue::from_static("1"));

        let out = into_axum(response);
        assert_eq!(out.status(), StatusCode::CREATED);
        assert_eq!(out.headers()["x-extra"], "1");
        assert_eq!(out.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
    }

    #[test]
    fn test_replace_swaps_app() {
        let state = ServerState::new(App::new());
        let before = state.app();
        state.replace(App::new());
        assert!(!Arc::ptr_eq(&before, &state.app()));
    }
}
