// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Static files served ahead of the not-found page.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::header::CACHE_CONTROL;
use http::{HeaderValue, Method, StatusCode, Uri};
use isoroute::{AssetSource, Body, Request, Response};
use std::path::PathBuf;
use tower::ServiceExt;
use tower_http::services::ServeDir;

/// Serves files from a list of directories; the first hit wins.
#[derive(Debug, Clone)]
pub struct StaticDirs {
    dirs: Vec<ServeDir>,
    cache_control: Option<HeaderValue>,
}

impl StaticDirs {
    /// Creates a source over `dirs`.
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs: dirs
                .into_iter()
                .map(|dir| ServeDir::new(dir).append_index_html_on_directories(false))
                .collect(),
            cache_control: None,
        }
    }

    /// Sends `Cache-Control: no-cache` with every asset.
    pub fn no_cache(mut self) -> Self {
        self.cache_control = Some(HeaderValue::from_static("no-cache"));
        self
    }

    fn forward(req: &Request, uri: &Uri) -> isoroute::Result<http::Request<axum::body::Body>> {
        let mut request = http::Request::builder()
            .method(req.method.clone())
            .uri(uri.clone())
            .body(axum::body::Body::empty())
            .map_err(|e| isoroute::Error::Resolution(e.to_string()))?;
        *request.headers_mut() = req.headers.clone();
        Ok(request)
    }
}

impl AssetSource for StaticDirs {
    fn fetch<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, isoroute::Result<Option<Response>>> {
        async move {
            if req.method != Method::GET && req.method != Method::HEAD {
                return Ok(None);
            }
            let Ok(uri) = Uri::try_from(req.path.as_str()) else {
                return Ok(None);
            };

            for dir in &self.dirs {
                let served = match dir.clone().oneshot(Self::forward(req, &uri)?).await {
                    Ok(served) => served,
                    Err(never) => match never {},
                };
                if served.status() == StatusCode::NOT_FOUND {
                    continue;
                }

                tracing::debug!("Serving {} ({})", req.path, served.status());
                let (parts, body) = served.into_parts();
                let bytes = axum::body::to_bytes(axum::body::Body::new(body), usize::MAX)
                    .await
                    .map_err(|e| isoroute::Error::Io(std::io::Error::other(e)))?;

                let mut response = Response::new(parts.status);
                response.headers = parts.headers;
                response.body = if req.method == Method::HEAD {
                    Body::Empty
                } else {
                    Body::Full(bytes.to_vec())
                };
                if let Some(value) = &self.cache_control {
                    response.headers.insert(CACHE_CONTROL, value.clone());
                }
                return Ok(Some(response));
            }
            Ok(None)
        }
        .boxed()
    }
}
