// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Server dispatcher.
//!
//! [`App`] owns the compiled [`RouteTable`], the global middleware and any
//! explicitly registered routes, and turns each [`Request`] into exactly one
//! [`Response`]:
//!
//! 1. `OPTIONS` → `204` preflight
//! 2. Explicit routes (`get`, `post`, ...) → middleware + route handlers
//! 3. Compiled routes → middleware + injection hook + module method handler
//! 4. Anything else → middleware + static assets + not-found handler
//!
//! Errors from any handler go to the error handler (default: `500` JSON).

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::{HeaderValue, Method, StatusCode};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::chain::{BoxHandler, Chain, Flow, Handler};
use crate::error::{Error, Result};
use crate::module::{LuaModule, RenderArgs, Runtime};
use crate::protocol;
use crate::render::{
    document, merge_layout_data, not_found_data, DocumentOptions, BUILTIN_NOT_FOUND,
};
use crate::request::Request;
use crate::resolver::FileSystemResolver;
use crate::response::{Response, ResponseBuilder};
use crate::router::{matcher_path, normalize_path, Matched, RouteEntry, RouteTable};

/// Value of the `X-Powered-By` header on every response.
pub const POWERED_BY: &str = "isoroute";

/// Source of static files consulted before the not-found page.
pub trait AssetSource: Send + Sync {
    /// Returns the asset for `req`, or `None` when there is none.
    fn fetch<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Result<Option<Response>>>;
}

/// Turns a dispatch error into a response.
pub type ErrorHandler = Arc<dyn Fn(&Error, &Request) -> Response + Send + Sync>;

fn default_error_handler(err: &Error, _req: &Request) -> Response {
    Response::internal_error(err.to_string())
}

/// The request dispatcher.
///
/// # Example
///
/// ```rust,ignore
/// use isoroute::{App, middleware};
///
/// let app = App::from_dir("./app")?
///     .middleware(middleware::logger())
///     .get("/health", handler(|_req, res| async move {
///         Ok(Flow::Respond(res.text("ok")))
///     }.boxed()))?;
///
/// let response = app.handle(Request::from_uri(Method::GET, "/")).await;
/// ```
pub struct App {
    routes: Option<Arc<RouteTable>>,
    middleware: Chain,
    explicit: HashMap<Method, matchit::Router<usize>>,
    explicit_chains: Vec<Chain>,
    assets: Option<Arc<dyn AssetSource>>,
    not_found: Option<BoxHandler>,
    on_error: ErrorHandler,
    document: DocumentOptions,
    template: ResponseBuilder,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Creates an app without compiled routes.
    pub fn new() -> Self {
        let mut template = ResponseBuilder::new();
        template.headers_mut().insert(
            http::header::HeaderName::from_static("x-powered-by"),
            HeaderValue::from_static(POWERED_BY),
        );

        Self {
            routes: None,
            middleware: Chain::new(),
            explicit: HashMap::new(),
            explicit_chains: Vec::new(),
            assets: None,
            not_found: None,
            on_error: Arc::new(default_error_handler),
            document: DocumentOptions::default(),
            template,
        }
    }

    /// Compiles the application directory at `app_dir`.
    pub fn from_dir<P: AsRef<Path>>(app_dir: P) -> Result<Self> {
        let resolver = FileSystemResolver::new(app_dir.as_ref());
        let routes = RouteTable::compile(&resolver)?;
        Ok(Self::new().with_routes(routes))
    }

    /// Uses a compiled route table.
    pub fn with_routes(mut self, routes: impl Into<Arc<RouteTable>>) -> Self {
        self.routes = Some(routes.into());
        self
    }

    /// The compiled route table, if any.
    pub fn routes(&self) -> Option<&Arc<RouteTable>> {
        self.routes.as_ref()
    }

    /// Appends a global middleware.
    pub fn middleware(mut self, handler: BoxHandler) -> Self {
        self.middleware.push(handler);
        self
    }

    /// Sets the document options (version, development mode).
    pub fn document(mut self, options: DocumentOptions) -> Self {
        self.document = options;
        self
    }

    /// Sets the static asset source.
    pub fn assets(mut self, assets: impl AssetSource + 'static) -> Self {
        self.assets = Some(Arc::new(assets));
        self
    }

    /// Replaces the default not-found handler.
    pub fn on_not_found(mut self, handler: BoxHandler) -> Self {
        self.not_found = Some(handler);
        self
    }

    /// Replaces the default error handler.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error, &Request) -> Response + Send + Sync + 'static,
    {
        self.on_error = Arc::new(handler);
        self
    }

    /// Registers an explicit route with a chain of handlers.
    ///
    /// `path` may use colon (`/users/:id`) or bracket (`/users/[id]`) style
    /// parameters.
    pub fn route(mut self, method: Method, path: &str, chain: Chain) -> Result<Self> {
        let converted = matcher_path(path)?;
        let index = self.explicit_chains.len();
        self.explicit
            .entry(method)
            .or_default()
            .insert(converted.as_str(), index)
            .map_err(|e| Error::Pattern {
                pattern: path.to_string(),
                message: e.to_string(),
            })?;
        self.explicit_chains.push(chain);
        Ok(self)
    }

    /// Registers a GET route.
    pub fn get(self, path: &str, handler: BoxHandler) -> Result<Self> {
        self.route(Method::GET, path, Chain::new().with(handler))
    }

    /// Registers a POST route.
    pub fn post(self, path: &str, handler: BoxHandler) -> Result<Self> {
        self.route(Method::POST, path, Chain::new().with(handler))
    }

    /// Registers a PUT route.
    pub fn put(self, path: &str, handler: BoxHandler) -> Result<Self> {
        self.route(Method::PUT, path, Chain::new().with(handler))
    }

    /// Registers a PATCH route.
    pub fn patch(self, path: &str, handler: BoxHandler) -> Result<Self> {
        self.route(Method::PATCH, path, Chain::new().with(handler))
    }

    /// Registers a DELETE route.
    pub fn delete(self, path: &str, handler: BoxHandler) -> Result<Self> {
        self.route(Method::DELETE, path, Chain::new().with(handler))
    }

    /// Dispatches one request.
    pub async fn handle(&self, mut req: Request) -> Response {
        let mut res = self.template.clone();

        if req.method == Method::OPTIONS {
            res.status(StatusCode::NO_CONTENT);
            return res.empty();
        }

        match self.dispatch(&mut req, &mut res).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!("Error handling {} {}: {}", req.method, req.path, err);
                let mut response = (self.on_error)(&err, &req);
                res.merge_into(&mut response);
                response
            }
        }
    }

    async fn dispatch(&self, req: &mut Request, res: &mut ResponseBuilder) -> Result<Response> {
        let chain = self.select(req);
        chain.run(req, res).await
    }

    /// Picks the chain for `req` and fills in its route parameters.
    fn select(&self, req: &mut Request) -> Chain {
        let mut chain = self.middleware.clone();

        let explicit = self.explicit.get(&req.method).and_then(|router| {
            router
                .at(normalize_path(&req.path))
                .ok()
                .map(|matched| (*matched.value, decode_params(matched.params.iter())))
        });
        if let Some((index, params)) = explicit {
            tracing::debug!("{} {} matched an explicit route", req.method, req.path);
            req.params = params;
            chain.extend(&self.explicit_chains[index]);
            return chain;
        }

        if let Some(routes) = &self.routes {
            if let Some(matched) = routes.find(&req.path) {
                req.params = matched.params;
                match matched.target {
                    Matched::Page(entry) => {
                        tracing::debug!("{} {} matched page {}", req.method, req.path, entry.template);
                        chain.push(Arc::new(PageHook {
                            entry: entry.clone(),
                            document: self.document.clone(),
                        }));
                        chain.push(Arc::new(MethodHandler {
                            module: entry.module.clone(),
                        }));
                    }
                    Matched::Api(api) => {
                        tracing::debug!("{} {} matched API {}", req.method, req.path, api.template);
                        chain.push(Arc::new(MethodHandler {
                            module: api.module.clone(),
                        }));
                    }
                }
                return chain;
            }
        }

        tracing::debug!("{} {} is unmatched", req.method, req.path);
        if let Some(assets) = &self.assets {
            chain.push(Arc::new(AssetHandler {
                assets: assets.clone(),
            }));
        }
        chain.push(self.not_found.clone().unwrap_or_else(|| {
            Arc::new(NotFoundPage {
                routes: self.routes.clone(),
                document: self.document.clone(),
            })
        }));
        chain
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.routes.is_some())
            .field("middleware", &self.middleware)
            .field("explicit_routes", &self.explicit_chains.len())
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

fn decode_params<'k, 'v>(params: impl Iterator<Item = (&'k str, &'v str)>) -> HashMap<String, String> {
    params
        .map(|(k, v)| {
            let value = urlencoding::decode(v)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| v.to_string());
            (k.to_string(), value)
        })
        .collect()
}

/// Serves GET and HEAD requests for a leaf page: full document or data only.
struct PageHook {
    entry: Arc<RouteEntry>,
    document: DocumentOptions,
}

impl Handler for PageHook {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut ResponseBuilder,
    ) -> BoxFuture<'a, Result<Flow>> {
        async move { protocol::serve(&self.entry, req, res, &self.document) }.boxed()
    }
}

/// Calls the module's handler for the request method, `405` without one.
struct MethodHandler {
    module: LuaModule,
}

impl Handler for MethodHandler {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut ResponseBuilder,
    ) -> BoxFuture<'a, Result<Flow>> {
        async move {
            if !self.module.handles(&req.method) {
                res.status(StatusCode::METHOD_NOT_ALLOWED);
                return Ok(Flow::Respond(res.json(&serde_json::json!({
                    "error": "Method not allowed",
                }))));
            }

            let runtime = Runtime::new()?;
            let mut response = runtime.instantiate(&self.module)?.call_method(req)?;
            res.merge_into(&mut response);
            Ok(Flow::Respond(response))
        }
        .boxed()
    }
}

struct AssetHandler {
    assets: Arc<dyn AssetSource>,
}

impl Handler for AssetHandler {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        _res: &'a mut ResponseBuilder,
    ) -> BoxFuture<'a, Result<Flow>> {
        async move {
            if req.method != Method::GET && req.method != Method::HEAD {
                return Ok(Flow::Next);
            }
            Ok(match self.assets.fetch(req).await? {
                Some(response) => Flow::Respond(response),
                None => Flow::Next,
            })
        }
        .boxed()
    }
}

/// Default not-found handler.
///
/// Renders `404.lua` (or a built-in page) inside the root layout. Without a
/// route table it answers JSON.
struct NotFoundPage {
    routes: Option<Arc<RouteTable>>,
    document: DocumentOptions,
}

impl NotFoundPage {
    fn render(&self, routes: &RouteTable, req: &Request, res: &mut ResponseBuilder) -> Result<Response> {
        let runtime = Runtime::new()?;
        let data = not_found_data();

        let page = match routes.not_found() {
            Some(module) => runtime.instantiate(module)?.render(RenderArgs {
                query: &req.query,
                params: &req.params,
                data: &data,
                children: None,
            })?,
            None => BUILTIN_NOT_FOUND.to_string(),
        };

        let html = match routes.root_layout() {
            Some(layout) => {
                let layout_data = merge_layout_data(
                    layout.data().unwrap_or(&serde_json::Value::Null),
                    &data,
                );
                runtime.instantiate(&layout.module)?.render(RenderArgs {
                    query: &req.query,
                    params: &req.params,
                    data: &layout_data,
                    children: Some(&page),
                })?
            }
            None => page,
        };

        res.status(StatusCode::NOT_FOUND);
        Ok(res.html_chunks(document(html, Some("Not found"), &self.document)))
    }
}

impl Handler for NotFoundPage {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut ResponseBuilder,
    ) -> BoxFuture<'a, Result<Flow>> {
        async move {
            match &self.routes {
                Some(routes) => Ok(Flow::Respond(self.render(routes, req, res)?)),
                None => {
                    let mut response = Response::not_found();
                    res.merge_into(&mut response);
                    Ok(Flow::Respond(response))
                }
            }
        }
        .boxed()
    }
}
