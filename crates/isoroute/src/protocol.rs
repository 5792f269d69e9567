// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Isomorphic data protocol.
//!
//! One route answers two kinds of GET requests:
//!
//! - **Full render**: no data marker. Loaders run, the page is rendered inside
//!   its layouts and the result is sent as an HTML document that boots the
//!   client bundle.
//! - **Data only**: the reserved `_$` query parameter names one level of the
//!   route (`-1` or `page` for the page, `i` for `layouts[i]`). Only that
//!   level's data is returned, never HTML.
//!
//! The client router builds its data URLs with [`data_url`], so both sides
//! agree on the level numbering.

use http::header::{CACHE_CONTROL, ETAG, IF_NONE_MATCH};
use http::{HeaderValue, Method, StatusCode};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::chain::Flow;
use crate::error::{Error, Result};
use crate::module::{LoaderOutput, LuaModule, Runtime};
use crate::render::{document, render_tree, DocumentOptions, Layer};
use crate::request::Request;
use crate::response::{Body, Response, ResponseBuilder};
use crate::router::RouteEntry;

/// The reserved query parameter selecting a data-only response.
pub const DATA_MARKER: &str = "_$";

/// `Cache-Control` sent with every data-only response.
pub const DATA_CACHE_CONTROL: &str = "private, no-cache";

/// The level a data-only request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataTarget {
    /// The page itself (`_$=-1` or `_$=page`).
    Page,
    /// `layouts[i]`, outermost first.
    Layout(usize),
}

impl DataTarget {
    /// Parses a marker value.
    pub fn parse(marker: &str) -> Option<Self> {
        match marker.trim() {
            "-1" | "page" => Some(DataTarget::Page),
            other => other.parse::<usize>().ok().map(DataTarget::Layout),
        }
    }
}

impl fmt::Display for DataTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataTarget::Page => f.write_str("-1"),
            DataTarget::Layout(i) => write!(f, "{}", i),
        }
    }
}

/// Builds the data URL for `target`, keeping the current query string.
pub fn data_url(path: &str, query: Option<&str>, target: DataTarget) -> String {
    let kept: Vec<&str> = query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| !is_marker_pair(pair))
        .collect();

    if kept.is_empty() {
        format!("{}?{}={}", path, DATA_MARKER, target)
    } else {
        format!("{}?{}&{}={}", path, kept.join("&"), DATA_MARKER, target)
    }
}

fn is_marker_pair(pair: &str) -> bool {
    let key = pair.split_once('=').map(|(k, _)| k).unwrap_or(pair);
    form_urlencoded::parse(key.as_bytes())
        .next()
        .map(|(k, _)| k == DATA_MARKER)
        .unwrap_or(false)
}

/// Returns a copy of `req` without the data marker in its query.
pub fn strip_marker(req: &Request) -> Request {
    let mut clean = req.clone();
    clean.query.remove(DATA_MARKER);
    clean.raw_query = req.raw_query.as_deref().and_then(|query| {
        let kept: Vec<&str> = query
            .split('&')
            .filter(|pair| !pair.is_empty() && !is_marker_pair(pair))
            .collect();
        (!kept.is_empty()).then(|| kept.join("&"))
    });
    clean
}

/// Weak ETag over a response body.
pub fn etag(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    let hex: String = digest.iter().take(16).map(|b| format!("{:02x}", b)).collect();
    format!("W/\"{}\"", hex)
}

fn etag_matches(req: &Request, tag: &str) -> bool {
    req.header(IF_NONE_MATCH.as_str())
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .any(|candidate| candidate == "*" || candidate == tag)
        })
        .unwrap_or(false)
}

/// Data of one level, or a loader override to send instead.
enum LevelData {
    Data(JsonValue),
    Respond(Response),
}

fn level_data(runtime: &Runtime, module: &LuaModule, req: &Request) -> Result<LevelData> {
    if module.is_ssr() {
        return match runtime.instantiate(module)?.load(req)? {
            LoaderOutput::Response(response) => Ok(LevelData::Respond(response)),
            output => Ok(LevelData::Data(output.into_data())),
        };
    }
    Ok(LevelData::Data(
        module.static_data().cloned().unwrap_or(JsonValue::Null),
    ))
}

/// Injection hook: answers GET and HEAD requests for a leaf page.
///
/// HEAD gets the GET response without its body. Other methods pass through
/// to the module's method handler.
pub fn serve(
    entry: &RouteEntry,
    req: &mut Request,
    res: &mut ResponseBuilder,
    options: &DocumentOptions,
) -> Result<Flow> {
    if req.method != Method::GET && req.method != Method::HEAD {
        return Ok(Flow::Next);
    }

    let mut response = match req.query.get(DATA_MARKER).cloned() {
        Some(marker) => respond_data(entry, &marker, req, res)?,
        None => render_page(entry, req, res, options)?,
    };
    if req.method == Method::HEAD {
        response.body = Body::Empty;
    }
    Ok(Flow::Respond(response))
}

/// Adds the chain's accumulated headers to a response built outside it.
fn merged(res: &ResponseBuilder, mut response: Response) -> Response {
    res.merge_into(&mut response);
    response
}

/// Answers a data-only request for one level of `entry`.
pub fn respond_data(
    entry: &RouteEntry,
    marker: &str,
    req: &Request,
    res: &ResponseBuilder,
) -> Result<Response> {
    let Some(target) = DataTarget::parse(marker) else {
        return Ok(merged(
            res,
            Response::error(
                StatusCode::BAD_REQUEST,
                format!("Invalid data marker '{}'", marker),
            ),
        ));
    };

    let module = match target {
        DataTarget::Page => &entry.module,
        DataTarget::Layout(i) => match entry.layouts.get(i) {
            Some(layout) => &layout.module,
            None => {
                return Ok(merged(
                    res,
                    Response::error(
                        StatusCode::NOT_FOUND,
                        format!("Route {} has no layout {}", entry.template, i),
                    ),
                ))
            }
        },
    };

    tracing::debug!("Data request for {} level {}", entry.template, target);

    let response = if module.is_ssr() {
        let runtime = Runtime::new()?;
        let loaded = runtime
            .instantiate(module)
            .and_then(|instance| instance.load(&strip_marker(req)));

        match loaded {
            Ok(LoaderOutput::Response(response)) => return Ok(merged(res, response)),
            Ok(LoaderOutput::Data(data)) => res.json(&data),
            Ok(LoaderOutput::Text(text)) => res.text(text),
            Err(Error::Loader { module, message }) => {
                tracing::error!("Loader failed in {}: {}", module, message);
                return Ok(merged(
                    res,
                    Response::error_with_details(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error",
                        message,
                    ),
                ));
            }
            Err(e) => return Err(e),
        }
    } else {
        res.json(module.static_data().unwrap_or(&JsonValue::Null))
    };

    Ok(with_cache_headers(response, req, res))
}

fn with_cache_headers(mut response: Response, req: &Request, res: &ResponseBuilder) -> Response {
    let tag = etag(&response.body.to_bytes());
    response
        .headers
        .insert(CACHE_CONTROL, HeaderValue::from_static(DATA_CACHE_CONTROL));
    if let Ok(value) = HeaderValue::from_str(&tag) {
        response.headers.insert(ETAG, value);
    }

    if etag_matches(req, &tag) {
        let mut not_modified = Response::new(StatusCode::NOT_MODIFIED);
        for name in [CACHE_CONTROL, ETAG] {
            if let Some(value) = response.headers.get(&name).cloned() {
                not_modified.headers.insert(name, value);
            }
        }
        return merged(res, not_modified);
    }
    response
}

/// Renders the full document for `entry`.
///
/// A loader returning `response(...)` or `redirect(...)` replaces the
/// document.
pub fn render_page(
    entry: &RouteEntry,
    req: &Request,
    res: &ResponseBuilder,
    options: &DocumentOptions,
) -> Result<Response> {
    let runtime = Runtime::new()?;

    let page_data = match level_data(&runtime, &entry.module, req)? {
        LevelData::Data(data) => data,
        LevelData::Respond(response) => return Ok(merged(res, response)),
    };

    let mut layouts = Vec::with_capacity(entry.layouts.len());
    for layout in &entry.layouts {
        match level_data(&runtime, &layout.module, req)? {
            LevelData::Data(data) => layouts.push(Layer {
                module: &layout.module,
                data,
            }),
            LevelData::Respond(response) => return Ok(merged(res, response)),
        }
    }

    let title = page_data
        .pointer("/_meta/title")
        .or_else(|| layouts.first().and_then(|l| l.data.pointer("/_meta/title")))
        .and_then(JsonValue::as_str)
        .map(str::to_string);

    let page = Layer {
        module: &entry.module,
        data: page_data,
    };
    let html = render_tree(&runtime, &page, &layouts, &req.query, &req.params)?;

    tracing::debug!("Rendered {} for {}", entry.template, req.path);
    Ok(res.html_chunks(document(html, title.as_deref(), options)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::CookieOptions;
    use crate::resolver::MemoryResolver;
    use crate::router::{Matched, RouteTable};
    use serde_json::json;

    fn routes() -> RouteTable {
        let resolver = MemoryResolver::new()
            .with(
                "layout.lua",
                r#"return {
                    ["$"] = { site = "Demo", _meta = { title = "Demo" } },
                    default = function(a)
                        return "<html><body><nav>" .. a.data.site .. "</nav>" .. a.children .. "</body></html>"
                    end,
                }"#,
            )
            .with(
                "users/layout.lua",
                r#"return {
                    ["$"] = function(req) return { section = "users", q = req.query.q } end,
                    default = function(a) return "<section>" .. a.children .. "</section>" end,
                }"#,
            )
            .with(
                "users/[id]/index.lua",
                r#"return {
                    ["$"] = function(req)
                        if req.params.id == "boom" then error("user store offline") end
                        if req.params.id == "old" then return redirect("/users/new", 301) end
                        if req.params.id == "count" then return 42 end
                        return { id = req.params.id, _meta = { title = "User " .. req.params.id } }
                    end,
                    default = function(a) return "<h1>" .. escape(a.data.id) .. "</h1>" end,
                }"#,
            );
        RouteTable::compile(&resolver).unwrap()
    }

    fn entry<'a>(routes: &'a RouteTable, path: &str) -> (&'a RouteEntry, Request) {
        let m = routes.find(path).unwrap();
        let Matched::Page(entry) = m.target else {
            panic!("expected a page");
        };
        (entry.as_ref(), Request::new(Method::GET, path).with_params(m.params))
    }

    fn call(routes: &RouteTable, method: Method, uri: &str, res: &mut ResponseBuilder) -> Response {
        let (path, _) = uri.split_once('?').unwrap_or((uri, ""));
        let (entry, req) = entry(routes, path);
        let mut req = Request::from_uri(method, uri).with_params(req.params);
        match serve(entry, &mut req, res, &DocumentOptions::default()).unwrap() {
            Flow::Respond(response) => response,
            Flow::Next => panic!("GET and HEAD must be answered"),
        }
    }

    fn get(routes: &RouteTable, uri: &str) -> Response {
        call(routes, Method::GET, uri, &mut ResponseBuilder::new())
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers
            .get_all(http::header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_target_parse_and_display() {
        assert_eq!(DataTarget::parse("-1"), Some(DataTarget::Page));
        assert_eq!(DataTarget::parse("page"), Some(DataTarget::Page));
        assert_eq!(DataTarget::parse("2"), Some(DataTarget::Layout(2)));
        assert_eq!(DataTarget::parse("-2"), None);
        assert_eq!(DataTarget::parse("abc"), None);
        assert_eq!(DataTarget::Page.to_string(), "-1");
    }

    #[test]
    fn test_data_url_keeps_query() {
        assert_eq!(data_url("/users/1", None, DataTarget::Page), "/users/1?_$=-1");
        assert_eq!(
            data_url("/users/1", Some("tab=a&_%24=0"), DataTarget::Layout(1)),
            "/users/1?tab=a&_$=1"
        );
    }

    #[test]
    fn test_data_only_page_request() {
        let routes = routes();
        let response = get(&routes, "/users/42?_$=-1");

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("cache-control"), Some(DATA_CACHE_CONTROL));
        assert!(response.header("etag").unwrap().starts_with("W/\""));

        let body = response.body_string();
        assert!(!body.contains("<"));
        assert!(!body.contains("/root.js"));
        assert_eq!(
            response.body_json().unwrap(),
            json!({ "id": "42", "_meta": { "title": "User 42" } })
        );
    }

    #[test]
    fn test_data_only_layout_levels() {
        let routes = routes();

        let root = get(&routes, "/users/1?_$=0");
        assert_eq!(
            root.body_json().unwrap(),
            json!({ "site": "Demo", "_meta": { "title": "Demo" } })
        );

        // The loader sees the query without the marker.
        let users = get(&routes, "/users/1?q=ada&_$=1");
        assert_eq!(users.body_json().unwrap(), json!({ "section": "users", "q": "ada" }));

        let missing = get(&routes, "/users/1?_$=7");
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let invalid = get(&routes, "/users/1?_$=nope");
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_data_only_text_and_override() {
        let routes = routes();

        let text = get(&routes, "/users/count?_$=-1");
        assert_eq!(text.header("content-type"), Some("text/plain; charset=utf-8"));
        assert_eq!(text.body_string(), "42");

        let redirect = get(&routes, "/users/old?_$=-1");
        assert_eq!(redirect.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(redirect.header("location"), Some("/users/new"));
    }

    #[test]
    fn test_loader_failure_is_500_json() {
        let routes = routes();
        let response = get(&routes, "/users/boom?_$=-1");

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.body_json().unwrap();
        assert_eq!(body["error"], "Internal Server Error");
        assert!(body["details"].as_str().unwrap().contains("user store offline"));
    }

    #[test]
    fn test_if_none_match_yields_304() {
        let routes = routes();
        let first = get(&routes, "/users/42?_$=-1");
        let tag = first.header("etag").unwrap().to_string();

        let (entry, req) = entry(&routes, "/users/42");
        let req = Request::from_uri(Method::GET, "/users/42?_$=-1")
            .with_params(req.params)
            .with_header("if-none-match", &tag)
            .unwrap();
        let response = respond_data(entry, "-1", &req, &ResponseBuilder::new()).unwrap();

        assert_eq!(response.status, StatusCode::NOT_MODIFIED);
        assert!(response.body.is_empty());
        assert_eq!(response.header("etag"), Some(tag.as_str()));
    }

    #[test]
    fn test_full_render_references_bootstrap() {
        let routes = routes();
        let response = get(&routes, "/users/<b>");

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
        assert!(matches!(response.body, crate::response::Body::Chunks(_)));

        let html = response.body_string();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<nav>Demo</nav><section><h1>&lt;b&gt;</h1></section>"));
        assert!(html.contains("/root.js?v=0.0.1"));
        assert!(html.find("/root.js").unwrap() < html.find("</body>").unwrap());
    }

    #[test]
    fn test_full_render_loader_redirect() {
        let routes = routes();
        let response = get(&routes, "/users/old");
        assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
    }

    #[test]
    fn test_chain_headers_survive_overrides_and_errors() {
        let routes = routes();
        let mut res = ResponseBuilder::new();
        res.set_cookie("a", "1", &CookieOptions::new()).unwrap();
        res.set_cookie("b", "2", &CookieOptions::new()).unwrap();
        res.header("x-trace", "t1").unwrap();

        for uri in [
            "/users/old?_$=-1",
            "/users/old",
            "/users/1?_$=nope",
            "/users/1?_$=7",
            "/users/boom?_$=-1",
        ] {
            let response = call(&routes, Method::GET, uri, &mut res);
            assert_eq!(set_cookies(&response), vec!["a=1", "b=2"], "{}", uri);
            assert_eq!(response.header("x-trace"), Some("t1"), "{}", uri);
        }

        let redirect = call(&routes, Method::GET, "/users/old", &mut res);
        assert_eq!(redirect.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(redirect.header("location"), Some("/users/new"));
    }

    #[test]
    fn test_head_is_get_without_body() {
        let routes = routes();

        let page = call(&routes, Method::HEAD, "/users/42", &mut ResponseBuilder::new());
        assert_eq!(page.status, StatusCode::OK);
        assert_eq!(page.header("content-type"), Some("text/html; charset=utf-8"));
        assert!(page.body.is_empty());

        let data = call(&routes, Method::HEAD, "/users/42?_$=-1", &mut ResponseBuilder::new());
        assert_eq!(data.header("cache-control"), Some(DATA_CACHE_CONTROL));
        assert!(data.body.is_empty());
    }

    #[test]
    fn test_non_get_passes_through() {
        let routes = routes();
        let (entry, _) = entry(&routes, "/users/1");
        let mut req = Request::new(Method::POST, "/users/1");
        let mut res = ResponseBuilder::new();
        let flow = serve(entry, &mut req, &mut res, &DocumentOptions::default()).unwrap();
        assert!(matches!(flow, Flow::Next));
    }
}
