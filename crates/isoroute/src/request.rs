// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Per-request context.
//!
//! [`Request`] is created by an adapter (the axum server, a test) for every
//! inbound request and is exclusively owned by that request's handler chain.
//! Middleware communicates with downstream handlers through the opaque
//! [`Request::context`] slot.

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::cookie;
use crate::error::Result;

/// A platform-agnostic HTTP request plus the state accumulated while it is
/// dispatched.
///
/// # Example
///
/// ```rust
/// use isoroute::Request;
/// use http::Method;
///
/// let request = Request::from_uri(Method::GET, "/search?q=rust&page=2");
/// assert_eq!(request.path, "/search");
/// assert_eq!(request.query_param("q"), Some("rust"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    /// The HTTP method.
    pub method: Method,

    /// The request path without query string (e.g. "/users/42").
    pub path: String,

    /// Raw query string as received, without the leading `?`.
    pub raw_query: Option<String>,

    /// Query parameters (parsed from the URL).
    pub query: HashMap<String, String>,

    /// Route parameters from the matched pattern.
    pub params: HashMap<String, String>,

    /// HTTP headers.
    pub headers: HeaderMap,

    /// Request body (for POST/PUT/PATCH).
    pub body: Option<Vec<u8>>,

    /// Opaque slot written by middleware (e.g. decoded token claims).
    pub context: JsonValue,

    cookies: OnceLock<HashMap<String, String>>,
}

impl Request {
    /// Creates a request for a bare path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            raw_query: None,
            query: HashMap::new(),
            params: HashMap::new(),
            headers: HeaderMap::new(),
            body: None,
            context: JsonValue::Null,
            cookies: OnceLock::new(),
        }
    }

    /// Creates a request from a path that may carry a query string.
    pub fn from_uri(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (uri, None),
        };

        let mut request = Self::new(method, path);
        if let Some(query) = query {
            request.query = parse_query(query);
            request.raw_query = Some(query.to_string());
        }
        request
    }

    /// Replaces the headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self.cookies = OnceLock::new();
        self
    }

    /// Adds a single header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        self.headers
            .append(HeaderName::try_from(name)?, HeaderValue::from_str(value)?);
        self.cookies = OnceLock::new();
        Ok(self)
    }

    /// Replaces the query parameters.
    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    /// Replaces the route parameters.
    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// Adds a body to the request.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns a header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Returns a route parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Returns the cookie map, parsing the `Cookie` header on first access.
    pub fn cookies(&self) -> &HashMap<String, String> {
        self.cookies.get_or_init(|| {
            self.headers
                .get_all(http::header::COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|header| cookie::parse(header).into_iter())
                .collect()
        })
    }

    /// Returns a single cookie value.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name).map(String::as_str)
    }

    /// Returns the path plus the original query string.
    pub fn url(&self) -> String {
        match &self.raw_query {
            Some(query) if !query.is_empty() => format!("{}?{}", self.path, query),
            _ => self.path.clone(),
        }
    }

    /// Returns the body as a string, if present and valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        self.body.as_ref().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Returns the body parsed as JSON, if present and valid.
    pub fn body_json(&self) -> Option<JsonValue> {
        self.body_str().and_then(|s| serde_json::from_str(s).ok())
    }

    /// Returns the body decoded by content type (JSON, urlencoded or
    /// multipart fields), if any.
    pub fn form(&self) -> Option<JsonValue> {
        let body = self.body.as_deref()?;
        crate::body::parse_structured_body(body, self.content_type())
    }

    /// Returns the Content-Type header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE.as_str())
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new(Method::GET, "/")
    }
}

/// Parses a query string into a map. Later duplicates win.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request() {
        let req = Request::new(Method::GET, "/users/42");
        assert_eq!(req.path, "/users/42");
        assert_eq!(req.method, Method::GET);
        assert!(req.context.is_null());
    }

    #[test]
    fn test_from_uri_splits_query() {
        let req = Request::from_uri(Method::GET, "/search?q=rust%20lang&_%24=-1");
        assert_eq!(req.path, "/search");
        assert_eq!(req.query_param("q"), Some("rust lang"));
        assert_eq!(req.query_param("_$"), Some("-1"));
        assert_eq!(req.url(), "/search?q=rust%20lang&_%24=-1");
    }

    #[test]
    fn test_cookies_are_lazy_and_decoded() {
        let req = Request::new(Method::GET, "/")
            .with_header("cookie", "access_token=abc; name=J%C3%BCrgen")
            .unwrap();
        assert_eq!(req.cookie("access_token"), Some("abc"));
        assert_eq!(req.cookie("name"), Some("Jürgen"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn test_with_header_resets_cookie_cache() {
        let req = Request::new(Method::GET, "/");
        assert!(req.cookies().is_empty());

        let req = req.with_header("cookie", "a=1").unwrap();
        assert_eq!(req.cookie("a"), Some("1"));
    }

    #[test]
    fn test_body_json() {
        let req = Request::new(Method::POST, "/api").with_body(br#"{"name": "test"}"#.to_vec());
        let json = req.body_json().unwrap();
        assert_eq!(json["name"], "test");
    }

    #[test]
    fn test_form_by_content_type() {
        let req = Request::new(Method::POST, "/signup")
            .with_header("content-type", "application/x-www-form-urlencoded")
            .unwrap()
            .with_body(b"email=a%40b.c".to_vec());
        assert_eq!(req.form().unwrap()["email"], "a@b.c");
        assert!(Request::default().form().is_none());
    }

    #[test]
    fn test_invalid_header_rejected() {
        assert!(Request::default().with_header("bad header", "x").is_err());
    }
}
