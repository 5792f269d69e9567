// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP response abstraction.
//!
//! Handlers accumulate status and headers on a shared [`ResponseBuilder`] and
//! finish with one of its terminal operations, which snapshot the builder into
//! an immutable [`Response`]. Adapters convert the response to their
//! platform-specific format.

use http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::{json, Value as JsonValue};

use crate::cookie::{self, CookieOptions};
use crate::error::Result;

const JSON_TYPE: &str = "application/json";
const HTML_TYPE: &str = "text/html; charset=utf-8";
const TEXT_TYPE: &str = "text/plain; charset=utf-8";

/// A response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// A complete body.
    Full(Vec<u8>),
    /// A document emitted as an ordered series of chunks.
    Chunks(Vec<String>),
}

impl Body {
    /// Returns the body as one contiguous byte buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Body::Empty => Vec::new(),
            Body::Full(bytes) => bytes.clone(),
            Body::Chunks(chunks) => chunks.concat().into_bytes(),
        }
    }

    /// Returns true for [`Body::Empty`] and zero-length bodies.
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Full(bytes) => bytes.is_empty(),
            Body::Chunks(chunks) => chunks.iter().all(String::is_empty),
        }
    }
}

/// A platform-agnostic HTTP response.
///
/// # Example
///
/// ```rust
/// use isoroute::Response;
/// use http::StatusCode;
///
/// let html = Response::html(StatusCode::OK, "<h1>Hello</h1>");
/// let json = Response::json(StatusCode::OK, &serde_json::json!({"success": true}));
/// let redirect = Response::redirect("/login");
/// assert_eq!(redirect.status, StatusCode::FOUND);
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    pub status: StatusCode,
    /// HTTP headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Body,
}

impl Response {
    /// Creates an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// Creates an HTML response.
    pub fn html(status: StatusCode, body: impl Into<String>) -> Self {
        Self::with_content(status, HTML_TYPE, Body::Full(body.into().into_bytes()))
    }

    /// Creates a plain-text response.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::with_content(status, TEXT_TYPE, Body::Full(body.into().into_bytes()))
    }

    /// Creates a JSON response.
    pub fn json(status: StatusCode, body: &JsonValue) -> Self {
        Self::with_content(status, JSON_TYPE, Body::Full(body.to_string().into_bytes()))
    }

    /// Creates a redirect response (HTTP 302).
    pub fn redirect(location: &str) -> Self {
        Self::redirect_with_status(StatusCode::FOUND, location)
    }

    /// Creates a redirect response with a specific status code.
    ///
    /// A location that is not a valid header value produces a bare status.
    pub fn redirect_with_status(status: StatusCode, location: &str) -> Self {
        let mut response = Self::new(status);
        if let Ok(value) = HeaderValue::from_str(location) {
            response.headers.insert(LOCATION, value);
        }
        response
    }

    /// Creates a JSON error response: `{"error": message}`.
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::json(status, &json!({ "error": message.into() }))
    }

    /// Creates a JSON error response with details: `{"error", "details"}`.
    pub fn error_with_details(
        status: StatusCode,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::json(
            status,
            &json!({ "error": message.into(), "details": details.into() }),
        )
    }

    /// Creates a 404 Not Found response.
    pub fn not_found() -> Self {
        Self::error(StatusCode::NOT_FOUND, "Not found")
    }

    /// Creates a 500 Internal Server Error response.
    pub fn internal_error(details: impl Into<String>) -> Self {
        Self::error_with_details(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            details,
        )
    }

    fn with_content(status: StatusCode, content_type: &'static str, body: Body) -> Self {
        let mut response = Self::new(status);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        response.body = body;
        response
    }

    /// Adds a header, replacing any existing value.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        self.headers
            .insert(HeaderName::try_from(name)?, HeaderValue::from_str(value)?);
        Ok(self)
    }

    /// Returns a header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the body as a (lossily decoded) string.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body.to_bytes()).into_owned()
    }

    /// Returns the body parsed as JSON, if it is valid JSON.
    pub fn body_json(&self) -> Option<JsonValue> {
        serde_json::from_slice(&self.body.to_bytes()).ok()
    }

    /// Returns true if the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the status is 3xx.
    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection()
    }
}

/// Mutable accumulator of status and headers shared by a handler chain.
///
/// Setter methods may be called by any handler; terminal methods produce a
/// [`Response`] from the builder's current state without consuming it.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuilder {
    /// Creates a builder with status 200 and no headers.
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }

    /// Sets the status code.
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Returns the current status code.
    pub fn current_status(&self) -> StatusCode {
        self.status
    }

    /// Returns the accumulated headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the accumulated headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Sets a header, replacing any previous value.
    pub fn header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        self.headers
            .insert(HeaderName::try_from(name)?, HeaderValue::from_str(value)?);
        Ok(self)
    }

    /// Appends a header value, keeping previous values.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        self.headers
            .append(HeaderName::try_from(name)?, HeaderValue::from_str(value)?);
        Ok(self)
    }

    /// Adds a `Set-Cookie` header.
    pub fn set_cookie(
        &mut self,
        name: &str,
        value: &str,
        options: &CookieOptions,
    ) -> Result<&mut Self> {
        let value = HeaderValue::from_str(&cookie::serialize(name, value, options))?;
        self.headers.append(SET_COOKIE, value);
        Ok(self)
    }

    /// Adds a `Set-Cookie` header that removes `name` from the client.
    pub fn delete_cookie(&mut self, name: &str) -> Result<&mut Self> {
        let value = HeaderValue::from_str(&cookie::delete(name))?;
        self.headers.append(SET_COOKIE, value);
        Ok(self)
    }

    /// Copies the accumulated headers onto a response built elsewhere.
    ///
    /// Names the response already sets are kept as is, except `Set-Cookie`,
    /// whose values are always added.
    pub fn merge_into(&self, response: &mut Response) {
        for name in self.headers.keys() {
            if name != SET_COOKIE && response.headers.contains_key(name) {
                continue;
            }
            for value in self.headers.get_all(name) {
                response.headers.append(name.clone(), value.clone());
            }
        }
    }

    /// Finishes with a raw body.
    pub fn send(&self, body: impl Into<Vec<u8>>) -> Response {
        self.finish(Body::Full(body.into()))
    }

    /// Finishes with no body.
    pub fn empty(&self) -> Response {
        self.finish(Body::Empty)
    }

    /// Finishes with a JSON body.
    pub fn json(&self, body: &JsonValue) -> Response {
        self.finish_typed(JSON_TYPE, Body::Full(body.to_string().into_bytes()))
    }

    /// Finishes with an HTML body.
    pub fn html(&self, body: impl Into<String>) -> Response {
        self.finish_typed(HTML_TYPE, Body::Full(body.into().into_bytes()))
    }

    /// Finishes with an HTML document emitted in chunks.
    pub fn html_chunks(&self, chunks: Vec<String>) -> Response {
        self.finish_typed(HTML_TYPE, Body::Chunks(chunks))
    }

    /// Finishes with a plain-text body.
    pub fn text(&self, body: impl Into<String>) -> Response {
        self.finish_typed(TEXT_TYPE, Body::Full(body.into().into_bytes()))
    }

    /// Finishes with a redirect. Defaults to 302 when `status` is `None`.
    pub fn redirect(&self, location: &str, status: Option<StatusCode>) -> Result<Response> {
        let mut response = self.finish(Body::Empty);
        response.status = status.unwrap_or(StatusCode::FOUND);
        response
            .headers
            .insert(LOCATION, HeaderValue::from_str(location)?);
        Ok(response)
    }

    fn finish(&self, body: Body) -> Response {
        Response {
            status: self.status,
            headers: self.headers.clone(),
            body,
        }
    }

    fn finish_typed(&self, content_type: &'static str, body: Body) -> Response {
        let mut response = self.finish(body);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }
}
