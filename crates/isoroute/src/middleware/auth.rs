// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Token authentication middleware.
//!
//! [`Auth`] extracts a token from the request (cookie, `Authorization` header
//! or both), verifies it, and either rejects the request with `401` or places
//! the decoded claims in [`Request::context`] for later handlers.
//!
//! ```rust
//! use isoroute::middleware::{Auth, Strategy};
//! use isoroute::token::TokenCodec;
//! use isoroute::App;
//!
//! let app = App::new().middleware(
//!     Auth::new(TokenCodec::new("secret"))
//!         .strategy(Strategy::Both)
//!         .into_handler(),
//! );
//! # let _ = app;
//! ```

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::StatusCode;
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::sync::Arc;

use crate::chain::{BoxHandler, Flow, Handler};
use crate::error::Result;
use crate::request::Request;
use crate::response::{Response, ResponseBuilder};
use crate::token::{TokenCodec, TokenVerifier};

/// Default cookie holding the token.
pub const DEFAULT_COOKIE_KEY: &str = "access_token";

/// Default header holding the token.
pub const DEFAULT_HEADER_KEY: &str = "Authorization";

const BEARER_PREFIX: &str = "Bearer ";

/// Where to look for the token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// The token cookie only.
    Cookie,
    /// The token header only.
    #[default]
    Header,
    /// The cookie first, then the header.
    Both,
}

/// Callback run after a successful verification.
///
/// Returning a response ends the request with it.
pub type OnVerified =
    Arc<dyn Fn(&mut Request, &mut ResponseBuilder, &JsonValue) -> Option<Response> + Send + Sync>;

/// Token authentication middleware.
pub struct Auth<V: TokenVerifier = TokenCodec> {
    verifier: V,
    strategy: Strategy,
    cookie_key: String,
    header_key: String,
    on_verified: Option<OnVerified>,
}

impl<V: TokenVerifier> Auth<V> {
    /// Creates the middleware with the default header strategy.
    pub fn new(verifier: V) -> Self {
        Self {
            verifier,
            strategy: Strategy::default(),
            cookie_key: DEFAULT_COOKIE_KEY.to_string(),
            header_key: DEFAULT_HEADER_KEY.to_string(),
            on_verified: None,
        }
    }

    /// Sets where the token is read from.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the cookie name.
    pub fn cookie_key(mut self, key: impl Into<String>) -> Self {
        self.cookie_key = key.into();
        self
    }

    /// Sets the header name.
    pub fn header_key(mut self, key: impl Into<String>) -> Self {
        self.header_key = key.into();
        self
    }

    /// Runs `callback` with the decoded claims instead of storing them in
    /// the request context.
    pub fn on_verified<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut Request, &mut ResponseBuilder, &JsonValue) -> Option<Response>
            + Send
            + Sync
            + 'static,
    {
        self.on_verified = Some(Arc::new(callback));
        self
    }

    /// Boxes the middleware for use in a chain.
    pub fn into_handler(self) -> BoxHandler {
        Arc::new(self)
    }

    fn from_cookie(&self, req: &Request) -> Option<String> {
        req.cookie(&self.cookie_key)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    }

    fn from_header(&self, req: &Request) -> Option<String> {
        let value = req.header(&self.header_key)?;
        let token = value.strip_prefix(BEARER_PREFIX).unwrap_or(value);
        (!token.is_empty()).then(|| token.to_string())
    }

    fn token(&self, req: &Request) -> Option<String> {
        match self.strategy {
            Strategy::Cookie => self.from_cookie(req),
            Strategy::Header => self.from_header(req),
            Strategy::Both => self.from_cookie(req).or_else(|| self.from_header(req)),
        }
    }
}

fn unauthorized(res: &mut ResponseBuilder) -> Flow {
    res.status(StatusCode::UNAUTHORIZED);
    Flow::Respond(res.json(&json!({ "error": "Unauthorized" })))
}

impl<V: TokenVerifier> Handler for Auth<V> {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut ResponseBuilder,
    ) -> BoxFuture<'a, Result<Flow>> {
        async move {
            let Some(token) = self.token(req) else {
                tracing::debug!("No token on {} {}", req.method, req.path);
                return Ok(unauthorized(res));
            };

            let claims = match self.verifier.verify_claims(&token) {
                Ok(claims) => claims,
                Err(err) => {
                    tracing::warn!("Token rejected on {} {}: {}", req.method, req.path, err);
                    return Ok(unauthorized(res));
                }
            };

            match &self.on_verified {
                Some(callback) => match callback(req, res, &claims) {
                    Some(response) => Ok(Flow::Respond(response)),
                    None => Ok(Flow::Next),
                },
                None => {
                    req.context = claims;
                    Ok(Flow::Next)
                }
            }
        }
        .boxed()
    }
}

impl<V: TokenVerifier> fmt::Debug for Auth<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("strategy", &self.strategy)
            .field("cookie_key", &self.cookie_key)
            .field("header_key", &self.header_key)
            .field("on_verified", &self.on_verified.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{handler, Chain};
    use crate::error::Error;
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts one token and counts calls.
    struct CountingVerifier {
        calls: Arc<AtomicUsize>,
    }

    impl TokenVerifier for CountingVerifier {
        fn verify_claims(&self, token: &str) -> Result<JsonValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if token == "good" {
                Ok(json!({ "sub": "ada" }))
            } else {
                Err(Error::handler("bad token"))
            }
        }
    }

    fn counting() -> (CountingVerifier, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            CountingVerifier {
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn echo_context() -> BoxHandler {
        handler(|req, res| {
            async move { Ok(Flow::Respond(res.json(&req.context))) }.boxed()
        })
    }

    async fn run(auth: Auth<CountingVerifier>, req: Request) -> Response {
        let chain = Chain::new().with(auth.into_handler()).with(echo_context());
        let mut req = req;
        let mut res = ResponseBuilder::new();
        chain.run(&mut req, &mut res).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized_without_verifying() {
        let (verifier, calls) = counting();
        let response = run(Auth::new(verifier).strategy(Strategy::Both), Request::new(Method::GET, "/")).await;

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body_json().unwrap(), json!({ "error": "Unauthorized" }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_both_falls_back_to_header() {
        let (verifier, calls) = counting();
        let req = Request::new(Method::GET, "/")
            .with_header("authorization", "Bearer good")
            .unwrap();

        let response = run(Auth::new(verifier).strategy(Strategy::Both), req).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body_json().unwrap(), json!({ "sub": "ada" }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_both_prefers_cookie() {
        let (verifier, _) = counting();
        let req = Request::new(Method::GET, "/")
            .with_header("cookie", "access_token=good")
            .unwrap()
            .with_header("authorization", "Bearer bad")
            .unwrap();

        let response = run(Auth::new(verifier).strategy(Strategy::Both), req).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cookie_strategy_ignores_header() {
        let (verifier, calls) = counting();
        let req = Request::new(Method::GET, "/")
            .with_header("authorization", "Bearer good")
            .unwrap();

        let response = run(Auth::new(verifier).strategy(Strategy::Cookie), req).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthorized() {
        let (verifier, calls) = counting();
        let req = Request::new(Method::GET, "/")
            .with_header("authorization", "Bearer forged")
            .unwrap();

        let response = run(Auth::new(verifier), req).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_on_verified_can_respond() {
        let (verifier, _) = counting();
        let auth = Auth::new(verifier).on_verified(|_req, res, claims| {
            (claims["sub"] == "ada").then(|| {
                res.status(StatusCode::FORBIDDEN);
                res.text("no ada")
            })
        });
        let req = Request::new(Method::GET, "/")
            .with_header("authorization", "good")
            .unwrap();

        let response = run(auth, req).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_custom_keys() {
        let (verifier, _) = counting();
        let auth = Auth::new(verifier)
            .strategy(Strategy::Cookie)
            .cookie_key("session");
        let req = Request::new(Method::GET, "/")
            .with_header("cookie", "session=good")
            .unwrap();

        let response = run(auth, req).await;
        assert_eq!(response.body_json().unwrap(), json!({ "sub": "ada" }));
    }

    #[tokio::test]
    async fn test_real_codec() {
        let codec = TokenCodec::new("secret");
        let token = codec.sign(&json!({ "sub": "42" })).unwrap();
        let chain = Chain::new()
            .with(Auth::new(codec).into_handler())
            .with(echo_context());

        let mut req = Request::new(Method::GET, "/")
            .with_header("authorization", &format!("Bearer {}", token))
            .unwrap();
        let mut res = ResponseBuilder::new();
        let response = chain.run(&mut req, &mut res).await.unwrap();

        assert_eq!(response.body_json().unwrap()["sub"], "42");
    }
}
