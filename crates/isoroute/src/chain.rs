// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Handler chain executor.
//!
//! A chain is an ordered list of handlers sharing one [`Request`] and one
//! [`ResponseBuilder`]. Each handler either finishes the request with
//! [`Flow::Respond`] or hands over to the next one with [`Flow::Next`]. When
//! every handler passes, the chain answers `204 No Content`.
//!
//! ```rust
//! use futures_util::FutureExt;
//! use isoroute::chain::{handler, Chain, Flow};
//! use isoroute::{Request, ResponseBuilder};
//!
//! let chain = Chain::new()
//!     .with(handler(|_req, res| async move {
//!         res.header("x-seen", "1")?;
//!         Ok(Flow::Next)
//!     }.boxed()))
//!     .with(handler(|_req, res| async move {
//!         Ok(Flow::Respond(res.text("done")))
//!     }.boxed()));
//! # let _ = chain;
//! ```

use futures_util::future::BoxFuture;
use http::StatusCode;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::request::Request;
use crate::response::{Response, ResponseBuilder};

/// Outcome of a single handler.
#[derive(Debug)]
pub enum Flow {
    /// Stop the chain and send this response.
    Respond(Response),
    /// Continue with the next handler.
    Next,
}

/// A unit of request processing.
pub trait Handler: Send + Sync {
    /// Processes the request, optionally mutating the shared request and
    /// response builder.
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut ResponseBuilder,
    ) -> BoxFuture<'a, Result<Flow>>;
}

/// A shared, type-erased handler.
pub type BoxHandler = Arc<dyn Handler>;

struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut ResponseBuilder) -> BoxFuture<'a, Result<Flow>>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut ResponseBuilder,
    ) -> BoxFuture<'a, Result<Flow>> {
        (self.0)(req, res)
    }
}

/// Wraps a closure returning a boxed future as a [`BoxHandler`].
pub fn handler<F>(f: F) -> BoxHandler
where
    F: for<'a> Fn(&'a mut Request, &'a mut ResponseBuilder) -> BoxFuture<'a, Result<Flow>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnHandler(f))
}

/// An ordered, cheaply cloneable list of handlers.
#[derive(Clone, Default)]
pub struct Chain {
    handlers: Vec<BoxHandler>,
}

impl Chain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler, builder style.
    pub fn with(mut self, handler: BoxHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Appends a handler.
    pub fn push(&mut self, handler: BoxHandler) {
        self.handlers.push(handler);
    }

    /// Appends every handler of `other`.
    pub fn extend(&mut self, other: &Chain) {
        self.handlers.extend(other.handlers.iter().cloned());
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true when the chain has no handlers.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handlers in order.
    ///
    /// Returns the first terminal response, or `204 No Content` built from
    /// the shared builder when all handlers pass. A handler error stops the
    /// chain and is returned to the caller.
    pub async fn run(&self, req: &mut Request, res: &mut ResponseBuilder) -> Result<Response> {
        for handler in &self.handlers {
            match handler.call(req, res).await? {
                Flow::Respond(response) => return Ok(response),
                Flow::Next => {}
            }
        }

        res.status(StatusCode::NO_CONTENT);
        Ok(res.empty())
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use futures_util::FutureExt;
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: Arc<AtomicUsize>) -> BoxHandler {
        handler(move |_req, _res| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::Next)
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_short_circuit_skips_later_handlers() {
        let later = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new()
            .with(handler(|_req, res| {
                async move { Ok(Flow::Respond(res.text("stop"))) }.boxed()
            }))
            .with(counting(later.clone()));

        let mut req = Request::new(Method::GET, "/");
        let mut res = ResponseBuilder::new();
        let response = chain.run(&mut req, &mut res).await.unwrap();

        assert_eq!(response.body_string(), "stop");
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_pass_yields_no_content() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new()
            .with(counting(calls.clone()))
            .with(counting(calls.clone()));

        let mut req = Request::new(Method::GET, "/");
        let mut res = ResponseBuilder::new();
        let response = chain.run(&mut req, &mut res).await.unwrap();

        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.body.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_side_effects_accumulate() {
        let chain = Chain::new()
            .with(handler(|req, res| {
                async move {
                    req.context = serde_json::json!({ "user": "ada" });
                    res.header("x-first", "1")?;
                    Ok(Flow::Next)
                }
                .boxed()
            }))
            .with(handler(|req, res| {
                async move {
                    let user = req.context["user"].as_str().unwrap_or_default().to_string();
                    Ok(Flow::Respond(res.text(user)))
                }
                .boxed()
            }));

        let mut req = Request::new(Method::GET, "/");
        let mut res = ResponseBuilder::new();
        let response = chain.run(&mut req, &mut res).await.unwrap();

        assert_eq!(response.body_string(), "ada");
        assert_eq!(response.header("x-first"), Some("1"));
    }

    #[tokio::test]
    async fn test_error_stops_chain() {
        let later = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new()
            .with(handler(|_req, _res| {
                async move { Err(Error::handler("boom")) }.boxed()
            }))
            .with(counting(later.clone()));

        let mut req = Request::new(Method::GET, "/");
        let mut res = ResponseBuilder::new();
        let err = chain.run(&mut req, &mut res).await.unwrap_err();

        assert!(matches!(err, Error::Handler(ref m) if m == "boom"));
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }
}
