// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]
// Error carries the mlua error of the failing module.
#![allow(clippy::result_large_err)]

//! # isoroute
//!
//! File-system routing, handler chains and isomorphic data fetching for Lua
//! page modules.
//!
//! One route definition serves both the initial full-page render and the
//! data-only payloads the client router fetches during soft navigation.
//!
//! ## Features
//!
//! - Directory-tree routing with nested layouts (`app/users/[id].lua`)
//! - Composable handler chains with short-circuit semantics
//! - Data-only responses through the reserved `_$` query parameter
//! - Token authentication, CORS and logging middleware
//! - A platform-agnostic client router mirroring the server's matching
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use isoroute::{middleware, App, Request};
//! use http::Method;
//!
//! let app = App::from_dir("./app")?.middleware(middleware::logger());
//! let response = app.handle(Request::from_uri(Method::GET, "/users/42")).await;
//! ```

/// Application dispatcher.
pub mod app;
/// Request body decoding.
mod body;
/// Handler chain executor.
pub mod chain;
/// Client-side router.
pub mod client;
/// Cookie parsing and serialization.
pub mod cookie;
/// Error types.
pub mod error;
/// Ready-made middleware.
pub mod middleware;
/// Lua page, layout and API modules.
pub mod module;
/// Isomorphic data protocol.
pub mod protocol;
/// Server-side rendering and documents.
pub mod render;
/// HTTP request abstraction.
pub mod request;
/// Module source resolution (filesystem, memory).
pub mod resolver;
/// HTTP response abstraction.
pub mod response;
/// Route and layout compiler.
pub mod router;
/// Signed tokens.
pub mod token;

pub use app::{App, AssetSource, ErrorHandler};
pub use chain::{handler, BoxHandler, Chain, Flow, Handler};
pub use client::{ClientRouter, History, MemoryHistory};
pub use cookie::{CookieOptions, SameSite};
pub use error::{Error, Result};
pub use module::LuaModule;
pub use protocol::{DataTarget, DATA_MARKER};
pub use render::DocumentOptions;
pub use request::Request;
pub use resolver::{FileSystemResolver, MemoryResolver, ModuleResolver};
pub use response::{Body, Response, ResponseBuilder};
pub use router::{Manifest, RouteEntry, RouteTable};
pub use token::{TokenCodec, TokenVerifier};
