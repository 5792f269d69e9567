// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for isoroute.
//!
//! [`Error`] is the single error enum returned by the library. Each variant
//! maps to one failure class of the request lifecycle:
//!
//! - **Compile errors**: the application directory could not be turned into a
//!   route table (duplicate templates, invalid segment names)
//! - **Lua errors**: a page, layout or API module failed to evaluate
//! - **Token errors**: a token was missing, tampered with or expired
//! - **Loader errors**: a loader raised while answering a data-only request
//! - **Handler errors**: a handler in the chain failed
//! - **Fetch errors**: the client router could not fetch a data level
//!
//! Token and loader failures are answered close to where they happen (401 in
//! the auth middleware, 500 JSON in the data protocol). Everything else
//! bubbles up to the dispatcher's error handler.

use thiserror::Error;

/// The main error type for isoroute operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The route table could not be compiled.
    #[error("Route compile error: {0}")]
    Compile(String),

    /// A route pattern could not be converted or registered.
    #[error("Invalid route pattern '{pattern}': {message}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        message: String,
    },

    /// A module file could not be found or read.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Lua evaluation error inside a module.
    #[error("Lua execution error in {module}: {source}")]
    Lua {
        /// Module id (path relative to the app directory).
        module: String,
        /// The underlying Lua error.
        #[source]
        source: mlua::Error,
    },

    /// A module does not export what the caller needs.
    #[error("Module {module} has no export '{export}'")]
    MissingExport {
        /// Module id.
        module: String,
        /// Export name that was looked up.
        export: String,
    },

    /// A loader raised while producing route data.
    #[error("Loader error in {module}: {message}")]
    Loader {
        /// Module whose loader failed.
        module: String,
        /// Error message.
        message: String,
    },

    /// Token verification or signing failed.
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// A handler in the chain failed.
    #[error("Handler error: {0}")]
    Handler(String),

    /// The client router could not fetch a data level.
    #[error("Fetch error for {url}: {message}")]
    Fetch {
        /// URL that was requested.
        url: String,
        /// Error message.
        message: String,
    },

    /// A header name or value was rejected.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a handler error from any displayable message.
    pub fn handler(message: impl std::fmt::Display) -> Self {
        Self::Handler(message.to_string())
    }

    /// Wraps a Lua error with the id of the module that raised it.
    pub fn lua(module: impl Into<String>, source: mlua::Error) -> Self {
        Self::Lua {
            module: module.into(),
            source,
        }
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

/// Convenience type alias for Results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
