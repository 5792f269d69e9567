// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP server components.
//!
//! - `http`: axum adapter around [`isoroute::App`]
//! - `assets`: static directories consulted before the not-found page
//! - `livereload`: WebSocket-based browser reloads in development

/// Static asset directories.
pub mod assets;
/// HTTP server implementation using Axum.
pub mod http;
/// Live reload WebSocket server.
pub mod livereload;
