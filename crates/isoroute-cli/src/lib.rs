// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! isoroute CLI library.
//!
//! Serves isoroute applications over HTTP with axum and provides the route
//! tooling commands.
//!
//! # Usage
//!
//! This crate is primarily used through the `isoroute` binary:
//!
//! ```bash
//! isoroute dev        # Start development server
//! isoroute serve      # Serve for production
//! isoroute routes     # Print the compiled route table
//! isoroute manifest   # Write the client route manifest
//! ```
//!
//! # Configuration
//!
//! Projects are configured via `isoroute.toml` at the project root.

/// CLI commands (dev, serve, routes, manifest).
pub mod commands;
/// Project configuration from `isoroute.toml`.
pub mod config;
/// HTTP server, static assets and live reload.
pub mod server;
/// File system watching for the development server.
pub mod watcher;
