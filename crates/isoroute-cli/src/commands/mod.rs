// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! CLI command implementations.
//!
//! - `dev`: development server with module watching and browser reloads
//! - `serve`: production server
//! - `routes`: print the compiled route table
//! - `manifest`: write the client route manifest

/// Development server command.
pub mod dev;
/// Client manifest command.
pub mod manifest;
/// Route listing command.
pub mod routes;
/// Production server command.
pub mod serve;

use std::path::Path;

use isoroute::{FileSystemResolver, RouteTable};

use crate::config::Config;

/// Resolves the listen address: flags first, then configuration.
pub(crate) fn address(config: &Config, host: Option<String>, port: Option<u16>) -> String {
    format!(
        "{}:{}",
        host.unwrap_or_else(|| config.server.host.clone()),
        port.unwrap_or(config.server.port)
    )
}

/// Compiles the route table of the project at `root`.
pub(crate) fn compile(config: &Config, root: &Path) -> anyhow::Result<RouteTable> {
    let app_dir = config.app_dir(root);
    if !app_dir.is_dir() {
        anyhow::bail!("Application directory {} not found", app_dir.display());
    }
    Ok(RouteTable::compile(&FileSystemResolver::new(&app_dir))?)
}
