// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Production server command.
//!
//! No module watching and no reload script; the route table is compiled once.

use std::sync::Arc;

use crate::commands::address;
use crate::config::Config;
use crate::server::http::{build_app, create_server, ServerState};

/// Runs the production server.
pub async fn run(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let root = std::env::current_dir()?;
    let config = Config::load_from(&root)?;

    let app = build_app(&config, &root, false)?;
    if let Some(routes) = app.routes() {
        tracing::info!("Compiled {} route(s)", routes.routes().len() + routes.apis().len());
    }

    let addr = address(&config, host, port);
    println!("Server: http://{}", addr);

    create_server(&addr, Arc::new(ServerState::new(app))).await
}
