// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Development server command with module watching and browser reloads.

use std::path::PathBuf;
use std::sync::Arc;

use crate::commands::address;
use crate::config::Config;
use crate::server::http::{build_app, create_server, ServerState};
use crate::server::livereload::LiveReload;
use crate::watcher::FileWatcher;

/// Runs the development server.
pub async fn run(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let root = std::env::current_dir()?;
    let config = Config::load_from(&root)?;

    let reload = LiveReload::new();
    let state = Arc::new(
        ServerState::new(build_app(&config, &root, true)?).with_live_reload(reload.clone()),
    );

    let app_dir = config.app_dir(&root);
    let _watcher = if app_dir.is_dir() {
        let state = state.clone();
        let config = config.clone();
        let root = root.clone();
        Some(FileWatcher::new(&app_dir, move |paths: Vec<PathBuf>| {
            let changed = paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");

            match build_app(&config, &root, true) {
                Ok(app) => {
                    state.replace(app);
                    let browsers = reload.notify();
                    tracing::info!("Reloaded {} ({} browser(s))", changed, browsers);
                }
                // Keep serving the previous app until the modules compile again.
                Err(e) => tracing::error!("Rebuild after {} failed: {}", changed, e),
            }
        })?)
    } else {
        None
    };

    let addr = address(&config, host, port);
    println!("Server: http://{}", addr);
    println!("Status: Watching {} for changes...", app_dir.display());

    create_server(&addr, state).await
}
