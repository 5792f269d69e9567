// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! File system watching for the development server.
//!
//! Changes to `.lua` modules are debounced (750ms) and reported as paths
//! relative to the watched directory.

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(750);

/// Watches a directory tree for module changes.
///
/// Watching stops when the value is dropped.
pub struct FileWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    /// Watches `dir` recursively, calling `on_change` with the changed module
    /// paths.
    pub fn new<F>(dir: &Path, on_change: F) -> anyhow::Result<Self>
    where
        F: Fn(Vec<PathBuf>) + Send + 'static,
    {
        let base = dir.to_path_buf();
        let mut debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let changed = module_paths(
                        &base,
                        events.iter().flat_map(|event| event.paths.iter()),
                    );
                    if !changed.is_empty() {
                        on_change(changed);
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::warn!("Watch error: {}", error);
                    }
                }
            }
        })?;

        debouncer.watch(dir, RecursiveMode::Recursive)?;
        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

/// Keeps `.lua` paths, relative to `base`, without duplicates.
fn module_paths<'a>(base: &Path, paths: impl Iterator<Item = &'a PathBuf>) -> Vec<PathBuf> {
    let mut changed: Vec<PathBuf> = Vec::new();
    for path in paths {
        if path.extension().and_then(|e| e.to_str()) != Some("lua") {
            continue;
        }
        let relative = path.strip_prefix(base).unwrap_or(path).to_path_buf();
        if !changed.contains(&relative) {
            changed.push(relative);
        }
    }
    changed
}
