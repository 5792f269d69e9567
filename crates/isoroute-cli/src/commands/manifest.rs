// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Writes the client route manifest the bundler embeds.

use std::path::{Path, PathBuf};

use crate::commands::compile;
use crate::config::Config;

/// File name of the manifest inside the output directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Runs the command. `-` writes to stdout; no output writes to
/// `<out_dir>/manifest.json`.
pub fn run(output: Option<String>) -> anyhow::Result<()> {
    let root = std::env::current_dir()?;
    let config = Config::load_from(&root)?;

    match output.as_deref() {
        Some("-") => {
            let table = compile(&config, &root)?;
            println!("{}", serde_json::to_string_pretty(&table.manifest())?);
        }
        other => {
            let path = other
                .map(PathBuf::from)
                .unwrap_or_else(|| root.join(&config.app.out_dir).join(MANIFEST_FILE));
            let count = write(&config, &root, &path)?;
            println!("Wrote {} route(s) to {}", count, path.display());
        }
    }
    Ok(())
}

/// Compiles the project at `root` and writes its manifest to `path`.
/// Returns the number of page routes.
pub fn write(config: &Config, root: &Path, path: &Path) -> anyhow::Result<usize> {
    let manifest = compile(config, root)?.manifest();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&manifest)?)?;
    Ok(manifest.routes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use isoroute::Manifest;
    use std::fs;

    #[test]
    fn test_write_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app/blog")).unwrap();
        fs::write(
            dir.path().join("app/blog/[slug].lua"),
            r#"return { ["$"] = function() return {} end, default = function() return "" end }"#,
        )
        .unwrap();

        let config = Config::default();
        let path = dir.path().join(".isoroute").join(MANIFEST_FILE);
        assert_eq!(write(&config, dir.path(), &path).unwrap(), 1);

        let manifest: Manifest = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(manifest.routes[0].template, "/blog/[slug]");
        assert!(manifest.routes[0].ssr);
    }

    #[test]
    fn test_missing_app_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        assert!(write(&Config::default(), dir.path(), &path).is_err());
    }
}
