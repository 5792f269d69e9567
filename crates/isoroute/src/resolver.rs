// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Module source resolution.
//!
//! This module provides the [`ModuleResolver`] trait and implementations for
//! enumerating and loading the Lua modules of an application directory.
//!
//! # Resolver Implementations
//!
//! - [`FileSystemResolver`]: Walks `**/*.lua` below a root directory
//! - [`MemoryResolver`]: Holds module sources in memory (testing, embedding)
//!
//! Module ids are paths relative to the application root, always written
//! with forward slashes (`users/[id]/index.lua`).

use glob::glob;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result};

/// Converts a relative path to a module id with `/` separators.
pub fn path_to_id<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Trait for enumerating and loading application modules.
pub trait ModuleResolver: Send + Sync + 'static {
    /// Lists every module id, sorted.
    fn list(&self) -> Result<Vec<String>>;

    /// Loads the source of a module.
    fn load(&self, id: &str) -> Result<String>;
}

/// Filesystem-based module resolver.
///
/// # Examples
///
/// ```rust,ignore
/// use isoroute::FileSystemResolver;
///
/// let resolver = FileSystemResolver::new("./app");
/// let source = resolver.load("users/[id]/index.lua")?;
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemResolver {
    root: PathBuf,
}

impl FileSystemResolver {
    /// Creates a resolver rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ModuleResolver for FileSystemResolver {
    fn list(&self) -> Result<Vec<String>> {
        // Brackets in page names are literal, so escape the root only.
        let pattern = format!(
            "{}/**/*.lua",
            glob::Pattern::escape(&self.root.to_string_lossy())
        );
        let entries = glob(&pattern).map_err(|e| Error::Resolution(e.to_string()))?;

        let mut ids: Vec<String> = entries
            .flatten()
            .filter(|path| path.is_file())
            .filter_map(|path| path.strip_prefix(&self.root).ok().map(path_to_id))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn load(&self, id: &str) -> Result<String> {
        let relative = Path::new(id);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::Resolution(format!("Invalid module id: {}", id)));
        }

        let path = self.root.join(relative);
        std::fs::read_to_string(&path)
            .map_err(|e| Error::Resolution(format!("Cannot read '{}': {}", path.display(), e)))
    }
}

/// Memory-based module resolver.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    modules: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module, builder style.
    pub fn with(self, id: &str, source: &str) -> Self {
        self.add(id, source);
        self
    }

    /// Adds or replaces a module.
    pub fn add(&self, id: &str, source: &str) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.trim_start_matches('/').to_string(), source.to_string());
    }

    /// Removes a module.
    pub fn remove(&self, id: &str) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

impl ModuleResolver for MemoryResolver {
    fn list(&self) -> Result<Vec<String>> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        Ok(modules.keys().cloned().collect())
    }

    fn load(&self, id: &str) -> Result<String> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        modules
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Resolution(format!("Module not found: {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_path_to_id() {
        assert_eq!(path_to_id(Path::new("users/[id]/index.lua")), "users/[id]/index.lua");
        assert_eq!(path_to_id(Path::new("./about.lua")), "about.lua");
    }

    #[test]
    fn test_filesystem_list_and_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("users/[id]")).unwrap();
        fs::write(dir.path().join("index.lua"), "return {}").unwrap();
        fs::write(dir.path().join("users/[id]/index.lua"), "return { id = 1 }").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let resolver = FileSystemResolver::new(dir.path());
        assert_eq!(
            resolver.list().unwrap(),
            vec!["index.lua".to_string(), "users/[id]/index.lua".to_string()]
        );
        assert_eq!(resolver.load("users/[id]/index.lua").unwrap(), "return { id = 1 }");
    }

    #[test]
    fn test_filesystem_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FileSystemResolver::new(dir.path());
        assert!(matches!(
            resolver.load("../secret.lua"),
            Err(Error::Resolution(_))
        ));
    }

    #[test]
    fn test_memory_resolver() {
        let resolver = MemoryResolver::new()
            .with("b.lua", "return 2")
            .with("/a.lua", "return 1");
        assert_eq!(resolver.list().unwrap(), vec!["a.lua", "b.lua"]);
        assert_eq!(resolver.load("a.lua").unwrap(), "return 1");

        resolver.remove("a.lua");
        assert!(resolver.load("a.lua").is_err());
    }
}
