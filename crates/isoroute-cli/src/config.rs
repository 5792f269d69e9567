// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Project configuration.
//!
//! Configuration is loaded from `isoroute.toml` at the project root.
//!
//! # Example Configuration
//!
//! ```toml
//! [project]
//! name = "my-app"
//! version = "1.0.0"
//!
//! [server]
//! port = 3000
//! host = "127.0.0.1"
//!
//! [app]
//! app_dir = "app"
//! out_dir = ".isoroute"
//! static_dir = "public"
//! env = "development"
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file.
pub const CONFIG_FILE: &str = "isoroute.toml";

/// Main configuration structure loaded from `isoroute.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Project metadata (name, version).
    #[serde(default)]
    pub project: ProjectConfig,
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Application layout settings.
    #[serde(default)]
    pub app: AppConfig,
}

/// Project metadata configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Project name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Project version, appended to the client bootstrap URL (default: "0.0.1").
    #[serde(default = "default_version")]
    pub version: String,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server port (default: 3000).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Server host (default: "127.0.0.1").
    #[serde(default = "default_host")]
    pub host: String,
}

/// Application directories and environment.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Directory containing route, layout and API modules (default: "app").
    #[serde(default = "default_app_dir")]
    pub app_dir: String,
    /// Directory holding bundler output such as `root.js` (default: ".isoroute").
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
    /// Directory for static files (default: "public").
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    /// "development" or "production" (default: "development").
    #[serde(default = "default_env")]
    pub env: String,
}

fn default_name() -> String {
    "unnamed".to_string()
}

fn default_version() -> String {
    "0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_app_dir() -> String {
    "app".to_string()
}

fn default_out_dir() -> String {
    ".isoroute".to_string()
}

fn default_static_dir() -> String {
    "public".to_string()
}

fn default_env() -> String {
    "development".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_dir: default_app_dir(),
            out_dir: default_out_dir(),
            static_dir: default_static_dir(),
            env: default_env(),
        }
    }
}

impl AppConfig {
    /// True unless `env` is "production".
    pub fn is_development(&self) -> bool {
        self.env != "production"
    }
}

impl Config {
    /// Loads configuration from `isoroute.toml` in the current directory.
    ///
    /// If no configuration file exists, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be parsed.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Loads configuration from `isoroute.toml` in `root`.
    ///
    /// The `PORT` environment variable overrides the configured port.
    pub fn load_from(root: &Path) -> anyhow::Result<Self> {
        let config_path = root.join(CONFIG_FILE);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.server.port = port;
        }
        Ok(config)
    }

    /// The application directory under `root`.
    pub fn app_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.app.app_dir)
    }

    /// Directories searched for static assets under `root`, in order.
    pub fn asset_dirs(&self, root: &Path) -> Vec<PathBuf> {
        vec![root.join(&self.app.static_dir), root.join(&self.app.out_dir)]
    }
}
