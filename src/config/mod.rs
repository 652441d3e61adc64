//! Project configuration management for `recharge.conf`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── error      # ConfigError
//! ├── util       # address normalization, config file discovery
//! └── mod.rs     # FileConfig (raw TOML) and ProxyConfig (resolved)
//! ```
//!
//! # Keys
//!
//! | Key             | Purpose                                  | Default                   |
//! |-----------------|------------------------------------------|---------------------------|
//! | `RootDir`       | directory to watch                       | `.`                       |
//! | `Build`         | build command                            | none                      |
//! | `Run`           | run command                              | none                      |
//! | `SourceAddr`    | proxy listen address                     | `:3000`                   |
//! | `TargetAddr`    | upstream address                         | `http://localhost:3001`   |
//! | `Extensions`    | file extensions that trigger a rebuild   | `["go"]`                  |
//! | `Ignore`        | directory names never watched            | `["node_modules", ".git"]`|
//! | `Debounce`      | quiet period in ms                       | `100`                     |
//! | `MaxRetries`    | swallowed 502 attempts per request       | `3`                       |
//! | `RetryInterval` | sleep between attempts in ms             | `100`                     |

mod error;
mod util;

pub use error::ConfigError;
pub use util::{find_config_file, parse_listen_addr, parse_target_addr};

use crate::{cli::Cli, log};
use anyhow::Result;
use serde::Deserialize;
use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

// ============================================================================
// file configuration
// ============================================================================

/// Raw configuration as written in `recharge.conf`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FileConfig {
    /// Directory, and its children, to watch. Relative to the config file.
    pub root_dir: PathBuf,

    /// Command used to build the target application.
    /// Runs at startup and after each debounced change.
    pub build: String,

    /// Command used to run the target application after a successful build.
    pub run: String,

    /// Listen address of the proxy.
    pub source_addr: String,

    /// Address of the target application.
    pub target_addr: String,

    /// File extensions (without the dot) that count as source changes.
    /// Empty means every file counts.
    pub extensions: Vec<String>,

    /// Directory names skipped while watching.
    pub ignore: Vec<String>,

    /// Debounce window in milliseconds.
    pub debounce: u64,

    /// Number of 502 responses swallowed per request before passing one through.
    pub max_retries: usize,

    /// Sleep between forwarding attempts in milliseconds.
    pub retry_interval: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            build: String::new(),
            run: String::new(),
            source_addr: ":3000".into(),
            target_addr: "http://localhost:3001".into(),
            extensions: vec!["go".into()],
            ignore: vec!["node_modules".into(), ".git".into()],
            debounce: 100,
            max_retries: 3,
            retry_interval: 100,
        }
    }
}

impl FileConfig {
    /// Parse TOML content, collecting any unknown fields.
    pub fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Load configuration from file path, warning about unknown fields.
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            let display_path = path
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_else(|| path.to_string_lossy());
            log!("warning"; "unknown fields in {}, ignoring: {}", display_path, ignored.join(", "));
        }

        Ok(config)
    }

    /// Apply CLI overrides. CLI values win over the file.
    fn apply_cli(&mut self, cli: &Cli) {
        update_option(&mut self.root_dir, cli.root.as_ref());
        update_option(&mut self.source_addr, cli.source.as_ref());
        update_option(&mut self.target_addr, cli.target.as_ref());
    }

    /// Validate and resolve into the runtime configuration.
    ///
    /// `base` is the directory relative paths are resolved against.
    pub fn resolve(self, config_path: PathBuf, base: &Path) -> Result<ProxyConfig, ConfigError> {
        let root = crate::utils::path::normalize_path(base);
        let watch_root = crate::utils::path::normalize_path(&root.join(&self.root_dir));
        let source_addr = parse_listen_addr(&self.source_addr)?;
        let target = parse_target_addr(&self.target_addr)?;

        let extensions = self
            .extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty())
            .collect();

        Ok(ProxyConfig {
            config_path,
            root,
            watch_root,
            build: self.build.trim().to_string(),
            run: self.run.trim().to_string(),
            source_addr,
            target,
            extensions,
            ignore: self.ignore,
            debounce: Duration::from_millis(self.debounce),
            max_retries: self.max_retries,
            retry_interval: Duration::from_millis(self.retry_interval),
        })
    }
}

/// Update config option if CLI value is provided.
fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
    if let Some(option) = cli_option {
        *config_option = option.clone();
    }
}

// ============================================================================
// resolved configuration
// ============================================================================

/// Validated configuration used at runtime.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Absolute path to the config file
    pub config_path: PathBuf,
    /// Project root (parent of the config file); commands run here
    pub root: PathBuf,
    /// Absolute directory to watch
    pub watch_root: PathBuf,
    pub build: String,
    pub run: String,
    pub source_addr: SocketAddr,
    pub target: Url,
    pub extensions: Vec<String>,
    pub ignore: Vec<String>,
    pub debounce: Duration,
    pub max_retries: usize,
    pub retry_interval: Duration,
}

impl ProxyConfig {
    /// Load configuration from CLI arguments.
    ///
    /// Searches upward from cwd for the config file. The project root is the
    /// config file's parent directory.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = find_config_file(&cli.config)
            .ok_or_else(|| ConfigError::NotFound(cli.config.clone()))?;
        let config_path = crate::utils::path::normalize_path(&config_path);

        let mut file = FileConfig::from_path(&config_path)?;
        file.apply_cli(cli);

        let base = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let config = file.resolve(config_path, &base)?;
        config.warn_missing_commands();
        Ok(config)
    }

    /// Empty commands are not fatal: every build attempt records an
    /// invalid-command error instead, which is surfaced on each request.
    fn warn_missing_commands(&self) {
        if self.build.is_empty() {
            log!("warning"; "no `Build` command configured");
        }
        if self.run.is_empty() {
            log!("warning"; "no `Run` command configured");
        }
    }
}

// ============================================================================
// tests
// ============================================================================
