//! Document sources.
//!
//! A [`Source`] turns a configuration name into an unread [`RawDocument`]
//! bound to its search paths and environment prefix. Binding never touches
//! the filesystem; discovery errors surface when the document is read.

use crate::document::{RawDocument, SUPPORTED_EXTENSIONS};
use crate::env::{EnvSource, EnvironmentBinding, ProcessEnv, default_env_prefix};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Something that can produce a raw document handle.
pub trait Source: Send + Sync {
    /// Build a fresh, unread document.
    fn bind(&self) -> RawDocument;
}

/// User-facing knobs for locating the config, passed in at construction.
///
/// Derives clap [`Args`] so a command line can flatten it, but it is plain
/// data and can be filled in by hand.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceOverrides {
    /// Environment prefix to use when overriding config values
    #[arg(short = 'e', long = "env-prefix", global = true)]
    pub env_prefix: Option<String>,

    /// Config search directory, searched before the built-in locations
    #[arg(short = 'c', long = "config-path", global = true)]
    pub config_path: Option<PathBuf>,

    /// Absolute path to the config file. Takes precedence over --config-path
    #[arg(short = 'f', long = "config-file", global = true)]
    pub config_file: Option<PathBuf>,
}

/// Default config search directories for `config_name`, highest priority first.
///
/// - `./`
/// - `$HOME/.config/<name>/`
/// - `$HOME/.<name>/`
/// - `$HOME/.local/etc/`
/// - `$HOME/.local/etc/<name>/`
/// - `$HOME/`
/// - `/opt/<name>/`, `/opt/<name>/etc/`, `/opt/<name>/etc/<name>/`
/// - `/usr/local/etc/`, `/usr/local/etc/<name>/`
/// - `/etc/`, `/etc/<name>/`
pub fn default_search_paths(config_name: &str) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".")];

    if let Some(home) = dirs::home_dir() {
        paths.extend([
            home.join(".config").join(config_name),
            home.join(format!(".{config_name}")),
            home.join(".local/etc"),
            home.join(".local/etc").join(config_name),
            home,
        ]);
    }

    let opt = Path::new("/opt").join(config_name);
    paths.extend([
        opt.clone(),
        opt.join("etc"),
        opt.join("etc").join(config_name),
        PathBuf::from("/usr/local/etc"),
        Path::new("/usr/local/etc").join(config_name),
        PathBuf::from("/etc"),
        Path::new("/etc").join(config_name),
    ]);

    paths
}

/// A source backed by a config file found on disk.
#[derive(Clone)]
pub struct FileSource {
    config_name: String,
    search_paths: Vec<PathBuf>,
    overrides: SourceOverrides,
    env: Arc<dyn EnvSource>,
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("config_name", &self.config_name)
            .field("search_paths", &self.search_paths)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl FileSource {
    /// Source for `config_name` (without extension).
    ///
    /// An empty `search_paths` falls back to [`default_search_paths`].
    pub fn new(config_name: impl Into<String>, search_paths: Vec<PathBuf>) -> Self {
        let config_name = config_name.into();
        let search_paths = if search_paths.is_empty() {
            default_search_paths(&config_name)
        } else {
            search_paths
        };
        Self {
            config_name,
            search_paths,
            overrides: SourceOverrides::default(),
            env: Arc::new(ProcessEnv),
        }
    }

    pub fn with_overrides(mut self, overrides: SourceOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Read variables from `env` instead of the process environment.
    pub fn with_env(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    pub fn config_name(&self) -> &str {
        &self.config_name
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Environment prefix in effect: the override, else the derived default.
    pub fn env_prefix(&self) -> String {
        self.overrides
            .env_prefix
            .clone()
            .unwrap_or_else(|| default_env_prefix(&self.base_name(), self.env.as_ref()))
    }

    /// The config name with a known extension stripped.
    fn base_name(&self) -> String {
        let path = Path::new(&self.config_name);
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext) => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&self.config_name)
                .to_string(),
            _ => self.config_name.clone(),
        }
    }
}

impl Source for FileSource {
    fn bind(&self) -> RawDocument {
        let prefix = self.env_prefix();
        debug!(env_prefix = %prefix, "enabling config env replacer");
        let binding = EnvironmentBinding::new(prefix);

        if let Some(ref file) = self.overrides.config_file {
            debug!(file = %file.display(), "using explicit config file");
            return RawDocument::new(
                self.config_name.clone(),
                Vec::new(),
                binding,
                Arc::clone(&self.env),
            )
            .with_config_file(file.clone());
        }

        let name = self.base_name();
        if name != self.config_name {
            warn!(
                config_name = %self.config_name,
                "removing extension from config-name"
            );
        }

        let mut paths = Vec::with_capacity(self.search_paths.len() + 1);
        if let Some(ref dir) = self.overrides.config_path {
            debug!(path = %dir.display(), "adding flag provided config-path to search");
            paths.push(dir.clone());
        }
        paths.extend(self.search_paths.iter().cloned());

        RawDocument::new(name, paths, binding, Arc::clone(&self.env))
    }
}
