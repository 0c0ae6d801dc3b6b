//! The raw, untyped configuration document.
//!
//! A [`RawDocument`] is the mutable key-value tree behind one configuration
//! source. It knows where its file may live (search paths or an explicit
//! file) and how the environment maps onto its keys, but it touches the
//! filesystem only when [`RawDocument::read`] is called.

use crate::env::{EnvSource, EnvironmentBinding};
use crate::error::{ConfigError, Result};
use crate::merge::structural_merge;
use crate::watcher::{self, ChangeCallback, ConfigChangeEvent, FileNotification, FileWatch};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Supported file extensions, in probe order.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["yaml", "yml", "json", "toml"];

/// On-disk format of a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
    Toml,
}

impl Format {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Ok(Format::Yaml),
            "json" => Ok(Format::Json),
            "toml" => Ok(Format::Toml),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            }),
        }
    }

    /// Parse file content into a mapping. Empty documents are empty mappings.
    pub fn parse(self, path: &Path, content: &str) -> Result<Map<String, Value>> {
        let value: Value = match self {
            Format::Yaml => {
                serde_yaml::from_str(content).map_err(|e| ConfigError::parse(path, e))?
            }
            Format::Json => {
                if content.trim().is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(content).map_err(|e| ConfigError::parse(path, e))?
                }
            }
            Format::Toml => toml::from_str(content).map_err(|e| ConfigError::parse(path, e))?,
        };
        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(ConfigError::parse(
                path,
                format!("top level must be a mapping, found {}", crate::merge::kind_name(&other)),
            )),
        }
    }

    /// Render a mapping in this format.
    pub fn render(self, path: &Path, tree: &Map<String, Value>) -> Result<String> {
        match self {
            Format::Yaml => serde_yaml::to_string(tree).map_err(|e| ConfigError::parse(path, e)),
            Format::Json => {
                serde_json::to_string_pretty(tree).map_err(|e| ConfigError::parse(path, e))
            }
            Format::Toml => toml::to_string_pretty(tree).map_err(|e| ConfigError::parse(path, e)),
        }
    }
}

/// Read and parse a config file.
pub fn load_file(path: &Path) -> Result<Map<String, Value>> {
    let format = Format::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    format.parse(path, &content)
}

/// Find `<name>.<ext>` in the first directory that has one.
pub fn find_in_dirs(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter().find_map(|dir| {
        SUPPORTED_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{name}.{ext}")))
            .find(|candidate| candidate.is_file())
    })
}

struct DocumentState {
    tree: Map<String, Value>,
    file_used: Option<PathBuf>,
}

/// A named, mutable configuration tree bound to a file location and an
/// environment binding.
pub struct RawDocument {
    name: String,
    search_paths: Vec<PathBuf>,
    config_file: Option<PathBuf>,
    binding: EnvironmentBinding,
    env: Arc<dyn EnvSource>,
    state: Mutex<DocumentState>,
    watch: Mutex<Option<FileWatch>>,
}

impl fmt::Debug for RawDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawDocument")
            .field("name", &self.name)
            .field("search_paths", &self.search_paths)
            .field("config_file", &self.config_file)
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}

impl RawDocument {
    /// Create an unread document searching `search_paths` for `<name>.<ext>`.
    pub fn new(
        name: impl Into<String>,
        search_paths: Vec<PathBuf>,
        binding: EnvironmentBinding,
        env: Arc<dyn EnvSource>,
    ) -> Self {
        Self {
            name: name.into(),
            search_paths,
            config_file: None,
            binding,
            env,
            state: Mutex::new(DocumentState {
                tree: Map::new(),
                file_used: None,
            }),
            watch: Mutex::new(None),
        }
    }

    /// Use `path` directly instead of searching.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// An in-memory document with no backing file and no environment binding.
    pub fn from_tree(name: impl Into<String>, tree: Map<String, Value>) -> Self {
        let doc = Self::new(
            name,
            Vec::new(),
            EnvironmentBinding::default(),
            Arc::new(crate::env::MapEnv::new()),
        );
        doc.lock().tree = tree;
        doc
    }

    fn lock(&self) -> MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn binding(&self) -> &EnvironmentBinding {
        &self.binding
    }

    pub fn env(&self) -> &dyn EnvSource {
        self.env.as_ref()
    }

    /// The file the last successful read came from.
    pub fn file_used(&self) -> Option<PathBuf> {
        self.lock().file_used.clone()
    }

    /// Directory of [`Self::file_used`], used to resolve relative overlays.
    pub fn dir(&self) -> Option<PathBuf> {
        self.file_used()
            .and_then(|p| p.parent().map(Path::to_path_buf))
    }

    /// Locate the backing file without reading it.
    pub fn resolve_file(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.config_file {
            return Ok(path.clone());
        }
        find_in_dirs(&self.name, &self.search_paths).ok_or_else(|| ConfigError::NotFound {
            name: self.name.clone(),
            searched: self.search_paths.clone(),
        })
    }

    /// Read the backing file, replacing the in-memory tree.
    pub fn read(&self) -> Result<()> {
        let path = self.resolve_file()?;
        debug!(file = %path.display(), "reading config");
        let tree = load_file(&path)?;
        let mut state = self.lock();
        state.tree = tree;
        state.file_used = Some(path);
        Ok(())
    }

    /// A copy of the current tree.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.lock().tree.clone())
    }

    /// Value at a dotted path.
    pub fn get(&self, path: &str) -> Option<Value> {
        let state = self.lock();
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = state.tree.get(first)?;
        for segment in segments {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Set a value at a dotted path, creating intermediate mappings.
    pub fn set(&self, path: &str, value: Value) -> Result<()> {
        let mut state = self.lock();
        set_path(&mut state.tree, path, value)
    }

    /// Structurally merge `patch` into the tree.
    ///
    /// The tree is left untouched when the merge fails.
    pub fn merge(&self, patch: Map<String, Value>) -> Result<()> {
        self.update(|tree| structural_merge(tree, Value::Object(patch)))
    }

    /// Run `f` against a copy of the tree and commit the copy only on success.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Value) -> Result<()>,
    {
        let mut state = self.lock();
        let mut working = Value::Object(state.tree.clone());
        f(&mut working)?;
        if let Value::Object(tree) = working {
            state.tree = tree;
        }
        Ok(())
    }

    /// Write the tree back to the file it was read from, in that file's format.
    pub fn write(&self) -> Result<PathBuf> {
        let state = self.lock();
        let path = match state.file_used.clone() {
            Some(path) => path,
            None => self.resolve_file()?,
        };
        let rendered = Format::from_path(&path)?.render(&path, &state.tree)?;
        std::fs::write(&path, rendered).map_err(|e| ConfigError::io(&path, e))?;
        debug!(file = %path.display(), "wrote config");
        Ok(path)
    }

    /// Watch the backing file once; later calls are no-ops.
    ///
    /// The callback only observes the change. Re-reading is left to the next
    /// `config()` call so the caller decides when to swap in a new value.
    pub fn watch(&self, callback: ChangeCallback) -> Result<()> {
        let mut guard = self.watch.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Ok(());
        }
        let path = self.file_used().map_or_else(|| self.resolve_file(), Ok)?;
        let handle = watcher::watch_file(&path, watcher::DEFAULT_DEBOUNCE, move |note| {
            let event = match note {
                FileNotification::Changed(p) => ConfigChangeEvent::BaseFile(p),
                FileNotification::Failed(e) => ConfigChangeEvent::Error(e),
            };
            callback(event);
        })
        .map_err(|e| ConfigError::watch(&path, e))?;
        *guard = Some(handle);
        Ok(())
    }

    /// Whether a watch on the backing file is installed.
    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Insert `value` at a dotted `path` inside `tree`.
pub fn set_path(tree: &mut Map<String, Value>, path: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments
        .split_last()
        .filter(|_| segments.iter().all(|s| !s.is_empty()))
    else {
        return Err(ConfigError::Merge {
            path: path.to_string(),
            target: "map",
            patch: "empty key",
        });
    };
    let mut current = tree;
    let mut walked = String::new();
    for segment in parents {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if entry.is_null() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(map) => map,
            other => {
                warn!(path = %walked, "cannot descend into non-map value");
                return Err(ConfigError::Merge {
                    path: walked,
                    target: crate::merge::kind_name(other),
                    patch: "map",
                });
            }
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc_in(dirs: Vec<PathBuf>) -> RawDocument {
        RawDocument::new(
            "server",
            dirs,
            EnvironmentBinding::default(),
            Arc::new(crate::env::MapEnv::new()),
        )
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(Format::from_path(Path::new("a.yml")).unwrap(), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("a.JSON")).unwrap(), Format::Json);
        assert_eq!(Format::from_path(Path::new("a.toml")).unwrap(), Format::Toml);
        let err = Format::from_path(Path::new("a.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_read_is_lazy_and_reports_not_found() {
        let temp = TempDir::new().unwrap();
        let doc = doc_in(vec![temp.path().to_path_buf()]);
        assert!(doc.file_used().is_none());
        let err = doc.read().unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_read_yaml_and_get() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("server.yaml"),
            "webserver:\n  host: 0.0.0.0\n  port: 9090\n",
        )
        .unwrap();
        let doc = doc_in(vec![temp.path().to_path_buf()]);
        doc.read().unwrap();
        assert_eq!(doc.get("webserver.port"), Some(json!(9090)));
        assert_eq!(doc.get("webserver.missing"), None);
        assert_eq!(doc.dir().as_deref(), Some(temp.path()));
    }

    #[test]
    fn test_read_toml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("server.toml"),
            "[webserver]\nport = 9090\n",
        )
        .unwrap();
        let doc = doc_in(vec![temp.path().to_path_buf()]);
        doc.read().unwrap();
        assert_eq!(doc.get("webserver.port"), Some(json!(9090)));
    }

    #[test]
    fn test_read_replaces_tree() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("server.json"), r#"{"a": 1}"#).unwrap();
        let doc = doc_in(vec![temp.path().to_path_buf()]);
        doc.set("b", json!(2)).unwrap();
        doc.read().unwrap();
        assert_eq!(doc.snapshot(), json!({"a": 1}));
    }

    #[test]
    fn test_scalar_top_level_rejected() {
        let err = Format::Yaml
            .parse(Path::new("x.yaml"), "just a string")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_set_creates_intermediate_maps() {
        let doc = RawDocument::from_tree("t", Map::new());
        doc.set("a.b.c", json!(true)).unwrap();
        assert_eq!(doc.snapshot(), json!({"a": {"b": {"c": true}}}));
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let doc = RawDocument::from_tree("t", Map::new());
        doc.set("a", json!(1)).unwrap();
        assert!(doc.set("a.b", json!(2)).is_err());
    }

    #[test]
    fn test_failed_merge_leaves_tree_untouched() {
        let doc = RawDocument::from_tree("t", Map::new());
        doc.set("server.port", json!(8080)).unwrap();
        doc.set("server.host", json!("a")).unwrap();
        let mut patch = Map::new();
        patch.insert(
            "server".into(),
            json!({"host": "b", "port": {"nested": true}}),
        );
        assert!(doc.merge(patch).is_err());
        assert_eq!(
            doc.snapshot(),
            json!({"server": {"port": 8080, "host": "a"}})
        );
    }

    #[test]
    fn test_write_round_trips_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("server.yaml");
        std::fs::write(&path, "webserver:\n  port: 9090\n").unwrap();
        let doc = doc_in(vec![temp.path().to_path_buf()]);
        doc.read().unwrap();
        doc.set("webserver.port", json!(7070)).unwrap();
        assert_eq!(doc.write().unwrap(), path);

        let reread = doc_in(vec![temp.path().to_path_buf()]);
        reread.read().unwrap();
        assert_eq!(reread.get("webserver.port"), Some(json!(7070)));
    }
}
