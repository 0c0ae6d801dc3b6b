//! Overlay engine.
//!
//! An [`Overlay`] takes the value at `from` inside a secondary file and
//! splices it into every `to` path of a primary [`RawDocument`]. This lets a
//! config be split over several files, e.g. keeping a long list of rules in
//! its own file:
//!
//! ```yaml
//! # rules.yaml
//! extra:
//!   match: { header: x-test }
//! ```
//!
//! With `from: extra` and `to: ["policy.rules.[name=test].match"]` the
//! `match` mapping lands in the `policy.rules` element named `test`.

pub mod path;

use crate::document::{RawDocument, find_in_dirs, load_file};
use crate::error::{ConfigError, Result};
use crate::merge::structural_merge;
use crate::watcher::{
    self, ChangeCallback, ConfigChangeEvent, FileNotification, FileWatch,
};
use path::{forge, parse_path};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

pub use path::{PathError, Segment};

/// A configuration overlay.
#[derive(Default, Serialize, Deserialize)]
pub struct Overlay {
    /// Path to the overlay file, absolute or relative to the primary config.
    pub filename: String,

    /// Dotted path of the element to take from the overlay file.
    #[serde(default)]
    pub from: String,

    /// Dotted paths in the primary document the element is injected into.
    #[serde(default)]
    pub to: Vec<String>,

    #[serde(skip)]
    cached: Mutex<Option<Value>>,

    #[serde(skip)]
    watch: Mutex<Option<FileWatch>>,
}

impl fmt::Debug for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overlay")
            .field("filename", &self.filename)
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

impl Clone for Overlay {
    /// Clones the definition only; the cached document and watch stay behind.
    fn clone(&self) -> Self {
        Self::new(self.filename.clone(), self.from.clone(), self.to.clone())
    }
}

impl Overlay {
    pub fn new(
        filename: impl Into<String>,
        from: impl Into<String>,
        to: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            from: from.into(),
            to: to.into_iter().map(Into::into).collect(),
            cached: Mutex::new(None),
            watch: Mutex::new(None),
        }
    }

    /// The overlay file content from the last successful load.
    pub fn cached(&self) -> Option<Value> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the one-time watch has been installed.
    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Locate the overlay file.
    ///
    /// Relative names are searched in the primary document's directory, then
    /// the working directory. Each directory is probed for the exact name,
    /// then for the stem with every supported extension.
    pub fn locate(&self, document: &RawDocument) -> Result<PathBuf> {
        let requested = Path::new(&self.filename);
        let (dirs, name) = if requested.is_absolute() {
            let parent = requested.parent().map(Path::to_path_buf).unwrap_or_default();
            let name = requested
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_default();
            (vec![parent], name)
        } else {
            let mut dirs = Vec::with_capacity(2);
            if let Some(dir) = document.dir() {
                dirs.push(if dir.as_os_str().is_empty() {
                    PathBuf::from(".")
                } else {
                    dir
                });
            }
            if !dirs.iter().any(|d| d == Path::new(".")) {
                dirs.push(PathBuf::from("."));
            }
            (dirs, requested.to_path_buf())
        };

        let stem = name.with_extension("");
        for dir in &dirs {
            let exact = dir.join(&name);
            if exact.is_file() {
                return Ok(exact);
            }
            if let Some(found) = stem
                .to_str()
                .and_then(|stem| find_in_dirs(stem, std::slice::from_ref(dir)))
            {
                return Ok(found);
            }
        }

        Err(ConfigError::OverlayNotFound {
            filename: self.filename.clone(),
            searched: dirs,
        })
    }

    /// Resolve `from` inside the overlay tree.
    fn resolve_from(&self, tree: &Map<String, Value>) -> Result<Value> {
        let not_found = |segment: &str| ConfigError::OverlayResolution {
            filename: self.filename.clone(),
            path: self.from.clone(),
            segment: segment.to_string(),
        };

        let mut segments = self.from.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = tree.get(first).ok_or_else(|| not_found(first))?;
        for segment in segments {
            current = current
                .as_object()
                .and_then(|map| map.get(segment))
                .ok_or_else(|| not_found(segment))?;
        }

        if current.is_null() {
            return Err(ConfigError::OverlayNil {
                filename: self.filename.clone(),
                path: self.from.clone(),
            });
        }
        Ok(current.clone())
    }

    /// Forge one patch per `to` path.
    fn forge_patches(&self, from: &Value) -> Result<Vec<Map<String, Value>>> {
        self.to
            .iter()
            .map(|to| {
                let segments =
                    parse_path(to).map_err(|e| ConfigError::grammar(&self.filename, e.to_string()))?;
                forge(&segments, from.clone())
                    .map_err(|e| ConfigError::grammar(&self.filename, e.to_string()))
            })
            .collect()
    }

    /// Load the overlay file and merge it into `document`.
    ///
    /// The document is only modified when every `to` path merged cleanly.
    pub fn apply_to(&self, document: &RawDocument) -> Result<()> {
        let file = self.locate(document)?;
        let tree = load_file(&file)?;
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Value::Object(tree.clone()));

        let from = self.resolve_from(&tree)?;
        let patches = self.forge_patches(&from)?;

        document.update(|working| {
            for patch in patches {
                structural_merge(working, Value::Object(patch))?;
            }
            Ok(())
        })?;

        debug!(
            overlay = %file.display(),
            from = %self.from,
            targets = self.to.len(),
            "applied overlay"
        );
        Ok(())
    }

    /// Re-apply this overlay to `document` whenever its file changes.
    ///
    /// The watch is installed at most once per overlay; further calls return
    /// immediately. After each change the overlay is re-applied and
    /// `callback` receives [`ConfigChangeEvent::Overlay`], or
    /// [`ConfigChangeEvent::Error`] when re-application failed.
    ///
    /// The callback runs on the watcher thread. Swapping a live config value
    /// in response is the caller's job, including any locking it needs.
    pub fn watch(
        self: &Arc<Self>,
        document: &Arc<RawDocument>,
        callback: ChangeCallback,
    ) -> Result<()> {
        let mut guard = self.watch.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Ok(());
        }

        let file = self.locate(document)?;
        let overlay = Arc::downgrade(self);
        let target = Arc::downgrade(document);
        let handle = watcher::watch_file(&file, watcher::DEFAULT_DEBOUNCE, move |note| {
            let event = match note {
                FileNotification::Changed(path) => {
                    let (Some(overlay), Some(target)) = (overlay.upgrade(), target.upgrade())
                    else {
                        return;
                    };
                    match overlay.apply_to(&target) {
                        Ok(()) => ConfigChangeEvent::Overlay(path),
                        Err(e) => {
                            error!(overlay = %overlay.filename, "re-applying overlay failed: {}", e);
                            ConfigChangeEvent::Error(e.to_string())
                        }
                    }
                }
                FileNotification::Failed(e) => ConfigChangeEvent::Error(e),
            };
            callback(event);
        })
        .map_err(|e| ConfigError::watch(&file, e))?;

        *guard = Some(handle);
        Ok(())
    }
}
