//! File watcher for configuration files.
//!
//! Watches a single file (the base document or an overlay) by watching its
//! parent directory non-recursively and filtering on the file name, which
//! survives editors that replace files instead of writing them in place.
//!
//! Events are debounced and delivered to a callback on a dedicated thread.
//! The watch stops when the returned [`FileWatch`] is dropped.

use notify_debouncer_mini::{DebounceEventResult, DebouncedEventKind, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Default debounce window for coalescing rapid writes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Event delivered to change callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChangeEvent {
    /// The base config file changed.
    BaseFile(PathBuf),
    /// An overlay file changed and was re-applied.
    Overlay(PathBuf),
    /// The watcher or the re-application failed.
    Error(String),
}

impl ConfigChangeEvent {
    /// Returns true if this event requires a config reload.
    pub fn requires_reload(&self) -> bool {
        !matches!(self, ConfigChangeEvent::Error(_))
    }

    /// The file this event is about, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigChangeEvent::BaseFile(p) | ConfigChangeEvent::Overlay(p) => Some(p.as_path()),
            ConfigChangeEvent::Error(_) => None,
        }
    }
}

/// Caller-supplied change callback.
pub type ChangeCallback = std::sync::Arc<dyn Fn(ConfigChangeEvent) + Send + Sync>;

/// Outcome of a raw file notification, before it is turned into a
/// [`ConfigChangeEvent`] by the owner of the watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileNotification {
    Changed(PathBuf),
    Failed(String),
}

/// Handle keeping a file watch alive.
pub struct FileWatch {
    path: PathBuf,
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
}

impl std::fmt::Debug for FileWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatch").field("path", &self.path).finish()
    }
}

impl FileWatch {
    /// The watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Start watching `file`, invoking `handler` for each debounced change.
///
/// The handler runs on a background thread that exits once the returned
/// [`FileWatch`] is dropped.
pub fn watch_file<F>(
    file: &Path,
    debounce: Duration,
    handler: F,
) -> Result<FileWatch, notify::Error>
where
    F: Fn(FileNotification) + Send + 'static,
{
    let file = std::path::absolute(file).unwrap_or_else(|_| file.to_path_buf());
    let dir = file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let (notify_tx, notify_rx) = mpsc::channel();
    let mut debouncer = new_debouncer(debounce, notify_tx)?;
    debouncer
        .watcher()
        .watch(&dir, notify::RecursiveMode::NonRecursive)?;
    info!("Watching config file: {}", file.display());

    let watched = file.clone();
    std::thread::Builder::new()
        .name("config-watch".into())
        .spawn(move || process_notify_events(notify_rx, &watched, handler))
        .map_err(notify::Error::io)?;

    Ok(FileWatch {
        path: file,
        _debouncer: debouncer,
    })
}

/// Process events from the notify debouncer until the channel closes.
fn process_notify_events<F>(rx: mpsc::Receiver<DebounceEventResult>, file: &Path, handler: F)
where
    F: Fn(FileNotification),
{
    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let touched = events.iter().any(|event| {
                    matches!(
                        event.kind,
                        DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
                    ) && is_same_file(&event.path, file)
                });
                if touched {
                    debug!("Config change detected: {}", file.display());
                    handler(FileNotification::Changed(file.to_path_buf()));
                }
            }
            Ok(Err(e)) => {
                error!("File watcher error: {}", e);
                handler(FileNotification::Failed(e.to_string()));
            }
            Err(_) => {
                info!("Config watcher channel closed, stopping");
                return;
            }
        }
    }
}

fn is_same_file(event_path: &Path, file: &Path) -> bool {
    event_path == file || event_path.file_name() == file.file_name()
}
