//! Per-call options for [`Provider::config`](crate::provider::Provider::config).

use crate::overlay::Overlay;
use crate::watcher::{ChangeCallback, ConfigChangeEvent};
use std::fmt;
use std::sync::Arc;

/// Resolved options for one `config()` call.
pub struct ConfigOptions {
    /// Re-read the base file before overlays are applied.
    pub read_in_config: bool,
    /// Overlays applied in order; later ones win at overlapping paths.
    pub overlays: Vec<Arc<Overlay>>,
    /// Installs watches on the base file and every overlay when set.
    pub on_config_change: Option<ChangeCallback>,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            read_in_config: true,
            overlays: Vec::new(),
            on_config_change: None,
        }
    }
}

impl fmt::Debug for ConfigOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOptions")
            .field("read_in_config", &self.read_in_config)
            .field("overlays", &self.overlays)
            .field("on_config_change", &self.on_config_change.is_some())
            .finish()
    }
}

/// A single option function.
pub type ConfigOption = Box<dyn FnOnce(&mut ConfigOptions) + Send>;

impl ConfigOptions {
    /// Start from the defaults and apply `options` in order.
    pub fn build(options: impl IntoIterator<Item = ConfigOption>) -> Self {
        let mut resolved = Self::default();
        for option in options {
            option(&mut resolved);
        }
        resolved
    }
}

/// Whether to read the base file. Pass `false` to re-decode after in-memory
/// merges without discarding them.
pub fn with_read_in_config(read: bool) -> ConfigOption {
    Box::new(move |o| o.read_in_config = read)
}

/// Append overlays to apply after the base file is read.
pub fn with_overlays(overlays: impl IntoIterator<Item = Arc<Overlay>>) -> ConfigOption {
    let overlays: Vec<_> = overlays.into_iter().collect();
    Box::new(move |o| o.overlays.extend(overlays))
}

/// Watch the base file and overlays, calling `callback` on every change.
pub fn with_on_config_change<F>(callback: F) -> ConfigOption
where
    F: Fn(ConfigChangeEvent) + Send + Sync + 'static,
{
    let callback: ChangeCallback = Arc::new(callback);
    Box::new(move |o| o.on_config_change = Some(callback))
}
