//! Typed config providers.
//!
//! A [`FileProvider`] owns one [`RawDocument`] for its lifetime and resolves
//! the typed config from it on every [`Provider::config`] call. Precedence,
//! lowest first:
//!
//! 1. `T::default()` and path-keyed defaults
//! 2. the base file
//! 3. overlays, in the order given
//! 4. environment variables (`<PREFIX>_<PATH>`)

use crate::capability::{self, ConfigType};
use crate::decode::{self, HookChain};
use crate::defaults;
use crate::document::RawDocument;
use crate::error::{ConfigError, Result};
use crate::merge::deep_merge;
use crate::options::{ConfigOption, ConfigOptions};
use crate::source::Source;
use arc_swap::ArcSwapOption;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Produces typed configuration values.
pub trait Provider<T: ConfigType>: Send + Sync {
    /// Resolve the config through the full pipeline.
    fn config(&self, options: Vec<ConfigOption>) -> Result<T>;

    /// The underlying document, for merges and direct access.
    fn raw(&self) -> Arc<RawDocument>;
}

/// Provider backed by a [`Source`].
pub struct FileProvider<T> {
    source: Arc<dyn Source>,
    document: ArcSwapOption<RawDocument>,
    init: Mutex<()>,
    defaults: Vec<(String, Value)>,
    _config: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for FileProvider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileProvider")
            .field("bound", &self.document.load().is_some())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl<T: ConfigType> FileProvider<T> {
    pub fn new(source: impl Source + 'static) -> Self {
        Self::from_source(Arc::new(source))
    }

    pub fn from_source(source: Arc<dyn Source>) -> Self {
        Self {
            source,
            document: ArcSwapOption::empty(),
            init: Mutex::new(()),
            defaults: Vec::new(),
            _config: PhantomData,
        }
    }

    /// Register a default for a dotted path, layered over `T::default()`.
    pub fn with_default(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.push((path.into(), value.into()));
        self
    }

    /// The cached document, bound on first use.
    fn document(&self) -> Arc<RawDocument> {
        if let Some(document) = self.document.load_full() {
            return document;
        }
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(document) = self.document.load_full() {
            return document;
        }
        let document = Arc::new(self.source.bind());
        debug!(name = %document.name(), "bound config document");
        self.document.store(Some(Arc::clone(&document)));
        document
    }
}

impl<T: ConfigType> Provider<T> for FileProvider<T> {
    fn config(&self, options: Vec<ConfigOption>) -> Result<T> {
        let options = ConfigOptions::build(options);

        let defaults = defaults::apply(&T::default(), &self.defaults)?;
        let hooks = capability::hook_chain::<T>();
        let document = self.document();

        if options.read_in_config {
            document.read()?;
        }

        for overlay in &options.overlays {
            overlay.apply_to(&document)?;
        }

        let config = decode_document(&document, defaults, &hooks)?;

        if let Some(callback) = options.on_config_change {
            document.watch(Arc::clone(&callback))?;
            for overlay in &options.overlays {
                overlay.watch(&document, Arc::clone(&callback))?;
            }
        }

        Ok(config)
    }

    fn raw(&self) -> Arc<RawDocument> {
        self.document()
    }
}

/// Decode `document` over `defaults`, with environment overrides applied.
pub fn decode_document<T: ConfigType>(
    document: &RawDocument,
    defaults: Value,
    hooks: &HookChain,
) -> Result<T> {
    let mut tree = deep_merge(defaults, document.snapshot());

    let binding = document.binding();
    if binding.is_enabled() {
        let applied = binding.apply(&mut tree, document.env());
        debug!(prefix = %binding.prefix(), applied, "applied environment overrides");
    }

    decode::decode(tree, hooks).map_err(|e| {
        let (path, message) = e.into_parts();
        ConfigError::decode(path, message)
    })
}
