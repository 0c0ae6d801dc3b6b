//! Layered, typed configuration.
//!
//! A config is resolved from compiled defaults, a discovered base file,
//! overlay fragments spliced into paths of the base document, and
//! environment overrides, then decoded onto a caller-defined type through a
//! pipeline of decode hooks. Base file and overlays can be watched for live
//! reload.
//!
//! ```no_run
//! use overlay_config::capability::ConfigType;
//! use overlay_config::provider::{FileProvider, Provider};
//! use overlay_config::source::FileSource;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Default, Serialize, Deserialize)]
//! #[serde(default)]
//! struct App {
//!     port: u16,
//! }
//!
//! impl ConfigType for App {}
//!
//! let provider: FileProvider<App> = FileProvider::new(FileSource::new("app", Vec::new()));
//! let app = provider.config(Vec::new())?;
//! # Ok::<(), overlay_config::error::ConfigError>(())
//! ```

pub mod capability;
pub mod cli;
pub mod decode;
pub mod defaults;
pub mod document;
pub mod env;
pub mod error;
pub mod logging;
pub mod merge;
pub mod options;
pub mod overlay;
pub mod provider;
pub mod source;
pub mod watcher;

pub use capability::ConfigType;
pub use document::RawDocument;
pub use error::{ConfigError, Result, Stage};
pub use overlay::Overlay;
pub use provider::{FileProvider, Provider};
pub use source::{FileSource, Source};
