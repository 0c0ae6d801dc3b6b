//! Optional capabilities of a typed config.
//!
//! A config type opts into extra behaviour by implementing one of the
//! capability traits and answering the matching query on [`ConfigType`]:
//!
//! ```
//! use overlay_config::capability::{ConfigType, CustomValidator};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct App {
//!     port: u16,
//! }
//!
//! impl CustomValidator for App {
//!     fn validate(&self) -> anyhow::Result<()> {
//!         anyhow::ensure!(self.port != 0, "port must be set");
//!         Ok(())
//!     }
//! }
//!
//! impl ConfigType for App {
//!     fn validator(&self) -> Option<&dyn CustomValidator> {
//!         Some(self)
//!     }
//! }
//!
//! assert!(overlay_config::capability::validate(&App::default()).is_err());
//! ```

use crate::decode::{DecodeHook, HookChain};
use crate::error::{ConfigError, Result};
use crate::logging::LoggingSettings;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A type the provider can resolve.
pub trait ConfigType: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    fn custom_decoder(&self) -> Option<&dyn CustomDecoder> {
        None
    }

    fn validator(&self) -> Option<&dyn CustomValidator> {
        None
    }

    fn logging(&self) -> Option<&dyn ConfigWithLogging> {
        None
    }
}

/// Contributes one hook, run after the built-ins.
pub trait CustomDecoder {
    fn decode_hook(&self) -> DecodeHook;
}

/// Semantic checks beyond what decoding enforces.
pub trait CustomValidator {
    fn validate(&self) -> anyhow::Result<()>;
}

/// Exposes the logging section of the config.
pub trait ConfigWithLogging {
    fn logging_config(&self) -> LoggingSettings;
}

/// Built-in hooks plus `T`'s custom hook, probed on `T::default()`.
pub fn hook_chain<T: ConfigType>() -> HookChain {
    let mut chain = HookChain::defaults();
    if let Some(decoder) = T::default().custom_decoder() {
        chain.push(decoder.decode_hook());
    }
    chain
}

/// Run the validator capability, if any.
pub fn validate<T: ConfigType>(config: &T) -> Result<()> {
    match config.validator() {
        Some(validator) => validator.validate().map_err(ConfigError::Validation),
        None => Ok(()),
    }
}

/// Logging settings from the logging capability, if any.
pub fn logging_settings<T: ConfigType>(config: &T) -> Option<LoggingSettings> {
    config.logging().map(ConfigWithLogging::logging_config)
}
