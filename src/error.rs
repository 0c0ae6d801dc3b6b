//! Structured error types for configuration resolution.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage an error originated from.
///
/// Lets callers tell configuration-content problems apart from I/O problems
/// without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// No config file found across the search paths.
    Discovery,
    /// Reading or parsing a file.
    Read,
    /// Applying compiled or registered defaults.
    Defaults,
    /// Resolving an overlay or forging its patch.
    Overlay,
    /// Structural merge of a patch into a document.
    Merge,
    /// Decoding the merged tree onto the typed config.
    Decode,
    /// Installing a file watch.
    Watch,
    /// Caller-invoked validation.
    Validate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Discovery => write!(f, "discovery"),
            Stage::Read => write!(f, "read"),
            Stage::Defaults => write!(f, "defaults"),
            Stage::Overlay => write!(f, "overlay"),
            Stage::Merge => write!(f, "merge"),
            Stage::Decode => write!(f, "decode"),
            Stage::Watch => write!(f, "watch"),
            Stage::Validate => write!(f, "validate"),
        }
    }
}

/// Errors produced while resolving a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {name:?} not found in search paths: {searched:?}")]
    NotFound { name: String, searched: Vec<PathBuf> },

    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported config format {extension:?} for {}", .path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("parsing {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("overlay config {filename:?} not found in {searched:?}")]
    OverlayNotFound {
        filename: String,
        searched: Vec<PathBuf>,
    },

    #[error("referenced from field {segment:?} in path {path:?} not found in overlay {filename:?}")]
    OverlayResolution {
        filename: String,
        path: String,
        segment: String,
    },

    #[error("referenced from path {path:?} is nil in overlay {filename:?}")]
    OverlayNil { filename: String, path: String },

    #[error("overlay {filename:?}: {message}")]
    OverlayGrammar { filename: String, message: String },

    #[error("merge conflict at {path:?}: cannot merge {patch} into {target}")]
    Merge {
        path: String,
        target: &'static str,
        patch: &'static str,
    },

    #[error("decoding config{}: {message}", fmt_path(.path))]
    Decode { path: String, message: String },

    #[error("setting config defaults at {path:?}: {message}")]
    Defaults { path: String, message: String },

    #[error("watching {}: {message}", .path.display())]
    Watch { path: PathBuf, message: String },

    #[error("config validation failed: {0}")]
    Validation(#[source] anyhow::Error),
}

fn fmt_path(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" at {path:?}")
    }
}

impl ConfigError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            ConfigError::NotFound { .. } => Stage::Discovery,
            ConfigError::Io { .. }
            | ConfigError::UnsupportedFormat { .. }
            | ConfigError::Parse { .. } => Stage::Read,
            ConfigError::OverlayNotFound { .. }
            | ConfigError::OverlayResolution { .. }
            | ConfigError::OverlayNil { .. }
            | ConfigError::OverlayGrammar { .. } => Stage::Overlay,
            ConfigError::Merge { .. } => Stage::Merge,
            ConfigError::Decode { .. } => Stage::Decode,
            ConfigError::Defaults { .. } => Stage::Defaults,
            ConfigError::Watch { .. } => Stage::Watch,
            ConfigError::Validation(_) => Stage::Validate,
        }
    }

    // Convenience constructors

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, err: impl fmt::Display) -> Self {
        ConfigError::Parse {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn grammar(filename: &str, message: impl Into<String>) -> Self {
        ConfigError::OverlayGrammar {
            filename: filename.to_string(),
            message: message.into(),
        }
    }

    pub fn decode(path: impl Into<String>, err: impl fmt::Display) -> Self {
        ConfigError::Decode {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn defaults(path: impl Into<String>, err: impl fmt::Display) -> Self {
        ConfigError::Defaults {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn watch(path: impl Into<PathBuf>, err: impl fmt::Display) -> Self {
        ConfigError::Watch {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tags() {
        let err = ConfigError::NotFound {
            name: "server".into(),
            searched: vec![],
        };
        assert_eq!(err.stage(), Stage::Discovery);
        assert_eq!(ConfigError::decode("a.b", "boom").stage(), Stage::Decode);
        assert_eq!(ConfigError::defaults("", "boom").stage(), Stage::Defaults);
        assert_eq!(
            ConfigError::grammar("o.yaml", "bad").stage(),
            Stage::Overlay
        );
        assert_eq!(Stage::Merge.to_string(), "merge");
    }

    #[test]
    fn test_decode_message_names_path() {
        let err = ConfigError::decode("webserver.port", "invalid digit");
        assert_eq!(
            err.to_string(),
            "decoding config at \"webserver.port\": invalid digit"
        );
        let err = ConfigError::decode("", "invalid digit");
        assert_eq!(err.to_string(), "decoding config: invalid digit");
    }

    #[test]
    fn test_resolution_message_names_segment() {
        let err = ConfigError::OverlayResolution {
            filename: "rules.yaml".into(),
            path: "does.not.exist".into(),
            segment: "not".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"not\""));
        assert!(msg.contains("rules.yaml"));
    }
}
