//! Logging settings and tracing-subscriber initialisation.
//!
//! Configs that carry a logging section expose it through
//! [`ConfigWithLogging`](crate::capability::ConfigWithLogging). The binary
//! uses [`init`] to turn it into a global subscriber.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Logging section of an application config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `overlay_config=debug,warn`.
    pub level: String,
    /// `stdout`, `stderr`, `off`, or a file path (appended to).
    pub output: String,
    /// `text` or `compact`.
    pub format: String,
    /// Prefix each line with a timestamp.
    pub timestamps: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: "stdout".to_string(),
            format: "text".to_string(),
            timestamps: true,
        }
    }
}

impl LoggingSettings {
    /// Same settings with the level forced to `debug`.
    pub fn verbose(mut self) -> Self {
        self.level = "debug".to_string();
        self
    }
}

/// Writer for an output setting, or `None` when logging is off.
pub fn make_writer(output: &str) -> std::io::Result<Option<BoxMakeWriter>> {
    let writer = match output {
        "0" | "off" => return Ok(None),
        "" | "1" | "stdout" => BoxMakeWriter::new(std::io::stdout),
        "2" | "stderr" => BoxMakeWriter::new(std::io::stderr),
        filename => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            BoxMakeWriter::new(file)
        }
    };
    Ok(Some(writer))
}

/// Install the global subscriber described by `settings`.
pub fn init(settings: &LoggingSettings) -> anyhow::Result<()> {
    let Some(writer) = make_writer(&settings.output)? else {
        return Ok(());
    };
    let filter = EnvFilter::try_new(&settings.level)?;
    let ansi = matches!(settings.output.as_str(), "" | "1" | "stdout" | "2" | "stderr");
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    match (settings.format.as_str(), settings.timestamps) {
        ("compact", true) => tracing::subscriber::set_global_default(builder.compact().finish())?,
        ("compact", false) => {
            tracing::subscriber::set_global_default(builder.compact().without_time().finish())?
        }
        (_, true) => tracing::subscriber::set_global_default(builder.finish())?,
        (_, false) => tracing::subscriber::set_global_default(builder.without_time().finish())?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = LoggingSettings::default();
        assert_eq!(settings.level, "info");
        assert_eq!(settings.output, "stdout");
        assert_eq!(settings.verbose().level, "debug");
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let settings: LoggingSettings = serde_json::from_str(r#"{"level": "warn"}"#).unwrap();
        assert_eq!(settings.level, "warn");
        assert_eq!(settings.format, "text");
    }

    #[test]
    fn test_writer_selection() {
        assert!(make_writer("off").unwrap().is_none());
        assert!(make_writer("stderr").unwrap().is_some());

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.log");
        assert!(make_writer(path.to_str().unwrap()).unwrap().is_some());
        assert!(path.exists());
    }
}
