//! overlay-config
//!
//! Inspect, edit and live-reload a layered server configuration: compiled
//! defaults, a discovered `<name>.yaml|yml|json|toml`, overlays spliced in
//! from other files, and `<PREFIX>_*` environment overrides.

use anyhow::Result;
use clap::Parser;
use overlay_config::capability::{
    ConfigType, ConfigWithLogging, CustomValidator, logging_settings,
};
use overlay_config::cli::{Cli, Command, OverlayArg, commands};
use overlay_config::logging::{self, LoggingSettings};
use overlay_config::overlay::Overlay;
use overlay_config::provider::{FileProvider, Provider};
use overlay_config::source::FileSource;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::time::Duration;

/// Config of a small web server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ServerConfig {
    log: LoggingSettings,
    webserver: WebserverConfig,
    routes: Vec<Route>,
    /// Overlays the config itself asks for, applied on top of `--overlay`.
    overlays: Vec<Overlay>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct WebserverConfig {
    host: String,
    port: u16,
    #[serde(serialize_with = "duration_string")]
    read_timeout: Duration,
    #[serde(serialize_with = "duration_string")]
    shutdown_grace: Duration,
}

impl Default for WebserverConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            read_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// A path served with fixed content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Route {
    path: String,
    content: Value,
}

/// Write durations the way they are read, e.g. `30s` or `1500ms`.
fn duration_string<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    if d.subsec_nanos() == 0 {
        s.serialize_str(&format!("{}s", d.as_secs()))
    } else if d.subsec_nanos() % 1_000_000 == 0 {
        s.serialize_str(&format!("{}ms", d.as_millis()))
    } else {
        s.serialize_str(&format!("{}ns", d.as_nanos()))
    }
}

impl CustomValidator for ServerConfig {
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.webserver.host.is_empty(), "missing webserver.host");
        anyhow::ensure!(self.webserver.port != 0, "missing webserver.port");
        for (i, route) in self.routes.iter().enumerate() {
            anyhow::ensure!(
                route.path.starts_with('/'),
                "route {} ({}): path must start with /",
                i,
                route.path
            );
        }
        Ok(())
    }
}

impl ConfigWithLogging for ServerConfig {
    fn logging_config(&self) -> LoggingSettings {
        self.log.clone()
    }
}

impl ConfigType for ServerConfig {
    fn validator(&self) -> Option<&dyn CustomValidator> {
        Some(self)
    }

    fn logging(&self) -> Option<&dyn ConfigWithLogging> {
        Some(self)
    }
}

fn main() -> Result<()> {
    let mut cli = Cli::parse();

    let source = FileSource::new(cli.name.clone(), Vec::new()).with_overrides(cli.source.clone());
    let provider: FileProvider<ServerConfig> = FileProvider::new(source);

    // Logging settings come from the config when it resolves
    let resolved = provider.config(Vec::new()).ok();
    let mut settings = resolved
        .as_ref()
        .and_then(logging_settings)
        .unwrap_or_default();
    if cli.verbose {
        settings = settings.verbose();
    }
    // Keep stdout clean for printed config
    if cli.command != Command::Watch && matches!(settings.output.as_str(), "" | "1" | "stdout") {
        settings.output = "stderr".to_string();
    }
    logging::init(&settings)?;

    if let Some(config) = resolved {
        cli.overlays.extend(config.overlays.iter().map(OverlayArg::from));
    }

    let stdout = std::io::stdout();
    commands::run(&cli, &provider, &mut stdout.lock())
}
