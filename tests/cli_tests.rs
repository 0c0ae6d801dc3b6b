//! Integration tests for the config subcommands.

use arc_swap::ArcSwap;
use overlay_config::capability::{ConfigType, CustomValidator};
use overlay_config::cli::{Cli, OutputFormat, commands};
use overlay_config::env::MapEnv;
use overlay_config::watcher::ConfigChangeEvent;
use overlay_config::{FileProvider, FileSource, Overlay};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
struct Web {
    host: String,
    port: u16,
}

impl Default for Web {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
struct App {
    webserver: Web,
}

impl CustomValidator for App {
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.webserver.port >= 1024, "webserver.port must be unprivileged");
        Ok(())
    }
}

impl ConfigType for App {
    fn validator(&self) -> Option<&dyn CustomValidator> {
        Some(self)
    }
}

fn provider_in(dir: &Path) -> FileProvider<App> {
    let source = FileSource::new("app", vec![dir.to_path_buf()]).with_env(Arc::new(MapEnv::new()));
    FileProvider::new(source)
}

fn output(run: impl FnOnce(&mut Vec<u8>) -> anyhow::Result<()>) -> String {
    let mut buf = Vec::new();
    run(&mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}

#[test]
fn test_show_includes_defaults() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("app.yaml"), "webserver:\n  port: 9090\n").unwrap();
    let provider = provider_in(temp.path());

    let printed = output(|out| commands::show(&provider, &[], OutputFormat::Yaml, out));
    assert!(printed.contains("port: 9090"));
    assert!(printed.contains("host: 0.0.0.0"));
}

#[test]
fn test_get_single_and_multiple_keys() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("app.yaml"), "webserver:\n  port: 9090\n").unwrap();
    let provider = provider_in(temp.path());

    let single = output(|out| {
        commands::get(
            &provider,
            &[],
            &["webserver.port".to_string()],
            OutputFormat::Json,
            out,
        )
    });
    assert_eq!(single.trim(), "9090");

    let both = output(|out| {
        commands::get(
            &provider,
            &[],
            &["webserver.port".to_string(), "webserver.host".to_string()],
            OutputFormat::Yaml,
            out,
        )
    });
    assert!(both.contains("webserver.port: 9090"));
    assert!(both.contains("webserver.host: 0.0.0.0"));

    let mut sink = Vec::new();
    let err = commands::get(&provider, &[], &["nope".to_string()], OutputFormat::Yaml, &mut sink)
        .unwrap_err();
    assert!(err.to_string().contains("nope"));
}

#[test]
fn test_get_sees_overlay() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("app.yaml"), "webserver:\n  port: 9090\n").unwrap();
    fs::write(temp.path().join("prod.yaml"), "ports:\n  web: 4443\n").unwrap();
    let provider = provider_in(temp.path());
    let overlay = Arc::new(Overlay::new("prod.yaml", "ports.web", ["webserver.port"]));

    let printed = output(|out| {
        commands::get(
            &provider,
            &[overlay],
            &["webserver.port".to_string()],
            OutputFormat::Yaml,
            out,
        )
    });
    assert_eq!(printed.trim(), "4443");
}

#[test]
fn test_set_writes_file_in_its_format() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("app.json");
    fs::write(&file, r#"{"webserver": {"port": 9090}}"#).unwrap();
    let provider = provider_in(temp.path());

    let printed = output(|out| {
        commands::set(
            &provider,
            &["webserver.port=7070".to_string(), "webserver.host=example.org".to_string()],
            out,
        )
    });
    assert!(printed.starts_with("wrote "));

    let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(written["webserver"]["port"], 7070);
    assert_eq!(written["webserver"]["host"], "example.org");
}

#[test]
fn test_set_refuses_undecodable_value() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("app.yaml");
    fs::write(&file, "webserver:\n  port: 9090\n").unwrap();
    let provider = provider_in(temp.path());

    let mut sink = Vec::new();
    assert!(commands::set(&provider, &["webserver.port=http".to_string()], &mut sink).is_err());
    assert_eq!(fs::read_to_string(&file).unwrap(), "webserver:\n  port: 9090\n");
}

#[test]
fn test_validate() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("app.yaml"), "webserver:\n  port: 9090\n").unwrap();
    let provider = provider_in(temp.path());
    let printed = output(|out| commands::validate(&provider, &[], out));
    assert!(printed.ends_with("config is valid\n"));

    fs::write(temp.path().join("app.yaml"), "webserver:\n  port: 80\n").unwrap();
    let mut sink = Vec::new();
    let err = commands::validate(&provider, &[], &mut sink).unwrap_err();
    assert!(format!("{err:#}").contains("unprivileged"));

    fs::write(temp.path().join("app.yaml"), "webserver:\n  prot: 9090\n").unwrap();
    let err = commands::validate(&provider, &[], &mut sink).unwrap_err();
    assert!(err.to_string().contains("webserver.prot"));
}

#[test]
fn test_reload_swaps_on_success_and_keeps_on_failure() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("app.yaml");
    fs::write(&file, "webserver:\n  port: 9090\n").unwrap();
    let provider = provider_in(temp.path());
    let live = ArcSwap::from_pointee(App::default());

    assert!(commands::reload(
        &provider,
        &[],
        &live,
        &ConfigChangeEvent::BaseFile(file.clone())
    ));
    assert_eq!(live.load().webserver.port, 9090);

    fs::write(&file, "webserver:\n  port: [broken\n").unwrap();
    assert!(!commands::reload(
        &provider,
        &[],
        &live,
        &ConfigChangeEvent::BaseFile(file.clone())
    ));
    assert_eq!(live.load().webserver.port, 9090);

    assert!(!commands::reload(
        &provider,
        &[],
        &live,
        &ConfigChangeEvent::Error("watch failed".into())
    ));
}

#[test]
fn test_run_dispatches_parsed_command() {
    use clap::Parser;

    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("app.yaml"), "webserver:\n  port: 9090\n").unwrap();
    let provider = provider_in(temp.path());
    let cli = Cli::try_parse_from(["overlay-config", "-o", "json", "get", "webserver.port"]).unwrap();

    let printed = output(|out| commands::run(&cli, &provider, out));
    assert_eq!(printed.trim(), "9090");
}
