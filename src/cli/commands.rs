//! Implementations of the `show`, `get`, `set`, `validate` and `watch`
//! subcommands.
//!
//! Every command is generic over the application's config type so a binary
//! only has to supply its `ConfigType` and a provider.

use super::{Cli, Command, OutputFormat, OverlayArg};
use crate::capability::{self, ConfigType};
use crate::options::{with_on_config_change, with_overlays, with_read_in_config};
use crate::overlay::Overlay;
use crate::provider::{FileProvider, Provider};
use crate::watcher::ConfigChangeEvent;
use anyhow::{Context, Result, anyhow, bail};
use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use std::io::Write;
use std::sync::{Arc, mpsc};
use tracing::{error, info, warn};

/// Dispatch the parsed command line.
pub fn run<T: ConfigType>(cli: &Cli, provider: &FileProvider<T>, out: &mut dyn Write) -> Result<()> {
    let overlays: Vec<Arc<Overlay>> = cli.overlays.iter().map(OverlayArg::to_overlay).collect();
    match &cli.command {
        Command::Show => show(provider, &overlays, cli.output, out),
        Command::Get { keys } => get(provider, &overlays, keys, cli.output, out),
        Command::Set { pairs } => set(provider, pairs, out),
        Command::Validate => validate(provider, &overlays, out),
        Command::Watch => watch(provider, &overlays, None).map(|_| ()),
    }
}

fn resolve<T: ConfigType>(provider: &FileProvider<T>, overlays: &[Arc<Overlay>]) -> Result<T> {
    provider
        .config(vec![with_overlays(overlays.iter().cloned())])
        .context("loading config")
}

/// Print the resolved config.
pub fn show<T: ConfigType>(
    provider: &FileProvider<T>,
    overlays: &[Arc<Overlay>],
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<()> {
    let config = resolve(provider, overlays)?;
    let tree = serde_json::to_value(&config)?;
    out.write_all(render(&tree, format)?.as_bytes())?;
    Ok(())
}

/// Print resolved values. One key prints the bare value; several keys print
/// a mapping of key to value.
pub fn get<T: ConfigType>(
    provider: &FileProvider<T>,
    overlays: &[Arc<Overlay>],
    keys: &[String],
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<()> {
    let config = resolve(provider, overlays)?;
    let tree = serde_json::to_value(&config)?;

    let mut found = Map::new();
    for key in keys {
        let value = lookup(&tree, key).ok_or_else(|| anyhow!("key {key:?} is not set"))?;
        found.insert(key.clone(), value.clone());
    }

    let printed = match (keys, found.len()) {
        ([key], 1) => found.remove(key).unwrap_or(Value::Null),
        _ => Value::Object(found),
    };
    out.write_all(render(&printed, format)?.as_bytes())?;
    Ok(())
}

/// Set keys in the base file and write it back in its own format.
///
/// Overlays are not applied, so only base-file content is written back. The
/// edited document must still decode before it is written.
pub fn set<T: ConfigType>(
    provider: &FileProvider<T>,
    pairs: &[String],
    out: &mut dyn Write,
) -> Result<()> {
    let assignments = pairs
        .iter()
        .map(|pair| parse_assignment(pair))
        .collect::<Result<Vec<_>>>()?;

    provider.config(Vec::new()).context("loading config")?;
    let document = provider.raw();
    for (key, value) in assignments {
        document.set(&key, value)?;
    }
    provider
        .config(vec![with_read_in_config(false)])
        .context("config does not decode after update")?;

    let path = document.write()?;
    info!(file = %path.display(), keys = pairs.len(), "config updated");
    writeln!(out, "wrote {}", path.display())?;
    Ok(())
}

/// Decode the config, reject keys the config type does not know, then run
/// the validator capability.
pub fn validate<T: ConfigType>(
    provider: &FileProvider<T>,
    overlays: &[Arc<Overlay>],
    out: &mut dyn Write,
) -> Result<()> {
    let config = resolve(provider, overlays)?;
    let document = provider.raw();

    let typed = serde_json::to_value(&config)?;
    let mut unknown = Vec::new();
    unknown_keys(&document.snapshot(), &typed, "", &mut unknown);
    if !unknown.is_empty() {
        bail!("unknown config keys: {}", unknown.join(", "));
    }

    capability::validate(&config)?;

    let origin = document
        .file_used()
        .map_or_else(|| document.name().to_string(), |p| p.display().to_string());
    writeln!(out, "{origin}: config is valid")?;
    Ok(())
}

/// Keep a live config and swap in a fresh value after every change.
///
/// Runs until the watch channel closes, or after `max_reloads` successful
/// reloads when given. Returns the live cell.
pub fn watch<T: ConfigType>(
    provider: &FileProvider<T>,
    overlays: &[Arc<Overlay>],
    max_reloads: Option<usize>,
) -> Result<Arc<ArcSwap<T>>> {
    let (tx, rx) = mpsc::channel();
    let initial = provider
        .config(vec![
            with_overlays(overlays.iter().cloned()),
            with_on_config_change(move |event| {
                let _ = tx.send(event);
            }),
        ])
        .context("loading config")?;

    let live = Arc::new(ArcSwap::from_pointee(initial));
    info!(
        file = ?provider.raw().file_used(),
        overlays = overlays.len(),
        "watching config for changes"
    );

    let mut reloads = 0;
    for event in rx {
        if reload(provider, overlays, &live, &event) {
            reloads += 1;
        }
        if max_reloads.is_some_and(|max| reloads >= max) {
            break;
        }
    }
    Ok(live)
}

/// React to one change event. Returns whether a new config was swapped in;
/// on failure the previous value stays live.
pub fn reload<T: ConfigType>(
    provider: &FileProvider<T>,
    overlays: &[Arc<Overlay>],
    live: &ArcSwap<T>,
    event: &ConfigChangeEvent,
) -> bool {
    let options = match event {
        ConfigChangeEvent::BaseFile(path) => {
            info!(file = %path.display(), "config file changed");
            vec![with_overlays(overlays.iter().cloned())]
        }
        // The overlay was already re-applied to the document by its watch.
        ConfigChangeEvent::Overlay(path) => {
            info!(overlay = %path.display(), "overlay changed");
            vec![with_read_in_config(false)]
        }
        ConfigChangeEvent::Error(message) => {
            warn!(error = %message, "config watch error");
            return false;
        }
    };

    match provider.config(options) {
        Ok(config) => {
            live.store(Arc::new(config));
            info!("config reloaded");
            true
        }
        Err(e) => {
            error!(stage = %e.stage(), "config reload failed, keeping previous config: {}", e);
            false
        }
    }
}

fn render(value: &Value, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Json => serde_json::to_string_pretty(value)? + "\n",
    })
}

fn lookup<'v>(tree: &'v Value, key: &str) -> Option<&'v Value> {
    key.split('.').try_fold(tree, |node, segment| node.get(segment))
}

/// Parse `key=value`; the value is read as a YAML scalar so `9090` stays a
/// number and `true` a bool.
fn parse_assignment(pair: &str) -> Result<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("invalid assignment {pair:?}, expected KEY=VALUE"))?;
    if key.is_empty() {
        bail!("invalid assignment {pair:?}, key is empty");
    }
    let value = if raw.is_empty() {
        Value::String(String::new())
    } else {
        serde_yaml::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    };
    Ok((key.to_string(), value))
}

/// Collect dotted paths present in `document` but absent from `typed`.
fn unknown_keys(document: &Value, typed: &Value, prefix: &str, found: &mut Vec<String>) {
    let (Value::Object(doc), Value::Object(known)) = (document, typed) else {
        return;
    };
    for (key, value) in doc {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match known.get(key) {
            Some(inner) => unknown_keys(value, inner, &path, found),
            None => found.push(path),
        }
    }
}
