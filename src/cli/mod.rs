//! CLI command definitions for overlay-config
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands;
//! [`commands`] holds the implementations, generic over the config type.

pub mod commands;

use crate::overlay::Overlay;
use crate::source::SourceOverrides;
use clap::{Parser, Subcommand};
use std::sync::Arc;

/// Inspect, edit and watch layered configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub source: SourceOverrides,

    /// Config name, searched as <name>.yaml, .yml, .json or .toml
    #[arg(short, long, default_value = "server", global = true)]
    pub name: String,

    /// Overlay to apply, as FILE:FROM:TO[,TO...] (repeatable)
    #[arg(long = "overlay", value_name = "OVERLAY", global = true)]
    pub overlays: Vec<OverlayArg>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format for show and get: yaml (default) or json
    #[arg(short = 'o', long, default_value = "yaml", global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the fully resolved config
    #[command(visible_alias = "print")]
    Show,

    /// Print the resolved value of one or more dotted keys
    Get {
        #[arg(required = true, value_name = "KEY")]
        keys: Vec<String>,
    },

    /// Set dotted keys in the config file and write it back
    Set {
        #[arg(required = true, value_name = "KEY=VALUE")]
        pairs: Vec<String>,
    },

    /// Check that the config parses, has no unknown keys and passes validation
    #[command(visible_alias = "test")]
    Validate,

    /// Keep the config loaded and reload it whenever a file changes
    Watch,
}

/// An overlay given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayArg {
    pub filename: String,
    pub from: String,
    pub to: Vec<String>,
}

impl OverlayArg {
    pub fn to_overlay(&self) -> Arc<Overlay> {
        Arc::new(Overlay::new(
            self.filename.clone(),
            self.from.clone(),
            self.to.clone(),
        ))
    }
}

impl From<&Overlay> for OverlayArg {
    fn from(overlay: &Overlay) -> Self {
        OverlayArg {
            filename: overlay.filename.clone(),
            from: overlay.from.clone(),
            to: overlay.to.clone(),
        }
    }
}

impl std::str::FromStr for OverlayArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(filename), Some(from), Some(to)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!(
                "Invalid overlay '{}'. Expected FILE:FROM:TO[,TO...]",
                s
            ));
        };
        let to: Vec<String> = to
            .split(',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if filename.is_empty() || from.is_empty() || to.is_empty() {
            return Err(format!(
                "Invalid overlay '{}'. FILE, FROM and TO must all be set",
                s
            ));
        }
        Ok(OverlayArg {
            filename: filename.to_string(),
            from: from.to_string(),
            to,
        })
    }
}

/// Output format for printed config
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!(
                "Invalid format '{}'. Valid options: yaml, json",
                s
            )),
        }
    }
}
