//! Environment variable access and key binding.
//!
//! The engine never reads `std::env` directly; it goes through an
//! [`EnvSource`] so tests can supply a fixed environment without touching
//! process state.

use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Abstraction over an environment variable store.
pub trait EnvSource: Send + Sync {
    /// Look up a single variable.
    fn get(&self, name: &str) -> Option<String>;

    /// Iterate over all variable names.
    fn names(&self) -> Vec<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn names(&self) -> Vec<String> {
        std::env::vars_os()
            .filter_map(|(k, _)| k.into_string().ok())
            .collect()
    }
}

/// A fixed, in-memory environment.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from name/value pairs.
    pub fn from_pairs<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }
}

impl EnvSource for MapEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }
}

/// Derive the default environment prefix for a config name.
///
/// Returns the upper-cased name when at least one variable starts with it,
/// otherwise an empty prefix (environment overriding disabled).
pub fn default_env_prefix(config_name: &str, env: &dyn EnvSource) -> String {
    let upper = config_name.to_uppercase();
    if upper.is_empty() {
        return String::new();
    }
    if env.names().iter().any(|name| name.starts_with(&upper)) {
        upper
    } else {
        String::new()
    }
}

/// Maps dotted document paths to environment variable names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentBinding {
    prefix: String,
}

impl EnvironmentBinding {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether overriding is enabled at all.
    pub fn is_enabled(&self) -> bool {
        !self.prefix.is_empty()
    }

    /// Variable name for a dotted path: `webserver.port` -> `PREFIX_WEBSERVER_PORT`.
    pub fn var_name(&self, path: &str) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let key: String = path
            .chars()
            .map(|c| match c {
                '.' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        Some(format!("{}_{}", self.prefix.to_uppercase(), key))
    }

    /// Look up the override for a dotted path.
    pub fn lookup(&self, path: &str, env: &dyn EnvSource) -> Option<String> {
        self.var_name(path).and_then(|name| env.get(&name))
    }

    /// Replace every leaf of `tree` that has a matching variable.
    ///
    /// Only keys already present in the tree are considered. A variable
    /// naming a mapping replaces the whole mapping, which is how a
    /// `Duration` default (serialized as `{secs, nanos}`) takes `90s` from
    /// the environment; otherwise non-empty mappings are descended into.
    /// Values are inserted as strings and left to the decode hooks to coerce.
    pub fn apply(&self, tree: &mut Value, env: &dyn EnvSource) -> usize {
        if !self.is_enabled() {
            return 0;
        }
        self.apply_at(tree, "", env)
    }

    fn apply_at(&self, node: &mut Value, prefix: &str, env: &dyn EnvSource) -> usize {
        let Value::Object(map) = node else {
            return 0;
        };
        let mut applied = 0;
        for (key, child) in map.iter_mut() {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            if let Some(value) = self.lookup(&path, env) {
                debug!(path = %path, "environment override");
                *child = Value::String(value);
                applied += 1;
            } else if matches!(child, Value::Object(inner) if !inner.is_empty()) {
                applied += self.apply_at(child, &path, env);
            }
        }
        applied
    }
}
