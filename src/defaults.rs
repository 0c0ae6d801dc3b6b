//! Compiled-in defaults.
//!
//! The default layer is `T::default()` serialized to a tree, with any
//! path-keyed overrides registered on the provider applied on top.

use crate::document::set_path;
use crate::error::{ConfigError, Result};
use crate::merge::kind_name;
use serde::Serialize;
use serde_json::{Map, Value};

/// Serialize `defaults` into a tree and apply `overrides` in order.
pub fn apply<T: Serialize>(defaults: &T, overrides: &[(String, Value)]) -> Result<Value> {
    let serialized = serde_json::to_value(defaults).map_err(|e| ConfigError::defaults("", e))?;
    let mut tree = match serialized {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(ConfigError::defaults(
                "",
                format!("defaults must serialize to a map, got {}", kind_name(&other)),
            ));
        }
    };

    for (path, value) in overrides {
        set_path(&mut tree, path, value.clone())
            .map_err(|e| ConfigError::defaults(path.as_str(), e))?;
    }

    Ok(Value::Object(tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use serde_json::json;

    #[derive(Serialize, Default)]
    struct Web {
        host: String,
        port: u16,
    }

    #[derive(Serialize, Default)]
    struct Root {
        webserver: Web,
    }

    #[test]
    fn test_defaults_tree() {
        let tree = apply(&Root::default(), &[]).unwrap();
        assert_eq!(tree, json!({"webserver": {"host": "", "port": 0}}));
    }

    #[test]
    fn test_path_overrides() {
        let overrides = vec![
            ("webserver.port".to_string(), json!(8080)),
            ("log.level".to_string(), json!("info")),
        ];
        let tree = apply(&Root::default(), &overrides).unwrap();
        assert_eq!(tree["webserver"]["port"], json!(8080));
        assert_eq!(tree["log"]["level"], json!("info"));
    }

    #[test]
    fn test_override_through_scalar_fails() {
        let overrides = vec![("webserver.port.inner".to_string(), json!(1))];
        let err = apply(&Root::default(), &overrides).unwrap_err();
        assert_eq!(err.stage(), Stage::Defaults);
    }

    #[test]
    fn test_non_map_defaults_rejected() {
        let err = apply(&5u8, &[]).unwrap_err();
        assert!(err.to_string().contains("got number"));
    }
}
