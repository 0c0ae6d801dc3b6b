//! Decode hooks and typed decoding.
//!
//! Decoding turns the merged configuration tree into the caller's typed
//! config through serde. Every time the typed destination asks for a value,
//! the requested [`TargetKind`] and the [`SourceKind`] of the raw value are
//! offered to the registered hooks in order. The first hook that returns a
//! value wins; when none applies the raw value is decoded as is.
//!
//! Built-in hooks:
//! - [`string_to_sequence`]: `"a,b,c"` into a list
//! - [`duration`]: `"4d3h2m1s"` into `std::time::Duration`
//! - [`weak_scalars`]: `"8080"` into integers, `"true"` into bools, numbers into strings

mod de;
pub mod duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub use de::DecodeError;
pub use duration::{DurationError, parse_duration};

/// Shape of a raw tree value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Null,
    Bool,
    Number,
    String,
    Sequence,
    Map,
}

impl SourceKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => SourceKind::Null,
            Value::Bool(_) => SourceKind::Bool,
            Value::Number(_) => SourceKind::Number,
            Value::String(_) => SourceKind::String,
            Value::Array(_) => SourceKind::Sequence,
            Value::Object(_) => SourceKind::Map,
        }
    }
}

/// What the typed destination asked the decoder for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Self-describing: the destination accepts whatever is there.
    Any,
    Bool,
    /// Signed integer of any width.
    Int,
    /// Unsigned integer of any width.
    Uint,
    Float,
    Char,
    String,
    Bytes,
    Option,
    Unit,
    /// Lists, tuples and tuple structs.
    Sequence,
    Map,
    Struct {
        name: &'static str,
        fields: &'static [&'static str],
    },
    Enum(&'static str),
    Newtype(&'static str),
    /// Struct field or enum variant name.
    Identifier,
}

/// Field layout serde uses for `std::time::Duration`.
const DURATION_FIELDS: &[&str] = &["secs", "nanos"];

impl TargetKind {
    /// Whether this is the kind serde requests for `std::time::Duration`.
    pub fn is_duration(&self) -> bool {
        matches!(self, TargetKind::Struct { name: "Duration", fields } if *fields == DURATION_FIELDS)
    }
}

/// Error returned by a hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a hook: `Ok(None)` when the hook does not apply.
pub type HookResult = Result<Option<Value>, HookError>;

/// A pure, type-guarded value transform.
pub type DecodeHook = Arc<dyn Fn(SourceKind, TargetKind, &Value) -> HookResult + Send + Sync>;

/// Ordered list of decode hooks.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<DecodeHook>,
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl HookChain {
    /// An empty chain; values decode exactly as stored.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in hooks, in order.
    pub fn defaults() -> Self {
        Self {
            hooks: vec![string_to_sequence(","), duration(), weak_scalars()],
        }
    }

    /// Append a hook after the existing ones.
    pub fn push(&mut self, hook: DecodeHook) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run the chain for one value. The first applicable hook wins.
    pub fn apply(&self, target: TargetKind, value: Value) -> Result<Value, HookError> {
        let source = SourceKind::of(&value);
        for hook in &self.hooks {
            if let Some(converted) = hook(source, target, &value)? {
                return Ok(converted);
            }
        }
        Ok(value)
    }
}

/// Combine several hooks into one; the first applicable hook wins.
pub fn compose(hooks: Vec<DecodeHook>) -> DecodeHook {
    Arc::new(move |source, target, value| {
        for hook in &hooks {
            if let Some(converted) = hook(source, target, value)? {
                return Ok(Some(converted));
            }
        }
        Ok(None)
    })
}

/// Split strings on `separator` when a list is wanted. Parts are trimmed;
/// an empty string is an empty list.
pub fn string_to_sequence(separator: &'static str) -> DecodeHook {
    Arc::new(move |source, target, value| {
        if source != SourceKind::String || target != TargetKind::Sequence {
            return Ok(None);
        }
        let s = value.as_str().unwrap_or_default();
        if s.is_empty() {
            return Ok(Some(Value::Array(Vec::new())));
        }
        Ok(Some(Value::Array(
            s.split(separator)
                .map(|part| Value::String(part.trim().to_string()))
                .collect(),
        )))
    })
}

/// Parse duration strings (see [`parse_duration`]) for `Duration` targets.
pub fn duration() -> DecodeHook {
    Arc::new(|source, target, value| {
        if source != SourceKind::String || !target.is_duration() {
            return Ok(None);
        }
        let parsed = parse_duration(value.as_str().unwrap_or_default())?;
        Ok(Some(serde_json::json!({
            "secs": parsed.as_secs(),
            "nanos": parsed.subsec_nanos(),
        })))
    })
}

/// Weakly-typed scalar conversions.
///
/// Strings decode into bools (`1`, `t`, `true`, `0`, `f`, `false`, any
/// case), integers and floats. Numbers and bools decode into strings.
/// Environment overrides arrive as strings, so this is what lets
/// `APP_WEBSERVER_PORT=7070` fill a `u16`.
pub fn weak_scalars() -> DecodeHook {
    Arc::new(|source, target, value| {
        let converted = match (source, target) {
            (SourceKind::String, TargetKind::Bool) => {
                let s = value.as_str().unwrap_or_default().trim();
                let parsed = match s.to_ascii_lowercase().as_str() {
                    "1" | "t" | "true" => true,
                    "0" | "f" | "false" => false,
                    _ => return Err(format!("cannot parse {s:?} as bool").into()),
                };
                Value::Bool(parsed)
            }
            (SourceKind::String, TargetKind::Int) => {
                let s = value.as_str().unwrap_or_default().trim();
                Value::from(s.parse::<i64>().map_err(|e| format!("cannot parse {s:?} as integer: {e}"))?)
            }
            (SourceKind::String, TargetKind::Uint) => {
                let s = value.as_str().unwrap_or_default().trim();
                Value::from(
                    s.parse::<u64>()
                        .map_err(|e| format!("cannot parse {s:?} as unsigned integer: {e}"))?,
                )
            }
            (SourceKind::String, TargetKind::Float) => {
                let s = value.as_str().unwrap_or_default().trim();
                let f = s
                    .parse::<f64>()
                    .map_err(|e| format!("cannot parse {s:?} as float: {e}"))?;
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("{s:?} is not a finite number"))?
            }
            (SourceKind::Number | SourceKind::Bool, TargetKind::String) => {
                Value::String(value.to_string())
            }
            _ => return Ok(None),
        };
        Ok(Some(converted))
    })
}

/// Decode `value` onto `T`, consulting `hooks` along the way.
pub fn decode<T: DeserializeOwned>(value: Value, hooks: &HookChain) -> Result<T, DecodeError> {
    T::deserialize(de::Decoder::new(value, hooks, String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Timeouts {
        idle: Duration,
        #[serde(default)]
        hosts: Vec<String>,
        retries: u8,
        verbose: bool,
        ratio: f32,
        label: String,
    }

    #[test]
    fn test_builtin_hooks_apply() {
        let value = json!({
            "idle": "4d3h2m1s",
            "hosts": "a, b,c",
            "retries": "3",
            "verbose": "TRUE",
            "ratio": "0.5",
            "label": 42
        });
        let decoded: Timeouts = decode(value, &HookChain::defaults()).unwrap();
        assert_eq!(
            decoded,
            Timeouts {
                idle: Duration::from_secs(356_521),
                hosts: vec!["a".into(), "b".into(), "c".into()],
                retries: 3,
                verbose: true,
                ratio: 0.5,
                label: "42".into(),
            }
        );
    }

    #[test]
    fn test_malformed_duration_is_error_not_zero() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct T {
            timeout: Duration,
        }
        let err = decode::<T>(json!({"timeout": "abc"}), &HookChain::defaults()).unwrap_err();
        assert_eq!(err.path(), "timeout");
        assert!(err.to_string().contains("invalid duration"));
    }

    #[test]
    fn test_no_hook_passes_through() {
        let decoded: Vec<u32> = decode(json!([1, 2, 3]), &HookChain::defaults()).unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }

    #[test]
    fn test_without_hooks_strings_stay_strings() {
        let err = decode::<u16>(json!("8080"), &HookChain::new()).unwrap_err();
        assert!(err.to_string().contains("invalid type"));
    }

    #[test]
    fn test_first_applicable_hook_wins() {
        let mut chain = HookChain::new();
        chain.push(Arc::new(|_, target, _| {
            Ok((target == TargetKind::String).then(|| json!("first")))
        }));
        chain.push(Arc::new(|_, _, _| Ok(Some(json!("second")))));
        let decoded: String = decode(json!("raw"), &chain).unwrap();
        assert_eq!(decoded, "first");
    }

    #[test]
    fn test_compose_hooks() {
        let upper: DecodeHook = Arc::new(|source, target, value| {
            if source == SourceKind::String && target == TargetKind::String {
                Ok(value.as_str().map(|s| json!(s.to_uppercase())))
            } else {
                Ok(None)
            }
        });
        let mut chain = HookChain::defaults();
        chain.push(compose(vec![upper]));
        let decoded: String = decode(json!("abc"), &chain).unwrap();
        assert_eq!(decoded, "ABC");
    }

    #[test]
    fn test_hook_error_carries_path() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Web {
            port: u16,
        }
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Root {
            webserver: Web,
        }
        let err = decode::<Root>(
            json!({"webserver": {"port": "eighty"}}),
            &HookChain::defaults(),
        )
        .unwrap_err();
        assert_eq!(err.path(), "webserver.port");
    }
}
