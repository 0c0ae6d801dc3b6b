//! Hook-aware serde deserializer over a `serde_json::Value` tree.

use super::{HookChain, TargetKind};
use serde::de::{
    self, DeserializeSeed, EnumAccess, IntoDeserializer, MapAccess, SeqAccess, VariantAccess,
    Visitor,
};
use serde_json::{Map, Value};
use std::fmt;

/// Decode failure with the dotted path of the offending value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    path: String,
    message: String,
}

impl DecodeError {
    /// Dotted path of the value that failed; empty at the root.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn into_parts(self) -> (String, String) {
        (self.path, self.message)
    }

    /// Attach `path` unless a deeper path is already recorded.
    fn at(mut self, path: &str) -> Self {
        if self.path.is_empty() {
            self.path = path.to_string();
        }
        self
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl std::error::Error for DecodeError {}

impl de::Error for DecodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self {
            path: String::new(),
            message: msg.to_string(),
        }
    }
}

fn join(base: &str, key: &str) -> String {
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{base}.{key}")
    }
}

pub(super) struct Decoder<'h> {
    value: Value,
    hooks: &'h HookChain,
    path: String,
}

impl<'h> Decoder<'h> {
    pub(super) fn new(value: Value, hooks: &'h HookChain, path: String) -> Self {
        Self { value, hooks, path }
    }

    /// Offer the value to the hook chain for `target`.
    fn hooked(self, target: TargetKind) -> Result<Self, DecodeError> {
        let Decoder { value, hooks, path } = self;
        match hooks.apply(target, value) {
            Ok(value) => Ok(Decoder { value, hooks, path }),
            Err(e) => Err(DecodeError {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Null reads as an empty container for list, map and struct targets.
    fn null_as(self, empty: Value) -> Self {
        match self.value {
            Value::Null => Decoder { value: empty, ..self },
            _ => self,
        }
    }

    fn visit<'de, V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let Decoder { value, hooks, path } = self;
        match value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    visitor.visit_u64(u)
                } else if let Some(i) = n.as_i64() {
                    visitor.visit_i64(i)
                } else if let Some(f) = n.as_f64() {
                    visitor.visit_f64(f)
                } else {
                    Err(de::Error::custom(format!("unrepresentable number {n}")))
                }
            }
            Value::String(s) => visitor.visit_string(s),
            Value::Array(items) => {
                let len = items.len();
                let mut seq = SeqDecoder {
                    iter: items.into_iter().enumerate(),
                    hooks,
                    path,
                };
                let out = visitor.visit_seq(&mut seq)?;
                if seq.iter.len() == 0 {
                    Ok(out)
                } else {
                    Err(de::Error::invalid_length(len, &"fewer elements in sequence"))
                }
            }
            Value::Object(map) => visitor.visit_map(MapDecoder {
                iter: map.into_iter(),
                pending: None,
                hooks,
                path,
            }),
        }
    }
}

macro_rules! hooked_scalar {
    ($($method:ident => $kind:expr),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
                self.hooked($kind)?.visit(visitor)
            }
        )*
    };
}

impl<'de, 'h> de::Deserializer<'de> for Decoder<'h> {
    type Error = DecodeError;

    hooked_scalar! {
        deserialize_any => TargetKind::Any,
        deserialize_bool => TargetKind::Bool,
        deserialize_i8 => TargetKind::Int,
        deserialize_i16 => TargetKind::Int,
        deserialize_i32 => TargetKind::Int,
        deserialize_i64 => TargetKind::Int,
        deserialize_u8 => TargetKind::Uint,
        deserialize_u16 => TargetKind::Uint,
        deserialize_u32 => TargetKind::Uint,
        deserialize_u64 => TargetKind::Uint,
        deserialize_f32 => TargetKind::Float,
        deserialize_f64 => TargetKind::Float,
        deserialize_char => TargetKind::Char,
        deserialize_str => TargetKind::String,
        deserialize_string => TargetKind::String,
        deserialize_bytes => TargetKind::Bytes,
        deserialize_byte_buf => TargetKind::Bytes,
        deserialize_unit => TargetKind::Unit,
        deserialize_identifier => TargetKind::Identifier,
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        let decoder = self.hooked(TargetKind::Option)?;
        match decoder.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(decoder),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.hooked(TargetKind::Unit)?.visit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_newtype_struct(self.hooked(TargetKind::Newtype(name))?)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.hooked(TargetKind::Sequence)?
            .null_as(Value::Array(Vec::new()))
            .visit(visitor)
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.hooked(TargetKind::Sequence)?.visit(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.hooked(TargetKind::Sequence)?.visit(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        self.hooked(TargetKind::Map)?
            .null_as(Value::Object(Map::new()))
            .visit(visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        self.hooked(TargetKind::Struct { name, fields })?
            .null_as(Value::Object(Map::new()))
            .visit(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        let Decoder { value, hooks, path } = self.hooked(TargetKind::Enum(name))?;
        match value {
            Value::String(variant) => visitor.visit_enum(variant.into_deserializer()),
            Value::Object(map) if map.len() == 1 => {
                let mut entries = map.into_iter();
                let (variant, value) = entries
                    .next()
                    .ok_or_else(|| <DecodeError as de::Error>::custom("empty enum map"))?;
                let path = join(&path, &variant);
                visitor.visit_enum(EnumDecoder {
                    variant,
                    value,
                    hooks,
                    path,
                })
            }
            other => Err(de::Error::invalid_type(
                unexpected(&other),
                &"a string or a single-key map",
            )),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_unit()
    }
}

fn unexpected(value: &Value) -> de::Unexpected<'_> {
    match value {
        Value::Null => de::Unexpected::Unit,
        Value::Bool(b) => de::Unexpected::Bool(*b),
        Value::Number(_) => de::Unexpected::Other("number"),
        Value::String(s) => de::Unexpected::Str(s),
        Value::Array(_) => de::Unexpected::Seq,
        Value::Object(_) => de::Unexpected::Map,
    }
}

struct SeqDecoder<'h> {
    iter: std::iter::Enumerate<std::vec::IntoIter<Value>>,
    hooks: &'h HookChain,
    path: String,
}

impl<'de, 'h> SeqAccess<'de> for SeqDecoder<'h> {
    type Error = DecodeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, DecodeError> {
        match self.iter.next() {
            Some((index, value)) => {
                let path = format!("{}[{index}]", self.path);
                seed.deserialize(Decoder::new(value, self.hooks, path.clone()))
                    .map(Some)
                    .map_err(|e| e.at(&path))
            }
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapDecoder<'h> {
    iter: serde_json::map::IntoIter,
    pending: Option<(String, Value)>,
    hooks: &'h HookChain,
    path: String,
}

impl<'de, 'h> MapAccess<'de> for MapDecoder<'h> {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, DecodeError> {
        let Some((key, value)) = self.iter.next() else {
            return Ok(None);
        };
        let path = join(&self.path, &key);
        // Keys go through the hooks too, so "8080" can key a HashMap<u16, _>.
        let decoded = seed
            .deserialize(Decoder::new(
                Value::String(key.clone()),
                self.hooks,
                path.clone(),
            ))
            .map_err(|e| e.at(&path))?;
        self.pending = Some((key, value));
        Ok(Some(decoded))
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, DecodeError> {
        let (key, value) = self
            .pending
            .take()
            .ok_or_else(|| <DecodeError as de::Error>::custom("value requested before key"))?;
        let path = join(&self.path, &key);
        seed.deserialize(Decoder::new(value, self.hooks, path.clone()))
            .map_err(|e| e.at(&path))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len() + usize::from(self.pending.is_some()))
    }
}

struct EnumDecoder<'h> {
    variant: String,
    value: Value,
    hooks: &'h HookChain,
    path: String,
}

impl<'de, 'h> EnumAccess<'de> for EnumDecoder<'h> {
    type Error = DecodeError;
    type Variant = Decoder<'h>;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Decoder<'h>), DecodeError> {
        let name: de::value::StringDeserializer<DecodeError> = self.variant.into_deserializer();
        let variant = seed.deserialize(name)?;
        Ok((variant, Decoder::new(self.value, self.hooks, self.path)))
    }
}

impl<'de, 'h> VariantAccess<'de> for Decoder<'h> {
    type Error = DecodeError;

    fn unit_variant(self) -> Result<(), DecodeError> {
        match self.value {
            Value::Null => Ok(()),
            other => Err(de::Error::invalid_type(unexpected(&other), &"unit variant")),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, DecodeError> {
        let path = self.path.clone();
        seed.deserialize(self).map_err(|e| e.at(&path))
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        de::Deserializer::deserialize_tuple(self, len, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        de::Deserializer::deserialize_struct(self, "", fields, visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::super::decode;
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "lowercase")]
    enum Level {
        Debug,
        Info,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    enum Output {
        File { path: String },
        Socket(u16),
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Nested {
        level: Level,
        output: Output,
        #[serde(default)]
        tags: Option<Vec<String>>,
        ports: BTreeMap<u16, String>,
        extra: Value,
    }

    #[test]
    fn test_enums_options_and_maps() {
        let value = json!({
            "level": "info",
            "output": {"File": {"path": "/tmp/x"}},
            "tags": null,
            "ports": {"8080": "http"},
            "extra": {"anything": [1, "two"]}
        });
        let decoded: Nested = decode(value, &HookChain::defaults()).unwrap();
        assert_eq!(decoded.level, Level::Info);
        assert_eq!(
            decoded.output,
            Output::File {
                path: "/tmp/x".into()
            }
        );
        assert_eq!(decoded.tags, None);
        assert_eq!(decoded.ports.get(&8080).map(String::as_str), Some("http"));
        assert_eq!(decoded.extra, json!({"anything": [1, "two"]}));
    }

    #[test]
    fn test_newtype_variant_goes_through_hooks() {
        let decoded: Output = decode(json!({"Socket": "9000"}), &HookChain::defaults()).unwrap();
        assert_eq!(decoded, Output::Socket(9000));
    }

    #[test]
    fn test_null_reads_as_empty_list() {
        #[derive(Debug, Deserialize)]
        struct Routes {
            routes: Vec<String>,
        }
        let decoded: Routes = decode(json!({"routes": null}), &HookChain::defaults()).unwrap();
        assert!(decoded.routes.is_empty());
    }

    #[test]
    fn test_missing_field_reports_parent_path() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Inner {
            port: u16,
        }
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Outer {
            webserver: Inner,
        }
        let err = decode::<Outer>(json!({"webserver": {}}), &HookChain::defaults()).unwrap_err();
        assert_eq!(err.path(), "webserver");
        assert!(err.message().contains("missing field `port`"));
    }

    #[test]
    fn test_sequence_index_in_path() {
        let err = decode::<Vec<u8>>(json!([1, "x"]), &HookChain::defaults()).unwrap_err();
        assert_eq!(err.path(), "[1]");
    }

    #[test]
    fn test_out_of_range_is_error() {
        let err = decode::<u8>(json!(300), &HookChain::defaults()).unwrap_err();
        assert!(err.to_string().contains("300"));
    }

    #[test]
    fn test_leftover_tuple_elements_rejected() {
        assert!(decode::<(u8, u8)>(json!([1, 2, 3]), &HookChain::defaults()).is_err());
    }
}
