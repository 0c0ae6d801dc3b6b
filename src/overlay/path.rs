//! Overlay path grammar and patch forging.
//!
//! Paths are dotted segments, outermost first. A plain segment addresses a
//! mapping key. A selector segment `[name=value]` addresses the element of a
//! list of mappings whose `name` field equals `value`:
//!
//! ```text
//! policy.rules.[name=replace-subject].match.header
//! ```
//!
//! Forging walks a path right to left, wrapping a value one level deeper at
//! each step, and yields a patch rooted at the document root.

use crate::merge::MERGE_KEY;
use serde_json::{Map, Value};
use std::fmt;

/// One parsed path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Mapping key.
    Key(String),
    /// `[name=value]` list element selector.
    Select(String),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{k}"),
            Segment::Select(v) => write!(f, "[{MERGE_KEY}={v}]"),
        }
    }
}

/// Grammar or forging failure, without overlay context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    EmptySegment(String),
    SelectorKey(String),
    SelectorSyntax(String),
    SelectorOnNonMap(String),
    NonMapRoot(String),
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::EmptySegment(path) => write!(f, "empty segment in path {path:?}"),
            PathError::SelectorKey(seg) => {
                write!(f, "[] operator {seg:?} can only be used against {MERGE_KEY} field")
            }
            PathError::SelectorSyntax(seg) => {
                write!(f, "[] operator {seg:?} must have the form [{MERGE_KEY}=value]")
            }
            PathError::SelectorOnNonMap(seg) => {
                write!(f, "selector requires map accumulator at {seg:?}")
            }
            PathError::NonMapRoot(path) => {
                write!(f, "path {path:?} does not forge a map at the document root")
            }
        }
    }
}

impl std::error::Error for PathError {}

/// Parse a dotted path into segments.
pub fn parse_path(path: &str) -> Result<Vec<Segment>, PathError> {
    path.split('.').map(|raw| parse_segment(path, raw)).collect()
}

fn parse_segment(path: &str, raw: &str) -> Result<Segment, PathError> {
    if raw.is_empty() {
        return Err(PathError::EmptySegment(path.to_string()));
    }
    if !raw.starts_with('[') {
        return Ok(Segment::Key(raw.to_string()));
    }
    let inner = raw
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| PathError::SelectorSyntax(raw.to_string()))?;
    let (key, value) = inner
        .split_once('=')
        .ok_or_else(|| PathError::SelectorSyntax(raw.to_string()))?;
    if key != MERGE_KEY {
        return Err(PathError::SelectorKey(raw.to_string()));
    }
    Ok(Segment::Select(value.to_string()))
}

/// Wrap `value` under `segments`, innermost segment first.
///
/// Returns the patch mapping rooted at the document root.
pub fn forge(segments: &[Segment], value: Value) -> Result<Map<String, Value>, PathError> {
    let mut forged = value;
    for segment in segments.iter().rev() {
        forged = match segment {
            Segment::Key(key) => {
                let mut map = Map::new();
                map.insert(key.clone(), forged);
                Value::Object(map)
            }
            Segment::Select(selected) => match forged {
                Value::Object(mut map) => {
                    map.insert(MERGE_KEY.to_string(), Value::String(selected.clone()));
                    Value::Array(vec![Value::Object(map)])
                }
                _ => return Err(PathError::SelectorOnNonMap(segment.to_string())),
            },
        };
    }
    match forged {
        Value::Object(map) => Ok(map),
        _ => Err(PathError::NonMapRoot(
            segments
                .iter()
                .map(Segment::to_string)
                .collect::<Vec<_>>()
                .join("."),
        )),
    }
}
