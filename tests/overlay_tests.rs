//! Integration tests for overlay splicing against documents read from disk.

use overlay_config::document::RawDocument;
use overlay_config::env::{EnvironmentBinding, MapEnv};
use overlay_config::{ConfigError, Overlay, Stage};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const POLICY: &str = r#"
policy:
  rules:
    - name: a
      v: 1
      match:
        header: x-a
    - name: b
      v: 2
"#;

fn read_policy(dir: &Path) -> RawDocument {
    fs::write(dir.join("policy.yaml"), POLICY).unwrap();
    let doc = RawDocument::new(
        "policy",
        vec![dir.to_path_buf()],
        EnvironmentBinding::default(),
        Arc::new(MapEnv::new()),
    );
    doc.read().unwrap();
    doc
}

#[test]
fn test_selector_merge_touches_only_named_element() {
    let temp = TempDir::new().unwrap();
    let doc = read_policy(temp.path());
    fs::write(temp.path().join("patch.yaml"), "rule:\n  v: 9\n").unwrap();

    Overlay::new("patch.yaml", "rule", ["policy.rules.[name=a]"])
        .apply_to(&doc)
        .unwrap();

    assert_eq!(
        doc.get("policy.rules"),
        Some(json!([
            {"name": "a", "v": 9, "match": {"header": "x-a"}},
            {"name": "b", "v": 2}
        ]))
    );
}

#[test]
fn test_selector_then_key_reaches_inside_element() {
    let temp = TempDir::new().unwrap();
    let doc = read_policy(temp.path());
    fs::write(temp.path().join("match.yaml"), "extra:\n  header: x-test\n").unwrap();

    Overlay::new("match.yaml", "extra", ["policy.rules.[name=b].match"])
        .apply_to(&doc)
        .unwrap();

    let rules = doc.get("policy.rules").unwrap();
    assert_eq!(rules[1]["match"], json!({"header": "x-test"}));
    assert_eq!(rules[0]["match"], json!({"header": "x-a"}));
}

#[test]
fn test_unmatched_selector_appends() {
    let temp = TempDir::new().unwrap();
    let doc = read_policy(temp.path());
    fs::write(temp.path().join("new.yaml"), "rule:\n  v: 3\n").unwrap();

    Overlay::new("new.yaml", "rule", ["policy.rules.[name=c]"])
        .apply_to(&doc)
        .unwrap();

    let rules = doc.get("policy.rules").unwrap();
    assert_eq!(rules.as_array().map(Vec::len), Some(3));
    assert_eq!(rules[2], json!({"name": "c", "v": 3}));
}

#[test]
fn test_plain_overlay_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let doc = read_policy(temp.path());
    fs::write(temp.path().join("limits.yaml"), "limits:\n  rps: 10\n").unwrap();

    let overlay = Overlay::new("limits.yaml", "limits", ["policy.limits", "defaults"]);
    overlay.apply_to(&doc).unwrap();
    let once = doc.snapshot();
    overlay.apply_to(&doc).unwrap();
    assert_eq!(doc.snapshot(), once);
    assert_eq!(doc.get("defaults.rps"), Some(json!(10)));
}

#[test]
fn test_conflict_rolls_back_every_target() {
    let temp = TempDir::new().unwrap();
    let doc = read_policy(temp.path());
    let before = doc.snapshot();
    fs::write(temp.path().join("bad.yaml"), "x:\n  k: 1\n").unwrap();

    // First target merges fine, second tries to put a map into a list
    let err = Overlay::new("bad.yaml", "x", ["fresh", "policy.rules.[name=a].v"])
        .apply_to(&doc)
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Merge);
    match err {
        ConfigError::Merge { path, .. } => assert_eq!(path, "policy.rules.[name=a].v"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(doc.snapshot(), before);
}

#[test]
fn test_missing_from_segment_named() {
    let temp = TempDir::new().unwrap();
    let doc = read_policy(temp.path());
    let before = doc.snapshot();
    fs::write(temp.path().join("rules.yaml"), "does:\n  other: 1\n").unwrap();

    let err = Overlay::new("rules.yaml", "does.not.exist", ["policy"])
        .apply_to(&doc)
        .unwrap_err();
    match &err {
        ConfigError::OverlayResolution {
            filename, segment, ..
        } => {
            assert_eq!(filename, "rules.yaml");
            assert_eq!(segment, "not");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(doc.snapshot(), before);
}

#[test]
fn test_absolute_overlay_path() {
    let temp = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    let doc = read_policy(temp.path());
    let overlay_file = other.path().join("abs.json");
    fs::write(&overlay_file, r#"{"x": {"enabled": true}}"#).unwrap();

    Overlay::new(overlay_file.to_string_lossy(), "x", ["features"])
        .apply_to(&doc)
        .unwrap();
    assert_eq!(doc.get("features.enabled"), Some(json!(true)));
}

#[test]
fn test_overlays_declared_in_config() {
    let declared: Vec<Overlay> = serde_yaml::from_str(
        "- filename: rules.yaml\n  from: extra\n  to:\n    - policy.rules.[name=a].match\n",
    )
    .unwrap();
    assert_eq!(declared.len(), 1);
    assert_eq!(declared[0].from, "extra");
    assert_eq!(declared[0].to, vec!["policy.rules.[name=a].match"]);
    assert!(!declared[0].is_watching());
}
