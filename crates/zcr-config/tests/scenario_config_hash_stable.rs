//! Config hash stability.
//!
//! GREEN when:
//! - identical inputs hash identically
//! - key order inside YAML does not change the hash
//! - different values change the hash
//! - overlays take effect and hash deterministically

use zcr_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
source:
  selected: "osc#0"
  lookback: 256
signal:
  direction: both
  min_periods_between_triggers: 3
router:
  endpoint_order: ["atm", "tickhunter"]
"#;

const BASE_YAML_REORDERED: &str = r#"
router:
  endpoint_order: ["atm", "tickhunter"]
signal:
  min_periods_between_triggers: 3
  direction: both
source:
  lookback: 256
  selected: "osc#0"
"#;

const OVERLAY_YAML: &str = r#"
signal:
  direction: longs_only
source:
  lookback: 64
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let original = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let reordered = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(
        original.config_hash, reordered.config_hash,
        "reordering keys in YAML must not change the hash"
    );
}

#[test]
fn array_order_is_significant() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[
        BASE_YAML,
        "router:\n  endpoint_order: [\"tickhunter\", \"atm\"]\n",
    ])
    .unwrap();
    assert_ne!(a.config_hash, b.config_hash);
}

#[test]
fn merged_layers_produce_stable_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);

    let direction = a
        .config_json
        .pointer("/signal/direction")
        .and_then(|v| v.as_str())
        .unwrap();
    assert_eq!(direction, "longs_only");

    let selected = a
        .config_json
        .pointer("/source/selected")
        .and_then(|v| v.as_str())
        .unwrap();
    assert_eq!(selected, "osc#0", "untouched base keys survive the overlay");
}

#[test]
fn hash_is_64_hex_chars() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(loaded.config_hash.len(), 64);
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}
