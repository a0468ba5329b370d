//! zcr-config
//!
//! Layered YAML configuration for the relay.
//!
//! - Documents merge in order; later documents override earlier ones, arrays
//!   are replaced wholesale.
//! - The merged document is canonicalized (sorted keys, compact JSON) and
//!   hashed with SHA-256 so a run can be tied to its exact configuration.
//! - Leaf strings that look like literal credentials abort the load.
//! - [`report_unused_keys`] flags leaves the relay never reads.
//! - [`RelayConfig::from_loaded`] produces the typed view; every missing key
//!   takes its component default.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use zcr_filter::FilterConfig;
use zcr_router::RouterConfig;
use zcr_signal::SignalConfig;
use zcr_source::{CatalogConfig, ReaderConfig};

/// Known secret-like prefixes. A leaf string starting with one of these
/// aborts the load with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
];

// ---------------------------------------------------------------------------
// Typed relay configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    /// Source key (`source#channel`) to select at boot. Overrides the persisted selection.
    pub selected: Option<String>,
    /// File remembering the last selected source across restarts.
    pub selection_file: Option<PathBuf>,
    #[serde(flatten)]
    pub reader: ReaderConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub source: SourceSection,
    pub filter: FilterConfig,
    pub signal: SignalConfig,
    pub router: RouterConfig,
    pub catalog: CatalogConfig,
}

impl RelayConfig {
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        let cfg: RelayConfig = serde_json::from_value(loaded.config_json.clone())
            .context("config does not match the relay schema")?;
        cfg.catalog.validate()?;
        Ok(cfg)
    }
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Consumed JSON-pointer prefixes used for this analysis (sorted, unique)
    pub consumed_prefixes: Vec<String>,
    /// Unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// JSON-pointer prefixes the relay reads. Must match [`RelayConfig`].
pub fn consumed_pointers() -> &'static [&'static str] {
    &[
        "/source/selected",
        "/source/selection_file",
        "/source/lookback",
        "/source/stale_tolerance_ms",
        "/source/live_skew_ms",
        "/filter/zero_confirm_frames",
        "/filter/zero_run_accept",
        "/filter/spike_multiplier",
        "/filter/max_dead_frames",
        "/signal/direction",
        "/signal/min_periods_between_triggers",
        "/signal/fire_once_per_period",
        "/signal/confirmation_timeout_periods",
        "/signal/confirmation_grace_periods",
        "/signal/bootstrap",
        "/signal/entry_style",
        "/router/endpoint_order",
        "/router/entry_once_per_period",
        "/router/close_once_per_period",
        "/catalog/min_scan_interval_ms",
        "/catalog/base_backoff_ms",
        "/catalog/max_backoff_pow",
        "/catalog/max_retries",
    ]
}

/// If `policy == Fail`, returns an error when unused keys exist.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = consumed_pointers()
        .iter()
        .map(|p| normalize_pointer(p))
        .collect();
    let consumed_prefixes: Vec<String> = consumed.into_iter().collect();

    let mut unused: Vec<String> = leaf_pointers(config_json)
        .into_iter()
        .filter(|lp| !consumed_prefixes.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let first: Vec<&String> = report.unused_leaf_pointers.iter().take(12).collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} config key(s) not read by the relay: {:?}",
            report.unused_leaf_pointers.len(),
            first
        );
    }

    Ok(report)
}

fn normalize_pointer(p: &str) -> String {
    let trimmed = p.trim().trim_end_matches('/');
    match trimmed {
        "" => "/".to_string(),
        t if t.starts_with('/') => t.to_string(),
        t => format!("/{t}"),
    }
}

/// "/a/b" consumes "/a/b" and "/a/b/c" but not "/a/bc"; "/" consumes everything.
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" || leaf == prefix {
        return true;
    }
    leaf.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// JSON pointers of every scalar leaf under `v`. A scalar root yields "/".
fn leaf_pointers(v: &Value) -> Vec<String> {
    fn walk(v: &Value, at: &mut String, out: &mut Vec<String>) {
        let mark = at.len();
        match v {
            Value::Object(map) => {
                for (k, child) in map {
                    at.push('/');
                    at.push_str(&k.replace('~', "~0").replace('/', "~1"));
                    walk(child, at, out);
                    at.truncate(mark);
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    at.push_str(&format!("/{i}"));
                    walk(child, at, out);
                    at.truncate(mark);
                }
            }
            _ if at.is_empty() => out.push("/".to_string()),
            _ => out.push(at.clone()),
        }
    }
    let mut out = Vec::new();
    walk(v, &mut String::new(), &mut out);
    out
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// A merged configuration plus the identity used to tie a run to it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("read config layer {p}")))
        .collect::<Result<Vec<String>>>()?;
    load_layered_yaml_from_strings(&docs.iter().map(String::as_str).collect::<Vec<_>>())
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());
    for (layer, raw) in yaml_docs.iter().enumerate() {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("config layer {layer} is not valid yaml"))?;
        let doc = serde_json::to_value(doc).with_context(|| format!("config layer {layer} has non-json values"))?;
        // An empty document parses as null; treat it as "no overrides".
        if !doc.is_null() {
            overlay(&mut merged, doc);
        }
    }

    reject_secret_literals(&merged)?;

    // serde_json's default map is ordered by key, so this is canonical.
    let canonical_json = serde_json::to_string(&merged).context("serialize merged config")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Convenience: load files and produce the typed view in one step.
pub fn load_relay_config(paths: &[&str]) -> Result<(LoadedConfig, RelayConfig)> {
    let loaded = if paths.is_empty() {
        load_layered_yaml_from_strings(&[])?
    } else {
        load_layered_yaml(paths)?
    };
    let cfg = RelayConfig::from_loaded(&loaded)?;
    Ok((loaded, cfg))
}

/// Objects merge key by key; anything else in `top` replaces `base`.
fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(base_map), Value::Object(top_map)) => {
            for (k, v) in top_map {
                match base_map.get_mut(&k) {
                    Some(slot) => overlay(slot, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (slot, other) => *slot = other,
    }
}

fn reject_secret_literals(v: &Value) -> Result<()> {
    let hit = leaf_pointers(v).into_iter().find(|ptr| {
        v.pointer(ptr)
            .and_then(Value::as_str)
            .is_some_and(looks_like_secret)
    });
    match hit {
        Some(ptr) => bail!("CONFIG_SECRET_DETECTED leaf={ptr} value=REDACTED"),
        None => Ok(()),
    }
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pointer_respects_segment_boundary() {
        assert!(is_prefix_pointer("/signal/bootstrap", "/signal/bootstrap"));
        assert!(is_prefix_pointer("/router/endpoint_order", "/router/endpoint_order/0"));
        assert!(!is_prefix_pointer("/signal/direction", "/signal/directionality"));
        assert!(is_prefix_pointer("/", "/anything"));
    }

    #[test]
    fn later_layer_wins_and_arrays_replace() {
        let base = "router:\n  endpoint_order: [a, b, c]\n  entry_once_per_period: true\n";
        let over = "router:\n  endpoint_order: [z]\n";
        let loaded = load_layered_yaml_from_strings(&[base, over]).unwrap();
        let cfg = RelayConfig::from_loaded(&loaded).unwrap();
        assert_eq!(cfg.router.endpoint_order, vec!["z".to_string()]);
        assert!(cfg.router.entry_once_per_period);
    }

    #[test]
    fn empty_document_is_no_override() {
        let loaded = load_layered_yaml_from_strings(&["filter:\n  max_dead_frames: 5\n", ""]).unwrap();
        let cfg = RelayConfig::from_loaded(&loaded).unwrap();
        assert_eq!(cfg.filter.max_dead_frames, 5);
    }
}
