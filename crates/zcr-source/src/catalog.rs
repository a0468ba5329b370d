//! Source catalog with throttled rediscovery.
//!
//! The scanner itself never calls the registry. The caller asks [`CatalogScanner::due`],
//! performs `list_sources` wherever it likes (inline or on a blocking task) and
//! hands the result back to [`CatalogScanner::apply`].
//!
//! # Invariants
//! - Two scans are never closer than `min_scan_interval_ms`.
//! - Each consecutive empty or failed scan doubles the retry delay, capped at
//!   `base_backoff_ms * 2^max_backoff_pow`.
//! - After `max_retries` consecutive empty scans the scanner stops retrying on
//!   its own; only [`CatalogScanner::trigger_manual`] restarts it.
//! - A manual trigger or a scan that finds more sources than the previous one
//!   resets the backoff.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use zcr_schemas::SourceHandle;

use crate::RegistryError;

pub const DEFAULT_MIN_SCAN_INTERVAL_MS: u64 = 1_500;
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 1_500;
pub const DEFAULT_MAX_BACKOFF_POW: u32 = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 20;
/// Smallest delay ever scheduled after an empty scan.
pub const MIN_BACKOFF_BUMP_MS: u64 = 250;
/// Largest accepted `max_backoff_pow`.
pub const MAX_BACKOFF_POW_LIMIT: u32 = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub min_scan_interval_ms: u64,
    pub base_backoff_ms: u64,
    pub max_backoff_pow: u32,
    pub max_retries: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            min_scan_interval_ms: DEFAULT_MIN_SCAN_INTERVAL_MS,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_pow: DEFAULT_MAX_BACKOFF_POW,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_backoff_pow > MAX_BACKOFF_POW_LIMIT {
            bail!(
                "catalog.max_backoff_pow must be at most {MAX_BACKOFF_POW_LIMIT}, got {}",
                self.max_backoff_pow
            );
        }
        Ok(())
    }
}

/// What a finished scan did to the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "scan")]
pub enum ScanOutcome {
    Populated { count: usize, grew: bool },
    Empty { failures: u32, retry_at_ms: Option<i64> },
}

#[derive(Clone, Debug)]
pub struct CatalogScanner {
    cfg: CatalogConfig,
    handles: Vec<SourceHandle>,
    failures: u32,
    requested: bool,
    exhausted: bool,
    last_scan_ms: Option<i64>,
    next_allowed_ms: i64,
}

impl CatalogScanner {
    /// A fresh scanner has a scan pending so the first `due` call enumerates.
    pub fn new(cfg: CatalogConfig) -> Self {
        Self {
            cfg,
            handles: Vec::new(),
            failures: 0,
            requested: true,
            exhausted: false,
            last_scan_ms: None,
            next_allowed_ms: i64::MIN,
        }
    }

    pub fn handles(&self) -> &[SourceHandle] {
        &self.handles
    }

    pub fn find(&self, key: &str) -> Option<&SourceHandle> {
        self.handles.iter().find(|h| h.key() == key)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Ask for a rescan, subject to backoff and the minimum interval.
    pub fn request(&mut self) {
        if !self.exhausted {
            self.requested = true;
        }
    }

    /// Operator-initiated rescan: clears backoff and exhaustion.
    pub fn trigger_manual(&mut self) {
        self.failures = 0;
        self.exhausted = false;
        self.requested = true;
        self.next_allowed_ms = i64::MIN;
    }

    pub fn due(&self, now_ms: i64) -> bool {
        if !self.requested || self.exhausted || now_ms < self.next_allowed_ms {
            return false;
        }
        match self.last_scan_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.cfg.min_scan_interval_ms as i64,
            None => true,
        }
    }

    /// Mark a scan as started so overlapping requests do not launch a second one.
    pub fn begin(&mut self, now_ms: i64) {
        self.requested = false;
        self.last_scan_ms = Some(now_ms);
    }

    /// Fold a scan result into the catalog. Errors count as an empty result.
    pub fn apply(
        &mut self,
        now_ms: i64,
        result: Result<Vec<SourceHandle>, RegistryError>,
    ) -> ScanOutcome {
        self.last_scan_ms = Some(now_ms);

        let found = match result {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "source catalog scan failed; treating as empty");
                Vec::new()
            }
        };

        if found.is_empty() {
            self.handles.clear();
            return self.bump(now_ms);
        }

        let grew = found.len() > self.handles.len();
        if grew {
            self.failures = 0;
        }
        self.handles = found;
        self.requested = false;
        self.next_allowed_ms = now_ms.saturating_add(self.cfg.min_scan_interval_ms as i64);
        debug!(count = self.handles.len(), grew, "source catalog refreshed");

        ScanOutcome::Populated {
            count: self.handles.len(),
            grew,
        }
    }

    fn bump(&mut self, now_ms: i64) -> ScanOutcome {
        let pow = self
            .failures
            .min(self.cfg.max_backoff_pow)
            .min(MAX_BACKOFF_POW_LIMIT);
        self.failures = self.failures.saturating_add(1);

        if self.failures >= self.cfg.max_retries {
            self.exhausted = true;
            self.requested = false;
            warn!(
                failures = self.failures,
                "source catalog still empty; automatic rescans stopped until manual trigger"
            );
            return ScanOutcome::Empty {
                failures: self.failures,
                retry_at_ms: None,
            };
        }

        let delay = self
            .cfg
            .base_backoff_ms
            .saturating_mul(1u64.checked_shl(pow).unwrap_or(u64::MAX))
            .max(MIN_BACKOFF_BUMP_MS)
            .max(self.cfg.min_scan_interval_ms);
        self.next_allowed_ms = now_ms.saturating_add(i64::try_from(delay).unwrap_or(i64::MAX));
        self.requested = true;
        warn!(
            failures = self.failures,
            delay_ms = delay,
            "source catalog empty; backing off"
        );

        ScanOutcome::Empty {
            failures: self.failures,
            retry_at_ms: Some(self.next_allowed_ms),
        }
    }
}
