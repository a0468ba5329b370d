//! SampleReader: resolves the best known current value of the selected source.
//!
//! Preference order for one read:
//! 1. the latest sample, if its timestamp is exactly the period start (`Aligned`)
//! 2. the latest sample, if it lies inside the current period, is not in the
//!    future and is not older than the last sample already accepted (`Live`)
//! 3. a bounded backward scan over recent samples for the newest finite one
//!    that is still fresh enough for this period (`HistoricalScan`)
//! 4. otherwise no value
//!
//! # Invariants
//! - A latest sample that predates the current period is never reused: the
//!   read reports `NoValueYet` instead of carrying the previous period over.
//! - Accepted timestamps never go backwards for a given source.
//! - A read never blocks and never errors; failures are notes.

use serde::{Deserialize, Serialize};

use zcr_schemas::{PeriodContext, Sample, SourceHandle};

use crate::SourceRegistry;

/// Default backward scan window, in samples.
pub const DEFAULT_LOOKBACK: usize = 256;
/// Default tolerance for samples stamped slightly ahead of the processing instant.
pub const DEFAULT_LIVE_SKEW_MS: i64 = 500;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Maximum number of samples examined by the historical scan.
    pub lookback: usize,
    /// How far before the period start a scanned sample may be and still count
    /// as fresh. Zero means "must belong to the current period".
    pub stale_tolerance_ms: i64,
    /// How far after `now` a sample may be stamped before it counts as future.
    pub live_skew_ms: i64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            lookback: DEFAULT_LOOKBACK,
            stale_tolerance_ms: 0,
            live_skew_ms: DEFAULT_LIVE_SKEW_MS,
        }
    }
}

/// Why a read produced (or failed to produce) a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadNote {
    Aligned,
    Live,
    HistoricalScan,
    /// The latest sample belongs to an earlier period.
    NoValueYet,
    /// The latest sample is older than one already accepted.
    Superseded,
    /// The latest sample is stamped beyond `now + live_skew`.
    FutureSample,
    /// The registry returned nothing for the handle.
    SourceMissing,
    /// Nothing usable within the lookback window.
    Exhausted,
}

impl ReadNote {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadNote::Aligned => "aligned",
            ReadNote::Live => "live",
            ReadNote::HistoricalScan => "historical_scan",
            ReadNote::NoValueYet => "no_value_yet",
            ReadNote::Superseded => "superseded",
            ReadNote::FutureSample => "future_sample",
            ReadNote::SourceMissing => "source_missing",
            ReadNote::Exhausted => "exhausted",
        }
    }
}

/// Outcome of one read.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Reading {
    pub value: Option<f64>,
    pub ts_ms: Option<i64>,
    pub note: ReadNote,
}

impl Reading {
    fn accepted(sample: Sample, note: ReadNote) -> Self {
        Self {
            value: Some(sample.value),
            ts_ms: Some(sample.ts_ms),
            note,
        }
    }

    pub fn invalid(note: ReadNote) -> Self {
        Self {
            value: None,
            ts_ms: None,
            note,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Clone, Debug, Default)]
pub struct SampleReader {
    cfg: ReaderConfig,
    last_accepted_ts: Option<i64>,
}

impl SampleReader {
    pub fn new(cfg: ReaderConfig) -> Self {
        Self {
            cfg,
            last_accepted_ts: None,
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.cfg
    }

    /// Forget acceptance history. Call when the selected source changes.
    pub fn reset(&mut self) {
        self.last_accepted_ts = None;
    }

    pub fn read(
        &mut self,
        registry: &dyn SourceRegistry,
        handle: &SourceHandle,
        ctx: &PeriodContext,
    ) -> Reading {
        let fresh_floor = ctx.period_start_ms - self.cfg.stale_tolerance_ms.max(0);
        let future_limit = ctx.now_ms + self.cfg.live_skew_ms.max(0);

        let mut miss = ReadNote::Exhausted;
        match registry.read_latest(handle, ctx) {
            Some(s) if s.is_finite() => {
                if s.ts_ms < fresh_floor {
                    return Reading::invalid(ReadNote::NoValueYet);
                }
                if s.ts_ms > future_limit {
                    miss = ReadNote::FutureSample;
                } else if self.superseded(s.ts_ms) {
                    miss = ReadNote::Superseded;
                } else {
                    let note = if s.ts_ms == ctx.period_start_ms {
                        ReadNote::Aligned
                    } else {
                        ReadNote::Live
                    };
                    return self.accept(s, note);
                }
            }
            Some(_) => {}
            None => miss = ReadNote::SourceMissing,
        }

        let scanned = registry
            .read_recent(handle, self.cfg.lookback)
            .into_iter()
            .take(self.cfg.lookback)
            .find(|s| {
                s.is_finite()
                    && s.ts_ms >= fresh_floor
                    && s.ts_ms <= future_limit
                    && !self.superseded(s.ts_ms)
            });

        match scanned {
            Some(s) => self.accept(s, ReadNote::HistoricalScan),
            None => Reading::invalid(miss),
        }
    }

    fn superseded(&self, ts_ms: i64) -> bool {
        matches!(self.last_accepted_ts, Some(last) if ts_ms < last)
    }

    fn accept(&mut self, sample: Sample, note: ReadNote) -> Reading {
        self.last_accepted_ts = Some(sample.ts_ms);
        Reading::accepted(sample, note)
    }
}
