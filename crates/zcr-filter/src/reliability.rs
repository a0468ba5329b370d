//! Reliability filter between the sample reader and the tick buffer.
//!
//! Rules, applied to every frame:
//! - Zero-debounce: an approximately-zero value on a non-first frame is held
//!   until `zero_confirm_frames` consecutive frames agree, unless a run of
//!   `zero_run_accept` aligned zero periods has already established a flat regime.
//! - Spike quarantine: a value further than `spike_multiplier * |last_stable|`
//!   from a nonzero `last_stable` is rejected for this frame.
//! - Dead-frame self-heal: `max_dead_frames` consecutive frames without an
//!   accepted value request source rediscovery and reset the counters.
//! - Fallback to `last_stable` only when this is not the first frame of the
//!   period and the period already holds a confirmed sample.
//!
//! # Invariants
//! - [`ReliabilityFilter::on_period_change`] flushes the zero-debounce counter
//!   and the spike reference; nothing debounced carries across periods.
//! - Rejections are never errors; they surface as [`FilterVerdict::Hold`] or
//!   [`FilterVerdict::Fallback`].

use serde::{Deserialize, Serialize};

use zcr_schemas::approx_zero;
use zcr_source::{ReadNote, Reading};

pub const DEFAULT_ZERO_CONFIRM_FRAMES: u32 = 2;
/// Aligned zero periods after which zero is treated as a confirmed flat regime.
pub const DEFAULT_ZERO_RUN_ACCEPT: u32 = 3;
pub const DEFAULT_SPIKE_MULTIPLIER: f64 = 50.0;
pub const DEFAULT_MAX_DEAD_FRAMES: u32 = 3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub zero_confirm_frames: u32,
    pub zero_run_accept: u32,
    pub spike_multiplier: f64,
    pub max_dead_frames: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            zero_confirm_frames: DEFAULT_ZERO_CONFIRM_FRAMES,
            zero_run_accept: DEFAULT_ZERO_RUN_ACCEPT,
            spike_multiplier: DEFAULT_SPIKE_MULTIPLIER,
            max_dead_frames: DEFAULT_MAX_DEAD_FRAMES,
        }
    }
}

/// Where in the period the current frame sits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameInfo {
    pub first_frame_of_period: bool,
    /// The tick buffer already holds a confirmed sample for this period.
    pub confirmed_this_period: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    NoReading(ReadNote),
    ZeroDebounce { seen: u32, required: u32 },
    SpikeQuarantined { candidate: f64, last_stable: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterVerdict {
    /// Confirmed sample; record it.
    Accept(f64),
    /// Candidate rejected; use the last stable value for decisions but do not record it.
    Fallback { value: f64, reason: HoldReason },
    /// Candidate rejected and no fallback permitted.
    Hold(HoldReason),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterOutput {
    pub verdict: FilterVerdict,
    /// Dead-frame threshold reached this frame.
    pub rediscover: bool,
}

impl FilterOutput {
    pub fn confirmed(&self) -> Option<f64> {
        match self.verdict {
            FilterVerdict::Accept(v) => Some(v),
            _ => None,
        }
    }

    /// Value the decision logic should see this frame (confirmed or fallback).
    pub fn candidate(&self) -> Option<f64> {
        match self.verdict {
            FilterVerdict::Accept(v) | FilterVerdict::Fallback { value: v, .. } => Some(v),
            FilterVerdict::Hold(_) => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReliabilityFilter {
    cfg: FilterConfig,
    last_stable: Option<f64>,
    bad_zero_frames: u32,
    dead_frames: u32,
    zero_run: u32,
    zero_counted_this_period: bool,
}

impl ReliabilityFilter {
    pub fn new(cfg: FilterConfig) -> Self {
        Self {
            cfg,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.cfg
    }

    pub fn last_stable(&self) -> Option<f64> {
        self.last_stable
    }

    pub fn zero_run(&self) -> u32 {
        self.zero_run
    }

    pub fn dead_frames(&self) -> u32 {
        self.dead_frames
    }

    pub fn on_period_change(&mut self) {
        self.bad_zero_frames = 0;
        self.last_stable = None;
        self.zero_counted_this_period = false;
    }

    /// Full reset; also forgets the zero-run regime. Call on source change.
    pub fn reset(&mut self) {
        *self = Self::new(self.cfg.clone());
    }

    pub fn process(&mut self, reading: &Reading, frame: FrameInfo) -> FilterOutput {
        let Some(v) = reading.value else {
            return self.reject(HoldReason::NoReading(reading.note), frame);
        };

        if approx_zero(v) {
            if reading.note == ReadNote::Aligned && !self.zero_counted_this_period {
                self.zero_counted_this_period = true;
                self.zero_run = self.zero_run.saturating_add(1);
            }
            let flat_regime = self.zero_run >= self.cfg.zero_run_accept;
            if frame.first_frame_of_period {
                // A fresh-period zero counts as confirmed for the rest of the period.
                self.bad_zero_frames = self.cfg.zero_confirm_frames;
            } else if !flat_regime {
                self.bad_zero_frames = self.bad_zero_frames.saturating_add(1);
                if self.bad_zero_frames < self.cfg.zero_confirm_frames {
                    return self.reject(
                        HoldReason::ZeroDebounce {
                            seen: self.bad_zero_frames,
                            required: self.cfg.zero_confirm_frames,
                        },
                        frame,
                    );
                }
            }
        } else {
            self.bad_zero_frames = 0;
            if let Some(last) = self.last_stable {
                if !approx_zero(last) && (v - last).abs() > last.abs() * self.cfg.spike_multiplier {
                    return self.reject(
                        HoldReason::SpikeQuarantined {
                            candidate: v,
                            last_stable: last,
                        },
                        frame,
                    );
                }
            }
        }

        self.last_stable = Some(v);
        self.dead_frames = 0;
        if !approx_zero(v) {
            self.zero_run = 0;
        }
        FilterOutput {
            verdict: FilterVerdict::Accept(v),
            rediscover: false,
        }
    }

    fn reject(&mut self, reason: HoldReason, frame: FrameInfo) -> FilterOutput {
        self.dead_frames = self.dead_frames.saturating_add(1);
        let rediscover = self.cfg.max_dead_frames > 0 && self.dead_frames >= self.cfg.max_dead_frames;
        if rediscover {
            self.dead_frames = 0;
            self.bad_zero_frames = 0;
        }

        let fallback = match self.last_stable {
            Some(value) if !frame.first_frame_of_period && frame.confirmed_this_period => Some(value),
            _ => None,
        };

        let verdict = match fallback {
            Some(value) => FilterVerdict::Fallback { value, reason },
            None => FilterVerdict::Hold(reason),
        };
        tracing::debug!(?reason, ?verdict, rediscover, "reliability filter rejected frame");
        FilterOutput {
            verdict,
            rediscover,
        }
    }
}
