//! zcr-schemas
//!
//! Shared vocabulary for the relay crates. Everything here is plain data:
//! no IO, no clocks, no logging.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Values whose magnitude is at or below this are classified as zero.
pub const ZERO_EPSILON: f64 = 1e-10;

/// True when `v` is finite and within [`ZERO_EPSILON`] of zero.
pub fn approx_zero(v: f64) -> bool {
    v.is_finite() && v.abs() <= ZERO_EPSILON
}

// ---------------------------------------------------------------------------
// Periods
// ---------------------------------------------------------------------------

/// Host-supplied, monotonically increasing identifier of the current
/// processing period (for example a bar index). Opaque apart from ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey(pub u64);

impl PeriodKey {
    /// Number of periods elapsed since `earlier` (0 if `earlier` is not before `self`).
    pub fn since(self, earlier: PeriodKey) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Everything the core knows about "now", supplied by the host on every tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodContext {
    pub period: PeriodKey,
    /// Start of the current period, epoch milliseconds.
    pub period_start_ms: i64,
    /// Processing instant, epoch milliseconds.
    pub now_ms: i64,
    /// First period of a trading session.
    #[serde(default)]
    pub session_start: bool,
}

impl PeriodContext {
    pub fn new(period: PeriodKey, period_start_ms: i64, now_ms: i64) -> Self {
        Self {
            period,
            period_start_ms,
            now_ms,
            session_start: false,
        }
    }

    pub fn with_session_start(mut self, session_start: bool) -> Self {
        self.session_start = session_start;
        self
    }
}

// ---------------------------------------------------------------------------
// Sources and samples
// ---------------------------------------------------------------------------

/// A single scalar observation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub ts_ms: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(ts_ms: i64, value: f64) -> Self {
        Self { ts_ms, value }
    }

    pub fn is_finite(&self) -> bool {
        self.value.is_finite()
    }
}

/// Stable reference to one channel of a signal source. Owned by the source
/// registry; the relay only holds clones.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceHandle {
    pub source: String,
    pub channel: usize,
    /// Human-readable label shown by presentation layers.
    pub label: String,
}

impl SourceHandle {
    pub fn new(source: impl Into<String>, channel: usize, label: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            channel,
            label: label.into(),
        }
    }

    /// Opaque persistence key: `source#channel`.
    pub fn key(&self) -> String {
        format!("{}#{}", self.source, self.channel)
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.key())
    }
}

// ---------------------------------------------------------------------------
// Sign / direction
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Sign {
    Negative,
    #[default]
    Zero,
    Positive,
}

impl Sign {
    /// Classify a value relative to zero. Non-finite values are `Zero`.
    pub fn of(v: f64) -> Sign {
        if !v.is_finite() || approx_zero(v) {
            Sign::Zero
        } else if v > 0.0 {
            Sign::Positive
        } else {
            Sign::Negative
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            Sign::Negative => -1,
            Sign::Zero => 0,
            Sign::Positive => 1,
        }
    }

    pub fn is_zero(self) -> bool {
        self == Sign::Zero
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Sign::Positive => Some(Direction::Long),
            Sign::Negative => Some(Direction::Short),
            Sign::Zero => None,
        }
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.as_i8())
    }
}

/// Nonzero side of a trade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(self) -> Sign {
        match self {
            Direction::Long => Sign::Positive,
            Direction::Short => Sign::Negative,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// How the endpoint should work the entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStyle {
    Market,
    Pop,
    #[default]
    Drop,
}
