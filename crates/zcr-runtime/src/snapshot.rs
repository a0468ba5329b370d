//! Point-in-time view of the relay for status output.

use serde::Serialize;

use zcr_schemas::{Direction, PeriodKey};
use zcr_signal::{BlockReason, PendingEntry, SignalState};
use zcr_source::ReadNote;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelaySnapshot {
    pub period: Option<PeriodKey>,
    pub state: SignalState,
    pub armed: bool,
    pub last_direction: Option<Direction>,
    /// Last candidate value the filter produced (confirmed or fallback).
    pub last_value: Option<f64>,
    pub last_note: Option<ReadNote>,
    pub selected_source: Option<String>,
    pub active_endpoint: Option<String>,
    pub pending_entry: Option<PendingEntry>,
    pub last_block: Option<BlockReason>,
    pub catalog_size: usize,
    pub catalog_failures: u32,
    pub dead_frames: u32,
}
