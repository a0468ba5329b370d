//! Entry confirmation by polling endpoint flatness.
//!
//! # Invariants
//! - At most one [`PendingEntry`]; it exists only between an accepted entry and
//!   either confirmation, cancellation or a disarmed timeout.
//! - Confirmation is never awaited: the tracker only reacts to flatness values
//!   the caller polled.
//! - A timeout while disarmed clears the pending entry without asking for a
//!   cancel.

use serde::Serialize;

use zcr_schemas::{Direction, PeriodKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PendingEntry {
    pub direction: Direction,
    pub period_issued: PeriodKey,
    pub timeout_periods: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum ConfirmationEvent {
    /// Nothing pending.
    Idle,
    /// Endpoint holds the position; pending entry cleared.
    Confirmed,
    /// Still flat, timeout not reached.
    Waiting { elapsed: u64 },
    /// Still flat at timeout while armed; the caller must force a close and
    /// report it through [`EntryConfirmationTracker::cancel_completed`].
    CancelRequired,
    /// Timeout reached while disarmed; pending entry dropped, nothing sent.
    ClearedDisarmed,
}

#[derive(Clone, Debug)]
pub struct EntryConfirmationTracker {
    timeout_periods: u64,
    grace_periods: u64,
    pending: Option<PendingEntry>,
    confirmed_at: Option<PeriodKey>,
}

impl EntryConfirmationTracker {
    pub fn new(timeout_periods: u64, grace_periods: u64) -> Self {
        Self {
            timeout_periods,
            grace_periods,
            pending: None,
            confirmed_at: None,
        }
    }

    pub fn pending(&self) -> Option<&PendingEntry> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn confirmed_at(&self) -> Option<PeriodKey> {
        self.confirmed_at
    }

    /// Track a freshly accepted entry.
    pub fn begin(&mut self, direction: Direction, period: PeriodKey) {
        self.pending = Some(PendingEntry {
            direction,
            period_issued: period,
            timeout_periods: self.timeout_periods,
        });
        self.confirmed_at = None;
    }

    /// Per-period poll. Call once when a new period opens, with the endpoint's
    /// flatness resolved to a bool.
    pub fn on_period(&mut self, now: PeriodKey, flat: bool, armed: bool) -> ConfirmationEvent {
        let Some(p) = self.pending else {
            return ConfirmationEvent::Idle;
        };
        if now <= p.period_issued {
            return ConfirmationEvent::Waiting { elapsed: 0 };
        }
        if !flat {
            self.confirm(now);
            return ConfirmationEvent::Confirmed;
        }

        let elapsed = now.since(p.period_issued);
        if elapsed < p.timeout_periods {
            return ConfirmationEvent::Waiting { elapsed };
        }
        if armed {
            ConfirmationEvent::CancelRequired
        } else {
            self.pending = None;
            ConfirmationEvent::ClearedDisarmed
        }
    }

    /// Intra-period check: confirms early when the endpoint already reports a
    /// position. Never cancels.
    pub fn observe(&mut self, now: PeriodKey, flat: bool) -> bool {
        if self.pending.is_some() && !flat {
            self.confirm(now);
            return true;
        }
        false
    }

    /// The timeout cancel was accepted by an endpoint.
    pub fn cancel_completed(&mut self) {
        self.pending = None;
    }

    /// True when endpoint flatness may be trusted for a forced reset: either the
    /// last entry was never confirmed, or the grace window after confirmation
    /// has passed.
    pub fn settled(&self, now: PeriodKey) -> bool {
        match self.confirmed_at {
            None => true,
            Some(at) => now.since(at) > self.grace_periods,
        }
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.confirmed_at = None;
    }

    fn confirm(&mut self, now: PeriodKey) {
        self.pending = None;
        self.confirmed_at = Some(now);
    }
}
