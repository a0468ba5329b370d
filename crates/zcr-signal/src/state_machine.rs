//! Signal State Machine
//!
//! # Design
//!
//! [`SignalStateMachine::evaluate`] looks at one frame's [`Observation`] and
//! returns a [`Decision`]. It never sends anything. The caller routes the
//! command and reports the result through the transition methods, which
//! enforce legal transitions and return [`TransitionError`] otherwise.
//!
//! ```text
//!            entry accepted                    close not sent
//!   Flat ───────────────────────► InTrade ─────────────────────► WaitingFlat
//!    ▲                               │                                │
//!    │         close accepted        │        close accepted          │
//!    ├───────────────────────────────┘◄───────────────────────────────┘
//!    │
//!    └──── forced reset (endpoint flat, nothing pending, grace elapsed) ◄── any
//! ```
//!
//! # Invariants
//! - `state != Flat` implies `last_direction` is set.
//! - Bootstrap fires at most once per epoch; the epoch is closed by the first
//!   accepted entry and reopened only by [`SignalStateMachine::reset`] under
//!   [`BootstrapPolicy::OncePerReset`].
//! - Forced reset never re-arms bootstrap.

use serde::Serialize;
use tracing::{debug, info};

use zcr_filter::detect_cross;
use zcr_schemas::{Direction, PeriodKey, Sign};

use crate::{BootstrapPolicy, SignalConfig};

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalState {
    Flat,
    InTrade,
    /// A close is owed but no endpoint has accepted it yet.
    WaitingFlat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Cross,
    Bootstrap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    OppositeCross,
    /// Retrying a close that no endpoint accepted earlier.
    Retry,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::OppositeCross => "opposite cross",
            CloseReason::Retry => "close retry",
        }
    }
}

/// Why a trigger did not turn into an entry this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    NoSignalThisPeriod,
    NoEndpoint,
    Disarmed,
    DirectionFiltered,
    SpacingThrottle,
    OncePerPeriod,
}

/// Everything the state machine needs to know about one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Observation {
    pub period: PeriodKey,
    /// Sign of the previous confirmed sample (taken before recording this one).
    pub prior: Sign,
    /// Sign of this frame's candidate; `Zero` when the filter produced nothing.
    pub current: Sign,
    /// The tick buffer holds a confirmed sample for this period.
    pub confirmed_this_period: bool,
    pub endpoint_reachable: bool,
    pub armed: bool,
    /// Endpoint flatness with unknown already resolved against the local latch.
    pub endpoint_flat: bool,
    pub confirmation_pending: bool,
    /// See [`crate::EntryConfirmationTracker::settled`].
    pub confirmation_settled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Hold,
    /// Local state was forced to Flat; nothing to send.
    ForcedFlat,
    Enter {
        direction: Direction,
        kind: TriggerKind,
    },
    Close {
        reason: CloseReason,
    },
    Blocked(BlockReason),
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionError {
    pub from: SignalState,
    pub event: &'static str,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal signal transition: {:?} + {}", self.from, self.event)
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// SignalStateMachine
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct SignalStateMachine {
    cfg: SignalConfig,
    state: SignalState,
    last_direction: Option<Direction>,
    /// Period of the last accepted entry or close; drives spacing.
    last_trigger: Option<PeriodKey>,
    /// Period of the last accepted command of either kind.
    last_sent: Option<PeriodKey>,
    bootstrap_armed: bool,
}

impl SignalStateMachine {
    pub fn new(cfg: SignalConfig) -> Self {
        let bootstrap_armed = cfg.bootstrap != BootstrapPolicy::Disabled;
        Self {
            cfg,
            state: SignalState::Flat,
            last_direction: None,
            last_trigger: None,
            last_sent: None,
            bootstrap_armed,
        }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.cfg
    }

    pub fn state(&self) -> SignalState {
        self.state
    }

    pub fn last_direction(&self) -> Option<Direction> {
        self.last_direction
    }

    pub fn last_trigger(&self) -> Option<PeriodKey> {
        self.last_trigger
    }

    pub fn bootstrap_armed(&self) -> bool {
        self.bootstrap_armed
    }

    pub fn evaluate(&mut self, obs: &Observation) -> Decision {
        if self.state != SignalState::Flat
            && obs.endpoint_flat
            && !obs.confirmation_pending
            && obs.confirmation_settled
        {
            info!(from = ?self.state, period = %obs.period, "endpoint reports flat; forcing local state to flat");
            self.state = SignalState::Flat;
            self.last_direction = None;
            return Decision::ForcedFlat;
        }

        let cross = detect_cross(obs.prior, obs.current);

        match self.state {
            SignalState::WaitingFlat => Decision::Close {
                reason: CloseReason::Retry,
            },
            SignalState::InTrade => {
                let opposite = self.last_direction.map(Direction::opposite);
                match (cross, opposite) {
                    (Some(c), Some(opp)) if obs.confirmed_this_period && c.direction() == opp => {
                        Decision::Close {
                            reason: CloseReason::OppositeCross,
                        }
                    }
                    _ => Decision::Hold,
                }
            }
            SignalState::Flat => {
                let trigger = match cross {
                    Some(c) if obs.prior.is_zero() && self.bootstrap_armed => {
                        Some((c.direction(), TriggerKind::Bootstrap))
                    }
                    Some(c) => Some((c.direction(), TriggerKind::Cross)),
                    None if self.bootstrap_armed => obs
                        .current
                        .direction()
                        .map(|d| (d, TriggerKind::Bootstrap)),
                    None => None,
                };
                let Some((direction, kind)) = trigger else {
                    return Decision::Hold;
                };
                match self.entry_block(obs, direction) {
                    Some(reason) => {
                        debug!(?reason, %direction, ?kind, period = %obs.period, "entry blocked");
                        Decision::Blocked(reason)
                    }
                    None => Decision::Enter { direction, kind },
                }
            }
        }
    }

    fn entry_block(&self, obs: &Observation, direction: Direction) -> Option<BlockReason> {
        if !obs.confirmed_this_period {
            return Some(BlockReason::NoSignalThisPeriod);
        }
        if !obs.endpoint_reachable {
            return Some(BlockReason::NoEndpoint);
        }
        if !obs.armed {
            return Some(BlockReason::Disarmed);
        }
        if !self.cfg.direction.allows(direction) {
            return Some(BlockReason::DirectionFiltered);
        }
        let spacing_ok = match self.last_trigger {
            _ if self.cfg.min_periods_between_triggers == 0 => true,
            None => true,
            Some(last) => obs.period.since(last) >= self.cfg.min_periods_between_triggers,
        };
        if !spacing_ok {
            return Some(BlockReason::SpacingThrottle);
        }
        if self.cfg.fire_once_per_period && self.last_sent == Some(obs.period) {
            return Some(BlockReason::OncePerPeriod);
        }
        None
    }

    // -----------------------------------------------------------------------
    // Transitions reported by the caller
    // -----------------------------------------------------------------------

    pub fn on_entry_accepted(
        &mut self,
        direction: Direction,
        period: PeriodKey,
    ) -> Result<(), TransitionError> {
        if self.state != SignalState::Flat {
            return Err(TransitionError {
                from: self.state,
                event: "entry_accepted",
            });
        }
        self.state = SignalState::InTrade;
        self.last_direction = Some(direction);
        self.last_trigger = Some(period);
        self.last_sent = Some(period);
        self.bootstrap_armed = false;
        Ok(())
    }

    pub fn on_close_accepted(&mut self, period: PeriodKey) -> Result<(), TransitionError> {
        if self.state == SignalState::Flat {
            return Err(TransitionError {
                from: self.state,
                event: "close_accepted",
            });
        }
        self.state = SignalState::Flat;
        self.last_direction = None;
        self.last_trigger = Some(period);
        self.last_sent = Some(period);
        Ok(())
    }

    /// A required close found no taker (or was throttled).
    pub fn on_close_not_sent(&mut self) -> Result<(), TransitionError> {
        match self.state {
            SignalState::InTrade | SignalState::WaitingFlat => {
                self.state = SignalState::WaitingFlat;
                Ok(())
            }
            SignalState::Flat => Err(TransitionError {
                from: self.state,
                event: "close_not_sent",
            }),
        }
    }

    /// New trading session: spacing starts over.
    pub fn on_session_start(&mut self) {
        self.last_trigger = None;
    }

    /// Drop every tracker. Re-arms bootstrap under [`BootstrapPolicy::OncePerReset`].
    pub fn reset(&mut self) {
        self.state = SignalState::Flat;
        self.last_direction = None;
        self.last_trigger = None;
        self.last_sent = None;
        if self.cfg.bootstrap == BootstrapPolicy::OncePerReset {
            self.bootstrap_armed = true;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
