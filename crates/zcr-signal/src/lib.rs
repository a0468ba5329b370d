//! zcr-signal
//!
//! Decision layer of the relay:
//! - [`SignalStateMachine`]: Flat / InTrade / WaitingFlat, cross and bootstrap
//!   triggers, spacing and once-per-period throttles, forced reset
//! - [`EntryConfirmationTracker`]: pending entries polled for endpoint
//!   confirmation, timeout cancellation
//! - [`ArmState`]: fail-closed global send toggle
//!
//! All logic is pure and deterministic. The state machine only decides; the
//! caller performs sends and reports the result back through the
//! `on_*_accepted` / `on_close_not_sent` transitions.

mod arm_state;
mod confirmation;
mod state_machine;
mod types;

pub use arm_state::*;
pub use confirmation::*;
pub use state_machine::*;
pub use types::*;
