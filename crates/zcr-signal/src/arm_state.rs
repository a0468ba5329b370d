//! Global send toggle with fail-closed boot.
//!
//! # Invariants
//!
//! - **Boot is always disarmed.** A relay never resumes sending on restart,
//!   whatever it was doing before.
//! - **Explicit arm is the only escape.** [`ArmState::arm`] is the sole path to
//!   `Armed`.
//! - While disarmed no entry is sent and no timeout cancel is sent. Forced
//!   closes issued by the operator still go through.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisarmReason {
    /// Relay booted; nobody has armed it yet.
    BootDefault,
    /// Operator explicitly disarmed.
    ManualDisarm,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ArmState {
    Armed,
    Disarmed { reason: DisarmReason },
}

impl ArmState {
    pub fn boot() -> Self {
        ArmState::Disarmed {
            reason: DisarmReason::BootDefault,
        }
    }

    pub fn arm() -> Self {
        ArmState::Armed
    }

    pub fn manual_disarm() -> Self {
        ArmState::Disarmed {
            reason: DisarmReason::ManualDisarm,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, ArmState::Armed)
    }

    pub fn disarm_reason(&self) -> Option<&DisarmReason> {
        match self {
            ArmState::Armed => None,
            ArmState::Disarmed { reason } => Some(reason),
        }
    }
}

impl Default for ArmState {
    fn default() -> Self {
        Self::boot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_is_disarmed() {
        let st = ArmState::boot();
        assert!(!st.is_armed());
        assert_eq!(st.disarm_reason(), Some(&DisarmReason::BootDefault));
        assert_eq!(ArmState::default(), st);
    }

    #[test]
    fn arm_then_disarm() {
        assert!(ArmState::arm().is_armed());
        assert_eq!(
            ArmState::manual_disarm().disarm_reason(),
            Some(&DisarmReason::ManualDisarm)
        );
    }
}
