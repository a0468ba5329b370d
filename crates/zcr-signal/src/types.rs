use serde::{Deserialize, Serialize};

use zcr_schemas::{Direction, EntryStyle};

pub const DEFAULT_MIN_PERIODS_BETWEEN_TRIGGERS: u64 = 3;
pub const DEFAULT_CONFIRMATION_TIMEOUT_PERIODS: u64 = 2;
pub const DEFAULT_CONFIRMATION_GRACE_PERIODS: u64 = 1;

/// Which entry directions may be sent. Closes are never filtered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionFilter {
    #[default]
    Both,
    LongsOnly,
    ShortsOnly,
}

impl DirectionFilter {
    pub fn allows(self, direction: Direction) -> bool {
        match self {
            DirectionFilter::Both => true,
            DirectionFilter::LongsOnly => direction == Direction::Long,
            DirectionFilter::ShortsOnly => direction == Direction::Short,
        }
    }
}

/// When the "first nonzero sign with no prior trigger" entry may fire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPolicy {
    /// Re-armed by every explicit [`crate::SignalStateMachine::reset`].
    #[default]
    OncePerReset,
    /// Fires at most once for the lifetime of the state machine.
    OncePerProcess,
    /// Only real crosses trigger entries.
    Disabled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub direction: DirectionFilter,
    /// Zero disables spacing.
    pub min_periods_between_triggers: u64,
    /// At most one command (entry or close) per period.
    pub fire_once_per_period: bool,
    pub confirmation_timeout_periods: u64,
    /// Periods after confirmation during which endpoint flatness is not trusted
    /// for a forced reset.
    pub confirmation_grace_periods: u64,
    pub bootstrap: BootstrapPolicy,
    pub entry_style: EntryStyle,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            direction: DirectionFilter::Both,
            min_periods_between_triggers: DEFAULT_MIN_PERIODS_BETWEEN_TRIGGERS,
            fire_once_per_period: true,
            confirmation_timeout_periods: DEFAULT_CONFIRMATION_TIMEOUT_PERIODS,
            confirmation_grace_periods: DEFAULT_CONFIRMATION_GRACE_PERIODS,
            bootstrap: BootstrapPolicy::OncePerReset,
            entry_style: EntryStyle::Drop,
        }
    }
}
