use zcr_schemas::{Direction, Sign};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cross {
    Up,
    Down,
}

impl Cross {
    pub fn direction(self) -> Direction {
        match self {
            Cross::Up => Direction::Long,
            Cross::Down => Direction::Short,
        }
    }
}

/// Sign transition through zero from `prior` to `current`.
///
/// Leaving zero counts: `0 -> +1` is an up cross, `0 -> -1` a down cross.
/// Landing on zero never does.
pub fn detect_cross(prior: Sign, current: Sign) -> Option<Cross> {
    match (prior, current) {
        (Sign::Negative | Sign::Zero, Sign::Positive) => Some(Cross::Up),
        (Sign::Positive | Sign::Zero, Sign::Negative) => Some(Cross::Down),
        _ => None,
    }
}
