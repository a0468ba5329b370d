//! Per-period accumulation of confirmed samples.
//!
//! # Invariants
//! - Exactly one open window; it resets exactly once when the period key changes.
//! - An empty period does not clear `previous_period_final_sign`; directional
//!   memory survives gaps.
//! - [`TickBuffer::prior_sign`] must be taken before [`TickBuffer::record`] for
//!   the same observation, otherwise the candidate compares against itself.

use zcr_schemas::{PeriodKey, Sign};

#[derive(Clone, Debug, Default)]
pub struct TickBuffer {
    period: Option<PeriodKey>,
    count: u32,
    first: Option<(f64, Sign)>,
    last: Option<(f64, Sign)>,
    previous_period_final_sign: Sign,
}

impl TickBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the window for `period`. Returns true when this closed the previous
    /// window (or opened the very first one).
    pub fn begin_period(&mut self, period: PeriodKey) -> bool {
        if self.period == Some(period) {
            return false;
        }
        if let Some((_, sign)) = self.last {
            self.previous_period_final_sign = sign;
        }
        self.period = Some(period);
        self.count = 0;
        self.first = None;
        self.last = None;
        true
    }

    pub fn record(&mut self, value: f64) {
        let entry = (value, Sign::of(value));
        self.count = self.count.saturating_add(1);
        if self.first.is_none() {
            self.first = Some(entry);
        }
        self.last = Some(entry);
    }

    /// Sign to compare the next candidate against.
    pub fn prior_sign(&self) -> Sign {
        match self.last {
            Some((_, sign)) => sign,
            None => self.previous_period_final_sign,
        }
    }

    pub fn period(&self) -> Option<PeriodKey> {
        self.period
    }

    pub fn has_confirmed(&self) -> bool {
        self.count > 0
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn first_value(&self) -> Option<f64> {
        self.first.map(|(v, _)| v)
    }

    pub fn last_value(&self) -> Option<f64> {
        self.last.map(|(v, _)| v)
    }

    pub fn last_sign(&self) -> Sign {
        self.last.map(|(_, s)| s).unwrap_or_default()
    }

    pub fn previous_period_final_sign(&self) -> Sign {
        self.previous_period_final_sign
    }

    /// Drop everything, including directional memory.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_and_last_are_tracked_separately() {
        let mut b = TickBuffer::new();
        b.begin_period(PeriodKey(1));
        b.record(0.4);
        b.record(-0.2);
        b.record(-0.3);
        assert_eq!(b.count(), 3);
        assert_eq!(b.first_value(), Some(0.4));
        assert_eq!(b.last_value(), Some(-0.3));
        assert_eq!(b.last_sign(), Sign::Negative);
    }

    #[test]
    fn same_period_does_not_reset() {
        let mut b = TickBuffer::new();
        assert!(b.begin_period(PeriodKey(4)));
        b.record(1.0);
        assert!(!b.begin_period(PeriodKey(4)));
        assert_eq!(b.count(), 1);
    }

    #[test]
    fn prior_sign_is_previous_sample_within_period() {
        let mut b = TickBuffer::new();
        b.begin_period(PeriodKey(1));
        b.record(-1.0);
        assert_eq!(b.prior_sign(), Sign::Negative);
        b.record(2.0);
        assert_eq!(b.prior_sign(), Sign::Positive);
    }
}
