//! zcr-filter
//!
//! Pure, deterministic signal conditioning:
//! - [`ReliabilityFilter`]: zero-debounce, spike quarantine, dead-frame self-heal
//! - [`TickBuffer`]: per-period window of confirmed samples and the prior-sign rule
//! - [`detect_cross`]: sign transitions through zero
//!
//! No IO and no clocks; the caller supplies period boundaries.

mod cross;
mod reliability;
mod tick_buffer;

pub use cross::*;
pub use reliability::*;
pub use tick_buffer::*;
