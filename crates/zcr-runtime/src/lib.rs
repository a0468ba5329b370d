//! zcr-runtime
//!
//! Wires the pure components into one relay:
//!
//! ```text
//! SourceRegistry → SampleReader → ReliabilityFilter → TickBuffer
//!                                                        │ prior / current sign
//!                                                        ▼
//!        EndpointRegistry ◄── DestinationRouter ◄── SignalStateMachine
//!                                   ▲                    ▲
//!                                   └── EntryConfirmationTracker
//! ```
//!
//! [`Relay::on_tick`] is the only driver. It is synchronous and never waits on
//! a catalog scan: a relay built inside a tokio runtime rescans on the
//! blocking pool and picks the result up on a later frame.

mod rediscovery;
mod relay;
mod snapshot;

pub use rediscovery::*;
pub use relay::*;
pub use snapshot::*;
