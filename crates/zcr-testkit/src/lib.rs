//! zcr-testkit
//!
//! Deterministic stand-ins for the relay's external collaborators plus the
//! CSV replay driver used by the CLI and the scenario tests:
//! - [`PaperEndpoint`]: in-memory endpoint with a command journal and a
//!   controllable position
//! - [`ScriptedSource`]: single-source registry whose current sample is set
//!   frame by frame
//! - [`load_samples_csv`] / [`run_replay`]: feed recorded frames through a relay
//!
//! No randomness, no network I/O.

mod paper_endpoint;
mod replay;
mod scripted_source;

pub use paper_endpoint::{PaperEndpoint, PaperEvent};
pub use replay::{frame_context, load_samples_csv, parse_timestamp_ms, run_replay, ReplayRow};
pub use scripted_source::ScriptedSource;
