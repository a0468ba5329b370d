//! zcr-router
//!
//! Command side of the relay:
//! - `endpoint`: the [`Endpoint`] trait external destinations implement
//! - `registry`: [`EndpointRegistry`], the explicit endpoint directory owned by the host
//! - `router`: [`DestinationRouter`], ordered fallback, per-period rate limits,
//!   symmetric close through the endpoint that accepted the entry
//! - `dispatch`: [`AsyncEndpoint`], fire-and-forget delivery on a tokio task
//!
//! The router never propagates endpoint failures. A command that no endpoint
//! accepts is reported as not sent and the caller retries on a later period.

mod dispatch;
mod endpoint;
mod registry;
mod router;

pub use dispatch::*;
pub use endpoint::*;
pub use registry::*;
pub use router::*;
