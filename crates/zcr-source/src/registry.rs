//! Boundary to whatever hosts the signal sources.
//!
//! This module defines only the trait and its error type. Concrete registries
//! (scripted, CSV replay, host bindings) live with their callers.

use std::fmt;

use zcr_schemas::{PeriodContext, Sample, SourceHandle};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a [`SourceRegistry`] may return while enumerating sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The host is not ready to enumerate (still loading, detached, ...).
    Unavailable(String),
    /// Enumeration started but failed part way.
    Enumeration(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Unavailable(msg) => write!(f, "registry unavailable: {msg}"),
            RegistryError::Enumeration(msg) => write!(f, "source enumeration failed: {msg}"),
        }
    }
}

impl std::error::Error for RegistryError {}

// ---------------------------------------------------------------------------
// Registry trait
// ---------------------------------------------------------------------------

/// External collaborator that enumerates signal sources and serves samples.
///
/// Object-safe and `Send + Sync` so the runtime can hold an
/// `Arc<dyn SourceRegistry>` and run enumeration off the processing thread.
pub trait SourceRegistry: Send + Sync {
    /// Enumerate every source channel currently available.
    fn list_sources(&self) -> Result<Vec<SourceHandle>, RegistryError>;

    /// Latest sample for `handle` as seen at `ctx`, or `None` when the handle
    /// no longer resolves or has produced nothing yet.
    fn read_latest(&self, handle: &SourceHandle, ctx: &PeriodContext) -> Option<Sample>;

    /// Up to `max` recent samples for `handle`, newest first.
    ///
    /// Registries without history support return an empty `Vec`; the default
    /// does exactly that.
    fn read_recent(&self, handle: &SourceHandle, max: usize) -> Vec<Sample> {
        let _ = (handle, max);
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zcr_schemas::PeriodKey;

    struct OneShot;

    impl SourceRegistry for OneShot {
        fn list_sources(&self) -> Result<Vec<SourceHandle>, RegistryError> {
            Ok(vec![SourceHandle::new("osc", 0, "Osc")])
        }

        fn read_latest(&self, _handle: &SourceHandle, ctx: &PeriodContext) -> Option<Sample> {
            Some(Sample::new(ctx.period_start_ms, 1.0))
        }
    }

    #[test]
    fn read_recent_defaults_to_empty() {
        let reg: Box<dyn SourceRegistry> = Box::new(OneShot);
        let h = SourceHandle::new("osc", 0, "Osc");
        assert!(reg.read_recent(&h, 16).is_empty());
        let ctx = PeriodContext::new(PeriodKey(1), 60_000, 60_100);
        assert_eq!(reg.read_latest(&h, &ctx), Some(Sample::new(60_000, 1.0)));
    }

    #[test]
    fn registry_error_display() {
        let err = RegistryError::Unavailable("host loading".to_string());
        assert_eq!(err.to_string(), "registry unavailable: host loading");
    }
}
