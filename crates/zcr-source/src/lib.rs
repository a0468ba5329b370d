//! zcr-source
//!
//! Source side of the relay:
//! - `registry`: the external [`SourceRegistry`] boundary
//! - `reader`: [`SampleReader`], "best known current value" resolution
//! - `catalog`: [`CatalogScanner`], rediscovery throttled by exponential backoff
//! - `selection`: [`SelectionStore`], the persisted selected-source key
//!
//! Nothing here blocks on the registry longer than one call, and nothing here
//! is fatal: every failure degrades to "no value" or "empty catalog".

mod catalog;
mod reader;
mod registry;
mod selection;

pub use catalog::*;
pub use reader::*;
pub use registry::*;
pub use selection::*;
