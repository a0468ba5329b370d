use serde::{Deserialize, Serialize};

use zcr_schemas::{Direction, EntryStyle};

/// Directional entry request handed to an endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCommand {
    pub direction: Direction,
    pub style: EntryStyle,
    pub reason: String,
}

impl EntryCommand {
    pub fn new(direction: Direction, style: EntryStyle, reason: impl Into<String>) -> Self {
        Self {
            direction,
            style,
            reason: reason.into(),
        }
    }
}

/// Endpoint-side position state as far as the endpoint can tell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flatness {
    Flat,
    NotFlat,
    Unknown,
}

impl Flatness {
    /// Collapse `Unknown` onto the local latch: flat iff nothing is open locally.
    pub fn resolve(self, locally_open: bool) -> bool {
        match self {
            Flatness::Flat => true,
            Flatness::NotFlat => false,
            Flatness::Unknown => !locally_open,
        }
    }
}

/// A command sink that accepts entry/close commands.
///
/// Implementations are external collaborators (order tools, bridges, paper
/// books). `send_*` return whether the command was accepted for processing;
/// acceptance says nothing about fills. Methods take `&self` so descriptors
/// can be shared; implementations use interior mutability where needed.
pub trait Endpoint: Send + Sync {
    /// Cheap reachability probe.
    fn exists(&self) -> bool;

    fn send_entry(&self, cmd: &EntryCommand) -> bool;

    fn send_close(&self, reason: &str) -> bool;

    /// Endpoints that cannot report position state keep the default.
    fn query_flatness(&self) -> Flatness {
        Flatness::Unknown
    }
}
