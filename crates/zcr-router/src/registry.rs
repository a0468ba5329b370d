//! Endpoint Registry: the directory of command destinations.
//!
//! # Purpose
//! The hosting application owns one `EndpointRegistry` and hands it to the
//! router by reference. Destinations join with [`EndpointRegistry::register`]
//! at construction and leave with [`EndpointRegistry::unregister`] at teardown;
//! there is no process-wide directory.
//!
//! # Determinism
//! Insertion order is preserved in `list()` output and breaks priority ties in
//! the router's fallback order. Names are compared case-sensitively.

use std::sync::Arc;

use crate::Endpoint;

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// A registered destination.
#[derive(Clone)]
pub struct EndpointDescriptor {
    /// Unique name used as the registry key.
    pub name: String,
    /// Lower value is preferred when no explicit order is configured.
    pub priority: u32,
    pub endpoint: Arc<dyn Endpoint>,
}

impl std::fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointRegistryError {
    /// An endpoint with the given name is already registered.
    DuplicateName { name: String },
    /// No endpoint with the given name is registered.
    UnknownEndpoint { name: String },
    /// The endpoint name is empty or contains only whitespace.
    EmptyName,
}

impl std::fmt::Display for EndpointRegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateName { name } => {
                write!(f, "endpoint '{name}' is already registered")
            }
            Self::UnknownEndpoint { name } => {
                write!(f, "no endpoint named '{name}' is registered")
            }
            Self::EmptyName => write!(f, "endpoint name must not be empty"),
        }
    }
}

impl std::error::Error for EndpointRegistryError {}

// ---------------------------------------------------------------------------
// EndpointRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct EndpointRegistry {
    /// Entries in insertion order.
    entries: Vec<EndpointDescriptor>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// # Errors
    /// - [`EndpointRegistryError::EmptyName`] if `name` is empty/whitespace.
    /// - [`EndpointRegistryError::DuplicateName`] if `name` is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        priority: u32,
        endpoint: Arc<dyn Endpoint>,
    ) -> Result<(), EndpointRegistryError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EndpointRegistryError::EmptyName);
        }
        if self.contains(&name) {
            return Err(EndpointRegistryError::DuplicateName { name });
        }
        tracing::info!(endpoint = %name, priority, "endpoint registered");
        self.entries.push(EndpointDescriptor {
            name,
            priority,
            endpoint,
        });
        Ok(())
    }

    /// Remove an endpoint, returning its descriptor. Preserves the order of
    /// the remaining entries.
    ///
    /// # Errors
    /// [`EndpointRegistryError::UnknownEndpoint`] if the name is not found.
    pub fn unregister(&mut self, name: &str) -> Result<EndpointDescriptor, EndpointRegistryError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| EndpointRegistryError::UnknownEndpoint {
                name: name.to_string(),
            })?;
        tracing::info!(endpoint = %name, "endpoint unregistered");
        Ok(self.entries.remove(idx))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&EndpointDescriptor> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptors in insertion order.
    pub fn list(&self) -> &[EndpointDescriptor] {
        &self.entries
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
