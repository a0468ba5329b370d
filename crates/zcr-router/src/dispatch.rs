//! Fire-and-forget delivery of endpoint commands.
//!
//! [`AsyncEndpoint`] wraps any [`Endpoint`] so that `send_entry` / `send_close`
//! only enqueue the command and return immediately; a tokio task drains the
//! queue and invokes the wrapped endpoint on the blocking pool, one command at
//! a time, in submission order. Existence and flatness probes are forwarded
//! synchronously.
//!
//! Acceptance reported to the router means "queued". Whether the endpoint
//! later refused the command is only logged; the relay learns the real
//! position state by polling flatness each period.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Endpoint, EntryCommand, Flatness};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointCommand {
    Entry(EntryCommand),
    Close { reason: String },
}

#[derive(Clone, Debug)]
pub struct DispatchedCommand {
    pub id: Uuid,
    pub command: EndpointCommand,
}

/// Totals returned by the worker once every sender is dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: u64,
    pub refused: u64,
}

pub struct AsyncEndpoint {
    name: String,
    inner: Arc<dyn Endpoint>,
    tx: mpsc::UnboundedSender<DispatchedCommand>,
}

impl AsyncEndpoint {
    /// Start the delivery worker on `handle` and return the wrapper plus the
    /// worker's join handle.
    pub fn spawn(
        name: impl Into<String>,
        inner: Arc<dyn Endpoint>,
        handle: &Handle,
    ) -> (Self, JoinHandle<DispatchReport>) {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = handle.spawn(deliver(name.clone(), Arc::clone(&inner), rx));
        (Self { name, inner, tx }, worker)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn enqueue(&self, command: EndpointCommand) -> bool {
        let id = Uuid::new_v4();
        match self.tx.send(DispatchedCommand { id, command }) {
            Ok(()) => {
                debug!(endpoint = %self.name, command_id = %id, "command queued");
                true
            }
            Err(_) => {
                warn!(endpoint = %self.name, command_id = %id, "dispatch worker gone; command dropped");
                false
            }
        }
    }
}

impl Endpoint for AsyncEndpoint {
    fn exists(&self) -> bool {
        !self.tx.is_closed() && self.inner.exists()
    }

    fn send_entry(&self, cmd: &EntryCommand) -> bool {
        self.enqueue(EndpointCommand::Entry(cmd.clone()))
    }

    fn send_close(&self, reason: &str) -> bool {
        self.enqueue(EndpointCommand::Close {
            reason: reason.to_string(),
        })
    }

    fn query_flatness(&self) -> Flatness {
        self.inner.query_flatness()
    }
}

async fn deliver(
    name: String,
    inner: Arc<dyn Endpoint>,
    mut rx: mpsc::UnboundedReceiver<DispatchedCommand>,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    while let Some(DispatchedCommand { id, command }) = rx.recv().await {
        let target = Arc::clone(&inner);
        let accepted = tokio::task::spawn_blocking(move || match &command {
            EndpointCommand::Entry(cmd) => target.send_entry(cmd),
            EndpointCommand::Close { reason } => target.send_close(reason),
        })
        .await
        .unwrap_or(false);

        if accepted {
            report.delivered += 1;
            debug!(endpoint = %name, command_id = %id, "command delivered");
        } else {
            report.refused += 1;
            warn!(endpoint = %name, command_id = %id, "endpoint refused dispatched command");
        }
    }
    report
}
