//! Destination Router: ordered fallback over registered endpoints.
//!
//! # Invariants
//! - Fallback order is deterministic: explicitly preferred endpoint, then the
//!   configured `endpoint_order`, then every other registered endpoint by
//!   ascending priority (insertion order breaks ties). No endpoint appears twice.
//! - The endpoint that accepted the entry is recorded as active and is tried
//!   first for the symmetric close.
//! - Entry and close each act at most once per period when their throttle is
//!   enabled. Any attempt (accepted or not) spends the period; `force` bypasses
//!   the close throttle.
//! - A close with no active endpoint is a no-op.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use zcr_schemas::PeriodKey;

use crate::{EndpointDescriptor, EndpointRegistry, EntryCommand, Flatness};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Preferred endpoint names, most preferred first. Unknown names are skipped.
    pub endpoint_order: Vec<String>,
    pub entry_once_per_period: bool,
    pub close_once_per_period: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            endpoint_order: Vec::new(),
            entry_once_per_period: true,
            close_once_per_period: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Entry,
    Close,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptFailure {
    /// Existence probe failed; the endpoint was skipped.
    Unreachable,
    /// The endpoint was invoked and refused the command.
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub endpoint: String,
    pub failure: AttemptFailure,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RouteOutcome {
    Accepted {
        endpoint: String,
        /// Endpoints tried and failed before the one that accepted.
        skipped: Vec<Attempt>,
    },
    Throttled {
        kind: OpKind,
    },
    NothingToClose,
    /// No endpoint accepted; retry on a later period.
    NotSent {
        attempts: Vec<Attempt>,
    },
}

impl RouteOutcome {
    pub fn accepted_by(&self) -> Option<&str> {
        match self {
            RouteOutcome::Accepted { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted_by().is_some()
    }
}

#[derive(Clone, Debug, Default)]
pub struct DestinationRouter {
    cfg: RouterConfig,
    active: Option<String>,
    last_entry: Option<PeriodKey>,
    last_close: Option<PeriodKey>,
}

impl DestinationRouter {
    pub fn new(cfg: RouterConfig) -> Self {
        Self {
            cfg,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.cfg
    }

    /// Endpoint that accepted the open entry, if any.
    pub fn active_endpoint(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Clear the active endpoint and both throttle markers.
    pub fn reset(&mut self) {
        self.active = None;
        self.last_entry = None;
        self.last_close = None;
    }

    pub fn entry_allowed(&self, period: PeriodKey) -> bool {
        !(self.cfg.entry_once_per_period && self.last_entry == Some(period))
    }

    pub fn close_allowed(&self, period: PeriodKey) -> bool {
        !(self.cfg.close_once_per_period && self.last_close == Some(period))
    }

    /// Full attempt order, optionally led by `preferred`.
    pub fn fallback_order<'r>(
        &self,
        registry: &'r EndpointRegistry,
        preferred: Option<&str>,
    ) -> Vec<&'r EndpointDescriptor> {
        let mut out: Vec<&EndpointDescriptor> = Vec::with_capacity(registry.len());

        if let Some(d) = preferred.and_then(|name| registry.get(name)) {
            push_unique(&mut out, d);
        }
        for name in &self.cfg.endpoint_order {
            if let Some(d) = registry.get(name) {
                push_unique(&mut out, d);
            }
        }
        let mut rest: Vec<&EndpointDescriptor> = registry.list().iter().collect();
        rest.sort_by_key(|d| d.priority);
        for d in rest {
            push_unique(&mut out, d);
        }
        out
    }

    pub fn any_reachable(&self, registry: &EndpointRegistry) -> bool {
        registry.list().iter().any(|d| d.endpoint.exists())
    }

    pub fn send_entry(
        &mut self,
        registry: &EndpointRegistry,
        cmd: &EntryCommand,
        period: PeriodKey,
    ) -> RouteOutcome {
        if !self.entry_allowed(period) {
            return RouteOutcome::Throttled {
                kind: OpKind::Entry,
            };
        }
        self.last_entry = Some(period);

        let order = self.fallback_order(registry, None);
        let outcome = attempt(&order, |d| d.endpoint.send_entry(cmd));
        match &outcome {
            RouteOutcome::Accepted { endpoint, skipped } => {
                info!(
                    endpoint = %endpoint,
                    direction = %cmd.direction,
                    reason = %cmd.reason,
                    fallbacks = skipped.len(),
                    "entry accepted"
                );
                self.active = Some(endpoint.clone());
            }
            RouteOutcome::NotSent { attempts } => {
                warn!(direction = %cmd.direction, ?attempts, "entry not sent: no endpoint accepted");
            }
            _ => {}
        }
        outcome
    }

    pub fn send_close(
        &mut self,
        registry: &EndpointRegistry,
        reason: &str,
        period: PeriodKey,
        force: bool,
    ) -> RouteOutcome {
        let Some(active) = self.active.clone() else {
            return RouteOutcome::NothingToClose;
        };
        if !force && !self.close_allowed(period) {
            return RouteOutcome::Throttled {
                kind: OpKind::Close,
            };
        }
        self.last_close = Some(period);

        let order = self.fallback_order(registry, Some(&active));
        let outcome = attempt(&order, |d| d.endpoint.send_close(reason));
        match &outcome {
            RouteOutcome::Accepted { endpoint, skipped } => {
                info!(
                    endpoint = %endpoint,
                    entered_via = %active,
                    reason,
                    force,
                    fallbacks = skipped.len(),
                    "close accepted"
                );
                self.active = None;
            }
            RouteOutcome::NotSent { attempts } => {
                warn!(entered_via = %active, reason, ?attempts, "close not sent: no endpoint accepted");
            }
            _ => {}
        }
        outcome
    }

    /// Flatness as reported by the active endpoint. Flat when nothing is active.
    pub fn query_flatness(&self, registry: &EndpointRegistry) -> Flatness {
        match &self.active {
            None => Flatness::Flat,
            Some(name) => match registry.get(name) {
                Some(d) => d.endpoint.query_flatness(),
                None => Flatness::Unknown,
            },
        }
    }
}

fn push_unique<'r>(out: &mut Vec<&'r EndpointDescriptor>, d: &'r EndpointDescriptor) {
    if !out.iter().any(|x| x.name == d.name) {
        out.push(d);
    }
}

fn attempt<F>(order: &[&EndpointDescriptor], mut send: F) -> RouteOutcome
where
    F: FnMut(&EndpointDescriptor) -> bool,
{
    let mut attempts = Vec::new();
    for d in order {
        if !d.endpoint.exists() {
            attempts.push(Attempt {
                endpoint: d.name.clone(),
                failure: AttemptFailure::Unreachable,
            });
            continue;
        }
        if send(d) {
            return RouteOutcome::Accepted {
                endpoint: d.name.clone(),
                skipped: attempts,
            };
        }
        attempts.push(Attempt {
            endpoint: d.name.clone(),
            failure: AttemptFailure::Rejected,
        });
    }
    RouteOutcome::NotSent { attempts }
}
