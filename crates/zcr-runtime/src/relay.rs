//! The relay: one synchronous pipeline per frame.
//!
//! # Frame order
//! 1. Collect or start a catalog scan; re-resolve the selected source.
//! 2. On a new period: roll the tick buffer, clear per-period filter state,
//!    honor the session-start flag, poll entry confirmation (and force the
//!    timeout cancel when required).
//! 3. Read, filter, take the prior sign, then record the confirmed value.
//! 4. Early-confirm a pending entry if the endpoint already holds it.
//! 5. Evaluate the state machine and route whatever it decided.
//!
//! # Blocking
//! Catalog scans leave the frame path whenever the relay is built inside a
//! tokio runtime: they run on the blocking pool and land on a later frame.
//! Endpoint sends are plain trait calls made by the router; hosts whose
//! endpoints do network IO register them wrapped in
//! [`zcr_router::AsyncEndpoint`] so a send only enqueues.
//!
//! # Invariants
//! - Nothing here blocks on an endpoint beyond a single trait call.
//! - Sends happen only when armed; the relay boots disarmed.
//! - Every routed command is reported back to the state machine before the
//!   frame returns.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use zcr_config::{RelayConfig, SourceSection};
use zcr_filter::{FilterOutput, FilterVerdict, FrameInfo, ReliabilityFilter, TickBuffer};
use zcr_router::{DestinationRouter, EndpointRegistry, EntryCommand, RouteOutcome};
use zcr_schemas::{EntryStyle, PeriodContext, PeriodKey, Sign, SourceHandle};
use zcr_signal::{
    ArmState, BlockReason, ConfirmationEvent, Decision, EntryConfirmationTracker, Observation,
    SignalState, SignalStateMachine, TriggerKind,
};
use zcr_source::{
    FileSelectionStore, MemorySelectionStore, ReadNote, Reading, SampleReader, ScanOutcome,
    SelectionStore, SourceRegistry,
};

use crate::{Rediscovery, RelaySnapshot};

const TIMEOUT_CANCEL_REASON: &str = "entry confirmation timeout";
const OPERATOR_FLATTEN_REASON: &str = "operator flatten";

/// Selection store implied by the source section: a file when one is
/// configured, memory otherwise.
pub fn selection_store_for(section: &SourceSection) -> Box<dyn SelectionStore> {
    match &section.selection_file {
        Some(path) => Box::new(FileSelectionStore::new(path.clone())),
        None => Box::new(MemorySelectionStore::default()),
    }
}

/// Everything one frame did, for logs and replay output.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TickReport {
    pub period: PeriodKey,
    pub now_ms: i64,
    pub new_period: bool,
    pub reading: Reading,
    pub verdict: FilterVerdict,
    pub decision: Decision,
    pub route: Option<RouteOutcome>,
    pub confirmation: Option<ConfirmationEvent>,
    /// Forced close issued because a pending entry timed out.
    pub cancel: Option<RouteOutcome>,
    pub catalog: Option<ScanOutcome>,
    pub rediscovery_requested: bool,
    pub state: SignalState,
}

pub struct Relay {
    sources: Arc<dyn SourceRegistry>,
    endpoints: EndpointRegistry,
    reader: SampleReader,
    filter: ReliabilityFilter,
    buffer: TickBuffer,
    machine: SignalStateMachine,
    router: DestinationRouter,
    tracker: EntryConfirmationTracker,
    arm: ArmState,
    rediscovery: Rediscovery,
    selection: Box<dyn SelectionStore>,
    /// Key to (re)select once the catalog lists it.
    wanted_key: Option<String>,
    selected: Option<SourceHandle>,
    entry_style: EntryStyle,
    last_candidate: Option<f64>,
    last_note: Option<ReadNote>,
    last_block: Option<BlockReason>,
}

impl Relay {
    /// Build a relay. The configured `source.selected` wins over the persisted
    /// selection; with neither, the first catalogued source is taken.
    ///
    /// Inside a tokio runtime catalog scans run on its blocking pool; outside
    /// one they run inline.
    pub fn new(
        cfg: &RelayConfig,
        sources: Arc<dyn SourceRegistry>,
        endpoints: EndpointRegistry,
        selection: Box<dyn SelectionStore>,
    ) -> Result<Self> {
        let wanted_key = match &cfg.source.selected {
            Some(key) => Some(key.clone()),
            None => selection.load()?,
        };
        let mut rediscovery = Rediscovery::new(Arc::clone(&sources), cfg.catalog.clone());
        let background = match Handle::try_current() {
            Ok(handle) => {
                rediscovery = rediscovery.with_handle(handle);
                true
            }
            Err(_) => false,
        };
        info!(
            wanted = wanted_key.as_deref().unwrap_or("<first available>"),
            endpoints = endpoints.len(),
            background_discovery = background,
            "relay constructed (disarmed)"
        );

        Ok(Self {
            rediscovery,
            sources,
            endpoints,
            reader: SampleReader::new(cfg.source.reader.clone()),
            filter: ReliabilityFilter::new(cfg.filter.clone()),
            buffer: TickBuffer::new(),
            machine: SignalStateMachine::new(cfg.signal.clone()),
            router: DestinationRouter::new(cfg.router.clone()),
            tracker: EntryConfirmationTracker::new(
                cfg.signal.confirmation_timeout_periods,
                cfg.signal.confirmation_grace_periods,
            ),
            arm: ArmState::boot(),
            selection,
            wanted_key,
            selected: None,
            entry_style: cfg.signal.entry_style,
            last_candidate: None,
            last_note: None,
            last_block: None,
        })
    }

    /// Run catalog scans on `handle`'s blocking pool instead of inline.
    pub fn with_background_discovery(mut self, handle: Handle) -> Self {
        self.rediscovery = self.rediscovery.with_handle(handle);
        self
    }

    // -----------------------------------------------------------------------
    // Operator surface
    // -----------------------------------------------------------------------

    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    pub fn endpoints_mut(&mut self) -> &mut EndpointRegistry {
        &mut self.endpoints
    }

    pub fn is_armed(&self) -> bool {
        self.arm.is_armed()
    }

    pub fn arm(&mut self) {
        info!("relay armed");
        self.arm = ArmState::arm();
    }

    pub fn disarm(&mut self) {
        info!("relay disarmed by operator");
        self.arm = ArmState::manual_disarm();
    }

    pub fn state(&self) -> SignalState {
        self.machine.state()
    }

    pub fn selected(&self) -> Option<&SourceHandle> {
        self.selected.as_ref()
    }

    /// Point the relay at a catalogued source and persist the choice.
    pub fn select_source(&mut self, key: &str) -> Result<()> {
        let Some(handle) = self.rediscovery.scanner().find(key).cloned() else {
            anyhow::bail!("source not in catalog: {key}");
        };
        self.wanted_key = Some(key.to_string());
        self.adopt(handle);
        self.selection.save(key)?;
        Ok(())
    }

    /// Enumerate sources on the calling thread and resolve the selection.
    /// For startup, so the first frame already has a source.
    pub fn prime_catalog(&mut self, now_ms: i64) -> Option<ScanOutcome> {
        let outcome = self.rediscovery.scan_now(now_ms);
        if matches!(outcome, Some(ScanOutcome::Populated { .. })) {
            self.resolve_selection();
        }
        outcome
    }

    /// Operator-requested rescan; clears backoff and exhaustion.
    pub fn trigger_rediscovery(&mut self) {
        self.rediscovery.trigger_manual();
    }

    /// Drop every tracker: signal state, confirmation, router memory and the
    /// filter/buffer history. Re-arms bootstrap per policy. Arm state and the
    /// source selection are kept.
    pub fn reset(&mut self) {
        info!("resetting all relay trackers");
        self.machine.reset();
        self.tracker.reset();
        self.router.reset();
        self.filter.reset();
        self.buffer.reset();
        self.reader.reset();
        self.last_block = None;
    }

    /// Force a close through the active endpoint, ignoring the close throttle.
    pub fn flatten(&mut self, period: PeriodKey) -> RouteOutcome {
        let outcome = self
            .router
            .send_close(&self.endpoints, OPERATOR_FLATTEN_REASON, period, true);
        self.after_forced_close(&outcome, period);
        outcome
    }

    pub fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot {
            period: self.buffer.period(),
            state: self.machine.state(),
            armed: self.arm.is_armed(),
            last_direction: self.machine.last_direction(),
            last_value: self.last_candidate,
            last_note: self.last_note,
            selected_source: self.selected.as_ref().map(SourceHandle::key),
            active_endpoint: self.router.active_endpoint().map(str::to_string),
            pending_entry: self.tracker.pending().copied(),
            last_block: self.last_block,
            catalog_size: self.rediscovery.scanner().handles().len(),
            catalog_failures: self.rediscovery.scanner().failures(),
            dead_frames: self.filter.dead_frames(),
        }
    }

    // -----------------------------------------------------------------------
    // Frame pipeline
    // -----------------------------------------------------------------------

    pub fn on_tick(&mut self, ctx: PeriodContext) -> TickReport {
        let catalog = self.rediscovery.poll(ctx.now_ms);
        if matches!(catalog, Some(ScanOutcome::Populated { .. })) {
            self.resolve_selection();
        }

        let new_period = self.buffer.begin_period(ctx.period);
        let mut confirmation = None;
        let mut cancel = None;
        if new_period {
            self.filter.on_period_change();
            if ctx.session_start {
                debug!(period = %ctx.period, "session start; spacing cleared");
                self.machine.on_session_start();
            }
            let (event, cancel_route) = self.poll_confirmation(ctx.period);
            confirmation = Some(event);
            cancel = cancel_route;
        }

        let reading = match &self.selected {
            Some(handle) => self.reader.read(self.sources.as_ref(), handle, &ctx),
            None => Reading::invalid(ReadNote::SourceMissing),
        };
        let frame = FrameInfo {
            first_frame_of_period: new_period,
            confirmed_this_period: self.buffer.has_confirmed(),
        };
        let out: FilterOutput = self.filter.process(&reading, frame);
        if out.rediscover {
            info!(period = %ctx.period, "dead-frame limit reached; requesting source rediscovery");
            self.rediscovery.request();
        }

        let prior = self.buffer.prior_sign();
        if let Some(v) = out.confirmed() {
            self.buffer.record(v);
        }
        let candidate = out.candidate();
        let current = candidate.map(Sign::of).unwrap_or(Sign::Zero);
        self.last_candidate = candidate.or(self.last_candidate);
        self.last_note = Some(reading.note);

        let flat = self.endpoint_flat();
        if self.tracker.observe(ctx.period, flat) {
            info!(period = %ctx.period, "entry confirmed by endpoint");
            confirmation = Some(ConfirmationEvent::Confirmed);
        }

        let obs = Observation {
            period: ctx.period,
            prior,
            current,
            confirmed_this_period: self.buffer.has_confirmed(),
            endpoint_reachable: self.router.any_reachable(&self.endpoints),
            armed: self.arm.is_armed(),
            endpoint_flat: flat,
            confirmation_pending: self.tracker.is_pending(),
            confirmation_settled: self.tracker.settled(ctx.period),
        };
        let decision = self.machine.evaluate(&obs);
        let route = self.execute(decision, ctx.period);

        TickReport {
            period: ctx.period,
            now_ms: ctx.now_ms,
            new_period,
            reading,
            verdict: out.verdict,
            decision,
            route,
            confirmation,
            cancel,
            catalog,
            rediscovery_requested: out.rediscover,
            state: self.machine.state(),
        }
    }

    fn endpoint_flat(&self) -> bool {
        self.router
            .query_flatness(&self.endpoints)
            .resolve(self.machine.state() != SignalState::Flat)
    }

    fn poll_confirmation(&mut self, period: PeriodKey) -> (ConfirmationEvent, Option<RouteOutcome>) {
        let flat = self.endpoint_flat();
        let event = self.tracker.on_period(period, flat, self.arm.is_armed());
        match event {
            ConfirmationEvent::Confirmed => {
                info!(period = %period, "entry confirmed by endpoint");
                (event, None)
            }
            ConfirmationEvent::ClearedDisarmed => {
                warn!(period = %period, "entry unconfirmed at timeout while disarmed; dropped without cancel");
                (event, None)
            }
            ConfirmationEvent::CancelRequired => {
                warn!(period = %period, "entry unconfirmed at timeout; forcing close");
                let outcome =
                    self.router
                        .send_close(&self.endpoints, TIMEOUT_CANCEL_REASON, period, true);
                self.after_forced_close(&outcome, period);
                (event, Some(outcome))
            }
            ConfirmationEvent::Idle | ConfirmationEvent::Waiting { .. } => (event, None),
        }
    }

    /// Shared bookkeeping for closes that bypass the state machine's decision.
    fn after_forced_close(&mut self, outcome: &RouteOutcome, period: PeriodKey) {
        match outcome {
            RouteOutcome::Accepted { .. } | RouteOutcome::NothingToClose => {
                self.tracker.cancel_completed();
                if self.machine.state() != SignalState::Flat {
                    if let Err(err) = self.machine.on_close_accepted(period) {
                        warn!(error = %err, "forced close bookkeeping rejected");
                    }
                }
            }
            RouteOutcome::NotSent { .. } | RouteOutcome::Throttled { .. } => {}
        }
    }

    fn execute(&mut self, decision: Decision, period: PeriodKey) -> Option<RouteOutcome> {
        match decision {
            Decision::Hold => {
                self.last_block = None;
                None
            }
            Decision::Blocked(reason) => {
                self.last_block = Some(reason);
                None
            }
            Decision::ForcedFlat => {
                self.tracker.reset();
                self.router.reset();
                None
            }
            Decision::Enter { direction, kind } => {
                self.last_block = None;
                let reason = match kind {
                    TriggerKind::Cross => "zero cross",
                    TriggerKind::Bootstrap => "bootstrap",
                };
                let cmd = EntryCommand::new(direction, self.entry_style, reason);
                let outcome = self.router.send_entry(&self.endpoints, &cmd, period);
                if outcome.is_accepted() {
                    match self.machine.on_entry_accepted(direction, period) {
                        Ok(()) => self.tracker.begin(direction, period),
                        Err(err) => warn!(error = %err, "entry bookkeeping rejected"),
                    }
                }
                Some(outcome)
            }
            Decision::Close { reason } => {
                self.last_block = None;
                let outcome = self
                    .router
                    .send_close(&self.endpoints, reason.as_str(), period, false);
                let result = match &outcome {
                    RouteOutcome::Accepted { .. } => {
                        self.tracker.reset();
                        self.machine.on_close_accepted(period)
                    }
                    RouteOutcome::NothingToClose => {
                        warn!(period = %period, "close owed but no active endpoint; treating as flat");
                        self.tracker.reset();
                        self.machine.on_close_accepted(period)
                    }
                    RouteOutcome::NotSent { .. } | RouteOutcome::Throttled { .. } => {
                        self.machine.on_close_not_sent()
                    }
                };
                if let Err(err) = result {
                    warn!(error = %err, "close bookkeeping rejected");
                }
                Some(outcome)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Source selection
    // -----------------------------------------------------------------------

    fn resolve_selection(&mut self) {
        let scanner = self.rediscovery.scanner();
        let wanted = self
            .selected
            .as_ref()
            .map(SourceHandle::key)
            .or_else(|| self.wanted_key.clone());

        match wanted {
            Some(key) => {
                let Some(handle) = scanner.find(&key).cloned() else {
                    debug!(key = %key, "wanted source not catalogued yet");
                    return;
                };
                if self.selected.as_ref() != Some(&handle) {
                    self.adopt(handle);
                }
            }
            None => {
                let Some(handle) = scanner.handles().first().cloned() else {
                    return;
                };
                let key = handle.key();
                self.wanted_key = Some(key.clone());
                self.adopt(handle);
                if let Err(err) = self.selection.save(&key) {
                    warn!(error = %err, key = %key, "failed to persist source selection");
                }
            }
        }
    }

    fn adopt(&mut self, handle: SourceHandle) {
        if self.selected.as_ref() == Some(&handle) {
            return;
        }
        info!(source = %handle, "source selected");
        self.selected = Some(handle);
        self.reader.reset();
        self.filter.reset();
        self.buffer.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use zcr_router::{Endpoint, Flatness};
    use zcr_schemas::{Direction, Sample};
    use zcr_source::RegistryError;

    struct Fixed {
        values: Mutex<Vec<f64>>,
    }

    impl SourceRegistry for Fixed {
        fn list_sources(&self) -> Result<Vec<SourceHandle>, RegistryError> {
            Ok(vec![SourceHandle::new("osc", 0, "Oscillator")])
        }

        fn read_latest(&self, _: &SourceHandle, ctx: &PeriodContext) -> Option<Sample> {
            let mut values = self.values.lock().unwrap();
            if values.is_empty() {
                return None;
            }
            Some(Sample::new(ctx.now_ms, values.remove(0)))
        }
    }

    #[derive(Default)]
    struct Holds {
        entries: Mutex<Vec<Direction>>,
    }

    impl Endpoint for Holds {
        fn exists(&self) -> bool {
            true
        }
        fn send_entry(&self, cmd: &EntryCommand) -> bool {
            self.entries.lock().unwrap().push(cmd.direction);
            true
        }
        fn send_close(&self, _: &str) -> bool {
            true
        }
        fn query_flatness(&self) -> Flatness {
            if self.entries.lock().unwrap().is_empty() {
                Flatness::Flat
            } else {
                Flatness::NotFlat
            }
        }
    }

    fn relay(values: Vec<f64>) -> (Relay, Arc<Holds>) {
        let sources = Arc::new(Fixed {
            values: Mutex::new(values),
        });
        let ep = Arc::new(Holds::default());
        let mut endpoints = EndpointRegistry::new();
        endpoints.register("paper", 0, ep.clone()).unwrap();
        let relay = Relay::new(
            &RelayConfig::default(),
            sources,
            endpoints,
            Box::new(MemorySelectionStore::default()),
        )
        .unwrap();
        (relay, ep)
    }

    fn ctx(period: u64) -> PeriodContext {
        let start = period as i64 * 60_000;
        PeriodContext::new(PeriodKey(period), start, start + 10)
    }

    #[test]
    fn boots_disarmed_and_selects_first_source() {
        let (mut r, ep) = relay(vec![1.0]);
        assert!(!r.is_armed());

        let report = r.on_tick(ctx(1));
        assert_eq!(r.selected().map(SourceHandle::key).as_deref(), Some("osc#0"));
        assert_eq!(report.decision, Decision::Blocked(BlockReason::Disarmed));
        assert!(ep.entries.lock().unwrap().is_empty());
        assert_eq!(r.snapshot().last_block, Some(BlockReason::Disarmed));
    }

    #[test]
    fn armed_bootstrap_enters_and_snapshot_tracks_it() {
        let (mut r, ep) = relay(vec![1.0]);
        r.arm();

        let report = r.on_tick(ctx(1));
        assert_eq!(
            report.decision,
            Decision::Enter {
                direction: Direction::Long,
                kind: TriggerKind::Bootstrap
            }
        );
        assert_eq!(*ep.entries.lock().unwrap(), vec![Direction::Long]);

        let snap = r.snapshot();
        assert_eq!(snap.state, SignalState::InTrade);
        assert_eq!(snap.active_endpoint.as_deref(), Some("paper"));
        assert_eq!(snap.last_value, Some(1.0));
        assert!(snap.pending_entry.is_some());

        // Endpoint already holds the position: confirmed on the next frame.
        let report = r.on_tick(ctx(1));
        assert_eq!(report.confirmation, Some(ConfirmationEvent::Confirmed));
        assert!(r.snapshot().pending_entry.is_none());
    }

    #[test]
    fn select_unknown_source_is_an_error() {
        let (mut r, _) = relay(vec![]);
        r.on_tick(ctx(1));
        assert!(r.select_source("nope#3").is_err());
        assert!(r.select_source("osc#0").is_ok());
    }
}
