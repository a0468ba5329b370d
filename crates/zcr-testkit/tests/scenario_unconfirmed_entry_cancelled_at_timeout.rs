use std::sync::Arc;

use zcr_config::RelayConfig;
use zcr_router::{EndpointRegistry, RouteOutcome};
use zcr_runtime::{Relay, TickReport};
use zcr_schemas::{Direction, PeriodContext, PeriodKey, Sample};
use zcr_signal::{ConfirmationEvent, Decision, SignalState};
use zcr_source::MemorySelectionStore;
use zcr_testkit::{PaperEndpoint, PaperEvent, ScriptedSource};

const PERIOD_MS: i64 = 60_000;

fn setup() -> (Relay, Arc<ScriptedSource>, Arc<PaperEndpoint>) {
    let source = Arc::new(ScriptedSource::single());
    let paper = Arc::new(PaperEndpoint::new());
    // Acknowledges entries but never holds a position.
    paper.set_fill_entries(false);
    let mut endpoints = EndpointRegistry::new();
    endpoints.register("paper", 0, paper.clone()).unwrap();

    let mut relay = Relay::new(
        &RelayConfig::default(),
        source.clone(),
        endpoints,
        Box::new(MemorySelectionStore::default()),
    )
    .unwrap();
    relay.arm();
    (relay, source, paper)
}

fn frame(relay: &mut Relay, source: &ScriptedSource, period: u64, v: f64) -> TickReport {
    let start = period as i64 * PERIOD_MS;
    source.push("osc#0", Sample::new(start, v));
    relay.on_tick(PeriodContext::new(PeriodKey(period), start, start))
}

#[test]
fn scenario_unconfirmed_entry_cancelled_at_timeout() {
    let (mut relay, source, paper) = setup();

    let r = frame(&mut relay, &source, 10, 1.0);
    assert!(matches!(r.decision, Decision::Enter { direction: Direction::Long, .. }));
    assert!(relay.snapshot().pending_entry.is_some());

    let r = frame(&mut relay, &source, 11, 1.0);
    assert_eq!(r.confirmation, Some(ConfirmationEvent::Waiting { elapsed: 1 }));
    // Endpoint is flat but the entry is still pending: no forced reset.
    assert_eq!(r.decision, Decision::Hold);
    assert_eq!(relay.state(), SignalState::InTrade);

    // Timeout (2 periods) reached while armed: forced cancel.
    let r = frame(&mut relay, &source, 12, 1.0);
    assert_eq!(r.confirmation, Some(ConfirmationEvent::CancelRequired));
    assert_eq!(
        r.cancel.as_ref().and_then(RouteOutcome::accepted_by),
        Some("paper")
    );
    assert_eq!(relay.state(), SignalState::Flat);
    assert!(relay.snapshot().pending_entry.is_none());
    assert_eq!(r.decision, Decision::Hold);

    assert_eq!(
        paper.journal().last(),
        Some(&PaperEvent::Close {
            reason: "entry confirmation timeout".to_string(),
            accepted: true,
        })
    );
}

#[test]
fn timeout_while_disarmed_clears_without_cancel() {
    let (mut relay, source, paper) = setup();

    frame(&mut relay, &source, 10, 1.0);
    relay.disarm();
    frame(&mut relay, &source, 11, 1.0);

    let r = frame(&mut relay, &source, 12, 1.0);
    assert_eq!(r.confirmation, Some(ConfirmationEvent::ClearedDisarmed));
    assert!(r.cancel.is_none());
    // Nothing pending and the endpoint is flat: local state follows.
    assert_eq!(r.decision, Decision::ForcedFlat);
    assert_eq!(relay.state(), SignalState::Flat);

    let journal = paper.journal();
    assert_eq!(journal.len(), 1);
    assert!(matches!(journal[0], PaperEvent::Entry { .. }));
}
