use std::sync::Arc;

use zcr_config::RelayConfig;
use zcr_router::EndpointRegistry;
use zcr_runtime::{Relay, TickReport};
use zcr_schemas::{Direction, EntryStyle, PeriodContext, PeriodKey, Sample};
use zcr_signal::{BlockReason, CloseReason, Decision, SignalState, TriggerKind};
use zcr_source::MemorySelectionStore;
use zcr_testkit::{PaperEndpoint, PaperEvent, ScriptedSource};

const PERIOD_MS: i64 = 60_000;

fn frame(relay: &mut Relay, source: &ScriptedSource, period: u64, offset_ms: i64, v: f64) -> TickReport {
    let start = period as i64 * PERIOD_MS;
    let ts = start + offset_ms;
    source.push("osc#0", Sample::new(ts, v));
    relay.on_tick(PeriodContext::new(PeriodKey(period), start, ts))
}

#[test]
fn scenario_cross_enters_and_opposite_cross_closes() {
    let source = Arc::new(ScriptedSource::single());
    let paper = Arc::new(PaperEndpoint::new());
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

    // First nonzero reading after reset: bootstrap entry in its direction.
    let r = frame(&mut relay, &source, 1, 0, -0.5);
    assert_eq!(
        r.decision,
        Decision::Enter {
            direction: Direction::Short,
            kind: TriggerKind::Bootstrap
        }
    );
    assert_eq!(paper.position(), Some(Direction::Short));

    let r = frame(&mut relay, &source, 2, 0, -0.3);
    assert_eq!(r.decision, Decision::Hold);
    assert_eq!(relay.state(), SignalState::InTrade);

    // Sign flips against the open trade: symmetric close.
    let r = frame(&mut relay, &source, 3, 0, 0.4);
    assert_eq!(
        r.decision,
        Decision::Close {
            reason: CloseReason::OppositeCross
        }
    );
    assert_eq!(relay.state(), SignalState::Flat);

    // Same sign again inside the period: no cross, bootstrap already spent.
    let r = frame(&mut relay, &source, 3, 1_000, 0.5);
    assert_eq!(r.decision, Decision::Hold);

    // Down cross one period after the close: spacing (3 periods) blocks it.
    let r = frame(&mut relay, &source, 4, 0, -0.2);
    assert_eq!(r.decision, Decision::Blocked(BlockReason::SpacingThrottle));

    // The blocked cross is not carried forward once spacing expires.
    let r = frame(&mut relay, &source, 5, 0, -0.2);
    assert_eq!(r.decision, Decision::Hold);
    let r = frame(&mut relay, &source, 6, 0, -0.1);
    assert_eq!(r.decision, Decision::Hold);
    assert_eq!(relay.state(), SignalState::Flat);

    let r = frame(&mut relay, &source, 7, 0, 0.3);
    assert_eq!(
        r.decision,
        Decision::Enter {
            direction: Direction::Long,
            kind: TriggerKind::Cross
        }
    );

    assert_eq!(
        paper.accepted(),
        vec![
            PaperEvent::Entry {
                direction: Direction::Short,
                style: EntryStyle::Drop,
                reason: "bootstrap".to_string(),
                accepted: true,
            },
            PaperEvent::Close {
                reason: "opposite cross".to_string(),
                accepted: true,
            },
            PaperEvent::Entry {
                direction: Direction::Long,
                style: EntryStyle::Drop,
                reason: "zero cross".to_string(),
                accepted: true,
            },
        ]
    );
}
