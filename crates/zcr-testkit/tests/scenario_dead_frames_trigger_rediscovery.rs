use std::sync::Arc;

use zcr_config::RelayConfig;
use zcr_router::EndpointRegistry;
use zcr_runtime::Relay;
use zcr_schemas::{PeriodContext, PeriodKey, Sample, SourceHandle};
use zcr_source::{FileSelectionStore, MemorySelectionStore, ReadNote, ScanOutcome, SelectionStore};
use zcr_testkit::ScriptedSource;

fn ctx(period: u64, ts: i64) -> PeriodContext {
    PeriodContext::new(PeriodKey(period), period as i64 * 60_000, ts)
}

#[test]
fn empty_catalog_backs_off_then_selects_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("selection.txt");

    let source = Arc::new(ScriptedSource::single());
    source.set_listed(false);
    let mut relay = Relay::new(
        &RelayConfig::default(),
        source.clone(),
        EndpointRegistry::new(),
        Box::new(FileSelectionStore::new(&path)),
    )
    .unwrap();

    let r = relay.on_tick(ctx(1, 60_000));
    assert_eq!(
        r.catalog,
        Some(ScanOutcome::Empty {
            failures: 1,
            retry_at_ms: Some(61_500)
        })
    );
    assert_eq!(r.reading.note, ReadNote::SourceMissing);
    assert!(relay.selected().is_none());

    source.set_listed(true);
    // Still inside the backoff window.
    let r = relay.on_tick(ctx(1, 61_000));
    assert!(r.catalog.is_none());

    source.push("osc#0", Sample::new(62_000, 0.7));
    let r = relay.on_tick(ctx(1, 62_000));
    assert_eq!(
        r.catalog,
        Some(ScanOutcome::Populated {
            count: 1,
            grew: true
        })
    );
    assert_eq!(relay.selected().map(SourceHandle::key).as_deref(), Some("osc#0"));
    assert_eq!(r.reading.value, Some(0.7));

    let stored = FileSelectionStore::new(&path).load().unwrap();
    assert_eq!(stored.as_deref(), Some("osc#0"));
}

#[test]
fn silent_source_requests_rescan_after_dead_frame_limit() {
    let source = Arc::new(ScriptedSource::single());
    let mut relay = Relay::new(
        &RelayConfig::default(),
        source.clone(),
        EndpointRegistry::new(),
        Box::new(MemorySelectionStore::default()),
    )
    .unwrap();

    source.push("osc#0", Sample::new(60_000, 1.0));
    relay.on_tick(ctx(1, 60_000));
    source.silence("osc#0");

    // Next period: history is older than the period start, so nothing is valid.
    let r1 = relay.on_tick(ctx(2, 120_000));
    let r2 = relay.on_tick(ctx(2, 121_000));
    let r3 = relay.on_tick(ctx(2, 122_000));
    assert!(!r1.reading.is_valid());
    assert!(!r1.rediscovery_requested);
    assert!(!r2.rediscovery_requested);
    assert!(r3.rediscovery_requested);
    assert_eq!(relay.snapshot().dead_frames, 0, "counter restarts after a request");

    let r4 = relay.on_tick(ctx(2, 123_000));
    assert_eq!(
        r4.catalog,
        Some(ScanOutcome::Populated {
            count: 1,
            grew: false
        })
    );
    assert_eq!(relay.selected().map(SourceHandle::key).as_deref(), Some("osc#0"));
}
