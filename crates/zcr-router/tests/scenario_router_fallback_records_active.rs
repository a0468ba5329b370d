use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use zcr_router::*;
use zcr_schemas::{Direction, EntryStyle, PeriodKey};

struct Desk {
    up: AtomicBool,
    probes: AtomicUsize,
    entries: AtomicUsize,
    closes: AtomicUsize,
}

impl Desk {
    fn new(up: bool) -> Arc<Self> {
        Arc::new(Self {
            up: AtomicBool::new(up),
            probes: AtomicUsize::new(0),
            entries: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        })
    }
}

impl Endpoint for Desk {
    fn exists(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.up.load(Ordering::SeqCst)
    }
    fn send_entry(&self, _cmd: &EntryCommand) -> bool {
        self.entries.fetch_add(1, Ordering::SeqCst);
        true
    }
    fn send_close(&self, _reason: &str) -> bool {
        self.closes.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[test]
fn unreachable_first_endpoint_falls_back_and_close_is_symmetric() {
    let a = Desk::new(false);
    let b = Desk::new(true);

    let mut registry = EndpointRegistry::new();
    registry.register("A", 0, a.clone()).unwrap();
    registry.register("B", 1, b.clone()).unwrap();

    let mut router = DestinationRouter::new(RouterConfig {
        endpoint_order: vec!["A".into(), "B".into()],
        ..RouterConfig::default()
    });

    let cmd = EntryCommand::new(Direction::Long, EntryStyle::Drop, "cross up");
    let out = router.send_entry(&registry, &cmd, PeriodKey(10));

    match &out {
        RouteOutcome::Accepted { endpoint, skipped } => {
            assert_eq!(endpoint, "B");
            assert_eq!(
                skipped,
                &vec![Attempt {
                    endpoint: "A".into(),
                    failure: AttemptFailure::Unreachable
                }]
            );
        }
        other => panic!("expected acceptance, got {other:?}"),
    }
    assert_eq!(a.probes.load(Ordering::SeqCst), 1);
    assert_eq!(a.entries.load(Ordering::SeqCst), 0);
    assert_eq!(router.active_endpoint(), Some("B"));

    // A comes back, but the close still goes where the entry went.
    a.up.store(true, Ordering::SeqCst);
    let out = router.send_close(&registry, "cross down", PeriodKey(11), false);
    assert_eq!(out.accepted_by(), Some("B"));
    assert_eq!(a.closes.load(Ordering::SeqCst), 0);
    assert_eq!(b.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn second_close_in_same_period_is_a_noop() {
    let b = Desk::new(true);
    let mut registry = EndpointRegistry::new();
    registry.register("B", 0, b.clone()).unwrap();

    let mut router = DestinationRouter::new(RouterConfig::default());
    let cmd = EntryCommand::new(Direction::Short, EntryStyle::Market, "cross down");
    assert!(router.send_entry(&registry, &cmd, PeriodKey(1)).is_accepted());

    assert!(router
        .send_close(&registry, "flip", PeriodKey(2), false)
        .is_accepted());
    assert_eq!(
        router.send_close(&registry, "flip", PeriodKey(2), false),
        RouteOutcome::NothingToClose
    );
    assert_eq!(
        router.send_close(&registry, "flip", PeriodKey(2), true),
        RouteOutcome::NothingToClose
    );
    assert_eq!(b.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn unregistered_endpoint_drops_out_of_rotation() {
    let a = Desk::new(true);
    let b = Desk::new(true);
    let mut registry = EndpointRegistry::new();
    registry.register("A", 0, a.clone()).unwrap();
    registry.register("B", 1, b.clone()).unwrap();

    let mut router = DestinationRouter::new(RouterConfig::default());
    registry.unregister("A").unwrap();

    let cmd = EntryCommand::new(Direction::Long, EntryStyle::Pop, "bootstrap");
    assert_eq!(
        router.send_entry(&registry, &cmd, PeriodKey(5)).accepted_by(),
        Some("B")
    );
    assert_eq!(a.probes.load(Ordering::SeqCst), 0);
}
