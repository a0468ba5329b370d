//! Catalog rediscovery worker.
//!
//! Owns the [`CatalogScanner`] and decides where a due scan runs:
//! - without a runtime handle the scan runs inline on the calling thread;
//! - with a handle it runs on the blocking pool and the result is picked up
//!   by a later [`Rediscovery::poll`].
//!
//! # Invariants
//! - At most one scan is in flight.
//! - A worker that vanishes without reporting counts as a failed scan.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, warn};

use zcr_schemas::SourceHandle;
use zcr_source::{CatalogConfig, CatalogScanner, RegistryError, ScanOutcome, SourceRegistry};

type ScanResult = Result<Vec<SourceHandle>, RegistryError>;

pub struct Rediscovery {
    registry: Arc<dyn SourceRegistry>,
    scanner: CatalogScanner,
    handle: Option<Handle>,
    inflight: Option<oneshot::Receiver<ScanResult>>,
}

impl Rediscovery {
    pub fn new(registry: Arc<dyn SourceRegistry>, cfg: CatalogConfig) -> Self {
        Self {
            registry,
            scanner: CatalogScanner::new(cfg),
            handle: None,
            inflight: None,
        }
    }

    /// Run scans on `handle`'s blocking pool instead of inline.
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn scanner(&self) -> &CatalogScanner {
        &self.scanner
    }

    pub fn in_flight(&self) -> bool {
        self.inflight.is_some()
    }

    pub fn request(&mut self) {
        self.scanner.request();
    }

    pub fn trigger_manual(&mut self) {
        self.scanner.trigger_manual();
    }

    /// Scan on the calling thread right now, ignoring backoff. Meant for
    /// startup, before frames flow. Returns `None` while a background scan
    /// is still in flight.
    pub fn scan_now(&mut self, now_ms: i64) -> Option<ScanOutcome> {
        if self.inflight.is_some() {
            return None;
        }
        self.scanner.begin(now_ms);
        let result = self.registry.list_sources();
        Some(self.scanner.apply(now_ms, result))
    }

    /// Collect a finished background scan, or start a due one.
    ///
    /// Returns the outcome of whichever scan completed during this call.
    pub fn poll(&mut self, now_ms: i64) -> Option<ScanOutcome> {
        if let Some(rx) = self.inflight.as_mut() {
            let result = match rx.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => {
                    warn!("catalog scan worker exited without a result");
                    Err(RegistryError::Enumeration("scan worker dropped".to_string()))
                }
            };
            self.inflight = None;
            return Some(self.scanner.apply(now_ms, result));
        }

        if !self.scanner.due(now_ms) {
            return None;
        }
        self.scanner.begin(now_ms);

        match &self.handle {
            None => {
                let result = self.registry.list_sources();
                Some(self.scanner.apply(now_ms, result))
            }
            Some(handle) => {
                let (tx, rx) = oneshot::channel();
                let registry = Arc::clone(&self.registry);
                handle.spawn_blocking(move || {
                    // Receiver gone means the relay was dropped; nothing to report to.
                    let _ = tx.send(registry.list_sources());
                });
                debug!(now_ms, "catalog scan started in background");
                self.inflight = Some(rx);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use zcr_schemas::{PeriodContext, Sample};

    struct Counting {
        calls: AtomicU32,
        handles: Vec<SourceHandle>,
    }

    impl SourceRegistry for Counting {
        fn list_sources(&self) -> Result<Vec<SourceHandle>, RegistryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.handles.is_empty() {
                Err(RegistryError::Unavailable("not loaded".to_string()))
            } else {
                Ok(self.handles.clone())
            }
        }

        fn read_latest(&self, _: &SourceHandle, _: &PeriodContext) -> Option<Sample> {
            None
        }
    }

    fn registry(handles: Vec<SourceHandle>) -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicU32::new(0),
            handles,
        })
    }

    #[test]
    fn inline_scan_runs_on_first_poll_only() {
        let reg = registry(vec![SourceHandle::new("osc", 0, "Oscillator")]);
        let mut r = Rediscovery::new(reg.clone(), CatalogConfig::default());

        assert_eq!(
            r.poll(0),
            Some(ScanOutcome::Populated {
                count: 1,
                grew: true
            })
        );
        assert_eq!(r.poll(10), None);
        assert_eq!(reg.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_registry_backs_off() {
        let reg = registry(Vec::new());
        let mut r = Rediscovery::new(reg.clone(), CatalogConfig::default());

        assert!(matches!(r.poll(0), Some(ScanOutcome::Empty { failures: 1, .. })));
        // Still inside the backoff window.
        assert_eq!(r.poll(100), None);
        assert_eq!(reg.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scan_now_ignores_backoff() {
        let reg = registry(Vec::new());
        let mut r = Rediscovery::new(reg.clone(), CatalogConfig::default());
        r.poll(0);
        assert!(matches!(r.scan_now(10), Some(ScanOutcome::Empty { failures: 2, .. })));
        assert_eq!(reg.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn background_scan_is_collected_on_a_later_poll() {
        let reg = registry(vec![
            SourceHandle::new("osc", 0, "Oscillator"),
            SourceHandle::new("osc", 1, "Signal"),
        ]);
        let mut r =
            Rediscovery::new(reg.clone(), CatalogConfig::default()).with_handle(Handle::current());

        assert_eq!(r.poll(0), None);
        assert!(r.in_flight());

        let mut outcome = None;
        for i in 1..200 {
            std::thread::sleep(std::time::Duration::from_millis(5));
            outcome = r.poll(i);
            if outcome.is_some() {
                break;
            }
        }
        assert_eq!(
            outcome,
            Some(ScanOutcome::Populated {
                count: 2,
                grew: true
            })
        );
        assert!(!r.in_flight());
        assert_eq!(r.scanner().handles().len(), 2);
    }
}
