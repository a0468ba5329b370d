//! Registry with a fixed catalog whose samples are scripted by the test.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use zcr_schemas::{PeriodContext, Sample, SourceHandle};
use zcr_source::{RegistryError, SourceRegistry};

#[derive(Debug, Default)]
struct ScriptState {
    listed: bool,
    current: HashMap<String, Sample>,
    /// Oldest first.
    history: HashMap<String, Vec<Sample>>,
}

#[derive(Debug)]
pub struct ScriptedSource {
    handles: Vec<SourceHandle>,
    state: Mutex<ScriptState>,
}

impl ScriptedSource {
    /// Catalog of `handles`, listed from the start.
    pub fn new(handles: Vec<SourceHandle>) -> Self {
        Self {
            handles,
            state: Mutex::new(ScriptState {
                listed: true,
                ..ScriptState::default()
            }),
        }
    }

    /// Single source `osc#0`.
    pub fn single() -> Self {
        Self::new(vec![SourceHandle::new("osc", 0, "Oscillator")])
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn handle(&self, index: usize) -> Option<&SourceHandle> {
        self.handles.get(index)
    }

    /// An unlisted registry fails enumeration, like a host still loading.
    pub fn set_listed(&self, listed: bool) {
        self.lock().listed = listed;
    }

    /// Publish `sample` as the latest value of `key` and append it to history.
    pub fn push(&self, key: &str, sample: Sample) {
        let mut st = self.lock();
        st.current.insert(key.to_string(), sample);
        st.history.entry(key.to_string()).or_default().push(sample);
    }

    /// `key` stops serving a latest value (history is kept).
    pub fn silence(&self, key: &str) {
        self.lock().current.remove(key);
    }
}

impl SourceRegistry for ScriptedSource {
    fn list_sources(&self) -> Result<Vec<SourceHandle>, RegistryError> {
        if self.lock().listed {
            Ok(self.handles.clone())
        } else {
            Err(RegistryError::Unavailable("scripted registry unlisted".to_string()))
        }
    }

    fn read_latest(&self, handle: &SourceHandle, _ctx: &PeriodContext) -> Option<Sample> {
        self.lock().current.get(&handle.key()).copied()
    }

    fn read_recent(&self, handle: &SourceHandle, max: usize) -> Vec<Sample> {
        self.lock()
            .history
            .get(&handle.key())
            .map(|h| h.iter().rev().take(max).copied().collect())
            .unwrap_or_default()
    }
}
