//! In-memory endpoint.
//!
//! Entries are "filled" immediately unless fills are switched off, in which
//! case the endpoint acknowledges the entry but stays flat (the relay then
//! sees an unconfirmed entry). Every call is journaled, accepted or not.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use zcr_router::{Endpoint, EntryCommand, Flatness};
use zcr_schemas::{Direction, EntryStyle};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaperEvent {
    Entry {
        direction: Direction,
        style: EntryStyle,
        reason: String,
        accepted: bool,
    },
    Close {
        reason: String,
        accepted: bool,
    },
}

impl PaperEvent {
    pub fn is_accepted(&self) -> bool {
        match self {
            PaperEvent::Entry { accepted, .. } | PaperEvent::Close { accepted, .. } => *accepted,
        }
    }
}

#[derive(Debug)]
struct PaperState {
    reachable: bool,
    accepting: bool,
    fill_entries: bool,
    reports_position: bool,
    position: Option<Direction>,
    journal: Vec<PaperEvent>,
}

#[derive(Debug)]
pub struct PaperEndpoint {
    state: Mutex<PaperState>,
}

impl Default for PaperEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperEndpoint {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PaperState {
                reachable: true,
                accepting: true,
                fill_entries: true,
                reports_position: true,
                position: None,
                journal: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PaperState> {
        // A poisoned journal is still readable; tests want the record.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Refuse (false) or accept (true) every command from now on.
    pub fn set_accepting(&self, accepting: bool) {
        self.lock().accepting = accepting;
    }

    /// When off, accepted entries leave the endpoint flat.
    pub fn set_fill_entries(&self, fill: bool) {
        self.lock().fill_entries = fill;
    }

    /// When off, flatness is reported as unknown.
    pub fn set_reports_position(&self, reports: bool) {
        self.lock().reports_position = reports;
    }

    /// Change the position behind the relay's back (manual flatten, external fill).
    pub fn set_position(&self, position: Option<Direction>) {
        self.lock().position = position;
    }

    pub fn position(&self) -> Option<Direction> {
        self.lock().position
    }

    pub fn journal(&self) -> Vec<PaperEvent> {
        self.lock().journal.clone()
    }

    pub fn accepted(&self) -> Vec<PaperEvent> {
        self.lock()
            .journal
            .iter()
            .filter(|e| e.is_accepted())
            .cloned()
            .collect()
    }
}

impl Endpoint for PaperEndpoint {
    fn exists(&self) -> bool {
        self.lock().reachable
    }

    fn send_entry(&self, cmd: &EntryCommand) -> bool {
        let mut st = self.lock();
        let accepted = st.accepting;
        if accepted && st.fill_entries {
            st.position = Some(cmd.direction);
        }
        st.journal.push(PaperEvent::Entry {
            direction: cmd.direction,
            style: cmd.style,
            reason: cmd.reason.clone(),
            accepted,
        });
        accepted
    }

    fn send_close(&self, reason: &str) -> bool {
        let mut st = self.lock();
        let accepted = st.accepting;
        if accepted {
            st.position = None;
        }
        st.journal.push(PaperEvent::Close {
            reason: reason.to_string(),
            accepted,
        });
        accepted
    }

    fn query_flatness(&self) -> Flatness {
        let st = self.lock();
        match (st.reports_position, st.position) {
            (false, _) => Flatness::Unknown,
            (true, None) => Flatness::Flat,
            (true, Some(_)) => Flatness::NotFlat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_commands_are_journaled_but_change_nothing() {
        let ep = PaperEndpoint::new();
        ep.set_accepting(false);
        assert!(!ep.send_entry(&EntryCommand::new(Direction::Long, EntryStyle::Market, "t")));
        assert_eq!(ep.position(), None);
        assert_eq!(ep.journal().len(), 1);
        assert!(ep.accepted().is_empty());
    }

    #[test]
    fn unfilled_entry_stays_flat() {
        let ep = PaperEndpoint::new();
        ep.set_fill_entries(false);
        assert!(ep.send_entry(&EntryCommand::new(Direction::Short, EntryStyle::Drop, "t")));
        assert_eq!(ep.query_flatness(), Flatness::Flat);
        ep.set_reports_position(false);
        assert_eq!(ep.query_flatness(), Flatness::Unknown);
    }
}
