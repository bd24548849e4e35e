//! Built-in listeners.

use crate::failure::ExitReport;
use crate::hub::{ListenerError, ListenerResult, ReportEvent, TestRunListener};
use crate::unit::{Action, Status, UnitId};
use std::sync::{Mutex, PoisonError};

/// Captures the report stream for later inspection
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ReportEvent>>,
    exits: Mutex<Vec<ExitReport>>,
}

impl RecordingListener {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All enter/leave events received
    #[must_use]
    pub fn events(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All exit notifications received
    #[must_use]
    pub fn exits(&self) -> Vec<ExitReport> {
        self.exits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Leave events only, in delivery order
    #[must_use]
    pub fn leaves(&self) -> Vec<ReportEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.action == Action::Leave)
            .collect()
    }

    /// Events for one unit
    #[must_use]
    pub fn events_for(&self, id: &UnitId) -> Vec<ReportEvent> {
        self.events()
            .into_iter()
            .filter(|e| &e.unit.id == id)
            .collect()
    }

    /// Status the unit was closed with, if it was closed
    #[must_use]
    pub fn status_of(&self, id: &UnitId) -> Option<Status> {
        self.events_for(id)
            .into_iter()
            .find(|e| e.action == Action::Leave)
            .and_then(|e| e.status)
    }

    /// Compact `ENTER TEST login` / `LEAVE TEST login OK` trace
    #[must_use]
    pub fn transcript(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| match (e.action, e.status) {
                (Action::Enter, _) => format!("ENTER {} {}", e.unit.kind, e.message),
                (Action::Leave, Some(status)) => {
                    format!("LEAVE {} {} {status}", e.unit.kind, e.message)
                }
                (Action::Leave, None) => format!("LEAVE {} {}", e.unit.kind, e.message),
            })
            .collect()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.exits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl TestRunListener for RecordingListener {
    fn reported(&self, event: &ReportEvent) -> ListenerResult {
        self.events
            .lock()
            .map_err(|_| ListenerError::from("event log poisoned"))?
            .push(event.clone());
        Ok(())
    }

    fn report_exit(&self, exit: &ExitReport) -> ListenerResult {
        self.exits
            .lock()
            .map_err(|_| ListenerError::from("exit log poisoned"))?
            .push(exit.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Forwards the report stream to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl TestRunListener for TracingListener {
    fn reported(&self, event: &ReportEvent) -> ListenerResult {
        match (event.action, event.status) {
            (Action::Leave, Some(status)) if status.is_failure() => tracing::warn!(
                seq = event.sequence,
                kind = %event.unit.kind,
                id = %event.unit.id,
                %status,
                "{}",
                event.message
            ),
            (action, status) => tracing::info!(
                seq = event.sequence,
                ?action,
                kind = %event.unit.kind,
                id = %event.unit.id,
                status = ?status,
                "{}",
                event.message
            ),
        }
        Ok(())
    }

    fn report_exit(&self, exit: &ExitReport) -> ListenerResult {
        tracing::warn!(status = %exit.status(), "exit: {}", exit.message());
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}
