//! Reporter/listener hub.
//!
//! One hub per test run. Listeners attach for the lifetime of the run and
//! receive every enter/leave event plus exactly one exit notification per
//! failed invocation, synchronously and in registration order.
//!
//! A listener that fails (returns `Err` or panics) never stops delivery to
//! the listeners after it. Faults are collected and surfaced with the run
//! summary.

use crate::failure::{panic_message, ExitReport};
use crate::unit::{Action, SemanticUnit, Status, UnitId, Variables};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// One enter or leave notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEvent {
    /// Position in the run's event stream, starting at 0
    pub sequence: u64,
    /// Unit entered or left
    pub unit: SemanticUnit,
    /// Enter or leave
    pub action: Action,
    /// Human readable message (the unit label)
    pub message: String,
    /// `None` on enter, the terminal status on leave
    pub status: Option<Status>,
    /// Variables live in the unit at the time of the event
    pub variables: Variables,
}

impl ReportEvent {
    /// Identifier of the unit
    #[must_use]
    pub fn id(&self) -> &UnitId {
        &self.unit.id
    }

    /// Check if this is a leave carrying `status`
    #[must_use]
    pub fn is_leave_with(&self, status: Status) -> bool {
        self.action == Action::Leave && self.status == Some(status)
    }
}

/// Error returned by a listener callback
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ListenerError {
    /// Error message
    pub message: String,
}

impl From<String> for ListenerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ListenerError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Result type of listener callbacks
pub type ListenerResult = Result<(), ListenerError>;

/// Observer of a test run's report stream
pub trait TestRunListener: Send + Sync {
    /// Called for every enter and leave
    fn reported(&self, event: &ReportEvent) -> ListenerResult;

    /// Called once per failed invocation
    fn report_exit(&self, exit: &ExitReport) -> ListenerResult {
        let _ = exit;
        Ok(())
    }

    /// Listener name used in fault reports
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Run initialisation hook.
///
/// Fixtures implementing this get the run's hub once at run start and may
/// register themselves as listeners.
pub trait TestRunReportable: Send + Sync {
    /// Receive the reporter for the current run
    fn init_with_reporter(self: Arc<Self>, reporter: &mut ReporterHub);
}

/// A listener failure captured during dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerFault {
    /// Listener name
    pub listener: String,
    /// What was being delivered
    pub delivery: String,
    /// Failure message
    pub message: String,
    /// Whether the listener panicked rather than returning an error
    pub panicked: bool,
}

impl fmt::Display for ListenerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listener '{}' failed on {}: {}",
            self.listener, self.delivery, self.message
        )
    }
}

/// Per-run registry and multiplexer of listeners
#[derive(Default)]
pub struct ReporterHub {
    listeners: Vec<Arc<dyn TestRunListener>>,
    faults: Vec<ListenerFault>,
    next_sequence: u64,
    exits_reported: u64,
}

impl fmt::Debug for ReporterHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterHub")
            .field("listener_count", &self.listeners.len())
            .field("fault_count", &self.faults.len())
            .field("events_reported", &self.next_sequence)
            .field("exits_reported", &self.exits_reported)
            .finish()
    }
}

fn same_listener(a: &Arc<dyn TestRunListener>, b: &Arc<dyn TestRunListener>) -> bool {
    // Compare data pointers only, vtables may differ across codegen units
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}

impl ReporterHub {
    /// Create a hub with no listeners
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for the rest of the run.
    ///
    /// Returns `false` if this exact listener was already registered.
    pub fn add_listener(&mut self, listener: Arc<dyn TestRunListener>) -> bool {
        if self.listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        tracing::debug!(listener = listener.name(), "listener added");
        self.listeners.push(listener);
        true
    }

    /// Number of registered listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of enter/leave events delivered so far
    #[must_use]
    pub const fn events_reported(&self) -> u64 {
        self.next_sequence
    }

    /// Number of exit notifications delivered so far
    #[must_use]
    pub const fn exits_reported(&self) -> u64 {
        self.exits_reported
    }

    /// Build and deliver an enter/leave event
    pub fn emit(
        &mut self,
        unit: &SemanticUnit,
        action: Action,
        status: Option<Status>,
        variables: &Variables,
    ) -> ReportEvent {
        let event = ReportEvent {
            sequence: self.next_sequence,
            unit: unit.clone(),
            action,
            message: unit.label.clone(),
            status,
            variables: variables.clone(),
        };
        self.report(&event);
        event
    }

    /// Deliver one event to every listener, in registration order
    pub fn report(&mut self, event: &ReportEvent) {
        self.next_sequence = self.next_sequence.max(event.sequence.saturating_add(1));
        let delivery = format!("{:?} {}", event.action, event.unit.id);
        for listener in &self.listeners {
            let result = catch_unwind(AssertUnwindSafe(|| listener.reported(event)));
            if let Some(fault) = Self::fault_from(listener.as_ref(), &delivery, result) {
                self.faults.push(fault);
            }
        }
    }

    /// Deliver one exit notification to every listener
    pub fn report_exit(&mut self, exit: &ExitReport) {
        self.exits_reported += 1;
        let delivery = format!("exit {}", exit.status());
        for listener in &self.listeners {
            let result = catch_unwind(AssertUnwindSafe(|| listener.report_exit(exit)));
            if let Some(fault) = Self::fault_from(listener.as_ref(), &delivery, result) {
                self.faults.push(fault);
            }
        }
    }

    fn fault_from(
        listener: &dyn TestRunListener,
        delivery: &str,
        result: std::thread::Result<ListenerResult>,
    ) -> Option<ListenerFault> {
        let (message, panicked) = match result {
            Ok(Ok(())) => return None,
            Ok(Err(e)) => (e.message, false),
            Err(payload) => (panic_message(payload.as_ref()), true),
        };
        tracing::debug!(listener = listener.name(), delivery, %message, "listener fault");
        Some(ListenerFault {
            listener: listener.name().to_string(),
            delivery: delivery.to_string(),
            message,
            panicked,
        })
    }

    /// Faults collected so far
    #[must_use]
    pub fn faults(&self) -> &[ListenerFault] {
        &self.faults
    }

    /// Take the collected faults, leaving none behind
    pub fn take_faults(&mut self) -> Vec<ListenerFault> {
        std::mem::take(&mut self.faults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FixtureException;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Journal {
        entries: Mutex<Vec<String>>,
    }

    #[derive(Debug)]
    struct Named {
        tag: &'static str,
        journal: Arc<Journal>,
    }

    impl TestRunListener for Named {
        fn reported(&self, event: &ReportEvent) -> ListenerResult {
            self.journal
                .entries
                .lock()
                .unwrap()
                .push(format!("{}:{:?}", self.tag, event.action));
            Ok(())
        }

        fn report_exit(&self, exit: &ExitReport) -> ListenerResult {
            self.journal
                .entries
                .lock()
                .unwrap()
                .push(format!("{}:exit:{}", self.tag, exit.message()));
            Ok(())
        }
    }

    struct Failing;

    impl TestRunListener for Failing {
        fn reported(&self, _event: &ReportEvent) -> ListenerResult {
            Err("disk full".into())
        }
    }

    struct Panicking;

    impl TestRunListener for Panicking {
        fn reported(&self, _event: &ReportEvent) -> ListenerResult {
            panic!("listener exploded");
        }

        fn report_exit(&self, _exit: &ExitReport) -> ListenerResult {
            panic!("exit exploded");
        }
    }

    fn emit_enter(hub: &mut ReporterHub) -> ReportEvent {
        hub.emit(
            &SemanticUnit::case("login"),
            Action::Enter,
            None,
            &Variables::new(),
        )
    }

    mod registration_tests {
        use super::*;

        #[test]
        fn test_add_listener_is_idempotent() {
            let journal = Arc::new(Journal::default());
            let listener: Arc<dyn TestRunListener> = Arc::new(Named {
                tag: "a",
                journal,
            });
            let mut hub = ReporterHub::new();
            assert!(hub.add_listener(listener.clone()));
            assert!(!hub.add_listener(listener));
            assert_eq!(hub.listener_count(), 1);
        }

        #[test]
        fn test_distinct_listeners_both_added() {
            let journal = Arc::new(Journal::default());
            let mut hub = ReporterHub::new();
            hub.add_listener(Arc::new(Named {
                tag: "a",
                journal: journal.clone(),
            }));
            hub.add_listener(Arc::new(Named { tag: "b", journal }));
            assert_eq!(hub.listener_count(), 2);
        }
    }

    mod dispatch_tests {
        use super::*;

        #[test]
        fn test_delivery_in_registration_order() {
            let journal = Arc::new(Journal::default());
            let mut hub = ReporterHub::new();
            for tag in ["first", "second", "third"] {
                hub.add_listener(Arc::new(Named {
                    tag,
                    journal: journal.clone(),
                }));
            }
            emit_enter(&mut hub);
            let entries = journal.entries.lock().unwrap().clone();
            assert_eq!(
                entries,
                vec!["first:Enter", "second:Enter", "third:Enter"]
            );
        }

        #[test]
        fn test_sequence_numbers_increase() {
            let mut hub = ReporterHub::new();
            let first = emit_enter(&mut hub);
            let second = emit_enter(&mut hub);
            assert_eq!(first.sequence, 0);
            assert_eq!(second.sequence, 1);
            assert_eq!(hub.events_reported(), 2);
        }

        #[test]
        fn test_replayed_event_at_max_sequence_saturates() {
            let mut hub = ReporterHub::new();
            let mut event = emit_enter(&mut hub);
            event.sequence = u64::MAX;
            hub.report(&event);
            assert_eq!(hub.events_reported(), u64::MAX);

            let next = emit_enter(&mut hub);
            assert_eq!(next.sequence, u64::MAX);
            assert_eq!(hub.events_reported(), u64::MAX);
        }

        #[test]
        fn test_event_carries_unit_and_label() {
            let mut hub = ReporterHub::new();
            let event = emit_enter(&mut hub);
            assert_eq!(event.message, "login");
            assert_eq!(event.id(), &event.unit.id);
            assert!(event.status.is_none());
        }

        #[test]
        fn test_exit_delivered_to_all() {
            let journal = Arc::new(Journal::default());
            let mut hub = ReporterHub::new();
            hub.add_listener(Arc::new(Named {
                tag: "a",
                journal: journal.clone(),
            }));
            hub.add_listener(Arc::new(Named {
                tag: "b",
                journal: journal.clone(),
            }));
            hub.report_exit(&ExitReport::Fixture(FixtureException::new("gone")));
            let entries = journal.entries.lock().unwrap().clone();
            assert_eq!(entries, vec!["a:exit:gone", "b:exit:gone"]);
            assert_eq!(hub.exits_reported(), 1);
        }
    }

    mod fault_tests {
        use super::*;

        #[test]
        fn test_failing_listener_does_not_block_others() {
            let journal = Arc::new(Journal::default());
            let mut hub = ReporterHub::new();
            hub.add_listener(Arc::new(Failing));
            hub.add_listener(Arc::new(Panicking));
            hub.add_listener(Arc::new(Named {
                tag: "after",
                journal: journal.clone(),
            }));

            emit_enter(&mut hub);
            hub.report_exit(&ExitReport::Fixture(FixtureException::new("x")));

            let entries = journal.entries.lock().unwrap().clone();
            assert_eq!(entries, vec!["after:Enter", "after:exit:x"]);

            let faults = hub.take_faults();
            assert_eq!(faults.len(), 3);
            assert_eq!(faults[0].message, "disk full");
            assert!(!faults[0].panicked);
            assert_eq!(faults[1].message, "listener exploded");
            assert!(faults[1].panicked);
            assert!(faults[2].delivery.starts_with("exit"));
            assert!(hub.faults().is_empty());
        }

        #[test]
        fn test_fault_display() {
            let fault = ListenerFault {
                listener: "Journal".into(),
                delivery: "Enter ID1".into(),
                message: "boom".into(),
                panicked: false,
            };
            assert_eq!(fault.to_string(), "listener 'Journal' failed on Enter ID1: boom");
        }
    }
}
