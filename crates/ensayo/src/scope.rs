//! Scope tracker: the stack of open semantic units.
//!
//! ```text
//!   enter(suite) ─► enter(case) ─► enter(step) ─► leave(step) ─► ...
//!        │              │              │
//!        ▼              ▼              ▼
//!   [suite]      [suite, case]  [suite, case, step]
//! ```
//!
//! Invariants:
//! - a leave always closes the innermost open unit;
//! - every entered unit is left exactly once, through [`ScopeTracker::leave`]
//!   or [`ScopeTracker::force_close_all`];
//! - a closed unit id is never entered again;
//! - a forced leave carries the last variables recorded for that unit.

use crate::hub::ReporterHub;
use crate::result::{EnsayoError, EnsayoResult};
use crate::unit::{Action, SemanticUnit, Status, UnitId, Variables};
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct OpenUnit {
    unit: SemanticUnit,
    variables: Variables,
    entered_at: Instant,
}

/// A unit that has been closed, as remembered by the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedUnit {
    /// The unit
    pub unit: SemanticUnit,
    /// Status it was closed with
    pub status: Status,
    /// Time between enter and leave
    pub duration: Duration,
}

/// Stack of open units for one run
#[derive(Debug, Default)]
pub struct ScopeTracker {
    stack: Vec<OpenUnit>,
    closed_ids: HashSet<UnitId>,
    closed: Vec<ClosedUnit>,
    terminated: bool,
}

impl ScopeTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `unit` and emit an enter event.
    ///
    /// # Errors
    ///
    /// `Protocol` if the run is terminated, or the unit id is already open
    /// or was closed before.
    pub fn enter(&mut self, unit: SemanticUnit, hub: &mut ReporterHub) -> EnsayoResult<()> {
        if self.terminated {
            return Err(EnsayoError::protocol(format!(
                "cannot enter {} '{}' after the run terminated",
                unit.kind, unit.label
            )));
        }
        if self.closed_ids.contains(&unit.id) {
            return Err(EnsayoError::protocol(format!(
                "unit {} was already closed and cannot be re-opened",
                unit.id
            )));
        }
        if self.stack.iter().any(|open| open.unit.id == unit.id) {
            return Err(EnsayoError::protocol(format!(
                "unit {} is already open",
                unit.id
            )));
        }

        tracing::debug!(kind = %unit.kind, label = %unit.label, id = %unit.id, depth = self.stack.len(), "enter");
        // Nested units start from the variables visible in their parent
        let variables = self.current_variables().cloned().unwrap_or_default();
        hub.emit(&unit, Action::Enter, None, &variables);
        self.stack.push(OpenUnit {
            unit,
            variables,
            entered_at: Instant::now(),
        });
        Ok(())
    }

    /// Close the innermost unit, which must be `id`, and emit a leave event.
    ///
    /// # Errors
    ///
    /// `Protocol` if the stack is empty or `id` is not the innermost unit.
    pub fn leave(&mut self, id: &UnitId, status: Status, hub: &mut ReporterHub) -> EnsayoResult<()> {
        match self.stack.last() {
            None => {
                return Err(EnsayoError::protocol(format!(
                    "cannot leave {id}: no unit is open"
                )))
            }
            Some(top) if &top.unit.id != id => {
                return Err(EnsayoError::protocol(format!(
                    "cannot leave {id}: innermost open unit is {} '{}'",
                    top.unit.id, top.unit.label
                )))
            }
            Some(_) => {}
        }
        self.pop_and_report(status, hub);
        Ok(())
    }

    /// Close every open unit, innermost first, with `status`.
    ///
    /// Returns the number of units closed.
    pub fn force_close_all(&mut self, status: Status, hub: &mut ReporterHub) -> usize {
        let count = self.stack.len();
        if count > 0 {
            tracing::warn!(count, %status, "force-closing open units");
        }
        while !self.stack.is_empty() {
            self.pop_and_report(status, hub);
        }
        count
    }

    fn pop_and_report(&mut self, status: Status, hub: &mut ReporterHub) {
        let Some(open) = self.stack.pop() else {
            return;
        };
        let duration = open.entered_at.elapsed();
        tracing::debug!(id = %open.unit.id, %status, ?duration, "leave");
        hub.emit(&open.unit, Action::Leave, Some(status), &open.variables);
        self.closed_ids.insert(open.unit.id.clone());
        self.closed.push(ClosedUnit {
            unit: open.unit,
            status,
            duration,
        });
    }

    /// Set a variable on the innermost open unit.
    ///
    /// Returns `false` if no unit is open.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        match self.stack.last_mut() {
            Some(top) => {
                top.variables.insert(name.into(), value.into());
                true
            }
            None => false,
        }
    }

    /// Merge several variables into the innermost open unit
    pub fn record_variables<I, K, V>(&mut self, variables: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        match self.stack.last_mut() {
            Some(top) => {
                top.variables
                    .extend(variables.into_iter().map(|(k, v)| (k.into(), v.into())));
                true
            }
            None => false,
        }
    }

    /// Variables of the innermost open unit
    #[must_use]
    pub fn current_variables(&self) -> Option<&Variables> {
        self.stack.last().map(|open| &open.variables)
    }

    /// Innermost open unit
    #[must_use]
    pub fn current(&self) -> Option<&SemanticUnit> {
        self.stack.last().map(|open| &open.unit)
    }

    /// Open units from outermost to innermost
    pub fn open_units(&self) -> impl Iterator<Item = &SemanticUnit> {
        self.stack.iter().map(|open| &open.unit)
    }

    /// Number of open units
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Check if no unit is open
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Units closed so far, in closing order
    #[must_use]
    pub fn closed(&self) -> &[ClosedUnit] {
        &self.closed
    }

    /// Number of units closed so far
    #[must_use]
    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }

    /// Refuse further enters
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    /// Check if the tracker has been terminated
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.terminated
    }
}
