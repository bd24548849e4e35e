//! Test run orchestration.
//!
//! A [`TestRun`] ties the components together for one run:
//!
//! ```text
//!   enter ─► bind ─► invoke ─► [rows? ─► iteration units] ─► exit ─► leave
//!     │                                                        │
//!  ScopeTracker ◄──────────────── ReporterHub ◄─────────────────┘
//! ```
//!
//! The run owns its scope stack and hub; nothing is shared across runs.
//! Cancellation is observed at every run operation: the interrupted
//! invocation reports at most one exit, every open unit is force-closed
//! with [`Status::Cancelled`] and the caller gets [`EnsayoError::Cancelled`].

use crate::binder::{bind, bind_row, ArgumentMap};
use crate::cancel::{CancelToken, Watchdog};
use crate::config::RunConfig;
use crate::failure::{Failure, Outcome};
use crate::hub::{ListenerFault, ReporterHub, TestRunListener};
use crate::invoker::MethodInvoker;
use crate::iteration::{IterationReport, IterationResult};
use crate::method::{Args, FixtureMethod};
use crate::registry::FixtureRegistry;
use crate::result::{EnsayoError, EnsayoResult};
use crate::scope::{ClosedUnit, ScopeTracker};
use crate::unit::{SemanticUnit, Status, UnitId, Variables};
use crate::value::{Returned, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// One test run
#[derive(Debug)]
pub struct TestRun {
    id: Uuid,
    config: RunConfig,
    registry: Arc<FixtureRegistry>,
    hub: ReporterHub,
    scope: ScopeTracker,
    invoker: MethodInvoker,
    cancel: CancelToken,
    watchdog: Option<Watchdog>,
    started: bool,
    started_at: Instant,
}

impl TestRun {
    /// Create a run over `registry`.
    ///
    /// # Errors
    ///
    /// `Config` if `config` does not validate.
    pub fn new(registry: Arc<FixtureRegistry>, config: RunConfig) -> EnsayoResult<Self> {
        config.validate()?;
        let cancel = CancelToken::new();
        let invoker = MethodInvoker::new(cancel.clone()).with_poll_interval(config.cancel_poll());
        Ok(Self {
            id: Uuid::new_v4(),
            config,
            registry,
            hub: ReporterHub::new(),
            scope: ScopeTracker::new(),
            invoker,
            cancel,
            watchdog: None,
            started: false,
            started_at: Instant::now(),
        })
    }

    /// Create a run with the default configuration
    pub fn with_defaults(registry: Arc<FixtureRegistry>) -> EnsayoResult<Self> {
        Self::new(registry, RunConfig::default())
    }

    /// Run identifier
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration of this run
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Register a listener for the rest of the run
    pub fn add_listener(&mut self, listener: Arc<dyn TestRunListener>) -> bool {
        self.hub.add_listener(listener)
    }

    /// Hand the hub to reportable fixtures and arm the deadline.
    ///
    /// Called implicitly by the first enter or invoke; later calls do
    /// nothing.
    pub fn start(&mut self) -> EnsayoResult<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        self.started_at = Instant::now();

        let registry = Arc::clone(&self.registry);
        for fixture in registry.reportables() {
            Arc::clone(fixture).init_with_reporter(&mut self.hub);
        }
        if let Some(timeout) = self.config.timeout() {
            self.watchdog = Some(Watchdog::start(self.cancel.clone(), timeout)?);
        }
        tracing::info!(
            run_id = %self.id,
            fixtures = registry.count(),
            listeners = self.hub.listener_count(),
            "run started"
        );
        Ok(())
    }

    /// Open a unit and return its id
    pub fn enter(&mut self, unit: SemanticUnit) -> EnsayoResult<UnitId> {
        self.start()?;
        self.ensure_live()?;
        let id = unit.id.clone();
        self.scope
            .enter(unit, &mut self.hub)
            .map_err(|e| self.abort_on_fatal(e))?;
        Ok(id)
    }

    /// Close the innermost unit, which must be `id`
    pub fn leave(&mut self, id: &UnitId, status: Status) -> EnsayoResult<()> {
        self.ensure_live()?;
        self.scope
            .leave(id, status, &mut self.hub)
            .map_err(|e| self.abort_on_fatal(e))
    }

    /// Set a variable on the innermost open unit
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        self.scope.set_variable(name, value)
    }

    /// Variables of the innermost open unit
    #[must_use]
    pub fn variables(&self) -> Option<&Variables> {
        self.scope.current_variables()
    }

    /// Innermost open unit
    #[must_use]
    pub fn current(&self) -> Option<&SemanticUnit> {
        self.scope.current()
    }

    /// Number of open units
    #[must_use]
    pub fn depth(&self) -> usize {
        self.scope.depth()
    }

    /// Resolve, bind and invoke `method` with named raw arguments.
    ///
    /// Binding errors come back as a fixture failure outcome. Only
    /// cancellation is returned as `Err`.
    pub fn invoke(&mut self, method: &str, args: &ArgumentMap) -> EnsayoResult<Outcome> {
        self.call(method, |m| bind(m, args))
    }

    /// Invoke `method` with one produced row as its arguments
    pub fn invoke_row(&mut self, method: &str, row: &Row) -> EnsayoResult<Outcome> {
        self.call(method, |m| bind_row(m, row))
    }

    fn call<F>(&mut self, name: &str, bind_args: F) -> EnsayoResult<Outcome>
    where
        F: FnOnce(&FixtureMethod) -> EnsayoResult<Args>,
    {
        self.start()?;
        self.ensure_live()?;

        let registry = Arc::clone(&self.registry);
        let bound = registry
            .resolve(name)
            .and_then(|method| bind_args(method).map(|args| (method, args)));
        let outcome = match bound {
            Ok((method, args)) => check_return(method, self.invoker.invoke(method, &args)),
            Err(err) if err.is_binding_error() => {
                tracing::debug!(method = name, error = %err, "binding failed");
                Outcome::from(Failure::from(err))
            }
            Err(err) => return Err(err),
        };
        self.settle(outcome)
    }

    /// Report the exit of a finished invocation, then honour cancellation
    fn settle(&mut self, outcome: Outcome) -> EnsayoResult<Outcome> {
        if let Outcome::FixtureFailure(e) = &outcome {
            self.scope.record_variables(e.details.clone());
        }
        if let Some(exit) = outcome.exit() {
            self.hub.report_exit(&exit);
        }
        if self.cancel.is_cancelled() {
            return Err(self.abort_cancelled());
        }
        Ok(outcome)
    }

    /// Report a non-fatal error as a failed invocation and return its status
    fn contain(&mut self, err: EnsayoError) -> Status {
        let outcome = Outcome::from(Failure::from(err));
        if let Some(exit) = outcome.exit() {
            self.hub.report_exit(&exit);
        }
        outcome.status()
    }

    /// Open `unit`, invoke `method` inside it and close it with the outcome
    pub fn run_step(
        &mut self,
        unit: SemanticUnit,
        method: &str,
        args: &ArgumentMap,
    ) -> EnsayoResult<Outcome> {
        let id = self.enter(unit)?;
        let outcome = if self.registry.get(method).is_some_and(FixtureMethod::is_iterable) {
            let err = EnsayoError::UnexpandedRows {
                method: method.to_string(),
            };
            self.settle(Outcome::from(Failure::from(err)))?
        } else {
            self.invoke(method, args)?
        };
        self.leave(&id, outcome.status())?;
        Ok(outcome)
    }

    /// Data-driven step.
    ///
    /// Opens `unit`, invokes `producer` once, materializes its rows and runs
    /// `body` inside one iteration unit per row. The row's values are
    /// recorded as the iteration's variables. The step closes with the
    /// first failing iteration status, or `Ok`.
    pub fn run_iterations<F>(
        &mut self,
        unit: SemanticUnit,
        producer: &str,
        args: &ArgumentMap,
        mut body: F,
    ) -> EnsayoResult<IterationReport>
    where
        F: FnMut(&mut Self, &Row) -> EnsayoResult<Status>,
    {
        let label = unit.label.clone();
        let step = self.enter(unit)?;
        let mut report = IterationReport {
            method: producer.to_string(),
            status: Status::Ok,
            rows_produced: 0,
            iterations: Vec::new(),
        };
        if self.registry.get(producer).is_some_and(|m| !m.is_iterable()) {
            let err = EnsayoError::NotIterable {
                method: producer.to_string(),
            };
            report.status = self.settle(Outcome::from(Failure::from(err)))?.status();
            self.leave(&step, report.status)?;
            return Ok(report);
        }

        let outcome = self.invoke(producer, args)?;
        report.status = outcome.status();
        if !outcome.is_success() {
            self.leave(&step, report.status)?;
            return Ok(report);
        }

        let rows = match self.produce_rows(producer, outcome) {
            Ok(rows) => rows,
            Err(err) => {
                report.status = self.contain(err);
                self.leave(&step, report.status)?;
                return Ok(report);
            }
        };
        report.rows_produced = rows.len();
        self.scope.set_variable("rows", rows.len().to_string());

        let expander = self.config.expander();
        let iterations = &mut report.iterations;
        let statuses = expander.expand(&rows, |index, row| {
            let unit = SemanticUnit::iteration(format!("{label} [{}]", index + 1));
            let id = self.enter(unit)?;
            self.scope.record_variables(row.variables());
            let status = match body(self, row) {
                Ok(status) => status,
                Err(err) if err.is_fatal() => return Err(self.abort_on_fatal(err)),
                Err(err) => self.contain(err),
            };
            self.leave(&id, status)?;
            iterations.push(IterationResult {
                index,
                unit: id,
                status,
            });
            Ok(status)
        })?;

        report.status = statuses
            .iter()
            .copied()
            .find(|s| !s.is_ok())
            .unwrap_or(Status::Ok);
        self.leave(&step, report.status)?;
        tracing::info!(
            method = producer,
            rows = report.rows_produced,
            passed = report.passed_count(),
            failed = report.failed_count(),
            skipped = report.skipped_count(),
            "iterations complete"
        );
        Ok(report)
    }

    /// Data-driven step binding each row to `consumer`
    pub fn run_data_driven(
        &mut self,
        unit: SemanticUnit,
        producer: &str,
        args: &ArgumentMap,
        consumer: &str,
    ) -> EnsayoResult<IterationReport> {
        self.run_iterations(unit, producer, args, |run, row| {
            Ok(run.invoke_row(consumer, row)?.status())
        })
    }

    fn produce_rows(&self, producer: &str, outcome: Outcome) -> EnsayoResult<Vec<Row>> {
        match outcome.into_returned() {
            Some(Returned::Rows(source)) => self.config.expander().materialize(producer, source),
            _ => Err(EnsayoError::NotIterable {
                method: producer.to_string(),
            }),
        }
    }

    /// Request cancellation. Returns `false` if already cancelled.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.cancel.cancel(reason)
    }

    /// Token to cancel this run from another thread
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Check if cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Listener faults collected so far
    #[must_use]
    pub fn faults(&self) -> &[ListenerFault] {
        self.hub.faults()
    }

    /// `Cancelled` on the first observation of cancellation, `Protocol` once
    /// the run is terminated.
    fn ensure_live(&mut self) -> EnsayoResult<()> {
        if self.scope.is_terminated() {
            return Err(EnsayoError::protocol(format!(
                "run {} is terminated",
                self.id
            )));
        }
        if self.cancel.is_cancelled() {
            return Err(self.abort_cancelled());
        }
        Ok(())
    }

    fn abort_cancelled(&mut self) -> EnsayoError {
        let reason = self
            .cancel
            .reason()
            .unwrap_or_else(|| "cancelled".to_string());
        let closed = self.scope.force_close_all(Status::Cancelled, &mut self.hub);
        if !self.scope.is_terminated() {
            tracing::warn!(run_id = %self.id, %reason, closed, "run cancelled");
            self.scope.terminate();
        }
        EnsayoError::Cancelled { reason, closed }
    }

    fn abort_on_fatal(&mut self, err: EnsayoError) -> EnsayoError {
        if err.is_fatal() && !self.scope.is_terminated() {
            let closed = self.scope.force_close_all(Status::Cancelled, &mut self.hub);
            self.scope.terminate();
            tracing::error!(run_id = %self.id, error = %err, closed, "run aborted");
        }
        err
    }

    /// End the run, closing anything still open, and summarize it
    pub fn finish(mut self) -> RunSummary {
        let open = self.scope.force_close_all(Status::Cancelled, &mut self.hub);
        if open > 0 {
            tracing::warn!(run_id = %self.id, open, "run finished with open units");
        }
        self.scope.terminate();
        drop(self.watchdog.take());

        let summary = RunSummary::collect(
            self.id,
            self.scope.closed(),
            &mut self.hub,
            self.cancel.reason(),
            self.started_at.elapsed().as_millis() as u64,
        );
        tracing::info!(
            run_id = %self.id,
            units = summary.units_closed,
            failures = summary.failure_count(),
            cancelled = summary.cancelled,
            "run finished"
        );
        summary
    }
}

/// Contain a successful result whose shape differs from the declaration
fn check_return(method: &FixtureMethod, outcome: Outcome) -> Outcome {
    match &outcome {
        Outcome::Success(returned) if returned.shape() != method.returns() => {
            let err = EnsayoError::UnexpectedReturn {
                method: method.name().to_string(),
                declared: method.returns(),
                returned: returned.shape(),
            };
            tracing::debug!(method = method.name(), error = %err, "return shape mismatch");
            Outcome::from(Failure::from(err))
        }
        _ => outcome,
    }
}

impl Drop for TestRun {
    fn drop(&mut self) {
        // Never leave an ENTER unmatched, even on early return or panic
        self.scope.force_close_all(Status::Cancelled, &mut self.hub);
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run identifier
    pub run_id: Uuid,
    /// Total units closed
    pub units_closed: usize,
    /// Units closed `Ok`
    pub ok: usize,
    /// Units closed with a fixture failure
    pub fixture_failures: usize,
    /// Units closed with an uncaught failure
    pub uncaught_failures: usize,
    /// Units closed with an assertion failure
    pub assertion_failures: usize,
    /// Units force-closed
    pub cancelled: usize,
    /// Enter/leave events delivered
    pub events_reported: u64,
    /// Exit notifications delivered
    pub exits_reported: u64,
    /// Listener failures collected during the run
    pub listener_faults: Vec<ListenerFault>,
    /// Cancellation reason, if the run was cancelled
    pub cancel_reason: Option<String>,
    /// Wall time since start
    pub duration_ms: u64,
}

impl RunSummary {
    fn collect(
        run_id: Uuid,
        closed: &[ClosedUnit],
        hub: &mut ReporterHub,
        cancel_reason: Option<String>,
        duration_ms: u64,
    ) -> Self {
        let count = |status: Status| closed.iter().filter(|c| c.status == status).count();
        Self {
            run_id,
            units_closed: closed.len(),
            ok: count(Status::Ok),
            fixture_failures: count(Status::FixtureFailure),
            uncaught_failures: count(Status::UncaughtFailure),
            assertion_failures: count(Status::AssertionFailure),
            cancelled: count(Status::Cancelled),
            events_reported: hub.events_reported(),
            exits_reported: hub.exits_reported(),
            listener_faults: hub.take_faults(),
            cancel_reason,
            duration_ms,
        }
    }

    /// Units closed with any failure status
    #[must_use]
    pub const fn failure_count(&self) -> usize {
        self.fixture_failures + self.uncaught_failures + self.assertion_failures
    }

    /// Check if every unit closed `Ok`
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.ok == self.units_closed && self.cancel_reason.is_none()
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> EnsayoResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
