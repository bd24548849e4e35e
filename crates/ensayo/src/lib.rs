//! Ensayo: fixture invocation and test-run reporting engine
//!
//! Ensayo (Spanish: "rehearsal") runs the fixture methods behind
//! interaction-script tests and reports what happened to listeners.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          TestRun                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌─────────────┐   │
//! │  │  Scope   │──►│  Binder  │──►│ Invoker  │──►│  Iteration  │   │
//! │  │ Tracker  │   │          │   │          │   │  Expander   │   │
//! │  └────┬─────┘   └──────────┘   └────┬─────┘   └──────┬──────┘   │
//! │       │ enter/leave                 │ exit           │ per row  │
//! │       ▼                             ▼                ▼          │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │                 ReporterHub ─► listeners                  │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Guarantees:
//! - every ENTER is matched by exactly one LEAVE, also on cancellation;
//! - every failed invocation produces exactly one exit notification;
//! - a force-closed unit keeps the variables captured before the
//!   interruption.

#![warn(missing_docs)]

// Lets `#[derive(FixtureEnum)]` expand to `::ensayo::...` inside this crate
extern crate self as ensayo;

mod binder;
mod cancel;
mod config;
mod failure;
mod hub;
mod invoker;
mod iteration;
mod listeners;
/// Tracing subscriber setup
pub mod logging;
mod method;
mod registry;
mod result;
mod run;
mod scope;
mod unit;
mod value;

pub use binder::{bind, bind_params, bind_row, bind_row_params, coerce, convert_raw, ArgumentMap};
pub use cancel::{CancelToken, Watchdog};
pub use config::{LogConfig, RunConfig};
pub use failure::{
    AssertionFailure, ExitReport, Failure, FixtureException, FixtureResult, Outcome,
    UncaughtError, UncaughtKind,
};
pub use hub::{
    ListenerError, ListenerFault, ListenerResult, ReportEvent, ReporterHub, TestRunListener,
    TestRunReportable,
};
pub use invoker::{MethodInvoker, DEFAULT_CANCEL_POLL_MS};
pub use iteration::{IterationExpander, IterationReport, IterationResult, DEFAULT_MAX_ITERATIONS};
pub use listeners::{RecordingListener, TracingListener};
pub use logging::init_logging;
pub use method::{
    Args, EnumSpec, FixtureEnum, FixtureMethod, FixtureMethodBuilder, Invocation, ParamSpec,
    ParamType, ReturnShape,
};
pub use registry::FixtureRegistry;
pub use result::{EnsayoError, EnsayoResult};
pub use run::{RunSummary, TestRun};
pub use scope::{ClosedUnit, ScopeTracker};
pub use unit::{Action, SemanticUnit, Status, UnitId, UnitKind, Variables};
pub use value::{Returned, Row, RowSource, Value};

/// Derive [`FixtureEnum`] for a fieldless enum
#[cfg(feature = "derive")]
pub use ensayo_derive::FixtureEnum;

/// Prelude for fixture authors
pub mod prelude {
    pub use super::{
        ArgumentMap, AssertionFailure, EnsayoError, EnsayoResult, Failure, FixtureEnum,
        FixtureException, FixtureMethod, FixtureRegistry, FixtureResult, Invocation, ListenerResult,
        ParamType, RecordingListener, ReportEvent, ReporterHub, ReturnShape, Returned, Row,
        RunConfig, SemanticUnit, Status, TestRun, TestRunListener, TestRunReportable, Value,
    };
}
