//! Iteration expander for data-driven steps.
//!
//! A row-producing fixture method is invoked once; its rows are
//! materialized eagerly (bounded by `max_iterations`) and each row then
//! drives one iteration unit. Iterations are isolated: a failing row does
//! not stop its siblings unless fail-fast is enabled.

use crate::result::{EnsayoError, EnsayoResult};
use crate::unit::{Status, UnitId};
use crate::value::{Row, RowSource};
use serde::{Deserialize, Serialize};

/// Default upper bound on rows produced by one method
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/// Materializes row sources and drives per-row iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationExpander {
    max_iterations: usize,
    fail_fast: bool,
}

impl Default for IterationExpander {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            fail_fast: false,
        }
    }
}

impl IterationExpander {
    /// Create an expander with the given guard and failure policy
    #[must_use]
    pub const fn new(max_iterations: usize, fail_fast: bool) -> Self {
        Self {
            max_iterations,
            fail_fast,
        }
    }

    /// Maximum rows accepted from one producer
    #[must_use]
    pub const fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Whether iteration stops at the first failing row
    #[must_use]
    pub const fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Fully enumerate `rows`.
    ///
    /// # Errors
    ///
    /// `NonTerminatingIteration` if more than `max_iterations` rows are
    /// produced.
    pub fn materialize(&self, method: &str, rows: RowSource) -> EnsayoResult<Vec<Row>> {
        let collected: Vec<Row> = rows.take(self.max_iterations.saturating_add(1)).collect();
        if collected.len() > self.max_iterations {
            return Err(EnsayoError::NonTerminatingIteration {
                method: method.to_string(),
                limit: self.max_iterations,
            });
        }
        Ok(collected)
    }

    /// Run `each` once per row, in order.
    ///
    /// Stops early only on a fatal error, or on the first non-`Ok` status
    /// when fail-fast is enabled. Returns the statuses of the rows that ran.
    pub fn expand<F>(&self, rows: &[Row], mut each: F) -> EnsayoResult<Vec<Status>>
    where
        F: FnMut(usize, &Row) -> EnsayoResult<Status>,
    {
        let mut statuses = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let status = each(index, row)?;
            statuses.push(status);
            if self.fail_fast && !status.is_ok() {
                tracing::info!(index, %status, remaining = rows.len() - index - 1, "fail-fast: skipping remaining rows");
                break;
            }
        }
        Ok(statuses)
    }
}

/// Outcome of one iteration unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationResult {
    /// Row position
    pub index: usize,
    /// Iteration unit id
    pub unit: UnitId,
    /// Status the iteration closed with
    pub status: Status,
}

/// Outcome of a data-driven step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationReport {
    /// Producing method name
    pub method: String,
    /// Status the producing step closed with
    pub status: Status,
    /// Rows produced (0 if production failed)
    pub rows_produced: usize,
    /// One entry per iteration that ran
    pub iterations: Vec<IterationResult>,
}

impl IterationReport {
    /// Number of iterations that closed `Ok`
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.iterations.iter().filter(|i| i.status.is_ok()).count()
    }

    /// Number of iterations that failed
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.iterations
            .iter()
            .filter(|i| i.status.is_failure())
            .count()
    }

    /// Rows that never ran (fail-fast)
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.rows_produced.saturating_sub(self.iterations.len())
    }

    /// Check if production and every iteration succeeded
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.status.is_ok() && self.iterations.iter().all(|i| i.status.is_ok())
    }
}
