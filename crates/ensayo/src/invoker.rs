//! Method invoker.
//!
//! Runs one bound fixture call exactly once and classifies the result into
//! a single [`Outcome`]. Nothing raised by fixture code, panics included,
//! crosses this boundary.

use crate::cancel::CancelToken;
use crate::failure::{panic_message, Outcome, UncaughtError, UncaughtKind};
use crate::method::{Args, FixtureMethod, Invocation};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Default interval at which interruptible sleeps observe cancellation
pub const DEFAULT_CANCEL_POLL_MS: u64 = 50;

/// Invokes fixture methods on behalf of one run
#[derive(Debug, Clone)]
pub struct MethodInvoker {
    cancel: CancelToken,
    poll: Duration,
}

impl Default for MethodInvoker {
    fn default() -> Self {
        Self::new(CancelToken::new())
    }
}

impl MethodInvoker {
    /// Create an invoker observing `cancel`
    #[must_use]
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            poll: Duration::from_millis(DEFAULT_CANCEL_POLL_MS),
        }
    }

    /// Set the cancellation poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Token observed by invoked fixtures
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Call `method` once with `args`.
    ///
    /// A call that starts after cancellation is not run at all and is
    /// reported as an interruption.
    pub fn invoke(&self, method: &FixtureMethod, args: &Args) -> Outcome {
        if let Err(failure) = self.cancel.checkpoint() {
            return failure.into();
        }

        let started = Instant::now();
        let invocation = Invocation::new(method.name(), args, &self.cancel, self.poll);
        let outcome = match catch_unwind(AssertUnwindSafe(|| method.call(&invocation))) {
            Ok(Ok(returned)) => Outcome::Success(returned),
            Ok(Err(failure)) => failure.into(),
            Err(payload) => Outcome::UncaughtFailure(UncaughtError::new(
                UncaughtKind::Panic,
                panic_message(payload.as_ref()),
            )),
        };

        tracing::debug!(
            method = method.name(),
            status = %outcome.status(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "invoked fixture method"
        );
        outcome
    }
}
