//! Run cancellation.
//!
//! A [`CancelToken`] is shared between a run and anything that may stop it
//! (a deadline [`Watchdog`], another thread, a signal handler). Fixture code
//! observes it at its suspension points.

use crate::failure::{Failure, FixtureResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
}

/// Cloneable, thread-safe cancellation flag with a reason
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<TokenState>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token. Returns `false` if it was already cancelled, in
    /// which case the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let mut slot = self
            .state
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.state.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        *slot = Some(reason.into());
        self.state.cancelled.store(true, Ordering::SeqCst);
        true
    }

    /// Check if the token has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Reason given by the first `cancel` call
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.state
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Suspension point: fail with an interruption if cancelled.
    pub fn checkpoint(&self) -> FixtureResult<()> {
        if self.is_cancelled() {
            let reason = self.reason().unwrap_or_else(|| "cancelled".to_string());
            return Err(Failure::interrupted(reason));
        }
        Ok(())
    }

    /// Sleep for `duration`, waking every `poll` to observe cancellation.
    pub fn sleep(&self, duration: Duration, poll: Duration) -> FixtureResult<()> {
        let deadline = Instant::now() + duration;
        let poll = poll.max(Duration::from_millis(1));
        loop {
            self.checkpoint()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(poll.min(deadline - now));
        }
    }
}

/// Cancels a token once a deadline passes, unless dropped first.
#[derive(Debug)]
pub struct Watchdog {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Start a watchdog thread for `timeout`
    pub fn start(token: CancelToken, timeout: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("ensayo-watchdog".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(timeout) {
                    let reason = format!("run timed out after {}ms", timeout.as_millis());
                    tracing::warn!(%reason, "cancelling run");
                    token.cancel(reason);
                }
            })?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        // Dropping the sender wakes the thread with `Disconnected`
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
