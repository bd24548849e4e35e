//! Failure classes of a fixture invocation and their classification.
//!
//! Fixture code signals failure through [`Failure`], which has three
//! disjoint classes. The invoker turns every call into exactly one
//! [`Outcome`]; failed outcomes map 1:1 to an [`ExitReport`].

use crate::result::EnsayoError;
use crate::unit::{Status, Variables};
use crate::value::Returned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type returned by fixture method bodies
pub type FixtureResult<T> = Result<T, Failure>;

/// Expected, domain level failure raised by fixture code
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct FixtureException {
    /// Error message
    pub message: String,
    /// Underlying cause, if any
    pub cause: Option<String>,
    /// Context captured by the fixture
    pub details: Variables,
}

impl FixtureException {
    /// Create a fixture exception
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            details: Variables::new(),
        }
    }

    /// Attach an underlying cause
    #[must_use]
    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Attach a context entry
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl From<EnsayoError> for FixtureException {
    fn from(err: EnsayoError) -> Self {
        Self::new(err.to_string())
    }
}

/// Verification mismatch raised by fixture code
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct AssertionFailure {
    /// Error message
    pub message: String,
    /// Expected value, if known
    pub expected: Option<String>,
    /// Actual value, if known
    pub actual: Option<String>,
}

impl AssertionFailure {
    /// Create an assertion failure
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    /// Create an assertion failure for two differing values
    #[must_use]
    pub fn mismatch(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        let expected = expected.to_string();
        let actual = actual.to_string();
        Self {
            message: format!("expected '{expected}', got '{actual}'"),
            expected: Some(expected),
            actual: Some(actual),
        }
    }
}

/// How an uncaught failure came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UncaughtKind {
    /// An error value the fixture did not classify
    Error,
    /// The fixture panicked
    Panic,
    /// The run was cancelled while the fixture was executing
    Interrupted,
}

/// Any failure that is neither a fixture exception nor an assertion
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct UncaughtError {
    /// Origin of the failure
    pub kind: UncaughtKind,
    /// Error message
    pub message: String,
}

impl UncaughtError {
    /// Create an uncaught error
    #[must_use]
    pub fn new(kind: UncaughtKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Check if this failure is an interruption
    #[must_use]
    pub fn is_interruption(&self) -> bool {
        self.kind == UncaughtKind::Interrupted
    }
}

/// Error value of a fixture method body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Expected domain error
    Fixture(FixtureException),
    /// Verification mismatch
    Assertion(AssertionFailure),
    /// Anything else
    Uncaught(UncaughtError),
}

impl Failure {
    /// Create a fixture failure
    #[must_use]
    pub fn fixture(message: impl Into<String>) -> Self {
        Self::Fixture(FixtureException::new(message))
    }

    /// Create an assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(AssertionFailure::new(message))
    }

    /// Wrap any unclassified error
    #[must_use]
    pub fn uncaught(err: impl fmt::Display) -> Self {
        Self::Uncaught(UncaughtError::new(UncaughtKind::Error, err.to_string()))
    }

    /// Create an interruption failure
    #[must_use]
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self::Uncaught(UncaughtError::new(UncaughtKind::Interrupted, reason))
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixture(e) => write!(f, "fixture failure: {e}"),
            Self::Assertion(e) => write!(f, "assertion failure: {e}"),
            Self::Uncaught(e) => write!(f, "uncaught failure: {e}"),
        }
    }
}

impl From<FixtureException> for Failure {
    fn from(e: FixtureException) -> Self {
        Self::Fixture(e)
    }
}

impl From<AssertionFailure> for Failure {
    fn from(e: AssertionFailure) -> Self {
        Self::Assertion(e)
    }
}

impl From<UncaughtError> for Failure {
    fn from(e: UncaughtError) -> Self {
        Self::Uncaught(e)
    }
}

impl From<std::io::Error> for Failure {
    fn from(e: std::io::Error) -> Self {
        Self::uncaught(e)
    }
}

impl From<EnsayoError> for Failure {
    fn from(e: EnsayoError) -> Self {
        if e.is_binding_error() {
            Self::Fixture(e.into())
        } else {
            Self::uncaught(e)
        }
    }
}

/// Classified result of exactly one fixture invocation
#[derive(Debug)]
pub enum Outcome {
    /// Method returned normally
    Success(Returned),
    /// Fixture signalled an expected domain error
    FixtureFailure(FixtureException),
    /// Unexpected error, panic or interruption
    UncaughtFailure(UncaughtError),
    /// Verification mismatch
    AssertionFailure(AssertionFailure),
}

impl Outcome {
    /// Status to close the surrounding unit with
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::Success(_) => Status::Ok,
            Self::FixtureFailure(_) => Status::FixtureFailure,
            Self::UncaughtFailure(_) => Status::UncaughtFailure,
            Self::AssertionFailure(_) => Status::AssertionFailure,
        }
    }

    /// Check if the invocation succeeded
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Check if the invocation was interrupted by cancellation
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::UncaughtFailure(e) if e.is_interruption())
    }

    /// Exit notification for a failed invocation, `None` on success
    #[must_use]
    pub fn exit(&self) -> Option<ExitReport> {
        match self {
            Self::Success(_) => None,
            Self::FixtureFailure(e) => Some(ExitReport::Fixture(e.clone())),
            Self::UncaughtFailure(e) => Some(ExitReport::Exception(e.clone())),
            Self::AssertionFailure(e) => Some(ExitReport::Assertion(e.clone())),
        }
    }

    /// Consume the outcome, keeping the returned value on success
    #[must_use]
    pub fn into_returned(self) -> Option<Returned> {
        match self {
            Self::Success(returned) => Some(returned),
            _ => None,
        }
    }
}

impl From<Failure> for Outcome {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Fixture(e) => Self::FixtureFailure(e),
            Failure::Assertion(e) => Self::AssertionFailure(e),
            Failure::Uncaught(e) => Self::UncaughtFailure(e),
        }
    }
}

/// The three mutually exclusive exit notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReport {
    /// A fixture exception ended the invocation
    Fixture(FixtureException),
    /// An uncaught error ended the invocation
    Exception(UncaughtError),
    /// An assertion ended the invocation
    Assertion(AssertionFailure),
}

impl ExitReport {
    /// Status matching this exit
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::Fixture(_) => Status::FixtureFailure,
            Self::Exception(_) => Status::UncaughtFailure,
            Self::Assertion(_) => Status::AssertionFailure,
        }
    }

    /// Failure message
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Fixture(e) => &e.message,
            Self::Exception(e) => &e.message,
            Self::Assertion(e) => &e.message,
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
