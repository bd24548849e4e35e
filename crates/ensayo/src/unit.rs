//! Semantic units, actions and exit statuses.
//!
//! A semantic unit is one named scope of the execution tree (suite, case,
//! step, iteration...). Units are opened with [`Action::Enter`] and closed
//! exactly once with [`Action::Leave`] carrying a [`Status`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Name to value mapping threaded through report events.
pub type Variables = BTreeMap<String, String>;

/// Kind of semantic unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    /// A group of test cases
    Suite,
    /// A single test case
    Case,
    /// Setup block of a case
    Setup,
    /// Cleanup block of a case
    Cleanup,
    /// Specification step (the human readable step text)
    SpecificationStep,
    /// Component interaction block
    Component,
    /// Macro call
    Macro,
    /// Single fixture call
    Step,
    /// One row of a data-driven step
    Iteration,
}

impl UnitKind {
    /// Upper-case name as seen by listeners
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Suite => "SUITE",
            Self::Case => "TEST",
            Self::Setup => "SETUP",
            Self::Cleanup => "CLEANUP",
            Self::SpecificationStep => "SPECIFICATION_STEP",
            Self::Component => "COMPONENT",
            Self::Macro => "MACRO",
            Self::Step => "STEP",
            Self::Iteration => "ITERATION",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of a semantic unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    /// Wrap an existing identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("ID{}", Uuid::new_v4().simple()))
    }

    /// Identifier as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UnitId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A named scope in the execution tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticUnit {
    /// Unit kind
    pub kind: UnitKind,
    /// Display label
    pub label: String,
    /// Stable identifier
    pub id: UnitId,
}

impl SemanticUnit {
    /// Create a unit with a generated identifier
    #[must_use]
    pub fn new(kind: UnitKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            id: UnitId::generate(),
        }
    }

    /// Replace the generated identifier
    #[must_use]
    pub fn with_id(mut self, id: impl Into<UnitId>) -> Self {
        self.id = id.into();
        self
    }

    /// Create a suite unit
    #[must_use]
    pub fn suite(label: impl Into<String>) -> Self {
        Self::new(UnitKind::Suite, label)
    }

    /// Create a test case unit
    #[must_use]
    pub fn case(label: impl Into<String>) -> Self {
        Self::new(UnitKind::Case, label)
    }

    /// Create a step unit
    #[must_use]
    pub fn step(label: impl Into<String>) -> Self {
        Self::new(UnitKind::Step, label)
    }

    /// Create an iteration unit
    #[must_use]
    pub fn iteration(label: impl Into<String>) -> Self {
        Self::new(UnitKind::Iteration, label)
    }
}

/// Action applied to a semantic unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Unit opened
    Enter,
    /// Unit closed
    Leave,
}

/// Terminal outcome attached to a leave action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Completed normally
    Ok,
    /// Fixture signalled an expected domain error
    FixtureFailure,
    /// Unexpected error, panic or interruption
    UncaughtFailure,
    /// Verification mismatch
    AssertionFailure,
    /// Force-closed without a regular outcome
    Cancelled,
}

impl Status {
    /// Check if status is passing
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Check if status is a failure (cancellation excluded)
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::FixtureFailure | Self::UncaughtFailure | Self::AssertionFailure
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::FixtureFailure => "FIXTURE_FAILURE",
            Self::UncaughtFailure => "UNCAUGHT_FAILURE",
            Self::AssertionFailure => "ASSERTION_FAILURE",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = SemanticUnit::case("login");
        let b = SemanticUnit::case("login");
        assert_ne!(a.id, b.id);
        assert!(a.id.as_str().starts_with("ID"));
    }

    #[test]
    fn test_with_id_overrides() {
        let unit = SemanticUnit::step("click").with_id("IDstep1");
        assert_eq!(unit.id.as_str(), "IDstep1");
        assert_eq!(unit.kind, UnitKind::Step);
        assert_eq!(UnitId::from(String::from("IDstep1")), UnitId::from("IDstep1"));
    }

    #[test]
    fn test_status_classes() {
        assert!(Status::Ok.is_ok());
        assert!(Status::AssertionFailure.is_failure());
        assert!(!Status::Cancelled.is_failure());
        assert!(!Status::Cancelled.is_ok());
        assert_eq!(Status::FixtureFailure.to_string(), "FIXTURE_FAILURE");
    }

    #[test]
    fn test_unit_serializes_kind_and_id() {
        let unit = SemanticUnit::suite("smoke").with_id("IDs");
        let json = serde_json::to_string(&unit).unwrap();
        assert!(json.contains("\"Suite\""));
        assert!(json.contains("\"IDs\""));
    }
}
