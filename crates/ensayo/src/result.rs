//! Result and error types for Ensayo.

use crate::method::ReturnShape;
use thiserror::Error;

/// Result type for Ensayo operations
pub type EnsayoResult<T> = Result<T, EnsayoError>;

/// Errors that can occur in Ensayo
///
/// Binding errors are contained at the unit boundary and reported as a
/// fixture failure. Only [`EnsayoError::Protocol`] and
/// [`EnsayoError::Cancelled`] terminate a run.
#[derive(Debug, Error)]
pub enum EnsayoError {
    /// Enter/leave called out of order, or after the run terminated
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message
        message: String,
    },

    /// A required parameter had no value
    #[error("Missing argument '{parameter}' for fixture method '{method}'")]
    MissingArgument {
        /// Fixture method name
        method: String,
        /// Parameter name
        parameter: String,
    },

    /// A string could not be resolved to any variant of an enum parameter
    #[error("Cannot resolve '{value}' for parameter '{parameter}' to {type_name} (expected one of: {expected})")]
    UnresolvedEnumValue {
        /// Parameter name
        parameter: String,
        /// Enum type name
        type_name: String,
        /// Value that failed to resolve
        value: String,
        /// Comma separated list of accepted variants
        expected: String,
    },

    /// A row could be bound neither positionally nor by name
    #[error("Row shape does not match fixture method '{method}': {message}")]
    AmbiguousRowShape {
        /// Fixture method name
        method: String,
        /// Error message
        message: String,
    },

    /// A raw value could not be converted to the declared primitive type
    #[error("Invalid value '{value}' for parameter '{parameter}': expected {expected}")]
    InvalidArgument {
        /// Parameter name
        parameter: String,
        /// Raw value
        value: String,
        /// Expected type
        expected: String,
    },

    /// A row producer exceeded the configured iteration limit
    #[error("Fixture method '{method}' produced more than {limit} rows")]
    NonTerminatingIteration {
        /// Fixture method name
        method: String,
        /// Configured maximum
        limit: usize,
    },

    /// A method used as a row producer returned something else
    #[error("Fixture method '{method}' did not return rows")]
    NotIterable {
        /// Fixture method name
        method: String,
    },

    /// A method returned a different shape than it declared
    #[error("Fixture method '{method}' declares a {declared} return but returned {returned}")]
    UnexpectedReturn {
        /// Fixture method name
        method: String,
        /// Declared shape
        declared: ReturnShape,
        /// Shape actually returned
        returned: ReturnShape,
    },

    /// A row producer was run as a plain step, which would discard its rows
    #[error("Fixture method '{method}' returns rows and must run as a data-driven step")]
    UnexpandedRows {
        /// Fixture method name
        method: String,
    },

    /// No fixture method registered under that name
    #[error("Unknown fixture method '{name}'")]
    UnknownMethod {
        /// Requested method name
        name: String,
    },

    /// Two parameters of one method share a name
    #[error("Duplicate parameter '{parameter}' in fixture method '{method}'")]
    DuplicateParameter {
        /// Fixture method name
        method: String,
        /// Parameter name
        parameter: String,
    },

    /// Two fixture methods registered under one name
    #[error("Fixture method '{name}' is already registered")]
    DuplicateMethod {
        /// Method name
        name: String,
    },

    /// The run was cancelled; all open units were force-closed
    #[error("Run cancelled ({reason}), {closed} open unit(s) force-closed")]
    Cancelled {
        /// Cancellation reason
        reason: String,
        /// Number of units closed by the forced unwinding
        closed: usize,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EnsayoError {
    /// Create a protocol error
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Errors raised while resolving, binding or expanding a fixture call.
    ///
    /// These are reported as a fixture failure on the affected unit and never
    /// abort sibling units.
    #[must_use]
    pub const fn is_binding_error(&self) -> bool {
        matches!(
            self,
            Self::MissingArgument { .. }
                | Self::UnresolvedEnumValue { .. }
                | Self::AmbiguousRowShape { .. }
                | Self::InvalidArgument { .. }
                | Self::NonTerminatingIteration { .. }
                | Self::NotIterable { .. }
                | Self::UnexpectedReturn { .. }
                | Self::UnexpandedRows { .. }
                | Self::UnknownMethod { .. }
        )
    }

    /// Errors that end the run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::Cancelled { .. })
    }
}
