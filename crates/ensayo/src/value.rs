//! Values passed into and returned from fixture methods.

use crate::method::ReturnShape;
use crate::unit::Variables;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A bound argument or a produced scalar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// No value
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    Str(String),
    /// Resolved enum member
    Enum {
        /// Enum type name
        type_name: String,
        /// Canonical variant name
        variant: String,
    },
}

impl Value {
    /// Short name of the value's type, used in error messages
    #[must_use]
    pub const fn type_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Enum { .. } => "enum",
        }
    }

    /// String content if this is a string value
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::Enum { variant, .. } => f.write_str(variant),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One element produced by a row-producing fixture method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Row {
    /// Positional values, bound by parameter order
    Tuple(Vec<Value>),
    /// Named values, bound by parameter name
    Record(BTreeMap<String, Value>),
    /// A single opaque value
    Scalar(Value),
}

impl Row {
    /// Create a positional row
    #[must_use]
    pub fn tuple<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Tuple(values.into_iter().map(Into::into).collect())
    }

    /// Create a named row
    #[must_use]
    pub fn record<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Record(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Number of values carried by the row
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Tuple(values) => values.len(),
            Self::Record(entries) => entries.len(),
            Self::Scalar(_) => 1,
        }
    }

    /// Check if the row carries no values
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row contents as reporting variables.
    ///
    /// Tuples are keyed by position, scalars by `value`.
    #[must_use]
    pub fn variables(&self) -> Variables {
        match self {
            Self::Tuple(values) => values
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.to_string()))
                .collect(),
            Self::Record(entries) => entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect(),
            Self::Scalar(v) => Variables::from([("value".to_string(), v.to_string())]),
        }
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::Tuple(values)
    }
}

/// Lazily produced rows, materialized by the iteration expander.
pub struct RowSource {
    rows: Box<dyn Iterator<Item = Row> + Send>,
}

impl RowSource {
    /// Wrap any iterator of rows
    pub fn new<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = Row>,
        I::IntoIter: Send + 'static,
    {
        Self {
            rows: Box::new(rows.into_iter()),
        }
    }
}

impl Iterator for RowSource {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }
}

impl fmt::Debug for RowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowSource")
            .field("size_hint", &self.rows.size_hint())
            .finish()
    }
}

/// What a fixture method hands back on success
#[derive(Debug)]
pub enum Returned {
    /// Nothing
    Void,
    /// A single value
    Scalar(Value),
    /// A sequence of rows for data-driven iteration
    Rows(RowSource),
}

impl Returned {
    /// Create a row result from any iterator of rows
    pub fn rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = Row>,
        I::IntoIter: Send + 'static,
    {
        Self::Rows(RowSource::new(rows))
    }

    /// Check if the result is a row sequence
    #[must_use]
    pub const fn is_rows(&self) -> bool {
        matches!(self, Self::Rows(_))
    }

    /// Shape of this result, for checking against a method's declaration
    #[must_use]
    pub const fn shape(&self) -> ReturnShape {
        match self {
            Self::Void => ReturnShape::Void,
            Self::Scalar(_) => ReturnShape::Scalar,
            Self::Rows(_) => ReturnShape::Rows,
        }
    }
}

impl From<Value> for Returned {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}
