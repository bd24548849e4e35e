//! Fixture method descriptors.
//!
//! A fixture method is a name, an ordered list of typed parameters, a
//! declared return shape and a closure. Descriptors replace reflective
//! discovery: they are built once and stored in a
//! [`FixtureRegistry`](crate::registry::FixtureRegistry).
//!
//! # Example
//!
//! ```ignore
//! let click = FixtureMethod::builder("click")
//!     .param("locator", ParamType::Str)
//!     .param("locatorStrategy", ParamType::enumeration::<LocatorStrategy>())
//!     .build(|call| {
//!         let locator = call.args().str("locator")?;
//!         let strategy: LocatorStrategy = call.args().enumeration("locatorStrategy")?;
//!         tracing::info!(locator, ?strategy, "clicked");
//!         Ok(Returned::Void)
//!     })?;
//! ```

use crate::cancel::CancelToken;
use crate::failure::{Failure, FixtureResult};
use crate::result::{EnsayoError, EnsayoResult};
use crate::value::{Returned, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Enums that can be resolved from strings at bind time.
///
/// Usually derived with `#[derive(FixtureEnum)]`.
pub trait FixtureEnum: Sized {
    /// Type name used in error messages
    const TYPE_NAME: &'static str;

    /// Canonical names of all variants, in declaration order
    fn variant_names() -> &'static [&'static str];

    /// Variant for an exact canonical name
    fn from_variant_name(name: &str) -> Option<Self>;

    /// Canonical name of this variant
    fn variant_name(&self) -> &'static str;
}

/// Variants accepted by an enum parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumSpec {
    /// Enum type name
    pub type_name: &'static str,
    /// Canonical variant names
    pub variants: &'static [&'static str],
}

impl EnumSpec {
    /// Spec for a [`FixtureEnum`] type
    #[must_use]
    pub fn of<T: FixtureEnum>() -> Self {
        Self {
            type_name: T::TYPE_NAME,
            variants: T::variant_names(),
        }
    }

    /// Canonical variant matching `raw`, ignoring ASCII case
    #[must_use]
    pub fn resolve(&self, raw: &str) -> Option<&'static str> {
        self.variants
            .iter()
            .copied()
            .find(|v| v.eq_ignore_ascii_case(raw))
    }
}

/// Declared parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Raw string
    Str,
    /// 64-bit integer
    Int,
    /// 64-bit float
    Float,
    /// Boolean (`true`/`false`, case-insensitive)
    Bool,
    /// Enumerated value such as a locator strategy
    Enum(EnumSpec),
}

impl ParamType {
    /// Enum parameter type for `T`
    #[must_use]
    pub fn enumeration<T: FixtureEnum>() -> Self {
        Self::Enum(EnumSpec::of::<T>())
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str => f.write_str("string"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Bool => f.write_str("bool"),
            Self::Enum(spec) => f.write_str(spec.type_name),
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    /// Parameter name, unique within the method
    pub name: String,
    /// Declared type
    pub ty: ParamType,
    /// Raw default used when no value is supplied
    pub default: Option<String>,
}

impl ParamSpec {
    /// Check if a value must be supplied
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Declared return shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnShape {
    /// Returns nothing
    #[default]
    Void,
    /// Returns one value
    Scalar,
    /// Returns a finite sequence of rows
    Rows,
}

impl fmt::Display for ReturnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Void => "void",
            Self::Scalar => "scalar",
            Self::Rows => "rows",
        })
    }
}

/// Positional arguments produced by the binder
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Args {
    names: Vec<String>,
    values: Vec<Value>,
}

impl Args {
    /// Build from parallel name/value lists
    #[must_use]
    pub fn new(names: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    /// Number of arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if there are no arguments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Positional values
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at a position
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of a named parameter
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values.get(i))
    }

    fn require(&self, name: &str) -> FixtureResult<&Value> {
        self.by_name(name)
            .ok_or_else(|| Failure::uncaught(format!("no argument named '{name}'")))
    }

    fn wrong_type(name: &str, wanted: &str, got: &Value) -> Failure {
        Failure::uncaught(format!(
            "argument '{name}' is {}, not {wanted}",
            got.type_label()
        ))
    }

    /// String argument
    pub fn str(&self, name: &str) -> FixtureResult<&str> {
        match self.require(name)? {
            Value::Str(s) => Ok(s),
            other => Err(Self::wrong_type(name, "string", other)),
        }
    }

    /// Integer argument
    pub fn int(&self, name: &str) -> FixtureResult<i64> {
        match self.require(name)? {
            Value::Int(n) => Ok(*n),
            other => Err(Self::wrong_type(name, "int", other)),
        }
    }

    /// Float argument (integers widen)
    pub fn float(&self, name: &str) -> FixtureResult<f64> {
        match self.require(name)? {
            Value::Float(x) => Ok(*x),
            Value::Int(n) => Ok(*n as f64),
            other => Err(Self::wrong_type(name, "float", other)),
        }
    }

    /// Boolean argument
    pub fn bool(&self, name: &str) -> FixtureResult<bool> {
        match self.require(name)? {
            Value::Bool(b) => Ok(*b),
            other => Err(Self::wrong_type(name, "bool", other)),
        }
    }

    /// Enum argument
    pub fn enumeration<T: FixtureEnum>(&self, name: &str) -> FixtureResult<T> {
        match self.require(name)? {
            Value::Enum { variant, .. } => T::from_variant_name(variant).ok_or_else(|| {
                Failure::uncaught(format!("'{variant}' is not a {}", T::TYPE_NAME))
            }),
            other => Err(Self::wrong_type(name, T::TYPE_NAME, other)),
        }
    }
}

/// Everything a fixture body can see during one call
#[derive(Debug)]
pub struct Invocation<'a> {
    method: &'a str,
    args: &'a Args,
    cancel: &'a CancelToken,
    poll: Duration,
}

impl<'a> Invocation<'a> {
    /// Create an invocation context
    #[must_use]
    pub fn new(method: &'a str, args: &'a Args, cancel: &'a CancelToken, poll: Duration) -> Self {
        Self {
            method,
            args,
            cancel,
            poll,
        }
    }

    /// Name of the invoked method
    #[must_use]
    pub fn method(&self) -> &str {
        self.method
    }

    /// Bound arguments
    #[must_use]
    pub fn args(&self) -> &Args {
        self.args
    }

    /// Fail with an interruption if the run was cancelled
    pub fn checkpoint(&self) -> FixtureResult<()> {
        self.cancel.checkpoint()
    }

    /// Interruptible sleep
    pub fn sleep(&self, duration: Duration) -> FixtureResult<()> {
        self.cancel.sleep(duration, self.poll)
    }
}

type MethodBody = dyn Fn(&Invocation<'_>) -> FixtureResult<Returned> + Send + Sync;

/// A registered, invocable fixture method
#[derive(Clone)]
pub struct FixtureMethod {
    name: String,
    params: Vec<ParamSpec>,
    returns: ReturnShape,
    body: Arc<MethodBody>,
}

impl fmt::Debug for FixtureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureMethod")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

impl FixtureMethod {
    /// Start describing a method
    #[must_use]
    pub fn builder(name: impl Into<String>) -> FixtureMethodBuilder {
        FixtureMethodBuilder {
            name: name.into(),
            params: Vec::new(),
            returns: ReturnShape::Void,
        }
    }

    /// Method name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered parameter specs
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Declared return shape
    #[must_use]
    pub const fn returns(&self) -> ReturnShape {
        self.returns
    }

    /// Check if the method produces rows for iteration
    #[must_use]
    pub fn is_iterable(&self) -> bool {
        self.returns == ReturnShape::Rows
    }

    /// Run the body once. Callers go through the invoker, which classifies
    /// the result and contains panics.
    pub(crate) fn call(&self, invocation: &Invocation<'_>) -> FixtureResult<Returned> {
        (self.body)(invocation)
    }
}

/// Builder for [`FixtureMethod`]
#[derive(Debug, Clone)]
pub struct FixtureMethodBuilder {
    name: String,
    params: Vec<ParamSpec>,
    returns: ReturnShape,
}

impl FixtureMethodBuilder {
    /// Add a required parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            ty,
            default: None,
        });
        self
    }

    /// Add a parameter with a raw default value
    #[must_use]
    pub fn optional(
        mut self,
        name: impl Into<String>,
        ty: ParamType,
        default: impl Into<String>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            ty,
            default: Some(default.into()),
        });
        self
    }

    /// Declare the return shape
    #[must_use]
    pub fn returns(mut self, shape: ReturnShape) -> Self {
        self.returns = shape;
        self
    }

    /// Attach the body and validate the descriptor
    pub fn build<F>(self, body: F) -> EnsayoResult<FixtureMethod>
    where
        F: Fn(&Invocation<'_>) -> FixtureResult<Returned> + Send + Sync + 'static,
    {
        let mut seen = HashSet::new();
        for param in &self.params {
            if !seen.insert(param.name.as_str()) {
                return Err(EnsayoError::DuplicateParameter {
                    method: self.name,
                    parameter: param.name.clone(),
                });
            }
        }
        Ok(FixtureMethod {
            name: self.name,
            params: self.params,
            returns: self.returns,
            body: Arc::new(body),
        })
    }
}
