//! Argument binder.
//!
//! Turns a name → string map, or a produced row, into the positional
//! arguments of a fixture method. Binding is a pure function of the
//! parameter specs and the input.

use crate::method::{Args, FixtureMethod, ParamSpec, ParamType};
use crate::result::{EnsayoError, EnsayoResult};
use crate::value::{Row, Value};
use std::collections::{BTreeMap, HashMap};

/// Raw, string-keyed step arguments
pub type ArgumentMap = HashMap<String, String>;

/// Bind a string map against the method's parameters.
///
/// # Errors
///
/// `MissingArgument`, `UnresolvedEnumValue` or `InvalidArgument`.
pub fn bind(method: &FixtureMethod, values: &ArgumentMap) -> EnsayoResult<Args> {
    bind_params(method.name(), method.params(), values)
}

/// Bind a string map against a parameter list
pub fn bind_params(
    method: &str,
    params: &[ParamSpec],
    values: &ArgumentMap,
) -> EnsayoResult<Args> {
    let mut names = Vec::with_capacity(params.len());
    let mut bound = Vec::with_capacity(params.len());
    for param in params {
        let raw = values
            .get(&param.name)
            .or(param.default.as_ref())
            .ok_or_else(|| EnsayoError::MissingArgument {
                method: method.to_string(),
                parameter: param.name.clone(),
            })?;
        bound.push(convert_raw(param, raw)?);
        names.push(param.name.clone());
    }
    Ok(Args::new(names, bound))
}

/// Convert one raw string to the parameter's declared type
pub fn convert_raw(param: &ParamSpec, raw: &str) -> EnsayoResult<Value> {
    let invalid = || EnsayoError::InvalidArgument {
        parameter: param.name.clone(),
        value: raw.to_string(),
        expected: param.ty.to_string(),
    };
    match param.ty {
        ParamType::Str => Ok(Value::Str(raw.to_string())),
        ParamType::Int => raw.trim().parse().map(Value::Int).map_err(|_| invalid()),
        ParamType::Float => raw.trim().parse().map(Value::Float).map_err(|_| invalid()),
        ParamType::Bool => match raw.trim() {
            s if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            s if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        ParamType::Enum(spec) => spec
            .resolve(raw)
            .map(|variant| Value::Enum {
                type_name: spec.type_name.to_string(),
                variant: variant.to_string(),
            })
            .ok_or_else(|| EnsayoError::UnresolvedEnumValue {
                parameter: param.name.clone(),
                type_name: spec.type_name.to_string(),
                value: raw.to_string(),
                expected: spec.variants.join(", "),
            }),
    }
}

/// Convert an already typed value to the parameter's declared type
pub fn coerce(param: &ParamSpec, value: &Value) -> EnsayoResult<Value> {
    match (&param.ty, value) {
        (_, Value::Str(raw)) => convert_raw(param, raw),
        (ParamType::Str, Value::Null) => Ok(Value::Str(String::new())),
        (ParamType::Str, other) => Ok(Value::Str(other.to_string())),
        (ParamType::Int, Value::Int(n)) => Ok(Value::Int(*n)),
        (ParamType::Float, Value::Float(x)) => Ok(Value::Float(*x)),
        (ParamType::Float, Value::Int(n)) => Ok(Value::Float(*n as f64)),
        (ParamType::Bool, Value::Bool(b)) => Ok(Value::Bool(*b)),
        (ParamType::Enum(_), Value::Enum { variant, .. }) => convert_raw(param, variant),
        (ty, other) => Err(EnsayoError::InvalidArgument {
            parameter: param.name.clone(),
            value: other.to_string(),
            expected: ty.to_string(),
        }),
    }
}

/// Bind one produced row against the method's parameters.
///
/// Tuples bind by position, records by name (records keyed `"0"`, `"1"`,
/// ... fall back to position), scalars bind to a single parameter.
///
/// # Errors
///
/// `AmbiguousRowShape` if the row cannot be mapped onto the parameters;
/// conversion errors of individual values are returned as they are.
pub fn bind_row(method: &FixtureMethod, row: &Row) -> EnsayoResult<Args> {
    bind_row_params(method.name(), method.params(), row)
}

/// Bind one row against a parameter list
pub fn bind_row_params(method: &str, params: &[ParamSpec], row: &Row) -> EnsayoResult<Args> {
    match row {
        Row::Tuple(values) => bind_positional(method, params, values),
        Row::Scalar(value) => bind_positional(method, params, std::slice::from_ref(value)),
        Row::Record(entries) => {
            if let Some(args) = bind_named(params, entries)? {
                return Ok(args);
            }
            if let Some(values) = indexed_values(entries) {
                return bind_positional(method, params, &values);
            }
            let missing: Vec<&str> = params
                .iter()
                .filter(|p| p.is_required() && !entries.contains_key(&p.name))
                .map(|p| p.name.as_str())
                .collect();
            Err(EnsayoError::AmbiguousRowShape {
                method: method.to_string(),
                message: format!(
                    "record is missing {} and is not positional",
                    missing.join(", ")
                ),
            })
        }
    }
}

fn bind_positional(method: &str, params: &[ParamSpec], values: &[Value]) -> EnsayoResult<Args> {
    let required = params.iter().filter(|p| p.is_required()).count();
    if values.len() > params.len() || values.len() < required {
        return Err(EnsayoError::AmbiguousRowShape {
            method: method.to_string(),
            message: format!(
                "row has {} value(s), method takes {} ({} required)",
                values.len(),
                params.len(),
                required
            ),
        });
    }

    let mut names = Vec::with_capacity(params.len());
    let mut bound = Vec::with_capacity(params.len());
    for (i, param) in params.iter().enumerate() {
        let value = match values.get(i) {
            Some(value) => coerce(param, value)?,
            None => match &param.default {
                Some(raw) => convert_raw(param, raw)?,
                None => {
                    return Err(EnsayoError::AmbiguousRowShape {
                        method: method.to_string(),
                        message: format!("no value for required parameter '{}'", param.name),
                    })
                }
            },
        };
        names.push(param.name.clone());
        bound.push(value);
    }
    Ok(Args::new(names, bound))
}

/// `Ok(None)` when a required parameter has no entry
fn bind_named(
    params: &[ParamSpec],
    entries: &BTreeMap<String, Value>,
) -> EnsayoResult<Option<Args>> {
    let mut names = Vec::with_capacity(params.len());
    let mut bound = Vec::with_capacity(params.len());
    for param in params {
        let value = match (entries.get(&param.name), &param.default) {
            (Some(value), _) => coerce(param, value)?,
            (None, Some(raw)) => convert_raw(param, raw)?,
            (None, None) => return Ok(None),
        };
        names.push(param.name.clone());
        bound.push(value);
    }
    Ok(Some(Args::new(names, bound)))
}

/// Values of a record keyed `"0"..n`, in index order
fn indexed_values(entries: &BTreeMap<String, Value>) -> Option<Vec<Value>> {
    (0..entries.len())
        .map(|i| entries.get(&i.to_string()).cloned())
        .collect()
}
