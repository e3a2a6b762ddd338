// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Tagged argument [`Value`]s and the [`ArgType`] descriptors they are bound
//! against.
//!
//! Every handler and matcher parameter declares an [`ArgType`] through the
//! [`FromArg`] trait at registration time, and receives a [`Value`] produced
//! by a parameter parser (or by the default [`coerce()`] rule) at call time.

use std::{fmt, str::FromStr, time::Duration};

use derive_more::with_trait::{Display, Error};
use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use crate::{
    data_table::DataTable,
    matcher::Predicate,
    resource::ResourceOption,
    step::{DocString, StepHelper},
};

/// Type descriptor of a single handler or matcher parameter.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum ArgType {
    /// Plain UTF-8 string.
    #[display("string")]
    String,

    /// Signed integer.
    #[display("int")]
    Int,

    /// Floating point number.
    #[display("float")]
    Float,

    /// Boolean.
    #[display("bool")]
    Bool,

    /// Raw bytes.
    #[display("bytes")]
    Bytes,

    /// [`Duration`] literal, like `1m30s`.
    #[display("duration")]
    Duration,

    /// Arbitrary structured object.
    #[display("object")]
    Object,

    /// [`Predicate`] built by the matcher registry.
    #[display("predicate")]
    Predicate,

    /// List of [`ResourceOption`]s.
    #[display("options")]
    Options,

    /// Whitespace-separated list of type-sniffed values.
    #[display("variadic")]
    Variadic,

    /// Whatever [`Value::sniff()`] detects.
    #[display("any")]
    Any,

    /// Raw [`DocString`] step argument.
    #[display("doc-string")]
    DocString,

    /// Raw [`DataTable`] step argument.
    #[display("data-table")]
    DataTable,

    /// [`StepHelper`] of the running step.
    #[display("step helper")]
    Helper,
}

impl ArgType {
    /// Indicates whether this type may only be fed from a trailing step
    /// argument.
    #[must_use]
    pub const fn is_step_argument(self) -> bool {
        matches!(self, Self::DocString | Self::DataTable)
    }
}

/// Bound argument value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// Explicit absence of a value.
    #[default]
    Null,

    /// [`ArgType::String`] value.
    String(String),

    /// [`ArgType::Int`] value.
    Int(i64),

    /// [`ArgType::Float`] value.
    Float(f64),

    /// [`ArgType::Bool`] value.
    Bool(bool),

    /// [`ArgType::Bytes`] value.
    Bytes(Vec<u8>),

    /// [`ArgType::Duration`] value.
    Duration(Duration),

    /// [`ArgType::Object`] value.
    Object(Json),

    /// [`ArgType::Predicate`] value.
    Predicate(Predicate),

    /// [`ArgType::Options`] value.
    Options(Vec<ResourceOption>),

    /// [`ArgType::Variadic`] value.
    List(Vec<Value>),

    /// [`ArgType::DocString`] value.
    DocString(DocString),

    /// [`ArgType::DataTable`] value.
    DataTable(DataTable),

    /// [`ArgType::Helper`] value.
    Helper(StepHelper),
}

impl Value {
    /// Detects the most specific scalar [`Value`] of the given `text`.
    ///
    /// Integers are tried first, then floats, booleans and `null`, falling
    /// back to a [`Value::String`].
    #[must_use]
    pub fn sniff(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        if let Some(b) = parse_bool(trimmed) {
            return Self::Bool(b);
        }
        if trimmed == "null" || trimmed == "nil" {
            return Self::Null;
        }
        Self::String(text.to_owned())
    }

    /// Returns the name of this [`Value`]'s variant, for error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::Duration(_) => "duration",
            Self::Object(_) => "object",
            Self::Predicate(_) => "predicate",
            Self::Options(_) => "options",
            Self::List(_) => "list",
            Self::DocString(_) => "doc-string",
            Self::DataTable(_) => "data-table",
            Self::Helper(_) => "step helper",
        }
    }

    /// Converts this [`Value`] into JSON, if it has a JSON representation.
    #[must_use]
    pub fn to_json(&self) -> Option<Json> {
        Some(match self {
            Self::Null => Json::Null,
            Self::String(s) => Json::String(s.clone()),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(Json::Null, Json::Number),
            Self::Bool(b) => Json::Bool(*b),
            Self::Bytes(b) => Json::String(String::from_utf8_lossy(b).into()),
            Self::Duration(d) => {
                Json::String(humantime::format_duration(*d).to_string())
            }
            Self::Object(o) => o.clone(),
            Self::List(l) => {
                Json::Array(l.iter().map(Self::to_json).collect::<Option<_>>()?)
            }
            Self::DocString(d) => Json::String(d.content.clone()),
            Self::Predicate(_)
            | Self::Options(_)
            | Self::DataTable(_)
            | Self::Helper(_) => return None,
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Duration(a), Self::Duration(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Predicate(a), Self::Predicate(b)) => {
                a.to_string() == b.to_string()
            }
            (Self::Options(a), Self::Options(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::DocString(a), Self::DocString(b)) => a == b,
            (Self::DataTable(a), Self::DataTable(b)) => a == b,
            (Self::Helper(a), Self::Helper(b)) => a.same_step(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::String(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Self::Duration(d) => write!(f, "{}", humantime::format_duration(*d)),
            Self::Object(o) => write!(f, "{o}"),
            Self::Predicate(p) => write!(f, "{p}"),
            Self::Options(o) => write!(f, "{o:?}"),
            Self::List(l) => {
                let mut first = true;
                for v in l {
                    if !first {
                        f.write_str(" ")?;
                    }
                    first = false;
                    write!(f, "{v}")?;
                }
                Ok(())
            }
            Self::DocString(d) => f.write_str(&d.content),
            Self::DataTable(t) => write!(f, "{t}"),
            Self::Helper(_) => f.write_str("<step helper>"),
        }
    }
}

/// Parses a boolean the way step texts usually spell it.
fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Error of converting text or a [`Value`] into the requested [`ArgType`].
#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum ConversionError {
    /// Target type cannot be produced from this kind of input at all.
    #[display("conversion into {target} is not supported")]
    Unsupported {
        /// Requested type.
        #[error(not(source))]
        target: ArgType,
    },

    /// Input is malformed for the target type.
    #[display("invalid {target}: {reason}")]
    Invalid {
        /// Requested type.
        target: ArgType,

        /// Human-readable reason.
        #[error(not(source))]
        reason: String,
    },

    /// Key/value table row doesn't have exactly two cells.
    #[display("table row {row} has {width} cells, but must be exactly 2 wide")]
    TableMustBeWidthTwo {
        /// Zero-based index of the offending row.
        row: usize,

        /// Number of cells in the row.
        width: usize,
    },
}

impl ConversionError {
    /// Creates a new [`ConversionError::Invalid`].
    #[must_use]
    pub fn invalid(target: ArgType, reason: impl ToString) -> Self {
        Self::Invalid { target, reason: reason.to_string() }
    }

    /// Creates a new [`ConversionError::Unsupported`].
    #[must_use]
    pub const fn unsupported(target: ArgType) -> Self {
        Self::Unsupported { target }
    }
}

/// Converts captured `text` into a [`Value`] of the `target` type.
///
/// This is the rule applied to capture groups written directly in a pattern
/// and the one most built-in parameters delegate to.
///
/// # Errors
///
/// If `text` cannot be represented as the `target` type.
pub fn coerce(text: &str, target: ArgType) -> Result<Value, ConversionError> {
    match target {
        ArgType::String => Ok(Value::String(text.to_owned())),
        ArgType::Int => text
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|e| ConversionError::invalid(target, e)),
        ArgType::Float => text
            .trim()
            .parse()
            .map(Value::Float)
            .map_err(|e| ConversionError::invalid(target, e)),
        ArgType::Bool => parse_bool(text.trim())
            .map(Value::Bool)
            .ok_or_else(|| ConversionError::invalid(target, "expected `true` or `false`")),
        ArgType::Bytes => Ok(Value::Bytes(text.as_bytes().to_vec())),
        ArgType::Duration => humantime::parse_duration(text.trim())
            .map(Value::Duration)
            .map_err(|e| ConversionError::invalid(target, e)),
        ArgType::Object => serde_yaml::from_str::<Json>(text)
            .map(Value::Object)
            .map_err(|e| ConversionError::invalid(target, e)),
        ArgType::Any => Ok(Value::sniff(text)),
        ArgType::Variadic => Ok(Value::List(
            text.split_whitespace().map(Value::sniff).collect(),
        )),
        ArgType::Predicate
        | ArgType::Options
        | ArgType::DocString
        | ArgType::DataTable
        | ArgType::Helper => Err(ConversionError::unsupported(target)),
    }
}

/// Typed handler or matcher parameter.
///
/// [`FromArg::TYPE`] is inspected once, at registration time, to validate the
/// signature against the pattern; [`FromArg::from_arg()`] runs on every call.
pub trait FromArg: Sized {
    /// Descriptor of this parameter.
    const TYPE: ArgType;

    /// Extracts `Self` from a bound [`Value`].
    ///
    /// # Errors
    ///
    /// If the [`Value`] doesn't hold a `Self`.
    fn from_arg(value: Value) -> Result<Self, ConversionError>;
}

/// Returns the [`ConversionError`] for a [`Value`] of an unexpected kind.
fn mismatch(target: ArgType, value: &Value) -> ConversionError {
    ConversionError::invalid(target, format!("got {} `{value}`", value.kind()))
}

impl FromArg for Value {
    const TYPE: ArgType = ArgType::Any;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl FromArg for String {
    const TYPE: ArgType = ArgType::String;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::String(s) => Ok(s),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::Null => {
                Ok(value.to_string())
            }
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

impl FromArg for i64 {
    const TYPE: ArgType = ArgType::Int;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

macro_rules! from_arg_via_i64 {
    ($($ty:ty),*) => {$(
        impl FromArg for $ty {
            const TYPE: ArgType = ArgType::Int;

            fn from_arg(value: Value) -> Result<Self, ConversionError> {
                let i = i64::from_arg(value)?;
                <$ty>::try_from(i)
                    .map_err(|e| ConversionError::invalid(Self::TYPE, e))
            }
        }
    )*};
}

from_arg_via_i64!(i32, u16, u32, u64, usize);

impl FromArg for f64 {
    const TYPE: ArgType = ArgType::Float;

    #[expect( // intentional
        clippy::cast_precision_loss,
        reason = "integers captured from step text are small"
    )]
    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

impl FromArg for bool {
    const TYPE: ArgType = ArgType::Bool;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

impl FromArg for Vec<u8> {
    const TYPE: ArgType = ArgType::Bytes;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::String(s) => Ok(s.into_bytes()),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

impl FromArg for Duration {
    const TYPE: ArgType = ArgType::Duration;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Duration(d) => Ok(d),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

impl FromArg for Json {
    const TYPE: ArgType = ArgType::Object;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        value.to_json().ok_or_else(|| mismatch(Self::TYPE, &value))
    }
}

/// Structured argument deserialized into `T` from a doc-string, a key/value
/// table or a captured YAML/JSON fragment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Structured<T>(pub T);

impl<T> Structured<T> {
    /// Unwraps the deserialized value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned> FromArg for Structured<T> {
    const TYPE: ArgType = ArgType::Object;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        let json = Json::from_arg(value)?;
        serde_json::from_value(json)
            .map(Self)
            .map_err(|e| ConversionError::invalid(Self::TYPE, e))
    }
}

impl FromArg for Predicate {
    const TYPE: ArgType = ArgType::Predicate;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Predicate(p) => Ok(p),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

impl FromArg for Vec<ResourceOption> {
    const TYPE: ArgType = ArgType::Options;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Options(o) => Ok(o),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

/// Variadic trailing parameter: every whitespace-separated token of the
/// capture, type-sniffed independently.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Variadic(pub Vec<Value>);

impl FromArg for Variadic {
    const TYPE: ArgType = ArgType::Variadic;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::List(l) => Ok(Self(l)),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

impl FromArg for DocString {
    const TYPE: ArgType = ArgType::DocString;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::DocString(d) => Ok(d),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

impl FromArg for DataTable {
    const TYPE: ArgType = ArgType::DataTable;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::DataTable(t) => Ok(t),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

impl FromArg for StepHelper {
    const TYPE: ArgType = ArgType::Helper;

    fn from_arg(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Helper(h) => Ok(h),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

/// Implements [`FromArg`] for a type parsed from a string capture through its
/// [`FromStr`] implementation.
///
/// ```rust
/// # use kubestep::{from_arg_via_str, value::FromArg as _};
/// #[derive(Debug, PartialEq)]
/// struct Phase(String);
///
/// impl std::str::FromStr for Phase {
///     type Err = std::convert::Infallible;
///
///     fn from_str(s: &str) -> Result<Self, Self::Err> {
///         Ok(Self(s.to_uppercase()))
///     }
/// }
///
/// from_arg_via_str!(Phase);
///
/// let phase = Phase::from_arg("running".into()).unwrap();
/// assert_eq!(phase, Phase("RUNNING".into()));
/// ```
#[macro_export]
macro_rules! from_arg_via_str {
    ($ty:ty) => {
        impl $crate::value::FromArg for $ty {
            const TYPE: $crate::value::ArgType = $crate::value::ArgType::String;

            fn from_arg(
                value: $crate::value::Value,
            ) -> ::std::result::Result<Self, $crate::value::ConversionError> {
                let s = <String as $crate::value::FromArg>::from_arg(value)?;
                s.parse().map_err(|e| {
                    $crate::value::ConversionError::invalid(Self::TYPE, e)
                })
            }
        }
    };
}

/// Parses a [`FromStr`] type out of a [`Value::String`].
///
/// # Errors
///
/// If the value isn't a string or fails to parse.
pub fn parse_str<T>(value: Value) -> Result<T, ConversionError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    String::from_arg(value)?
        .parse()
        .map_err(|e| ConversionError::invalid(ArgType::String, e))
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Error of handing a bound [`Value`] to a concrete handler parameter.
#[derive(Clone, Debug, Display, Error, PartialEq)]
#[display("argument {position} ({expected}): {source}")]
pub struct ArgumentError {
    /// Zero-based position among the handler parameters following the
    /// context.
    pub position: usize,

    /// Declared type of the parameter.
    pub expected: ArgType,

    /// Underlying conversion failure.
    pub source: ConversionError,
}

/// Takes the next bound [`Value`] from `args` and converts it into `T`.
///
/// Used by the [`Handler`] and [`MatcherFn`] implementations.
///
/// [`Handler`]: crate::step::Handler
/// [`MatcherFn`]: crate::matcher::MatcherFn
pub(crate) fn take_arg<T: FromArg>(
    args: &mut impl Iterator<Item = Value>,
    position: usize,
) -> Result<T, ArgumentError> {
    let value = args.next().ok_or(ArgumentError {
        position,
        expected: T::TYPE,
        source: ConversionError::invalid(T::TYPE, "argument is missing"),
    })?;
    T::from_arg(value).map_err(|source| ArgumentError {
        position,
        expected: T::TYPE,
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[test]
    fn sniffs_scalars_in_order() {
        assert_eq!(Value::sniff("12"), Value::Int(12));
        assert_eq!(Value::sniff("-3"), Value::Int(-3));
        assert_eq!(Value::sniff("1.5"), Value::Float(1.5));
        assert_eq!(Value::sniff("TRUE"), Value::Bool(true));
        assert_eq!(Value::sniff("false"), Value::Bool(false));
        assert_eq!(Value::sniff("null"), Value::Null);
        assert_eq!(Value::sniff("alice"), Value::String("alice".into()));
        assert_eq!(Value::sniff("inf"), Value::String("inf".into()));
    }

    #[test]
    fn coerces_into_declared_types() {
        assert_eq!(coerce("42", ArgType::Int), Ok(Value::Int(42)));
        assert_eq!(coerce("42", ArgType::String), Ok(Value::String("42".into())));
        assert_eq!(
            coerce("1m30s", ArgType::Duration),
            Ok(Value::Duration(Duration::from_secs(90))),
        );
        assert_eq!(
            coerce("a 1 true", ArgType::Variadic),
            Ok(Value::List(vec!["a".into(), Value::Int(1), Value::Bool(true)])),
        );
        assert_eq!(
            coerce("{a: 1}", ArgType::Object),
            Ok(Value::Object(json!({"a": 1}))),
        );
    }

    #[test]
    fn coercion_failures_name_the_target() {
        let err = coerce("ten", ArgType::Int).unwrap_err();
        assert!(matches!(err, ConversionError::Invalid { target: ArgType::Int, .. }));
        assert!(err.to_string().starts_with("invalid int"));

        assert_eq!(
            coerce("x", ArgType::Predicate),
            Err(ConversionError::unsupported(ArgType::Predicate)),
        );
    }

    #[test]
    fn narrows_integers() {
        assert_eq!(u32::from_arg(Value::Int(7)), Ok(7));
        assert!(u32::from_arg(Value::Int(-7)).is_err());
        assert_eq!(f64::from_arg(Value::Int(2)), Ok(2.0));
    }

    #[test]
    fn deserializes_structured_objects() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Target {
            key1: String,
            key2: i64,
        }

        let value = Value::Object(json!({"key1": "val1", "key2": 12}));
        let Structured(target) = Structured::<Target>::from_arg(value).unwrap();
        assert_eq!(target, Target { key1: "val1".into(), key2: 12 });
    }

    #[test]
    fn take_arg_reports_position() {
        let mut args = vec![Value::String("x".into())].into_iter();
        let err = take_arg::<i64>(&mut args, 0).unwrap_err();
        assert_eq!(err.position, 0);
        assert_eq!(err.expected, ArgType::Int);

        let err = take_arg::<i64>(&mut args, 1).unwrap_err();
        assert_eq!(err.position, 1);
    }
}
