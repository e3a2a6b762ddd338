// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Built-in matchers.

use std::{fmt, str::FromStr};

use derive_more::with_trait::{Display, Error};
use regex::Regex;
use serde_json::Value as Json;

use crate::value::Variadic;

use super::{JsonPath, Match, MatchError, MatcherDefinition, Predicate};

/// Returns all the built-in [`MatcherDefinition`]s in resolution order.
pub(super) fn matchers() -> Vec<MatcherDefinition> {
    vec![
        MatcherDefinition::new(
            "jsonpath",
            "(?:have )?jsonpath `{jsonpath}` {matcher}",
            |path: JsonPath, inner: Predicate| AtPath { path, inner },
        ),
        MatcherDefinition::new("be true", "be true", || BeBool(true)),
        MatcherDefinition::new("be false", "be false", || BeBool(false)),
        MatcherDefinition::new("be null", "be null", || BeNull),
        MatcherDefinition::new("exist", "exist", || Exist),
        MatcherDefinition::new("be one of", "be one of {text}", |Variadic(values): Variadic| {
            BeOneOf(values.iter().filter_map(crate::value::Value::to_json).collect())
        }),
        MatcherDefinition::new(
            "compare",
            "be {comparison} {number}",
            |comparator: Comparator, expected: f64| Compare { comparator, expected },
        ),
        MatcherDefinition::new("equal", "equal {text}", |expected: Json| Equal(expected)),
        MatcherDefinition::new("contain", "contain {text}", |expected: Json| Contain(expected)),
        MatcherDefinition::new("match", "match {command}", |Pattern(regex): Pattern| {
            MatchRegex(regex)
        }),
        MatcherDefinition::new("have length", "have length {number}", |len: usize| {
            HaveLength(len)
        }),
    ]
}

/// Renders a scalar the way it would be written in step text.
fn scalar_text(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        Json::Null | Json::Array(_) | Json::Object(_) => None,
    }
}

/// Compares JSON values, treating numerically equal numbers as equal and
/// comparing a string with any other scalar by its text.
fn loosely_equal(actual: &Json, expected: &Json) -> bool {
    match (actual, expected) {
        (Json::Number(a), Json::Number(b)) => a.as_f64() == b.as_f64(),
        (Json::Array(a), Json::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| loosely_equal(a, b))
        }
        (Json::Object(a), Json::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| loosely_equal(v, w)))
        }
        (Json::String(s), other @ (Json::Number(_) | Json::Bool(_)))
        | (other @ (Json::Number(_) | Json::Bool(_)), Json::String(s)) => {
            scalar_text(other).is_some_and(|t| t == *s)
        }
        _ => actual == expected,
    }
}

/// Returns a short description of the JSON type of the `value`.
const fn kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

/// Applies the inner [`Predicate`] to the value at a [`JsonPath`].
#[derive(Debug, Display)]
#[display("jsonpath `{path}` {inner}")]
struct AtPath {
    path: JsonPath,
    inner: Predicate,
}

impl Match for AtPath {
    fn matches(&self, actual: &Json) -> Result<bool, MatchError> {
        self.inner.matches(&self.path.select(actual))
    }

    fn failure_message(&self, actual: &Json) -> String {
        format!(
            "At `{}`: {}",
            self.path,
            self.inner.failure_message(&self.path.select(actual)),
        )
    }

    fn negated_failure_message(&self, actual: &Json) -> String {
        format!(
            "At `{}`: {}",
            self.path,
            self.inner.negated_failure_message(&self.path.select(actual)),
        )
    }
}

/// Value is the given boolean.
#[derive(Debug, Display)]
#[display("be {_0}")]
struct BeBool(bool);

impl Match for BeBool {
    fn matches(&self, actual: &Json) -> Result<bool, MatchError> {
        Ok(actual.as_bool() == Some(self.0))
    }
}

/// Value is null or missing.
#[derive(Debug, Display)]
#[display("be null")]
struct BeNull;

impl Match for BeNull {
    fn matches(&self, actual: &Json) -> Result<bool, MatchError> {
        Ok(actual.is_null())
    }
}

/// Value is present.
#[derive(Debug, Display)]
#[display("exist")]
struct Exist;

impl Match for Exist {
    fn matches(&self, actual: &Json) -> Result<bool, MatchError> {
        Ok(!actual.is_null())
    }

    fn failure_message(&self, _: &Json) -> String {
        "Expected the resource to exist".into()
    }

    fn negated_failure_message(&self, actual: &Json) -> String {
        format!("Expected\n    {actual}\nnot to exist")
    }
}

/// Value equals any of the listed ones.
#[derive(Debug)]
struct BeOneOf(Vec<Json>);

impl fmt::Display for BeOneOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("be one of")?;
        for v in &self.0 {
            write!(f, " {v}")?;
        }
        Ok(())
    }
}

impl Match for BeOneOf {
    fn matches(&self, actual: &Json) -> Result<bool, MatchError> {
        Ok(self.0.iter().any(|v| loosely_equal(actual, v)))
    }
}

/// Comparison operator of the `be {comparison} {number}` matcher.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Comparator {
    /// `==`
    #[display("==")]
    Eq,

    /// `!=`
    #[display("!=")]
    Ne,

    /// `<`
    #[display("<")]
    Lt,

    /// `<=`
    #[display("<=")]
    Le,

    /// `>`
    #[display(">")]
    Gt,

    /// `>=`
    #[display(">=")]
    Ge,
}

impl Comparator {
    /// Applies this [`Comparator`] to the operands.
    #[must_use]
    pub fn compare(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

/// Error of parsing a [`Comparator`].
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
#[display("unknown comparison operator `{_0}`")]
pub struct UnknownComparator(#[error(not(source))] String);

impl FromStr for Comparator {
    type Err = UnknownComparator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            other => return Err(UnknownComparator(other.to_owned())),
        })
    }
}

crate::from_arg_via_str!(Comparator);

/// Numeric value compares to the expected one.
#[derive(Debug, Display)]
#[display("be {comparator} {expected}")]
struct Compare {
    comparator: Comparator,
    expected: f64,
}

impl Match for Compare {
    fn matches(&self, actual: &Json) -> Result<bool, MatchError> {
        let number = match actual {
            Json::Number(n) => n.as_f64(),
            Json::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| MatchError::new(format!("{actual} is {}, not a number", kind(actual))))?;
        Ok(self.comparator.compare(number, self.expected))
    }
}

/// Value equals the expected one.
#[derive(Debug, Display)]
#[display("equal {_0}")]
struct Equal(Json);

impl Match for Equal {
    fn matches(&self, actual: &Json) -> Result<bool, MatchError> {
        Ok(loosely_equal(actual, &self.0))
    }
}

/// String contains a substring, array contains an element, or object
/// contains a key.
#[derive(Debug, Display)]
#[display("contain {_0}")]
struct Contain(Json);

impl Match for Contain {
    fn matches(&self, actual: &Json) -> Result<bool, MatchError> {
        match actual {
            Json::String(s) => Ok(scalar_text(&self.0).is_some_and(|t| s.contains(&t))),
            Json::Array(items) => Ok(items.iter().any(|i| loosely_equal(i, &self.0))),
            Json::Object(map) => Ok(scalar_text(&self.0).is_some_and(|k| map.contains_key(&k))),
            Json::Null => Ok(false),
            Json::Bool(_) | Json::Number(_) => Err(MatchError::new(format!(
                "{actual} is {}, which cannot contain anything",
                kind(actual),
            ))),
        }
    }
}

/// Regular expression compiled while binding the `match` matcher.
#[derive(Clone, Debug)]
struct Pattern(Regex);

impl FromStr for Pattern {
    type Err = regex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Regex::new(s).map(Self)
    }
}

crate::from_arg_via_str!(Pattern);

/// String matches a regular expression.
#[derive(Debug)]
struct MatchRegex(Regex);

impl fmt::Display for MatchRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "match {:?}", self.0.as_str())
    }
}

impl Match for MatchRegex {
    fn matches(&self, actual: &Json) -> Result<bool, MatchError> {
        Ok(scalar_text(actual).is_some_and(|t| self.0.is_match(&t)))
    }
}

/// String, array or object has the given length.
#[derive(Debug, Display)]
#[display("have length {_0}")]
struct HaveLength(usize);

impl Match for HaveLength {
    fn matches(&self, actual: &Json) -> Result<bool, MatchError> {
        let len = match actual {
            Json::String(s) => s.chars().count(),
            Json::Array(items) => items.len(),
            Json::Object(map) => map.len(),
            Json::Null => 0,
            Json::Bool(_) | Json::Number(_) => {
                return Err(MatchError::new(format!("{actual} is {}, which has no length", kind(actual))));
            }
        };
        Ok(len == self.0)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::matcher::{MatcherError, Registry};

    fn check(matcher: &str, actual: Json) -> Result<bool, MatchError> {
        Registry::with_builtins().parse(matcher).unwrap().matches(&actual)
    }

    #[test]
    fn every_builtin_is_registered() {
        assert_eq!(Registry::with_builtins().len(), matchers().len());
    }

    #[test]
    fn scalars() {
        assert_eq!(check("be true", json!(true)), Ok(true));
        assert_eq!(check("be true", json!("true")), Ok(false));
        assert_eq!(check("be false", json!(false)), Ok(true));
        assert_eq!(check("be null", Json::Null), Ok(true));
        assert_eq!(check("exist", Json::Null), Ok(false));
        assert_eq!(check("exist", json!({})), Ok(true));
    }

    #[test]
    fn equality_is_numeric_and_textual() {
        assert_eq!(check("equal Running", json!("Running")), Ok(true));
        assert_eq!(check("equal 3", json!(3.0)), Ok(true));
        assert_eq!(check("equal 3", json!("3")), Ok(true));
        assert_eq!(check("equal {a: 1}", json!({"a": 1})), Ok(true));
        assert_eq!(check("equal Running", json!("Pending")), Ok(false));
        assert_eq!(check("be one of Pending Running", json!("Running")), Ok(true));
        assert_eq!(check("be one of 1 2", json!(3)), Ok(false));
    }

    #[test]
    fn comparisons() {
        assert_eq!(check("be >= 3", json!(3)), Ok(true));
        assert_eq!(check("be < 2.5", json!("2")), Ok(true));
        assert_eq!(check("be != 1", json!(1)), Ok(false));
        assert!(check("be > 1", json!([1])).is_err());
        assert_eq!("=>".parse::<Comparator>(), Err(UnknownComparator("=>".into())));
    }

    #[test]
    fn containment_and_length() {
        assert_eq!(check("contain web", json!("web-0")), Ok(true));
        assert_eq!(check("contain 2", json!([1, 2])), Ok(true));
        assert_eq!(check("contain app", json!({"app": "web"})), Ok(true));
        assert!(check("contain 1", json!(1)).is_err());
        assert_eq!(check("have length 2", json!([1, 2])), Ok(true));
        assert_eq!(check("have length 3", json!("web")), Ok(true));
        assert!(check("have length 1", json!(true)).is_err());
    }

    #[test]
    fn regexes() {
        assert_eq!(check(r#"match "^web-\\d+$""#, json!("web-12")), Ok(true));
        assert_eq!(check(r#"match "^web$""#, json!("web-12")), Ok(false));
    }

    #[test]
    fn invalid_regexes_fail_to_bind() {
        let err = Registry::with_builtins().parse(r#"match "(""#).unwrap_err();
        assert!(matches!(err, MatcherError::Bind { .. }), "{err:?}");
    }

    #[test]
    fn jsonpath_accepts_a_leading_have() {
        let p = Registry::with_builtins().parse("have jsonpath `$.a` exist").unwrap();
        assert_eq!(p.matches(&json!({"a": 1})), Ok(true));
        assert_eq!(p.matches(&json!({})), Ok(false));
    }

    #[test]
    fn jsonpath_failure_messages_show_the_selected_value() {
        let p = Registry::with_builtins()
            .parse("jsonpath `$.status.phase` equal Running")
            .unwrap();
        let pod = json!({"status": {"phase": "Pending"}});

        assert_eq!(p.matches(&pod), Ok(false));
        assert_eq!(
            p.failure_message(&pod),
            "At `$.status.phase`: Expected\n    \"Pending\"\nto equal \"Running\"",
        );
    }
}
