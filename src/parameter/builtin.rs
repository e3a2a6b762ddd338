// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Built-in [`Parameter`]s.

use serde_json::Value as Json;

use crate::{
    assertion::AssertionMode,
    resource::{OptionsFor, parse_options},
    value::{ArgType, ConversionError, Value, coerce},
};

use super::Parameter;

/// Kubernetes-style reference: optional `kind/` and a DNS-label name.
const ID: &str = r"(?:[a-z0-9](?:[-a-z0-9.]*[a-z0-9])?/)?[a-z0-9](?:[-a-z0-9]*[a-z0-9])?";

/// Double-quoted string with backslash escapes.
const COMMAND: &str = r#""(?:[^"\\]|\\.)*""#;

/// Duration literal, like `30s` or `1h15m`.
const DURATION: &str = r"\d+(?:ns|us|ms|s|m|h)(?:\d+(?:ns|us|ms|s|m|h))*";

/// Decimal number.
const NUMBER: &str = r"-?\d+(?:\.\d+)?";

/// Leading phrase selecting an [`AssertionMode`].
const ASYNC: &str = r"(?:(?:eventually|consistently)(?: within| for)?|within|in less than|for at least|for)?";

/// Returns all the built-in [`Parameter`]s.
pub(super) fn parameters() -> Vec<Parameter> {
    vec![
        Parameter::capture("id", ID, |s, _, _| Ok(Value::String(s.to_owned())))
            .with_targets(&[ArgType::String, ArgType::Any]),
        Parameter::capture("command", COMMAND, |s, _, _| {
            Ok(Value::String(unquote(s)))
        })
        .with_targets(&[ArgType::String, ArgType::Any]),
        Parameter::capture("duration", DURATION, |s, t, _| match t {
            ArgType::String => Ok(Value::String(s.to_owned())),
            _ => coerce(s, ArgType::Duration),
        })
        .with_targets(&[ArgType::Duration, ArgType::String, ArgType::Any]),
        Parameter::capture("number", NUMBER, |s, t, _| coerce(s, t))
            .with_targets(&[ArgType::Int, ArgType::Float, ArgType::String, ArgType::Any]),
        Parameter::capture("should", "should not|should", |s, _, _| {
            Ok(Value::Bool(s == "should"))
        })
        .with_targets(&[ArgType::Bool, ArgType::Any]),
        Parameter::capture("text", ".*", |s, t, _| coerce(s, t)).with_targets(&[
            ArgType::String,
            ArgType::Int,
            ArgType::Float,
            ArgType::Bool,
            ArgType::Bytes,
            ArgType::Duration,
            ArgType::Object,
            ArgType::Variadic,
            ArgType::Any,
        ]),
        Parameter::capture("comparison", "==|!=|<=|>=|<|>", |s, _, _| {
            Ok(Value::String(s.to_owned()))
        })
        .with_targets(&[ArgType::String, ArgType::Any]),
        Parameter::capture("jsonpath", "[^`]+", |s, _, _| {
            Ok(Value::String(s.to_owned()))
        })
        .with_targets(&[ArgType::String, ArgType::Any]),
        Parameter::capture("matcher", ".+", |s, _, cx| {
            cx.parse_matcher(s)
                .map(Value::Predicate)
                .map_err(|e| ConversionError::invalid(ArgType::Predicate, e))
        })
        .with_targets(&[ArgType::Predicate, ArgType::Any]),
        Parameter::capture("jsonpath-matcher", r"(?:have )?jsonpath `[^`]+` .+", |s, _, cx| {
            cx.parse_matcher(s)
                .map(Value::Predicate)
                .map_err(|e| ConversionError::invalid(ArgType::Predicate, e))
        })
        .with_targets(&[ArgType::Predicate, ArgType::Any]),
        Parameter::capture("async", ASYNC, |s, _, _| {
            _ = AssertionMode::from_phrase(s)
                .map_err(|e| ConversionError::invalid(ArgType::String, e))?;
            Ok(Value::String(s.trim().to_owned()))
        })
        .with_targets(&[ArgType::String, ArgType::Any]),
        Parameter::doc_string("document", |doc, t| match t {
            ArgType::DocString => Ok(Value::DocString(doc.clone())),
            ArgType::String => Ok(Value::String(doc.content.clone())),
            ArgType::Bytes => Ok(Value::Bytes(doc.content.clone().into_bytes())),
            ArgType::Object | ArgType::Any => serde_yaml::from_str::<Json>(&doc.content)
                .map(Value::Object)
                .map_err(|e| ConversionError::invalid(ArgType::Object, e)),
            _ => Err(ConversionError::unsupported(t)),
        })
        .with_targets(&[
            ArgType::DocString,
            ArgType::String,
            ArgType::Bytes,
            ArgType::Object,
            ArgType::Any,
        ]),
        Parameter::data_table("table", |table, t| match t {
            ArgType::DataTable => Ok(Value::DataTable(table.clone())),
            ArgType::Object | ArgType::Any => table.to_object().map(Value::Object),
            _ => Err(ConversionError::unsupported(t)),
        })
        .with_targets(&[ArgType::DataTable, ArgType::Object, ArgType::Any]),
        Parameter::data_table("create-options", |table, _| {
            parse_options(table, OptionsFor::Write).map(Value::Options)
        })
        .with_targets(&[ArgType::Options]),
        Parameter::data_table("update-options", |table, _| {
            parse_options(table, OptionsFor::Write).map(Value::Options)
        })
        .with_targets(&[ArgType::Options]),
        Parameter::data_table("delete-options", |table, _| {
            parse_options(table, OptionsFor::Delete).map(Value::Options)
        })
        .with_targets(&[ArgType::Options]),
    ]
}

/// Strips the surrounding quotes of a `command` capture and resolves its
/// backslash escapes.
fn unquote(s: &str) -> String {
    let inner = s
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use regex::Regex;

    use super::*;
    use crate::{
        data_table::DataTable,
        matcher,
        parameter::Parser,
        step::DocString,
        binder::BindContext,
    };

    fn parameter(name: &str) -> Parameter {
        parameters()
            .into_iter()
            .find(|p| p.name() == name)
            .unwrap()
    }

    fn matches_whole(name: &str, text: &str) -> bool {
        Regex::new(&format!("^(?:{})$", parameter(name).regex()))
            .unwrap()
            .is_match(text)
    }

    fn parse(name: &str, text: &str, target: ArgType) -> Result<Value, ConversionError> {
        let matchers = matcher::Registry::with_builtins();
        let cx = BindContext::new(&matchers);
        match parameter(name).parser() {
            Parser::Capture(p) => p(text, target, &cx),
            _ => panic!("`{name}` is not a capture parameter"),
        }
    }

    #[test]
    fn fragments() {
        assert!(matches_whole("id", "pod/web-0"));
        assert!(matches_whole("id", "web-0"));
        assert!(!matches_whole("id", "Web"));
        assert!(matches_whole("command", r#""echo \"hi\"""#));
        assert!(!matches_whole("command", "echo"));
        assert!(matches_whole("duration", "1m30s"));
        assert!(matches_whole("duration", "250ms"));
        assert!(!matches_whole("duration", "soon"));
        assert!(matches_whole("number", "-1.5"));
        assert!(matches_whole("should", "should not"));
        assert!(matches_whole("comparison", "<="));
        assert!(matches_whole("async", ""));
        assert!(matches_whole("async", "eventually within"));
        assert!(matches_whole("async", "for at least"));
        assert!(matches_whole("jsonpath-matcher", "jsonpath `$.a` equal 1"));
        assert!(matches_whole("jsonpath-matcher", "have jsonpath `$.a` exist"));
    }

    #[test]
    fn parses_captures() {
        assert_eq!(
            parse("command", r#""echo \"hi\"""#, ArgType::String),
            Ok(Value::String(r#"echo "hi""#.into())),
        );
        assert_eq!(
            parse("duration", "1m30s", ArgType::Duration),
            Ok(Value::Duration(Duration::from_secs(90))),
        );
        assert_eq!(parse("number", "3", ArgType::Any), Ok(Value::Int(3)));
        assert_eq!(parse("number", "3", ArgType::Float), Ok(Value::Float(3.0)));
        assert_eq!(parse("should", "should", ArgType::Bool), Ok(Value::Bool(true)));
        assert_eq!(parse("should", "should not", ArgType::Bool), Ok(Value::Bool(false)));
        assert!(parse("async", "sometimes", ArgType::String).is_err());
    }

    #[test]
    fn parses_matchers_recursively() {
        let value = parse("matcher", "jsonpath `$.a` equal 1", ArgType::Predicate).unwrap();
        assert!(matches!(value, Value::Predicate(_)));

        assert!(parse("matcher", "smell nice", ArgType::Predicate).is_err());
    }

    #[test]
    fn parses_documents() {
        let Parser::DocString(parser) = parameter("document").parser().clone() else {
            panic!("`document` is not a doc-string parameter");
        };
        let doc = DocString::new("kind: Pod\nmetadata:\n  name: web\n");

        assert_eq!(parser(&doc, ArgType::DocString), Ok(Value::DocString(doc.clone())));
        assert_eq!(
            parser(&doc, ArgType::Object),
            Ok(Value::Object(serde_json::json!({
                "kind": "Pod",
                "metadata": {"name": "web"},
            }))),
        );
        let json = DocString::new(r#"{"kind": "Pod"}"#);
        assert_eq!(
            parser(&json, ArgType::Object),
            Ok(Value::Object(serde_json::json!({"kind": "Pod"}))),
        );
    }

    #[test]
    fn parses_tables() {
        let Parser::DataTable(parser) = parameter("table").parser().clone() else {
            panic!("`table` is not a data-table parameter");
        };
        let table = DataTable::from(vec![vec!["replicas", "2"]]);

        assert_eq!(parser(&table, ArgType::DataTable), Ok(Value::DataTable(table.clone())));
        assert_eq!(
            parser(&table, ArgType::Object),
            Ok(Value::Object(serde_json::json!({"replicas": 2}))),
        );
    }

    #[test]
    fn unquotes() {
        assert_eq!(unquote(r#""a\tb""#), "a\tb");
        assert_eq!(unquote(r#""trailing\""#), "trailing\\");
        assert_eq!(unquote("bare"), "bare");
    }
}
