// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Minimal JSONPath subset for addressing fields of observed objects.
//!
//! Supported: the `$` root, `.field`, `['field']`, `[index]` (negative
//! counts from the end), and `.*`/`[*]` wildcards. Kubectl-style braces
//! (`{.status.phase}`) are accepted too.

use std::{fmt, str::FromStr};

use derive_more::with_trait::{Display, Error};
use serde_json::Value as Json;

/// Single step of a [`JsonPath`].
#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    /// Object member.
    Field(String),

    /// Array element.
    Index(i64),

    /// Every member or element.
    Wildcard,
}

/// Parsed JSONPath expression.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JsonPath {
    /// Text the path was parsed from.
    source: String,

    /// Parsed segments.
    segments: Vec<Segment>,
}

/// Error of parsing a [`JsonPath`].
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
#[display("invalid JSONPath `{path}`: {reason}")]
pub struct InvalidJsonPath {
    /// Rejected path.
    pub path: String,

    /// Why it is rejected.
    pub reason: &'static str,
}

impl JsonPath {
    /// Selects the value at this path in the `document`.
    ///
    /// Missing members select [`Json::Null`]. Paths with wildcards select an
    /// array of every value found.
    #[must_use]
    pub fn select(&self, document: &Json) -> Json {
        let mut current = vec![document];
        for segment in &self.segments {
            current = current
                .into_iter()
                .flat_map(|value| step(value, segment))
                .collect();
        }
        if self.segments.contains(&Segment::Wildcard) {
            Json::Array(current.into_iter().cloned().collect())
        } else {
            current.first().map_or(Json::Null, |v| (*v).clone())
        }
    }
}

/// Applies a single [`Segment`] to the `value`.
fn step<'v>(value: &'v Json, segment: &Segment) -> Vec<&'v Json> {
    match (segment, value) {
        (Segment::Field(name), Json::Object(map)) => map.get(name).into_iter().collect(),
        (Segment::Index(i), Json::Array(items)) => {
            let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
            let idx = if *i < 0 { len + i } else { *i };
            usize::try_from(idx)
                .ok()
                .and_then(|idx| items.get(idx))
                .into_iter()
                .collect()
        }
        (Segment::Wildcard, Json::Array(items)) => items.iter().collect(),
        (Segment::Wildcard, Json::Object(map)) => map.values().collect(),
        _ => Vec::new(),
    }
}

impl FromStr for JsonPath {
    type Err = InvalidJsonPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| InvalidJsonPath { path: s.to_owned(), reason };

        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|t| t.strip_suffix('}'))
            .unwrap_or(trimmed);
        let mut rest = inner.strip_prefix('$').unwrap_or(inner);
        if !rest.is_empty() && !rest.starts_with(['.', '[']) {
            if inner.starts_with('$') {
                return Err(err("expected `.` or `[` after `$`"));
            }
            // Bare `status.phase` is read as `.status.phase`.
            return format!(".{rest}").parse().map_err(|_| err("malformed path"));
        }

        let mut segments = Vec::new();
        while let Some(c) = rest.chars().next() {
            if c == '.' {
                let after = &rest[1..];
                let end = after.find(['.', '[']).unwrap_or(after.len());
                let (name, tail) = after.split_at(end);
                segments.push(match name {
                    "" => return Err(err("empty member name")),
                    "*" => Segment::Wildcard,
                    name => Segment::Field(name.to_owned()),
                });
                rest = tail;
            } else if c == '[' {
                let end = rest.find(']').ok_or_else(|| err("unclosed `[`"))?;
                let selector = rest[1..end].trim();
                segments.push(parse_selector(selector).ok_or_else(|| err("invalid selector"))?);
                rest = &rest[end + 1..];
            } else {
                return Err(err("expected `.` or `[`"));
            }
        }

        Ok(Self { source: trimmed.to_owned(), segments })
    }
}

/// Parses the inside of a `[...]` selector.
fn parse_selector(selector: &str) -> Option<Segment> {
    if selector == "*" {
        return Some(Segment::Wildcard);
    }
    for quote in ['\'', '"'] {
        if let Some(name) = selector.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return Some(Segment::Field(name.to_owned()));
        }
    }
    selector.parse().ok().map(Segment::Index)
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

crate::from_arg_via_str!(JsonPath);
