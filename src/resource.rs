// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Resource references and request options shared by step handlers and the
//! [`ResourceClient`] contract.
//!
//! [`ResourceClient`]: crate::client::ResourceClient

use std::{str::FromStr, time::Duration};

use derive_more::with_trait::{Display, Error};
use lazy_regex::regex_captures;

use crate::{
    data_table::DataTable,
    from_arg_via_str,
    value::{ArgType, ConversionError, Value},
};

/// Reference to a cluster resource written in a step, like `pod/web-0` or
/// `web-0`.
#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("{}{name}", kind.as_ref().map(|k| format!("{k}/")).unwrap_or_default())]
pub struct ResourceRef {
    /// Kind of the resource, if spelled out.
    pub kind: Option<String>,

    /// DNS-label name of the resource.
    pub name: String,
}

impl ResourceRef {
    /// Creates a new [`ResourceRef`] of the given `kind`.
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self { kind: Some(kind.into()), name: name.into() }
    }
}

/// Error of parsing a [`ResourceRef`].
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
#[display("`{_0}` is not a valid resource reference")]
pub struct InvalidReference(#[error(not(source))] pub String);

impl FromStr for ResourceRef {
    type Err = InvalidReference;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, kind, name) = regex_captures!(
            r"^(?:([a-z0-9](?:[-a-z0-9.]*[a-z0-9])?)/)?([a-z0-9](?:[-a-z0-9]*[a-z0-9])?)$",
            s.trim(),
        )
        .ok_or_else(|| InvalidReference(s.to_owned()))?;
        if name.len() > 63 {
            return Err(InvalidReference(s.to_owned()));
        }
        Ok(Self {
            kind: (!kind.is_empty()).then(|| kind.to_owned()),
            name: name.to_owned(),
        })
    }
}

from_arg_via_str!(ResourceRef);

/// Option of a mutating request against the cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResourceOption {
    /// Validate the request server-side without persisting anything.
    DryRunAll,

    /// Field manager recorded for server-side field ownership.
    FieldOwner(String),

    /// Server-side field validation level (`Strict`, `Warn`, `Ignore`).
    FieldValidation(String),

    /// Grace period before a deletion takes effect.
    GracePeriod(Duration),

    /// Dependents propagation policy of a deletion.
    PropagationPolicy(String),
}

/// Which request an options table configures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum OptionsFor {
    /// `create` and `update` requests.
    Write,

    /// `delete` and `evict` requests.
    Delete,
}

/// Parses a two-column options table, like:
///
/// ```gherkin
/// | dry run     | true  |
/// | field owner | alice |
/// ```
pub(crate) fn parse_options(
    table: &DataTable,
    purpose: OptionsFor,
) -> Result<Vec<ResourceOption>, ConversionError> {
    let mut options = Vec::new();
    for (key, value) in table.key_values()? {
        let key = key
            .trim()
            .to_ascii_lowercase()
            .replace(['-', '_'], " ");
        let option = match (key.as_str(), purpose) {
            ("dry run", _) => match Value::sniff(value) {
                Value::Bool(true) => Some(ResourceOption::DryRunAll),
                Value::Bool(false) => None,
                _ => {
                    return Err(ConversionError::invalid(
                        ArgType::Options,
                        format!("dry run expects a boolean, got `{value}`"),
                    ));
                }
            },
            ("field owner" | "field manager", OptionsFor::Write) => {
                Some(ResourceOption::FieldOwner(value.trim().to_owned()))
            }
            ("field validation", OptionsFor::Write) => {
                Some(ResourceOption::FieldValidation(value.trim().to_owned()))
            }
            ("grace period", OptionsFor::Delete) => {
                let period = match Value::sniff(value) {
                    Value::Int(secs) => u64::try_from(secs)
                        .map(Duration::from_secs)
                        .map_err(|e| {
                            ConversionError::invalid(ArgType::Options, e)
                        })?,
                    _ => humantime::parse_duration(value.trim()).map_err(
                        |e| ConversionError::invalid(ArgType::Options, e),
                    )?,
                };
                Some(ResourceOption::GracePeriod(period))
            }
            ("propagation policy", OptionsFor::Delete) => {
                Some(ResourceOption::PropagationPolicy(value.trim().to_owned()))
            }
            _ => {
                return Err(ConversionError::invalid(
                    ArgType::Options,
                    format!("unknown option `{key}`"),
                ));
            }
        };
        options.extend(option);
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_references() {
        assert_eq!(
            "pod/web-0".parse::<ResourceRef>(),
            Ok(ResourceRef::new("pod", "web-0")),
        );
        assert_eq!(
            "deployment.apps/api".parse::<ResourceRef>().unwrap().to_string(),
            "deployment.apps/api",
        );
        let bare = "web".parse::<ResourceRef>().unwrap();
        assert_eq!(bare.kind, None);
        assert_eq!(bare.to_string(), "web");

        assert!("Web".parse::<ResourceRef>().is_err());
        assert!("web-".parse::<ResourceRef>().is_err());
        assert!("a/b/c".parse::<ResourceRef>().is_err());
    }

    #[test]
    fn parses_write_options() {
        let table = DataTable::from(vec![
            vec!["dry run", "true"],
            vec!["field owner", "alice"],
        ]);

        assert_eq!(
            parse_options(&table, OptionsFor::Write).unwrap(),
            vec![
                ResourceOption::DryRunAll,
                ResourceOption::FieldOwner("alice".into()),
            ],
        );
    }

    #[test]
    fn false_dry_run_is_omitted() {
        let table = DataTable::from(vec![vec!["Dry-Run", "false"]]);
        assert_eq!(parse_options(&table, OptionsFor::Write), Ok(vec![]));
    }

    #[test]
    fn parses_delete_options() {
        let table = DataTable::from(vec![
            vec!["grace period", "5"],
            vec!["propagation_policy", "Foreground"],
        ]);

        assert_eq!(
            parse_options(&table, OptionsFor::Delete).unwrap(),
            vec![
                ResourceOption::GracePeriod(Duration::from_secs(5)),
                ResourceOption::PropagationPolicy("Foreground".into()),
            ],
        );
    }

    #[test]
    fn rejects_options_of_another_request() {
        let table = DataTable::from(vec![vec!["grace period", "5s"]]);
        assert!(parse_options(&table, OptionsFor::Write).is_err());
    }

    #[test]
    fn rejects_wide_rows() {
        let table = DataTable::from(vec![vec!["dry run", "true", "extra"]]);
        assert_eq!(
            parse_options(&table, OptionsFor::Write),
            Err(ConversionError::TableMustBeWidthTwo { row: 0, width: 3 }),
        );
    }
}
