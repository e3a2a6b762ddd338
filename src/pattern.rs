// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Compiled, anchored patterns of step and matcher texts.

use std::{fmt, sync::Arc};

use regex::Regex;

use crate::{
    error::RegistrationError,
    parameter::{self, GROUP_PREFIX, Parameter},
    value::ArgType,
};

/// Anchored regular expression compiled from a text with `{name}`
/// placeholders.
///
/// Every capture group maps either to the [`Parameter`] whose placeholder
/// produced it, or to nothing for a plain group written in the text, which
/// binds through the default [`coerce()`] rule.
///
/// [`coerce()`]: crate::value::coerce
#[derive(Clone, Debug)]
pub struct CompiledPattern {
    /// Original text.
    text: String,

    /// `^(?:...)$` regex.
    regex: Regex,

    /// [`Parameter`] of every capture group, in group order.
    groups: Vec<Option<Arc<Parameter>>>,
}

impl CompiledPattern {
    /// Compiles the `text` of the `definition`, substituting placeholders
    /// from the `parameters` registry.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::EmptyText`] if the `text` is blank.
    /// - Any error of [`parameter::Registry::substitute()`].
    /// - [`RegistrationError::InvalidPattern`] if the result doesn't compile.
    pub fn compile(
        parameters: &parameter::Registry,
        definition: &str,
        text: &str,
    ) -> Result<Self, RegistrationError> {
        if text.trim().is_empty() {
            return Err(RegistrationError::EmptyText { definition: definition.to_owned() });
        }
        let substitution = parameters.substitute(text)?;
        let regex = Regex::new(&format!("^(?:{})$", substitution.pattern)).map_err(|e| {
            RegistrationError::InvalidPattern {
                definition: definition.to_owned(),
                reason: e.to_string(),
            }
        })?;

        let groups = regex
            .capture_names()
            .skip(1)
            .map(|name| {
                name.and_then(|n| n.strip_prefix(GROUP_PREFIX))
                    .and_then(|i| i.parse::<usize>().ok())
                    .and_then(|i| substitution.parameters.get(i))
                    .cloned()
            })
            .collect();

        Ok(Self { text: text.to_owned(), regex, groups })
    }

    /// Returns the original text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the compiled [`Regex`].
    #[must_use]
    pub const fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Returns the [`Parameter`] of every capture group.
    #[must_use]
    pub fn groups(&self) -> &[Option<Arc<Parameter>>] {
        &self.groups
    }

    /// Returns the number of capture groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Matches the whole `text`, returning every capture group's substring.
    ///
    /// Groups that didn't participate in the match capture an empty string.
    #[must_use]
    pub fn captures(&self, text: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(text)?;
        Some(
            (1..=self.groups.len())
                .map(|i| caps.get(i).map_or("", |m| m.as_str()).to_owned())
                .collect(),
        )
    }

    /// Checks the `targets` a handler declares for the capture groups.
    ///
    /// `offset` is the position of the first capture argument among the
    /// handler arguments, and only affects error reporting.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::TooFewArguments`] or
    ///   [`RegistrationError::TooManyArguments`] if the counts differ.
    /// - [`RegistrationError::UnsupportedTarget`] if a group cannot produce
    ///   the declared type.
    pub fn check_targets(
        &self,
        definition: &str,
        targets: &[ArgType],
        offset: usize,
    ) -> Result<(), RegistrationError> {
        let captures = self.group_count();
        let declared = targets.len();
        if declared < captures {
            return Err(RegistrationError::TooFewArguments {
                definition: definition.to_owned(),
                captures,
                declared,
            });
        }
        if declared > captures {
            return Err(RegistrationError::TooManyArguments {
                definition: definition.to_owned(),
                captures,
                declared,
            });
        }

        for (i, (group, &target)) in self.groups.iter().zip(targets).enumerate() {
            let (supported, parameter) = match group {
                Some(p) => (p.supports(target), format!("`{{{}}}`", p.name())),
                None => (coercible(target), format!("capture group {}", i + 1)),
            };
            if !supported {
                return Err(RegistrationError::UnsupportedTarget {
                    definition: definition.to_owned(),
                    position: offset + i,
                    parameter,
                    target,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.regex.as_str())
    }
}

/// Indicates whether a plain capture group can be coerced into the `target`.
const fn coercible(target: ArgType) -> bool {
    !matches!(
        target,
        ArgType::Predicate
            | ArgType::Options
            | ArgType::DocString
            | ArgType::DataTable
            | ArgType::Helper,
    )
}
