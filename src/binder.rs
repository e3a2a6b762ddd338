// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Binding of captured substrings and step arguments to typed handler
//! parameters.

use std::sync::Arc;

use crate::{
    error::BindError,
    matcher::{self, MatcherError, Predicate},
    parameter::{Parameter, Parser},
    step::{Step, StepArgument, StepHelper},
    value::{ArgType, ConversionError, Value, coerce},
};

/// Context available to [`Parameter`] parsers while binding.
///
/// Gives access to the [`matcher::Registry`] for parameters holding nested
/// matcher texts, and tracks how deep such nesting currently is.
#[derive(Clone, Copy, Debug)]
pub struct BindContext<'a> {
    /// Registry nested matcher texts are parsed with.
    matchers: &'a matcher::Registry,

    /// Current matcher nesting depth.
    depth: usize,
}

impl<'a> BindContext<'a> {
    /// Creates a new top-level [`BindContext`].
    #[must_use]
    pub const fn new(matchers: &'a matcher::Registry) -> Self {
        Self { matchers, depth: 0 }
    }

    /// Creates a new [`BindContext`] at the given matcher nesting `depth`.
    pub(crate) const fn nested(matchers: &'a matcher::Registry, depth: usize) -> Self {
        Self { matchers, depth }
    }

    /// Returns the current matcher nesting depth.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Parses a nested matcher `text` one level deeper.
    ///
    /// # Errors
    ///
    /// See [`matcher::Registry::parse()`].
    pub fn parse_matcher(&self, text: &str) -> Result<Predicate, MatcherError> {
        self.matchers.parse_nested(text, self.depth + 1)
    }
}

/// Binds the `captures` of the capture `groups` into the declared `targets`.
///
/// `offset` is the position of the first capture among the handler
/// arguments.
///
/// # Errors
///
/// [`BindError::Conversion`] naming the position, captured text and target
/// type of the first failing capture.
pub(crate) fn bind_captures(
    cx: &BindContext<'_>,
    groups: &[Option<Arc<Parameter>>],
    captures: &[String],
    targets: &[ArgType],
    offset: usize,
) -> Result<Vec<Value>, BindError> {
    groups
        .iter()
        .zip(captures)
        .zip(targets)
        .enumerate()
        .map(|(i, ((group, text), &target))| {
            let parsed = match group.as_deref().map(Parameter::parser) {
                Some(Parser::Capture(parse)) => parse(text, target, cx),
                Some(Parser::DocString(_) | Parser::DataTable(_)) => {
                    Err(ConversionError::unsupported(target))
                }
                None => coerce(text, target),
            };
            parsed.map_err(|source| BindError::Conversion {
                position: offset + i,
                text: text.clone(),
                target,
                source,
            })
        })
        .collect()
}

/// Binds the trailing step `argument` with the step-argument `parameter`
/// into the `target` type.
///
/// # Errors
///
/// - [`BindError::MissingStepArgument`] if the `argument` is absent or of
///   another kind.
/// - [`BindError::Conversion`] if the parser fails.
pub(crate) fn bind_step_argument(
    parameter: &Parameter,
    argument: Option<&StepArgument>,
    target: ArgType,
    position: usize,
) -> Result<Value, BindError> {
    let Some(expected) = parameter.step_argument() else {
        return Err(BindError::Conversion {
            position,
            text: parameter.name().to_owned(),
            target,
            source: ConversionError::unsupported(target),
        });
    };
    let parsed = match (parameter.parser(), argument) {
        (Parser::DocString(parse), Some(StepArgument::DocString(doc))) => parse(doc, target),
        (Parser::DataTable(parse), Some(StepArgument::DataTable(table))) => {
            parse(table, target)
        }
        _ => return Err(BindError::MissingStepArgument { expected }),
    };
    parsed.map_err(|source| BindError::Conversion {
        position,
        text: expected.to_string(),
        target,
        source,
    })
}

/// Binds all the arguments of a resolved [`Step`]: the `helper` if taken,
/// every capture, and the trailing step argument if declared.
///
/// # Errors
///
/// - [`BindError::Conversion`] if any capture or the step argument fails to
///   parse.
/// - [`BindError::MissingStepArgument`] or
///   [`BindError::UnexpectedStepArgument`] if the step argument doesn't fit
///   the definition.
pub fn bind(
    cx: &BindContext<'_>,
    step: &Step,
    captures: &[String],
    argument: Option<&StepArgument>,
    helper: &StepHelper,
) -> Result<Vec<Value>, BindError> {
    let offset = usize::from(step.takes_helper());
    let mut args = Vec::with_capacity(step.definition().signature().len());
    if step.takes_helper() {
        args.push(Value::Helper(helper.clone()));
    }
    args.extend(bind_captures(
        cx,
        step.pattern().groups(),
        captures,
        step.capture_targets(),
        offset,
    )?);

    match (step.step_argument(), step.step_argument_target()) {
        (Some(parameter), Some(target)) => {
            args.push(bind_step_argument(parameter, argument, target, args.len())?);
        }
        _ => {
            if let Some(arg) = argument {
                return Err(BindError::UnexpectedStepArgument { found: arg.kind() });
            }
        }
    }
    Ok(args)
}
