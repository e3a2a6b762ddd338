// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Definitions for a [`Collection`] which is used to store validated
//! [`StepDefinition`]s and resolve step text against them.

use std::sync::Arc;

use crate::{
    error::RegistrationError,
    parameter::{self, Parameter},
    pattern::CompiledPattern,
    value::ArgType,
};

use super::{StepDefinition, error::ResolveError};

/// [`StepDefinition`] validated against a [`parameter::Registry`].
#[derive(Clone, Debug)]
pub struct Step {
    /// Original definition.
    definition: StepDefinition,

    /// Compiled text.
    pattern: CompiledPattern,

    /// Whether the handler takes a [`StepHelper`] right after the context.
    ///
    /// [`StepHelper`]: super::StepHelper
    helper: bool,

    /// Parameter binding the trailing step argument, if declared.
    step_argument: Option<Arc<Parameter>>,
}

impl Step {
    /// Validates the `definition` against the `parameters`.
    ///
    /// # Errors
    ///
    /// See [`Collection::add()`].
    pub fn compile(
        parameters: &parameter::Registry,
        definition: StepDefinition,
    ) -> Result<Self, RegistrationError> {
        let describe = definition.to_string();
        let signature = definition.signature();

        if let Some(position) = signature
            .iter()
            .enumerate()
            .skip(1)
            .find_map(|(i, t)| (*t == ArgType::Helper).then_some(i))
        {
            return Err(RegistrationError::MisplacedHelper { definition: describe, position });
        }
        let helper = signature.first() == Some(&ArgType::Helper);
        let first_capture = usize::from(helper);

        let step_argument = match definition.step_argument() {
            Some(name) => {
                let parameter = parameters.get(name).ok_or_else(|| {
                    RegistrationError::UnknownParameter {
                        name: name.to_owned(),
                        text: definition.text().to_owned(),
                    }
                })?;
                if parameter.step_argument().is_none() {
                    return Err(RegistrationError::NotAStepArgument {
                        definition: describe,
                        name: name.to_owned(),
                    });
                }
                match signature.get(first_capture..).and_then(<[_]>::last) {
                    Some(&last) if parameter.supports(last) => {}
                    Some(&last) => {
                        return Err(RegistrationError::StepArgumentMismatch {
                            definition: describe,
                            reason: format!(
                                "step argument `{name}` cannot produce the \
                                 handler's last argument of type {last}",
                            ),
                        });
                    }
                    None => {
                        return Err(RegistrationError::StepArgumentMismatch {
                            definition: describe,
                            reason: format!(
                                "handler has no argument for step argument `{name}`",
                            ),
                        });
                    }
                }
                Some(Arc::clone(parameter))
            }
            None => None,
        };

        let captures_end = signature.len() - usize::from(step_argument.is_some());
        let capture_targets = signature.get(first_capture..captures_end).unwrap_or_default();
        if let Some(t) = capture_targets.iter().find(|t| t.is_step_argument()) {
            return Err(RegistrationError::StepArgumentMismatch {
                definition: describe,
                reason: format!("handler takes a {t} argument, but none is declared"),
            });
        }

        let pattern = CompiledPattern::compile(parameters, &describe, definition.text())?;
        pattern.check_targets(&describe, capture_targets, first_capture)?;

        tracing::debug!(
            step = %describe,
            pattern = %pattern,
            step_argument = definition.step_argument(),
            "registered step definition"
        );
        Ok(Self { definition, pattern, helper, step_argument })
    }

    /// Returns the original [`StepDefinition`].
    #[must_use]
    pub const fn definition(&self) -> &StepDefinition {
        &self.definition
    }

    /// Returns the [`CompiledPattern`] of this [`Step`].
    #[must_use]
    pub const fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    /// Indicates whether the handler takes a [`StepHelper`] right after the
    /// context.
    ///
    /// [`StepHelper`]: super::StepHelper
    #[must_use]
    pub const fn takes_helper(&self) -> bool {
        self.helper
    }

    /// Returns the [`Parameter`] binding the trailing step argument, if any.
    #[must_use]
    pub const fn step_argument(&self) -> Option<&Arc<Parameter>> {
        self.step_argument.as_ref()
    }

    /// Returns the declared types of the capture arguments.
    #[must_use]
    pub fn capture_targets(&self) -> &[ArgType] {
        let sig = self.definition.signature();
        let start = usize::from(self.helper);
        let end = sig.len() - usize::from(self.step_argument.is_some());
        sig.get(start..end).unwrap_or_default()
    }

    /// Returns the declared type of the trailing step argument, if any.
    #[must_use]
    pub fn step_argument_target(&self) -> Option<ArgType> {
        self.step_argument
            .as_ref()
            .and_then(|_| self.definition.signature().last().copied())
    }
}

/// Collection of [`Step`]s in registration order.
///
/// Populated once through a [`SchemeBuilder`] and immutable afterwards.
///
/// [`SchemeBuilder`]: crate::SchemeBuilder
#[derive(Clone, Debug, Default)]
pub struct Collection {
    steps: Vec<Step>,
}

impl Collection {
    /// Creates a new empty [`Collection`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and appends the `definition`.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::EmptyText`] if the text is blank.
    /// - [`RegistrationError::UnknownParameter`] if a placeholder or the
    ///   declared step argument isn't registered.
    /// - [`RegistrationError::MisplacedHelper`] if a step helper is declared
    ///   anywhere but right after the context.
    /// - [`RegistrationError::StepArgumentMismatch`] or
    ///   [`RegistrationError::NotAStepArgument`] if the trailing step
    ///   argument and the handler disagree.
    /// - [`RegistrationError::TooFewArguments`] or
    ///   [`RegistrationError::TooManyArguments`] if the handler's capture
    ///   arguments don't match the capture groups.
    /// - [`RegistrationError::UnsupportedTarget`] if a parameter cannot
    ///   produce the declared argument type.
    pub fn add(
        &mut self,
        parameters: &parameter::Registry,
        definition: StepDefinition,
    ) -> Result<(), RegistrationError> {
        self.steps.push(Step::compile(parameters, definition)?);
        Ok(())
    }

    /// Resolves the step `text` against the registered [`Step`]s.
    ///
    /// The first [`Step`] in registration order whose pattern matches the
    /// whole `text` wins.
    ///
    /// # Errors
    ///
    /// [`ResolveError::NoMatch`] if no [`Step`] matches.
    pub fn resolve(&self, text: &str) -> Result<(&Step, Vec<String>), ResolveError> {
        let resolved = self
            .steps
            .iter()
            .find_map(|step| step.pattern.captures(text).map(|caps| (step, caps)));
        match resolved {
            Some((step, captures)) => {
                tracing::trace!(text, definition = %step.definition, "resolved step");
                Ok((step, captures))
            }
            None => Err(ResolveError::NoMatch { text: text.to_owned() }),
        }
    }

    /// Returns all the registered [`Step`]s in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    /// Returns the number of registered [`Step`]s.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Indicates whether no [`Step`] is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_table::DataTable,
        step::{DocString, StepContext, StepHelper},
        value::Structured,
    };

    fn add(collection: &mut Collection, def: StepDefinition) -> Result<(), RegistrationError> {
        collection.add(&parameter::Registry::with_builtins(), def)
    }

    async fn noop(_: StepContext) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn first_registered_match_wins() {
        let mut steps = Collection::new();
        add(&mut steps, StepDefinition::new("{id} is ready", |_: StepContext, _: String| async {
            Ok::<_, anyhow::Error>(())
        }).named("specific")).unwrap();
        add(&mut steps, StepDefinition::new("{text} is ready", |_: StepContext, _: String| async {
            Ok::<_, anyhow::Error>(())
        }).named("generic")).unwrap();

        let (step, captures) = steps.resolve("pod/web is ready").unwrap();
        assert_eq!(step.definition().name(), Some("specific"));
        assert_eq!(captures, ["pod/web"]);

        let (step, _) = steps.resolve("Web Server is ready").unwrap();
        assert_eq!(step.definition().name(), Some("generic"));

        assert_eq!(
            steps.resolve("nothing happens").unwrap_err(),
            ResolveError::NoMatch { text: "nothing happens".into() },
        );
    }

    #[test]
    fn arity_must_match_captures() {
        let mut steps = Collection::new();

        let err = add(&mut steps, StepDefinition::new("{id} is ready", noop)).unwrap_err();
        assert!(matches!(err, RegistrationError::TooFewArguments { captures: 1, declared: 0, .. }));

        let err = add(
            &mut steps,
            StepDefinition::new("all is ready", |_: StepContext, _: String| async {
                Ok::<_, anyhow::Error>(())
            }),
        )
        .unwrap_err();
        assert!(matches!(err, RegistrationError::TooManyArguments { captures: 0, declared: 1, .. }));

        assert!(steps.is_empty());
    }

    #[test]
    fn helper_and_step_argument_are_not_captures() {
        let mut steps = Collection::new();
        add(
            &mut steps,
            StepDefinition::new(
                "I apply {id}",
                |_: StepContext, _: StepHelper, _: String, _: DocString| async {
                    Ok::<_, anyhow::Error>(())
                },
            )
            .with_doc_string(),
        )
        .unwrap();

        let step = steps.iter().next().unwrap();
        assert!(step.takes_helper());
        assert_eq!(step.capture_targets(), [ArgType::String]);
        assert_eq!(step.step_argument_target(), Some(ArgType::DocString));
    }

    #[test]
    fn helper_must_follow_context() {
        let mut steps = Collection::new();
        let err = add(
            &mut steps,
            StepDefinition::new("{id} is fine", |_: StepContext, _: String, _: StepHelper| async {
                Ok::<_, anyhow::Error>(())
            }),
        )
        .unwrap_err();

        assert!(matches!(err, RegistrationError::MisplacedHelper { position: 1, .. }));
    }

    #[test]
    fn step_argument_must_fit_last_argument() {
        let mut steps = Collection::new();

        let err = add(
            &mut steps,
            StepDefinition::new("a table", |_: StepContext, _: DocString| async {
                Ok::<_, anyhow::Error>(())
            })
            .with_table(),
        )
        .unwrap_err();
        assert!(matches!(err, RegistrationError::StepArgumentMismatch { .. }));

        let err = add(
            &mut steps,
            StepDefinition::new("a document", |_: StepContext, _: DocString| async {
                Ok::<_, anyhow::Error>(())
            }),
        )
        .unwrap_err();
        assert!(matches!(err, RegistrationError::StepArgumentMismatch { .. }));

        let err = add(&mut steps, StepDefinition::new("nothing", noop).with_table()).unwrap_err();
        assert!(matches!(err, RegistrationError::StepArgumentMismatch { .. }));

        let err = add(
            &mut steps,
            StepDefinition::new("{id}", |_: StepContext, _: String| async {
                Ok::<_, anyhow::Error>(())
            })
            .with_step_argument("id"),
        )
        .unwrap_err();
        assert!(matches!(err, RegistrationError::NotAStepArgument { .. }));

        add(
            &mut steps,
            StepDefinition::new(
                "a config",
                |_: StepContext, _: Structured<std::collections::HashMap<String, i64>>| async {
                    Ok::<_, anyhow::Error>(())
                },
            )
            .with_table(),
        )
        .unwrap();
    }
}
