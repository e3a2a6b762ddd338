// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Registration of parameters, matchers and step definitions.
//!
//! Everything is registered into a [`SchemeBuilder`] during initialization
//! and validated at once by [`SchemeBuilder::build()`], yielding a read-only
//! [`Scheme`].

use std::process;

use crate::{
    binder::{self, BindContext},
    cli::Cli,
    error::{BindError, RegistrationError, RegistrationErrors},
    matcher::{self, MatcherDefinition, MatcherError, Predicate},
    parameter::{self, Parameter},
    step::{self, ResolveError, Step, StepArgument, StepDefinition, StepHelper},
    value::Value,
};

/// Builder of a [`Scheme`].
///
/// Built-in parameters and matchers are always registered first, so custom
/// matchers may use any built-in parameter, and custom steps any matcher.
///
/// ```rust
/// # use kubestep::{Scheme, StepDefinition, StepContext};
/// let scheme = Scheme::builder()
///     .step(StepDefinition::new(
///         "pod {id} is deleted",
///         |_: StepContext, pod: String| async move {
///             anyhow::ensure!(!pod.is_empty(), "no pod");
///             Ok(())
///         },
///     ))
///     .build()
///     .unwrap();
///
/// assert_eq!(scheme.steps().len(), 1);
/// ```
#[derive(Debug)]
#[must_use]
pub struct SchemeBuilder {
    parameters: Vec<Parameter>,
    matchers: Vec<MatcherDefinition>,
    steps: Vec<StepDefinition>,
    max_matcher_depth: usize,
}

impl Default for SchemeBuilder {
    fn default() -> Self {
        Self {
            parameters: Vec::new(),
            matchers: matcher::Registry::builtins(),
            steps: Vec::new(),
            max_matcher_depth: matcher::DEFAULT_MAX_DEPTH,
        }
    }
}

impl SchemeBuilder {
    /// Creates a new [`SchemeBuilder`] with the built-ins only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom [`Parameter`].
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Registers a custom matcher, tried after every one registered before.
    pub fn matcher(mut self, definition: MatcherDefinition) -> Self {
        self.matchers.push(definition);
        self
    }

    /// Registers a step definition, tried after every one registered before.
    pub fn step(mut self, definition: StepDefinition) -> Self {
        self.steps.push(definition);
        self
    }

    /// Registers all the given step definitions in order.
    pub fn steps(mut self, definitions: impl IntoIterator<Item = StepDefinition>) -> Self {
        self.steps.extend(definitions);
        self
    }

    /// Limits how deep matchers may nest inside matchers.
    pub fn max_matcher_depth(mut self, depth: usize) -> Self {
        self.max_matcher_depth = depth;
        self
    }

    /// Applies the [`Cli`] options concerning registration.
    pub fn with_config(self, cli: &Cli) -> Self {
        self.max_matcher_depth(cli.max_matcher_depth)
    }

    /// Validates everything registered and builds the [`Scheme`].
    ///
    /// # Errors
    ///
    /// Every [`RegistrationError`] found, not just the first one.
    pub fn build(self) -> Result<Scheme, RegistrationErrors> {
        let mut errors = Vec::new();
        let mut record = |res: Result<(), RegistrationError>| {
            if let Err(e) = res {
                tracing::warn!(%e, "registration failed");
                errors.push(e);
            }
        };

        let mut parameters = parameter::Registry::with_builtins();
        for p in self.parameters {
            record(parameters.register(p));
        }

        let mut matchers = matcher::Registry::new().with_max_depth(self.max_matcher_depth);
        for m in self.matchers {
            record(matchers.register(&parameters, m));
        }

        let mut steps = step::Collection::new();
        for s in self.steps {
            record(steps.add(&parameters, s));
        }

        if !errors.is_empty() {
            return Err(RegistrationErrors(errors));
        }
        tracing::debug!(
            parameters = parameters.len(),
            matchers = matchers.len(),
            steps = steps.len(),
            "scheme built",
        );
        Ok(Scheme { parameters, matchers, steps })
    }

    /// Builds the [`Scheme`], or prints every [`RegistrationError`] and
    /// exits the process with a non-zero code.
    pub fn build_or_exit(self) -> Scheme {
        match self.build() {
            Ok(scheme) => scheme,
            Err(e) => {
                eprintln!("Invalid step registration: {e}");
                process::exit(1);
            }
        }
    }
}

/// Validated, read-only set of parameters, matchers and step definitions.
#[derive(Clone, Debug)]
pub struct Scheme {
    parameters: parameter::Registry,
    matchers: matcher::Registry,
    steps: step::Collection,
}

impl Scheme {
    /// Creates a new [`SchemeBuilder`].
    pub fn builder() -> SchemeBuilder {
        SchemeBuilder::new()
    }

    /// Returns the registered parameters.
    #[must_use]
    pub const fn parameters(&self) -> &parameter::Registry {
        &self.parameters
    }

    /// Returns the registered matchers.
    #[must_use]
    pub const fn matchers(&self) -> &matcher::Registry {
        &self.matchers
    }

    /// Returns the registered step definitions.
    #[must_use]
    pub const fn steps(&self) -> &step::Collection {
        &self.steps
    }

    /// Resolves the step `text` to the first matching [`Step`] and its raw
    /// captures.
    ///
    /// # Errors
    ///
    /// [`ResolveError::NoMatch`] if no [`Step`] matches.
    pub fn resolve(&self, text: &str) -> Result<(&Step, Vec<String>), ResolveError> {
        self.steps.resolve(text)
    }

    /// Binds the arguments of a resolved [`Step`].
    ///
    /// # Errors
    ///
    /// See [`binder::bind()`].
    pub fn bind(
        &self,
        step: &Step,
        captures: &[String],
        argument: Option<&StepArgument>,
        helper: &StepHelper,
    ) -> Result<Vec<Value>, BindError> {
        binder::bind(&BindContext::new(&self.matchers), step, captures, argument, helper)
    }

    /// Parses a matcher `text` into a [`Predicate`].
    ///
    /// # Errors
    ///
    /// See [`matcher::Registry::parse()`].
    pub fn parse_matcher(&self, text: &str) -> Result<Predicate, MatcherError> {
        self.matchers.parse(text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{matcher::Match as _, step::StepContext, value::ArgType};

    async fn noop(_: StepContext, _: String) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn collects_every_error() {
        let err = Scheme::builder()
            .parameter(Parameter::capture("id", "x", |s, _, _| Ok(Value::String(s.into()))))
            .step(StepDefinition::new("pod {pod} exists", noop))
            .step(StepDefinition::new("pod exists", noop))
            .build()
            .unwrap_err();

        assert!(matches!(
            err.errors(),
            [
                RegistrationError::DuplicateParameter { .. },
                RegistrationError::UnknownParameter { .. },
                RegistrationError::TooManyArguments { captures: 0, declared: 1, .. },
            ],
        ));
    }

    #[test]
    fn custom_matchers_see_custom_parameters() {
        #[derive(Debug, derive_more::Display)]
        #[display("be in phase {_0}")]
        struct Phase(String);

        impl crate::matcher::Match for Phase {
            fn matches(&self, actual: &serde_json::Value) -> Result<bool, matcher::MatchError> {
                Ok(*actual == *self.0)
            }
        }

        let scheme = Scheme::builder()
            .parameter(
                Parameter::capture("phase", "Pending|Running|Succeeded", |s, _, _| {
                    Ok(Value::String(s.into()))
                })
                .with_targets(&[ArgType::String]),
            )
            .matcher(MatcherDefinition::new("phase", "be in phase {phase}", Phase))
            .build()
            .unwrap();

        let ready = scheme.parse_matcher("jsonpath `.status.phase` be in phase Running").unwrap();
        assert_eq!(ready.matches(&json!({"status": {"phase": "Running"}})), Ok(true));
    }

    #[test]
    fn limits_matcher_nesting() {
        let scheme = Scheme::builder().max_matcher_depth(2).build().unwrap();

        assert!(scheme.parse_matcher("jsonpath `.a` be true").is_ok());
        assert!(scheme.parse_matcher("jsonpath `.a` jsonpath `.b` be true").is_err());
    }
}
