// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Registry of matchers: phrases like `equal Running` or
//! ``jsonpath `$.status.phase` equal Running`` turned into [`Predicate`]s
//! over observed JSON objects.

mod builtin;
pub mod jsonpath;

use std::{fmt, sync::Arc};

use derive_more::with_trait::{Debug, Display, Error};
use serde_json::Value as Json;
use smart_default::SmartDefault;

use crate::{
    binder::{BindContext, bind_captures},
    error::{BindError, RegistrationError},
    parameter,
    pattern::CompiledPattern,
    step::Location,
    value::{ArgType, ArgumentError, FromArg, Value, take_arg},
};

pub use self::{
    builtin::{Comparator, UnknownComparator},
    jsonpath::{InvalidJsonPath, JsonPath},
};

/// Default limit of matcher nesting.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Predicate over an observed JSON value.
pub trait Match: fmt::Debug + fmt::Display + Send + Sync {
    /// Evaluates this predicate against the `actual` value.
    ///
    /// # Errors
    ///
    /// If the `actual` value cannot be evaluated at all, like a length of a
    /// number.
    fn matches(&self, actual: &Json) -> Result<bool, MatchError>;

    /// Describes why the `actual` value doesn't match.
    fn failure_message(&self, actual: &Json) -> String {
        format!("Expected\n    {actual}\nto {self}")
    }

    /// Describes why the `actual` value matches, while it shouldn't.
    fn negated_failure_message(&self, actual: &Json) -> String {
        format!("Expected\n    {actual}\nnot to {self}")
    }
}

/// Shared, type-erased [`Match`] implementation.
#[derive(Clone, Debug)]
pub struct Predicate(Arc<dyn Match>);

impl Predicate {
    /// Wraps the given [`Match`] implementation.
    #[must_use]
    pub fn new(matcher: impl Match + 'static) -> Self {
        Self(Arc::new(matcher))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Match for Predicate {
    fn matches(&self, actual: &Json) -> Result<bool, MatchError> {
        self.0.matches(actual)
    }

    fn failure_message(&self, actual: &Json) -> String {
        self.0.failure_message(actual)
    }

    fn negated_failure_message(&self, actual: &Json) -> String {
        self.0.negated_failure_message(actual)
    }
}

/// Error of evaluating a [`Match`].
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
#[display("{message}")]
pub struct MatchError {
    /// Human-readable reason.
    #[error(not(source))]
    pub message: String,
}

impl MatchError {
    /// Creates a new [`MatchError`].
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Error of [`Registry::parse()`].
#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum MatcherError {
    /// No registered matcher matches the whole text.
    #[display("no matcher matches `{text}`")]
    NoMatch {
        /// Unmatched text.
        #[error(not(source))]
        text: String,
    },

    /// Matchers nest deeper than the configured limit.
    #[display("matcher nesting exceeds the limit of {limit} at `{text}`")]
    RecursionLimit {
        /// Configured limit.
        limit: usize,

        /// Text at which the limit was hit.
        text: String,
    },

    /// Captures of the matched text couldn't be bound.
    #[display("cannot bind matcher `{text}`: {source}")]
    Bind {
        /// Matched text.
        text: String,

        /// Binding failure.
        source: BindError,
    },
}

/// Constructor of a [`Predicate`] from typed arguments.
///
/// Implemented for every `Fn(A1, ..., An) -> P` where each `Ai` is
/// [`FromArg`] and `P` is a [`Match`].
pub trait MatcherFn<Args>: Send + Sync + 'static {
    /// Returns the declared types of the parameters.
    fn signature() -> Vec<ArgType>;

    /// Builds a [`Predicate`] from already bound `args`.
    ///
    /// # Errors
    ///
    /// If any of the `args` cannot be converted into the declared type.
    fn call(&self, args: Vec<Value>) -> Result<Predicate, ArgumentError>;
}

macro_rules! impl_matcher_fn {
    ($($ty:ident),*) => {
        impl<F, P, $($ty,)*> MatcherFn<($($ty,)*)> for F
        where
            F: Fn($($ty,)*) -> P + Send + Sync + 'static,
            P: Match + 'static,
            $($ty: FromArg,)*
        {
            fn signature() -> Vec<ArgType> {
                vec![$($ty::TYPE,)*]
            }

            #[allow( // macro-generated
                non_snake_case,
                unused_assignments,
                unused_mut,
                unused_variables,
                reason = "not every arity uses every binding"
            )]
            fn call(&self, args: Vec<Value>) -> Result<Predicate, ArgumentError> {
                let mut args = args.into_iter();
                let mut position = 0;
                $(
                    let $ty = take_arg::<$ty>(&mut args, position)?;
                    position += 1;
                )*
                Ok(Predicate::new(self($($ty,)*)))
            }
        }
    };
}

impl_matcher_fn!();
impl_matcher_fn!(A1);
impl_matcher_fn!(A1, A2);
impl_matcher_fn!(A1, A2, A3);
impl_matcher_fn!(A1, A2, A3, A4);

/// Type-erased [`MatcherFn`].
type BuildFn = Arc<dyn Fn(Vec<Value>) -> Result<Predicate, ArgumentError> + Send + Sync>;

/// Definition of a matcher, before being validated by a [`Registry`].
#[derive(Clone, Debug)]
pub struct MatcherDefinition {
    /// Name of the matcher.
    name: String,

    /// Text with `{name}` placeholders.
    text: String,

    /// Declared parameter types.
    signature: Vec<ArgType>,

    /// Type-erased constructor.
    #[debug(skip)]
    build: BuildFn,

    /// Where this definition was created.
    location: Location,
}

impl MatcherDefinition {
    /// Creates a new [`MatcherDefinition`] of the `text`, constructed by the
    /// function `f`.
    #[must_use]
    #[track_caller]
    pub fn new<F, Args>(name: impl Into<String>, text: impl Into<String>, f: F) -> Self
    where
        F: MatcherFn<Args>,
    {
        Self {
            name: name.into(),
            text: text.into(),
            signature: F::signature(),
            build: Arc::new(move |args| f.call(args)),
            location: Location::caller(),
        }
    }

    /// Returns the name of this [`MatcherDefinition`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the text of this [`MatcherDefinition`].
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for MatcherDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "matcher `{}` at {}", self.name, self.location)
    }
}

/// [`MatcherDefinition`] validated against a [`parameter::Registry`].
#[derive(Clone, Debug)]
struct Matcher {
    definition: MatcherDefinition,
    pattern: CompiledPattern,
}

/// Registry of matchers, resolved in registration order.
#[derive(Clone, Debug, SmartDefault)]
pub struct Registry {
    /// Validated matchers.
    matchers: Vec<Matcher>,

    /// Maximum nesting of matchers inside matchers.
    #[default(DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

impl Registry {
    /// Creates a new empty [`Registry`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new [`Registry`] with all the built-in matchers, validated
    /// against the built-in parameters.
    #[must_use]
    pub fn with_builtins() -> Self {
        let parameters = parameter::Registry::with_builtins();
        let mut registry = Self::new();
        for definition in builtin::matchers() {
            // Built-in matchers only use built-in parameters.
            _ = registry.register(&parameters, definition);
        }
        registry
    }

    /// Returns all the built-in [`MatcherDefinition`]s.
    #[must_use]
    pub fn builtins() -> Vec<MatcherDefinition> {
        builtin::matchers()
    }

    /// Sets the maximum nesting depth of matchers.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns the maximum nesting depth of matchers.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Validates and appends the `definition`.
    ///
    /// # Errors
    ///
    /// - Any error of [`CompiledPattern::compile()`].
    /// - [`RegistrationError::TooFewArguments`],
    ///   [`RegistrationError::TooManyArguments`] or
    ///   [`RegistrationError::UnsupportedTarget`] if the constructor's
    ///   parameters don't fit the capture groups.
    pub fn register(
        &mut self,
        parameters: &parameter::Registry,
        definition: MatcherDefinition,
    ) -> Result<(), RegistrationError> {
        let describe = definition.to_string();
        let pattern = CompiledPattern::compile(parameters, &describe, &definition.text)?;
        pattern.check_targets(&describe, &definition.signature, 0)?;

        tracing::debug!(matcher = %describe, pattern = %pattern, "registered matcher");
        self.matchers.push(Matcher { definition, pattern });
        Ok(())
    }

    /// Returns the names of the registered matchers in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.matchers.iter().map(|m| m.definition.name())
    }

    /// Returns the number of registered matchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    /// Indicates whether no matcher is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Parses the matcher `text` into a [`Predicate`].
    ///
    /// The first matcher in registration order whose pattern matches the
    /// whole `text` wins. Nested matcher texts are parsed recursively.
    ///
    /// # Errors
    ///
    /// - [`MatcherError::NoMatch`] if no matcher matches.
    /// - [`MatcherError::Bind`] if the captures cannot be bound.
    /// - [`MatcherError::RecursionLimit`] if nesting exceeds
    ///   [`Registry::max_depth()`].
    pub fn parse(&self, text: &str) -> Result<Predicate, MatcherError> {
        self.parse_nested(text, 0)
    }

    /// Parses the matcher `text` found at the given nesting `depth`.
    ///
    /// # Errors
    ///
    /// See [`Registry::parse()`].
    pub fn parse_nested(&self, text: &str, depth: usize) -> Result<Predicate, MatcherError> {
        let text = text.trim();
        if depth >= self.max_depth {
            return Err(MatcherError::RecursionLimit {
                limit: self.max_depth,
                text: text.to_owned(),
            });
        }

        let Some((matcher, captures)) = self
            .matchers
            .iter()
            .find_map(|m| m.pattern.captures(text).map(|caps| (m, caps)))
        else {
            return Err(MatcherError::NoMatch { text: text.to_owned() });
        };

        let bind_error = |source| MatcherError::Bind { text: text.to_owned(), source };
        let cx = BindContext::nested(self, depth);
        let args = bind_captures(
            &cx,
            matcher.pattern.groups(),
            &captures,
            &matcher.definition.signature,
            0,
        )
        .map_err(bind_error)?;
        let predicate = (matcher.definition.build)(args)
            .map_err(|e| bind_error(BindError::Argument(e)))?;

        tracing::trace!(text, depth, predicate = %predicate, "parsed matcher");
        Ok(predicate)
    }
}
