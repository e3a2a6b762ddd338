// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Step definitions: a text pattern bound to a typed handler.

use std::fmt;

use derive_more::with_trait::Debug;

use crate::value::ArgType;

use super::{
    Location,
    handler::{self, ErasedHandler, Handler},
};

/// Name of the built-in doc-string parameter.
const DOCUMENT: &str = "document";

/// Name of the built-in data-table parameter.
const TABLE: &str = "table";

/// Definition of a step, before being validated by a [`Collection`].
///
/// ```rust
/// # use kubestep::step::{StepContext, StepDefinition};
/// let def = StepDefinition::new(
///     "{id} {should} have {number} replicas",
///     |_: StepContext, id: String, should: bool, replicas: i64| async move {
///         anyhow::ensure!(should || replicas >= 0, "{id}");
///         Ok(())
///     },
/// )
/// .named("replica count")
/// .with_help("Checks the replica count of a workload.")
/// .with_example("deployment/web should have 3 replicas");
///
/// assert_eq!(def.name(), Some("replica count"));
/// ```
///
/// [`Collection`]: super::Collection
#[derive(Clone, Debug)]
pub struct StepDefinition {
    /// Optional human-readable name.
    name: Option<String>,

    /// Text with `{name}` placeholders.
    text: String,

    /// Help text.
    help: Option<String>,

    /// Example usages.
    examples: Vec<String>,

    /// Name of the parameter binding the trailing step argument.
    step_argument: Option<String>,

    /// Declared types of the handler parameters after the context.
    signature: Vec<ArgType>,

    /// Type-erased handler.
    #[debug(skip)]
    handler: ErasedHandler,

    /// Where this definition was created.
    location: Location,
}

impl StepDefinition {
    /// Creates a new [`StepDefinition`] of the `text` handled by the
    /// `handler`.
    #[must_use]
    #[track_caller]
    pub fn new<H, Args>(text: impl Into<String>, handler: H) -> Self
    where
        H: Handler<Args>,
    {
        Self {
            name: None,
            text: text.into(),
            help: None,
            examples: Vec::new(),
            step_argument: None,
            signature: H::signature(),
            handler: handler::erase(handler),
            location: Location::caller(),
        }
    }

    /// Sets the name of this [`StepDefinition`].
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the help text of this [`StepDefinition`].
    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Adds an example usage of this [`StepDefinition`].
    #[must_use]
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    /// Declares the trailing step argument, bound by the step-argument
    /// [`Parameter`] of the given `name` into the handler's last parameter.
    ///
    /// [`Parameter`]: crate::parameter::Parameter
    #[must_use]
    pub fn with_step_argument(mut self, parameter: impl Into<String>) -> Self {
        self.step_argument = Some(parameter.into());
        self
    }

    /// Declares a trailing doc-string argument.
    #[must_use]
    pub fn with_doc_string(self) -> Self {
        self.with_step_argument(DOCUMENT)
    }

    /// Declares a trailing data-table argument.
    #[must_use]
    pub fn with_table(self) -> Self {
        self.with_step_argument(TABLE)
    }

    /// Returns the name of this [`StepDefinition`], if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the text of this [`StepDefinition`].
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the help text of this [`StepDefinition`], if any.
    #[must_use]
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// Returns the example usages of this [`StepDefinition`].
    #[must_use]
    pub fn examples(&self) -> &[String] {
        &self.examples
    }

    /// Returns the name of the declared step-argument parameter, if any.
    #[must_use]
    pub fn step_argument(&self) -> Option<&str> {
        self.step_argument.as_deref()
    }

    /// Returns the declared types of the handler parameters following the
    /// context.
    #[must_use]
    pub fn signature(&self) -> &[ArgType] {
        &self.signature
    }

    /// Returns the [`Location`] this [`StepDefinition`] was created at.
    #[must_use]
    pub const fn location(&self) -> Location {
        self.location
    }

    pub(crate) const fn handler(&self) -> &ErasedHandler {
        &self.handler
    }
}

impl fmt::Display for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "step `{name}` at {}", self.location),
            None => write!(f, "step `{}` at {}", self.text, self.location),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data_table::DataTable, step::StepContext};

    #[test]
    fn records_metadata() {
        let def = StepDefinition::new("a table", |_: StepContext, _: DataTable| async {
            Ok::<_, anyhow::Error>(())
        })
        .with_table()
        .with_example("a table\n| a | b |");

        assert_eq!(def.step_argument(), Some("table"));
        assert_eq!(def.signature(), [ArgType::DataTable]);
        assert_eq!(def.examples().len(), 1);
        assert_eq!(def.location().path, file!());
        assert!(def.to_string().starts_with("step `a table` at "));
    }
}
