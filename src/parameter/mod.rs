// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Named placeholders, their regex fragments and typed parsers.
//!
//! A step or matcher text like `{id} {should} exist` is expanded by
//! [`Registry::substitute()`] into a regular expression, every `{name}`
//! placeholder being replaced with the fragment of the registered
//! [`Parameter`].

mod builtin;

use std::{collections::HashMap, fmt, sync::Arc};

use derive_more::with_trait::Debug;

use crate::{
    binder::BindContext,
    data_table::DataTable,
    error::RegistrationError,
    step::DocString,
    value::{ArgType, ConversionError, Value},
};

/// Parser of a captured substring.
pub type CaptureParser = Arc<
    dyn Fn(&str, ArgType, &BindContext<'_>) -> Result<Value, ConversionError>
        + Send
        + Sync,
>;

/// Parser of a [`DocString`] step argument.
pub type DocStringParser =
    Arc<dyn Fn(&DocString, ArgType) -> Result<Value, ConversionError> + Send + Sync>;

/// Parser of a [`DataTable`] step argument.
pub type DataTableParser =
    Arc<dyn Fn(&DataTable, ArgType) -> Result<Value, ConversionError> + Send + Sync>;

/// Parsing capability of a [`Parameter`].
#[derive(Clone, Debug)]
pub enum Parser {
    /// Parses a substring captured by the parameter's fragment.
    Capture(#[debug(skip)] CaptureParser),

    /// Parses a trailing [`DocString`] step argument.
    DocString(#[debug(skip)] DocStringParser),

    /// Parses a trailing [`DataTable`] step argument.
    DataTable(#[debug(skip)] DataTableParser),
}

/// Kind of a trailing step argument.
#[derive(Clone, Copy, Debug, derive_more::Display, Eq, PartialEq)]
pub enum StepArgumentKind {
    /// Multi-line doc-string.
    #[display("doc-string")]
    DocString,

    /// Data table.
    #[display("data-table")]
    DataTable,
}

/// Named placeholder bound to a regex fragment and a typed parser.
#[derive(Clone, Debug)]
pub struct Parameter {
    /// Unique name, referenced as `{name}` in texts.
    name: String,

    /// Regular expression fragment replacing the placeholder.
    ///
    /// Empty for step-argument parameters.
    regex: String,

    /// Parsing capability.
    parser: Parser,

    /// Target types this parameter can produce.
    ///
    /// Empty means "anything the parser accepts".
    targets: Vec<ArgType>,
}

impl Parameter {
    /// Creates a new [`Parameter`] parsing captures of the `regex` fragment.
    pub fn capture<F>(name: impl Into<String>, regex: impl Into<String>, parser: F) -> Self
    where
        F: Fn(&str, ArgType, &BindContext<'_>) -> Result<Value, ConversionError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            regex: regex.into(),
            parser: Parser::Capture(Arc::new(parser)),
            targets: Vec::new(),
        }
    }

    /// Creates a new trailing [`DocString`] [`Parameter`].
    pub fn doc_string<F>(name: impl Into<String>, parser: F) -> Self
    where
        F: Fn(&DocString, ArgType) -> Result<Value, ConversionError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            regex: String::new(),
            parser: Parser::DocString(Arc::new(parser)),
            targets: Vec::new(),
        }
    }

    /// Creates a new trailing [`DataTable`] [`Parameter`].
    pub fn data_table<F>(name: impl Into<String>, parser: F) -> Self
    where
        F: Fn(&DataTable, ArgType) -> Result<Value, ConversionError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            regex: String::new(),
            parser: Parser::DataTable(Arc::new(parser)),
            targets: Vec::new(),
        }
    }

    /// Restricts the target types this [`Parameter`] can be bound to.
    ///
    /// Handlers declaring any other type at this parameter's position are
    /// rejected at registration time.
    #[must_use]
    pub fn with_targets(mut self, targets: &[ArgType]) -> Self {
        self.targets = targets.to_vec();
        self
    }

    /// Returns the name of this [`Parameter`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the regex fragment of this [`Parameter`].
    #[must_use]
    pub fn regex(&self) -> &str {
        &self.regex
    }

    /// Returns the parsing capability of this [`Parameter`].
    #[must_use]
    pub const fn parser(&self) -> &Parser {
        &self.parser
    }

    /// Returns the [`StepArgumentKind`] of this [`Parameter`], if it binds a
    /// trailing step argument rather than a capture.
    #[must_use]
    pub const fn step_argument(&self) -> Option<StepArgumentKind> {
        match self.parser {
            Parser::Capture(_) => None,
            Parser::DocString(_) => Some(StepArgumentKind::DocString),
            Parser::DataTable(_) => Some(StepArgumentKind::DataTable),
        }
    }

    /// Indicates whether this [`Parameter`] can produce the `target` type.
    #[must_use]
    pub fn supports(&self, target: ArgType) -> bool {
        if target == ArgType::Helper {
            return false;
        }
        if self.targets.is_empty() {
            return match self.parser {
                Parser::Capture(_) => !target.is_step_argument(),
                Parser::DocString(_) => target != ArgType::DataTable,
                Parser::DataTable(_) => target != ArgType::DocString,
            };
        }
        self.targets.contains(&target)
    }
}

/// Result of [`Registry::substitute()`].
#[derive(Clone, Debug)]
pub struct Substitution {
    /// Regular expression with every placeholder replaced by a capture group
    /// wrapping its fragment. Not anchored.
    pub pattern: String,

    /// Substituted [`Parameter`]s in encounter order.
    pub parameters: Vec<Arc<Parameter>>,
}

/// Prefix of capture group names generated for placeholders.
pub(crate) const GROUP_PREFIX: &str = "__param";

/// Registry of [`Parameter`]s.
#[derive(Clone, Default)]
pub struct Registry {
    parameters: HashMap<String, Arc<Parameter>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.parameters.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("Registry").field("parameters", &names).finish()
    }
}

impl Registry {
    /// Creates a new empty [`Registry`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new [`Registry`] with all the built-in [`Parameter`]s.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for parameter in builtin::parameters() {
            // Built-in names are distinct.
            _ = registry.register(parameter);
        }
        registry
    }

    /// Registers a new [`Parameter`].
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::DuplicateParameter`] if the name is taken.
    /// - [`RegistrationError::InvalidFragment`] if the fragment doesn't
    ///   compile or contains capture groups of its own.
    pub fn register(&mut self, parameter: Parameter) -> Result<(), RegistrationError> {
        if self.parameters.contains_key(&parameter.name) {
            return Err(RegistrationError::DuplicateParameter {
                name: parameter.name,
            });
        }
        if parameter.step_argument().is_none() {
            let re = regex::Regex::new(&parameter.regex).map_err(|e| {
                RegistrationError::InvalidFragment {
                    name: parameter.name.clone(),
                    reason: e.to_string(),
                }
            })?;
            if re.captures_len() != 1 {
                return Err(RegistrationError::InvalidFragment {
                    name: parameter.name,
                    reason: "fragment must not contain capture groups, use \
                             `(?:...)` instead"
                        .into(),
                });
            }
        }
        tracing::trace!(name = %parameter.name, regex = %parameter.regex, "registered parameter");
        _ = self
            .parameters
            .insert(parameter.name.clone(), Arc::new(parameter));
        Ok(())
    }

    /// Returns the [`Parameter`] registered under the `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Parameter>> {
        self.parameters.get(name)
    }

    /// Returns the number of registered [`Parameter`]s.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Indicates whether no [`Parameter`] is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Replaces every `{name}` placeholder in the `text` with the fragment of
    /// the corresponding [`Parameter`], wrapped into a named capture group.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::UnknownParameter`] if a placeholder isn't
    ///   registered.
    /// - [`RegistrationError::StepArgumentPlaceholder`] if a placeholder
    ///   names a step-argument parameter, which has no text form.
    pub fn substitute(&self, text: &str) -> Result<Substitution, RegistrationError> {
        let placeholder = lazy_regex::regex!(r"\{([A-Za-z][A-Za-z0-9_-]*)\}");

        let mut pattern = String::with_capacity(text.len());
        let mut parameters = Vec::new();
        let mut last = 0;
        for caps in placeholder.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let parameter = self.parameters.get(name.as_str()).ok_or_else(|| {
                RegistrationError::UnknownParameter {
                    name: name.as_str().to_owned(),
                    text: text.to_owned(),
                }
            })?;
            if parameter.step_argument().is_some() {
                return Err(RegistrationError::StepArgumentPlaceholder {
                    name: parameter.name.clone(),
                    text: text.to_owned(),
                });
            }

            pattern.push_str(&text[last..whole.start()]);
            pattern.push_str(&format!(
                "(?P<{GROUP_PREFIX}{}>{})",
                parameters.len(),
                parameter.regex,
            ));
            parameters.push(Arc::clone(parameter));
            last = whole.end();
        }
        pattern.push_str(&text[last..]);

        Ok(Substitution { pattern, parameters })
    }
}
