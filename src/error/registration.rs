// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Errors of building a [`Scheme`].
//!
//! [`Scheme`]: crate::Scheme

use std::fmt;

use derive_more::with_trait::{Display, Error};

use crate::value::ArgType;

/// Fatal misconfiguration detected while registering parameters, matchers
/// or step definitions.
///
/// Definitions are named by their text (or explicit name) and the
/// [`Location`] they were created at.
///
/// [`Location`]: crate::step::Location
#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum RegistrationError {
    /// Parameter name is already registered.
    #[display("parameter `{name}` is already registered")]
    DuplicateParameter {
        /// Name of the parameter.
        #[error(not(source))]
        name: String,
    },

    /// Parameter fragment doesn't compile or contains capture groups.
    #[display("parameter `{name}` has an invalid fragment: {reason}")]
    InvalidFragment {
        /// Name of the parameter.
        name: String,

        /// Why the fragment is rejected.
        reason: String,
    },

    /// Placeholder names no registered parameter.
    #[display("unknown parameter `{{{name}}}` in `{text}`")]
    UnknownParameter {
        /// Name inside the placeholder.
        name: String,

        /// Text containing the placeholder.
        text: String,
    },

    /// Placeholder names a doc-string or data-table parameter, which has no
    /// textual form.
    #[display(
        "parameter `{name}` binds a step argument and cannot be used as a \
         placeholder in `{text}`"
    )]
    StepArgumentPlaceholder {
        /// Name inside the placeholder.
        name: String,

        /// Text containing the placeholder.
        text: String,
    },

    /// Declared trailing step argument names a capture parameter.
    #[display("{definition}: parameter `{name}` doesn't bind a step argument")]
    NotAStepArgument {
        /// Offending definition.
        definition: String,

        /// Name of the parameter.
        name: String,
    },

    /// Definition text is empty.
    #[display("{definition}: text must not be empty")]
    EmptyText {
        /// Offending definition.
        #[error(not(source))]
        definition: String,
    },

    /// Substituted text isn't a valid regular expression.
    #[display("{definition}: invalid pattern: {reason}")]
    InvalidPattern {
        /// Offending definition.
        definition: String,

        /// Regex compilation error.
        reason: String,
    },

    /// Handler declares fewer arguments than the pattern captures.
    #[display(
        "{definition}: pattern has {captures} capture groups, but the handler \
         only declares {declared} arguments for them"
    )]
    TooFewArguments {
        /// Offending definition.
        definition: String,

        /// Capture groups in the compiled pattern.
        captures: usize,

        /// Arguments declared by the handler for them.
        declared: usize,
    },

    /// Handler declares more arguments than the pattern captures.
    #[display(
        "{definition}: pattern has {captures} capture groups, but the handler \
         declares {declared} arguments for them"
    )]
    TooManyArguments {
        /// Offending definition.
        definition: String,

        /// Capture groups in the compiled pattern.
        captures: usize,

        /// Arguments declared by the handler for them.
        declared: usize,
    },

    /// Step helper is declared anywhere but right after the context.
    #[display(
        "{definition}: step helper must directly follow the context, found at \
         argument {position}"
    )]
    MisplacedHelper {
        /// Offending definition.
        definition: String,

        /// Zero-based position of the helper among the handler arguments.
        position: usize,
    },

    /// Declared step argument and the handler's last argument disagree.
    #[display("{definition}: {reason}")]
    StepArgumentMismatch {
        /// Offending definition.
        definition: String,

        /// Description of the disagreement.
        reason: String,
    },

    /// Handler argument type cannot be produced by the parameter bound to it.
    #[display(
        "{definition}: argument {position} is bound to {parameter}, which \
         cannot produce {target}"
    )]
    UnsupportedTarget {
        /// Offending definition.
        definition: String,

        /// Zero-based position among the handler arguments.
        position: usize,

        /// Parameter or capture group bound to the argument.
        parameter: String,

        /// Declared type of the argument.
        target: ArgType,
    },
}

/// Every [`RegistrationError`] collected while building a [`Scheme`].
///
/// [`Scheme`]: crate::Scheme
#[derive(Clone, Debug, Error, PartialEq)]
pub struct RegistrationErrors(#[error(not(source))] pub Vec<RegistrationError>);

impl fmt::Display for RegistrationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{single}"),
            errors => {
                write!(f, "{} errors:", errors.len())?;
                for e in errors {
                    write!(f, "\n- {e}")?;
                }
                Ok(())
            }
        }
    }
}

impl RegistrationErrors {
    /// Returns the collected [`RegistrationError`]s.
    #[must_use]
    pub fn errors(&self) -> &[RegistrationError] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_error() {
        let errors = RegistrationErrors(vec![
            RegistrationError::DuplicateParameter { name: "id".into() },
            RegistrationError::EmptyText { definition: "`` at steps.rs:3:5".into() },
        ]);

        assert_eq!(
            errors.to_string(),
            "2 errors:\n\
             - parameter `id` is already registered\n\
             - `` at steps.rs:3:5: text must not be empty",
        );
    }

    #[test]
    fn single_error_is_shown_alone() {
        let errors = RegistrationErrors(vec![RegistrationError::UnknownParameter {
            name: "pod".into(),
            text: "{pod} is ready".into(),
        }]);

        assert_eq!(errors.to_string(), "unknown parameter `{pod}` in `{pod} is ready`");
    }
}
