// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Errors of binding captures and step arguments to handler parameters.

use derive_more::with_trait::{Display, Error, From};

use crate::{
    parameter::StepArgumentKind,
    value::{ArgType, ArgumentError, ConversionError},
};

/// Error of binding a resolved step to its handler's parameters.
#[derive(Clone, Debug, Display, Error, From, PartialEq)]
pub enum BindError {
    /// Parameter parser rejected a captured substring or step argument.
    #[display("argument {position}: cannot convert `{text}` into {target}: {source}")]
    #[from(skip)]
    Conversion {
        /// Zero-based position among the handler arguments.
        position: usize,

        /// Captured text, or the kind of the step argument.
        text: String,

        /// Declared type of the argument.
        target: ArgType,

        /// Parser failure.
        source: ConversionError,
    },

    /// Definition expects a step argument the step doesn't carry.
    #[display("step must have a {expected} argument")]
    #[from(skip)]
    MissingStepArgument {
        /// Kind of the expected step argument.
        #[error(not(source))]
        expected: StepArgumentKind,
    },

    /// Step carries an argument its definition doesn't accept.
    #[display("step definition doesn't accept a {found} argument")]
    #[from(skip)]
    UnexpectedStepArgument {
        /// Kind of the attached step argument.
        #[error(not(source))]
        found: StepArgumentKind,
    },

    /// Bound value doesn't fit the handler parameter.
    #[display("{_0}")]
    Argument(ArgumentError),
}
