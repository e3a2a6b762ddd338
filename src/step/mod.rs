// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Step definitions, their registry and the runtime context handed to
//! handlers.
//!
//! - [`definition`]: [`StepDefinition`] builder.
//! - [`handler`]: the typed [`Handler`] contract.
//! - [`collection`]: validated [`Step`]s and first-match resolution.
//! - [`context`]: cancellable [`StepContext`].
//! - [`helper`]: [`StepHelper`] for messages, progress and cleanups.
//! - [`input`]: [`StepInput`] records handed over by the document parser.

pub mod collection;
pub mod context;
pub mod definition;
pub mod error;
pub mod handler;
pub mod helper;
pub mod input;
pub mod location;

pub use self::{
    collection::{Collection, Step},
    context::{Cancellation, StepContext},
    definition::StepDefinition,
    error::ResolveError,
    handler::{Handler, HandlerFuture},
    helper::{Cleanup, StepHelper},
    input::{DocString, StepArgument, StepInput},
    location::Location,
};
