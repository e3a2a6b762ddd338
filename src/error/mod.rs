// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types of the step execution engine.
//!
//! Errors are organized by the phase they occur in:
//!
//! - [`RegistrationError`]: building a [`Scheme`]. Always fatal.
//! - [`ResolveError`] and [`BindError`]: turning step text into a handler
//!   call. Reported as a failed step.
//! - [`MatcherError`], [`AssertionError`] and [`ClientError`]: raised by
//!   handlers themselves.
//!
//! [`Error`] consolidates all of them.
//!
//! [`Scheme`]: crate::Scheme

mod bind;
mod core;
mod registration;

pub use self::{
    bind::BindError,
    core::{Error, Result},
    registration::{RegistrationError, RegistrationErrors},
};
pub use crate::{
    assertion::AssertionError,
    client::ClientError,
    matcher::{MatchError, MatcherError},
    step::ResolveError,
    value::{ArgumentError, ConversionError},
};
