// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Consolidated [`Error`] type.

use derive_more::with_trait::{Display, Error as StdError, From};

use super::{
    AssertionError, BindError, ClientError, MatcherError, RegistrationErrors,
    ResolveError,
};

/// Any error of the step execution engine.
#[derive(Debug, Display, StdError, From)]
pub enum Error {
    /// Building a [`Scheme`] failed.
    ///
    /// [`Scheme`]: crate::Scheme
    #[display("Registration failed: {_0}")]
    Registration(RegistrationErrors),

    /// Step text matched no definition.
    #[display("{_0}")]
    Resolve(ResolveError),

    /// Arguments of a matched step couldn't be bound.
    #[display("Binding failed: {_0}")]
    Bind(BindError),

    /// Matcher text couldn't be parsed.
    #[display("Invalid matcher: {_0}")]
    Matcher(MatcherError),

    /// Asynchronous assertion failed.
    #[display("{_0}")]
    Assertion(AssertionError),

    /// Resource client failed.
    #[display("Client error: {_0}")]
    Client(ClientError),
}

/// Alias of a [`Result`](std::result::Result) with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
