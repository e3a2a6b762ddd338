// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Classification of observation-source errors into retryable and fatal.

use std::time::Duration;

use crate::client::ClientError;

/// Decision of a [`RetryClassifier`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Retry {
    /// Transient error: keep waiting, re-opening the source after the given
    /// delay, or after the configured retry interval if [`None`].
    After(Option<Duration>),

    /// Fatal error: abort the assertion.
    Abort,
}

/// Decides whether an error of an observation source is transient.
///
/// Implemented for closures, so a one-off policy doesn't need its own type:
/// ```rust
/// # use kubestep::{assertion::Retry, client::ClientError};
/// let only_not_found = |e: &ClientError| match e {
///     ClientError::NotFound { .. } => Retry::After(None),
///     _ => Retry::Abort,
/// };
/// # let _: &dyn kubestep::assertion::RetryClassifier = &only_not_found;
/// ```
pub trait RetryClassifier: Send + Sync {
    /// Classifies the given `error`.
    fn classify(&self, error: &ClientError) -> Retry;
}

impl<F> RetryClassifier for F
where
    F: Fn(&ClientError) -> Retry + Send + Sync,
{
    fn classify(&self, error: &ClientError) -> Retry {
        self(error)
    }
}

/// Default [`RetryClassifier`].
///
/// Missing resources, conflicts, throttling and transport failures are
/// transient, honouring a server-suggested delay when there is one. Malformed
/// resources, unregistered kinds and unsupported operations abort.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultClassifier;

impl RetryClassifier for DefaultClassifier {
    fn classify(&self, error: &ClientError) -> Retry {
        match error {
            ClientError::NotFound { .. }
            | ClientError::Conflict { .. }
            | ClientError::TooManyRequests { .. }
            | ClientError::ServerTimeout { .. }
            | ClientError::ServiceUnavailable { .. }
            | ClientError::Transport { .. } => Retry::After(error.retry_after()),
            ClientError::Invalid { .. }
            | ClientError::UnregisteredKind { .. }
            | ClientError::Unsupported { .. } => Retry::Abort,
        }
    }
}
