// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Cancellable execution context threaded through every step handler.

use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::helper::StepHelper;

/// Reason a [`StepContext`] was cancelled.
#[derive(Clone, Copy, Debug, derive_more::Display, Eq, PartialEq)]
pub enum Cancellation {
    /// Cancelled externally, by an interrupt or by its parent.
    #[display("context cancelled")]
    Interrupted,

    /// Its deadline passed.
    #[display("context deadline exceeded")]
    DeadlineExceeded,
}

/// Execution context of a step.
///
/// Cloning is cheap and every clone observes the same cancellation. A single
/// [`CancellationToken`] is shared by every blocking operation performed on
/// behalf of the step (watches, remote commands, proxying), so all of them
/// must race their work against [`StepContext::done()`].
#[derive(Clone, Debug)]
pub struct StepContext {
    /// Token cancelled on interrupt or deadline.
    token: CancellationToken,

    /// Instant this context expires at, if any.
    deadline: Option<Instant>,

    /// First recorded reason of cancellation.
    cause: Arc<OnceLock<Cancellation>>,

    /// Helper of the step this context belongs to.
    helper: StepHelper,
}

impl Default for StepContext {
    fn default() -> Self {
        Self::new()
    }
}

impl StepContext {
    /// Creates a new root [`StepContext`] without a deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            cause: Arc::new(OnceLock::new()),
            helper: StepHelper::default(),
        }
    }

    /// Creates a new root [`StepContext`] cancelled by the given `token`.
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self { token, ..Self::new() }
    }

    /// Derives a child [`StepContext`] for a single step.
    ///
    /// The child is cancelled whenever this context is, and expires at the
    /// earlier of this context's deadline and `timeout` from now. It gets a
    /// fresh [`StepHelper`].
    #[must_use]
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let own = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            token: self.token.child_token(),
            deadline,
            cause: Arc::new(OnceLock::new()),
            helper: StepHelper::default(),
        }
    }

    /// Returns the deadline of this context, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the [`StepHelper`] of the step this context belongs to.
    #[must_use]
    pub const fn helper(&self) -> &StepHelper {
        &self.helper
    }

    /// Returns the underlying [`CancellationToken`].
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancels this context as [`Cancellation::Interrupted`].
    pub fn cancel(&self) {
        _ = self.cause.set(Cancellation::Interrupted);
        self.token.cancel();
    }

    /// Cancels this context as [`Cancellation::DeadlineExceeded`].
    pub(crate) fn expire(&self) {
        _ = self.cause.set(Cancellation::DeadlineExceeded);
        self.token.cancel();
    }

    /// Returns the reason this context was cancelled, if it was.
    ///
    /// A deadline is only noticed once something awaited
    /// [`StepContext::done()`]; see [`StepContext::check()`].
    #[must_use]
    pub fn cause(&self) -> Option<Cancellation> {
        self.cause.get().copied().or_else(|| {
            self.token
                .is_cancelled()
                .then_some(Cancellation::Interrupted)
        })
    }

    /// Records an elapsed deadline, then returns [`StepContext::cause()`].
    #[must_use]
    pub fn check(&self) -> Option<Cancellation> {
        if self.deadline.is_some_and(|d| d <= Instant::now()) && !self.token.is_cancelled() {
            self.expire();
        }
        self.cause()
    }

    /// Indicates whether this context is cancelled or expired.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.check().is_some()
    }

    /// Resolves once this context is cancelled or its deadline passes,
    /// returning the reason.
    pub async fn done(&self) -> Cancellation {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = time::sleep_until(deadline) => self.expire(),
                }
            }
            None => self.token.cancelled().await,
        }
        self.cause().unwrap_or(Cancellation::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expires_at_deadline() {
        let ctx = StepContext::new().child(Some(Duration::from_secs(3)));
        assert_eq!(ctx.cause(), None);

        assert_eq!(ctx.done().await, Cancellation::DeadlineExceeded);
        assert_eq!(ctx.cause(), Some(Cancellation::DeadlineExceeded));
        assert!(ctx.token().is_cancelled());
    }

    #[tokio::test]
    async fn parent_cancellation_interrupts_children() {
        let parent = StepContext::new();
        let child = parent.child(None);

        parent.cancel();

        assert_eq!(child.done().await, Cancellation::Interrupted);
        assert_eq!(child.cause(), Some(Cancellation::Interrupted));
    }

    #[tokio::test(start_paused = true)]
    async fn child_keeps_the_earlier_deadline() {
        let parent = StepContext::new().child(Some(Duration::from_secs(1)));
        let child = parent.child(Some(Duration::from_secs(10)));

        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn check_notices_elapsed_deadline() {
        let ctx = StepContext::new().child(Some(Duration::from_millis(10)));
        assert!(!ctx.is_done());

        time::advance(Duration::from_millis(20)).await;

        assert_eq!(ctx.check(), Some(Cancellation::DeadlineExceeded));
    }
}
