// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Eventually/consistently assertions over a live stream of observations of
//! a resource.
//!
//! An [`AsyncAssertion`] evaluates its [`Predicate`] against every state of
//! the resource delivered by an [`Observe`] source, waking up on whichever
//! comes first: a new observation, a periodic progress tick, the deadline, or
//! the cancellation of the step.
//!
//! ```rust
//! # use std::time::Duration;
//! # use futures::stream;
//! # use kubestep::{
//! #     assertion::{AssertionMode, AsyncAssertion},
//! #     client::{ClientError, Watch, WatchEvent},
//! #     matcher,
//! #     step::StepContext,
//! # };
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let ready = matcher::Registry::with_builtins()
//!     .parse("jsonpath `.status.phase` equal Running")
//!     .unwrap();
//! let pod = || async {
//!     Ok::<_, ClientError>(Watch::new(stream::iter([Ok(WatchEvent::Added(
//!         serde_json::json!({"status": {"phase": "Running"}}),
//!     ))])))
//! };
//!
//! AsyncAssertion::new(AssertionMode::Eventually, ready)
//!     .with_timeout(Duration::from_secs(5))
//!     .run(&StepContext::new(), &pod)
//!     .await
//!     .unwrap();
//! # }
//! ```

mod retry;

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use derive_more::with_trait::{Display, Error, From};
use futures::{StreamExt as _, future::OptionFuture};
use serde_json::Value as Json;
use tokio::time::{self, Instant};

use crate::{
    cli::Cli,
    client::{ClientError, Observe, Watch, WatchEvent},
    matcher::{Match, Predicate},
    step::{Cancellation, StepContext},
};

pub use self::retry::{DefaultClassifier, Retry, RetryClassifier};

/// Default [`AsyncAssertion`] timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default interval of progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Default delay before re-opening a failed or closed observation source.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Semantics of an [`AsyncAssertion`].
#[derive(Clone, Copy, Debug, Default, Display, Eq, PartialEq)]
pub enum AssertionMode {
    /// Succeeds as soon as one observation satisfies the predicate.
    #[default]
    #[display("eventually")]
    Eventually,

    /// Fails as soon as one observation violates the predicate, succeeds at
    /// the deadline otherwise.
    #[display("consistently")]
    Consistently,
}

impl AssertionMode {
    /// Selects the [`AssertionMode`] by its leading phrase, like
    /// `eventually within`, `for at least`, or none at all.
    ///
    /// # Errors
    ///
    /// If the phrase belongs to neither vocabulary.
    pub fn from_phrase(phrase: &str) -> Result<Self, UnknownAssertionMode> {
        let normalized = phrase
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ");
        match normalized.as_str() {
            "" | "eventually" | "eventually within" | "within" | "in less than" => {
                Ok(Self::Eventually)
            }
            "consistently" | "consistently for" | "for" | "for at least" => {
                Ok(Self::Consistently)
            }
            _ => Err(UnknownAssertionMode(phrase.to_owned())),
        }
    }
}

impl FromStr for AssertionMode {
    type Err = UnknownAssertionMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_phrase(s)
    }
}

crate::from_arg_via_str!(AssertionMode);

/// Phrase selecting no [`AssertionMode`].
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
#[display("unknown assertion mode `{_0}`")]
pub struct UnknownAssertionMode(#[error(not(source))] pub String);

/// Failure of an [`AsyncAssertion`].
#[derive(Clone, Debug, Display, Error, From, PartialEq)]
pub enum AssertionError {
    /// Deadline passed without the assertion being satisfied.
    #[display("Timed out after {}: {message}", format_elapsed(*elapsed))]
    #[from(skip)]
    Timeout {
        /// Timeout of the assertion.
        elapsed: Duration,

        /// Failure message of the last observation.
        message: String,
    },

    /// An observation violated a consistently assertion.
    #[display("{message}")]
    #[from(skip)]
    Failed {
        /// Failure message of the violating observation.
        #[error(not(source))]
        message: String,
    },

    /// Observation source failed with a non-retryable error.
    #[display("observation failed: {_0}")]
    Fatal(ClientError),

    /// Step was interrupted.
    #[display("context cancelled")]
    #[from(skip)]
    Cancelled,

    /// Step deadline passed before the assertion's own.
    #[display("context deadline exceeded")]
    #[from(skip)]
    DeadlineExceeded,
}

impl From<Cancellation> for AssertionError {
    fn from(cause: Cancellation) -> Self {
        match cause {
            Cancellation::Interrupted => Self::Cancelled,
            Cancellation::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// Formats a [`Duration`] as a single token, like `1m30s`.
fn format_elapsed(elapsed: Duration) -> String {
    humantime::format_duration(elapsed).to_string().replace(' ', "")
}

/// Assertion of a [`Predicate`] over a stream of observations.
#[derive(Clone)]
pub struct AsyncAssertion {
    mode: AssertionMode,
    matcher: Predicate,
    desired: bool,
    timeout: Duration,
    progress_interval: Duration,
    retry_interval: Duration,
    classifier: Arc<dyn RetryClassifier>,
}

impl fmt::Debug for AsyncAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncAssertion")
            .field("mode", &self.mode)
            .field("matcher", &self.matcher.to_string())
            .field("desired", &self.desired)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Reason the evaluation loop woke up.
enum Wake {
    Cancelled(Cancellation),
    Deadline,
    Observed(Option<Result<WatchEvent, ClientError>>),
    Reopen,
    Progress,
}

impl AsyncAssertion {
    /// Creates a new [`AsyncAssertion`] of the `matcher` with default
    /// timings.
    #[must_use]
    pub fn new(mode: AssertionMode, matcher: Predicate) -> Self {
        Self {
            mode,
            matcher,
            desired: true,
            timeout: DEFAULT_TIMEOUT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            classifier: Arc::new(DefaultClassifier),
        }
    }

    /// Sets the outcome of the matcher considered a success, so `false`
    /// asserts the matcher doesn't match.
    #[must_use]
    pub fn desired(mut self, outcome: bool) -> Self {
        self.desired = outcome;
        self
    }

    /// Sets the timeout of this assertion.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the interval of progress reports.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Sets the delay before re-opening the observation source, unless the
    /// [`RetryClassifier`] suggests another one.
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Replaces the [`DefaultClassifier`].
    #[must_use]
    pub fn with_classifier(mut self, classifier: impl RetryClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Applies timings from the [`Cli`].
    #[must_use]
    pub fn with_config(self, cli: &Cli) -> Self {
        self.with_timeout(cli.assertion_timeout)
            .with_progress_interval(cli.progress_interval)
            .with_retry_interval(cli.retry_interval)
    }

    /// Returns the [`AssertionMode`] of this assertion.
    #[must_use]
    pub const fn mode(&self) -> AssertionMode {
        self.mode
    }

    /// Returns the timeout of this assertion.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Evaluates this assertion against the observations of the `source`.
    ///
    /// Progress is reported to the [`StepHelper`] of the `ctx`. Every watch
    /// opened is released before returning.
    ///
    /// # Errors
    ///
    /// - [`AssertionError::Timeout`] if an eventually assertion is never
    ///   satisfied, or a consistently one never observes the resource.
    /// - [`AssertionError::Failed`] if an observation violates a
    ///   consistently assertion.
    /// - [`AssertionError::Fatal`] if the `source` fails with an error its
    ///   [`RetryClassifier`] aborts on.
    /// - [`AssertionError::Cancelled`] or
    ///   [`AssertionError::DeadlineExceeded`] if the `ctx` is done first.
    ///
    /// [`StepHelper`]: crate::step::StepHelper
    pub async fn run(
        &self,
        ctx: &StepContext,
        source: &dyn Observe,
    ) -> Result<(), AssertionError> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let tick = self.progress_interval.max(Duration::from_millis(1));
        let mut progress = time::interval_at(started + tick, tick);
        progress.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        let mut watch: Option<Watch> = None;
        let mut reopen_at = Some(started);
        let mut observed = 0_usize;
        let mut last_failure: Option<String> = None;

        tracing::debug!(
            mode = %self.mode,
            matcher = %self.matcher,
            desired = self.desired,
            timeout = ?self.timeout,
            "starting assertion",
        );

        loop {
            let wake = tokio::select! {
                biased;

                cause = ctx.done() => Wake::Cancelled(cause),
                Some(event) = OptionFuture::from(watch.as_mut().map(|w| w.next())) => {
                    Wake::Observed(event)
                }
                () = time::sleep_until(deadline) => Wake::Deadline,
                () = time::sleep_until(reopen_at.unwrap_or(deadline)), if reopen_at.is_some() => {
                    Wake::Reopen
                }
                _ = progress.tick() => Wake::Progress,
            };

            match wake {
                Wake::Cancelled(cause) => {
                    tracing::debug!(%cause, "assertion cancelled");
                    return Err(cause.into());
                }
                Wake::Deadline => return self.on_deadline(observed, last_failure),
                Wake::Progress => {
                    let fraction = started.elapsed().as_secs_f64()
                        / self.timeout.as_secs_f64().max(f64::MIN_POSITIVE);
                    tracing::trace!(fraction, observed, "assertion progress");
                    ctx.helper().report_progress(fraction);
                }
                Wake::Reopen => {
                    reopen_at = None;
                    let opened = tokio::select! {
                        biased;

                        cause = ctx.done() => return Err(cause.into()),
                        () = time::sleep_until(deadline) => None,
                        res = source.open() => Some(res),
                    };
                    match opened {
                        Some(Ok(w)) => {
                            tracing::trace!("observation source opened");
                            watch = Some(w);
                        }
                        Some(Err(e)) => {
                            reopen_at = Some(self.retry(&e)?);
                            last_failure = Some(e.to_string());
                        }
                        None => {}
                    }
                }
                Wake::Observed(None) => {
                    tracing::debug!("observation source closed, re-opening");
                    watch = None;
                    reopen_at = Some(Instant::now() + self.retry_interval);
                }
                Wake::Observed(Some(Err(e))) => {
                    watch = None;
                    reopen_at = Some(self.retry(&e)?);
                    last_failure = Some(e.to_string());
                }
                Wake::Observed(Some(Ok(event))) => {
                    observed += 1;
                    match (self.mode, self.evaluate(&event.current())) {
                        (AssertionMode::Eventually, Ok(())) => {
                            tracing::debug!(observed, "assertion satisfied");
                            return Ok(());
                        }
                        (AssertionMode::Eventually, Err(message)) => {
                            last_failure = Some(message);
                        }
                        (AssertionMode::Consistently, Ok(())) => {}
                        (AssertionMode::Consistently, Err(message)) => {
                            tracing::debug!(observed, "assertion violated");
                            return Err(AssertionError::Failed { message });
                        }
                    }
                }
            }

            // Observations are polled first, so a busy source must not
            // outlive the deadline.
            if Instant::now() >= deadline {
                return self.on_deadline(observed, last_failure);
            }
        }
    }

    /// Evaluates this assertion, panicking on failure the way a failed
    /// assertion inside a step handler is expected to.
    ///
    /// # Panics
    ///
    /// If [`AsyncAssertion::run()`] fails, with its error as the message.
    pub async fn assert(&self, ctx: &StepContext, source: &dyn Observe) {
        if let Err(e) = self.run(ctx, source).await {
            panic!("{e}");
        }
    }

    /// Checks a single observed state, returning the failure message if it
    /// doesn't have the desired outcome.
    fn evaluate(&self, actual: &Json) -> Result<(), String> {
        match self.matcher.matches(actual) {
            Ok(outcome) if outcome == self.desired => Ok(()),
            Ok(_) if self.desired => Err(self.matcher.failure_message(actual)),
            Ok(_) => Err(self.matcher.negated_failure_message(actual)),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Classifies an error of the observation source, returning when to
    /// re-open it.
    fn retry(&self, error: &ClientError) -> Result<Instant, AssertionError> {
        match self.classifier.classify(error) {
            Retry::After(delay) => {
                let delay = delay.unwrap_or(self.retry_interval);
                tracing::debug!(%error, ?delay, "transient observation error");
                Ok(Instant::now() + delay)
            }
            Retry::Abort => {
                tracing::warn!(%error, "fatal observation error");
                Err(AssertionError::Fatal(error.clone()))
            }
        }
    }

    /// Resolves the outcome once the deadline passes.
    fn on_deadline(
        &self,
        observed: usize,
        last_failure: Option<String>,
    ) -> Result<(), AssertionError> {
        let timeout = |message| AssertionError::Timeout { elapsed: self.timeout, message };
        match self.mode {
            AssertionMode::Consistently if observed > 0 => Ok(()),
            AssertionMode::Consistently | AssertionMode::Eventually => Err(timeout(
                last_failure.unwrap_or_else(|| "resource was never observed".to_owned()),
            )),
        }
    }
}
