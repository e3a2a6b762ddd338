// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Execution of a single step: recovery boundary, cancellation and outcome
//! classification.

use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    process,
    sync::{Mutex, Once, PoisonError},
    thread,
    time::{Duration, SystemTime},
};

use derive_more::with_trait::Display;
use futures::{FutureExt as _, future};
use tokio_util::sync::CancellationToken;

use crate::{
    cli::Cli,
    step::{Cancellation, Cleanup, StepContext},
};

/// Terminal state of a step.
#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, PartialEq)]
pub enum Outcome {
    /// Handler returned successfully.
    #[display("passed")]
    Passed,

    /// Handler returned an error or panicked with a message.
    #[display("failed")]
    Failed,

    /// Step never ran.
    #[default]
    #[display("skipped")]
    Skipped,

    /// Step was interrupted.
    #[display("interrupted")]
    Interrupted,

    /// Step or one of its assertions ran out of time.
    #[display("timed out")]
    Timedout,

    /// Handler panicked with a payload that isn't a message.
    #[display("unknown")]
    Unknown,
}

/// Result of a single step, handed to whatever reports it.
#[derive(derive_more::Debug)]
pub struct StepResult {
    /// Terminal state of the step.
    pub outcome: Outcome,

    /// Wall-clock time the step started at.
    pub started_at: SystemTime,

    /// Wall-clock time the step finished at.
    pub finished_at: SystemTime,

    /// Summary of the failure, if any.
    pub message: Option<String>,

    /// Messages logged by the handler.
    pub messages: Vec<String>,

    /// Error returned by the handler.
    pub error: Option<anyhow::Error>,

    /// Last reported progress, in `0.0..=1.0`.
    pub progress: f64,

    /// Cleanups registered by the handler, to be run by the caller.
    #[debug("{}", cleanups.len())]
    pub cleanups: Vec<Cleanup>,
}

impl StepResult {
    /// Indicates whether the step passed.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    /// Returns how long the step took.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.finished_at
            .duration_since(self.started_at)
            .unwrap_or_default()
    }
}

/// [`StepResult`] of a step that has started but not finished yet.
///
/// Consumed by exactly one transition into a terminal [`Outcome`].
#[derive(Debug)]
#[must_use = "a started step must be finished or skipped"]
pub struct PendingStep {
    started_at: SystemTime,
}

impl PendingStep {
    /// Records the start of a step.
    pub fn start() -> Self {
        Self { started_at: SystemTime::now() }
    }

    /// Finishes the step as [`Outcome::Skipped`], like when a previous step
    /// of its scenario failed.
    #[must_use]
    pub fn skip(self) -> StepResult {
        self.finish(Outcome::Skipped, None, None)
    }

    /// Finishes the step with the given `outcome`.
    #[must_use]
    pub fn finish(
        self,
        outcome: Outcome,
        message: Option<String>,
        error: Option<anyhow::Error>,
    ) -> StepResult {
        StepResult {
            outcome,
            started_at: self.started_at,
            finished_at: SystemTime::now(),
            message,
            messages: Vec::new(),
            error,
            progress: if outcome == Outcome::Passed { 1.0 } else { 0.0 },
            cleanups: Vec::new(),
        }
    }
}

/// Source of interrupts cancelling a running step.
#[derive(Clone, Debug, Default)]
pub enum Interrupts {
    /// Ctrl-C of the process, captured only while a step runs.
    ///
    /// Ctrl-C between steps exits the process with code `130`.
    #[default]
    CtrlC,

    /// Cancellation of the given token.
    Token(CancellationToken),

    /// Nothing interrupts steps.
    None,
}

impl Interrupts {
    /// Resolves once an interrupt arrives.
    ///
    /// Ctrl-C is captured only while the returned future is alive.
    async fn recv(&self) {
        match self {
            Self::CtrlC => {
                let scope = CTRL_C.enter();
                LISTENER.call_once(listen_for_ctrl_c);
                scope.token.cancelled().await;
            }
            Self::Token(token) => token.cancelled().await,
            Self::None => future::pending().await,
        }
    }
}

/// Exit code of a process interrupted by Ctrl-C outside of any step.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Steps of the process currently capturing Ctrl-C.
static CTRL_C: CtrlCScopes = CtrlCScopes::new();

/// Guards the start of the process-wide Ctrl-C listener.
static LISTENER: Once = Once::new();

/// Registry of the [`CtrlCScope`]s entered by running steps.
#[derive(Debug)]
struct CtrlCScopes {
    /// Last issued scope ID, and the tokens of the entered scopes.
    state: Mutex<(u64, Vec<(u64, CancellationToken)>)>,
}

impl CtrlCScopes {
    const fn new() -> Self {
        Self { state: Mutex::new((0, Vec::new())) }
    }

    /// Starts capturing Ctrl-C until the returned [`CtrlCScope`] is dropped.
    fn enter(&self) -> CtrlCScope<'_> {
        let token = CancellationToken::new();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.0 += 1;
        let id = state.0;
        state.1.push((id, token.clone()));
        CtrlCScope { scopes: self, id, token }
    }

    /// Delivers Ctrl-C to every entered scope, returning `false` if there
    /// are none.
    fn interrupt(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, token) in &state.1 {
            token.cancel();
        }
        !state.1.is_empty()
    }
}

/// Ctrl-C capture of a single running step.
#[derive(Debug)]
struct CtrlCScope<'s> {
    scopes: &'s CtrlCScopes,
    id: u64,
    token: CancellationToken,
}

impl Drop for CtrlCScope<'_> {
    fn drop(&mut self) {
        let mut state = self.scopes.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.1.retain(|(id, _)| *id != self.id);
    }
}

/// Spawns the thread handling Ctrl-C for the whole process.
///
/// Once the signal handler is installed it cannot be removed, so Ctrl-C
/// arriving while no step runs terminates the process, the way it would
/// without the handler.
fn listen_for_ctrl_c() {
    let spawned = thread::Builder::new().name("ctrl-c".into()).spawn(|| {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::warn!(%e, "cannot listen for Ctrl-C");
                return;
            }
        };
        runtime.block_on(async {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(%e, "cannot listen for Ctrl-C");
                    return;
                }
                if CTRL_C.interrupt() {
                    tracing::debug!("Ctrl-C delivered to running steps");
                } else {
                    tracing::debug!("Ctrl-C outside of any step, exiting");
                    process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        });
    });
    if let Err(e) = spawned {
        tracing::warn!(%e, "cannot listen for Ctrl-C");
    }
}

/// Runs step handlers and classifies how they ended.
#[derive(Clone, Debug, Default)]
pub struct Executor {
    interrupts: Interrupts,
    step_timeout: Option<Duration>,
}

impl Executor {
    /// Creates a new [`Executor`] listening for Ctrl-C, without a step
    /// timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the source of [`Interrupts`].
    #[must_use]
    pub fn with_interrupts(mut self, interrupts: Interrupts) -> Self {
        self.interrupts = interrupts;
        self
    }

    /// Sets the maximum duration of a single step.
    #[must_use]
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Applies the step timeout from the [`Cli`].
    #[must_use]
    pub fn with_config(self, cli: &Cli) -> Self {
        self.with_step_timeout(cli.step_timeout)
    }

    /// Derives the [`StepContext`] of a single step from the `parent` one.
    #[must_use]
    pub fn context(&self, parent: &StepContext) -> StepContext {
        parent.child(self.step_timeout)
    }

    /// Runs the handler future `fut` of the step under its `ctx`, and
    /// finishes the `pending` step with the classified [`Outcome`].
    ///
    /// Panics of the handler are caught. Classification goes in order:
    /// 1. `ctx` cancelled: [`Outcome::Interrupted`];
    /// 2. `ctx` deadline passed: [`Outcome::Timedout`];
    /// 3. panic with a `Timed out after ...`, `context cancelled` or
    ///    `context deadline exceeded` message: [`Outcome::Timedout`];
    /// 4. panic with any other message: [`Outcome::Failed`];
    /// 5. panic with a non-message payload: [`Outcome::Unknown`];
    /// 6. returned error: [`Outcome::Failed`], keeping the error;
    /// 7. otherwise [`Outcome::Passed`].
    pub async fn run<Fut>(
        &self,
        ctx: &StepContext,
        pending: PendingStep,
        fut: Fut,
    ) -> StepResult
    where
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let finished = tokio::select! {
            biased;

            res = AssertUnwindSafe(fut).catch_unwind() => Some(res),
            _ = ctx.done() => None,
            () = self.interrupts.recv() => {
                tracing::debug!("step interrupted");
                ctx.cancel();
                None
            }
        };

        let (outcome, message, error) = classify(ctx.check(), finished);
        let reports = ctx.helper().take();
        let mut result = pending.finish(outcome, message, error);
        result.messages = reports.messages;
        result.cleanups = reports.cleanups;
        if outcome != Outcome::Passed {
            result.progress = reports.progress;
        }

        tracing::debug!(
            outcome = %result.outcome,
            message = result.message.as_deref().unwrap_or_default(),
            duration = ?result.duration(),
            "step finished",
        );
        result
    }
}

/// Outcome of the handler future, if it finished.
type Finished = Option<Result<anyhow::Result<()>, Box<dyn Any + Send>>>;

/// Classifies how a step ended.
fn classify(
    cause: Option<Cancellation>,
    finished: Finished,
) -> (Outcome, Option<String>, Option<anyhow::Error>) {
    match (cause, finished) {
        (Some(Cancellation::Interrupted), _) => {
            (Outcome::Interrupted, Some(Cancellation::Interrupted.to_string()), None)
        }
        (Some(Cancellation::DeadlineExceeded), _) => (
            Outcome::Timedout,
            Some(Cancellation::DeadlineExceeded.to_string()),
            None,
        ),
        (None, None) => (Outcome::Interrupted, None, None),
        (None, Some(Err(payload))) => match panic_message(payload.as_ref()) {
            Some(msg) => classify_panic(msg),
            None => (
                Outcome::Unknown,
                Some("step panicked with an opaque payload".to_owned()),
                None,
            ),
        },
        (None, Some(Ok(Err(e)))) => (Outcome::Failed, Some(format!("{e:#}")), Some(e)),
        (None, Some(Ok(Ok(())))) => (Outcome::Passed, None, None),
    }
}

/// Classifies a panic by its `msg`.
fn classify_panic(msg: &str) -> (Outcome, Option<String>, Option<anyhow::Error>) {
    if let Some((_, elapsed)) = lazy_regex::regex_captures!(r"^(?i)timed out after (\S+)", msg) {
        let elapsed = elapsed.trim_end_matches(|c: char| !c.is_alphanumeric());
        return (Outcome::Timedout, Some(format!("Timed out after {elapsed}")), None);
    }
    if lazy_regex::regex_is_match!(r"^context (?:cancel+ed|deadline exceeded)", msg) {
        return (Outcome::Timedout, Some(msg.to_owned()), None);
    }
    (Outcome::Failed, Some(msg.to_owned()), None)
}

/// Extracts the message of a panic `payload`.
fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
}

/// Runs the `cleanups` in reverse registration order, returning the errors
/// of the failed ones.
pub async fn run_cleanups(cleanups: Vec<Cleanup>) -> Vec<anyhow::Error> {
    let mut errors = Vec::new();
    for cleanup in cleanups.into_iter().rev() {
        if let Err(e) = cleanup().await {
            tracing::warn!(%e, "cleanup failed");
            errors.push(e);
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use derive_more::with_trait::Error;
    use tokio::time;

    use super::*;

    fn executor() -> Executor {
        Executor::new().with_interrupts(Interrupts::None)
    }

    async fn run<Fut>(executor: &Executor, fut: Fut) -> StepResult
    where
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let ctx = executor.context(&StepContext::new());
        executor.run(&ctx, PendingStep::start(), fut).await
    }

    async fn panics(payload: impl Any + Send + 'static) -> anyhow::Result<()> {
        std::panic::panic_any(payload)
    }

    #[derive(Debug, Display, Error)]
    #[display("pod is not ready")]
    struct NotReady;

    #[tokio::test]
    async fn passes() {
        let res = run(&executor(), async { Ok(()) }).await;

        assert_eq!(res.outcome, Outcome::Passed);
        assert!(res.message.is_none());
        assert_eq!(res.progress, 1.0);
        assert!(res.finished_at >= res.started_at);
    }

    #[tokio::test]
    async fn keeps_returned_error() {
        let res = run(&executor(), async { Err(anyhow::Error::new(NotReady)) }).await;

        assert_eq!(res.outcome, Outcome::Failed);
        assert_eq!(res.message.as_deref(), Some("pod is not ready"));
        assert!(res.error.unwrap().downcast_ref::<NotReady>().is_some());
    }

    #[tokio::test]
    async fn classifies_panics() {
        let res = run(&executor(), panics("Timed out after 3s waiting for ready")).await;
        assert_eq!(res.outcome, Outcome::Timedout);
        assert_eq!(res.message.as_deref(), Some("Timed out after 3s"));

        let res = run(&executor(), panics(String::from("Timed out after 1m30s: Expected"))).await;
        assert_eq!(res.message.as_deref(), Some("Timed out after 1m30s"));

        let res = run(&executor(), panics("context deadline exceeded")).await;
        assert_eq!(res.outcome, Outcome::Timedout);

        let res = run(&executor(), panics(format!("replicas {} != {}", 1, 3))).await;
        assert_eq!(res.outcome, Outcome::Failed);
        assert_eq!(res.message.as_deref(), Some("replicas 1 != 3"));

        let res = run(&executor(), panics(42_u8)).await;
        assert_eq!(res.outcome, Outcome::Unknown);
    }

    #[tokio::test]
    async fn cancelled_context_interrupts() {
        let executor = executor();
        let ctx = executor.context(&StepContext::new());
        ctx.cancel();

        let res = executor.run(&ctx, PendingStep::start(), future::pending()).await;

        assert_eq!(res.outcome, Outcome::Interrupted);
    }

    #[test]
    fn ctrl_c_is_captured_only_while_steps_run() {
        let scopes = CtrlCScopes::new();
        assert!(!scopes.interrupt());

        let first = scopes.enter();
        let second = scopes.enter();
        assert!(scopes.interrupt());
        assert!(first.token.is_cancelled());
        assert!(second.token.is_cancelled());

        drop(first);
        let third = scopes.enter();
        assert!(!third.token.is_cancelled());
        drop((second, third));
        assert!(!scopes.interrupt());
    }

    #[tokio::test]
    async fn ctrl_c_is_released_when_the_step_finishes() {
        let capturing = |scopes: &CtrlCScopes| {
            scopes.state.lock().unwrap().1.len()
        };
        let executor = Executor::new();
        let ctx = executor.context(&StepContext::new());
        let during = std::cell::Cell::new(0);

        let res = executor
            .run(&ctx, PendingStep::start(), async {
                tokio::task::yield_now().await;
                during.set(capturing(&CTRL_C));
                Ok(())
            })
            .await;

        assert_eq!(res.outcome, Outcome::Passed);
        assert_eq!(during.get(), 1);
        assert_eq!(capturing(&CTRL_C), 0);
    }

    #[tokio::test]
    async fn interrupt_token_cancels_the_step() {
        let token = CancellationToken::new();
        let executor = Executor::new().with_interrupts(Interrupts::Token(token.clone()));
        let ctx = executor.context(&StepContext::new());
        let observed = ctx.clone();

        token.cancel();
        let res = executor.run(&ctx, PendingStep::start(), future::pending()).await;

        assert_eq!(res.outcome, Outcome::Interrupted);
        assert!(observed.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn step_timeout_times_out() {
        let executor = executor().with_step_timeout(Some(Duration::from_secs(2)));

        let res = run(&executor, async {
            time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert_eq!(res.outcome, Outcome::Timedout);
        assert_eq!(res.message.as_deref(), Some("context deadline exceeded"));
    }

    #[tokio::test]
    async fn collects_helper_reports() {
        let executor = executor();
        let ctx = executor.context(&StepContext::new());
        let helper = ctx.helper().clone();

        let res = executor
            .run(&ctx, PendingStep::start(), async move {
                helper.log("created pod/web");
                helper.report_progress(0.5);
                helper.on_cleanup(|| async { Ok(()) }.boxed_local());
                Err(anyhow::anyhow!("boom"))
            })
            .await;

        assert_eq!(res.messages, ["created pod/web"]);
        assert_eq!(res.progress, 0.5);
        assert_eq!(res.cleanups.len(), 1);
    }

    #[tokio::test]
    async fn cleanups_run_in_reverse() {
        let order = Arc::new(AtomicUsize::new(0));
        let cleanup = |expected: usize| -> Cleanup {
            let order = Arc::clone(&order);
            Box::new(move || {
                async move {
                    let seen = order.fetch_add(1, Ordering::SeqCst);
                    anyhow::ensure!(seen == expected, "ran #{expected} as #{seen}");
                    Ok(())
                }
                .boxed_local()
            })
        };

        let errors = run_cleanups(vec![cleanup(1), cleanup(0)]).await;

        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn skipped_steps_keep_timestamps() {
        let res = PendingStep::start().skip();

        assert_eq!(res.outcome, Outcome::Skipped);
        assert!(res.duration() < Duration::from_secs(1));
    }
}
