// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Resolution, binding and execution of steps.

use std::sync::Arc;

use tracing::Instrument as _;

use crate::{
    cli::Cli,
    error::{BindError, Error},
    executor::{Executor, Outcome, PendingStep, StepResult},
    scheme::Scheme,
    step::{HandlerFuture, StepContext, StepInput},
};

/// Runs steps against a [`Scheme`].
///
/// ```rust
/// # use kubestep::{Engine, Executor, Scheme, StepContext, StepDefinition, StepInput};
/// # use kubestep::executor::{Interrupts, Outcome};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scheme = Scheme::builder()
///     .step(StepDefinition::new(
///         "{number} replicas are ready",
///         |_: StepContext, n: i64| async move {
///             anyhow::ensure!(n >= 0, "negative replicas");
///             Ok(())
///         },
///     ))
///     .build_or_exit();
/// let engine = Engine::new(scheme)
///     .with_executor(Executor::new().with_interrupts(Interrupts::None));
///
/// let res = engine
///     .run_step(&StepContext::new(), &StepInput::new("3 replicas are ready"))
///     .await;
/// assert_eq!(res.outcome, Outcome::Passed);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Engine {
    scheme: Arc<Scheme>,
    executor: Executor,
}

impl Engine {
    /// Creates a new [`Engine`] with the default [`Executor`].
    #[must_use]
    pub fn new(scheme: Scheme) -> Self {
        Self { scheme: Arc::new(scheme), executor: Executor::new() }
    }

    /// Replaces the [`Executor`].
    #[must_use]
    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    /// Applies the [`Cli`] options concerning execution.
    #[must_use]
    pub fn with_config(mut self, cli: &Cli) -> Self {
        self.executor = self.executor.with_config(cli);
        self
    }

    /// Returns the [`Scheme`] steps are resolved against.
    #[must_use]
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Returns the [`Executor`] running the steps.
    #[must_use]
    pub const fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Resolves, binds and executes a single step under a child of the
    /// `parent` context.
    ///
    /// Failing to resolve or bind the step finishes it as
    /// [`Outcome::Failed`], carrying the [`Error`].
    pub async fn run_step(&self, parent: &StepContext, input: &StepInput) -> StepResult {
        let span = tracing::info_span!("step", keyword = %input.keyword, text = %input.text);
        async {
            let pending = PendingStep::start();
            let ctx = self.executor.context(parent);
            match self.prepare(&ctx, input) {
                Ok(fut) => self.executor.run(&ctx, pending, fut).await,
                Err(e) => {
                    tracing::debug!(%e, "step cannot run");
                    pending.finish(Outcome::Failed, Some(e.to_string()), Some(e.into()))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Executes the `steps` in order, skipping every step after the first
    /// one that didn't pass.
    pub async fn run_steps<I>(&self, parent: &StepContext, steps: I) -> Vec<StepResult>
    where
        I: IntoIterator<Item = StepInput>,
    {
        let mut results = Vec::new();
        let mut failed = false;
        for input in steps {
            let res = if failed {
                PendingStep::start().skip()
            } else {
                self.run_step(parent, &input).await
            };
            failed |= !res.is_passed();
            results.push(res);
        }
        results
    }

    /// Executes the steps of the `scenario` in order. See
    /// [`Engine::run_steps()`].
    pub async fn run_scenario(
        &self,
        parent: &StepContext,
        scenario: &gherkin::Scenario,
    ) -> Vec<StepResult> {
        self.run_steps(parent, scenario.steps.iter().map(StepInput::from))
            .await
    }

    /// Resolves and binds the step, producing its handler future.
    fn prepare(&self, ctx: &StepContext, input: &StepInput) -> Result<HandlerFuture, Error> {
        let (step, captures) = self.scheme.resolve(&input.text)?;
        let args = self
            .scheme
            .bind(step, &captures, input.argument.as_ref(), ctx.helper())?;
        let handler = step.definition().handler();
        handler(ctx.clone(), args).map_err(|e| Error::Bind(BindError::Argument(e)))
    }
}
