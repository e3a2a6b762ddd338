// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Helper handed to step handlers for reporting back to the executor.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::LocalBoxFuture;

/// Callback releasing whatever a step acquired, run by the caller of the
/// [`Executor`] once the owning scenario finishes.
///
/// [`Executor`]: crate::Executor
pub type Cleanup =
    Box<dyn FnOnce() -> LocalBoxFuture<'static, anyhow::Result<()>> + Send>;

/// Accumulated reports of a running step.
#[derive(Default, derive_more::Debug)]
pub(crate) struct Reports {
    /// Messages logged by the handler.
    pub(crate) messages: Vec<String>,

    /// Last reported progress, in `0.0..=1.0`.
    pub(crate) progress: f64,

    /// Registered cleanup callbacks.
    #[debug("{}", cleanups.len())]
    pub(crate) cleanups: Vec<Cleanup>,
}

/// Handle for a step handler to log messages, report progress and register
/// [`Cleanup`]s.
///
/// May be declared as the parameter right after the [`StepContext`], and is
/// also reachable through [`StepContext::helper()`].
///
/// [`StepContext`]: super::StepContext
/// [`StepContext::helper()`]: super::StepContext::helper
#[derive(Clone, Debug, Default)]
pub struct StepHelper(Arc<Mutex<Reports>>);

impl StepHelper {
    /// Locks the [`Reports`], ignoring poisoning by a panicked handler.
    fn reports(&self) -> MutexGuard<'_, Reports> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a message to be attached to the step result.
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "step message");
        self.reports().messages.push(message);
    }

    /// Reports the completed fraction of the step, clamped to `0.0..=1.0`.
    pub fn report_progress(&self, fraction: f64) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        tracing::trace!(progress = fraction, "step progress");
        self.reports().progress = fraction;
    }

    /// Returns the last reported progress.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.reports().progress
    }

    /// Registers a [`Cleanup`] callback.
    pub fn on_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() -> LocalBoxFuture<'static, anyhow::Result<()>> + Send + 'static,
    {
        self.reports().cleanups.push(Box::new(cleanup));
    }

    /// Takes everything reported so far.
    pub(crate) fn take(&self) -> Reports {
        std::mem::take(&mut *self.reports())
    }

    /// Indicates whether both helpers belong to the same step.
    #[must_use]
    pub fn same_step(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
