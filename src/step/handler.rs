// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Typed step handlers.

use std::{future::Future, sync::Arc};

use futures::{FutureExt as _, future::LocalBoxFuture};

use crate::value::{ArgType, ArgumentError, FromArg, Value, take_arg};

use super::StepContext;

/// [`Future`] returned by an invoked step handler.
pub type HandlerFuture = LocalBoxFuture<'static, anyhow::Result<()>>;

/// Type-erased [`Handler`].
pub(crate) type ErasedHandler = Arc<
    dyn Fn(StepContext, Vec<Value>) -> Result<HandlerFuture, ArgumentError>
        + Send
        + Sync,
>;

/// Async function usable as a step handler.
///
/// Implemented for every `Fn(StepContext, A1, ..., An) -> Fut` where each
/// `Ai` is [`FromArg`] and `Fut` resolves into a `Result<(), E>` with `E`
/// convertible into an [`anyhow::Error`]. This makes "context first" and
/// "exactly one error-like return" hold by construction, while the
/// [`Handler::signature()`] is checked against the step pattern at
/// registration time.
///
/// ```rust
/// # use kubestep::step::{Handler, StepContext};
/// async fn scale(_: StepContext, name: String, replicas: i64) -> anyhow::Result<()> {
///     anyhow::ensure!(replicas >= 0, "cannot scale {name} to {replicas}");
///     Ok(())
/// }
///
/// fn assert_handler<Args, H: Handler<Args>>(_: H) -> Vec<kubestep::value::ArgType> {
///     H::signature()
/// }
///
/// assert_eq!(assert_handler(scale).len(), 2);
/// ```
pub trait Handler<Args>: Send + Sync + 'static {
    /// Returns the declared types of the parameters following the
    /// [`StepContext`].
    fn signature() -> Vec<ArgType>;

    /// Invokes this handler with already bound `args`.
    ///
    /// # Errors
    ///
    /// If any of the `args` cannot be converted into the declared parameter
    /// type.
    fn call(
        &self,
        ctx: StepContext,
        args: Vec<Value>,
    ) -> Result<HandlerFuture, ArgumentError>;
}

macro_rules! impl_handler {
    ($($ty:ident),*) => {
        impl<F, Fut, E, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: Fn(StepContext, $($ty,)*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<(), E>> + 'static,
            E: Into<anyhow::Error>,
            $($ty: FromArg,)*
        {
            fn signature() -> Vec<ArgType> {
                vec![$($ty::TYPE,)*]
            }

            #[allow( // macro-generated
                non_snake_case,
                unused_assignments,
                unused_mut,
                unused_variables,
                reason = "not every arity uses every binding"
            )]
            fn call(
                &self,
                ctx: StepContext,
                args: Vec<Value>,
            ) -> Result<HandlerFuture, ArgumentError> {
                let mut args = args.into_iter();
                let mut position = 0;
                $(
                    let $ty = take_arg::<$ty>(&mut args, position)?;
                    position += 1;
                )*
                let fut = self(ctx, $($ty,)*);
                Ok(async move { fut.await.map_err(Into::into) }.boxed_local())
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
impl_handler!(A1, A2, A3, A4);
impl_handler!(A1, A2, A3, A4, A5);
impl_handler!(A1, A2, A3, A4, A5, A6);
impl_handler!(A1, A2, A3, A4, A5, A6, A7);
impl_handler!(A1, A2, A3, A4, A5, A6, A7, A8);

/// Erases the concrete type of a [`Handler`].
pub(crate) fn erase<H, Args>(handler: H) -> ErasedHandler
where
    H: Handler<Args>,
{
    Arc::new(move |ctx, args| handler.call(ctx, args))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;
    use crate::{step::StepHelper, value::ConversionError};

    async fn greet(_: StepContext, _: StepHelper, name: String, times: i64) -> anyhow::Result<()> {
        anyhow::ensure!(times > 0, "cannot greet {name} {times} times");
        Ok(())
    }

    fn signature_of<Args, H: Handler<Args>>(_: &H) -> Vec<ArgType> {
        H::signature()
    }

    #[test]
    fn reports_signature() {
        assert_eq!(
            signature_of(&greet),
            [ArgType::Helper, ArgType::String, ArgType::Int],
        );
        assert!(
            signature_of(&|_: StepContext| async { Ok::<_, anyhow::Error>(()) })
                .is_empty(),
        );
    }

    #[tokio::test]
    async fn calls_with_converted_arguments() {
        let seen = Arc::new(AtomicI64::new(0));
        let handler = erase({
            let seen = Arc::clone(&seen);
            move |_: StepContext, replicas: i64| {
                seen.store(replicas, Ordering::SeqCst);
                async { Ok::<_, std::io::Error>(()) }
            }
        });

        handler(StepContext::new(), vec![Value::Int(3)])
            .unwrap()
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returned_error_is_preserved() {
        let handler = erase(greet);

        let err = handler(
            StepContext::new(),
            vec![Value::Helper(StepHelper::default()), "web".into(), Value::Int(0)],
        )
        .unwrap()
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "cannot greet web 0 times");
    }

    #[test]
    fn conversion_failure_names_the_position() {
        let handler = erase(greet);

        let Err(err) = handler(
            StepContext::new(),
            vec![Value::Helper(StepHelper::default()), "web".into(), "many".into()],
        ) else {
            panic!("expected an argument error");
        };
        assert_eq!(err.position, 2);
        assert_eq!(err.expected, ArgType::Int);
        assert!(matches!(err.source, ConversionError::Invalid { .. }));
    }
}
