// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Capability contract of the cluster API client consumed by step handlers
//! and the asynchronous assertion engine.
//!
//! Only the contract lives here: transports implement [`ResourceClient`]
//! elsewhere. Every operation but [`ResourceClient::watch()`] defaults to
//! [`ClientError::Unsupported`], so partial clients and test doubles only
//! implement what they need.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use derive_more::with_trait::{Display, Error};
use futures::{
    Stream, StreamExt as _,
    channel::mpsc,
    future::BoxFuture,
    stream::{self, BoxStream},
};
use serde_json::Value as Json;
use tokio::time;

use crate::resource::{ResourceOption, ResourceRef};

/// Error reported by a [`ResourceClient`].
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
pub enum ClientError {
    /// Resource doesn't exist (yet).
    #[display("{what} not found")]
    NotFound {
        /// Missing resource.
        #[error(not(source))]
        what: String,
    },

    /// Concurrent modification conflict.
    #[display("conflict: {message}")]
    Conflict {
        /// Server message.
        #[error(not(source))]
        message: String,
    },

    /// Request was rate-limited.
    #[display("too many requests")]
    TooManyRequests {
        /// Server-suggested delay before retrying.
        #[error(not(source))]
        retry_after: Option<Duration>,
    },

    /// Server didn't answer in time.
    #[display("server timeout")]
    ServerTimeout {
        /// Server-suggested delay before retrying.
        #[error(not(source))]
        retry_after: Option<Duration>,
    },

    /// Server is temporarily unavailable.
    #[display("service unavailable")]
    ServiceUnavailable {
        /// Server-suggested delay before retrying.
        #[error(not(source))]
        retry_after: Option<Duration>,
    },

    /// Connection-level failure.
    #[display("transport error: {message}")]
    Transport {
        /// Underlying error description.
        #[error(not(source))]
        message: String,
    },

    /// Resource or request is malformed.
    #[display("invalid resource: {message}")]
    Invalid {
        /// Server message.
        #[error(not(source))]
        message: String,
    },

    /// Resource kind has no registered schema.
    #[display("kind `{kind}` is not registered")]
    UnregisteredKind {
        /// Unknown kind.
        #[error(not(source))]
        kind: String,
    },

    /// Client doesn't implement the operation.
    #[display("`{operation}` is not supported by this client")]
    Unsupported {
        /// Name of the operation.
        #[error(not(source))]
        operation: &'static str,
    },
}

impl ClientError {
    /// Returns the delay the server suggested before retrying, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::TooManyRequests { retry_after }
            | Self::ServerTimeout { retry_after }
            | Self::ServiceUnavailable { retry_after } => *retry_after,
            Self::NotFound { .. }
            | Self::Conflict { .. }
            | Self::Transport { .. }
            | Self::Invalid { .. }
            | Self::UnregisteredKind { .. }
            | Self::Unsupported { .. } => None,
        }
    }
}

/// Change of a watched resource.
#[derive(Clone, Debug, PartialEq)]
pub enum WatchEvent {
    /// Resource appeared.
    Added(Json),

    /// Resource changed.
    Modified(Json),

    /// Resource disappeared. Carries its last known state.
    Deleted(Json),
}

impl WatchEvent {
    /// Returns the current state of the resource: the object itself, or
    /// [`Json::Null`] once it's deleted.
    #[must_use]
    pub fn current(&self) -> Json {
        match self {
            Self::Added(o) | Self::Modified(o) => o.clone(),
            Self::Deleted(_) => Json::Null,
        }
    }
}

/// Stream of [`WatchEvent`]s.
///
/// Dropping a [`Watch`] releases the underlying server-side watch.
pub struct Watch {
    events: BoxStream<'static, Result<WatchEvent, ClientError>>,
}

impl Watch {
    /// Wraps the given stream of events.
    pub fn new<S>(events: S) -> Self
    where
        S: Stream<Item = Result<WatchEvent, ClientError>> + Send + 'static,
    {
        Self { events: events.boxed() }
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch").finish_non_exhaustive()
    }
}

impl Stream for Watch {
    type Item = Result<WatchEvent, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

/// Options of a [`ResourceClient::watch()`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WatchOptions {
    /// Label selector restricting watched resources.
    pub label_selector: Option<String>,

    /// Field selector restricting watched resources.
    pub field_selector: Option<String>,

    /// Server-side timeout of the watch.
    pub timeout: Option<Duration>,
}

/// Bidirectional session of a command executed in a container.
pub struct ExecSession {
    /// Sender of standard input chunks. Dropping it closes the input.
    pub stdin: Option<mpsc::Sender<Vec<u8>>>,

    /// Standard output chunks.
    pub stdout: BoxStream<'static, Result<Vec<u8>, ClientError>>,

    /// Standard error chunks.
    pub stderr: BoxStream<'static, Result<Vec<u8>, ClientError>>,

    /// Exit code, resolved once the command finishes.
    pub status: BoxFuture<'static, Result<i32, ClientError>>,
}

impl fmt::Debug for ExecSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecSession")
            .field("stdin", &self.stdin.is_some())
            .finish_non_exhaustive()
    }
}

/// Request proxied to a port of a resource.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProxyRequest {
    /// `http` or `https`.
    pub scheme: String,

    /// Target port.
    pub port: u16,

    /// Request path.
    pub path: String,

    /// Query parameters.
    pub params: Vec<(String, String)>,
}

/// Response of a [`ResourceClient::proxy_get()`].
pub struct ProxyResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response body chunks.
    pub body: BoxStream<'static, Result<Vec<u8>, ClientError>>,
}

impl fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Options of a [`ResourceClient::logs()`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LogOptions {
    /// Container to read logs of.
    pub container: Option<String>,

    /// Keep streaming new lines.
    pub follow: bool,

    /// Only lines newer than this.
    pub since: Option<Duration>,

    /// Only this many last lines.
    pub tail_lines: Option<u64>,
}

/// Capability set of a cluster API client.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetches the current state of the `target`.
    async fn get(&self, target: &ResourceRef) -> Result<Json, ClientError> {
        _ = target;
        Err(ClientError::Unsupported { operation: "get" })
    }

    /// Creates the `object`.
    async fn create(
        &self,
        object: &Json,
        options: &[ResourceOption],
    ) -> Result<Json, ClientError> {
        _ = (object, options);
        Err(ClientError::Unsupported { operation: "create" })
    }

    /// Replaces the `object`.
    async fn update(
        &self,
        object: &Json,
        options: &[ResourceOption],
    ) -> Result<Json, ClientError> {
        _ = (object, options);
        Err(ClientError::Unsupported { operation: "update" })
    }

    /// Deletes the `target`.
    async fn delete(
        &self,
        target: &ResourceRef,
        options: &[ResourceOption],
    ) -> Result<(), ClientError> {
        _ = (target, options);
        Err(ClientError::Unsupported { operation: "delete" })
    }

    /// Applies a merge `patch` to the `target`.
    async fn patch(
        &self,
        target: &ResourceRef,
        patch: &Json,
        options: &[ResourceOption],
    ) -> Result<Json, ClientError> {
        _ = (target, patch, options);
        Err(ClientError::Unsupported { operation: "patch" })
    }

    /// Evicts the `target` pod.
    async fn evict(
        &self,
        target: &ResourceRef,
        options: &[ResourceOption],
    ) -> Result<(), ClientError> {
        _ = (target, options);
        Err(ClientError::Unsupported { operation: "evict" })
    }

    /// Watches changes of the `target`.
    async fn watch(
        &self,
        target: &ResourceRef,
        options: &WatchOptions,
    ) -> Result<Watch, ClientError>;

    /// Executes the `command` in a container of the `target`.
    async fn exec(
        &self,
        target: &ResourceRef,
        container: Option<&str>,
        command: &[String],
    ) -> Result<ExecSession, ClientError> {
        _ = (target, container, command);
        Err(ClientError::Unsupported { operation: "exec" })
    }

    /// Sends a GET request proxied to a port of the `target`.
    async fn proxy_get(
        &self,
        target: &ResourceRef,
        request: &ProxyRequest,
    ) -> Result<ProxyResponse, ClientError> {
        _ = (target, request);
        Err(ClientError::Unsupported { operation: "proxy_get" })
    }

    /// Streams log chunks of the `target`.
    async fn logs(
        &self,
        target: &ResourceRef,
        options: &LogOptions,
    ) -> Result<BoxStream<'static, Result<Vec<u8>, ClientError>>, ClientError> {
        _ = (target, options);
        Err(ClientError::Unsupported { operation: "logs" })
    }
}

/// Source of observations of a resource for the asynchronous assertion
/// engine.
///
/// Every call to [`Observe::open()`] starts a fresh [`Watch`]; the engine
/// calls it again whenever the previous one ends or fails transiently.
#[async_trait]
pub trait Observe: Send + Sync {
    /// Opens a new [`Watch`].
    async fn open(&self) -> Result<Watch, ClientError>;
}

#[async_trait]
impl<F, Fut> Observe for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Watch, ClientError>> + Send,
{
    async fn open(&self) -> Result<Watch, ClientError> {
        self().await
    }
}

/// [`Observe`]s a resource through [`ResourceClient::watch()`].
#[derive(Clone)]
pub struct WatchSource {
    client: Arc<dyn ResourceClient>,
    target: ResourceRef,
    options: WatchOptions,
}

impl WatchSource {
    /// Creates a new [`WatchSource`] of the `target`.
    #[must_use]
    pub fn new(client: Arc<dyn ResourceClient>, target: ResourceRef) -> Self {
        Self { client, target, options: WatchOptions::default() }
    }

    /// Sets the [`WatchOptions`].
    #[must_use]
    pub fn with_options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSource")
            .field("target", &self.target)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Observe for WatchSource {
    async fn open(&self) -> Result<Watch, ClientError> {
        let watch = self.client.watch(&self.target, &self.options).await?;

        // A watch of a missing resource stays silent, so its absence is
        // observed up front. The watch is opened first to not miss a
        // creation racing with this lookup.
        let absent = match self.client.get(&self.target).await {
            Err(ClientError::NotFound { .. }) => Some(Ok(WatchEvent::Deleted(Json::Null))),
            Ok(_) | Err(ClientError::Unsupported { .. }) => None,
            Err(e) => return Err(e),
        };
        Ok(Watch::new(stream::iter(absent).chain(watch)))
    }
}

/// [`Observe`]s a resource by periodically polling
/// [`ResourceClient::get()`], for clients or kinds that cannot watch.
///
/// A missing resource is observed as [`WatchEvent::Deleted`]; any other
/// error ends the [`Watch`].
#[derive(Clone)]
pub struct PollSource {
    client: Arc<dyn ResourceClient>,
    target: ResourceRef,
    interval: Duration,
}

impl PollSource {
    /// Creates a new [`PollSource`] of the `target`, polling every
    /// `interval`.
    #[must_use]
    pub fn new(client: Arc<dyn ResourceClient>, target: ResourceRef, interval: Duration) -> Self {
        Self { client, target, interval }
    }
}

impl fmt::Debug for PollSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollSource")
            .field("target", &self.target)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Observe for PollSource {
    async fn open(&self) -> Result<Watch, ClientError> {
        let client = Arc::clone(&self.client);
        let target = self.target.clone();
        let mut ticks = time::interval(self.interval.max(Duration::from_millis(1)));
        ticks.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        let polls = stream::unfold(Some((client, target, ticks)), |state| async move {
            let (client, target, mut ticks) = state?;
            _ = ticks.tick().await;
            match client.get(&target).await {
                Ok(object) => Some((Ok(WatchEvent::Modified(object)), Some((client, target, ticks)))),
                Err(ClientError::NotFound { .. }) => {
                    Some((Ok(WatchEvent::Deleted(Json::Null)), Some((client, target, ticks))))
                }
                Err(e) => Some((Err(e), None)),
            }
        });
        Ok(Watch::new(polls))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    struct Pods {
        gets: AtomicUsize,
    }

    #[async_trait]
    impl ResourceClient for Pods {
        async fn get(&self, target: &ResourceRef) -> Result<Json, ClientError> {
            match self.gets.fetch_add(1, Ordering::SeqCst) {
                0 => Err(ClientError::NotFound { what: target.to_string() }),
                1 => Ok(json!({"status": {"phase": "Running"}})),
                _ => Err(ClientError::Invalid { message: "garbage".into() }),
            }
        }

        async fn watch(&self, _: &ResourceRef, _: &WatchOptions) -> Result<Watch, ClientError> {
            Ok(Watch::new(stream::iter([Ok(WatchEvent::Added(json!({})))])))
        }
    }

    #[tokio::test]
    async fn unimplemented_operations_are_unsupported() {
        let pods = Pods { gets: AtomicUsize::new(0) };
        let pod = ResourceRef::new("pod", "web");

        assert_eq!(
            pods.delete(&pod, &[]).await,
            Err(ClientError::Unsupported { operation: "delete" }),
        );
        assert!(pods.logs(&pod, &LogOptions::default()).await.is_err());
        assert_eq!(
            pods.exec(&pod, None, &["true".into()]).await.err(),
            Some(ClientError::Unsupported { operation: "exec" }),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_an_error() {
        let client: Arc<dyn ResourceClient> = Arc::new(Pods { gets: AtomicUsize::new(0) });
        let source = PollSource::new(client, ResourceRef::new("pod", "web"), Duration::from_secs(1));

        let events = source.open().await.unwrap().collect::<Vec<_>>().await;
        assert_eq!(
            events,
            [
                Ok(WatchEvent::Deleted(Json::Null)),
                Ok(WatchEvent::Modified(json!({"status": {"phase": "Running"}}))),
                Err(ClientError::Invalid { message: "garbage".into() }),
            ],
        );
    }

    #[tokio::test]
    async fn watch_source_delegates_to_the_client() {
        let client: Arc<dyn ResourceClient> = Arc::new(Pods { gets: AtomicUsize::new(1) });
        let source = WatchSource::new(client, ResourceRef::new("pod", "web"));

        let events = source.open().await.unwrap().collect::<Vec<_>>().await;
        assert_eq!(events, [Ok(WatchEvent::Added(json!({})))]);
    }

    #[tokio::test]
    async fn watch_source_observes_missing_resources_as_deleted() {
        let client: Arc<dyn ResourceClient> = Arc::new(Pods { gets: AtomicUsize::new(0) });
        let source = WatchSource::new(client, ResourceRef::new("pod", "web"));

        let events = source.open().await.unwrap().collect::<Vec<_>>().await;
        assert_eq!(
            events,
            [Ok(WatchEvent::Deleted(Json::Null)), Ok(WatchEvent::Added(json!({})))],
        );
    }

    #[tokio::test]
    async fn watch_source_fails_on_broken_lookups() {
        let client: Arc<dyn ResourceClient> = Arc::new(Pods { gets: AtomicUsize::new(2) });
        let source = WatchSource::new(client, ResourceRef::new("pod", "web"));

        assert_eq!(
            source.open().await.err(),
            Some(ClientError::Invalid { message: "garbage".into() }),
        );
    }

    #[tokio::test]
    async fn dropping_a_watch_releases_it() {
        struct Release(Arc<AtomicBool>);

        impl Drop for Release {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let released = Arc::new(AtomicBool::new(false));
        let guard = Release(Arc::clone(&released));
        let mut watch = Watch::new(stream::pending().map(move |()| {
            let _held = &guard;
            Ok(WatchEvent::Deleted(Json::Null))
        }));
        assert!(futures::poll!(watch.next()).is_pending());

        drop(watch);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn only_throttling_errors_suggest_delays() {
        let delay = Some(Duration::from_secs(5));
        assert_eq!(ClientError::TooManyRequests { retry_after: delay }.retry_after(), delay);
        assert_eq!(ClientError::NotFound { what: "pod/web".into() }.retry_after(), None);
    }
}
