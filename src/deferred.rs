use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt};

use crate::batch::BatchSignal;
use crate::error::LoadError;

/// The worker's answer to a load request.
pub(crate) enum Pending<V> {
    /// Answered immediately, e.g. from the cache.
    Ready(Result<V, LoadError>),
    /// Enqueued; the value lands in `slot` once the batch completes.
    Batched { signal: BatchSignal<V>, slot: usize },
}

impl<V> fmt::Debug for Pending<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pending::Ready(result) => f.debug_tuple("Ready").field(&result.is_ok()).finish(),
            Pending::Batched { slot, .. } => f.debug_struct("Batched").field("slot", slot).finish(),
        }
    }
}

impl<V: Clone> Pending<V> {
    pub(crate) async fn resolve(self) -> Result<V, LoadError> {
        match self {
            Pending::Ready(result) => result,
            Pending::Batched { signal, slot } => {
                let results = signal.await.map_err(|_| LoadError::Abandoned)?;
                results.get(slot).cloned().unwrap_or(Err(LoadError::Abandoned))
            }
        }
    }
}

/// Handle to a value requested through [`Loader::load`](crate::Loader::load).
///
/// The key is enqueued when the handle is created, not when it is first polled, so dropping a
/// handle does not shrink the batch it belongs to. Awaiting it yields the key's own value or
/// error exactly once.
#[must_use = "a DeferredResult does nothing unless awaited"]
pub struct DeferredResult<V> {
    inner: BoxFuture<'static, Result<V, LoadError>>,
}

impl<V> DeferredResult<V> {
    pub(crate) fn new<F>(fut: F) -> Self
    where
        F: Future<Output = Result<V, LoadError>> + Send + 'static,
    {
        Self { inner: fut.boxed() }
    }
}

impl<V> Future for DeferredResult<V> {
    type Output = Result<V, LoadError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<V> fmt::Debug for DeferredResult<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredResult").finish_non_exhaustive()
    }
}
