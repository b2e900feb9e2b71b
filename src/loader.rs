use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Drop;

use futures::future;
use tokio::sync::{mpsc, oneshot};
use tracing_futures::Instrument;

use crate::{
    batch_function::BatchFunction,
    config::LoaderConfig,
    deferred::DeferredResult,
    error::LoadError,
    loader_op::LoaderOp,
    loader_worker::LoaderWorker,
    stats::LoaderStats,
};

/// Batch loads values from some expensive resource, primarily intended for mitigating GraphQL's
/// N+1 problem.
///
/// A `Loader` is meant to live for one logical request: create one per relationship type when
/// the request starts and drop it when the request completes. Nothing it caches outlives it.
///
/// Users can call [`Loader::load`] and [`Loader::load_many`] to fetch values from the underlying
/// resource or cache. The cache can be cleared with calls to [`Loader::clear`],
/// [`Loader::clear_many`] and [`Loader::clear_all`], and values can be added to the cache
/// out-of-band through the use of [`Loader::prime`] and [`Loader::prime_many`].
///
/// The `Loader` struct acts as an intermediary between the async domain in which `load` calls are
/// invoked and the single-owner domain of its `LoaderWorker`. Callers can invoke the `Loader`
/// from multiple parallel tasks; every operation is enqueued on the worker's request queue
/// without blocking and processed in order. Loads that miss the cache are collected into a batch
/// which is handed to the [`BatchFunction`] once it fills up or its wait window elapses.
pub struct Loader<K, V>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    request_tx: mpsc::UnboundedSender<LoaderOp<K, V>>,
    load_task_handle: tokio::task::JoinHandle<()>,
}

impl<K, V> Drop for Loader<K, V>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    fn drop(&mut self) {
        self.load_task_handle.abort();
    }
}

impl<K, V> Loader<K, V>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    /// Creates a new Loader for the provided BatchFunction.
    ///
    /// Must be called from within a tokio runtime; the loader's worker is spawned onto it.
    pub fn new<F>(batch_fn: F, config: LoaderConfig) -> Self
    where
        F: BatchFunction<K, V>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = LoaderWorker::<K, V, F, HashMap<K, V>>::new(
            HashMap::new(),
            rx,
            tx.downgrade(),
            batch_fn,
            config,
        );
        let span = tracing::trace_span!("LoaderWorker", kv = worker.debug_name());
        Self { request_tx: tx, load_task_handle: tokio::task::spawn(worker.start().instrument(span)) }
    }

    /// Loads a value from the underlying resource.
    ///
    /// The key is enqueued immediately: if it is already cached the returned handle resolves
    /// without touching a batch, otherwise it joins the currently open batch (opening one if
    /// needed) and resolves once that batch has been loaded. Errors are delivered only to the
    /// callers of the key they belong to, unless the batch function failed the whole batch.
    pub fn load(&self, key: K) -> DeferredResult<V> {
        let (response_tx, response_rx) = oneshot::channel();
        let sent = self.request_tx.send(LoaderOp::Load(key, response_tx)).is_ok();
        DeferredResult::new(async move {
            if !sent {
                return Err(LoadError::Shutdown);
            }
            let pending = response_rx.await.map_err(|_| LoadError::Shutdown)?;
            pending.resolve().await
        })
    }

    /// Loads many values at once, one handle per key in the order given.
    ///
    /// Duplicate keys are not collapsed here; they share a slot in the batch they land in.
    pub fn load_many<I>(&self, keys: I) -> Vec<DeferredResult<V>>
    where
        I: IntoIterator<Item = K>,
    {
        keys.into_iter().map(|key| self.load(key)).collect()
    }

    /// Loads many values and waits for all of them.
    pub async fn load_many_all<I>(&self, keys: I) -> Vec<Result<V, LoadError>>
    where
        I: IntoIterator<Item = K>,
    {
        future::join_all(self.load_many(keys)).await
    }

    /// Adds a value to the cache unless the key is already cached.
    ///
    /// Returns whether the value was inserted. A primed key is never fetched by this loader.
    pub async fn prime(&self, key: K, value: V) -> bool {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(LoaderOp::Prime(key, value, response_tx));
        response_rx.await.unwrap_or(false)
    }

    /// Adds many values to the cache at once, skipping keys that are already cached.
    ///
    /// Returns the number of values inserted.
    pub async fn prime_many<I>(&self, key_vals: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(LoaderOp::PrimeMany(key_vals.into_iter().collect(), response_tx));
        response_rx.await.unwrap_or(0)
    }

    /// Removes a value from the cache.
    ///
    /// This key will be reloaded when it is next requested.
    pub async fn clear(&self, key: K) {
        self.send(LoaderOp::Clear(key));
    }

    /// Removes multiple values from the cache at once.
    ///
    /// These keys will be reloaded when requested.
    pub async fn clear_many<I>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
    {
        self.send(LoaderOp::ClearMany(keys.into_iter().collect()));
    }

    /// Empties the cache.
    pub async fn clear_all(&self) {
        self.send(LoaderOp::ClearAll);
    }

    /// Returns a snapshot of the worker's counters.
    pub async fn stats(&self) -> LoaderStats {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(LoaderOp::Stats(response_tx));
        response_rx.await.unwrap_or_default()
    }

    fn send(&self, op: LoaderOp<K, V>) {
        if self.request_tx.send(op).is_err() {
            tracing::warn!("loader worker is no longer running");
        }
    }
}
