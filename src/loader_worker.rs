use std::fmt::Debug;
use std::hash::Hash;
use std::slice;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_futures::Instrument;

use crate::{
    batch::Batch,
    batch_function::BatchFunction,
    cache::Cache,
    config::LoaderConfig,
    deferred::Pending,
    dispatcher::dispatch,
    error::LoadError,
    loader_op::LoaderOp,
    stats::LoaderStats,
};

/// A `LoaderWorker` is the single-owner task that holds a loader's cache and its open batch.
///
/// Once started, it runs in a loop until the parent Loader aborts its `JoinHandle` or every
/// sender for the request queue is dropped. Every operation is handled to completion before the
/// next one is received, so key insertion, the capacity check and closing a batch never race.
///
/// Batch lifecycle:
///
/// 1. The first uncached key after the previous batch closed opens a new batch and spawns a
///    timer task that will send `CloseBatch(id)` once the wait window has elapsed.
/// 2. Further keys are appended to the open batch, re-using the slot of a key it already holds.
/// 3. The batch closes when it reaches capacity or when its `CloseBatch` arrives, whichever comes
///    first. A `CloseBatch` for a batch that has already been closed is ignored.
/// 4. A closed batch is detached and handed to a spawned dispatch task; the worker never awaits
///    a batch function, so it keeps accepting keys for the next batch while earlier ones load.
///
/// Dispatch tasks send successfully loaded values back as `Fill` before waking their waiters.
pub(crate) struct LoaderWorker<K, V, F, CacheT> {
    cache: CacheT,
    request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V>>,
    request_tx: mpsc::WeakUnboundedSender<LoaderOp<K, V>>,
    batch_fn: Arc<F>,
    config: LoaderConfig,
    batch: Option<Batch<K, V>>,
    next_batch_id: u64,
    stats: LoaderStats,
    debug_name: &'static str,
}

impl<K, V, F, CacheT> LoaderWorker<K, V, F, CacheT>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Send + Sync,
    F: BatchFunction<K, V>,
    CacheT: Cache<K = K, V = V>,
{
    pub fn new(
        cache: CacheT,
        request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V>>,
        request_tx: mpsc::WeakUnboundedSender<LoaderOp<K, V>>,
        batch_fn: F,
        config: LoaderConfig,
    ) -> Self {
        Self {
            cache,
            request_rx,
            request_tx,
            batch_fn: Arc::new(batch_fn),
            config,
            batch: None,
            next_batch_id: 0,
            stats: LoaderStats::default(),
            debug_name: std::any::type_name::<(K, V)>(),
        }
    }

    pub fn debug_name(&self) -> &'static str {
        self.debug_name
    }

    pub async fn start(mut self) {
        while let Some(op) = self.request_rx.recv().await {
            self.mux_op(op);
        }
        tracing::info!("Tx channel closed. Terminating LoaderWorker.");
    }

    #[tracing::instrument(skip_all)]
    fn mux_op(&mut self, op: LoaderOp<K, V>) {
        match op {
            LoaderOp::Load(key, response_tx) => {
                let pending = self.load(key);
                if response_tx.send(pending).is_err() {
                    tracing::trace!("load requester dropped");
                }
            }
            LoaderOp::Prime(key, value, response_tx) => {
                let inserted = self.cache.insert_if_absent(key, value);
                if inserted {
                    self.stats.primed += 1;
                }
                let _ = response_tx.send(inserted);
            }
            LoaderOp::PrimeMany(key_vals, response_tx) => {
                let mut inserted = 0;
                for (key, value) in key_vals {
                    if self.cache.insert_if_absent(key, value) {
                        inserted += 1;
                    }
                }
                self.stats.primed += inserted as u64;
                let _ = response_tx.send(inserted);
            }
            LoaderOp::Clear(key) => {
                self.cache.remove(slice::from_ref(&key));
                self.stats.clears += 1;
            }
            LoaderOp::ClearMany(keys) => {
                self.cache.remove(&keys);
                self.stats.clears += 1;
            }
            LoaderOp::ClearAll => {
                self.cache.flush();
                self.stats.clears += 1;
            }
            LoaderOp::CloseBatch(id) => match self.batch.take() {
                Some(batch) if batch.id() == id => self.close_batch(batch, false),
                other => {
                    tracing::trace!(batch = id, "batch already closed");
                    self.batch = other;
                }
            },
            LoaderOp::Fill(key_vals) => {
                self.cache.fill(key_vals);
            }
            LoaderOp::Stats(response_tx) => {
                let _ = response_tx.send(self.stats.clone());
            }
        }
    }

    fn load(&mut self, key: K) -> Pending<V> {
        if let Some(value) = self.cache.get(&key) {
            self.stats.record_load_request(true);
            return Pending::Ready(Ok(value.clone()));
        }
        self.stats.record_load_request(false);

        let mut batch = self.batch.take().unwrap_or_else(|| self.open_batch());
        tracing::trace!(?key, batch = batch.id(), "enqueueing key");
        let slot = batch.enqueue(key);
        let signal = batch.signal();
        if batch.len() >= self.config.capacity() {
            self.close_batch(batch, true);
        } else {
            self.batch = Some(batch);
        }
        Pending::Batched { signal, slot }
    }

    fn open_batch(&mut self) -> Batch<K, V> {
        let id = self.next_batch_id;
        self.next_batch_id += 1;

        match self.request_tx.upgrade() {
            Some(timer_tx) => {
                let wait = self.config.wait_duration();
                tokio::spawn(async move {
                    tokio::time::sleep(wait).await;
                    let _ = timer_tx.send(LoaderOp::CloseBatch(id));
                });
            }
            None => tracing::warn!(batch = id, "request queue closed; batch can only close at capacity"),
        }
        tracing::debug!(batch = id, "opened batch");
        Batch::new(id)
    }

    fn close_batch(&mut self, batch: Batch<K, V>, at_capacity: bool) {
        let batch = batch.close();
        let trigger = if at_capacity { "capacity" } else { "timer" };
        tracing::debug!(batch = batch.id, keys = ?batch.keys, trigger, "closing batch");
        self.stats.record_dispatch(batch.keys.len(), at_capacity);

        let Some(fill_tx) = self.request_tx.upgrade() else {
            let keys = batch.keys.len();
            batch.complete((0..keys).map(|_| Err(LoadError::Shutdown)).collect());
            return;
        };
        let span = tracing::debug_span!("dispatch", batch = batch.id, keys = batch.keys.len(), trigger);
        tokio::spawn(dispatch(self.batch_fn.clone(), batch, fill_tx).instrument(span));
    }
}

impl<K, V, F, CacheT> Drop for LoaderWorker<K, V, F, CacheT> {
    fn drop(&mut self) {
        if let Some(batch) = self.batch.take() {
            let batch = batch.close();
            let keys = batch.keys.len();
            batch.complete((0..keys).map(|_| Err(LoadError::Shutdown)).collect());
        }
        tracing::debug!(worker = self.debug_name, stats = ?self.stats, "loader worker finished");
    }
}
