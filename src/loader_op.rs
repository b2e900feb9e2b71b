use tokio::sync::oneshot;

use crate::deferred::Pending;
use crate::stats::LoaderStats;

/// Set of possible requests that can be sent to the [`LoaderWorker`](crate::loader_worker::LoaderWorker).
///
/// Load, Prime and Clear come from the [`Loader`](crate::Loader) handle. `CloseBatch` and `Fill`
/// are sent by the worker's own timer and dispatch tasks.
#[derive(Debug)]
pub(crate) enum LoaderOp<K, V> {
    /// Fetch data from the resource wrapped by this loader (or the cache).
    Load(K, oneshot::Sender<Pending<V>>),
    /// Add a value to the cache unless the key already has one; reports whether it was added.
    Prime(K, V, oneshot::Sender<bool>),
    PrimeMany(Vec<(K, V)>, oneshot::Sender<usize>),
    /// Remove values from the cache so that they will be reloaded when they are next requested.
    Clear(K),
    ClearMany(Vec<K>),
    ClearAll,
    /// The wait window of the batch with this id has elapsed.
    CloseBatch(u64),
    /// Successfully fetched values to be written into the cache.
    Fill(Vec<(K, V)>),
    Stats(oneshot::Sender<LoaderStats>),
}
