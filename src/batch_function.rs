use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::LoadError;

/// What a [`BatchFunction`] hands back for one batch of keys.
#[derive(Debug)]
pub enum BatchOutput<V> {
    /// One result per key, in the same order as the keys the function was called with.
    PerKey(Vec<Result<V, anyhow::Error>>),
    /// A single failure that applies to every key in the batch (e.g. the backend was unreachable).
    Shared(anyhow::Error),
}

impl<V> BatchOutput<V> {
    /// All keys resolved successfully, positionally aligned with the input keys.
    pub fn values(values: Vec<V>) -> Self {
        BatchOutput::PerKey(values.into_iter().map(Ok).collect())
    }
}

impl<V> From<anyhow::Result<Vec<V>>> for BatchOutput<V> {
    fn from(result: anyhow::Result<Vec<V>>) -> Self {
        match result {
            Ok(values) => BatchOutput::values(values),
            Err(err) => BatchOutput::Shared(err),
        }
    }
}

/// A `BatchFunction` defines how a [`Loader`](crate::Loader) fetches a batch of keys from some
/// expensive resource.
///
/// The function receives the distinct keys collected by one batch, in first-arrival order, and
/// must answer with either one result per key or a single shared error. Returning a
/// [`BatchOutput::PerKey`] list of any other length is a contract violation: every caller in the
/// batch then receives [`LoadError::ContractViolation`].
#[async_trait]
pub trait BatchFunction<K, V>: Send + Sync + 'static
where
    K: Send + Sync + 'static,
    V: Send + 'static,
{
    async fn load(&self, keys: &[K]) -> BatchOutput<V>;
}

/// Adapts an async closure taking owned keys into a [`BatchFunction`].
pub struct FnBatch<F>(F);

/// Wraps `f` so it can be handed to [`Loader::new`](crate::Loader::new).
///
/// ```ignore
/// let loader = Loader::new(batch_fn(|ids: Vec<i64>| async move { fetch_users(ids).await.into() }), config);
/// ```
pub fn batch_fn<F>(f: F) -> FnBatch<F> {
    FnBatch(f)
}

#[async_trait]
impl<K, V, F, Fut> BatchFunction<K, V> for FnBatch<F>
where
    K: Clone + Send + Sync + 'static,
    V: Send + 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BatchOutput<V>> + Send + 'static,
{
    async fn load(&self, keys: &[K]) -> BatchOutput<V> {
        (self.0)(keys.to_vec()).await
    }
}

/// A fetch function that returns whatever `(key, value)` pairs it found, in any order.
///
/// Keys absent from the response resolve to [`LoadError::NotFound`]; an `Err` fails the whole
/// batch. Multiple functions (and therefore loaders) can share the same context, likely through
/// an `Arc`. Wrap an implementation in [`KeyValue`] to use it with a loader.
#[async_trait]
pub trait KeyValueBatchFunction<K, V> {
    type Context: Send + Sync + 'static;
    async fn load(keys: &[K], context: &Self::Context) -> anyhow::Result<Vec<(K, V)>>;
}

/// Aligns a [`KeyValueBatchFunction`]'s unordered response with the batch's keys.
pub struct KeyValue<F, K, V>
where
    F: KeyValueBatchFunction<K, V>,
{
    context: F::Context,
    _marker: PhantomData<fn() -> (F, K, V)>,
}

impl<F, K, V> KeyValue<F, K, V>
where
    F: KeyValueBatchFunction<K, V>,
{
    /// Note: the batch function is passed in as a marker for type inference.
    pub fn new(_: F, context: F::Context) -> Self {
        Self { context, _marker: PhantomData }
    }
}

#[async_trait]
impl<F, K, V> BatchFunction<K, V> for KeyValue<F, K, V>
where
    F: KeyValueBatchFunction<K, V> + 'static,
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + 'static,
{
    async fn load(&self, keys: &[K]) -> BatchOutput<V> {
        match F::load(keys, &self.context).await {
            Err(err) => BatchOutput::Shared(err),
            Ok(pairs) => {
                let mut found = pairs.into_iter().collect::<HashMap<_, _>>();
                BatchOutput::PerKey(
                    keys.iter()
                        .map(|key| {
                            found.remove(key).ok_or_else(|| anyhow::Error::new(LoadError::NotFound))
                        })
                        .collect(),
                )
            }
        }
    }
}
