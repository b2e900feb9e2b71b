//! Batching for loads that carry auxiliary parameters.
//!
//! Some relationships are loaded with more than a key: a caller may also pass a filter and a
//! row limit, and each key resolves to zero or more rows. Only calls whose parameters are
//! identical can share a fetch, so [`ParamGrouping`] splits every dispatched batch of calls into
//! parameter groups, fetches each group once, and stitches the rows back into call order.
//!
//! `ParamGrouping` is itself a [`BatchFunction`] over whole calls, so a grouped loader is an
//! ordinary [`Loader`](crate::Loader) whose keys are calls and whose values are row lists.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use async_trait::async_trait;
use futures::future;
use serde::Serialize;
use serde_json::Value;

use crate::batch_function::{BatchFunction, BatchOutput};
use crate::error::LoadError;

const DEFAULT_MAX_ROWS_PER_KEY: usize = 1000;

/// The key and auxiliary parameters extracted from one grouped call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallParams<K, W> {
    pub key: K,
    pub filter: W,
    pub limit: Option<usize>,
}

/// A one-to-many fetch over keys that share the same filter and limit.
///
/// Must return exactly one row list per key, in key order. An `Err`, or a list of the wrong
/// length, fails every call in the dispatch cycle, not only the calls of this group.
#[async_trait]
pub trait GroupedBatchFunction<K, W, V>: Send + Sync + 'static
where
    K: Send + Sync + 'static,
    W: Send + Sync + 'static,
    V: Send + 'static,
{
    async fn load(&self, limit: Option<usize>, filter: &W, keys: &[K]) -> anyhow::Result<Vec<Vec<V>>>;
}

/// Adapts an async closure into a [`GroupedBatchFunction`].
pub struct FnGrouped<F>(F);

pub fn grouped_fn<F>(f: F) -> FnGrouped<F> {
    FnGrouped(f)
}

#[async_trait]
impl<K, W, V, F, Fut> GroupedBatchFunction<K, W, V> for FnGrouped<F>
where
    K: Clone + Send + Sync + 'static,
    W: Clone + Send + Sync + 'static,
    V: Send + 'static,
    F: Fn(Option<usize>, W, Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<Vec<V>>>> + Send + 'static,
{
    async fn load(&self, limit: Option<usize>, filter: &W, keys: &[K]) -> anyhow::Result<Vec<Vec<V>>> {
        (self.0)(limit, filter.clone(), keys.to_vec()).await
    }
}

/// A parameter value compared and hashed through its canonical JSON encoding.
///
/// Useful for filter objects that cannot derive `Hash` (floats, JSON values, maps). Object keys
/// are emitted in sorted order, so two values that serialise to the same document always land
/// in the same group regardless of field or insertion order.
#[derive(Clone)]
pub struct Canonical<T> {
    value: T,
    encoded: String,
}

impl<T: Serialize> Canonical<T> {
    pub fn new(value: T) -> Result<Self, serde_json::Error> {
        let encoded = serde_json::to_string(&sort_keys(serde_json::to_value(&value)?))?;
        Ok(Self { value, encoded })
    }
}

/// Rebuilds every object with its keys inserted in sorted order. `Map` keeps insertion order when
/// serde_json's `preserve_order` feature is enabled anywhere in the build.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries = map.into_iter().collect::<Vec<_>>();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(entries.into_iter().map(|(key, value)| (key, sort_keys(value))).collect())
        }
        Value::Array(values) => Value::Array(values.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

impl<T> Canonical<T> {
    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

impl<T> PartialEq for Canonical<T> {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl<T> Eq for Canonical<T> {}

impl<T> Hash for Canonical<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encoded.hash(state);
    }
}

impl<T> fmt::Debug for Canonical<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Canonical").field(&self.encoded).finish()
    }
}

/// Groups calls by their `(filter, limit)` and fetches each group through a
/// [`GroupedBatchFunction`].
///
/// `extract` pulls the key and parameters out of a call. A call it rejects fails with
/// [`LoadError::InvalidParams`] without joining any group. Every key's row list is capped at
/// `max_rows_per_key` (default 1000) regardless of the caller's own limit.
pub struct ParamGrouping<G, X, K, W, V> {
    inner: G,
    extract: X,
    max_rows_per_key: usize,
    _marker: PhantomData<fn() -> (K, W, V)>,
}

impl<G, X, K, W, V> ParamGrouping<G, X, K, W, V> {
    pub fn new(inner: G, extract: X) -> Self {
        Self { inner, extract, max_rows_per_key: DEFAULT_MAX_ROWS_PER_KEY, _marker: PhantomData }
    }

    #[must_use]
    pub fn max_rows_per_key(self, max_rows_per_key: usize) -> Self {
        Self { max_rows_per_key, ..self }
    }
}

struct Group<K, W> {
    filter: W,
    limit: Option<usize>,
    keys: Vec<K>,
    slots: HashMap<K, usize>,
    /// `(call index, key slot)` for every call in this group.
    calls: Vec<(usize, usize)>,
}

impl<K: Eq + Hash + Clone, W> Group<K, W> {
    fn new(filter: W, limit: Option<usize>) -> Self {
        Self { filter, limit, keys: Vec::new(), slots: HashMap::new(), calls: Vec::new() }
    }

    fn push(&mut self, call_idx: usize, key: K) {
        let slot = match self.slots.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = self.keys.len();
                self.slots.insert(key.clone(), slot);
                self.keys.push(key);
                slot
            }
        };
        self.calls.push((call_idx, slot));
    }
}

impl<G, X, K, W, V> ParamGrouping<G, X, K, W, V>
where
    G: GroupedBatchFunction<K, W, V>,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    W: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    async fn fetch_group(&self, group: &Group<K, W>) -> anyhow::Result<Vec<Vec<V>>> {
        let mut rows = self.inner.load(group.limit, &group.filter, &group.keys).await?;
        if rows.len() != group.keys.len() {
            return Err(anyhow::Error::new(LoadError::ContractViolation {
                expected: group.keys.len(),
                returned: rows.len(),
            }));
        }
        for (slot, key_rows) in rows.iter_mut().enumerate() {
            if key_rows.len() > self.max_rows_per_key {
                tracing::warn!(
                    slot,
                    returned = key_rows.len(),
                    ceiling = self.max_rows_per_key,
                    "truncating rows returned for a single key"
                );
                key_rows.truncate(self.max_rows_per_key);
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl<C, G, X, K, W, V> BatchFunction<C, Vec<V>> for ParamGrouping<G, X, K, W, V>
where
    C: Send + Sync + 'static,
    G: GroupedBatchFunction<K, W, V>,
    X: Fn(&C) -> anyhow::Result<CallParams<K, W>> + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    W: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn load(&self, calls: &[C]) -> BatchOutput<Vec<V>> {
        let mut results = (0..calls.len()).map(|_| None).collect::<Vec<Option<anyhow::Result<Vec<V>>>>>();
        let mut groups: Vec<Group<K, W>> = Vec::new();
        let mut group_index: HashMap<(W, Option<usize>), usize> = HashMap::new();

        for (call_idx, call) in calls.iter().enumerate() {
            let params = match (self.extract)(call) {
                Ok(params) => params,
                Err(err) => {
                    tracing::debug!(call = call_idx, %err, "rejecting call with invalid parameters");
                    results[call_idx] = Some(Err(LoadError::invalid_params(err)));
                    continue;
                }
            };
            let group_key = (params.filter, params.limit);
            let group_idx = match group_index.get(&group_key) {
                Some(&idx) => idx,
                None => {
                    let idx = groups.len();
                    groups.push(Group::new(group_key.0.clone(), group_key.1));
                    group_index.insert(group_key, idx);
                    idx
                }
            };
            groups[group_idx].push(call_idx, params.key);
        }
        tracing::debug!(calls = calls.len(), groups = groups.len(), "grouped calls by parameters");

        let fetched = match future::try_join_all(groups.iter().map(|group| self.fetch_group(group))).await {
            Ok(fetched) => fetched,
            Err(err) => {
                tracing::error!(%err, "grouped fetch failed; failing every call in this dispatch");
                return BatchOutput::Shared(err);
            }
        };

        for (group, rows) in groups.iter().zip(fetched) {
            for &(call_idx, slot) in &group.calls {
                results[call_idx] = Some(Ok(rows[slot].clone()));
            }
        }

        BatchOutput::PerKey(
            results
                .into_iter()
                .map(|result| {
                    result.unwrap_or_else(|| Err(anyhow::anyhow!("call was not assigned to a parameter group")))
                })
                .collect(),
        )
    }
}
