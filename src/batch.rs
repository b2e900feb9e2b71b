use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{FutureExt, Shared};
use tokio::sync::oneshot;

use crate::error::LoadError;

/// Per-slot outcomes of one dispatched batch, shared by every waiter.
pub(crate) type BatchResults<V> = Arc<Vec<Result<V, LoadError>>>;

/// Completion signal of a batch. Fires exactly once, when the batch's results have been fanned
/// out; every waiter holds a clone and reads only its own slot.
pub(crate) type BatchSignal<V> = Shared<oneshot::Receiver<BatchResults<V>>>;

/// An open batch: distinct keys in first-arrival order plus the signal its waiters block on.
///
/// Only the loader worker touches an open batch. Closing consumes it, so a closed batch can
/// never accept another key; the next key opens a fresh `Batch`.
pub(crate) struct Batch<K, V> {
    id: u64,
    keys: Vec<K>,
    slots: HashMap<K, usize>,
    completion: oneshot::Sender<BatchResults<V>>,
    signal: BatchSignal<V>,
}

impl<K, V> Batch<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(id: u64) -> Self {
        let (completion, rx) = oneshot::channel();
        Self { id, keys: Vec::new(), slots: HashMap::new(), completion, signal: rx.shared() }
    }

    /// Returns the slot index for `key`, appending it when this batch has not seen it yet.
    pub fn enqueue(&mut self, key: K) -> usize {
        if let Some(&slot) = self.slots.get(&key) {
            return slot;
        }
        let slot = self.keys.len();
        self.slots.insert(key.clone(), slot);
        self.keys.push(key);
        slot
    }

    pub fn signal(&self) -> BatchSignal<V> {
        self.signal.clone()
    }
}

impl<K, V> Batch<K, V> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn close(self) -> ClosedBatch<K, V> {
        ClosedBatch { id: self.id, keys: self.keys, completion: self.completion }
    }
}

/// A batch that has been detached from its loader and is waiting on (or running) its fetch.
pub(crate) struct ClosedBatch<K, V> {
    pub id: u64,
    pub keys: Vec<K>,
    completion: oneshot::Sender<BatchResults<V>>,
}

impl<K, V> ClosedBatch<K, V> {
    /// Fires the completion signal. `results` is indexed by slot.
    pub fn complete(self, results: Vec<Result<V, LoadError>>) {
        if self.completion.send(Arc::new(results)).is_err() {
            tracing::trace!(batch = self.id, "batch completed with no remaining waiters");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn duplicate_keys_share_a_slot() {
        let mut batch = Batch::<&str, u32>::new(0);
        assert_eq!(batch.enqueue("a"), 0);
        assert_eq!(batch.enqueue("b"), 1);
        assert_eq!(batch.enqueue("a"), 0);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.close().keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn waiters_observe_completion() {
        let mut batch = Batch::<&str, u32>::new(7);
        let slot = batch.enqueue("a");
        let first = batch.signal();
        let second = batch.signal();

        batch.close().complete(vec![Ok(42)]);

        let results = first.await.unwrap();
        assert_eq!(results[slot].as_ref().ok(), Some(&42));
        assert!(Arc::ptr_eq(&results, &second.await.unwrap()));
    }

    #[tokio::test]
    async fn dropped_batch_cancels_waiters() {
        let mut batch = Batch::<&str, u32>::new(1);
        batch.enqueue("a");
        let signal = batch.signal();
        drop(batch.close());
        assert!(signal.await.is_err());
    }
}
