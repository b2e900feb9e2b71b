use std::sync::Arc;

use tokio::sync::mpsc;

use crate::batch::ClosedBatch;
use crate::batch_function::{BatchFunction, BatchOutput};
use crate::error::LoadError;
use crate::loader_op::LoaderOp;

/// Runs the batch function once for a closed batch and fans the output back out to its waiters.
///
/// Successful values are sent back to the worker for caching before the completion signal
/// fires, so a caller that has seen its value will hit the cache on its next load of that key.
pub(crate) async fn dispatch<K, V, F>(
    batch_fn: Arc<F>,
    batch: ClosedBatch<K, V>,
    fill_tx: mpsc::UnboundedSender<LoaderOp<K, V>>,
) where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
    F: BatchFunction<K, V> + ?Sized,
{
    let output = batch_fn.load(&batch.keys).await;
    let results = fan_out(batch.keys.len(), output);

    let fills = batch
        .keys
        .iter()
        .zip(&results)
        .filter_map(|(key, result)| result.as_ref().ok().map(|value| (key.clone(), value.clone())))
        .collect::<Vec<_>>();
    tracing::debug!(loaded = fills.len(), failed = results.len() - fills.len(), "batch loaded");
    if !fills.is_empty() && fill_tx.send(LoaderOp::Fill(fills)).is_err() {
        tracing::trace!("worker stopped before results could be cached");
    }

    batch.complete(results);
}

/// Maps a batch function's output onto one result per slot.
pub(crate) fn fan_out<V>(expected: usize, output: BatchOutput<V>) -> Vec<Result<V, LoadError>> {
    match output {
        BatchOutput::Shared(err) => {
            let err = LoadError::from_fetch(err);
            tracing::debug!(%err, keys = expected, "batch failed as a whole");
            (0..expected).map(|_| Err(err.clone())).collect()
        }
        BatchOutput::PerKey(results) if results.len() == expected => {
            results.into_iter().map(|result| result.map_err(LoadError::from_fetch)).collect()
        }
        BatchOutput::PerKey(results) => {
            let returned = results.len();
            tracing::error!(
                expected,
                returned,
                "batch function returned a result list that does not line up with its keys"
            );
            let err = LoadError::ContractViolation { expected, returned };
            (0..expected).map(|_| Err(err.clone())).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn per_key_errors_stay_in_their_slot() {
        let output = BatchOutput::PerKey(vec![Ok(1), Err(anyhow!("row is locked")), Ok(3)]);
        let results = fan_out(3, output);

        assert_eq!(results[0].as_ref().ok(), Some(&1));
        assert!(matches!(results[1], Err(LoadError::Fetch(_))));
        assert_eq!(results[2].as_ref().ok(), Some(&3));
    }

    #[test]
    fn shared_error_reaches_every_slot() {
        let results = fan_out::<u32>(3, BatchOutput::Shared(anyhow!("connection refused")));

        assert_eq!(results.len(), 3);
        for result in &results {
            match result {
                Err(LoadError::Fetch(err)) => assert_eq!(err.to_string(), "connection refused"),
                other => panic!("unexpected result: {other:?}"),
            }
        }
    }

    #[test]
    fn short_result_list_is_a_contract_violation() {
        let results = fan_out(3, BatchOutput::values(vec![1, 2]));

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|result| matches!(
            result,
            Err(LoadError::ContractViolation { expected: 3, returned: 2 })
        )));
    }
}
