use std::sync::Arc;

/// Error delivered to a caller whose key could not be resolved.
///
/// `LoadError` is `Clone` because a single failure may be broadcast to every caller waiting on
/// the same batch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    /// The batch function reported a failure for this key, or for the whole batch.
    #[error("fetch failed: {0}")]
    Fetch(Arc<anyhow::Error>),

    /// The batch function returned no value for this key.
    #[error("no value returned for key")]
    NotFound,

    /// The call's auxiliary parameters could not be turned into a grouping key.
    #[error("invalid load parameters: {0}")]
    InvalidParams(Arc<anyhow::Error>),

    /// The batch function returned a result list that does not line up with its keys.
    #[error("internal loader contract violation: {returned} results returned for {expected} keys")]
    ContractViolation { expected: usize, returned: usize },

    /// The batch completed without delivering a result, e.g. the batch function panicked.
    #[error("batch was abandoned before producing a result")]
    Abandoned,

    /// The loader worker is no longer running.
    #[error("loader has shut down")]
    Shutdown,
}

impl LoadError {
    /// Converts an error produced by a batch function into a `LoadError`.
    ///
    /// Batch functions may return a `LoadError` boxed in an `anyhow::Error`; it is recovered
    /// as-is instead of being wrapped a second time.
    pub fn from_fetch(err: anyhow::Error) -> Self {
        match err.downcast::<LoadError>() {
            Ok(load_err) => load_err,
            Err(err) => LoadError::Fetch(Arc::new(err)),
        }
    }

    pub(crate) fn invalid_params(err: anyhow::Error) -> anyhow::Error {
        anyhow::Error::new(LoadError::InvalidParams(Arc::new(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_fetch_wraps_foreign_errors() {
        let err = LoadError::from_fetch(anyhow::anyhow!("connection reset"));
        assert!(matches!(err, LoadError::Fetch(_)));
        assert_eq!(err.to_string(), "fetch failed: connection reset");
    }

    #[test]
    fn from_fetch_recovers_load_errors() {
        let err = LoadError::from_fetch(anyhow::Error::new(LoadError::NotFound));
        assert!(matches!(err, LoadError::NotFound));

        let err = LoadError::from_fetch(LoadError::invalid_params(anyhow::anyhow!("bad filter")));
        assert!(matches!(err, LoadError::InvalidParams(_)));
    }
}
