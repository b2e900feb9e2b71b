/// Counters describing what a loader did over its lifetime.
///
/// A snapshot can be requested with [`Loader::stats`](crate::Loader::stats); the worker also
/// reports its final counters at `debug` level when it shuts down.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoaderStats {
    /// Number of `load` calls received by the worker.
    pub load_requests: u64,
    /// The number of loads answered straight from the cache.
    pub cache_hits: u64,
    /// Number of batches handed to the batch function.
    pub batches_dispatched: u64,
    /// The total number of distinct keys handed to the batch function.
    pub keys_dispatched: u64,
    /// The largest number of distinct keys dispatched in a single batch.
    pub max_batch_size: u64,
    /// Batches closed because they reached capacity.
    pub capacity_closes: u64,
    /// Batches closed because their wait window elapsed.
    pub timer_closes: u64,
    /// Values that were written into the cache by `prime`.
    pub primed: u64,
    /// Number of clear operations applied to the cache.
    pub clears: u64,
}

impl LoaderStats {
    pub(crate) fn record_load_request(&mut self, cache_hit: bool) {
        self.load_requests += 1;
        if cache_hit {
            self.cache_hits += 1;
        }
    }

    pub(crate) fn record_dispatch(&mut self, batch_size: usize, at_capacity: bool) {
        let batch_size = batch_size as u64;
        self.batches_dispatched += 1;
        self.keys_dispatched += batch_size;
        self.max_batch_size = self.max_batch_size.max(batch_size);
        if at_capacity {
            self.capacity_closes += 1;
        } else {
            self.timer_closes += 1;
        }
    }

    /// Mean number of distinct keys per dispatched batch.
    pub fn average_batch_size(&self) -> f64 {
        if self.batches_dispatched == 0 {
            return 0.0;
        }
        self.keys_dispatched as f64 / self.batches_dispatched as f64
    }
}
