use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_WAIT_MS: u64 = 2;
const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Batching knobs for a single [`Loader`](crate::Loader).
///
/// A batch is dispatched when `wait_ms` has elapsed since its first key arrived, or as soon as it
/// holds `max_batch_size` distinct keys, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderConfig {
    /// How long an open batch waits for more keys, in milliseconds. Default: 2.
    pub wait_ms: u64,
    /// Distinct keys per batch before it is dispatched early. Default: 100.
    pub max_batch_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { wait_ms: DEFAULT_WAIT_MS, max_batch_size: DEFAULT_MAX_BATCH_SIZE }
    }
}

impl LoaderConfig {
    /// Sub-millisecond waits round up to 1ms so a non-zero window is never dropped.
    #[must_use]
    pub fn wait(self, wait: Duration) -> Self {
        let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        let wait_ms = if wait_ms == 0 && !wait.is_zero() { 1 } else { wait_ms };
        Self { wait_ms, ..self }
    }

    /// If the keys waiting to be loaded reach this threshold, they are loaded immediately.
    #[must_use]
    pub fn max_batch_size(self, max_batch_size: usize) -> Self {
        Self { max_batch_size, ..self }
    }

    pub fn wait_duration(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    /// Capacity actually enforced; a batch always holds at least one key.
    pub fn capacity(&self) -> usize {
        self.max_batch_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: LoaderConfig = serde_json::from_str(r#"{ "waitMs": 5 }"#).unwrap();
        assert_eq!(config, LoaderConfig { wait_ms: 5, max_batch_size: 100 });
        assert_eq!(config.wait_duration(), Duration::from_millis(5));
    }

    #[test]
    fn sub_millisecond_wait_is_not_truncated_to_zero() {
        assert_eq!(LoaderConfig::default().wait(Duration::from_micros(900)).wait_ms, 1);
        assert_eq!(LoaderConfig::default().wait(Duration::ZERO).wait_ms, 0);
        assert_eq!(LoaderConfig::default().wait(Duration::from_micros(2500)).wait_ms, 2);
        assert_eq!(LoaderConfig::default().wait(Duration::MAX).wait_ms, u64::MAX);
    }

    #[test]
    fn zero_capacity_is_normalised() {
        let config = LoaderConfig::default().max_batch_size(0);
        assert_eq!(config.capacity(), 1);
    }
}
