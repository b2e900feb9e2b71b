mod batch;
mod batch_function;
mod cache;
mod config;
mod deferred;
mod dispatcher;
mod error;
mod grouping;
mod loader;
mod loader_op;
mod loader_worker;
mod stats;

pub use batch_function::{batch_fn, BatchFunction, BatchOutput, FnBatch, KeyValue, KeyValueBatchFunction};
pub use config::LoaderConfig;
pub use deferred::DeferredResult;
pub use error::LoadError;
pub use grouping::{grouped_fn, CallParams, Canonical, FnGrouped, GroupedBatchFunction, ParamGrouping};
pub use loader::Loader;
pub use stats::LoaderStats;
