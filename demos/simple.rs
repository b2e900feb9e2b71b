use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use batchload::{KeyValue, KeyValueBatchFunction, LoadError, Loader, LoaderConfig};

// Empty functor that implements the KeyValueBatchFunction trait. For this example, it
// trivially loads values from some HashMap.
struct MyBatchFn;

#[async_trait]
impl KeyValueBatchFunction<i64, String> for MyBatchFn {
    type Context = HashMap<i64, String>;

    async fn load(keys: &[i64], context: &Self::Context) -> anyhow::Result<Vec<(i64, String)>> {
        println!("loading {keys:?}");
        Ok(keys.iter().filter_map(|k| context.get(k).cloned().map(|v| (*k, v))).collect())
    }
}

#[tokio::main]
async fn main() {
    let mut context = HashMap::new();
    context.insert(2001, "a space odyssey".to_owned());
    context.insert(7, "samurai".to_owned());
    context.insert(12, "angry men".to_owned());

    let config = LoaderConfig::default().wait(Duration::from_millis(5)).max_batch_size(50);
    let loader = Loader::new(KeyValue::new(MyBatchFn {}, context), config);

    assert_eq!(loader.load(7).await.as_deref().ok(), Some("samurai"));
    assert!(matches!(loader.load(15).await, Err(LoadError::NotFound)));

    // 7 is served from the cache; 12 and 2001 share one batch.
    let values = loader.load_many_all(vec![12, 2010, 2001, 7]).await;
    assert_eq!(
        values.iter().map(|value| value.as_deref().ok()).collect::<Vec<_>>(),
        vec![Some("angry men"), None, Some("a space odyssey"), Some("samurai")]
    );

    println!("{:?}", loader.stats().await);
}
