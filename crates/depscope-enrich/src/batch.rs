//! Batched, concurrency-limited fetching with single-item retry

use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::future::Future;

/// Fetch `items` in batches of `batch_size`, keeping at most `concurrency`
/// batches in flight.
///
/// Items whose batch failed are retried one at a time; an item that fails
/// again is logged and left out of the result. Items a successful batch
/// simply did not return are not retried.
pub async fn run_batched<T, F, Fut>(
    label: &str,
    items: Vec<String>,
    batch_size: usize,
    concurrency: usize,
    fetch: F,
) -> HashMap<String, T>
where
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = anyhow::Result<HashMap<String, T>>>,
{
    let mut results = HashMap::new();
    if items.is_empty() {
        return results;
    }
    let concurrency = concurrency.max(1);

    let batches: Vec<Vec<String>> = items
        .chunks(batch_size.max(1))
        .map(<[String]>::to_vec)
        .collect();
    tracing::debug!(
        "Fetching {} {} in {} batches",
        items.len(),
        label,
        batches.len()
    );

    let outcomes: Vec<(Vec<String>, anyhow::Result<HashMap<String, T>>)> = stream::iter(batches)
        .map(|batch| {
            let fut = fetch(batch.clone());
            async move { (batch, fut.await) }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut missing = Vec::new();
    for (batch, outcome) in outcomes {
        match outcome {
            Ok(found) => results.extend(found),
            Err(e) => {
                tracing::debug!("Batch of {} {} failed: {:#}", batch.len(), label, e);
                missing.extend(batch);
            }
        }
    }

    if missing.is_empty() {
        return results;
    }

    let retries: Vec<(String, anyhow::Result<HashMap<String, T>>)> = stream::iter(missing)
        .map(|item| {
            let fut = fetch(vec![item.clone()]);
            async move { (item, fut.await) }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    for (item, outcome) in retries {
        match outcome {
            Ok(found) => results.extend(found),
            Err(e) => tracing::warn!("Could not fetch {} for {}: {:#}", label, item, e),
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn items(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("pkg{i}@1.0.0")).collect()
    }

    #[tokio::test]
    async fn test_batches_respect_size() {
        let sizes = Mutex::new(Vec::new());
        let results = run_batched("test", items(12), 5, 2, |batch| {
            sizes.lock().unwrap().push(batch.len());
            async move {
                let found: HashMap<String, u32> = batch.into_iter().map(|s| (s, 1)).collect();
                Ok::<_, anyhow::Error>(found)
            }
        })
        .await;

        assert_eq!(results.len(), 12);
        let mut sizes = sizes.into_inner().unwrap();
        sizes.sort();
        assert_eq!(sizes, vec![2, 5, 5]);
    }

    #[tokio::test]
    async fn test_failed_batch_is_retried_per_item() {
        let calls = AtomicUsize::new(0);
        let results = run_batched("test", items(4), 4, 1, |batch| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if batch.len() > 1 {
                    anyhow::bail!("batch too large");
                }
                if batch[0] == "pkg2@1.0.0" {
                    anyhow::bail!("gone");
                }
                let found: HashMap<String, bool> = batch.into_iter().map(|s| (s, true)).collect();
                Ok(found)
            }
        })
        .await;

        // One failed batch, then four single-item retries.
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(results.len(), 3);
        assert!(!results.contains_key("pkg2@1.0.0"));
    }

    #[tokio::test]
    async fn test_absent_items_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let results = run_batched("test", items(3), 10, 4, |_batch| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, anyhow::Error>(HashMap::<String, u8>::new()) }
        })
        .await;
        assert!(results.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_input_never_calls_fetch() {
        let calls = AtomicUsize::new(0);
        let results = tokio_test::block_on(run_batched("test", Vec::new(), 5, 1, |_batch| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(HashMap::<String, u8>::new()) }
        }));
        assert!(results.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
