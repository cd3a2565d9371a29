//! Batched query execution with enforced inter-batch delay.
//!
//! Items within a batch run concurrently; batches are strictly sequential
//! with a pause between them. The pause is the throttle — this is the one
//! place the core intentionally serializes work to shape load on the
//! downstream store.

use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Batch sizing and pacing.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            delay: Duration::from_millis(100),
        }
    }
}

/// Process `items` in sequential batches, waiting `options.delay` between
/// batches. Empty input performs zero calls. The first item-level error is
/// returned after its batch completes; later batches are not started.
pub async fn batch_query<T, E, F, Fut>(
    items: Vec<T>,
    options: BatchOptions,
    query_fn: F,
) -> Result<(), E>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    if items.is_empty() {
        return Ok(());
    }

    let batch_size = options.batch_size.max(1);
    let total = items.len();
    let mut remaining = items;
    let mut batch_index = 0usize;

    while !remaining.is_empty() {
        if batch_index > 0 {
            tokio::time::sleep(options.delay).await;
        }

        let rest = remaining.split_off(batch_size.min(remaining.len()));
        let batch = std::mem::replace(&mut remaining, rest);

        debug!(
            batch = batch_index,
            size = batch.len(),
            total_items = total,
            "Processing batch"
        );

        let results = join_all(batch.into_iter().map(&query_fn)).await;
        for result in results {
            result?;
        }

        batch_index += 1;
    }

    Ok(())
}
