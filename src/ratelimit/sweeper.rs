//! Background removal of expired buckets.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::store::BucketStore;
use crate::clock::Clock;

/// Spawn a task that sweeps expired entries out of `store` every `interval`.
///
/// The task exits when `shutdown` resolves. `interval` must be non-zero;
/// callers that allow a zero setting should treat it as "no sweeper".
pub fn spawn_sweeper<F>(
    store: Arc<dyn BucketStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: F,
) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    debug_assert!(!interval.is_zero(), "sweep interval must be non-zero");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        tokio::pin!(shutdown);

        info!(interval_secs = interval.as_secs(), "Bucket sweeper started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Bucket sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = store.sweep(clock.now());
                    debug!(removed = removed, remaining = store.len(), "Swept expired buckets");
                }
            }
        }
    })
}
