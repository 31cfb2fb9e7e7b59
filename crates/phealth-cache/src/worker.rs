//! Background refresh loop.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{PartitionHealthCache, RefreshOutcome};
use crate::fetcher::PartitionHealthFetcher;

impl<F: PartitionHealthFetcher + 'static> PartitionHealthCache<F> {
    /// Spawn the single refresh consumer for this cache on the current tokio
    /// runtime. The task exits when `shutdown` is cancelled.
    ///
    /// Spawn at most one worker per cache; a second one only contends for the
    /// same in-flight slot.
    #[must_use]
    pub fn spawn_worker(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move { cache.run_worker(shutdown).await })
    }

    /// Drive [`Self::run_next`] until `shutdown` is cancelled.
    ///
    /// After every step the last request is re-evaluated, so a backlog of
    /// stale keys drains one fetch at a time. A failed key is logged and
    /// passed over; it is retried on the next `request`.
    pub async fn run_worker(&self, shutdown: CancellationToken) {
        info!("partition health worker starting");
        loop {
            let step = tokio::select! {
                biased;

                () = shutdown.cancelled() => break,
                step = self.run_next() => step,
            };

            match step {
                Ok(Some(outcome)) => {
                    if let RefreshOutcome::Applied(entity_key) = &outcome {
                        debug!(entity = %entity_key, "worker applied refresh");
                    }
                    let _ = self.schedule_next_stale();
                }
                Ok(None) => {
                    tokio::select! {
                        biased;

                        () = shutdown.cancelled() => break,
                        () = self.inner.wake.notified() => {}
                    }
                }
                Err(err) => {
                    warn!(error = %err, "partition health worker step failed");
                    let _ = self.schedule_next_stale();
                }
            }
        }
        self.abandon_in_flight();
        info!("partition health worker shutting down");
    }
}
