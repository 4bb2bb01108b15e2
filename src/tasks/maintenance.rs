//! Cache Maintenance Task
//!
//! Background task that periodically flushes buffered access records into
//! the admission policy and removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::CacheInner;

/// Spawns the maintenance loop for `cache`.
///
/// The loop wakes every `period`, runs one maintenance cycle and exits once
/// `shutdown` is cancelled. A cycle in progress always completes, so the
/// returned handle can be awaited to join the task.
pub(crate) fn spawn_maintenance_task<V>(
    cache: Arc<CacheInner<V>>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    V: Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            "Starting cache maintenance task with interval of {} ms",
            period.as_millis()
        );

        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let report = cache.maintain();
            if report.flushed > 0 || report.expired > 0 {
                debug!(
                    flushed = report.flushed,
                    expired = report.expired,
                    "maintenance cycle complete"
                );
            }
        }

        info!("Cache maintenance task stopped");
    })
}
