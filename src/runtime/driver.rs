//! Host-side periodic drain trigger.

use std::time::Duration;

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::debug;

use super::handle::{DrainOutcome, MutationQueue, QueueError};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Calls [`MutationQueue::process`] every `every` until the queue shuts down.
///
/// Pass [`MutationQueue::process_interval`] to follow the configured hint.
/// Periods below one millisecond are raised to one millisecond.
pub fn spawn_interval_driver(queue: MutationQueue, every: Duration) -> JoinHandle<()> {
    let every = every.max(MIN_PERIOD);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match queue.process().await {
                Ok(DrainOutcome::Completed(report)) => {
                    debug!(
                        succeeded = report.succeeded.len(),
                        remaining = report.remaining,
                        "interval drain finished"
                    );
                }
                Ok(DrainOutcome::Skipped(_)) => {}
                Err(QueueError::Closed) => break,
                Err(err) => debug!(error = %err, "interval drain errored"),
            }
        }
    })
}
