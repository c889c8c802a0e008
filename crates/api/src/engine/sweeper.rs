//! Periodic release of status channels whose submitter went away.
//!
//! A submitter that closes the status stream drops its receiver. The next
//! status event for that job releases the channel, but a job that is never
//! reported would hold it forever; this loop catches those.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::Dispatcher;

/// Lower bound for the sweep interval.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Spawn the sweeper. Runs until `cancel` is triggered.
pub fn start_channel_sweeper(
    dispatcher: Arc<Dispatcher>,
    every: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let every = every.max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        tracing::info!(interval_secs = every.as_secs(), "Channel sweeper started");
        let mut interval = tokio::time::interval(every);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Channel sweeper stopping");
                    break;
                }
                _ = interval.tick() => {
                    let reaped = dispatcher.reap_closed_channels().await;
                    if reaped > 0 {
                        tracing::info!(reaped, "Channel sweeper: released closed channels");
                    } else {
                        tracing::debug!("Channel sweeper: nothing to release");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use testu_core::agents::AgentRoster;
    use testu_core::job::JobRequest;
    use testu_store::FsReportStore;

    #[tokio::test]
    async fn sweeper_releases_abandoned_stream_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsReportStore::new(dir.path()));
        let dispatcher = Arc::new(Dispatcher::new(
            AgentRoster::default(),
            "http://localhost:3008/testu",
            store,
        ));

        let submission = dispatcher
            .submit(JobRequest::new("http://example.com", "home"))
            .await
            .unwrap();
        let receiver = dispatcher.open_stream(submission.job_id).await.unwrap();
        drop(receiver);
        assert_eq!(dispatcher.stats().await.open_channels, 1);

        let cancel = CancellationToken::new();
        let handle = start_channel_sweeper(
            Arc::clone(&dispatcher),
            Duration::from_millis(10),
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.stats().await.open_channels, 0);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
