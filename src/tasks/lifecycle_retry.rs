use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::fanout::LifecycleWrite;
use crate::metrics::LifecycleMetrics;
use crate::redis::{BackoffConfig, ExponentialBackoff};
use crate::registry::ConnectionRegistry;

/// Create the bounded queue that feeds [`LifecycleRetryTask`]
pub fn lifecycle_retry_queue(
    size: usize,
) -> (mpsc::Sender<LifecycleWrite>, mpsc::Receiver<LifecycleWrite>) {
    mpsc::channel(size.max(1))
}

/// Re-applies connect/disconnect registry writes that failed inline.
///
/// Writes are retried one at a time in arrival order. Only writes that
/// failed inline are queued, so a queued connect can still land after a
/// disconnect that succeeded inline; the next broadcast pass evicts that id
/// once the transport reports it gone.
pub struct LifecycleRetryTask {
    registry: Arc<dyn ConnectionRegistry>,
    receiver: mpsc::Receiver<LifecycleWrite>,
    backoff: BackoffConfig,
    max_attempts: u32,
    shutdown: broadcast::Receiver<()>,
}

impl LifecycleRetryTask {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        receiver: mpsc::Receiver<LifecycleWrite>,
        backoff: BackoffConfig,
        max_attempts: u32,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            registry,
            receiver,
            backoff,
            max_attempts,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(max_attempts = self.max_attempts, "Lifecycle retry task started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Lifecycle retry task received shutdown signal");
                    break;
                }
                write = self.receiver.recv() => {
                    let Some(write) = write else { break };
                    if !self.retry(write).await {
                        break;
                    }
                }
            }
        }

        let abandoned = self.receiver.len();
        if abandoned > 0 {
            tracing::warn!(abandoned, "Lifecycle writes left unretried at shutdown");
        }
        tracing::info!("Lifecycle retry task stopped");
    }

    /// Retry one write. Returns false if shutdown interrupted it.
    async fn retry(&mut self, write: LifecycleWrite) -> bool {
        let mut backoff = ExponentialBackoff::with_config(self.backoff.clone());

        for attempt in 1..=self.max_attempts {
            let delay = backoff.next_delay();
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!(
                        connection_id = %write.connection_id(),
                        event = write.event(),
                        "Shutdown during lifecycle retry"
                    );
                    return false;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match write.apply(self.registry.as_ref()).await {
                Ok(()) => {
                    tracing::info!(
                        connection_id = %write.connection_id(),
                        event = write.event(),
                        attempt,
                        "Lifecycle write applied on retry"
                    );
                    LifecycleMetrics::record_retry(write.event(), "succeeded");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = %write.connection_id(),
                        event = write.event(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Lifecycle retry failed"
                    );
                    LifecycleMetrics::record_retry(write.event(), "failed");
                }
            }
        }

        tracing::error!(
            connection_id = %write.connection_id(),
            event = write.event(),
            attempts = self.max_attempts,
            "Giving up on lifecycle write"
        );
        LifecycleMetrics::record_retry(write.event(), "exhausted");
        true
    }
}
