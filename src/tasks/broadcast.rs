use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::fanout::{DeliveryReport, FanoutEngine};
use crate::source::PayloadSource;

/// Periodic trigger: fetch a payload and fan it out on every tick
pub struct BroadcastTask {
    engine: Arc<FanoutEngine>,
    source: Arc<dyn PayloadSource>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl BroadcastTask {
    pub fn new(
        engine: Arc<FanoutEngine>,
        source: Arc<dyn PayloadSource>,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            engine,
            source,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.interval);
        // A slow pass delays the next one instead of causing a burst
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            source = self.source.source_name(),
            "Broadcast task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Broadcast task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("Broadcast task stopped");
    }

    /// One trigger. Failures are logged; the next tick runs regardless.
    pub async fn tick(&self) -> Option<DeliveryReport> {
        let payload = match self.source.next_payload().await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    source = self.source.source_name(),
                    error = %e,
                    "Payload source failed, skipping tick"
                );
                return None;
            }
        };

        match self.engine.broadcast(&payload).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "Broadcast pass failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionId;
    use crate::delivery::{DeliveryChannel, DeliveryError};
    use crate::fanout::{FanoutOptions, Payload};
    use crate::registry::{ConnectionRegistry, MemoryConnectionRegistry};
    use crate::source::SourceError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource {
        fail: bool,
    }

    #[async_trait]
    impl PayloadSource for FixedSource {
        async fn next_payload(&self) -> Result<Payload, SourceError> {
            if self.fail {
                return Err(SourceError::Status(503));
            }
            Ok(Payload::json(&serde_json::json!({"type": "weather", "data": {}}))?)
        }

        fn source_name(&self) -> &'static str {
            "fixed"
        }
    }

    #[derive(Default)]
    struct CountingChannel {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl DeliveryChannel for CountingChannel {
        async fn send(
            &self,
            _id: &ConnectionId,
            _payload: &Payload,
            _deadline: tokio::time::Instant,
        ) -> Result<(), DeliveryError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn channel_name(&self) -> &'static str {
            "counting"
        }
    }

    async fn setup(fail: bool) -> (BroadcastTask, Arc<CountingChannel>, broadcast::Sender<()>) {
        let registry = Arc::new(MemoryConnectionRegistry::new());
        registry.upsert(&ConnectionId::from("c1")).await.unwrap();
        registry.upsert(&ConnectionId::from("c2")).await.unwrap();

        let channel = Arc::new(CountingChannel::default());
        let engine = Arc::new(FanoutEngine::new(
            registry,
            channel.clone(),
            FanoutOptions::default(),
        ));
        let (tx, rx) = broadcast::channel(1);
        let task = BroadcastTask::new(
            engine,
            Arc::new(FixedSource { fail }),
            Duration::from_secs(60),
            rx,
        );
        (task, channel, tx)
    }

    #[tokio::test]
    async fn test_tick_broadcasts() {
        let (task, channel, _tx) = setup(false).await;
        let report = task.tick().await.unwrap();
        assert_eq!(report.delivered_count, 2);
        assert_eq!(channel.sends.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_source_failure_skips_tick() {
        let (task, channel, _tx) = setup(true).await;
        assert!(task.tick().await.is_none());
        assert_eq!(channel.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_fires_immediately_and_stops_on_shutdown() {
        let (task, channel, tx) = setup(false).await;
        let handle = tokio::spawn(task.run());

        // The first interval tick completes immediately
        tokio::time::timeout(Duration::from_secs(2), async {
            while channel.sends.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
