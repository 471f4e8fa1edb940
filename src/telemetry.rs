//! Telemetry arrival signals and the inbound subscription seam
//!
//! Transport and decoding of real telemetry live outside this crate. What
//! the status layer needs is only a stream of timestamped arrival signals
//! per component, which [`TelemetrySource`] abstracts. [`TelemetryFeed`]
//! is the in-process implementation used to bridge whatever transport the
//! host application runs into per-tracker streams.

use crate::component::ComponentId;
use crate::error::{GalvaniError, Result};
use crate::logging::get_logger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// Capacity of the per-subscription hand-off channel
const SUBSCRIPTION_BUFFER: usize = 64;

/// A single telemetry arrival signal for one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSample {
    /// Component the sample belongs to
    pub component_id: ComponentId,

    /// Wall-clock timestamp reported by the source
    pub timestamp: DateTime<Utc>,
}

impl ComponentSample {
    /// Create a sample stamped with the current wall-clock time
    pub fn now(component_id: impl Into<ComponentId>) -> Self {
        Self {
            component_id: component_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Subscription seam for telemetry arrival signals
///
/// Implementations return a stream pre-filtered to the requested
/// component ids so each consumer only sees its own components.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Subscribe to samples for the given component ids
    async fn subscribe(
        &self,
        component_ids: &[ComponentId],
    ) -> Result<mpsc::Receiver<ComponentSample>>;
}

/// In-process telemetry hub backed by a broadcast channel
///
/// The host application publishes every decoded sample here; each
/// subscription gets its own relay task that filters the firehose down to
/// the requested ids. Slow subscribers lag and drop samples rather than
/// exerting backpressure on the publisher.
#[derive(Debug, Clone)]
pub struct TelemetryFeed {
    tx: broadcast::Sender<ComponentSample>,
}

impl TelemetryFeed {
    /// Create a feed able to buffer `capacity` in-flight samples per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish one sample to every current subscriber; never blocks
    pub fn publish(&self, sample: ComponentSample) {
        // No subscribers is fine; the sample is simply dropped
        let _ = self.tx.send(sample);
    }
}

impl Default for TelemetryFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl TelemetrySource for TelemetryFeed {
    async fn subscribe(
        &self,
        component_ids: &[ComponentId],
    ) -> Result<mpsc::Receiver<ComponentSample>> {
        if component_ids.is_empty() {
            return Err(GalvaniError::telemetry(
                "Subscription needs at least one component id",
            ));
        }

        let ids: Vec<ComponentId> = component_ids.to_vec();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let mut stream = BroadcastStream::new(self.tx.subscribe());
        let logger = get_logger("telemetry");

        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(sample) => {
                        if !ids.contains(&sample.component_id) {
                            continue;
                        }
                        if tx.send(sample).await.is_err() {
                            // Subscriber went away; stop relaying
                            break;
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        logger.warn(&format!(
                            "Telemetry subscriber lagging, dropped {} samples",
                            missed
                        ));
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscription_only_sees_requested_ids() {
        let feed = TelemetryFeed::new(16);
        let mut rx = feed
            .subscribe(&[ComponentId::new(106), ComponentId::new(105)])
            .await
            .unwrap();

        feed.publish(ComponentSample::now(206u64));
        feed.publish(ComponentSample::now(106u64));
        feed.publish(ComponentSample::now(305u64));
        feed.publish(ComponentSample::now(105u64));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.component_id, ComponentId::new(106));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.component_id, ComponentId::new(105));
    }

    #[tokio::test]
    async fn empty_subscription_is_rejected() {
        let feed = TelemetryFeed::new(16);
        assert!(feed.subscribe(&[]).await.is_err());
    }

    #[tokio::test]
    async fn stream_ends_when_feed_is_dropped() {
        let feed = TelemetryFeed::new(16);
        let mut rx = feed.subscribe(&[ComponentId::new(106)]).await.unwrap();
        drop(feed);
        assert!(rx.recv().await.is_none());
    }
}
