//! Per-battery health detection
//!
//! One [`BatteryStatusTracker`] task watches exactly one battery/inverter
//! pair. It records the arrival time of each side's telemetry and derives
//! an automatic Working/NotWorking status from recency alone: a battery is
//! Working only while both its own and its paired inverter's samples are
//! younger than the configured freshness window. Status changes are fanned
//! in to the owning [`crate::pool::BatteryPoolStatus`] aggregator.

use crate::component::ComponentId;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::telemetry::ComponentSample;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant, interval};

/// Automatically detected battery status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryStatus {
    /// Both sides of the pair reported recently enough for dispatch
    Working,
    /// Telemetry from the battery or its inverter is stale or missing
    NotWorking,
}

/// Status change notification sent to the owning aggregator
#[derive(Debug, Clone, Copy)]
pub struct StatusEvent {
    /// Battery whose automatic status changed
    pub battery_id: ComponentId,
    /// New automatic status
    pub status: BatteryStatus,
}

/// Health tracker for one battery/inverter pair
pub struct BatteryStatusTracker {
    battery_id: ComponentId,
    inverter_id: ComponentId,

    /// Telemetry stream, pre-filtered to this pair's two component ids
    samples_rx: mpsc::Receiver<ComponentSample>,

    /// Freshness window for both sides
    max_data_age: Duration,

    /// Arrival time of the newest battery-side sample ("never" until one arrives)
    last_battery_sample: Option<Instant>,

    /// Arrival time of the newest inverter-side sample
    last_inverter_sample: Option<Instant>,

    status: BatteryStatus,

    events_tx: mpsc::UnboundedSender<StatusEvent>,
    shutdown_rx: watch::Receiver<bool>,
    logger: StructuredLogger,
}

impl BatteryStatusTracker {
    /// Create a tracker for one pair
    pub fn new(
        battery_id: ComponentId,
        inverter_id: ComponentId,
        samples_rx: mpsc::Receiver<ComponentSample>,
        max_data_age: Duration,
        events_tx: mpsc::UnboundedSender<StatusEvent>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("tracker")
                .with_battery_id(battery_id.get())
                .with_field("inverter_id", inverter_id.to_string()),
        );

        Self {
            battery_id,
            inverter_id,
            samples_rx,
            max_data_age,
            last_battery_sample: None,
            last_inverter_sample: None,
            status: BatteryStatus::NotWorking,
            events_tx,
            shutdown_rx,
            logger,
        }
    }

    /// Run the tracker loop until shutdown or telemetry loss
    pub async fn run(mut self) {
        self.logger.debug("Battery status tracker started");

        // Freshness is re-evaluated at least once per window even when no
        // samples arrive, so telemetry silence flips the status in time.
        let mut freshness_tick = interval(self.max_data_age);

        loop {
            tokio::select! {
                maybe_sample = self.samples_rx.recv() => {
                    match maybe_sample {
                        Some(sample) => {
                            self.record_sample(&sample);
                            self.refresh_status();
                        }
                        None => {
                            // Last reported status stays frozen in the aggregator
                            self.logger.error(
                                "Telemetry stream ended unexpectedly, tracker degraded",
                            );
                            break;
                        }
                    }
                }
                _ = freshness_tick.tick() => {
                    self.refresh_status();
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.logger.debug("Battery status tracker stopped");
    }

    /// Record a sample's arrival time against the matching side only
    fn record_sample(&mut self, sample: &ComponentSample) {
        let now = Instant::now();
        if sample.component_id == self.battery_id {
            self.last_battery_sample = Some(now);
        } else if sample.component_id == self.inverter_id {
            self.last_inverter_sample = Some(now);
        } else {
            self.logger.debug(&format!(
                "Ignoring sample for unrelated component {}",
                sample.component_id
            ));
        }
    }

    /// Recompute automatic status from recency; emit an event on change
    fn refresh_status(&mut self) {
        let now = Instant::now();
        let fresh = self.side_is_fresh(self.last_battery_sample, now)
            && self.side_is_fresh(self.last_inverter_sample, now);
        let new_status = if fresh {
            BatteryStatus::Working
        } else {
            BatteryStatus::NotWorking
        };

        if new_status == self.status {
            return;
        }
        self.status = new_status;
        self.logger.info(&format!(
            "Battery {} automatic status changed to {:?}",
            self.battery_id, new_status
        ));
        if self
            .events_tx
            .send(StatusEvent {
                battery_id: self.battery_id,
                status: new_status,
            })
            .is_err()
        {
            self.logger.debug("Aggregator is gone, dropping status event");
        }
    }

    fn side_is_fresh(&self, last_sample: Option<Instant>, now: Instant) -> bool {
        last_sample.is_some_and(|at| now.duration_since(at) <= self.max_data_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_tracker(
        max_data_age: Duration,
    ) -> (
        mpsc::Sender<ComponentSample>,
        mpsc::UnboundedReceiver<StatusEvent>,
        watch::Sender<bool>,
        tokio::task::JoinHandle<()>,
    ) {
        let (samples_tx, samples_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tracker = BatteryStatusTracker::new(
            ComponentId::new(106),
            ComponentId::new(105),
            samples_rx,
            max_data_age,
            events_tx,
            shutdown_rx,
        );
        let handle = tokio::spawn(tracker.run());
        (samples_tx, events_rx, shutdown_tx, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn one_sided_sample_never_flips_to_working() {
        let (samples_tx, mut events_rx, shutdown_tx, handle) =
            spawn_tracker(Duration::from_secs(5));

        samples_tx
            .send(ComponentSample::now(106u64))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(events_rx.try_recv().is_err());

        samples_tx
            .send(ComponentSample::now(105u64))
            .await
            .unwrap();
        let event = events_rx.recv().await.unwrap();
        assert_eq!(event.battery_id, ComponentId::new(106));
        assert_eq!(event.status, BatteryStatus::Working);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn telemetry_silence_flips_back_to_not_working() {
        let (samples_tx, mut events_rx, shutdown_tx, handle) =
            spawn_tracker(Duration::from_secs(5));

        samples_tx
            .send(ComponentSample::now(106u64))
            .await
            .unwrap();
        samples_tx
            .send(ComponentSample::now(105u64))
            .await
            .unwrap();
        let event = events_rx.recv().await.unwrap();
        assert_eq!(event.status, BatteryStatus::Working);

        // No further samples: the freshness tick must notice the staleness
        let event = events_rx.recv().await.unwrap();
        assert_eq!(event.status, BatteryStatus::NotWorking);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_samples_are_ignored() {
        let (samples_tx, mut events_rx, shutdown_tx, handle) =
            spawn_tracker(Duration::from_secs(5));

        samples_tx
            .send(ComponentSample::now(999u64))
            .await
            .unwrap();
        samples_tx
            .send(ComponentSample::now(998u64))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(events_rx.try_recv().is_err());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stream_loss_freezes_without_emitting() {
        let (samples_tx, mut events_rx, _shutdown_tx, handle) =
            spawn_tracker(Duration::from_secs(5));

        samples_tx
            .send(ComponentSample::now(106u64))
            .await
            .unwrap();
        samples_tx
            .send(ComponentSample::now(105u64))
            .await
            .unwrap();
        let event = events_rx.recv().await.unwrap();
        assert_eq!(event.status, BatteryStatus::Working);

        drop(samples_tx);
        handle.await.unwrap();
        assert!(events_rx.try_recv().is_err());
    }
}
