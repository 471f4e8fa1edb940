//! Pool-level battery status supervision
//!
//! [`BatteryPoolStatus`] spawns one [`BatteryStatusTracker`] per managed
//! battery and merges their automatic statuses with externally asserted
//! dispatch outcomes. A single aggregator task owns the health and
//! override tables, so no locks guard them: tracker events and
//! `update_status` hand-offs are serialized through its loop. Queries read
//! an atomically swapped snapshot and never wait on that loop.

use crate::component::{ComponentId, ComponentTopology};
use crate::config::PoolConfig;
use crate::error::{GalvaniError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::telemetry::TelemetrySource;
use crate::tracker::{BatteryStatus, BatteryStatusTracker, StatusEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

/// Published pool-wide view: the batteries currently usable for dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// When this view was computed
    pub timestamp: DateTime<Utc>,

    /// Battery ids whose effective status allows dispatch
    pub working: BTreeSet<ComponentId>,
}

impl PoolSnapshot {
    /// Empty snapshot, the state before any tracker has reported
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            working: BTreeSet::new(),
        }
    }
}

/// Externally asserted dispatch outcome for one battery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverrideStatus {
    Succeeded,
    Failed,
}

/// Time-bounded manual assertion, authoritative until it expires
#[derive(Debug, Clone, Copy)]
struct OverrideEntry {
    status: OverrideStatus,
    asserted_at: Instant,
    expires_at: Instant,
}

/// Control-plane request handed into the aggregator task
enum PoolRequest {
    UpdateStatus {
        succeed: BTreeSet<ComponentId>,
        failed: BTreeSet<ComponentId>,
        ack: oneshot::Sender<()>,
    },
}

/// Supervises per-battery trackers and publishes the pool's working set
pub struct BatteryPoolStatus {
    requests_tx: mpsc::UnboundedSender<PoolRequest>,
    working_rx: watch::Receiver<Arc<BTreeSet<ComponentId>>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Option<Vec<JoinHandle<()>>>>,
    logger: StructuredLogger,
}

impl BatteryPoolStatus {
    /// Spawn trackers and the aggregator for the given batteries
    ///
    /// Fails if the pool durations are invalid or a battery has no paired
    /// inverter in the topology. The working set starts empty; snapshots
    /// go out on `snapshot_tx` only when the set actually changes.
    pub async fn spawn(
        battery_ids: BTreeSet<ComponentId>,
        topology: &dyn ComponentTopology,
        source: &dyn TelemetrySource,
        snapshot_tx: watch::Sender<PoolSnapshot>,
        config: &PoolConfig,
    ) -> Result<Self> {
        if !(config.max_data_age_sec.is_finite() && config.max_data_age_sec > 0.0) {
            return Err(GalvaniError::validation(
                "max_data_age_sec",
                "Must be positive",
            ));
        }
        if !(config.max_blocking_duration_sec.is_finite()
            && config.max_blocking_duration_sec > 0.0)
        {
            return Err(GalvaniError::validation(
                "max_blocking_duration_sec",
                "Must be positive",
            ));
        }
        let max_data_age = Duration::from_secs_f64(config.max_data_age_sec);
        let max_blocking_duration = Duration::from_secs_f64(config.max_blocking_duration_sec);

        let logger = get_logger("pool");
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (working_tx, working_rx) =
            watch::channel::<Arc<BTreeSet<ComponentId>>>(Arc::new(BTreeSet::new()));

        let mut tasks = Vec::with_capacity(battery_ids.len() + 1);
        let mut health = BTreeMap::new();

        for battery_id in &battery_ids {
            let inverter_id = topology.paired_inverter(*battery_id).ok_or_else(|| {
                GalvaniError::validation(
                    "battery_ids".to_string(),
                    format!("Battery {} has no paired inverter", battery_id),
                )
            })?;

            let samples_rx = source.subscribe(&[*battery_id, inverter_id]).await?;
            let tracker = BatteryStatusTracker::new(
                *battery_id,
                inverter_id,
                samples_rx,
                max_data_age,
                events_tx.clone(),
                shutdown_rx.clone(),
            );
            tasks.push(tokio::spawn(tracker.run()));
            health.insert(*battery_id, BatteryStatus::NotWorking);
        }

        logger.info(&format!(
            "Supervising {} batteries (max_data_age={:?}, max_blocking_duration={:?})",
            battery_ids.len(),
            max_data_age,
            max_blocking_duration
        ));

        let aggregator = Aggregator {
            health,
            overrides: BTreeMap::new(),
            automatic_suspended_until: None,
            max_blocking_duration,
            suppress_unlisted: config.suppress_unlisted_on_override,
            events_rx,
            _events_tx: events_tx,
            requests_rx,
            last_published: BTreeSet::new(),
            snapshot_tx,
            working_tx,
            logger: get_logger("pool"),
        };
        tasks.push(tokio::spawn(aggregator.run(shutdown_rx)));

        Ok(Self {
            requests_tx,
            working_rx,
            shutdown_tx,
            tasks: Mutex::new(Some(tasks)),
            logger,
        })
    }

    /// Subset of `candidates` currently usable for dispatch
    ///
    /// Non-blocking: reads the snapshot of the most recent recompute and
    /// never waits on the aggregator. After [`Self::stop`] it keeps
    /// returning the frozen last state.
    pub fn get_working_batteries(
        &self,
        candidates: &BTreeSet<ComponentId>,
    ) -> BTreeSet<ComponentId> {
        self.working_rx
            .borrow()
            .intersection(candidates)
            .copied()
            .collect()
    }

    /// Record the outcome of an attempted dispatch
    ///
    /// Batteries in `succeed` are trusted, batteries in `failed` are
    /// blocked, both for the configured blocking duration and regardless
    /// of what their trackers report. Ids without a tracker are accepted
    /// as override-only entries. Returns once the resulting recompute is
    /// visible to queries; after [`Self::stop`] the call is a no-op.
    pub async fn update_status(
        &self,
        succeed_batteries: BTreeSet<ComponentId>,
        failed_batteries: BTreeSet<ComponentId>,
    ) {
        let (ack_tx, ack_rx) = oneshot::channel();
        let request = PoolRequest::UpdateStatus {
            succeed: succeed_batteries,
            failed: failed_batteries,
            ack: ack_tx,
        };
        if self.requests_tx.send(request).is_err() {
            self.logger
                .debug("Status update after stop, ignoring");
            return;
        }
        if ack_rx.await.is_err() {
            self.logger
                .debug("Aggregator stopped before acknowledging status update");
        }
    }

    /// Stop all trackers and the aggregator
    ///
    /// Idempotent and safe under concurrent calls. After return, no
    /// further snapshot is published and queries return the frozen state.
    pub async fn stop(&self) {
        let mut guard = self.tasks.lock().await;
        let Some(tasks) = guard.take() else {
            return;
        };

        let _ = self.shutdown_tx.send(true);
        for task in tasks {
            if let Err(e) = task.await {
                self.logger
                    .warn(&format!("Status task terminated abnormally: {}", e));
            }
        }
        self.logger.info("Battery pool status supervision stopped");
    }
}

/// Single-owner merge loop: sole writer of the health/override tables
struct Aggregator {
    /// Latest automatic status reported per managed battery
    health: BTreeMap<ComponentId, BatteryStatus>,

    /// Unexpired manual assertions, pruned lazily during recompute
    overrides: BTreeMap<ComponentId, OverrideEntry>,

    /// While set, automatic statuses of non-overridden batteries are not
    /// trusted (unlisted-suppression policy)
    automatic_suspended_until: Option<Instant>,

    max_blocking_duration: Duration,
    suppress_unlisted: bool,

    events_rx: mpsc::UnboundedReceiver<StatusEvent>,
    /// Keeps the fan-in open even if every tracker has exited
    _events_tx: mpsc::UnboundedSender<StatusEvent>,
    requests_rx: mpsc::UnboundedReceiver<PoolRequest>,

    last_published: BTreeSet<ComponentId>,
    snapshot_tx: watch::Sender<PoolSnapshot>,
    working_tx: watch::Sender<Arc<BTreeSet<ComponentId>>>,
    logger: StructuredLogger,
}

impl Aggregator {
    async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        self.logger.debug("Pool aggregator started");

        loop {
            tokio::select! {
                Some(event) = self.events_rx.recv() => {
                    self.handle_status_event(event);
                }
                Some(request) = self.requests_rx.recv() => {
                    self.handle_request(request);
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.logger.debug("Pool aggregator stopped");
    }

    fn handle_status_event(&mut self, event: StatusEvent) {
        self.health.insert(event.battery_id, event.status);
        self.recompute_and_publish();
    }

    fn handle_request(&mut self, request: PoolRequest) {
        match request {
            PoolRequest::UpdateStatus {
                succeed,
                failed,
                ack,
            } => {
                self.install_overrides(&succeed, &failed);
                self.recompute_and_publish();
                // Caller may have given up waiting; that's fine
                let _ = ack.send(());
            }
        }
    }

    /// Install/refresh override entries; `failed` is applied second so it
    /// wins when a caller names an id in both sets
    fn install_overrides(
        &mut self,
        succeed: &BTreeSet<ComponentId>,
        failed: &BTreeSet<ComponentId>,
    ) {
        let now = Instant::now();
        let expires_at = now + self.max_blocking_duration;

        for battery_id in succeed {
            self.overrides.insert(
                *battery_id,
                OverrideEntry {
                    status: OverrideStatus::Succeeded,
                    asserted_at: now,
                    expires_at,
                },
            );
        }
        for battery_id in failed {
            self.overrides.insert(
                *battery_id,
                OverrideEntry {
                    status: OverrideStatus::Failed,
                    asserted_at: now,
                    expires_at,
                },
            );
        }

        // An empty report carries no outcome, so it suspends nothing; it
        // still triggers the recompute that prunes expired entries.
        if self.suppress_unlisted && !(succeed.is_empty() && failed.is_empty()) {
            self.automatic_suspended_until = Some(expires_at);
        }

        if !(succeed.is_empty() && failed.is_empty()) {
            self.logger.info(&format!(
                "Dispatch outcome recorded: {} succeeded, {} failed",
                succeed.len(),
                failed.len()
            ));
        }
    }

    /// Recompute the working set and publish it if it changed
    fn recompute_and_publish(&mut self) {
        let now = Instant::now();
        self.prune_expired(now);

        let working = self.compute_working(now);

        // Queries always see the most recent recompute, changed or not
        self.working_tx.send_replace(Arc::new(working.clone()));

        if working == self.last_published {
            return;
        }
        let snapshot = PoolSnapshot {
            timestamp: Utc::now(),
            working: working.clone(),
        };
        if let Ok(json) = serde_json::to_string(&snapshot) {
            self.logger.debug(&format!("Publishing pool snapshot: {}", json));
        }
        self.snapshot_tx.send_replace(snapshot);
        self.last_published = working;
    }

    /// Drop overrides and the suppression window once their expiry passed
    fn prune_expired(&mut self, now: Instant) {
        let logger = &self.logger;
        self.overrides.retain(|battery_id, entry| {
            let keep = entry.expires_at > now;
            if !keep {
                logger.debug(&format!(
                    "Override for battery {} expired ({:.1}s after assertion), reverting to automatic status",
                    battery_id,
                    now.duration_since(entry.asserted_at).as_secs_f64()
                ));
            }
            keep
        });

        if self
            .automatic_suspended_until
            .is_some_and(|until| until <= now)
        {
            self.automatic_suspended_until = None;
        }
    }

    /// Pure derivation of the working set from the current tables
    fn compute_working(&self, now: Instant) -> BTreeSet<ComponentId> {
        let suspended = self
            .automatic_suspended_until
            .is_some_and(|until| now < until);

        let mut working = BTreeSet::new();
        for (battery_id, entry) in &self.overrides {
            if entry.status == OverrideStatus::Succeeded {
                working.insert(*battery_id);
            }
        }
        for (battery_id, status) in &self.health {
            if self.overrides.contains_key(battery_id) || suspended {
                continue;
            }
            if *status == BatteryStatus::Working {
                working.insert(*battery_id);
            }
        }
        working
    }
}
