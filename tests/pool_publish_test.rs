use galvani::config::PoolConfig;
use galvani::{
    BatteryPoolStatus, ComponentId, ComponentSample, PoolSnapshot, StaticTopology, TelemetryFeed,
};
use std::collections::BTreeSet;
use tokio::sync::watch;
use tokio::time::Duration;

fn ids(raw: &[u64]) -> BTreeSet<ComponentId> {
    raw.iter().copied().map(ComponentId::new).collect()
}

async fn spawn_pool(
    batteries: &[u64],
) -> (TelemetryFeed, BatteryPoolStatus, watch::Receiver<PoolSnapshot>) {
    let feed = TelemetryFeed::new(64);
    let mut topology = StaticTopology::new();
    for &battery in batteries {
        topology = topology.with_pair(battery, battery + 100);
    }
    let (snapshot_tx, snapshot_rx) = watch::channel(PoolSnapshot::empty());
    let pool = BatteryPoolStatus::spawn(
        ids(batteries),
        &topology,
        &feed,
        snapshot_tx,
        &PoolConfig::default(),
    )
    .await
    .unwrap();
    (feed, pool, snapshot_rx)
}

fn feed_pair(feed: &TelemetryFeed, battery: u64) {
    feed.publish(ComponentSample::now(battery));
    feed.publish(ComponentSample::now(battery + 100));
}

#[tokio::test(start_paused = true)]
async fn unchanged_working_set_is_not_republished() {
    let (feed, pool, mut snapshot_rx) = spawn_pool(&[1]).await;

    feed_pair(&feed, 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(snapshot_rx.borrow_and_update().working, ids(&[1]));

    // More telemetry with no status change must not publish again
    feed_pair(&feed, 1);
    feed_pair(&feed, 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!snapshot_rx.has_changed().unwrap());

    // Same for an assertion that does not change the effective set
    pool.update_status(ids(&[1]), ids(&[])).await;
    assert!(!snapshot_rx.has_changed().unwrap());

    pool.stop().await;
}

#[tokio::test(start_paused = true)]
async fn never_seen_battery_stays_excluded() {
    let (feed, pool, mut snapshot_rx) = spawn_pool(&[1, 2]).await;
    let batteries = ids(&[1, 2]);

    feed_pair(&feed, 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pool.get_working_batteries(&batteries), ids(&[1]));
    assert!(
        !snapshot_rx
            .borrow_and_update()
            .working
            .contains(&ComponentId::new(2))
    );

    // Much later, with battery 1 gone stale too, 2 is still excluded
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(pool.get_working_batteries(&batteries), ids(&[]));

    pool.stop().await;
}

#[tokio::test(start_paused = true)]
async fn slow_consumer_observes_only_the_latest_snapshot() {
    let (feed, pool, mut snapshot_rx) = spawn_pool(&[1, 2]).await;

    feed_pair(&feed, 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    feed_pair(&feed, 2);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Two publishes happened; an unread consumer only ever sees the newest
    assert!(snapshot_rx.has_changed().unwrap());
    assert_eq!(snapshot_rx.borrow_and_update().working, ids(&[1, 2]));
    assert!(!snapshot_rx.has_changed().unwrap());

    pool.stop().await;
}
