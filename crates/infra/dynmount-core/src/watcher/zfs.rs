use super::{EventSender, PresenceWatcher, TaskHandle, WatchEvent, WatchSource};
use crate::error::Result;
use crate::probe::ZfsProbe;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Synthetic health of an imported pool whose datasets are not mounted.
pub const UNMOUNTED: &str = "UNMOUNTED";

/// Health reported for a pool that is not imported at all.
const NOT_IMPORTED: &str = "UNAVAIL";

/// Last-seen health per pool.
#[derive(Debug)]
pub struct PoolTracker {
    last: BTreeMap<String, String>,
    degraded_available: bool,
}

impl PoolTracker {
    pub fn new(degraded_available: bool) -> Self {
        Self {
            last: BTreeMap::new(),
            degraded_available,
        }
    }

    /// Fold raw pool health and mount state into one health string.
    pub fn compute(raw: Option<&str>, mounted: bool) -> String {
        match raw {
            None => NOT_IMPORTED.to_string(),
            Some(h @ ("ONLINE" | "DEGRADED")) if !mounted => {
                debug!("Pool is {} but not mounted", h);
                UNMOUNTED.to_string()
            }
            Some(h) => h.to_string(),
        }
    }

    pub fn is_available(&self, health: &str) -> bool {
        health == "ONLINE" || (self.degraded_available && health == "DEGRADED")
    }

    /// Event for a change in computed health, including the first observation.
    pub fn observe(&mut self, pool: &str, health: String) -> Option<WatchEvent> {
        if self.last.get(pool) == Some(&health) {
            return None;
        }
        let event = if self.is_available(&health) {
            WatchEvent::added(WatchSource::Pool, pool)
        } else {
            WatchEvent::removed(WatchSource::Pool, pool)
        }
        .with_payload(health.clone());
        self.last.insert(pool.to_string(), health);
        Some(event)
    }

    pub fn retain(&mut self, pools: &[String]) {
        self.last.retain(|p, _| pools.contains(p));
    }
}

/// Polls pool health of monitored pools.
pub struct ZfsWatcher {
    zfs: Arc<dyn ZfsProbe>,
    pools: watch::Receiver<Vec<String>>,
    interval: Duration,
    degraded_available: bool,
    events: EventSender,
    handle: TaskHandle,
}

impl ZfsWatcher {
    pub fn new(
        zfs: Arc<dyn ZfsProbe>,
        pools: watch::Receiver<Vec<String>>,
        interval: Duration,
        degraded_available: bool,
        events: EventSender,
    ) -> Self {
        Self {
            zfs,
            pools,
            interval,
            degraded_available,
            events,
            handle: TaskHandle::default(),
        }
    }
}

#[async_trait]
impl PresenceWatcher for ZfsWatcher {
    fn name(&self) -> &'static str {
        "zfs"
    }

    fn start(&mut self) {
        let zfs = Arc::clone(&self.zfs);
        let pools = self.pools.clone();
        let interval = self.interval;
        let tracker = PoolTracker::new(self.degraded_available);
        let events = self.events.clone();
        self.handle
            .spawn(move |cancel| run(zfs, pools, interval, tracker, events, cancel));
    }

    async fn stop(&mut self) {
        self.handle.stop(self.name()).await;
    }

    fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}

/// One sweep. `Ok(false)` when the dispatcher has gone away.
async fn tick(
    zfs: &dyn ZfsProbe,
    pools: &[String],
    tracker: &mut PoolTracker,
    events: &EventSender,
) -> Result<bool> {
    tracker.retain(pools);
    for pool in pools {
        let raw = zfs.pool_health(pool).await?;
        let mounted = match raw.as_deref() {
            Some("ONLINE" | "DEGRADED") => zfs.is_mounted(pool).await?,
            _ => false,
        };
        let health = PoolTracker::compute(raw.as_deref(), mounted);
        if let Some(event) = tracker.observe(pool, health) {
            debug!("Pool event: {:?} {} {:?}", event.kind, pool, event.payload);
            if events.send(event).is_err() {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

async fn run(
    zfs: Arc<dyn ZfsProbe>,
    mut pools: watch::Receiver<Vec<String>>,
    interval: Duration,
    mut tracker: PoolTracker,
    events: EventSender,
    cancel: CancellationToken,
) {
    info!("Watching ZFS pools every {:?}", interval);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            changed = pools.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        let current = pools.borrow_and_update().clone();
        match tick(zfs.as_ref(), &current, &mut tracker, &events).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                error!("ZFS watcher stopped: {}", e);
                return;
            }
        }
    }
    debug!("ZFS watcher stopped");
}
