use super::{EventSender, PresenceWatcher, TaskHandle, WatchEvent, WatchSource};
use crate::probe::{HostProbe, host_of_url};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Online/offline bookkeeping. Events fire only when a URL flips state, or
/// on its first observation.
#[derive(Debug, Default)]
pub struct RemoteTracker {
    online: BTreeSet<String>,
    offline: BTreeSet<String>,
}

impl RemoteTracker {
    pub fn observe(&mut self, url: &str, up: bool) -> Option<WatchEvent> {
        if up {
            self.offline.remove(url);
            self.online
                .insert(url.to_string())
                .then(|| WatchEvent::added(WatchSource::Remote, url))
        } else {
            self.online.remove(url);
            self.offline
                .insert(url.to_string())
                .then(|| WatchEvent::removed(WatchSource::Remote, url))
        }
    }

    /// Forget URLs that are no longer monitored.
    pub fn retain(&mut self, urls: &[String]) {
        self.online.retain(|u| urls.contains(u));
        self.offline.retain(|u| urls.contains(u));
    }

    pub fn is_online(&self, url: &str) -> bool {
        self.online.contains(url)
    }
}

/// Pings the hosts of monitored URLs on a fixed tick.
pub struct RemoteWatcher {
    hosts: Arc<dyn HostProbe>,
    urls: watch::Receiver<Vec<String>>,
    interval: Duration,
    ping_timeout: Duration,
    events: EventSender,
    handle: TaskHandle,
}

impl RemoteWatcher {
    pub fn new(
        hosts: Arc<dyn HostProbe>,
        urls: watch::Receiver<Vec<String>>,
        interval: Duration,
        ping_timeout: Duration,
        events: EventSender,
    ) -> Self {
        Self {
            hosts,
            urls,
            interval,
            ping_timeout,
            events,
            handle: TaskHandle::default(),
        }
    }
}

#[async_trait]
impl PresenceWatcher for RemoteWatcher {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn start(&mut self) {
        let hosts = Arc::clone(&self.hosts);
        let urls = self.urls.clone();
        let (interval, ping_timeout) = (self.interval, self.ping_timeout);
        let events = self.events.clone();
        self.handle
            .spawn(move |cancel| run(hosts, urls, interval, ping_timeout, events, cancel));
    }

    async fn stop(&mut self) {
        self.handle.stop(self.name()).await;
    }

    fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}

async fn tick(
    hosts: &dyn HostProbe,
    urls: &[String],
    ping_timeout: Duration,
    tracker: &mut RemoteTracker,
    events: &EventSender,
) -> bool {
    tracker.retain(urls);
    let pings = urls.iter().filter_map(|url| match host_of_url(url) {
        Some(host) => Some(async move { (url, hosts.ping(&host, ping_timeout).await) }),
        None => {
            warn!("Cannot determine host of {}", url);
            None
        }
    });
    // Hosts are pinged together; events still go out in list order.
    for (url, up) in join_all(pings).await {
        if let Some(event) = tracker.observe(url, up) {
            debug!("Remote event: {:?} {}", event.kind, url);
            if events.send(event).is_err() {
                return false;
            }
        }
    }
    true
}

async fn run(
    hosts: Arc<dyn HostProbe>,
    mut urls: watch::Receiver<Vec<String>>,
    interval: Duration,
    ping_timeout: Duration,
    events: EventSender,
    cancel: CancellationToken,
) {
    info!("Watching remote hosts every {:?}", interval);
    let mut tracker = RemoteTracker::default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            changed = urls.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        let current = urls.borrow_and_update().clone();
        if !tick(hosts.as_ref(), &current, ping_timeout, &mut tracker, &events).await {
            break;
        }
    }
    debug!("Remote watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MockHostProbe;
    use crate::watcher::{WatchKind, event_channel};

    #[test]
    fn test_fires_only_on_flip() {
        let mut tracker = RemoteTracker::default();
        let url = "//192.168.1.10/media";

        assert_eq!(
            tracker.observe(url, true),
            Some(WatchEvent::added(WatchSource::Remote, url))
        );
        assert_eq!(tracker.observe(url, true), None);
        assert_eq!(
            tracker.observe(url, false),
            Some(WatchEvent::removed(WatchSource::Remote, url))
        );
        assert_eq!(tracker.observe(url, false), None);
        assert!(!tracker.is_online(url));
    }

    #[test]
    fn test_retain_drops_unmonitored() {
        let mut tracker = RemoteTracker::default();
        tracker.observe("//a/x", true);
        tracker.observe("//b/y", false);
        tracker.retain(&["//b/y".to_string()]);
        assert!(!tracker.is_online("//a/x"));

        // Re-monitoring reports the state afresh
        assert!(tracker.observe("//a/x", true).is_some());
        assert!(tracker.observe("//b/y", false).is_none());
    }

    #[tokio::test]
    async fn test_watcher_follows_list_updates() {
        let hosts = MockHostProbe::new();
        hosts.set_up("192.168.1.10", true);
        let (list_tx, list_rx) = watch::channel(Vec::new());
        let (tx, mut rx) = event_channel();
        let mut watcher = RemoteWatcher::new(
            Arc::new(hosts.clone()),
            list_rx,
            Duration::from_millis(20),
            Duration::from_secs(1),
            tx,
        );
        watcher.start();

        list_tx.send_replace(vec!["//192.168.1.10/media".to_string()]);
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, WatchKind::Added);
        assert_eq!(event.key, "//192.168.1.10/media");

        hosts.set_up("192.168.1.10", false);
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, WatchKind::Removed);

        watcher.stop().await;
        assert!(!watcher.is_active());
    }
}
