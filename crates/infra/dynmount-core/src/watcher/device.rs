use super::{EventSender, PresenceWatcher, TaskHandle, WatchEvent, WatchSource};
use async_trait::async_trait;
use notify::{EventKind, RecursiveMode, Watcher};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Symlink → canonical device map. Removals report the canonical path that
/// was added, since a vanished symlink can no longer be resolved.
#[derive(Debug, Default)]
pub struct DeviceTracker {
    links: BTreeMap<PathBuf, PathBuf>,
}

impl DeviceTracker {
    /// Diff a fresh directory scan against the last one.
    pub fn apply(&mut self, scan: BTreeMap<PathBuf, PathBuf>) -> Vec<WatchEvent> {
        let mut events = Vec::new();

        for (link, device) in &self.links {
            match scan.get(link) {
                Some(now) if now == device => {}
                _ => events.push(WatchEvent::removed(
                    WatchSource::Device,
                    device.to_string_lossy(),
                )),
            }
        }
        for (link, device) in &scan {
            if self.links.get(link) != Some(device) {
                events.push(WatchEvent::added(WatchSource::Device, device.to_string_lossy()));
            }
        }

        self.links = scan;
        events
    }

    pub fn devices(&self) -> impl Iterator<Item = &Path> {
        self.links.values().map(PathBuf::as_path)
    }
}

/// Resolve every symlink in `dir`. Dangling links are skipped.
pub(crate) async fn scan(dir: &Path) -> std::io::Result<BTreeMap<PathBuf, PathBuf>> {
    let mut found = BTreeMap::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let link = entry.path();
        match tokio::fs::canonicalize(&link).await {
            Ok(device) => {
                found.insert(link, device);
            }
            Err(e) => debug!("Skipping unresolvable {}: {}", link.display(), e),
        }
    }
    Ok(found)
}

/// Follows a directory of stable device symlinks (`/dev/disk/by-uuid`).
pub struct DeviceWatcher {
    dir: PathBuf,
    events: EventSender,
    handle: TaskHandle,
}

impl DeviceWatcher {
    pub fn new(dir: impl Into<PathBuf>, events: EventSender) -> Self {
        Self {
            dir: dir.into(),
            events,
            handle: TaskHandle::default(),
        }
    }
}

#[async_trait]
impl PresenceWatcher for DeviceWatcher {
    fn name(&self) -> &'static str {
        "device"
    }

    fn start(&mut self) {
        let dir = self.dir.clone();
        let events = self.events.clone();
        self.handle.spawn(|cancel| run(dir, events, cancel));
    }

    async fn stop(&mut self) {
        self.handle.stop(self.name()).await;
    }

    fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}

async fn rescan(dir: &Path, tracker: &mut DeviceTracker, events: &EventSender) -> bool {
    match scan(dir).await {
        Ok(found) => {
            for event in tracker.apply(found) {
                debug!("Device event: {:?} {}", event.kind, event.key);
                if events.send(event).is_err() {
                    return false;
                }
            }
            true
        }
        Err(e) => {
            error!("Device watcher cannot scan {}: {}", dir.display(), e);
            false
        }
    }
}

async fn run(dir: PathBuf, events: EventSender, cancel: CancellationToken) {
    // notify delivers on its own thread; bridge into this task
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
    let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = raw_tx.send(res);
    }) {
        Ok(w) => w,
        Err(e) => {
            error!("Device watcher failed to initialise: {}", e);
            return;
        }
    };
    if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
        error!("Device watcher cannot watch {}: {}", dir.display(), e);
        return;
    }
    info!("Watching devices in {}", dir.display());

    let mut tracker = DeviceTracker::default();
    if !rescan(&dir, &mut tracker, &events).await {
        return;
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            raw = raw_rx.recv() => match raw {
                None => break,
                Some(Err(e)) => warn!("Device watcher event error: {}", e),
                Some(Ok(event)) => {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(_))
                        && !rescan(&dir, &mut tracker, &events).await
                    {
                        return;
                    }
                }
            }
        }
    }
    debug!("Device watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::{WatchKind, event_channel};
    use std::time::Duration;
    use tempfile::TempDir;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<PathBuf, PathBuf> {
        pairs
            .iter()
            .map(|(l, d)| (PathBuf::from(l), PathBuf::from(d)))
            .collect()
    }

    #[test]
    fn test_tracker_reports_canonical_paths() {
        let mut tracker = DeviceTracker::default();

        let events = tracker.apply(map(&[("/by-uuid/ABCD-1234", "/dev/sdb1")]));
        assert_eq!(events, vec![WatchEvent::added(WatchSource::Device, "/dev/sdb1")]);

        // Nothing changed
        assert!(tracker.apply(map(&[("/by-uuid/ABCD-1234", "/dev/sdb1")])).is_empty());

        // The symlink is gone; removal still names the device
        let events = tracker.apply(BTreeMap::new());
        assert_eq!(events, vec![WatchEvent::removed(WatchSource::Device, "/dev/sdb1")]);
        assert_eq!(tracker.devices().count(), 0);
    }

    #[test]
    fn test_tracker_retarget_is_remove_then_add() {
        let mut tracker = DeviceTracker::default();
        tracker.apply(map(&[("/by-uuid/X", "/dev/sdb1")]));
        let events = tracker.apply(map(&[("/by-uuid/X", "/dev/sdc1")]));
        assert_eq!(
            events,
            vec![
                WatchEvent::removed(WatchSource::Device, "/dev/sdb1"),
                WatchEvent::added(WatchSource::Device, "/dev/sdc1"),
            ]
        );
    }

    #[tokio::test]
    async fn test_watcher_initial_scan_and_hotplug() {
        let temp_dir = TempDir::new().unwrap();
        let dev = temp_dir.path().join("sdb1");
        std::fs::write(&dev, "").unwrap();
        let dev2 = temp_dir.path().join("sdc1");
        std::fs::write(&dev2, "").unwrap();
        let by_uuid = temp_dir.path().join("by-uuid");
        std::fs::create_dir(&by_uuid).unwrap();
        std::os::unix::fs::symlink(&dev, by_uuid.join("ABCD-1234")).unwrap();

        let (tx, mut rx) = event_channel();
        let mut watcher = DeviceWatcher::new(&by_uuid, tx);
        watcher.start();
        assert!(watcher.is_active());

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.kind, WatchKind::Added);
        assert_eq!(
            PathBuf::from(&first.key),
            std::fs::canonicalize(&dev).unwrap()
        );

        std::os::unix::fs::symlink(&dev2, by_uuid.join("EEEE-5678")).unwrap();
        let plugged = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(plugged.kind, WatchKind::Added);
        assert_eq!(
            PathBuf::from(&plugged.key),
            std::fs::canonicalize(&dev2).unwrap()
        );

        std::fs::remove_file(by_uuid.join("EEEE-5678")).unwrap();
        let unplugged = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unplugged.kind, WatchKind::Removed);
        assert_eq!(unplugged.key, plugged.key);

        watcher.stop().await;
        assert!(!watcher.is_active());
    }

    #[tokio::test]
    async fn test_missing_directory_deactivates() {
        let (tx, _rx) = event_channel();
        let mut watcher = DeviceWatcher::new("/nonexistent/by-uuid", tx);
        watcher.start();
        for _ in 0..100 {
            if !watcher.is_active() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!watcher.is_active());
    }
}
