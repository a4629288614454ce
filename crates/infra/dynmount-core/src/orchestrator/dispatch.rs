use super::{MountOrchestrator, RemoteMountOrchestrator};
use crate::watcher::{EventReceiver, WatchEvent, WatchKind, WatchSource};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Route one watcher event to its orchestrator.
pub async fn dispatch(
    local: &MountOrchestrator,
    remote: &RemoteMountOrchestrator,
    event: WatchEvent,
) {
    debug!("Dispatching {:?}", event);
    let payload = event.payload.as_deref();
    match (event.source, event.kind) {
        (WatchSource::Device, WatchKind::Added) => local.on_added(Path::new(&event.key)).await,
        (WatchSource::Device, WatchKind::Removed) => {
            local.on_deleted(Path::new(&event.key)).await;
        }
        (WatchSource::Pool, WatchKind::Added) => {
            local
                .on_zfs_added(&event.key, payload.unwrap_or("ONLINE"))
                .await;
        }
        (WatchSource::Pool, WatchKind::Removed) => {
            local
                .on_zfs_deleted(&event.key, payload.unwrap_or("UNAVAIL"))
                .await;
        }
        (WatchSource::Remote, WatchKind::Added) => remote.on_added(&event.key).await,
        (WatchSource::Remote, WatchKind::Removed) => remote.on_deleted(&event.key).await,
    }
}

/// Drain watcher events one at a time until cancelled.
pub fn spawn_dispatcher(
    mut events: EventReceiver,
    local: Arc<MountOrchestrator>,
    remote: Arc<RemoteMountOrchestrator>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => dispatch(&local, &remote, event).await,
                    None => break,
                }
            }
        }
        debug!("Dispatcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::super::testing::TestCore;
    use super::*;
    use crate::config::{Intent, Method, MountSpec};
    use crate::registry::DynHealth;
    use crate::watcher::event_channel;
    use std::time::Duration;

    #[tokio::test]
    async fn test_dispatcher_serialises_events_into_registry() {
        let mut intent = Intent::default();
        intent.mounts.insert(
            "backup".into(),
            MountSpec {
                uuid: Some("ABCD-1234".into()),
                method: Method::Dynmount,
                ..Default::default()
            },
        );
        let t = TestCore::new(intent);
        t.mocks.devices.plug("/dev/sdb1", "ABCD-1234", "ext4");
        let mocks_mounter = t.mocks.mounter.clone();
        let _dir = t.dir;
        let core = t.core.shared();

        let local = Arc::new(MountOrchestrator::new(Arc::clone(&core), Vec::new()));
        let remote = Arc::new(RemoteMountOrchestrator::new(Arc::clone(&core), Vec::new()));
        let (tx, rx) = event_channel();
        let cancel = CancellationToken::new();
        let task = spawn_dispatcher(rx, local, remote, cancel.clone());

        let mut snapshots = core.lock().await.registry().subscribe();
        tx.send(WatchEvent::added(WatchSource::Device, "/dev/sdb1"))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if snapshots
                    .borrow_and_update()
                    .iter()
                    .any(|s| s.name == "backup" && s.health == DynHealth::Online)
                {
                    break;
                }
                snapshots.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert!(mocks_mounter.mounted(std::path::Path::new("/mnt/backup")));

        cancel.cancel();
        task.await.unwrap();
    }
}
