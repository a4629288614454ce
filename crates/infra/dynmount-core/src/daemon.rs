//! Wiring of the long-running service: core, watchers, dispatcher,
//! supervisor and the run file writer.

use crate::backends::Backends;
use crate::config::{ConfigStore, JsonConfigStore};
use crate::error::Result;
use crate::fix::AutoFixSupervisor;
use crate::orchestrator::{
    Core, MountOrchestrator, RemoteMountOrchestrator, SharedCore, spawn_dispatcher,
};
use crate::platform::common::SHUTDOWN_JOIN_TIMEOUT;
use crate::run_file::RunFile;
use crate::watcher::{DeviceWatcher, PresenceWatcher, RemoteWatcher, ZfsWatcher, event_channel};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Daemon {
    core: SharedCore,
    watchers: Vec<Box<dyn PresenceWatcher>>,
    supervisor: Option<AutoFixSupervisor>,
    cancel: CancellationToken,
    dispatcher: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    run_file: RunFile,
}

impl Daemon {
    /// Load the config document and start against the real system.
    pub async fn start(config_path: &Path) -> Result<Self> {
        let store = JsonConfigStore::load(config_path)?;
        let backends = Backends::system(store.settings(), store.intent());
        info!("Loaded configuration from {}", config_path.display());
        Self::start_with(Box::new(store), backends).await
    }

    pub async fn start_with(store: Box<dyn ConfigStore>, backends: Backends) -> Result<Self> {
        let settings = store.settings().clone();
        let mut core = Core::new(store, backends.clone());
        core.sync_registry().await;

        let pools = core.intent().monitored_pools();
        let urls = core.intent().monitored_urls();
        let snapshots = core.registry().subscribe();
        let core = core.shared();

        let cancel = CancellationToken::new();
        let run_file = RunFile::new(&settings.run_file);
        let writer = run_file.clone().spawn_writer(snapshots, cancel.child_token());

        let local = Arc::new(MountOrchestrator::new(Arc::clone(&core), pools));
        let remote = Arc::new(RemoteMountOrchestrator::new(Arc::clone(&core), urls));

        let (events, receiver) = event_channel();
        let mut watchers: Vec<Box<dyn PresenceWatcher>> = vec![
            Box::new(DeviceWatcher::new(&settings.device_dir, events.clone())),
            Box::new(RemoteWatcher::new(
                Arc::clone(&backends.hosts),
                remote.url_list(),
                settings.poll_interval(),
                settings.ping_timeout(),
                events.clone(),
            )),
            Box::new(ZfsWatcher::new(
                Arc::clone(&backends.zfs),
                local.pool_list(),
                settings.poll_interval(),
                settings.degraded_available,
                events,
            )),
        ];
        for watcher in &mut watchers {
            watcher.start();
            info!("Started {} watcher", watcher.name());
        }

        let dispatcher = spawn_dispatcher(
            receiver,
            Arc::clone(&local),
            Arc::clone(&remote),
            cancel.child_token(),
        );

        let supervisor = if settings.autofix.enabled {
            Some(AutoFixSupervisor::start(
                Arc::clone(&core),
                local,
                remote,
                settings.autofix.clone(),
            ))
        } else {
            info!("Auto-fix disabled");
            None
        };

        Ok(Self {
            core,
            watchers,
            supervisor,
            cancel,
            dispatcher: Some(dispatcher),
            writer: Some(writer),
            run_file,
        })
    }

    pub fn core(&self) -> SharedCore {
        Arc::clone(&self.core)
    }

    /// Names of watchers whose loop is still running.
    pub fn active_watchers(&self) -> Vec<&'static str> {
        self.watchers
            .iter()
            .filter(|w| w.is_active())
            .map(|w| w.name())
            .collect()
    }

    /// Restart watchers that gave up after a failure.
    pub fn revive_watchers(&mut self) {
        for watcher in &mut self.watchers {
            if !watcher.is_active() {
                info!("Restarting {} watcher", watcher.name());
                watcher.start();
            }
        }
    }

    pub async fn shutdown(mut self) {
        info!("Shutting down");
        for watcher in &mut self.watchers {
            watcher.stop().await;
        }
        if let Some(mut supervisor) = self.supervisor.take() {
            supervisor.terminate().await;
        }

        self.cancel.cancel();
        for task in [self.dispatcher.take(), self.writer.take()]
            .into_iter()
            .flatten()
        {
            if tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, task)
                .await
                .is_err()
            {
                warn!("Background task did not stop within {:?}", SHUTDOWN_JOIN_TIMEOUT);
            }
        }

        if let Err(e) = self.run_file.remove() {
            warn!("Cannot remove {}: {}", self.run_file.path().display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::testing::MockBackends;
    use crate::config::{AutofixSettings, Intent, MemoryConfigStore, Method, MountSpec, Settings};
    use crate::registry::DynHealth;
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings(dir: &Path) -> Settings {
        Settings {
            device_dir: dir.join("by-uuid"),
            label_dir: dir.join("by-label"),
            mount_root: dir.join("mnt"),
            removable_root: dir.join("media"),
            shares_root: dir.join("shares"),
            run_file: dir.join("dynmount.run"),
            fstab: dir.join("fstab"),
            autofix: AutofixSettings {
                enabled: false,
                ..AutofixSettings::default()
            },
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_start_publishes_run_file_and_shutdown_removes_it() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("by-uuid")).unwrap();
        std::fs::write(dir.path().join("fstab"), "").unwrap();

        let mut intent = Intent::default();
        intent.mounts.insert(
            "backup".into(),
            MountSpec {
                uuid: Some("ABCD-1234".into()),
                method: Method::Dynmount,
                ..Default::default()
            },
        );
        let store = MemoryConfigStore {
            settings: settings(dir.path()),
            intent,
            saves: 0,
        };
        let mocks = MockBackends::new();
        let backends = mocks.backends(&dir.path().join("fstab"));

        let daemon = Daemon::start_with(Box::new(store), backends).await.unwrap();
        let run_file = dir.path().join("dynmount.run");

        let states = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(Some(states)) = RunFile::read(&run_file) {
                    return states;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].name, "backup");
        assert_eq!(states[0].health, DynHealth::Offline);
        assert!(daemon.active_watchers().contains(&"device"));

        daemon.shutdown().await;
        assert!(!run_file.exists());
    }
}
