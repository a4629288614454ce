//! Reconciliation of live mount state with the stored intent.
//!
//! [`Core`] bundles everything the single process-wide lock guards: the
//! config store, the registry and the mount collaborators. Watcher events
//! and supervisor runs each take the lock for their whole duration, which
//! turns independently scheduled sources into one linear history.

mod dispatch;
mod local;
mod remote;
mod shares;

pub use dispatch::{dispatch, spawn_dispatcher};
pub use local::MountOrchestrator;
pub use remote::RemoteMountOrchestrator;

use crate::backends::Backends;
use crate::config::{ConfigStore, Intent, Method, Settings};
use crate::error::Result;
use crate::health::HealthChecker;
use crate::paths;
use crate::registry::{DynHealth, DynMountRegistry, DynMountState, REMOVABLE_PREFIX};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub type SharedCore = Arc<Mutex<Core>>;

/// What a device currently present in the device directory was attached as.
#[derive(Debug, Clone)]
enum Attachment {
    Configured(String),
    Removable { key: String, point: PathBuf },
}

pub struct Core {
    store: Box<dyn ConfigStore>,
    backends: Backends,
    registry: DynMountRegistry,
    attached: BTreeMap<PathBuf, Attachment>,
}

impl Core {
    pub fn new(store: Box<dyn ConfigStore>, backends: Backends) -> Self {
        Self {
            store,
            backends,
            registry: DynMountRegistry::new(),
            attached: BTreeMap::new(),
        }
    }

    pub fn shared(self) -> SharedCore {
        Arc::new(Mutex::new(self))
    }

    pub fn settings(&self) -> &Settings {
        self.store.settings()
    }

    pub fn intent(&self) -> &Intent {
        self.store.intent()
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn registry(&self) -> &DynMountRegistry {
        &self.registry
    }

    pub fn checker(&self) -> HealthChecker<'_> {
        HealthChecker::new(self.settings(), self.intent(), &self.backends)
    }

    /// Apply a change to the intent and persist it.
    pub(crate) fn update_intent<F>(&mut self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Intent),
    {
        change(self.store.intent_mut());
        self.store.save()
    }

    /// Re-read the config store and resynchronise the registry.
    pub async fn reload(&mut self) -> Result<()> {
        self.store.reload()?;
        self.sync_registry().await;
        Ok(())
    }

    /// Bring the registry in line with the intent: add missing `auto` and
    /// `dynmount` entries, drop stale ones, refresh references.
    pub async fn sync_registry(&mut self) {
        let mut desired = Vec::new();
        let intent = self.intent().clone();

        for (name, spec) in &intent.mounts {
            if !spec.method.is_dynamic() {
                continue;
            }
            let point = paths::mount_point(self.settings(), &self.backends.fstab, name, spec);
            let health = if spec.method == Method::Auto {
                DynHealth::Auto
            } else if let Some(known) = self.known_health(name) {
                known
            } else if spec.zfs {
                DynHealth::Offline
            } else {
                self.probe_health(&point).await
            };
            desired.push(self.state(name, point, health));
        }

        for (name, spec) in &intent.remote_mounts {
            if !spec.method.is_dynamic() {
                continue;
            }
            let point =
                paths::remote_mount_point(self.settings(), &self.backends.fstab, name, spec);
            let health = if spec.method == Method::Auto {
                DynHealth::Auto
            } else if let Some(known) = self.known_health(name) {
                known
            } else {
                self.probe_health(&point).await
            };
            desired.push(self.state(name, point, health));
        }

        self.registry.replace_configured(desired);
    }

    fn known_health(&self, name: &str) -> Option<DynHealth> {
        self.registry
            .get(name)
            .map(|s| s.health)
            .filter(|h| *h != DynHealth::Auto)
    }

    async fn probe_health(&self, point: &std::path::Path) -> DynHealth {
        match self.backends.mounter.is_mounted(point).await {
            Ok(true) => DynHealth::Online,
            Ok(false) => DynHealth::Offline,
            Err(e) => {
                warn!("Cannot check {}: {}", point.display(), e);
                DynHealth::Offline
            }
        }
    }

    fn state(&self, name: &str, point: PathBuf, health: DynHealth) -> DynMountState {
        let references = self
            .intent()
            .shares_sourced_by(name)
            .map(|(share, spec)| (share.clone(), spec.enabled))
            .collect();
        DynMountState::new(name, point, health).with_references(references)
    }

    fn is_tracked(&self, name: &str) -> bool {
        let intent = self.intent();
        name.starts_with(REMOVABLE_PREFIX)
            || intent.mount(name).is_some_and(|m| m.method.is_dynamic())
            || intent
                .remote_mount(name)
                .is_some_and(|r| r.method.is_dynamic())
    }

    /// Record health for `name` if it belongs in the registry.
    pub(crate) fn track(&mut self, name: &str, point: PathBuf, health: DynHealth) {
        if !self.is_tracked(name) {
            debug!("{} is not dynamic, not tracked", name);
            return;
        }
        let state = self.state(name, point, health);
        self.registry.record(state);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::backends::testing::MockBackends;
    use crate::config::{MemoryConfigStore, Settings};
    use crate::platform::ToolSet;
    use tempfile::TempDir;

    /// A core over mock collaborators with its scratch directory.
    pub struct TestCore {
        pub core: Core,
        pub mocks: MockBackends,
        pub dir: TempDir,
    }

    impl TestCore {
        /// Settings point the fstab, shares root and removable root into a temp dir.
        pub fn new(intent: Intent) -> Self {
            Self::build(intent, "", |_| {})
        }

        pub fn with_fstab(intent: Intent, fstab: &str) -> Self {
            Self::build(intent, fstab, |_| {})
        }

        pub fn build(intent: Intent, fstab: &str, tweak: impl FnOnce(&mut Settings)) -> Self {
            let dir = TempDir::new().unwrap();
            let fstab_path = dir.path().join("fstab");
            std::fs::write(&fstab_path, fstab).unwrap();
            let mut settings = Settings {
                fstab: fstab_path.clone(),
                shares_root: dir.path().join("shares"),
                removable_root: dir.path().join("media"),
                ..Settings::default()
            };
            tweak(&mut settings);
            let mocks = MockBackends::new();
            let store = MemoryConfigStore {
                settings,
                intent,
                saves: 0,
            };
            let core = Core::new(Box::new(store), mocks.backends(&fstab_path));
            Self { core, mocks, dir }
        }

        /// Swap in a tool set, for missing-helper cases.
        pub fn set_tools(&mut self, tools: ToolSet) {
            self.core.backends = self
                .mocks
                .backends_with_tools(&self.dir.path().join("fstab"), tools);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::TestCore;
    use super::*;
    use crate::config::{MountSpec, RemoteFsType, RemoteMountSpec, ShareSpec};
    use pretty_assertions::assert_eq;

    fn intent() -> Intent {
        let mut intent = Intent::default();
        intent.mounts.insert(
            "backup".into(),
            MountSpec {
                uuid: Some("ABCD-1234".into()),
                method: Method::Dynmount,
                ..Default::default()
            },
        );
        intent.mounts.insert(
            "root-data".into(),
            MountSpec {
                uuid: Some("1111-2222".into()),
                method: Method::Startup,
                ..Default::default()
            },
        );
        intent.remote_mounts.insert(
            "movies".into(),
            RemoteMountSpec {
                server: "192.168.1.10".into(),
                share: "media".into(),
                fstype: RemoteFsType::Cifs,
                mountpoint: None,
                user: None,
                options: vec!["guest".into(), "_netdev".into()],
                method: Method::Auto,
                credentials: false,
            },
        );
        intent.shares.insert(
            "photos".into(),
            ShareSpec {
                mount: "backup".into(),
                folder: "photos".into(),
                enabled: true,
            },
        );
        intent
    }

    #[test]
    fn test_core_can_cross_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Core>();
        assert_send_sync::<SharedCore>();
    }

    #[tokio::test]
    async fn test_sync_registers_only_dynamic_entries() {
        let mut t = TestCore::new(intent());
        t.mocks.mounter.preset_mounted("/mnt/backup");
        t.core.sync_registry().await;

        let names: Vec<&str> = t.core.registry().names().collect();
        assert_eq!(names, vec!["backup", "movies"]);

        let backup = t.core.registry().get("backup").unwrap();
        assert_eq!(backup.health, DynHealth::Online);
        assert_eq!(backup.references, vec!["photos".to_string()]);
        assert_eq!(backup.references_enabled, vec![true]);

        assert_eq!(t.core.registry().get("movies").unwrap().health, DynHealth::Auto);
    }

    #[tokio::test]
    async fn test_sync_drops_entries_whose_method_changed() {
        let mut t = TestCore::new(intent());
        t.core.sync_registry().await;
        assert!(t.core.registry().get("backup").is_some());

        t.core
            .update_intent(|i| {
                if let Some(m) = i.mounts.get_mut("backup") {
                    m.method = Method::Startup;
                }
            })
            .unwrap();
        t.core.sync_registry().await;
        assert!(t.core.registry().get("backup").is_none());
    }

    #[tokio::test]
    async fn test_track_ignores_untracked_names() {
        let mut t = TestCore::new(intent());
        t.core
            .track("root-data", "/mnt/root-data".into(), DynHealth::Online);
        t.core.track("nonexistent", "/mnt/x".into(), DynHealth::Online);
        assert!(t.core.registry().is_empty());
    }
}
