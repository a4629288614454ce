use super::{Attachment, Core, SharedCore};
use crate::config::{Method, MountSpec};
use crate::error::{DynmountError, Result};
use crate::mount::UnmountFlags;
use crate::paths;
use crate::probe::DeviceIdentity;
use crate::registry::{DynHealth, DynMountState, REMOVABLE_PREFIX};
use crate::watcher::UNMOUNTED;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Drives local mounts from device and pool events.
pub struct MountOrchestrator {
    core: SharedCore,
    pools: watch::Sender<Vec<String>>,
}

impl MountOrchestrator {
    pub fn new(core: SharedCore, pools: Vec<String>) -> Self {
        let (pools, _) = watch::channel(pools);
        Self { core, pools }
    }

    /// Pool list for the ZFS watcher.
    pub fn pool_list(&self) -> watch::Receiver<Vec<String>> {
        self.pools.subscribe()
    }

    /// Replace the pools the ZFS watcher follows.
    pub fn update_list(&self, pools: Vec<String>) {
        self.pools.send_replace(pools);
    }

    pub async fn on_added(&self, device: &Path) {
        self.core.lock().await.device_added(device).await;
    }

    pub async fn on_deleted(&self, device: &Path) {
        self.core.lock().await.device_removed(device).await;
    }

    pub async fn on_zfs_added(&self, pool: &str, health: &str) {
        self.core.lock().await.pool_changed(pool, health, true).await;
    }

    pub async fn on_zfs_deleted(&self, pool: &str, health: &str) {
        self.core.lock().await.pool_changed(pool, health, false).await;
    }
}

impl Core {
    fn local_point(&self, name: &str, spec: &MountSpec) -> PathBuf {
        paths::mount_point(self.settings(), &self.backends.fstab, name, spec)
    }

    pub async fn device_added(&mut self, device: &Path) {
        let identity = self.backends.devices.identify(device).await;
        if identity.is_zfs_member() {
            self.pool_member_added(&identity);
            return;
        }

        let found = self
            .intent()
            .mount_for_device(identity.uuid.as_deref(), identity.label.as_deref())
            .map(|(n, s)| (n.clone(), s.clone()));
        let Some((name, spec)) = found else {
            self.removable_added(device, &identity).await;
            return;
        };

        match spec.method {
            Method::Dynmount => {}
            Method::Auto => {
                debug!("{} appeared; left to the automounter", name);
                return;
            }
            _ => {
                debug!("{} appeared but is not dynamic, ignoring", name);
                return;
            }
        }

        self.attached
            .insert(device.to_path_buf(), Attachment::Configured(name.clone()));
        let point = self.local_point(&name, &spec);
        let mounted = match self.mount_device(&name, &spec, device).await {
            Ok(_) => {
                info!("Mounted {} ({}) on {}", name, device.display(), point.display());
                true
            }
            Err(e) => {
                error!("Failed to mount {} ({}): {}", name, device.display(), e);
                false
            }
        };
        if mounted {
            self.relink_shares_for(&name).await;
        }
        let health = if mounted {
            DynHealth::Online
        } else {
            DynHealth::Offline
        };
        self.track(&name, point, health);
    }

    pub async fn device_removed(&mut self, device: &Path) {
        match self.attached.remove(device) {
            Some(Attachment::Removable { key, point }) => {
                if let Err(e) = self
                    .backends
                    .mounter
                    .unmount(&point, UnmountFlags::default())
                    .await
                {
                    warn!("Failed to unmount {}: {}", point.display(), e);
                }
                self.registry.remove(&key);
            }
            Some(Attachment::Configured(name)) => {
                let Some(spec) = self.intent().mount(&name).cloned() else {
                    debug!("{} vanished from configuration", name);
                    return;
                };
                let point = self.local_point(&name, &spec);
                match self.backends.mounter.is_mounted(&point).await {
                    Ok(true) => {
                        match self
                            .backends
                            .mounter
                            .unmount(&point, UnmountFlags::internal())
                            .await
                        {
                            Ok(()) => info!("Unmounted {} from {}", name, point.display()),
                            Err(e) => error!("Failed to unmount {}: {}", name, e),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Cannot check {}: {}", point.display(), e),
                }
                self.track(&name, point, DynHealth::Offline);
            }
            None => debug!("Untracked device {} removed", device.display()),
        }
    }

    pub async fn pool_changed(&mut self, pool: &str, health: &str, available: bool) {
        let found = self
            .intent()
            .mount_for_pool(pool)
            .map(|(n, s)| (n.clone(), s.clone()));
        let Some((name, spec)) = found else {
            debug!("No mount configured for pool {}", pool);
            return;
        };
        match spec.method {
            Method::Dynmount => {}
            Method::Auto => {
                debug!("{} is left to the automounter, ignoring pool event", name);
                return;
            }
            _ => {
                debug!("{} is not dynamic, ignoring pool event", name);
                return;
            }
        }
        let point = self.local_point(&name, &spec);
        if !spec.zfs {
            warn!(
                "Mount {} matches pool {} but is not ZFS-typed; check the configuration",
                name, pool
            );
        } else if available && health != UNMOUNTED {
            info!("Pool {} is {}", pool, health);
            self.relink_shares_for(&name).await;
        } else {
            warn!("Pool {} is {}", pool, health);
        }
        self.track(&name, point, DynHealth::from_pool(health));
    }

    /// A ZFS member device appeared. Pool health arrives separately from the
    /// ZFS watcher, so only references are refreshed.
    fn pool_member_added(&mut self, identity: &DeviceIdentity) {
        let Some(pool) = identity.label.as_deref() else {
            return;
        };
        let found = self
            .intent()
            .mount_for_pool(pool)
            .map(|(n, s)| (n.clone(), s.clone()));
        if let Some((name, spec)) = found.filter(|(_, s)| s.method == Method::Dynmount) {
            debug!("Member device of pool {} appeared", pool);
            let health = self.registry.get(&name).map_or(DynHealth::Offline, |s| s.health);
            let point = self.local_point(&name, &spec);
            self.track(&name, point, health);
        }
    }

    async fn removable_added(&mut self, device: &Path, identity: &DeviceIdentity) {
        if !self.settings().removable {
            debug!("Unconfigured device {} ignored", device.display());
            return;
        }
        if self
            .backends
            .fstab
            .find_for_device(identity, device)
            .is_some()
        {
            debug!("{} is in the static mount table, not removable", device.display());
            return;
        }

        let point = self.settings().removable_mountpoint(device);
        let key = format!("{REMOVABLE_PREFIX}{}", device.display());
        let fstype = identity.fstype.as_deref().unwrap_or("auto");
        match self
            .backends
            .mounter
            .mount_temp(&device.to_string_lossy(), &point, fstype, &[])
            .await
        {
            Ok(()) => {
                info!("Mounted removable {} on {}", device.display(), point.display());
                self.registry
                    .record(DynMountState::new(&key, &point, DynHealth::Online));
                self.attached
                    .insert(device.to_path_buf(), Attachment::Removable { key, point });
            }
            Err(e) => warn!("Failed to mount removable {}: {}", device.display(), e),
        }
    }

    /// Mount a configured device. No-op when already mounted.
    async fn mount_device(&self, name: &str, spec: &MountSpec, device: &Path) -> Result<PathBuf> {
        let point = self.local_point(name, spec);
        if self.backends.mounter.is_mounted(&point).await? {
            debug!("{} already mounted on {}", name, point.display());
            return Ok(point);
        }
        if self.backends.fstab.find_for_mountpoint(&point).is_some() {
            self.backends.mounter.mount(&point).await?;
        } else {
            self.backends
                .mounter
                .mount_temp(&device.to_string_lossy(), &point, &spec.fstype, &spec.options)
                .await?;
        }
        Ok(point)
    }

    /// Mount a configured local entry by name, then relink its shares.
    pub async fn mount_configured(&mut self, name: &str) -> Result<PathBuf> {
        let spec = self
            .intent()
            .mount(name)
            .cloned()
            .ok_or_else(|| DynmountError::ConfigInvalid {
                message: format!("No mount named {name}"),
            })?;
        if spec.zfs {
            return Err(DynmountError::MountOperationFailed {
                message: format!("{name} is a ZFS pool; ZFS manages its own mounts"),
            });
        }
        let device = self
            .backends
            .devices
            .find_device(spec.uuid.as_deref(), spec.label.as_deref())
            .await
            .ok_or_else(|| DynmountError::MountOperationFailed {
                message: format!("Device for {name} is not present"),
            })?;

        let point = self.mount_device(name, &spec, &device).await?;
        self.attached
            .insert(device, Attachment::Configured(name.to_string()));
        self.relink_shares_for(name).await;
        self.track(name, point.clone(), DynHealth::Online);
        Ok(point)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::TestCore;
    use super::*;
    use crate::config::{Intent, ShareSpec};
    use crate::mount::MountCall;
    use pretty_assertions::assert_eq;

    fn backup_intent(method: Method) -> Intent {
        let mut intent = Intent::default();
        intent.mounts.insert(
            "backup".into(),
            MountSpec {
                uuid: Some("ABCD-1234".into()),
                fstype: "ext4".into(),
                method,
                ..Default::default()
            },
        );
        intent
    }

    #[tokio::test]
    async fn test_dynmount_device_is_mounted_and_online() {
        let mut t = TestCore::new(backup_intent(Method::Dynmount));
        t.mocks.devices.plug("/dev/sdb1", "ABCD-1234", "ext4");

        t.core.device_added(Path::new("/dev/sdb1")).await;

        let state = t.core.registry().get("backup").unwrap();
        assert_eq!(state.health, DynHealth::Online);
        assert_eq!(state.mountpoint, PathBuf::from("/mnt/backup"));
        assert!(t.mocks.mounter.mounted(Path::new("/mnt/backup")));
    }

    #[tokio::test]
    async fn test_added_twice_is_idempotent() {
        let mut t = TestCore::new(backup_intent(Method::Dynmount));
        t.mocks.devices.plug("/dev/sdb1", "ABCD-1234", "ext4");

        t.core.device_added(Path::new("/dev/sdb1")).await;
        let once = t.core.registry().snapshot();
        t.core.device_added(Path::new("/dev/sdb1")).await;

        assert_eq!(t.core.registry().snapshot(), once);
        let mounts = t
            .mocks
            .mounter
            .calls()
            .into_iter()
            .filter(|c| matches!(c, MountCall::MountTemp { .. }))
            .count();
        assert_eq!(mounts, 1);
    }

    #[tokio::test]
    async fn test_untracked_spec_never_appears() {
        for method in [Method::Startup, Method::Disabled] {
            let mut t = TestCore::new(backup_intent(method));
            t.mocks.devices.plug("/dev/sdb1", "ABCD-1234", "ext4");

            t.core.device_added(Path::new("/dev/sdb1")).await;
            t.core.device_removed(Path::new("/dev/sdb1")).await;

            assert!(t.core.registry().get("backup").is_none());
            assert!(t.mocks.mounter.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_removed_device_goes_offline() {
        let mut t = TestCore::new(backup_intent(Method::Dynmount));
        t.mocks.devices.plug("/dev/sdb1", "ABCD-1234", "ext4");

        t.core.device_added(Path::new("/dev/sdb1")).await;
        t.core.device_removed(Path::new("/dev/sdb1")).await;

        assert_eq!(
            t.core.registry().get("backup").unwrap().health,
            DynHealth::Offline
        );
        assert!(!t.mocks.mounter.mounted(Path::new("/mnt/backup")));
        assert!(t.mocks.mounter.calls().contains(&MountCall::Unmount {
            point: PathBuf::from("/mnt/backup"),
            flags: UnmountFlags::internal(),
        }));
    }

    #[tokio::test]
    async fn test_failed_mount_is_offline() {
        let mut t = TestCore::new(backup_intent(Method::Dynmount));
        t.mocks.devices.plug("/dev/sdb1", "ABCD-1234", "ext4");
        t.mocks.mounter.set_should_fail(true);

        t.core.device_added(Path::new("/dev/sdb1")).await;

        assert_eq!(
            t.core.registry().get("backup").unwrap().health,
            DynHealth::Offline
        );
    }

    #[tokio::test]
    async fn test_fstab_entry_uses_plain_mount() {
        let mut t = TestCore::with_fstab(
            backup_intent(Method::Dynmount),
            "UUID=ABCD-1234 /mnt/usb ext4 noauto 0 0\n",
        );
        t.mocks.devices.plug("/dev/sdb1", "ABCD-1234", "ext4");

        t.core.device_added(Path::new("/dev/sdb1")).await;

        assert_eq!(
            t.mocks.mounter.calls(),
            vec![MountCall::Mount(PathBuf::from("/mnt/usb"))]
        );
        assert_eq!(
            t.core.registry().get("backup").unwrap().mountpoint,
            PathBuf::from("/mnt/usb")
        );
    }

    #[tokio::test]
    async fn test_enabled_shares_are_relinked_after_mount() {
        let mut intent = backup_intent(Method::Dynmount);
        let mut t = TestCore::new(Intent::default());
        let source = t.dir.path().join("disk");
        std::fs::create_dir_all(source.join("photos")).unwrap();
        if let Some(m) = intent.mounts.get_mut("backup") {
            m.mountpoint = Some(source.clone());
        }
        intent.shares.insert(
            "photos".into(),
            ShareSpec {
                mount: "backup".into(),
                folder: "photos".into(),
                enabled: true,
            },
        );
        intent.shares.insert(
            "archive".into(),
            ShareSpec {
                mount: "backup".into(),
                folder: "archive".into(),
                enabled: false,
            },
        );
        t.core.update_intent(|i| *i = intent).unwrap();
        t.mocks.devices.plug("/dev/sdb1", "ABCD-1234", "ext4");

        t.core.device_added(Path::new("/dev/sdb1")).await;

        let link = t.core.settings().share_link("photos");
        assert_eq!(std::fs::read_link(&link).unwrap(), source.join("photos"));
        assert!(std::fs::symlink_metadata(t.core.settings().share_link("archive")).is_err());

        let state = t.core.registry().get("backup").unwrap();
        assert_eq!(state.references, vec!["archive".to_string(), "photos".to_string()]);
        assert_eq!(state.references_enabled, vec![false, true]);
    }

    #[tokio::test]
    async fn test_removable_disabled_ignores_unknown_devices() {
        let mut t = TestCore::new(Intent::default());
        t.mocks.devices.plug("/dev/sdc1", "EEEE-5678", "vfat");

        t.core.device_added(Path::new("/dev/sdc1")).await;
        assert!(t.core.registry().is_empty());
        assert!(t.mocks.mounter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_removable_device_gets_scratch_mount() {
        let mut t = TestCore::build(
            Intent::default(),
            "UUID=1111-2222 /mnt/static ext4 defaults 0 0\n",
            |s| s.removable = true,
        );
        t.mocks.devices.plug("/dev/sdc1", "EEEE-5678", "vfat");
        t.mocks.devices.plug("/dev/sdd1", "pool-guid", "zfs_member");
        t.mocks.devices.plug("/dev/sde1", "1111-2222", "ext4");
        let point = t.core.settings().removable_mountpoint(Path::new("/dev/sdc1"));

        t.core.device_added(Path::new("/dev/sdc1")).await;
        t.core.device_added(Path::new("/dev/sdd1")).await;
        t.core.device_added(Path::new("/dev/sde1")).await;

        let state = t.core.registry().get("removable:/dev/sdc1").unwrap();
        assert_eq!(state.health, DynHealth::Online);
        assert_eq!(state.mountpoint, point);
        assert_eq!(t.core.registry().len(), 1);

        t.core.device_removed(Path::new("/dev/sdc1")).await;
        assert!(t.core.registry().is_empty());
        assert!(t.mocks.mounter.calls().contains(&MountCall::Unmount {
            point,
            flags: UnmountFlags::default(),
        }));
    }

    #[tokio::test]
    async fn test_pool_events_never_mount() {
        let mut intent = Intent::default();
        intent.mounts.insert(
            "tank".into(),
            MountSpec {
                uuid: Some("tank".into()),
                method: Method::Dynmount,
                zfs: true,
                ..Default::default()
            },
        );
        intent.mounts.insert(
            "confused".into(),
            MountSpec {
                uuid: Some("scratch".into()),
                method: Method::Dynmount,
                ..Default::default()
            },
        );
        let mut t = TestCore::new(intent);

        t.core.pool_changed("tank", "ONLINE", true).await;
        assert_eq!(t.core.registry().get("tank").unwrap().health, DynHealth::Online);

        t.core.pool_changed("tank", UNMOUNTED, false).await;
        assert_eq!(
            t.core.registry().get("tank").unwrap().health,
            DynHealth::Unmounted
        );

        // Not ZFS-typed: registered, nothing done
        t.core.pool_changed("scratch", "DEGRADED", true).await;
        assert_eq!(
            t.core.registry().get("confused").unwrap().health,
            DynHealth::Degraded
        );

        t.core.pool_changed("unknown", "ONLINE", true).await;
        assert!(t.mocks.mounter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_auto_pool_keeps_auto_health() {
        let mut intent = Intent::default();
        intent.mounts.insert(
            "tank".into(),
            MountSpec {
                uuid: Some("tank".into()),
                method: Method::Auto,
                zfs: true,
                ..Default::default()
            },
        );
        let mut t = TestCore::new(intent);
        t.core.sync_registry().await;
        assert!(t.core.intent().monitored_pools().is_empty());
        assert_eq!(t.core.registry().get("tank").unwrap().health, DynHealth::Auto);

        t.core.pool_changed("tank", "ONLINE", true).await;
        assert_eq!(t.core.registry().get("tank").unwrap().health, DynHealth::Auto);
    }

    #[tokio::test]
    async fn test_mount_configured_requires_device() {
        let mut t = TestCore::new(backup_intent(Method::Startup));
        assert!(t.core.mount_configured("backup").await.is_err());

        t.mocks.devices.plug("/dev/sdb1", "ABCD-1234", "ext4");
        let point = t.core.mount_configured("backup").await.unwrap();
        assert_eq!(point, PathBuf::from("/mnt/backup"));
        assert!(t.mocks.mounter.mounted(&point));
        // Startup entries are not tracked
        assert!(t.core.registry().is_empty());
    }
}
