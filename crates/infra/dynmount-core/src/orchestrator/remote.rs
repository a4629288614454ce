use super::{Core, SharedCore};
use crate::config::{Method, RemoteMountSpec};
use crate::error::{DynmountError, Result};
use crate::mount::UnmountFlags;
use crate::paths;
use crate::registry::DynHealth;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Drives remote mounts from host reachability events.
pub struct RemoteMountOrchestrator {
    core: SharedCore,
    urls: watch::Sender<Vec<String>>,
}

impl RemoteMountOrchestrator {
    pub fn new(core: SharedCore, urls: Vec<String>) -> Self {
        let (urls, _) = watch::channel(urls);
        Self { core, urls }
    }

    /// URL list for the remote-host watcher.
    pub fn url_list(&self) -> watch::Receiver<Vec<String>> {
        self.urls.subscribe()
    }

    pub fn update_url_list(&self, urls: Vec<String>) {
        self.urls.send_replace(urls);
    }

    pub async fn on_added(&self, url: &str) {
        self.core.lock().await.url_online(url).await;
    }

    pub async fn on_deleted(&self, url: &str) {
        self.core.lock().await.url_offline(url).await;
    }
}

impl Core {
    fn remote_point(&self, name: &str, spec: &RemoteMountSpec) -> PathBuf {
        paths::remote_mount_point(self.settings(), &self.backends.fstab, name, spec)
    }

    fn dynamic_remote_for(&self, url: &str) -> Option<(String, RemoteMountSpec)> {
        let Some((name, spec)) = self.intent().remote_mount_for_url(url) else {
            debug!("No remote mount configured for {}", url);
            return None;
        };
        if spec.method != Method::Dynmount {
            debug!("{} is not dynmount, ignoring host event", name);
            return None;
        }
        Some((name.clone(), spec.clone()))
    }

    pub async fn url_online(&mut self, url: &str) {
        let Some((name, spec)) = self.dynamic_remote_for(url) else {
            return;
        };
        let point = self.remote_point(&name, &spec);
        let mounted = match self.mount_remote_spec(&name, &spec).await {
            Ok(_) => {
                info!("Mounted {} ({}) on {}", name, url, point.display());
                true
            }
            Err(e) => {
                error!("Failed to mount {} ({}): {}", name, url, e);
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

    pub async fn url_offline(&mut self, url: &str) {
        let Some((name, spec)) = self.dynamic_remote_for(url) else {
            return;
        };
        let point = self.remote_point(&name, &spec);
        match self.backends.mounter.is_mounted(&point).await {
            Ok(true) => {
                // A vanished host blocks a plain umount indefinitely
                match self
                    .backends
                    .mounter
                    .unmount(&point, UnmountFlags::forced_internal())
                    .await
                {
                    Ok(()) => info!("Host of {} is gone, unmounted {}", name, point.display()),
                    Err(e) => error!("Failed to unmount {}: {}", name, e),
                }
            }
            Ok(false) => debug!("Host of {} is gone, nothing mounted", name),
            Err(e) => warn!("Cannot check {}: {}", point.display(), e),
        }
        self.track(&name, point, DynHealth::Hostfail);
    }

    async fn mount_remote_spec(&self, name: &str, spec: &RemoteMountSpec) -> Result<PathBuf> {
        let helper = spec.fstype.helper();
        if !self.backends.tools.available(helper) {
            return Err(DynmountError::ToolNotFound {
                tool: helper.to_string(),
            });
        }
        let point = self.remote_point(name, spec);
        if self.backends.mounter.is_mounted(&point).await? {
            debug!("{} already mounted on {}", name, point.display());
            return Ok(point);
        }
        if self.backends.fstab.find_for_mountpoint(&point).is_some() {
            self.backends.mounter.mount(&point).await?;
        } else {
            self.backends
                .mounter
                .mount_temp(&spec.url(), &point, &spec.fstype.to_string(), &spec.options)
                .await?;
        }
        Ok(point)
    }

    /// Mount a configured remote entry by name, then relink its shares.
    pub async fn mount_remote(&mut self, name: &str) -> Result<PathBuf> {
        let spec = self
            .intent()
            .remote_mount(name)
            .cloned()
            .ok_or_else(|| DynmountError::ConfigInvalid {
                message: format!("No remote mount named {name}"),
            })?;
        let point = self.mount_remote_spec(name, &spec).await?;
        self.relink_shares_for(name).await;
        self.track(name, point.clone(), DynHealth::Online);
        Ok(point)
    }
}
