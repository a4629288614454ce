use super::{DeviceIdentity, DeviceProbe, HostProbe, ZfsProbe};
use crate::error::{DynmountError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Devices keyed by canonical path.
#[derive(Clone, Default)]
pub struct MockDeviceProbe {
    devices: Arc<Mutex<HashMap<PathBuf, DeviceIdentity>>>,
}

impl MockDeviceProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plug(&self, device: impl Into<PathBuf>, uuid: &str, fstype: &str) {
        self.devices.lock().unwrap().insert(
            device.into(),
            DeviceIdentity {
                uuid: Some(uuid.to_string()),
                label: None,
                fstype: Some(fstype.to_string()),
            },
        );
    }

    pub fn unplug(&self, device: &Path) {
        self.devices.lock().unwrap().remove(device);
    }
}

#[async_trait]
impl DeviceProbe for MockDeviceProbe {
    async fn find_device(&self, uuid: Option<&str>, label: Option<&str>) -> Option<PathBuf> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|(_, id)| {
                (uuid.is_some() && id.uuid.as_deref() == uuid)
                    || (label.is_some() && id.label.as_deref() == label)
            })
            .map(|(path, _)| path.clone())
    }

    async fn identify(&self, device: &Path) -> DeviceIdentity {
        self.devices
            .lock()
            .unwrap()
            .get(device)
            .cloned()
            .unwrap_or_default()
    }
}

/// Pools keyed by name; `broken` makes every query fail like a missing `zpool`.
#[derive(Clone, Default)]
pub struct MockZfsProbe {
    health: Arc<Mutex<HashMap<String, String>>>,
    mounted: Arc<Mutex<HashSet<String>>>,
    broken: Arc<Mutex<bool>>,
}

impl MockZfsProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pool(&self, pool: &str, health: &str, mounted: bool) {
        self.health
            .lock()
            .unwrap()
            .insert(pool.to_string(), health.to_string());
        let mut set = self.mounted.lock().unwrap();
        if mounted {
            set.insert(pool.to_string());
        } else {
            set.remove(pool);
        }
    }

    pub fn export_pool(&self, pool: &str) {
        self.health.lock().unwrap().remove(pool);
        self.mounted.lock().unwrap().remove(pool);
    }

    pub fn set_broken(&self, broken: bool) {
        *self.broken.lock().unwrap() = broken;
    }

    fn check_broken(&self) -> Result<()> {
        if *self.broken.lock().unwrap() {
            return Err(DynmountError::ToolNotFound {
                tool: "zpool".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ZfsProbe for MockZfsProbe {
    async fn pool_health(&self, pool: &str) -> Result<Option<String>> {
        self.check_broken()?;
        Ok(self.health.lock().unwrap().get(pool).cloned())
    }

    async fn is_mounted(&self, pool: &str) -> Result<bool> {
        self.check_broken()?;
        Ok(self.mounted.lock().unwrap().contains(pool))
    }
}

/// Reachable hosts.
#[derive(Clone, Default)]
pub struct MockHostProbe {
    up: Arc<Mutex<HashSet<String>>>,
    pings: Arc<Mutex<usize>>,
}

impl MockHostProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_up(&self, host: &str, up: bool) {
        let mut set = self.up.lock().unwrap();
        if up {
            set.insert(host.to_string());
        } else {
            set.remove(host);
        }
    }

    pub fn pings(&self) -> usize {
        *self.pings.lock().unwrap()
    }
}

#[async_trait]
impl HostProbe for MockHostProbe {
    async fn ping(&self, host: &str, _timeout: Duration) -> bool {
        *self.pings.lock().unwrap() += 1;
        self.up.lock().unwrap().contains(host)
    }
}
